//! Error types for voiceloop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceLoopError {
    // Configuration errors
    #[error("Unsupported model identifier: {identifier}")]
    Configuration { identifier: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Stage errors during a turn
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Audio playback failed: {message}")]
    Playback { message: String },

    // Lifecycle errors
    #[error("Pipeline is already running")]
    AlreadyRunning,

    #[error("Shutdown exceeded {timeout_ms}ms waiting for turn {turn_id} to finish")]
    CancellationTimeout { timeout_ms: u64, turn_id: u64 },

    #[error("Cleanup failed for {components}: {messages}")]
    Cleanup { components: String, messages: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoiceLoopError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_configuration_display() {
        let error = VoiceLoopError::Configuration {
            identifier: "quartz://tiny".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported model identifier: quartz://tiny"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = VoiceLoopError::ConfigInvalidValue {
            key: "pipeline.stop_timeout".to_string(),
            message: "expected a duration".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for pipeline.stop_timeout: expected a duration"
        );
    }

    #[test]
    fn test_stage_errors_display() {
        let transcription = VoiceLoopError::Transcription {
            message: "invalid audio format".to_string(),
        };
        assert_eq!(
            transcription.to_string(),
            "Transcription failed: invalid audio format"
        );

        let generation = VoiceLoopError::Generation {
            message: "context overflow".to_string(),
        };
        assert_eq!(
            generation.to_string(),
            "Generation failed: context overflow"
        );

        let synthesis = VoiceLoopError::Synthesis {
            message: "vocoder busy".to_string(),
        };
        assert_eq!(synthesis.to_string(), "Synthesis failed: vocoder busy");
    }

    #[test]
    fn test_audio_errors_display() {
        let capture = VoiceLoopError::AudioCapture {
            message: "buffer overflow".to_string(),
        };
        assert_eq!(capture.to_string(), "Audio capture failed: buffer overflow");

        let playback = VoiceLoopError::Playback {
            message: "device gone".to_string(),
        };
        assert_eq!(playback.to_string(), "Audio playback failed: device gone");
    }

    #[test]
    fn test_cancellation_timeout_display() {
        let error = VoiceLoopError::CancellationTimeout {
            timeout_ms: 5000,
            turn_id: 7,
        };
        assert_eq!(
            error.to_string(),
            "Shutdown exceeded 5000ms waiting for turn 7 to finish"
        );
    }

    #[test]
    fn test_cleanup_display() {
        let error = VoiceLoopError::Cleanup {
            components: "generator, synthesizer".to_string(),
            messages: "socket closed; device busy".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cleanup failed for generator, synthesizer: socket closed; device busy"
        );
    }

    #[test]
    fn test_already_running_display() {
        assert_eq!(
            VoiceLoopError::AlreadyRunning.to_string(),
            "Pipeline is already running"
        );
    }

    #[test]
    fn test_other_display() {
        let error = VoiceLoopError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoiceLoopError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: VoiceLoopError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);

        fn returns_error() -> Result<i32> {
            Err(VoiceLoopError::Other("test error".to_string()))
        }
        assert!(returns_error().is_err());
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: VoiceLoopError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoiceLoopError>();
        assert_sync::<VoiceLoopError>();
    }

    #[test]
    fn test_error_debug_format() {
        let error = VoiceLoopError::Configuration {
            identifier: "nope-model".to_string(),
        };
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("Configuration"));
        assert!(debug_str.contains("nope-model"));
    }
}
