//! voiceloop - streaming orchestration core for real-time duplex voice
//! interaction.
//!
//! Coordinates speech-to-text, language-model generation, and text-to-speech
//! as concurrent, cancellable streams with a coherent interruption protocol.
//! Model backends and audio devices are external collaborators reached
//! through capability traits.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod capability;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;

// Core traits (source → stages → sink)
pub use audio::{AudioBuffer, AudioSink, CaptureSource, CollectorSink, MockCaptureSource, NullSink};
pub use capability::{
    Generator, MockGenerator, MockSynthesizer, MockTranscriber, Synthesizer, Transcriber,
};

// Pipeline
pub use pipeline::{
    ConversationHistory, ConversationTurn, InterruptController, StageKind, TurnFailure, TurnInput,
    TurnStatus, VoicePipeline,
};

// Registry
pub use registry::{ModelId, ModelRegistry};

// Config
pub use config::{ComputeTarget, Config, ModelSpec, PipelineConfig};

// Error handling
pub use error::{Result, VoiceLoopError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
