use crate::error::{Result, VoiceLoopError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Compute target for model backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComputeTarget {
    #[default]
    Cuda,
    Cpu,
}

impl ComputeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeTarget::Cuda => "cuda",
            ComputeTarget::Cpu => "cpu",
        }
    }
}

impl FromStr for ComputeTarget {
    type Err = VoiceLoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Ok(ComputeTarget::Cuda),
            "cpu" => Ok(ComputeTarget::Cpu),
            other => Err(VoiceLoopError::ConfigInvalidValue {
                key: "compute".to_string(),
                message: format!("unknown compute target '{other}'"),
            }),
        }
    }
}

/// Model identifier plus opaque per-component options.
///
/// Option values are passed through to the backend factory untouched; the
/// core never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelSpec {
    pub id: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ModelSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Immutable pipeline configuration.
///
/// Created once at construction and owned by the supervisor; never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub transcriber: ModelSpec,
    pub generator: ModelSpec,
    pub synthesizer: ModelSpec,
    pub compute: ComputeTarget,
    /// Maximum turns kept in conversation history.
    pub history_limit: usize,
    /// Completed turns folded into the generator prompt (0 disables).
    pub context_turns: usize,
    /// Channel buffer sizes
    pub capture_buffer: usize,
    pub text_buffer: usize,
    pub audio_buffer: usize,
    /// Bound on `stop()` waiting for the active turn to finish.
    pub stop_timeout: Duration,
}

impl PipelineConfig {
    /// Creates a configuration with default limits for the given models.
    pub fn new(transcriber: ModelSpec, generator: ModelSpec, synthesizer: ModelSpec) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            compute: ComputeTarget::default(),
            history_limit: 32,
            context_turns: 0,
            capture_buffer: 16,
            text_buffer: 32,
            audio_buffer: 32,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(
            ModelSpec::new("mock-transcriber"),
            ModelSpec::new("mock-generator"),
            ModelSpec::new("mock-synthesizer"),
        )
    }
}

/// Root configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub pipeline: PipelineSettings,
}

/// Model selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    pub transcriber: String,
    pub generator: String,
    pub synthesizer: String,
    pub compute: ComputeTarget,
    pub transcriber_options: BTreeMap<String, String>,
    pub generator_options: BTreeMap<String, String>,
    pub synthesizer_options: BTreeMap<String, String>,
}

/// Orchestration tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub history_limit: usize,
    pub context_turns: usize,
    pub capture_buffer: usize,
    pub text_buffer: usize,
    pub audio_buffer: usize,
    /// Human-friendly duration, e.g. "5s" or "500ms".
    pub stop_timeout: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            transcriber: "whisper-base.en".to_string(),
            generator: "ollama://mistral:7b".to_string(),
            synthesizer: "piper-en-us".to_string(),
            compute: ComputeTarget::default(),
            transcriber_options: BTreeMap::new(),
            generator_options: BTreeMap::new(),
            synthesizer_options: BTreeMap::new(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_limit: 32,
            context_turns: 0,
            capture_buffer: 16,
            text_buffer: 32,
            audio_buffer: 32,
            stop_timeout: "5s".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOICELOOP_TRANSCRIBER → models.transcriber
    /// - VOICELOOP_GENERATOR → models.generator
    /// - VOICELOOP_SYNTHESIZER → models.synthesizer
    /// - VOICELOOP_COMPUTE → models.compute
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var("VOICELOOP_TRANSCRIBER")
            && !id.is_empty()
        {
            self.models.transcriber = id;
        }

        if let Ok(id) = std::env::var("VOICELOOP_GENERATOR")
            && !id.is_empty()
        {
            self.models.generator = id;
        }

        if let Ok(id) = std::env::var("VOICELOOP_SYNTHESIZER")
            && !id.is_empty()
        {
            self.models.synthesizer = id;
        }

        if let Ok(target) = std::env::var("VOICELOOP_COMPUTE")
            && !target.is_empty()
        {
            match target.parse::<ComputeTarget>() {
                Ok(compute) => self.models.compute = compute,
                Err(e) => tracing::warn!(error = %e, "ignoring VOICELOOP_COMPUTE"),
            }
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voiceloop/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voiceloop")
            .join("config.toml")
    }

    /// Lower the file configuration into the immutable in-memory form.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let stop_timeout = humantime::parse_duration(&self.pipeline.stop_timeout).map_err(|e| {
            VoiceLoopError::ConfigInvalidValue {
                key: "pipeline.stop_timeout".to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(PipelineConfig {
            transcriber: ModelSpec {
                id: self.models.transcriber.clone(),
                options: self.models.transcriber_options.clone(),
            },
            generator: ModelSpec {
                id: self.models.generator.clone(),
                options: self.models.generator_options.clone(),
            },
            synthesizer: ModelSpec {
                id: self.models.synthesizer.clone(),
                options: self.models.synthesizer_options.clone(),
            },
            compute: self.models.compute,
            history_limit: self.pipeline.history_limit,
            context_turns: self.pipeline.context_turns,
            capture_buffer: self.pipeline.capture_buffer.max(1),
            text_buffer: self.pipeline.text_buffer.max(1),
            audio_buffer: self.pipeline.audio_buffer.max(1),
            stop_timeout,
        })
    }
}
