//! Model registry: maps identifier strings to capability implementations.
//!
//! Identifiers take the form `<scheme>-<variant>` or `<scheme>://<variant>`
//! (e.g. `whisper-large-v3`, `ollama://mistral:7b`). The scheme selects a
//! registered factory; the variant and options are passed through to it.
//! Resolution happens at pipeline construction, so unsupported identifiers
//! fail fast rather than at first use.

use crate::capability::{
    Generator, MockGenerator, MockSynthesizer, MockTranscriber, Synthesizer, Transcriber,
};
use crate::config::{ComputeTarget, ModelSpec};
use crate::error::{Result, VoiceLoopError};
use std::collections::HashMap;
use std::sync::Arc;

/// A parsed model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelId<'a> {
    pub scheme: &'a str,
    pub variant: &'a str,
}

impl<'a> ModelId<'a> {
    /// Parse an identifier, failing on malformed input.
    pub fn parse(id: &'a str) -> Result<Self> {
        let (scheme, variant) = if let Some(split) = id.split_once("://") {
            split
        } else if let Some(split) = id.split_once('-') {
            split
        } else {
            return Err(VoiceLoopError::Configuration {
                identifier: id.to_string(),
            });
        };

        if scheme.is_empty() || variant.is_empty() {
            return Err(VoiceLoopError::Configuration {
                identifier: id.to_string(),
            });
        }

        Ok(Self { scheme, variant })
    }
}

type TranscriberFactory =
    Box<dyn Fn(&ModelSpec, ComputeTarget) -> Result<Arc<dyn Transcriber>> + Send + Sync>;
type GeneratorFactory =
    Box<dyn Fn(&ModelSpec, ComputeTarget) -> Result<Arc<dyn Generator>> + Send + Sync>;
type SynthesizerFactory =
    Box<dyn Fn(&ModelSpec, ComputeTarget) -> Result<Arc<dyn Synthesizer>> + Send + Sync>;

/// Registry of capability factories keyed by identifier scheme.
///
/// The core ships only the `mock` scheme; real backends register themselves
/// through the `register_*` methods before pipeline construction.
#[derive(Default)]
pub struct ModelRegistry {
    transcribers: HashMap<String, TranscriberFactory>,
    generators: HashMap<String, GeneratorFactory>,
    synthesizers: HashMap<String, SynthesizerFactory>,
}

impl ModelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `mock` scheme for all three capabilities.
    ///
    /// Mock behavior is tuned through spec options: `response` sets the
    /// transcript/response text.
    pub fn with_mock_models() -> Self {
        let mut registry = Self::new();

        registry.register_transcriber("mock", |spec, _compute| {
            let mut mock = MockTranscriber::new(&spec.id);
            if let Some(response) = spec.option("response") {
                mock = mock.with_response(response);
            }
            Ok(Arc::new(mock))
        });

        registry.register_generator("mock", |spec, _compute| {
            let mut mock = MockGenerator::new(&spec.id);
            if let Some(response) = spec.option("response") {
                mock = mock.with_response(response);
            }
            Ok(Arc::new(mock))
        });

        registry.register_synthesizer("mock", |spec, _compute| {
            Ok(Arc::new(MockSynthesizer::new(&spec.id)))
        });

        registry
    }

    pub fn register_transcriber(
        &mut self,
        scheme: &str,
        factory: impl Fn(&ModelSpec, ComputeTarget) -> Result<Arc<dyn Transcriber>>
        + Send
        + Sync
        + 'static,
    ) {
        self.transcribers
            .insert(scheme.to_string(), Box::new(factory));
    }

    pub fn register_generator(
        &mut self,
        scheme: &str,
        factory: impl Fn(&ModelSpec, ComputeTarget) -> Result<Arc<dyn Generator>>
        + Send
        + Sync
        + 'static,
    ) {
        self.generators.insert(scheme.to_string(), Box::new(factory));
    }

    pub fn register_synthesizer(
        &mut self,
        scheme: &str,
        factory: impl Fn(&ModelSpec, ComputeTarget) -> Result<Arc<dyn Synthesizer>>
        + Send
        + Sync
        + 'static,
    ) {
        self.synthesizers
            .insert(scheme.to_string(), Box::new(factory));
    }

    pub fn resolve_transcriber(
        &self,
        spec: &ModelSpec,
        compute: ComputeTarget,
    ) -> Result<Arc<dyn Transcriber>> {
        let id = ModelId::parse(&spec.id)?;
        let factory =
            self.transcribers
                .get(id.scheme)
                .ok_or_else(|| VoiceLoopError::Configuration {
                    identifier: spec.id.clone(),
                })?;
        factory(spec, compute)
    }

    pub fn resolve_generator(
        &self,
        spec: &ModelSpec,
        compute: ComputeTarget,
    ) -> Result<Arc<dyn Generator>> {
        let id = ModelId::parse(&spec.id)?;
        let factory =
            self.generators
                .get(id.scheme)
                .ok_or_else(|| VoiceLoopError::Configuration {
                    identifier: spec.id.clone(),
                })?;
        factory(spec, compute)
    }

    pub fn resolve_synthesizer(
        &self,
        spec: &ModelSpec,
        compute: ComputeTarget,
    ) -> Result<Arc<dyn Synthesizer>> {
        let id = ModelId::parse(&spec.id)?;
        let factory =
            self.synthesizers
                .get(id.scheme)
                .ok_or_else(|| VoiceLoopError::Configuration {
                    identifier: spec.id.clone(),
                })?;
        factory(spec, compute)
    }
}
