//! Capability interfaces for the three model-backed stages.
//!
//! Each capability offers a blocking whole-input mode and a streaming mode.
//! Streams are bounded mpsc channels: pull-based lazy sequences with
//! backpressure, ended by the producer. Cancellation is part of the contract
//! on the generator and synthesizer, not an optional extension.

pub mod generator;
pub mod synthesizer;
pub mod transcriber;

pub use generator::{Generator, MockGenerator};
pub use synthesizer::{MockSynthesizer, Synthesizer};
pub use transcriber::{MockTranscriber, Transcriber};

/// Buffer size for streams created by capability implementations.
pub(crate) const STREAM_BUFFER: usize = 32;
