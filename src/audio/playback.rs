//! Audio playback collaborator interface.

use crate::audio::AudioBuffer;
use crate::error::Result;
use std::sync::{Arc, Mutex};

/// Pluggable audio output handler for the pipeline.
/// Pairs with CaptureSource for input - this handles synthesized audio.
pub trait AudioSink: Send + 'static {
    /// Queue one synthesized chunk for playback.
    fn play(&mut self, chunk: &AudioBuffer) -> Result<()>;

    /// Discard queued-but-unplayed audio. Returns how many chunks were dropped.
    fn discard_pending(&mut self) -> usize {
        0
    }

    /// Called on pipeline shutdown. Return accumulated audio if applicable.
    fn finish(&mut self) -> Option<AudioBuffer> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "playback"
    }
}

/// Collects played chunks in memory (tests, batch use).
///
/// Clones share the same storage, so a handle kept outside the pipeline
/// observes everything the pipeline played.
#[derive(Clone, Default)]
pub struct CollectorSink {
    chunks: Arc<Mutex<Vec<AudioBuffer>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the chunks played so far.
    pub fn chunks(&self) -> Vec<AudioBuffer> {
        self.chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of chunks played so far.
    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioSink for CollectorSink {
    fn play(&mut self, chunk: &AudioBuffer) -> Result<()> {
        self.chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(chunk.clone());
        Ok(())
    }

    fn finish(&mut self) -> Option<AudioBuffer> {
        let chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        if chunks.is_empty() {
            return None;
        }
        let mut combined = AudioBuffer::new(Vec::new(), chunks[0].sample_rate);
        for chunk in chunks.iter() {
            combined.extend(chunk);
        }
        Some(combined)
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Discards all audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&mut self, _chunk: &AudioBuffer) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_accumulates_in_order() {
        let mut sink = CollectorSink::new();
        sink.play(&AudioBuffer::from_samples(vec![1, 2])).unwrap();
        sink.play(&AudioBuffer::from_samples(vec![3])).unwrap();

        let chunks = sink.chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].samples, vec![1, 2]);
        assert_eq!(chunks[1].samples, vec![3]);
    }

    #[test]
    fn test_collector_handle_shares_storage() {
        let sink = CollectorSink::new();
        let handle = sink.clone();

        let mut boxed: Box<dyn AudioSink> = Box::new(sink);
        boxed.play(&AudioBuffer::from_samples(vec![9])).unwrap();

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.chunks()[0].samples, vec![9]);
    }

    #[test]
    fn test_collector_finish_concatenates() {
        let mut sink = CollectorSink::new();
        sink.play(&AudioBuffer::from_samples(vec![1])).unwrap();
        sink.play(&AudioBuffer::from_samples(vec![2, 3])).unwrap();

        let combined = sink.finish().unwrap();
        assert_eq!(combined.samples, vec![1, 2, 3]);
    }

    #[test]
    fn test_collector_finish_empty_is_none() {
        let mut sink = CollectorSink::new();
        assert!(sink.finish().is_none());
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let mut sink = NullSink;
        sink.play(&AudioBuffer::from_samples(vec![1; 1000])).unwrap();
        assert_eq!(sink.discard_pending(), 0);
        assert!(sink.finish().is_none());
    }
}
