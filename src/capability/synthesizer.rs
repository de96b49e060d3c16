use crate::audio::AudioBuffer;
use crate::capability::STREAM_BUFFER;
use crate::error::{Result, VoiceLoopError};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Text-to-speech capability.
///
/// Implementations may hold model or device resources; the pipeline calls
/// `release` exactly once when it stops.
pub trait Synthesizer: Send + Sync {
    /// Synthesize one complete text into audio.
    fn synthesize(&self, text: &str) -> Result<AudioBuffer>;

    /// Synthesize a stream of text chunks into a stream of audio chunks.
    ///
    /// Output chunks preserve the time-order of the input. The stream ends
    /// after the last input chunk has been synthesized and `text_rx` closed.
    fn stream_synthesize(
        &self,
        text_rx: mpsc::Receiver<String>,
    ) -> mpsc::Receiver<Result<AudioBuffer>>;

    /// Discard buffered-but-unplayed audio.
    ///
    /// Returns the number of chunks that were accepted but never emitted.
    /// Stops with bounded latency; implementations must document the maximum
    /// number of chunks that may still be emitted after the call returns.
    fn stop_playing(&self) -> usize;

    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;

    /// Release synthesis resources. Called exactly once at shutdown.
    fn release(&self) -> Result<()>;
}

/// Implement Synthesizer for Arc<T> to allow sharing across tasks.
impl<T: Synthesizer> Synthesizer for Arc<T> {
    fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        (**self).synthesize(text)
    }

    fn stream_synthesize(
        &self,
        text_rx: mpsc::Receiver<String>,
    ) -> mpsc::Receiver<Result<AudioBuffer>> {
        (**self).stream_synthesize(text_rx)
    }

    fn stop_playing(&self) -> usize {
        (**self).stop_playing()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn release(&self) -> Result<()> {
        (**self).release()
    }
}

/// Mock synthesizer for testing.
///
/// Emits a fixed buffer per input chunk. After `stop_playing` returns, at
/// most one further chunk is emitted.
#[derive(Clone)]
pub struct MockSynthesizer {
    model_id: String,
    buffer: AudioBuffer,
    chunk_delay: Duration,
    should_fail: bool,
    fail_after: Option<usize>,
    fail_release: bool,
    stopped: Arc<AtomicBool>,
    stop_calls: Arc<AtomicU32>,
    release_calls: Arc<AtomicU32>,
    accepted: Arc<AtomicUsize>,
    emitted: Arc<AtomicUsize>,
    received_texts: Arc<Mutex<Vec<String>>>,
}

impl MockSynthesizer {
    /// Create a new mock synthesizer with default settings
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            buffer: AudioBuffer::silence(100, AudioBuffer::DEFAULT_SAMPLE_RATE),
            chunk_delay: Duration::ZERO,
            should_fail: false,
            fail_after: None,
            fail_release: false,
            stopped: Arc::new(AtomicBool::new(false)),
            stop_calls: Arc::new(AtomicU32::new(0)),
            release_calls: Arc::new(AtomicU32::new(0)),
            accepted: Arc::new(AtomicUsize::new(0)),
            emitted: Arc::new(AtomicUsize::new(0)),
            received_texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the fixed buffer returned for every chunk
    pub fn with_buffer(mut self, buffer: AudioBuffer) -> Self {
        self.buffer = buffer;
        self
    }

    /// Sleep before emitting each audio chunk, simulating synthesis pacing
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Configure the mock to fail on synthesize / per-chunk
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Emit `count` audio chunks, then an error item
    pub fn with_failure_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Configure the mock to fail on release
    pub fn with_release_failure(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Number of times `stop_playing` has been called.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of times `release` has been called.
    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Text chunks received by the streaming mode, in arrival order.
    pub fn received_texts(&self) -> Vec<String> {
        self.received_texts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn synthesis_error() -> VoiceLoopError {
        VoiceLoopError::Synthesis {
            message: "mock synthesis failure".to_string(),
        }
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        self.received_texts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        if self.should_fail {
            return Err(Self::synthesis_error());
        }
        Ok(self.buffer.clone())
    }

    fn stream_synthesize(
        &self,
        mut text_rx: mpsc::Receiver<String>,
    ) -> mpsc::Receiver<Result<AudioBuffer>> {
        // Stop state and counters are scoped to the stream; a fresh stream
        // starts clean.
        self.stopped.store(false, Ordering::SeqCst);
        self.accepted.store(0, Ordering::SeqCst);
        self.emitted.store(0, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(text) = text_rx.recv().await {
                this.accepted.fetch_add(1, Ordering::SeqCst);
                this.received_texts
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(text);

                if this.stopped.load(Ordering::SeqCst) {
                    continue; // drain input without emitting
                }
                if this.should_fail {
                    let _ = tx.send(Err(Self::synthesis_error())).await;
                    return;
                }
                if let Some(limit) = this.fail_after
                    && this.emitted.load(Ordering::SeqCst) == limit
                {
                    let _ = tx.send(Err(Self::synthesis_error())).await;
                    return;
                }
                if !this.chunk_delay.is_zero() {
                    tokio::time::sleep(this.chunk_delay).await;
                }
                if this.stopped.load(Ordering::SeqCst) {
                    continue;
                }
                if tx.send(Ok(this.buffer.clone())).await.is_err() {
                    break;
                }
                this.emitted.fetch_add(1, Ordering::SeqCst);
            }
        });
        rx
    }

    fn stop_playing(&self) -> usize {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        let accepted = self.accepted.load(Ordering::SeqCst);
        let emitted = self.emitted.load(Ordering::SeqCst);
        accepted.saturating_sub(emitted)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn release(&self) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(Self::synthesis_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_returns_fixed_buffer() {
        let buffer = AudioBuffer::from_samples(vec![7; 320]);
        let synthesizer = MockSynthesizer::new("mock-voice").with_buffer(buffer.clone());
        assert_eq!(synthesizer.synthesize("hello").unwrap(), buffer);
    }

    #[test]
    fn test_synthesize_failure() {
        let synthesizer = MockSynthesizer::new("mock-voice").with_failure();
        assert!(matches!(
            synthesizer.synthesize("hello"),
            Err(VoiceLoopError::Synthesis { .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_one_audio_chunk_per_text_chunk() {
        let synthesizer = MockSynthesizer::new("mock-voice");

        let (text_tx, text_rx) = mpsc::channel(4);
        let mut audio_rx = synthesizer.stream_synthesize(text_rx);

        text_tx.send("first ".to_string()).await.unwrap();
        text_tx.send("second".to_string()).await.unwrap();
        drop(text_tx);

        assert!(audio_rx.recv().await.unwrap().is_ok());
        assert!(audio_rx.recv().await.unwrap().is_ok());
        assert!(audio_rx.recv().await.is_none());

        assert_eq!(synthesizer.received_texts(), vec!["first ", "second"]);
    }

    #[tokio::test]
    async fn test_stream_preserves_input_order() {
        let synthesizer = MockSynthesizer::new("mock-voice");

        let (text_tx, text_rx) = mpsc::channel(8);
        let mut audio_rx = synthesizer.stream_synthesize(text_rx);

        for i in 0..5 {
            text_tx.send(format!("chunk-{i}")).await.unwrap();
        }
        drop(text_tx);

        let mut count = 0;
        while let Some(item) = audio_rx.recv().await {
            item.unwrap();
            count += 1;
        }
        assert_eq!(count, 5);
        assert_eq!(
            synthesizer.received_texts(),
            (0..5).map(|i| format!("chunk-{i}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_stop_playing_reports_unemitted() {
        let synthesizer =
            MockSynthesizer::new("mock-voice").with_chunk_delay(Duration::from_millis(50));

        let (text_tx, text_rx) = mpsc::channel(8);
        let mut audio_rx = synthesizer.stream_synthesize(text_rx);

        for i in 0..4 {
            text_tx.send(format!("chunk-{i}")).await.unwrap();
        }
        drop(text_tx);

        // First chunk arrives; wait for the next one to be accepted, then
        // stop mid-stream.
        assert!(audio_rx.recv().await.unwrap().is_ok());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let discarded = synthesizer.stop_playing();
        assert!(discarded >= 1, "expected pending chunks, got {discarded}");
        assert_eq!(synthesizer.stop_calls(), 1);

        // At most one chunk may still arrive after the stop call.
        let mut after_stop = 0;
        while let Some(item) = audio_rx.recv().await {
            assert!(item.is_ok());
            after_stop += 1;
        }
        assert!(
            after_stop <= 1,
            "at most one chunk may follow stop_playing, got {after_stop}"
        );
    }

    #[tokio::test]
    async fn test_stream_error_after_limit() {
        let synthesizer = MockSynthesizer::new("mock-voice").with_failure_after(1);

        let (text_tx, text_rx) = mpsc::channel(4);
        let mut audio_rx = synthesizer.stream_synthesize(text_rx);

        text_tx.send("a".to_string()).await.unwrap();
        text_tx.send("b".to_string()).await.unwrap();
        drop(text_tx);

        assert!(audio_rx.recv().await.unwrap().is_ok());
        assert!(audio_rx.recv().await.unwrap().is_err());
        assert!(audio_rx.recv().await.is_none());
    }

    #[test]
    fn test_release_counted() {
        let synthesizer = MockSynthesizer::new("mock-voice");
        synthesizer.release().unwrap();
        assert_eq!(synthesizer.release_calls(), 1);
    }

    #[test]
    fn test_trait_is_object_safe() {
        let synthesizer: Box<dyn Synthesizer> = Box::new(MockSynthesizer::new("mock-voice"));
        assert_eq!(synthesizer.model_id(), "mock-voice");
        assert!(synthesizer.synthesize("hello").is_ok());
    }
}
