use crate::capability::STREAM_BUFFER;
use crate::error::{Result, VoiceLoopError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Text generation capability.
///
/// Implementations may hold model resources; the pipeline calls `release`
/// exactly once when it stops.
pub trait Generator: Send + Sync {
    /// Generate a complete response for the prompt.
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Stream a response incrementally.
    ///
    /// The returned sequence is finite and not restartable. Chunks arrive in
    /// order and are delivered exactly once; an `Err` item ends the stream.
    fn stream_generate(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>>;

    /// Stop producing further chunks.
    ///
    /// Out-of-band: callable from any task while a stream is live. Stops with
    /// bounded latency rather than instantaneously; implementations must
    /// document the maximum number of chunks that may still be emitted after
    /// the call returns, and release any held generation resources.
    fn cancel_generation(&self);

    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;

    /// Release generation resources. Called exactly once at shutdown.
    fn release(&self) -> Result<()>;
}

/// Implement Generator for Arc<T> to allow sharing across tasks.
impl<T: Generator> Generator for Arc<T> {
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }

    fn stream_generate(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        (**self).stream_generate(prompt)
    }

    fn cancel_generation(&self) {
        (**self).cancel_generation()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn release(&self) -> Result<()> {
        (**self).release()
    }
}

/// Mock generator for testing.
///
/// After `cancel_generation` returns, at most one further chunk is emitted.
#[derive(Clone)]
pub struct MockGenerator {
    model_id: String,
    chunks: Vec<String>,
    chunk_delay: Duration,
    should_fail: bool,
    fail_after: Option<usize>,
    fail_release: bool,
    cancelled: Arc<AtomicBool>,
    cancel_calls: Arc<AtomicU32>,
    release_calls: Arc<AtomicU32>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerator {
    /// Create a new mock generator with default settings
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            chunks: vec!["mock response".to_string()],
            chunk_delay: Duration::ZERO,
            should_fail: false,
            fail_after: None,
            fail_release: false,
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_calls: Arc::new(AtomicU32::new(0)),
            release_calls: Arc::new(AtomicU32::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a single-chunk response
    pub fn with_response(mut self, response: &str) -> Self {
        self.chunks = vec![response.to_string()];
        self
    }

    /// Configure the chunks the streaming mode yields
    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Sleep between streamed chunks, simulating generation pacing
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Configure the mock to fail on generate / at stream start
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Emit `count` chunks, then an error item
    pub fn with_failure_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Configure the mock to fail on release
    pub fn with_release_failure(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Number of times `cancel_generation` has been called.
    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Number of times `release` has been called.
    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Prompts seen by either generation mode, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record_prompt(&self, prompt: &str) {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
    }

    fn generation_error() -> VoiceLoopError {
        VoiceLoopError::Generation {
            message: "mock generation failure".to_string(),
        }
    }
}

impl Generator for MockGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.record_prompt(prompt);
        if self.should_fail {
            return Err(Self::generation_error());
        }
        Ok(self.chunks.concat())
    }

    fn stream_generate(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        self.record_prompt(prompt);
        if self.should_fail {
            return Err(Self::generation_error());
        }

        // Cancellation is scoped to the stream; a fresh stream starts clean.
        self.cancelled.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = self.clone();
        tokio::spawn(async move {
            for (index, chunk) in this.chunks.iter().enumerate() {
                if this.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(limit) = this.fail_after
                    && index == limit
                {
                    let _ = tx.send(Err(Self::generation_error())).await;
                    return;
                }
                if !this.chunk_delay.is_zero() {
                    tokio::time::sleep(this.chunk_delay).await;
                }
                if this.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(Ok(chunk.clone())).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    fn cancel_generation(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn release(&self) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(Self::generation_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_concatenates_chunks() {
        let generator = MockGenerator::new("mock-chat").with_chunks(&["Hello, ", "world"]);
        assert_eq!(generator.generate("hi").unwrap(), "Hello, world");
    }

    #[test]
    fn test_generate_failure() {
        let generator = MockGenerator::new("mock-chat").with_failure();
        assert!(matches!(
            generator.generate("hi"),
            Err(VoiceLoopError::Generation { .. })
        ));
    }

    #[test]
    fn test_prompts_recorded() {
        let generator = MockGenerator::new("mock-chat");
        generator.generate("first").unwrap();
        generator.generate("second").unwrap();
        assert_eq!(generator.prompts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_stream_yields_chunks_in_order() {
        let generator = MockGenerator::new("mock-chat").with_chunks(&["a", "b", "c"]);
        let mut rx = generator.stream_generate("hi").unwrap();

        let mut collected = Vec::new();
        while let Some(item) = rx.recv().await {
            collected.push(item.unwrap());
        }
        assert_eq!(collected, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stream_fails_at_start_when_configured() {
        let generator = MockGenerator::new("mock-chat").with_failure();
        assert!(generator.stream_generate("hi").is_err());
    }

    #[tokio::test]
    async fn test_stream_mid_stream_error_ends_stream() {
        let generator = MockGenerator::new("mock-chat")
            .with_chunks(&["a", "b", "c"])
            .with_failure_after(2);
        let mut rx = generator.stream_generate("hi").unwrap();

        assert_eq!(rx.recv().await.unwrap().unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "b");
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_stream_promptly() {
        let generator = MockGenerator::new("mock-chat")
            .with_chunks(&["a"; 100])
            .with_chunk_delay(Duration::from_millis(10));
        let mut rx = generator.stream_generate("hi").unwrap();

        // Let a chunk or two through, then cancel.
        let first = rx.recv().await;
        assert!(first.is_some());
        generator.cancel_generation();

        let mut after_cancel = 0;
        while let Some(item) = rx.recv().await {
            assert!(item.is_ok());
            after_cancel += 1;
        }
        assert!(
            after_cancel <= 1,
            "at most one chunk may follow cancellation, got {after_cancel}"
        );
        assert_eq!(generator.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn test_new_stream_after_cancel_starts_clean() {
        let generator = MockGenerator::new("mock-chat").with_chunks(&["x", "y"]);
        generator.cancel_generation();

        let mut rx = generator.stream_generate("hi").unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "x");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "y");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_release_counted() {
        let generator = MockGenerator::new("mock-chat");
        generator.release().unwrap();
        assert_eq!(generator.release_calls(), 1);
    }

    #[test]
    fn test_trait_is_object_safe() {
        let generator: Box<dyn Generator> =
            Box::new(MockGenerator::new("mock-chat").with_response("boxed"));
        assert_eq!(generator.generate("hi").unwrap(), "boxed");
        assert_eq!(generator.model_id(), "mock-chat");
    }
}
