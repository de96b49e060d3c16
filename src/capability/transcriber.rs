use crate::audio::AudioBuffer;
use crate::capability::STREAM_BUFFER;
use crate::error::{Result, VoiceLoopError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Speech-to-text capability.
///
/// This trait allows swapping implementations (real backends vs mock).
/// Implementations may hold model or device resources; the pipeline calls
/// `release` exactly once when it stops.
pub trait Transcriber: Send + Sync {
    /// Transcribe one complete audio buffer.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM
    ///
    /// # Returns
    /// Transcribed text or error
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String>;

    /// Transcribe an audio stream incrementally.
    ///
    /// Yields partial transcripts as buffers arrive. The producer side
    /// controls termination: the output stream ends when `audio_rx` closes.
    /// Restartable only by creating a new stream.
    fn stream_transcribe(&self, audio_rx: mpsc::Receiver<AudioBuffer>) -> mpsc::Receiver<String>;

    /// Identifier of the loaded model.
    fn model_id(&self) -> &str;

    /// Release model/device resources. Called exactly once at shutdown.
    fn release(&self) -> Result<()>;
}

/// Implement Transcriber for Arc<T> to allow sharing across tasks.
impl<T: Transcriber> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn stream_transcribe(&self, audio_rx: mpsc::Receiver<AudioBuffer>) -> mpsc::Receiver<String> {
        (**self).stream_transcribe(audio_rx)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn release(&self) -> Result<()> {
        (**self).release()
    }
}

/// Mock transcriber for testing
#[derive(Clone)]
pub struct MockTranscriber {
    model_id: String,
    responses: Vec<String>,
    next_response: Arc<AtomicUsize>,
    should_fail: bool,
    fail_release: bool,
    release_calls: Arc<AtomicU32>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            responses: vec!["mock transcription".to_string()],
            next_response: Arc::new(AtomicUsize::new(0)),
            should_fail: false,
            fail_release: false,
            release_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses = vec![response.to_string()];
        self
    }

    /// Configure the mock to return a sequence of responses.
    /// The last entry repeats once the sequence is exhausted.
    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to fail on release
    pub fn with_release_failure(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Number of times `release` has been called.
    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &AudioBuffer) -> Result<String> {
        if self.should_fail {
            return Err(VoiceLoopError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        let index = self.next_response.fetch_add(1, Ordering::SeqCst);
        let index = index.min(self.responses.len().saturating_sub(1));
        Ok(self.responses.get(index).cloned().unwrap_or_default())
    }

    fn stream_transcribe(
        &self,
        mut audio_rx: mpsc::Receiver<AudioBuffer>,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(buffer) = audio_rx.recv().await {
                let partial = match this.transcribe(&buffer) {
                    Ok(text) => text,
                    Err(_) => break,
                };
                if tx.send(partial).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn release(&self) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(VoiceLoopError::Transcription {
                message: "mock release failure".to_string(),
            });
        }
        Ok(())
    }
}
