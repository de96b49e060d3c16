//! Audio capture collaborator interface.

use crate::audio::AudioBuffer;
use crate::error::{Result, VoiceLoopError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Pluggable audio input for the pipeline.
///
/// Implementations own the device (or file) and segment the incoming stream
/// into utterances. The producer side controls termination: `next_segment`
/// returning `None` ends the capture stream for good.
pub trait CaptureSource: Send + 'static {
    /// Prepare the device for capture.
    fn start(&mut self) -> Result<()>;

    /// Block until the next utterance is available.
    ///
    /// Returns `Ok(None)` when the source is exhausted or has been stopped.
    fn next_segment(&mut self) -> Result<Option<AudioBuffer>>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<()>;

    /// True for sources with a natural end (files, fixtures).
    fn is_finite(&self) -> bool {
        false
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "capture"
    }
}

/// Scripted capture source for tests.
pub struct MockCaptureSource {
    segments: VecDeque<AudioBuffer>,
    segment_delay: Duration,
    fail_on_start: bool,
    started: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl MockCaptureSource {
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            segment_delay: Duration::ZERO,
            fail_on_start: false,
            started: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue one utterance.
    pub fn with_segment(mut self, segment: AudioBuffer) -> Self {
        self.segments.push_back(segment);
        self
    }

    /// Queue a sequence of utterances.
    pub fn with_segments(mut self, segments: Vec<AudioBuffer>) -> Self {
        self.segments.extend(segments);
        self
    }

    /// Sleep before yielding each segment, simulating a slow microphone.
    pub fn with_segment_delay(mut self, delay: Duration) -> Self {
        self.segment_delay = delay;
        self
    }

    /// Fail the `start` call.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    /// Handle observing whether `start` was called.
    pub fn started_flag(&self) -> Arc<AtomicBool> {
        self.started.clone()
    }

    /// Handle observing whether `stop` was called.
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.fail_on_start {
            return Err(VoiceLoopError::AudioCapture {
                message: "mock capture failure".to_string(),
            });
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn next_segment(&mut self) -> Result<Option<AudioBuffer>> {
        if !self.segment_delay.is_zero() {
            std::thread::sleep(self.segment_delay);
        }
        Ok(self.segments.pop_front())
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mock-capture"
    }
}
