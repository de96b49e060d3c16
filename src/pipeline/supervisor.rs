//! Pipeline supervisor: lifecycle, the main loop, and the shared run state.

use crate::audio::{AudioBuffer, AudioSink, CaptureSource};
use crate::capability::{Generator, Synthesizer, Transcriber};
use crate::config::PipelineConfig;
use crate::error::{Result, VoiceLoopError};
use crate::pipeline::interrupt::InterruptController;
use crate::pipeline::state::{RunPhase, StateCell};
use crate::pipeline::turn::{DrivenTurn, TurnCoordinator, TurnOutcome};
use crate::pipeline::types::{ConversationHistory, ConversationTurn, TurnInput, TurnStatus};
use crate::registry::ModelRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Consecutive capture failures tolerated before the pump gives up.
const MAX_CAPTURE_ERRORS: u32 = 3;

/// Bound on waiting for the capture pump to wind down after the loop exits.
const PUMP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// The duplex voice pipeline:
/// capture → Transcriber → Generator → Synthesizer → playback.
///
/// Owns the three capability implementations, the shared run state, and the
/// bounded conversation history. Turns run strictly one at a time; the
/// supervisor never starts a new turn before the previous one reaches a
/// terminal status.
pub struct VoicePipeline {
    config: PipelineConfig,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
    state: Arc<StateCell>,
    interrupts: InterruptController,
    history: Mutex<ConversationHistory>,
    next_turn_id: AtomicU64,
    released: Mutex<bool>,
}

impl VoicePipeline {
    /// Build a pipeline from configuration and a registry.
    ///
    /// Fail-fast and atomic: an unresolvable identifier aborts construction
    /// with a `Configuration` error naming it, releasing anything already
    /// built. A partially constructed pipeline never escapes.
    pub fn new(config: PipelineConfig, registry: &ModelRegistry) -> Result<Self> {
        let transcriber = registry.resolve_transcriber(&config.transcriber, config.compute)?;

        let generator = match registry.resolve_generator(&config.generator, config.compute) {
            Ok(generator) => generator,
            Err(e) => {
                best_effort_release("transcriber", transcriber.release());
                return Err(e);
            }
        };

        let synthesizer = match registry.resolve_synthesizer(&config.synthesizer, config.compute) {
            Ok(synthesizer) => synthesizer,
            Err(e) => {
                best_effort_release("transcriber", transcriber.release());
                best_effort_release("generator", generator.release());
                return Err(e);
            }
        };

        info!(
            transcriber = %config.transcriber.id,
            generator = %config.generator.id,
            synthesizer = %config.synthesizer.id,
            compute = config.compute.as_str(),
            "pipeline constructed"
        );

        let state = Arc::new(StateCell::new());
        let interrupts = InterruptController::new(state.clone());
        let history = Mutex::new(ConversationHistory::new(config.history_limit));

        Ok(Self {
            config,
            transcriber,
            generator,
            synthesizer,
            state,
            interrupts,
            history,
            next_turn_id: AtomicU64::new(0),
            released: Mutex::new(false),
        })
    }

    /// The configuration the pipeline was built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// True while the main loop may start turns.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Id of the turn currently in a non-terminal status, if any.
    pub fn active_turn_id(&self) -> Option<u64> {
        self.state.read(|s| s.active_turn)
    }

    /// Handle for requesting interrupts from other tasks or threads.
    pub fn interrupt_controller(&self) -> InterruptController {
        self.interrupts.clone()
    }

    /// Request abandonment of the active turn. Idempotent.
    pub fn interrupt(&self) {
        self.interrupts.request_interrupt();
    }

    /// Snapshot of recorded turns, oldest first.
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Run the main loop until `stop()` is called or a finite capture source
    /// is exhausted.
    ///
    /// Blocks the calling task; drive it from a spawned task when `stop()` or
    /// `interrupt()` must be reachable concurrently.
    pub async fn run(
        &self,
        mut capture: Box<dyn CaptureSource>,
        mut sink: Box<dyn AudioSink>,
    ) -> Result<()> {
        enum StartDecision {
            Started,
            AlreadyRunning,
            Stopped,
        }

        let decision = self.state.update(|s| match s.phase {
            RunPhase::Idle => {
                s.phase = RunPhase::Running;
                StartDecision::Started
            }
            RunPhase::Running => StartDecision::AlreadyRunning,
            RunPhase::Stopped => StartDecision::Stopped,
        });
        match decision {
            StartDecision::Started => {}
            StartDecision::AlreadyRunning => return Err(VoiceLoopError::AlreadyRunning),
            // A stopped pipeline never starts another turn.
            StartDecision::Stopped => return Ok(()),
        }

        if let Err(e) = capture.start() {
            self.state.update(|s| s.phase = RunPhase::Idle);
            return Err(e);
        }

        // Capture pump: runs concurrently with the turn in flight and never
        // blocks on it beyond channel backpressure.
        let (capture_tx, mut capture_rx) = mpsc::channel(self.config.capture_buffer.max(1));
        let pump_state = self.state.clone();
        let pump = tokio::task::spawn_blocking(move || {
            let mut consecutive_errors: u32 = 0;
            while pump_state.is_running() {
                match capture.next_segment() {
                    Ok(Some(segment)) => {
                        consecutive_errors = 0;
                        if capture_tx.blocking_send(segment).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        consecutive_errors += 1;
                        warn!(error = %e, attempt = consecutive_errors, "audio capture failed");
                        if consecutive_errors >= MAX_CAPTURE_ERRORS {
                            break;
                        }
                    }
                }
            }
            if let Err(e) = capture.stop() {
                warn!(error = %e, "failed to stop audio capture");
            }
        });

        let coordinator = TurnCoordinator::new(
            self.transcriber.clone(),
            self.generator.clone(),
            self.synthesizer.clone(),
            self.state.clone(),
            self.config.text_buffer,
        );

        loop {
            let turn_id = self.next_turn_id.fetch_add(1, Ordering::Relaxed);
            let context = if self.config.context_turns > 0 {
                self.history
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .context(self.config.context_turns)
            } else {
                Vec::new()
            };

            // Claiming the turn and checking the phase share one critical
            // section, so stop() either sees no active turn or waits for
            // this one.
            let started = self.state.update(|s| {
                if s.phase != RunPhase::Running {
                    return false;
                }
                s.active_turn = Some(turn_id);
                true
            });
            if !started {
                break;
            }
            let outcome = coordinator
                .drive(turn_id, &mut capture_rx, sink.as_mut(), &context)
                .await;
            self.state.update(|s| s.active_turn = None);

            match outcome {
                TurnOutcome::Finished(DrivenTurn {
                    turn,
                    interrupt_generation,
                }) => {
                    match turn.status {
                        TurnStatus::Interrupted => info!(turn = turn.id, "turn interrupted"),
                        TurnStatus::Failed => {
                            warn!(turn = turn.id, failure = ?turn.failure, "turn failed")
                        }
                        _ => debug!(
                            turn = turn.id,
                            chunks = turn.response_chunks.len(),
                            "turn completed"
                        ),
                    }
                    self.history
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(turn);

                    // Cleanup done; acknowledge the interrupt we served. A
                    // request that landed during cleanup survives and the
                    // next turn observes it immediately.
                    if let Some(generation) = interrupt_generation
                        && !self.interrupts.acknowledge(generation)
                    {
                        debug!("newer interrupt arrived during cleanup, carrying over");
                    }
                }
                TurnOutcome::CaptureClosed => {
                    info!("capture stream closed");
                    break;
                }
            }
        }

        // Natural exit (capture exhaustion) returns to Idle; an exit caused
        // by stop() leaves the phase Stopped. The interrupt flag never
        // outlives the running phase.
        self.state.update(|s| {
            if s.phase == RunPhase::Running {
                s.phase = RunPhase::Idle;
                s.interrupt_requested = false;
            }
        });

        if let Some(audio) = sink.finish() {
            debug!(samples = audio.samples.len(), "playback sink finished");
        }

        // Closing the channel unblocks the pump; detach it if it is stuck in
        // a blocking device read.
        drop(capture_rx);
        if tokio::time::timeout(PUMP_SHUTDOWN_TIMEOUT, pump).await.is_err() {
            warn!("capture pump still busy at shutdown, detaching");
        }

        Ok(())
    }

    /// Stop the pipeline.
    ///
    /// Clears the running state, waits up to the configured timeout for the
    /// active turn to reach a terminal status, then releases all three
    /// capabilities exactly once, tolerating individual cleanup failures.
    /// A second call is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let first = self.state.update(|s| {
            if s.phase == RunPhase::Stopped {
                return false;
            }
            s.phase = RunPhase::Stopped;
            // The interrupt flag cannot outlive `running`.
            s.interrupt_requested = false;
            true
        });
        if !first {
            return Ok(());
        }

        let timeout = self.config.stop_timeout;
        let drained = self
            .state
            .wait_for(timeout, |s| s.active_turn.is_none())
            .await;
        let stuck_turn = self.state.read(|s| s.active_turn);

        // Forced teardown proceeds regardless of stage completion.
        let failures = self.release_all();

        if !drained {
            return Err(VoiceLoopError::CancellationTimeout {
                timeout_ms: timeout.as_millis() as u64,
                turn_id: stuck_turn.unwrap_or_default(),
            });
        }

        if failures.is_empty() {
            info!("pipeline stopped");
            Ok(())
        } else {
            let components = failures
                .iter()
                .map(|(component, _)| *component)
                .collect::<Vec<_>>()
                .join(", ");
            let messages = failures
                .iter()
                .map(|(_, message)| message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            Err(VoiceLoopError::Cleanup {
                components,
                messages,
            })
        }
    }

    /// Release each capability exactly once, collecting failures instead of
    /// short-circuiting.
    fn release_all(&self) -> Vec<(&'static str, String)> {
        let mut released = self.released.lock().unwrap_or_else(|e| e.into_inner());
        if *released {
            return Vec::new();
        }
        *released = true;

        let mut failures = Vec::new();
        for (component, result) in [
            ("transcriber", self.transcriber.release()),
            ("generator", self.generator.release()),
            ("synthesizer", self.synthesizer.release()),
        ] {
            if let Err(e) = result {
                warn!(component, error = %e, "cleanup failed");
                failures.push((component, e.to_string()));
            }
        }
        failures
    }

    /// Synchronous, non-streaming convenience path for testing and batch use.
    ///
    /// Bypasses the loop and interrupt machinery entirely: transcribe →
    /// generate → synthesize as three blocking calls.
    pub fn process_single_turn(&self, input: TurnInput) -> Result<(String, AudioBuffer)> {
        let text = match input {
            TurnInput::Text(text) => text,
            TurnInput::Audio(audio) => self.transcriber.transcribe(&audio)?,
        };
        let response = self.generator.generate(&text)?;
        let audio = self.synthesizer.synthesize(&response)?;
        Ok((response, audio))
    }
}

fn best_effort_release(component: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(component, error = %e, "cleanup failed during aborted construction");
    }
}
