//! Turn coordinator: drives one conversation turn through its stages.
//!
//! The generating→synthesizing→playing stretch is a pipelined fan-through:
//! generator chunks feed the synthesizer's input stream as they arrive while
//! synthesized audio drains to playback, so speech starts before generation
//! finishes. Every stage boundary races progress against control-state
//! changes through the shared cell.

use crate::audio::{AudioBuffer, AudioSink};
use crate::capability::{Generator, Synthesizer, Transcriber};
use crate::pipeline::state::{RunPhase, StateCell};
use crate::pipeline::types::{ConversationTurn, StageKind, TurnStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bound on draining the generator forwarder after the main loop exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Why the coordinator abandoned the turn.
enum Preemption {
    /// An interrupt with this generation is outstanding.
    Interrupt(u64),
    /// The pipeline left the running phase.
    Stop,
}

/// A turn driven to a terminal status.
pub(crate) struct DrivenTurn {
    pub turn: ConversationTurn,
    /// Interrupt generation the coordinator served, for supervisor acknowledge.
    pub interrupt_generation: Option<u64>,
}

/// How a turn left the coordinator.
pub(crate) enum TurnOutcome {
    Finished(DrivenTurn),
    /// Capture stream closed before producing an utterance; the supervisor
    /// ends its loop.
    CaptureClosed,
}

pub(crate) struct TurnCoordinator {
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
    state: Arc<StateCell>,
    text_buffer: usize,
}

impl TurnCoordinator {
    pub(crate) fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
        state: Arc<StateCell>,
        text_buffer: usize,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
            state,
            text_buffer: text_buffer.max(1),
        }
    }

    /// Drive one turn to a terminal status.
    pub(crate) async fn drive(
        &self,
        turn_id: u64,
        capture_rx: &mut mpsc::Receiver<AudioBuffer>,
        sink: &mut dyn AudioSink,
        context: &[(String, String)],
    ) -> TurnOutcome {
        let mut turn = ConversationTurn::new(turn_id);
        let mut control = self.state.subscribe();

        // ── Capturing / Transcribing ─────────────────────────────────────
        // Empty transcripts short-circuit back to capturing within the turn.
        let transcript = loop {
            turn.status = TurnStatus::Capturing;
            if let Some(preemption) = self.preempted() {
                return Self::abandoned(turn, preemption);
            }

            let segment = loop {
                tokio::select! {
                    _ = control.changed() => {
                        if let Some(preemption) = self.preempted() {
                            return Self::abandoned(turn, preemption);
                        }
                    }
                    segment = capture_rx.recv() => break segment,
                }
            };
            let Some(segment) = segment else {
                return TurnOutcome::CaptureClosed;
            };
            if segment.is_empty() {
                continue;
            }

            turn.status = TurnStatus::Transcribing;
            if let Some(preemption) = self.preempted() {
                return Self::abandoned(turn, preemption);
            }

            let transcriber = self.transcriber.clone();
            let text = match tokio::task::spawn_blocking(move || transcriber.transcribe(&segment))
                .await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    turn.fail(StageKind::Transcription, e.to_string());
                    return TurnOutcome::Finished(DrivenTurn {
                        turn,
                        interrupt_generation: None,
                    });
                }
                Err(e) => {
                    turn.fail(
                        StageKind::Transcription,
                        format!("transcription task panicked: {e}"),
                    );
                    return TurnOutcome::Finished(DrivenTurn {
                        turn,
                        interrupt_generation: None,
                    });
                }
            };

            if text.trim().is_empty() {
                debug!(turn = turn_id, "empty transcript, back to capturing");
                continue;
            }
            break text;
        };
        turn.transcript = Some(transcript.clone());

        // ── Generating ───────────────────────────────────────────────────
        turn.status = TurnStatus::Generating;
        if let Some(preemption) = self.preempted() {
            return Self::abandoned(turn, preemption);
        }

        let prompt = compose_prompt(&transcript, context);
        let mut text_rx = match self.generator.stream_generate(&prompt) {
            Ok(rx) => rx,
            Err(e) => {
                turn.fail(StageKind::Generation, e.to_string());
                return TurnOutcome::Finished(DrivenTurn {
                    turn,
                    interrupt_generation: None,
                });
            }
        };

        // ── Synthesizing / Playing: pipelined fan-through ────────────────
        let (synth_tx, synth_rx) = mpsc::channel(self.text_buffer);
        let mut audio_rx = self.synthesizer.stream_synthesize(synth_rx);
        turn.status = TurnStatus::Synthesizing;

        // Forwarder moves generator chunks into the synthesizer as they
        // arrive. The chunk log is shared so partials survive an interrupt
        // without waiting for the forwarder.
        let chunk_log: Arc<Mutex<Vec<String>>> = Arc::default();
        let forwarder_log = chunk_log.clone();
        let mut forwarder = tokio::spawn(async move {
            let mut error = None;
            while let Some(item) = text_rx.recv().await {
                match item {
                    Ok(chunk) => {
                        forwarder_log
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(chunk.clone());
                        if synth_tx.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error = Some(e);
                        break;
                    }
                }
            }
            error
        });

        let mut interrupt_generation = None;
        let mut preempted = false;
        let mut failure: Option<(StageKind, String)> = None;

        loop {
            tokio::select! {
                _ = control.changed() => {
                    if let Some(preemption) = self.preempted() {
                        if let Preemption::Interrupt(generation) = preemption {
                            interrupt_generation = Some(generation);
                        }
                        preempted = true;
                        self.cancel_downstream(sink);
                        break;
                    }
                }
                maybe_audio = audio_rx.recv() => {
                    match maybe_audio {
                        Some(Ok(chunk)) => {
                            turn.status = TurnStatus::Playing;
                            if let Err(e) = sink.play(&chunk) {
                                failure = Some((StageKind::Playback, e.to_string()));
                                self.generator.cancel_generation();
                                self.synthesizer.stop_playing();
                                break;
                            }
                            turn.audio_chunks.push(chunk);
                        }
                        Some(Err(e)) => {
                            failure = Some((StageKind::Synthesis, e.to_string()));
                            self.generator.cancel_generation();
                            break;
                        }
                        // Generator and synthesizer streams fully drained and
                        // the last chunk handed to playback.
                        None => break,
                    }
                }
            }
        }

        // Collect the forwarder; the cancellation contract keeps this bounded.
        let generator_error = match tokio::time::timeout(DRAIN_TIMEOUT, &mut forwarder).await {
            Ok(Ok(error)) => error,
            Ok(Err(e)) => {
                warn!(turn = turn_id, error = %e, "generator forwarder panicked");
                None
            }
            Err(_) => {
                warn!(turn = turn_id, "generator drain exceeded bound, aborting");
                forwarder.abort();
                None
            }
        };

        turn.response_chunks = chunk_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if let Some((kind, message)) = failure {
            turn.fail(kind, message);
        } else if preempted {
            turn.status = TurnStatus::Interrupted;
        } else if let Some(e) = generator_error {
            turn.fail(StageKind::Generation, e.to_string());
        } else {
            turn.status = TurnStatus::Completed;
        }

        TurnOutcome::Finished(DrivenTurn {
            turn,
            interrupt_generation,
        })
    }

    /// Control state observed at a transition point, if it preempts the turn.
    fn preempted(&self) -> Option<Preemption> {
        self.state.read(|s| {
            if s.interrupt_requested {
                Some(Preemption::Interrupt(s.interrupt_generation))
            } else if s.phase != RunPhase::Running {
                Some(Preemption::Stop)
            } else {
                None
            }
        })
    }

    /// Downstream-first cancellation: generator stops producing, then the
    /// synthesizer flushes, then playback discards buffered audio. Each hook
    /// fires exactly once per preemption.
    fn cancel_downstream(&self, sink: &mut dyn AudioSink) {
        self.generator.cancel_generation();
        let unplayed = self.synthesizer.stop_playing();
        let discarded = sink.discard_pending();
        debug!(unplayed, discarded, "cancelled in-flight turn");
    }

    /// Terminal record for a turn preempted before the fan-through started.
    fn abandoned(mut turn: ConversationTurn, preemption: Preemption) -> TurnOutcome {
        turn.status = TurnStatus::Interrupted;
        let interrupt_generation = match preemption {
            Preemption::Interrupt(generation) => Some(generation),
            Preemption::Stop => None,
        };
        TurnOutcome::Finished(DrivenTurn {
            turn,
            interrupt_generation,
        })
    }
}

/// Fold prior exchanges into the prompt when context passing is enabled.
fn compose_prompt(transcript: &str, context: &[(String, String)]) -> String {
    if context.is_empty() {
        return transcript.to_string();
    }
    let mut prompt = String::new();
    for (user, assistant) in context {
        prompt.push_str("User: ");
        prompt.push_str(user);
        prompt.push('\n');
        prompt.push_str("Assistant: ");
        prompt.push_str(assistant);
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(transcript);
    prompt
}
