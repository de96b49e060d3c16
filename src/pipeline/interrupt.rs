//! Cross-cutting interruption signaling.

use crate::pipeline::state::{RunPhase, StateCell};
use std::sync::Arc;
use tracing::debug;

/// Requests preemption of the active turn.
///
/// Cloneable handle; all clones share the pipeline's state cell, so an
/// interrupt can be raised from any task or thread (e.g. a barge-in detector
/// running alongside playback).
#[derive(Clone)]
pub struct InterruptController {
    state: Arc<StateCell>,
}

impl InterruptController {
    pub(crate) fn new(state: Arc<StateCell>) -> Self {
        Self { state }
    }

    /// Request that the active turn be abandoned.
    ///
    /// Idempotent: repeated calls while one interrupt is outstanding have no
    /// additional effect. A no-op when the pipeline is not running — the
    /// interrupt flag is only ever raised under `running`.
    pub fn request_interrupt(&self) {
        self.state.update(|s| {
            if s.phase != RunPhase::Running || s.interrupt_requested {
                return;
            }
            s.interrupt_requested = true;
            s.interrupt_generation += 1;
            debug!(generation = s.interrupt_generation, "interrupt requested");
        });
    }

    /// True while an interrupt is outstanding.
    pub fn is_requested(&self) -> bool {
        self.state.read(|s| s.interrupt_requested)
    }

    /// Generation of the outstanding interrupt, if any.
    pub(crate) fn pending_generation(&self) -> Option<u64> {
        self.state
            .read(|s| s.interrupt_requested.then_some(s.interrupt_generation))
    }

    /// Atomically read-and-clear the flag after cleanup of generation
    /// `observed`.
    ///
    /// Returns false when a newer interrupt arrived during the cleanup
    /// window; the flag then stays set so the next turn observes it
    /// immediately instead of the request being silently dropped.
    pub(crate) fn acknowledge(&self, observed: u64) -> bool {
        self.state.update(|s| {
            if !s.interrupt_requested {
                return true;
            }
            if s.interrupt_generation > observed {
                return false;
            }
            s.interrupt_requested = false;
            true
        })
    }
}
