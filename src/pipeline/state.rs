//! Shared run state for the supervisor and interruption controller.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle phase of the pipeline.
///
/// `Stopped` is terminal: a stopped pipeline never starts another turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Control state shared between the supervisor and the interruption
/// controller. All mutation happens inside [`StateCell`]'s single lock.
///
/// Invariant: `interrupt_requested` can only be true while the phase is
/// `Running`; only the supervisor clears it, via acknowledge.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub phase: RunPhase,
    pub interrupt_requested: bool,
    pub interrupt_generation: u64,
    pub active_turn: Option<u64>,
}

/// Single guarded state cell.
///
/// Pairs the mutex-protected [`RunState`] with a watch channel so async
/// waiters can race control changes against stream progress. Every mutation
/// bumps the version and wakes subscribers.
pub(crate) struct StateCell {
    state: Mutex<RunState>,
    version: watch::Sender<u64>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Mutex::new(RunState::default()),
            version,
        }
    }

    /// Run `f` inside the single critical section, then wake waiters.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> R {
        let result = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut state)
        };
        self.version.send_modify(|v| *v += 1);
        result
    }

    /// Read a snapshot without mutating.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Subscribe to state-change wakeups.
    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.read(|s| s.phase == RunPhase::Running)
    }

    /// Wait until `predicate` holds or `timeout` elapses.
    /// Returns whether the predicate held.
    pub(crate) async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&RunState) -> bool,
    ) -> bool {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.read(&predicate) {
                return true;
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                // Sender dropped or deadline reached: final check.
                Ok(Err(_)) | Err(_) => return self.read(&predicate),
            }
        }
    }
}
