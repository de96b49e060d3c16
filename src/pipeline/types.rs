//! Data types for conversation turns.

use crate::audio::AudioBuffer;
use std::collections::VecDeque;

/// Where in the turn state machine a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Capturing,
    Transcribing,
    Generating,
    Synthesizing,
    Playing,
    Completed,
    Interrupted,
    Failed,
}

impl TurnStatus {
    /// Terminal statuses end a turn; a fresh turn always follows.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }
}

/// Which stage produced a turn failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Capture,
    Transcription,
    Generation,
    Synthesis,
    Playback,
}

/// Stage failure recorded on a terminal turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnFailure {
    pub kind: StageKind,
    pub message: String,
}

impl TurnFailure {
    pub fn new(kind: StageKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Input accepted by the synchronous single-turn path.
#[derive(Debug, Clone)]
pub enum TurnInput {
    Audio(AudioBuffer),
    Text(String),
}

/// One user-input-to-spoken-response cycle.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    /// Monotonic turn counter assigned by the supervisor.
    pub id: u64,
    pub transcript: Option<String>,
    /// Generator output in arrival order.
    pub response_chunks: Vec<String>,
    /// Audio chunks that reached playback, in arrival order.
    pub audio_chunks: Vec<AudioBuffer>,
    pub status: TurnStatus,
    pub failure: Option<TurnFailure>,
}

impl ConversationTurn {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            transcript: None,
            response_chunks: Vec::new(),
            audio_chunks: Vec::new(),
            status: TurnStatus::Capturing,
            failure: None,
        }
    }

    /// Full response text accumulated so far.
    pub fn response_text(&self) -> String {
        self.response_chunks.concat()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn fail(&mut self, kind: StageKind, message: impl Into<String>) {
        self.status = TurnStatus::Failed;
        self.failure = Some(TurnFailure::new(kind, message));
    }
}

/// Bounded, insertion-ordered record of finished turns.
///
/// Used for logging and optional prompt context only; the orchestration core
/// never replays it.
#[derive(Debug)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a terminal turn, evicting the oldest at capacity.
    pub fn push(&mut self, turn: ConversationTurn) {
        debug_assert!(turn.is_terminal(), "only terminal turns enter history");
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn latest(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    /// Snapshot of all recorded turns, oldest first.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Up to `limit` most recent completed exchanges for prompt context,
    /// oldest first. Interrupted and failed turns are non-authoritative and
    /// skipped.
    pub fn context(&self, limit: usize) -> Vec<(String, String)> {
        if limit == 0 {
            return Vec::new();
        }
        let mut pairs: Vec<(String, String)> = self
            .turns
            .iter()
            .rev()
            .filter(|turn| turn.status == TurnStatus::Completed)
            .filter_map(|turn| {
                turn.transcript
                    .as_ref()
                    .map(|transcript| (transcript.clone(), turn.response_text()))
            })
            .take(limit)
            .collect();
        pairs.reverse();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_turn(id: u64, transcript: &str, response: &str) -> ConversationTurn {
        let mut turn = ConversationTurn::new(id);
        turn.transcript = Some(transcript.to_string());
        turn.response_chunks = vec![response.to_string()];
        turn.status = TurnStatus::Completed;
        turn
    }

    #[test]
    fn test_new_turn_starts_capturing() {
        let turn = ConversationTurn::new(3);
        assert_eq!(turn.id, 3);
        assert_eq!(turn.status, TurnStatus::Capturing);
        assert!(turn.transcript.is_none());
        assert!(turn.response_chunks.is_empty());
        assert!(turn.audio_chunks.is_empty());
        assert!(!turn.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TurnStatus::Completed.is_terminal());
        assert!(TurnStatus::Interrupted.is_terminal());
        assert!(TurnStatus::Failed.is_terminal());
        for status in [
            TurnStatus::Capturing,
            TurnStatus::Transcribing,
            TurnStatus::Generating,
            TurnStatus::Synthesizing,
            TurnStatus::Playing,
        ] {
            assert!(!status.is_terminal(), "{status:?} should not be terminal");
        }
    }

    #[test]
    fn test_response_text_joins_chunks() {
        let mut turn = ConversationTurn::new(0);
        turn.response_chunks = vec!["Hello, ".to_string(), "world".to_string()];
        assert_eq!(turn.response_text(), "Hello, world");
    }

    #[test]
    fn test_fail_records_kind_and_message() {
        let mut turn = ConversationTurn::new(0);
        turn.fail(StageKind::Generation, "model exploded");
        assert_eq!(turn.status, TurnStatus::Failed);
        let failure = turn.failure.unwrap();
        assert_eq!(failure.kind, StageKind::Generation);
        assert_eq!(failure.message, "model exploded");
    }

    #[test]
    fn test_history_bounded_eviction() {
        let mut history = ConversationHistory::new(2);
        history.push(completed_turn(0, "a", "ra"));
        history.push(completed_turn(1, "b", "rb"));
        history.push(completed_turn(2, "c", "rc"));

        assert_eq!(history.len(), 2);
        let ids: Vec<u64> = history.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(history.latest().unwrap().id, 2);
    }

    #[test]
    fn test_history_capacity_floor_of_one() {
        let mut history = ConversationHistory::new(0);
        history.push(completed_turn(0, "a", "ra"));
        history.push(completed_turn(1, "b", "rb"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().id, 1);
    }

    #[test]
    fn test_context_skips_non_completed_turns() {
        let mut history = ConversationHistory::new(8);
        history.push(completed_turn(0, "first", "one"));

        let mut interrupted = completed_turn(1, "second", "two");
        interrupted.status = TurnStatus::Interrupted;
        history.push(interrupted);

        let mut failed = ConversationTurn::new(2);
        failed.fail(StageKind::Synthesis, "boom");
        history.push(failed);

        history.push(completed_turn(3, "third", "three"));

        let context = history.context(4);
        assert_eq!(
            context,
            vec![
                ("first".to_string(), "one".to_string()),
                ("third".to_string(), "three".to_string()),
            ]
        );
    }

    #[test]
    fn test_context_limit_keeps_most_recent() {
        let mut history = ConversationHistory::new(8);
        for i in 0..5 {
            history.push(completed_turn(i, &format!("q{i}"), &format!("a{i}")));
        }

        let context = history.context(2);
        assert_eq!(
            context,
            vec![
                ("q3".to_string(), "a3".to_string()),
                ("q4".to_string(), "a4".to_string()),
            ]
        );
    }

    #[test]
    fn test_context_zero_limit_is_empty() {
        let mut history = ConversationHistory::new(8);
        history.push(completed_turn(0, "a", "ra"));
        assert!(history.context(0).is_empty());
    }
}
