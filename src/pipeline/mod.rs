//! Streaming pipeline: supervisor, turn coordinator, and interruption control.
//!
//! Stages run as concurrent tasks connected by bounded mpsc channels for
//! backpressure; all control state lives in a single guarded cell shared by
//! the supervisor and the interruption controller.

pub mod interrupt;
pub(crate) mod state;
pub mod supervisor;
pub(crate) mod turn;
pub mod types;

pub use interrupt::InterruptController;
pub use supervisor::VoicePipeline;
pub use types::{
    ConversationHistory, ConversationTurn, StageKind, TurnFailure, TurnInput, TurnStatus,
};
