//! Session orchestration: the turn loop, the generation pipeline and
//! the human-handoff state machine.

pub mod handoff;
pub mod pipeline;
pub mod turn;
pub mod turn_lock;

pub use turn::{submit_turn, TurnHandle};
