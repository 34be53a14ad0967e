//! Submission, polling and settling of backend commands.

pub mod controller;
pub mod fsm;
pub mod poll;

pub use controller::{
    interpret_completion_status, interpret_path_clear, is_path_clear, status_word, LifecycleCommand,
    LifecycleController, LifecycleSnapshot, LifecycleState, PollVerdict,
};
pub use fsm::{LifecycleEvent, LifecyclePhase};
pub use poll::{PollHandle, PollSettings};
