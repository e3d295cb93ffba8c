//! Automation state module
//!
//! Phases of the fishing loop, the transition table between them and the
//! run, failsafe and reconnect state the worker tracks.

pub mod phase;
pub mod state;

pub use phase::{transition, AutomationPhase, FishCountEffect, PhaseEvent, Transition};
pub use state::{
    CycleResult, FailsafeState, ReconnectState, RunState, StatusBoard, StatusSnapshot,
};
