//! Automation engine
//!
//! Drives the fishing loop: the phase controller walks the
//! [`AutomationPhase`](crate::game::AutomationPhase) state machine, the
//! minigame executor plays one catch, the failsafe monitor recovers from
//! stalls and the reconnect controller restarts the game client.

pub mod failsafe;
pub mod minigame;
pub mod navigation;
pub mod phases;
pub mod reconnect;
pub mod timing;

use std::sync::Arc;

use crate::platform::{InputDriver, MacroPlayer, Notifier, PlatformError, ProcessControl};
use crate::vision::{PixelSource, ResultReader, VisionError};

pub use failsafe::{EscalationResult, FailsafeMonitor};
pub use minigame::MinigameExecutor;
pub use navigation::Navigator;
pub use phases::PhaseController;
pub use reconnect::ReconnectController;
pub use timing::{Clock, ManualClock, PollOutcome, StopSignal, SystemClock};

/// Everything the engine needs from the host
#[derive(Clone)]
pub struct Drivers {
    pub clock: Arc<dyn Clock>,
    pub input: Arc<dyn InputDriver>,
    pub screen: Arc<dyn PixelSource>,
    pub process: Arc<dyn ProcessControl>,
    pub macros: Arc<dyn MacroPlayer>,
    pub notifier: Arc<dyn Notifier>,
    pub reader: Arc<dyn ResultReader>,
}

/// Automation errors
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// The emergency stop tripped
    #[error("cancelled")]
    Cancelled,
}
