//! Run, failsafe and reconnect state
//!
//! The worker owns and mutates these; the front-end only ever sees the
//! [`StatusSnapshot`] published through the [`StatusBoard`].

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use super::phase::{AutomationPhase, FishCountEffect};
use crate::platform::WindowMode;

/// Outcome of one minigame attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleResult {
    /// A fish was caught and the result dismissed
    Success,
    /// The attempt was abandoned (cancelled or a transient error)
    Failure,
    /// A scheduled reconnect is due
    NeedsReconnect,
    /// The failsafe restarted the client during the attempt
    ReconnectedViaFailsafe,
}

/// Per-run state of the phase controller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunState {
    /// Clock reading when the run started
    pub started_at: Option<Duration>,
    /// Catches since the last return to `Initialization`
    pub fish_count: u32,
    pub automation_phase: AutomationPhase,
}

impl RunState {
    /// Fresh state for a run starting at `now`
    pub fn started(now: Duration) -> Self {
        Self {
            started_at: Some(now),
            fish_count: 0,
            automation_phase: AutomationPhase::Initialization,
        }
    }

    pub fn apply(&mut self, next: AutomationPhase, effect: FishCountEffect) {
        match effect {
            FishCountEffect::Keep => {}
            FishCountEffect::Increment => self.fish_count += 1,
            FishCountEffect::Reset => self.fish_count = 0,
        }
        self.automation_phase = next;
    }
}

/// Stall tracking of the failsafe monitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailsafeState {
    /// Trigger-wait timeouts since the last successful cycle or reconnect
    pub consecutive_triggers: u32,
}

/// View of the reconnect controller's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconnectState {
    pub enabled: bool,
    pub interval_seconds: f64,
    pub timer_start: Option<Duration>,
    pub in_progress: bool,
    pub server_link: String,
    pub window_mode: WindowMode,
}

/// Read-only status for a front-end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub phase: AutomationPhase,
    pub fish_count: u32,
    pub running_seconds: f64,
    /// Seconds until the next scheduled reconnect, if one is scheduled
    pub next_reconnect_eta_seconds: Option<f64>,
}

impl StatusSnapshot {
    /// Status as a JSON string for the UI
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Default)]
struct BoardEntry {
    running: bool,
    run: RunState,
    reconnect_due_at: Option<Duration>,
}

/// Latest published run state, shared between worker and front-end
#[derive(Debug, Default)]
pub struct StatusBoard {
    entry: Mutex<BoardEntry>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the worker's current state
    pub fn publish(&self, running: bool, run: &RunState, reconnect_due_at: Option<Duration>) {
        let mut entry = match self.entry.lock() {
            Ok(entry) => entry,
            Err(poisoned) => poisoned.into_inner(),
        };
        entry.running = running;
        entry.run = run.clone();
        entry.reconnect_due_at = reconnect_due_at;
    }

    /// Status as of clock reading `now`
    pub fn snapshot(&self, now: Duration) -> StatusSnapshot {
        let entry = match self.entry.lock() {
            Ok(entry) => entry,
            Err(poisoned) => poisoned.into_inner(),
        };

        let running_seconds = match (entry.running, entry.run.started_at) {
            (true, Some(started)) => now.saturating_sub(started).as_secs_f64(),
            _ => 0.0,
        };

        StatusSnapshot {
            running: entry.running,
            phase: entry.run.automation_phase,
            fish_count: entry.run.fish_count,
            running_seconds,
            next_reconnect_eta_seconds: entry
                .reconnect_due_at
                .filter(|_| entry.running)
                .map(|due| due.saturating_sub(now).as_secs_f64()),
        }
    }
}
