//! Automation phases and the transition table
//!
//! The phase controller performs the side effects of each phase and reports
//! what happened as a [`PhaseEvent`]; [`transition`] alone decides where the
//! loop goes next and what happens to the catch counter.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::CycleResult;

/// What the automation loop is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutomationPhase {
    /// Navigate to the fishing spot
    #[default]
    Initialization,
    /// Run minigame cycles
    Fishing,
    /// Navigate to the shop
    PreSell,
    /// Sell the catch
    Selling,
    /// Alias of `Initialization` entered after a sale
    PostSell,
}

impl AutomationPhase {
    /// Phases during which the client holds shop state
    pub fn is_selling(&self) -> bool {
        matches!(self, AutomationPhase::PreSell | AutomationPhase::Selling)
    }
}

impl fmt::Display for AutomationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AutomationPhase::Initialization => "initialization",
            AutomationPhase::Fishing => "fishing",
            AutomationPhase::PreSell => "pre-sell",
            AutomationPhase::Selling => "selling",
            AutomationPhase::PostSell => "post-sell",
        };
        f.write_str(name)
    }
}

/// Outcome of one phase body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The phase's navigation sequence finished
    NavigationComplete,
    /// A step failed without fault; retry the same phase
    StepFailed,
    /// Enough catches for a trip to the shop
    SellThresholdReached,
    /// One minigame cycle finished
    CycleFinished(CycleResult),
    /// A scheduled reconnect finished (successfully or not)
    ReconnectFinished(bool),
    /// The selling loop and the exit from the shop finished
    SellComplete,
    /// An unexpected error escaped the phase body
    Fault,
}

/// What a transition does to the catch counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FishCountEffect {
    Keep,
    Increment,
    Reset,
}

/// Result of applying a [`PhaseEvent`] to a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: AutomationPhase,
    pub fish_count: FishCountEffect,
}

impl Transition {
    fn stay(phase: AutomationPhase) -> Self {
        Self {
            next: phase,
            fish_count: FishCountEffect::Keep,
        }
    }

    fn to(next: AutomationPhase) -> Self {
        // Every return to the start of the loop clears the catch counter
        let fish_count = if next == AutomationPhase::Initialization {
            FishCountEffect::Reset
        } else {
            FishCountEffect::Keep
        };
        Self { next, fish_count }
    }
}

/// The `(phase, event) -> next phase` table
pub fn transition(phase: AutomationPhase, event: PhaseEvent) -> Transition {
    use AutomationPhase::*;

    match (phase, event) {
        (_, PhaseEvent::Fault) => Transition::to(Initialization),
        (_, PhaseEvent::StepFailed) => Transition::stay(phase),

        (Initialization | PostSell, PhaseEvent::NavigationComplete) => Transition {
            next: Fishing,
            fish_count: FishCountEffect::Reset,
        },
        (PreSell, PhaseEvent::NavigationComplete) => Transition::to(Selling),

        (Fishing, PhaseEvent::SellThresholdReached) => Transition::to(PreSell),
        (Fishing, PhaseEvent::CycleFinished(CycleResult::Success)) => Transition {
            next: Fishing,
            fish_count: FishCountEffect::Increment,
        },
        (Fishing, PhaseEvent::CycleFinished(CycleResult::ReconnectedViaFailsafe)) => {
            Transition::to(Initialization)
        }
        (Fishing, PhaseEvent::CycleFinished(_)) => Transition::stay(Fishing),
        (Fishing, PhaseEvent::ReconnectFinished(true)) => Transition::to(Initialization),
        (Fishing, PhaseEvent::ReconnectFinished(false)) => Transition::stay(Fishing),

        (Selling, PhaseEvent::SellComplete) => Transition::to(Initialization),

        (phase, event) => {
            log::debug!("Ignoring {:?} in phase {}", event, phase);
            Transition::stay(phase)
        }
    }
}
