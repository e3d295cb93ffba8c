//! The automation loop
//!
//! [`PhaseController::tick`] runs the body of the current phase once and
//! feeds the outcome through the transition table. The worker thread calls
//! it until the emergency stop trips.

use std::sync::Arc;

use super::failsafe::FailsafeMonitor;
use super::minigame::MinigameExecutor;
use super::navigation::Navigator;
use super::reconnect::ReconnectController;
use super::timing::{sleep_or_cancel, Clock, StopSignal};
use super::{AutomationError, Drivers};
use crate::config::{self, Settings, SharedSettings};
use crate::game::{transition, AutomationPhase, CycleResult, PhaseEvent, RunState, StatusBoard};
use crate::platform::notify::send;
use crate::platform::{Clicker, Notification, NotificationKind, Notifier};
use crate::stealth::Humanizer;

/// Drives the phase state machine on the worker thread
pub struct PhaseController {
    settings: SharedSettings,
    clock: Arc<dyn Clock>,
    stop: Arc<StopSignal>,
    notifier: Arc<dyn Notifier>,
    clicker: Clicker,
    minigame: MinigameExecutor,
    failsafe: FailsafeMonitor,
    reconnect: Arc<ReconnectController>,
    navigator: Navigator,
    status: Arc<StatusBoard>,
    run: RunState,
    active: bool,
}

impl PhaseController {
    pub fn new(
        settings: SharedSettings,
        drivers: &Drivers,
        stop: Arc<StopSignal>,
        reconnect: Arc<ReconnectController>,
        status: Arc<StatusBoard>,
    ) -> Self {
        let humanize = config::snapshot(&settings).humanize;
        Self {
            clicker: Clicker::new(
                drivers.input.clone(),
                drivers.clock.clone(),
                stop.clone(),
                Humanizer::new(humanize),
            ),
            minigame: MinigameExecutor::new(
                drivers.screen.clone(),
                drivers.reader.clone(),
                drivers.notifier.clone(),
                drivers.clock.clone(),
                stop.clone(),
            ),
            failsafe: FailsafeMonitor::new(drivers.notifier.clone()),
            navigator: Navigator::new(
                drivers.macros.clone(),
                stop.clone(),
                reconnect.navigation_flag(),
            ),
            settings,
            clock: drivers.clock.clone(),
            stop,
            notifier: drivers.notifier.clone(),
            reconnect,
            status,
            run: RunState::default(),
            active: false,
        }
    }

    /// Begin a run. Returns `false` if one is already active.
    pub fn start(&mut self) -> bool {
        if self.active {
            return false;
        }

        self.active = true;
        self.stop.arm();
        self.run = RunState::started(self.clock.now());
        self.failsafe.reset();
        self.reconnect.start_timer();
        log::info!("Automation started");
        self.publish();
        true
    }

    /// End the run. Returns `false` if none was active.
    pub fn stop(&mut self) -> bool {
        self.stop.halt();
        if !self.active {
            return false;
        }

        self.active = false;
        self.reconnect.clear_timer();
        log::info!(
            "Automation stopped in {} with {} fish",
            self.run.automation_phase,
            self.run.fish_count
        );
        self.publish();
        true
    }

    pub fn current_phase(&self) -> AutomationPhase {
        self.run.automation_phase
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn failsafe(&self) -> &FailsafeMonitor {
        &self.failsafe
    }

    /// One iteration of the loop. Does nothing once stopped.
    pub fn tick(&mut self) {
        if !self.active || self.stop.is_stopped() {
            return;
        }

        let settings = config::snapshot(&self.settings);
        self.clicker
            .configure(settings.timings.click_speed, &settings.humanize);

        let phase = self.run.automation_phase;
        let event = match self.run_phase(phase, &settings) {
            Ok(event) => event,
            Err(AutomationError::Cancelled) => {
                log::debug!("{} interrupted by stop", phase);
                return;
            }
            Err(e) => {
                log::error!("Critical error in {}: {}", phase, e);
                send(
                    self.notifier.as_ref(),
                    Notification::new(NotificationKind::Error, "Critical error", e.to_string())
                        .field("Phase", phase),
                );
                PhaseEvent::Fault
            }
        };

        let next = transition(phase, event);
        if next.next != phase {
            log::info!("Phase {} -> {}", phase, next.next);
        }
        self.run.apply(next.next, next.fish_count);
        self.publish();

        if event == PhaseEvent::Fault {
            let backoff = settings.timings.error_backoff();
            if let Err(AutomationError::Cancelled) =
                sleep_or_cancel(self.clock.as_ref(), &self.stop, backoff)
            {
                log::debug!("Error backoff cut short by stop");
            }
        }
    }

    fn run_phase(
        &mut self,
        phase: AutomationPhase,
        settings: &Settings,
    ) -> Result<PhaseEvent, AutomationError> {
        match phase {
            AutomationPhase::Initialization | AutomationPhase::PostSell => {
                let arrived = self.navigator.to_fishing_spot(&mut self.clicker, settings)?;
                Ok(if arrived {
                    PhaseEvent::NavigationComplete
                } else {
                    PhaseEvent::StepFailed
                })
            }
            AutomationPhase::Fishing => self.fish(settings),
            AutomationPhase::PreSell => {
                let arrived = self.navigator.to_shop(&mut self.clicker, settings)?;
                Ok(if arrived {
                    PhaseEvent::NavigationComplete
                } else {
                    PhaseEvent::StepFailed
                })
            }
            AutomationPhase::Selling => {
                let passes = self.navigator.sell(&mut self.clicker, settings)?;
                send(
                    self.notifier.as_ref(),
                    Notification::new(
                        NotificationKind::SellComplete,
                        "Sold catch",
                        "Inventory sold, heading back",
                    )
                    .field("Fish", self.run.fish_count)
                    .field("Passes", passes),
                );
                Ok(PhaseEvent::SellComplete)
            }
        }
    }

    fn fish(&mut self, settings: &Settings) -> Result<PhaseEvent, AutomationError> {
        let target = settings.auto_sell.target_fish_count;
        if settings.auto_sell.enabled && self.run.fish_count >= target {
            log::info!("Caught {} of {}, time to sell", self.run.fish_count, target);
            return Ok(PhaseEvent::SellThresholdReached);
        }

        let result = self.minigame.run_one_cycle(
            settings,
            &mut self.clicker,
            &mut self.failsafe,
            &self.reconnect,
            AutomationPhase::Fishing,
        );

        match result {
            CycleResult::NeedsReconnect => {
                let reconnected = self.reconnect.perform_reconnect(&settings.reconnect);
                if reconnected {
                    self.failsafe.reset();
                }
                self.stop.check()?;
                Ok(PhaseEvent::ReconnectFinished(reconnected))
            }
            CycleResult::Failure => {
                self.stop.check()?;
                Ok(PhaseEvent::CycleFinished(result))
            }
            _ => Ok(PhaseEvent::CycleFinished(result)),
        }
    }

    fn publish(&self) {
        let settings = config::snapshot(&self.settings);
        let due = self
            .active
            .then(|| self.reconnect.due_at(&settings.reconnect))
            .flatten();
        self.status.publish(self.active, &self.run, due);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;
    use std::time::Duration;

    use crate::automation::timing::ManualClock;
    use crate::platform::sim::{BiteSchedule, SimInputEvent, SimScreenConfig, SimWorld};
    use crate::platform::PlatformError;

    struct Rig {
        world: SimWorld,
        clock: Arc<ManualClock>,
        stop: Arc<StopSignal>,
        status: Arc<StatusBoard>,
        controller: PhaseController,
    }

    fn rig(settings: Settings, screen: SimScreenConfig) -> Rig {
        let clock = Arc::new(ManualClock::new());
        let world = SimWorld::new(clock.clone(), &settings, screen);
        let drivers = world.drivers();
        let stop = Arc::new(StopSignal::new());
        let status = Arc::new(StatusBoard::new());
        let reconnect = Arc::new(ReconnectController::new(&drivers, stop.clone()));
        let controller = PhaseController::new(
            Arc::new(RwLock::new(settings)),
            &drivers,
            stop.clone(),
            reconnect,
            status.clone(),
        );
        Rig {
            world,
            clock,
            stop,
            status,
            controller,
        }
    }

    fn quick_screen() -> SimScreenConfig {
        SimScreenConfig {
            sample_cost: Duration::ZERO,
            ..SimScreenConfig::default()
        }
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let mut rig = rig(Settings::testing_preset(), quick_screen());

        assert!(!rig.controller.stop());
        assert!(rig.controller.start());
        assert!(!rig.controller.start());
        assert!(!rig.stop.is_stopped());

        assert!(rig.controller.stop());
        assert!(!rig.controller.stop());
        assert!(rig.stop.is_stopped());
    }

    #[test]
    fn test_stopped_controller_does_nothing() {
        let mut rig = rig(Settings::testing_preset(), quick_screen());
        rig.controller.start();
        rig.controller.stop();

        rig.controller.tick();
        rig.controller.tick();

        assert!(rig.world.input.events().is_empty());
        assert_eq!(rig.clock.now(), Duration::ZERO);
        assert!(!rig.status.snapshot(rig.clock.now()).running);
    }

    #[test]
    fn test_sells_exactly_at_target() {
        let mut settings = Settings::testing_preset();
        settings.auto_sell.enabled = true;
        settings.auto_sell.target_fish_count = 3;
        settings.auto_sell.sell_all = false;
        let mut rig = rig(settings.clone(), quick_screen());
        rig.controller.start();

        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Fishing);

        for expected in 1..=3 {
            rig.controller.tick();
            assert_eq!(rig.controller.current_phase(), AutomationPhase::Fishing);
            assert_eq!(rig.controller.run_state().fish_count, expected);
        }

        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::PreSell);
        assert_eq!(rig.controller.run_state().fish_count, 3);

        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Selling);

        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Initialization);
        assert_eq!(rig.controller.run_state().fish_count, 0);
        assert_eq!(rig.world.input.clicks_near(settings.points.sell_button), 3);
        assert_eq!(rig.world.notifier.count(NotificationKind::SellComplete), 1);
    }

    #[test]
    fn test_without_auto_sell_keeps_fishing() {
        let mut rig = rig(Settings::testing_preset(), quick_screen());
        rig.controller.start();

        for _ in 0..40 {
            rig.controller.tick();
        }
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Fishing);
        assert_eq!(rig.controller.run_state().fish_count, 39);
    }

    #[test]
    fn test_scheduled_reconnect_restarts_navigation() {
        let mut settings = Settings::testing_preset();
        settings.reconnect.enabled = true;
        settings.reconnect.interval_seconds = 3.0;
        let screen = SimScreenConfig {
            bite: BiteSchedule::Never,
            ..quick_screen()
        };
        let mut rig = rig(settings, screen);
        rig.controller.start();

        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Fishing);

        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Initialization);
        assert_eq!(rig.world.notifier.count(NotificationKind::Reconnected), 1);

        let status = rig.status.snapshot(rig.clock.now());
        assert_eq!(status.next_reconnect_eta_seconds, Some(3.0));
    }

    #[test]
    fn test_failsafe_reconnect_returns_to_start() {
        let mut settings = Settings::testing_preset();
        settings.failsafe.reconnect_enabled = true;
        settings.failsafe.reconnect_threshold = 2;
        let screen = SimScreenConfig {
            bite: BiteSchedule::Never,
            ..quick_screen()
        };
        let mut rig = rig(settings, screen);
        rig.controller.start();

        rig.controller.tick();
        rig.controller.tick();

        assert_eq!(rig.controller.current_phase(), AutomationPhase::Initialization);
        assert_eq!(rig.controller.failsafe().consecutive_triggers(), 0);
        assert_eq!(rig.world.notifier.count(NotificationKind::FailsafeTriggered), 2);
    }

    #[test]
    fn test_fault_forces_initialization_and_backs_off() {
        let mut settings = Settings::testing_preset();
        settings.auto_sell.enabled = true;
        settings.auto_sell.target_fish_count = 1;
        settings.navigation.travel_to_shop_macro = Some("/nonexistent/shop.json".into());
        let mut rig = rig(settings, quick_screen());
        rig.controller.start();

        rig.controller.tick(); // to Fishing
        rig.controller.tick(); // one fish
        rig.controller.tick(); // to PreSell
        assert_eq!(rig.controller.current_phase(), AutomationPhase::PreSell);

        let before = rig.clock.now();
        rig.controller.tick();
        assert_eq!(rig.controller.current_phase(), AutomationPhase::Initialization);
        assert_eq!(rig.controller.run_state().fish_count, 0);
        assert_eq!(rig.clock.now() - before, Duration::from_secs(2));
        assert_eq!(rig.world.notifier.count(NotificationKind::Error), 1);
    }

    #[test]
    fn test_stop_during_cycle_leaves_phase() {
        let mut rig = rig(Settings::testing_preset(), quick_screen());
        rig.controller.start();
        rig.controller.tick();

        let stop = rig.stop.clone();
        rig.world.input.on_event(move |event| {
            if let SimInputEvent::Move(_) = event {
                stop.halt();
            }
        });
        rig.controller.tick();

        assert_eq!(rig.controller.current_phase(), AutomationPhase::Fishing);
        assert_eq!(rig.controller.run_state().fish_count, 0);
        assert!(rig.world.screen.reel_scans() == 0);
    }

    /// Trips the stop as soon as a critical error is reported
    struct HaltOnError(Arc<StopSignal>);

    impl Notifier for HaltOnError {
        fn notify(&self, notification: &Notification) -> Result<(), PlatformError> {
            if notification.kind == NotificationKind::Error {
                self.0.halt();
            }
            Ok(())
        }
    }

    #[test]
    fn test_stop_cuts_error_backoff_short() {
        let mut settings = Settings::testing_preset();
        settings.timings.error_backoff_seconds = 600.0;
        settings.navigation.camera_align_macro = Some("/nonexistent/align.json".into());
        let clock = Arc::new(ManualClock::new());
        let world = SimWorld::new(clock.clone(), &settings, quick_screen());
        let stop = Arc::new(StopSignal::new());
        let mut drivers = world.drivers();
        drivers.notifier = Arc::new(HaltOnError(stop.clone()));
        let reconnect = Arc::new(ReconnectController::new(&drivers, stop.clone()));
        let mut controller = PhaseController::new(
            Arc::new(RwLock::new(settings)),
            &drivers,
            stop.clone(),
            reconnect,
            Arc::new(StatusBoard::new()),
        );
        controller.start();

        controller.tick();

        assert!(stop.is_stopped());
        assert_eq!(controller.current_phase(), AutomationPhase::Initialization);
        assert!(clock.now() < Duration::from_secs(1));
    }
}
