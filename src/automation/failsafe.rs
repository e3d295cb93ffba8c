//! Stall detection and recovery
//!
//! A stall is a trigger wait that outlasts the configured timeout. Each one
//! counts towards the reconnect threshold; below it the monitor dismisses
//! whatever dialog is open and recasts, at it the client is restarted.

use std::sync::Arc;
use std::time::Duration;

use super::reconnect::ReconnectController;
use super::AutomationError;
use crate::config::{FailsafeSettings, Settings};
use crate::game::FailsafeState;
use crate::platform::notify::send;
use crate::platform::{Clicker, Notification, NotificationKind, Notifier};

/// What the failsafe did about a stall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationResult {
    /// Dialogs dismissed and a new cast started
    Recovered,
    /// The client was restarted
    ReconnectTriggered,
    /// A restart was attempted and failed
    ReconnectFailed,
}

/// Tracks consecutive stalls and escalates them
pub struct FailsafeMonitor {
    state: FailsafeState,
    notifier: Arc<dyn Notifier>,
}

impl FailsafeMonitor {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state: FailsafeState::default(),
            notifier,
        }
    }

    pub fn consecutive_triggers(&self) -> u32 {
        self.state.consecutive_triggers
    }

    /// Clear the stall count after a catch or a reconnect
    pub fn reset(&mut self) {
        self.state.consecutive_triggers = 0;
    }

    /// Whether a trigger wait of `elapsed` counts as a stall.
    ///
    /// Never true while a reconnect is running; the wait just keeps polling.
    pub fn check_timeout(
        &self,
        elapsed: Duration,
        settings: &FailsafeSettings,
        reconnect_in_progress: bool,
    ) -> bool {
        settings.enabled && !reconnect_in_progress && elapsed >= settings.timeout()
    }

    /// Handle one stall: local recovery below the threshold, a reconnect at it
    pub fn escalate(
        &mut self,
        settings: &Settings,
        clicker: &mut Clicker,
        reconnect: &ReconnectController,
    ) -> Result<EscalationResult, AutomationError> {
        self.state.consecutive_triggers += 1;
        let triggers = self.state.consecutive_triggers;
        let threshold = settings.failsafe.reconnect_threshold;

        if settings.failsafe.reconnect_enabled && triggers >= threshold {
            self.state.consecutive_triggers = 0;
            log::warn!("Failsafe: {} consecutive stalls, reconnecting", triggers);
            send(
                self.notifier.as_ref(),
                Notification::new(
                    NotificationKind::FailsafeTriggered,
                    "Failsafe reconnect",
                    "Too many stalls in a row, restarting the client",
                )
                .field("Stalls", triggers),
            );

            return Ok(if reconnect.perform_reconnect(&settings.reconnect) {
                EscalationResult::ReconnectTriggered
            } else {
                EscalationResult::ReconnectFailed
            });
        }

        log::warn!(
            "Failsafe: no bite within {:.1}s ({}/{}), recovering",
            settings.failsafe.timeout_seconds,
            triggers,
            threshold
        );
        send(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::FailsafeTriggered,
                "Failsafe triggered",
                "No bite detected, dismissing dialogs and recasting",
            )
            .field("Stalls", format!("{triggers}/{threshold}")),
        );

        let points = &settings.points;
        let settle = Duration::from_millis(settings.timings.recovery_delay_ms);
        clicker.click(points.failsafe_close, settle)?;
        clicker.click(points.failsafe_confirm, settle)?;
        clicker.click(points.start_fishing, settings.timings.click_delay())?;

        Ok(EscalationResult::Recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::timing::{ManualClock, StopSignal};
    use crate::platform::sim::{RecordingNotifier, SimInputEvent, SimScreenConfig, SimWorld};
    use crate::stealth::{Humanizer, StealthConfig};

    struct Rig {
        world: SimWorld,
        clicker: Clicker,
        reconnect: ReconnectController,
        monitor: FailsafeMonitor,
    }

    fn rig(settings: &Settings) -> Rig {
        let clock = Arc::new(ManualClock::new());
        let world = SimWorld::new(clock, settings, SimScreenConfig::default());
        let stop = Arc::new(StopSignal::new());
        stop.arm();

        let drivers = world.drivers();
        let clicker = Clicker::new(
            drivers.input.clone(),
            drivers.clock.clone(),
            stop.clone(),
            Humanizer::seeded(StealthConfig::disabled(), 1),
        );
        let reconnect = ReconnectController::new(&drivers, stop);
        let monitor = FailsafeMonitor::new(drivers.notifier.clone());
        Rig {
            world,
            clicker,
            reconnect,
            monitor,
        }
    }

    #[test]
    fn test_check_timeout() {
        let monitor = FailsafeMonitor::new(Arc::new(RecordingNotifier::new()));
        let mut settings = FailsafeSettings::default();

        assert!(!monitor.check_timeout(Duration::from_secs(19), &settings, false));
        assert!(monitor.check_timeout(Duration::from_secs(20), &settings, false));
        // Skipped while a reconnect runs
        assert!(!monitor.check_timeout(Duration::from_secs(500), &settings, true));

        settings.enabled = false;
        assert!(!monitor.check_timeout(Duration::from_secs(500), &settings, false));
    }

    #[test]
    fn test_local_recovery_clicks() {
        let settings = Settings::testing_preset();
        let mut rig = rig(&settings);

        let result = rig
            .monitor
            .escalate(&settings, &mut rig.clicker, &rig.reconnect)
            .unwrap();

        assert_eq!(result, EscalationResult::Recovered);
        assert_eq!(rig.monitor.consecutive_triggers(), 1);
        assert_eq!(
            rig.world.input.events(),
            vec![
                SimInputEvent::Click(settings.points.failsafe_close),
                SimInputEvent::Click(settings.points.failsafe_confirm),
                SimInputEvent::Click(settings.points.start_fishing),
            ]
        );
    }

    #[test]
    fn test_threshold_escalates_to_reconnect() {
        let mut settings = Settings::testing_preset();
        settings.failsafe.reconnect_enabled = true;
        settings.failsafe.reconnect_threshold = 5;
        let mut rig = rig(&settings);

        let results: Vec<_> = (0..5)
            .map(|_| {
                rig.monitor
                    .escalate(&settings, &mut rig.clicker, &rig.reconnect)
                    .unwrap()
            })
            .collect();

        assert_eq!(results[..4], [EscalationResult::Recovered; 4]);
        assert_eq!(results[4], EscalationResult::ReconnectTriggered);
        assert_eq!(rig.monitor.consecutive_triggers(), 0);
        assert_eq!(rig.world.input.clicks_near(settings.points.failsafe_close), 4);
        assert_eq!(rig.world.notifier.count(NotificationKind::Reconnected), 1);
    }

    #[test]
    fn test_without_reconnect_count_keeps_growing() {
        let settings = Settings::testing_preset();
        let mut rig = rig(&settings);

        for _ in 0..7 {
            let result = rig
                .monitor
                .escalate(&settings, &mut rig.clicker, &rig.reconnect)
                .unwrap();
            assert_eq!(result, EscalationResult::Recovered);
        }
        assert_eq!(rig.monitor.consecutive_triggers(), 7);
        assert_eq!(rig.world.notifier.count(NotificationKind::ReconnectTriggered), 0);
    }
}
