//! One fishing minigame attempt
//!
//! Cast, wait for the bite pixel, then play the reel bar until the completed
//! border lights up or the reel timeout runs out, read the catch and dismiss
//! the result.

use std::sync::Arc;
use std::time::Duration;

use image::Rgb;

use super::failsafe::{EscalationResult, FailsafeMonitor};
use super::reconnect::ReconnectController;
use super::timing::{poll_until, Clock, PollOutcome, StopSignal};
use super::AutomationError;
use crate::config::Settings;
use crate::game::{AutomationPhase, CycleResult};
use crate::platform::notify::send;
use crate::platform::{Clicker, Notification, NotificationKind, Notifier};
use crate::vision::{
    is_near_white, read_label_with_timeout, ItemMatcher, PixelSource, ResultReader, VisionError,
    WHITE,
};

/// Why the trigger wait stopped polling
enum TriggerWait {
    Bite,
    ReconnectDue,
    Stalled,
    SampleFailed(VisionError),
}

/// Click cadence on the reel bar.
///
/// Off target: click and drop the latch. First frame on target: click and
/// latch. After that exactly one more click, then hold off until the target
/// is lost again.
#[derive(Debug, Default)]
struct ReelLatch {
    ready_to_stop: bool,
    extra_clicks_after_ready: u32,
}

impl ReelLatch {
    /// Whether to click for this frame
    fn should_click(&mut self, on_target: bool) -> bool {
        if !on_target {
            self.ready_to_stop = false;
            self.extra_clicks_after_ready = 0;
            return true;
        }
        if !self.ready_to_stop {
            self.ready_to_stop = true;
            return true;
        }
        if self.extra_clicks_after_ready < 1 {
            self.extra_clicks_after_ready += 1;
            return true;
        }
        false
    }
}

/// Plays single minigame cycles
pub struct MinigameExecutor {
    screen: Arc<dyn PixelSource>,
    reader: Arc<dyn ResultReader>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    stop: Arc<StopSignal>,
}

impl MinigameExecutor {
    pub fn new(
        screen: Arc<dyn PixelSource>,
        reader: Arc<dyn ResultReader>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            screen,
            reader,
            notifier,
            clock,
            stop,
        }
    }

    /// Play one cycle. Cancellation and transient errors become `Failure`.
    pub fn run_one_cycle(
        &self,
        settings: &Settings,
        clicker: &mut Clicker,
        failsafe: &mut FailsafeMonitor,
        reconnect: &ReconnectController,
        phase: AutomationPhase,
    ) -> CycleResult {
        match self.try_cycle(settings, clicker, failsafe, reconnect, phase) {
            Ok(result) => result,
            Err(AutomationError::Cancelled) => {
                log::debug!("Minigame cycle cancelled");
                CycleResult::Failure
            }
            Err(e) => {
                log::warn!("Minigame cycle failed: {}", e);
                CycleResult::Failure
            }
        }
    }

    fn try_cycle(
        &self,
        settings: &Settings,
        clicker: &mut Clicker,
        failsafe: &mut FailsafeMonitor,
        reconnect: &ReconnectController,
        phase: AutomationPhase,
    ) -> Result<CycleResult, AutomationError> {
        let points = &settings.points;
        clicker.click(points.start_fishing, settings.timings.click_delay())?;

        if let Some(result) = self.wait_for_bite(settings, clicker, failsafe, reconnect, phase)? {
            return Ok(result);
        }

        failsafe.reset();
        clicker.move_to(points.idle_position)?;
        let reference = self.screen.sample_color(points.shaded_pixel)?;
        log::debug!("Bite, tracking colour {:?}", reference.0);

        self.reel(settings, clicker, reference)?;

        let matcher = ItemMatcher::new(settings.known_items.iter().cloned());
        let label = read_label_with_timeout(
            self.reader.clone(),
            &matcher,
            settings.timings.result_read_timeout(),
        );
        log::info!("Caught: {}", label);
        send(
            self.notifier.as_ref(),
            Notification::new(NotificationKind::FishCaught, "Fish caught", label.clone())
                .field("Item", &label),
        );

        clicker.click(points.close_result, settings.timings.click_delay())?;
        failsafe.reset();
        Ok(CycleResult::Success)
    }

    /// Poll the trigger pixel until a bite.
    ///
    /// Returns the cycle's result early if a reconnect is due or the
    /// failsafe restarted the client.
    fn wait_for_bite(
        &self,
        settings: &Settings,
        clicker: &mut Clicker,
        failsafe: &mut FailsafeMonitor,
        reconnect: &ReconnectController,
        phase: AutomationPhase,
    ) -> Result<Option<CycleResult>, AutomationError> {
        let trigger = settings.points.trigger_pixel;
        let tolerance = settings.detection.trigger_tolerance;
        let mut wait_started = self.clock.now();

        loop {
            let monitor = &*failsafe;
            let outcome = poll_until(
                self.clock.as_ref(),
                &self.stop,
                settings.timings.poll_interval(),
                None,
                || {
                    if reconnect.should_reconnect_now(&settings.reconnect, phase) {
                        return Some(TriggerWait::ReconnectDue);
                    }
                    match self.screen.sample_color(trigger) {
                        Ok(color) if is_near_white(color, tolerance) => {
                            return Some(TriggerWait::Bite)
                        }
                        Ok(_) => {}
                        Err(e) => return Some(TriggerWait::SampleFailed(e)),
                    }
                    let elapsed = self.clock.since(wait_started);
                    monitor
                        .check_timeout(elapsed, &settings.failsafe, reconnect.in_progress())
                        .then_some(TriggerWait::Stalled)
                },
            );

            match outcome {
                PollOutcome::Cancelled => return Err(AutomationError::Cancelled),
                PollOutcome::Ready(TriggerWait::Bite) => return Ok(None),
                // No timeout on this poll
                PollOutcome::TimedOut => {}
                PollOutcome::Ready(TriggerWait::ReconnectDue) => {
                    log::info!("Scheduled reconnect is due");
                    return Ok(Some(CycleResult::NeedsReconnect));
                }
                PollOutcome::Ready(TriggerWait::SampleFailed(e)) => return Err(e.into()),
                PollOutcome::Ready(TriggerWait::Stalled) => {
                    match failsafe.escalate(settings, clicker, reconnect)? {
                        EscalationResult::ReconnectTriggered => {
                            return Ok(Some(CycleResult::ReconnectedViaFailsafe))
                        }
                        EscalationResult::Recovered | EscalationResult::ReconnectFailed => {
                            wait_started = self.clock.now();
                        }
                    }
                }
            }
        }
    }

    /// Tight reel loop, bounded by the reel timeout
    fn reel(
        &self,
        settings: &Settings,
        clicker: &mut Clicker,
        reference: Rgb<u8>,
    ) -> Result<(), AutomationError> {
        let regions = &settings.regions;
        let detection = &settings.detection;
        let check_every = settings.timings.completed_check_every.max(1);
        let mut iteration: u32 = 0;
        let mut latch = ReelLatch::default();

        let outcome = poll_until(
            self.clock.as_ref(),
            &self.stop,
            Duration::ZERO,
            Some(settings.timings.reactive_timeout()),
            || -> Option<Result<(), AutomationError>> {
                iteration += 1;

                if iteration % check_every == 0 {
                    match self.screen.find_color_in_region(
                        regions.completed_border,
                        WHITE,
                        detection.border_tolerance,
                    ) {
                        Ok(Some(_)) => return Some(Ok(())),
                        Ok(None) => {}
                        Err(e) => return Some(Err(e.into())),
                    }
                }

                let on_target = match self.screen.find_color_in_region(
                    regions.reel_bar,
                    reference,
                    detection.reel_tolerance,
                ) {
                    Ok(found) => found.is_some(),
                    Err(e) => return Some(Err(e.into())),
                };
                if latch.should_click(on_target) {
                    if let Err(e) = clicker.click_here() {
                        return Some(Err(e));
                    }
                }
                None
            },
        );

        match outcome {
            PollOutcome::Ready(Ok(())) => {
                log::debug!("Minigame completed after {} iterations", iteration);
                clicker.pause(Duration::from_millis(settings.timings.completed_settle_ms))
            }
            PollOutcome::Ready(Err(e)) => Err(e),
            PollOutcome::TimedOut => {
                log::debug!("Reel timed out after {} iterations", iteration);
                Ok(())
            }
            PollOutcome::Cancelled => Err(AutomationError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::automation::timing::ManualClock;
    use crate::platform::sim::{BiteSchedule, SimInputEvent, SimScreenConfig, SimWorld};
    use crate::platform::MouseButton;
    use crate::stealth::{Humanizer, StealthConfig};
    use crate::vision::{Point, Region};

    struct Rig {
        world: SimWorld,
        clock: Arc<ManualClock>,
        stop: Arc<StopSignal>,
        clicker: Clicker,
        failsafe: FailsafeMonitor,
        reconnect: ReconnectController,
        executor: MinigameExecutor,
    }

    impl Rig {
        fn new(settings: &Settings, screen: SimScreenConfig) -> Self {
            let clock = Arc::new(ManualClock::new());
            let world = SimWorld::new(clock.clone(), settings, screen);
            Self::with_screen(world, clock, None)
        }

        fn with_screen(
            world: SimWorld,
            clock: Arc<ManualClock>,
            screen: Option<Arc<dyn PixelSource>>,
        ) -> Self {
            let stop = Arc::new(StopSignal::new());
            stop.arm();
            let drivers = world.drivers();
            let clicker = Clicker::new(
                drivers.input.clone(),
                drivers.clock.clone(),
                stop.clone(),
                Humanizer::seeded(StealthConfig::disabled(), 7),
            );
            let executor = MinigameExecutor::new(
                screen.unwrap_or_else(|| drivers.screen.clone()),
                drivers.reader.clone(),
                drivers.notifier.clone(),
                drivers.clock.clone(),
                stop.clone(),
            );
            Self {
                failsafe: FailsafeMonitor::new(drivers.notifier.clone()),
                reconnect: ReconnectController::new(&drivers, stop.clone()),
                world,
                clock,
                stop,
                clicker,
                executor,
            }
        }

        fn run(&mut self, settings: &Settings) -> CycleResult {
            self.executor.run_one_cycle(
                settings,
                &mut self.clicker,
                &mut self.failsafe,
                &self.reconnect,
                AutomationPhase::Fishing,
            )
        }
    }

    fn quiet_screen() -> SimScreenConfig {
        SimScreenConfig {
            sample_cost: Duration::ZERO,
            ..SimScreenConfig::default()
        }
    }

    #[test]
    fn test_reel_latch_gives_one_extra_click() {
        let mut latch = ReelLatch::default();
        let clicks: Vec<bool> = [false, true, true, true, true, false, true, true, true]
            .into_iter()
            .map(|on_target| latch.should_click(on_target))
            .collect();

        assert_eq!(
            clicks,
            vec![true, true, true, false, false, true, true, true, false]
        );
    }

    #[test]
    fn test_successful_cycle() {
        let settings = Settings::testing_preset();
        let mut rig = Rig::new(&settings, quiet_screen());

        assert_eq!(rig.run(&settings), CycleResult::Success);

        let events = rig.world.input.events();
        assert_eq!(events.first(), Some(&SimInputEvent::Click(settings.points.start_fishing)));
        assert!(events.contains(&SimInputEvent::Move(settings.points.idle_position)));
        assert_eq!(events.last(), Some(&SimInputEvent::Click(settings.points.close_result)));
        assert!(events.contains(&SimInputEvent::ClickHere(MouseButton::Left)));

        let caught = rig.world.notifier.sent();
        assert_eq!(caught.len(), 1);
        assert_eq!(caught[0].kind, NotificationKind::FishCaught);
        assert_eq!(caught[0].description, "Salmon");
        assert_eq!(rig.failsafe.consecutive_triggers(), 0);
    }

    #[test]
    fn test_completed_border_checked_every_fiftieth_iteration() {
        let settings = Settings::testing_preset();
        let screen = SimScreenConfig {
            border_after_checks: Some(3),
            ..quiet_screen()
        };
        let mut rig = Rig::new(&settings, screen);

        assert_eq!(rig.run(&settings), CycleResult::Success);
        // Checks at iterations 50, 100 and 150; the reel bar is scanned on
        // every iteration except the one that finished
        assert_eq!(rig.world.screen.border_checks(), 3);
        assert_eq!(rig.world.screen.reel_scans(), 149);
    }

    fn click_here_count(rig: &Rig) -> usize {
        rig.world
            .input
            .events()
            .iter()
            .filter(|event| matches!(event, SimInputEvent::ClickHere(_)))
            .count()
    }

    #[test]
    fn test_reel_tracks_shaded_colour() {
        let settings = Settings::testing_preset();
        let mut rig = Rig::new(&settings, quiet_screen());

        assert_eq!(rig.run(&settings), CycleResult::Success);
        // Marker on target three scans in four, so the latch goes passive
        assert_eq!(rig.world.screen.reel_scans(), 99);
        assert_eq!(click_here_count(&rig), 75);
    }

    #[test]
    fn test_mismatched_shade_only_corrects() {
        let settings = Settings::testing_preset();
        let screen = SimScreenConfig {
            shade: Rgb([200, 40, 40]),
            ..quiet_screen()
        };
        let mut rig = Rig::new(&settings, screen);

        assert_eq!(rig.run(&settings), CycleResult::Success);
        // The marker never matches the reference, so every scan clicks
        let scans = rig.world.screen.reel_scans() as usize;
        assert_eq!(scans, 99);
        assert_eq!(click_here_count(&rig), scans);
    }

    #[test]
    fn test_border_needs_its_own_tolerance() {
        let mut settings = Settings::testing_preset();
        settings.detection.border_tolerance = settings.detection.trigger_tolerance;
        let screen = SimScreenConfig {
            sample_cost: Duration::from_millis(10),
            ..SimScreenConfig::default()
        };
        let mut rig = Rig::new(&settings, screen);
        let started = rig.clock.now();

        assert_eq!(rig.run(&settings), CycleResult::Success);
        // The anti-aliased border is missed, so the reel runs to its timeout
        assert!(rig.world.screen.border_checks() > 2);
        assert!(rig.clock.now() - started >= settings.timings.reactive_timeout());
    }

    #[test]
    fn test_reel_stops_at_timeout() {
        let settings = Settings::testing_preset();
        let screen = SimScreenConfig {
            border_after_checks: None,
            sample_cost: Duration::from_millis(10),
            ..SimScreenConfig::default()
        };
        let mut rig = Rig::new(&settings, screen);

        assert_eq!(rig.run(&settings), CycleResult::Success);
        let reel_scans = rig.world.screen.reel_scans();
        // 9 s at 10 ms per sample, border checks included
        assert!(reel_scans > 800 && reel_scans < 900, "{reel_scans} scans");
    }

    #[test]
    fn test_failsafe_recoveries_before_late_bite() {
        let mut settings = Settings::testing_preset();
        settings.failsafe.timeout_seconds = 20.0;
        let screen = SimScreenConfig {
            bite: BiteSchedule::At(Duration::from_secs(50)),
            ..quiet_screen()
        };
        let mut rig = Rig::new(&settings, screen);

        assert_eq!(rig.run(&settings), CycleResult::Success);
        // floor(50 / 20)
        assert_eq!(rig.world.input.clicks_near(settings.points.failsafe_close), 2);
        assert_eq!(
            rig.world.notifier.count(NotificationKind::FailsafeTriggered),
            2
        );
        assert_eq!(rig.failsafe.consecutive_triggers(), 0);
    }

    #[test]
    fn test_stalls_escalate_to_reconnect() {
        let mut settings = Settings::testing_preset();
        settings.failsafe.reconnect_enabled = true;
        settings.failsafe.reconnect_threshold = 5;
        let screen = SimScreenConfig {
            bite: BiteSchedule::Never,
            ..quiet_screen()
        };
        let mut rig = Rig::new(&settings, screen);

        assert_eq!(rig.run(&settings), CycleResult::ReconnectedViaFailsafe);
        assert_eq!(rig.world.input.clicks_near(settings.points.failsafe_close), 4);
        assert_eq!(rig.world.notifier.count(NotificationKind::Reconnected), 1);
        assert_eq!(rig.failsafe.consecutive_triggers(), 0);
        // Five 20 s stalls before the reconnect began
        assert!(rig.clock.now() >= Duration::from_secs(100));
    }

    #[test]
    fn test_due_reconnect_interrupts_wait() {
        let mut settings = Settings::testing_preset();
        settings.reconnect.enabled = true;
        settings.reconnect.interval_seconds = 5.0;
        let screen = SimScreenConfig {
            bite: BiteSchedule::Never,
            ..quiet_screen()
        };
        let mut rig = Rig::new(&settings, screen);
        rig.reconnect.start_timer();

        assert_eq!(rig.run(&settings), CycleResult::NeedsReconnect);
        assert_eq!(rig.clock.now(), Duration::from_secs(5));
        assert_eq!(rig.world.screen.reel_scans(), 0);
    }

    /// Screen that trips the stop on a given trigger sample
    struct HaltingScreen {
        inner: Arc<dyn PixelSource>,
        stop: Mutex<Option<Arc<StopSignal>>>,
        clock: Arc<ManualClock>,
        halt_on: u32,
        samples: AtomicU32,
        halted_at: Mutex<Option<Duration>>,
        region_scans: AtomicU32,
    }

    impl PixelSource for HaltingScreen {
        fn sample_color(&self, point: Point) -> Result<Rgb<u8>, VisionError> {
            if self.samples.fetch_add(1, Ordering::SeqCst) + 1 == self.halt_on {
                if let Some(stop) = self.stop.lock().unwrap().as_ref() {
                    stop.halt();
                    *self.halted_at.lock().unwrap() = Some(self.clock.now());
                }
            }
            self.inner.sample_color(point)
        }

        fn find_color_in_region(
            &self,
            region: Region,
            target: Rgb<u8>,
            tolerance: u8,
        ) -> Result<Option<Point>, VisionError> {
            self.region_scans.fetch_add(1, Ordering::SeqCst);
            self.inner.find_color_in_region(region, target, tolerance)
        }
    }

    #[test]
    fn test_cancel_during_trigger_wait() {
        let settings = Settings::testing_preset();
        let clock = Arc::new(ManualClock::new());
        let world = SimWorld::new(
            clock.clone(),
            &settings,
            SimScreenConfig {
                bite: BiteSchedule::Never,
                ..quiet_screen()
            },
        );
        let screen = Arc::new(HaltingScreen {
            inner: world.screen.clone(),
            stop: Mutex::new(None),
            clock: clock.clone(),
            halt_on: 7,
            samples: AtomicU32::new(0),
            halted_at: Mutex::new(None),
            region_scans: AtomicU32::new(0),
        });
        let mut rig = Rig::with_screen(world, clock.clone(), Some(screen.clone()));
        *screen.stop.lock().unwrap() = Some(rig.stop.clone());

        assert_eq!(rig.run(&settings), CycleResult::Failure);

        let halted_at = screen.halted_at.lock().unwrap().unwrap();
        assert!(clock.now() - halted_at <= Duration::from_millis(50));
        assert_eq!(screen.region_scans.load(Ordering::SeqCst), 0);
        assert!(!rig
            .world
            .input
            .events()
            .contains(&SimInputEvent::Move(settings.points.idle_position)));
    }

    #[test]
    fn test_capture_error_fails_cycle() {
        let settings = Settings::testing_preset();
        let screen = SimScreenConfig {
            failing_trigger: true,
            ..quiet_screen()
        };
        let mut rig = Rig::new(&settings, screen);

        assert_eq!(rig.run(&settings), CycleResult::Failure);
        assert!(rig.world.notifier.sent().is_empty());
    }
}
