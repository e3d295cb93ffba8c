//! Game client restarts
//!
//! A reconnect kills the client, relaunches it (through the server link if
//! one is configured), waits for it to load, fixes up its window and accepts
//! the in-client reconnect prompt. Scheduled reconnects and failsafe
//! reconnects share one controller; `in_progress` keeps them from
//! overlapping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::timing::{interruptible_sleep, Clock, StopSignal};
use super::{AutomationError, Drivers};
use crate::config::ReconnectSettings;
use crate::game::{AutomationPhase, ReconnectState};
use crate::platform::notify::send;
use crate::platform::{
    InputDriver, LaunchMethod, Notification, NotificationKind, Notifier, PlatformError,
    ProcessControl, TerminateStrategy, WindowMode,
};

/// Wait for a fullscreen toggle to take effect before checking it
const FULLSCREEN_SETTLE: Duration = Duration::from_secs(1);

/// Restarts the game client
pub struct ReconnectController {
    process: Arc<dyn ProcessControl>,
    input: Arc<dyn InputDriver>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    stop: Arc<StopSignal>,
    in_progress: AtomicBool,
    timer_start: Mutex<Option<Duration>>,
    /// Set while a navigation macro is playing
    navigation_running: Arc<AtomicBool>,
}

impl ReconnectController {
    pub fn new(drivers: &Drivers, stop: Arc<StopSignal>) -> Self {
        Self {
            process: drivers.process.clone(),
            input: drivers.input.clone(),
            notifier: drivers.notifier.clone(),
            clock: drivers.clock.clone(),
            stop,
            in_progress: AtomicBool::new(false),
            timer_start: Mutex::new(None),
            navigation_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag the navigator raises while a macro plays
    pub fn navigation_flag(&self) -> Arc<AtomicBool> {
        self.navigation_running.clone()
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Restart the reconnect interval from now
    pub fn start_timer(&self) {
        *self.timer() = Some(self.clock.now());
    }

    pub fn clear_timer(&self) {
        *self.timer() = None;
    }

    /// Clock reading at which the next scheduled reconnect is due
    pub fn due_at(&self, settings: &ReconnectSettings) -> Option<Duration> {
        if !settings.enabled {
            return None;
        }
        self.timer().map(|start| start.saturating_add(settings.interval()))
    }

    pub fn state(&self, settings: &ReconnectSettings) -> ReconnectState {
        ReconnectState {
            enabled: settings.enabled,
            interval_seconds: settings.interval_seconds,
            timer_start: *self.timer(),
            in_progress: self.in_progress(),
            server_link: settings.server_link.clone(),
            window_mode: settings.window_mode,
        }
    }

    /// Whether a scheduled reconnect should run now.
    ///
    /// Never while another reconnect runs, while the client is in the shop or
    /// while a navigation macro is playing.
    pub fn should_reconnect_now(
        &self,
        settings: &ReconnectSettings,
        phase: AutomationPhase,
    ) -> bool {
        let Some(due) = self.due_at(settings) else {
            return false;
        };
        if self.clock.now() < due {
            return false;
        }

        !self.in_progress()
            && !phase.is_selling()
            && !self.navigation_running.load(Ordering::SeqCst)
    }

    /// Run the full restart sequence. Blocks the calling thread.
    ///
    /// Returns `false` if another reconnect is already running, on
    /// cancellation or on failure. The interval timer restarts either way.
    pub fn perform_reconnect(&self, settings: &ReconnectSettings) -> bool {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Reconnect already in progress, skipping");
            return false;
        }

        log::info!("Reconnect started");
        send(
            self.notifier.as_ref(),
            Notification::new(
                NotificationKind::ReconnectTriggered,
                "Reconnecting",
                "Restarting the game client",
            ),
        );

        // A run that was live when the reconnect began can cancel it; a
        // diagnostic reconnect on a stopped run always completes
        let cancellable = !self.stop.is_stopped();
        let cancelled = || cancellable && self.stop.is_stopped();

        let result = self.run_sequence(settings, &cancelled);

        self.start_timer();
        self.in_progress.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                log::info!("Reconnect complete");
                send(
                    self.notifier.as_ref(),
                    Notification::new(
                        NotificationKind::Reconnected,
                        "Reconnected",
                        "The game client is back",
                    ),
                );
                true
            }
            Err(AutomationError::Cancelled) => {
                log::info!("Reconnect cancelled");
                false
            }
            Err(e) => {
                log::error!("Reconnect failed: {}", e);
                send(
                    self.notifier.as_ref(),
                    Notification::new(
                        NotificationKind::ReconnectFailed,
                        "Reconnect failed",
                        e.to_string(),
                    ),
                );
                false
            }
        }
    }

    /// Force a reconnect now, leaving the scheduled timer as it was
    pub fn test_reconnect(&self, settings: &ReconnectSettings) -> bool {
        log::info!("Diagnostic reconnect requested");
        let saved = *self.timer();
        let reconnected = self.perform_reconnect(settings);
        *self.timer() = saved;
        reconnected
    }

    fn run_sequence(
        &self,
        settings: &ReconnectSettings,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<(), AutomationError> {
        self.terminate_all(settings);
        self.wait(settings.kill_settle(), cancelled)?;

        if settings.server_link.is_empty() {
            log::info!("No server link configured, relying on the reconnect prompt");
        } else if !self.launch(&settings.server_link) {
            log::warn!("Every launch method failed, continuing with the generic flow");
        }

        if self.wait_for_process(settings, cancelled)? {
            self.wait(settings.detect_settle(), cancelled)?;
            match self.apply_window_mode(settings, cancelled) {
                Err(AutomationError::Cancelled) => return Err(AutomationError::Cancelled),
                Err(e) => log::warn!("Could not set window mode: {}", e),
                Ok(()) => {}
            }
            send(
                self.notifier.as_ref(),
                Notification::new(
                    NotificationKind::ProcessDetected,
                    "Client detected",
                    "Waiting for the game to load",
                )
                .field("Window mode", format!("{:?}", settings.window_mode)),
            );
        } else {
            log::warn!(
                "Client not detected after {} attempts, continuing",
                settings.detect_attempts
            );
        }

        log::info!("Waiting {:?} for the client to load", settings.load_wait());
        self.wait(settings.load_wait(), cancelled)?;

        self.confirm_prompt(settings, cancelled)
    }

    /// Kill every client process with every strategy, tolerating failures
    fn terminate_all(&self, settings: &ReconnectSettings) {
        for name in &settings.process_names {
            for strategy in TerminateStrategy::ALL {
                match self.process.terminate(name, strategy) {
                    Ok(()) => log::debug!("Terminated {} ({:?})", name, strategy),
                    Err(e) => log::warn!("Terminate {} ({:?}) failed: {}", name, strategy, e),
                }
            }
        }
    }

    /// Open the server link, falling back through the launch methods
    fn launch(&self, url: &str) -> bool {
        for method in LaunchMethod::ALL {
            match self.process.launch(url, method) {
                Ok(true) => {
                    log::info!("Launched server link via {:?}", method);
                    return true;
                }
                Ok(false) => log::debug!("Launch via {:?} unavailable", method),
                Err(e) => log::warn!("Launch via {:?} failed: {}", method, e),
            }
        }
        false
    }

    /// Poll for a client process; `Ok(false)` once the attempts run out
    fn wait_for_process(
        &self,
        settings: &ReconnectSettings,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<bool, AutomationError> {
        let interval = Duration::from_millis(settings.detect_interval_ms);

        for attempt in 1..=settings.detect_attempts {
            if cancelled() {
                return Err(AutomationError::Cancelled);
            }
            if self.any_process_running(settings) {
                log::info!("Client process detected (attempt {})", attempt);
                return Ok(true);
            }
            if attempt < settings.detect_attempts {
                self.wait(interval, cancelled)?;
            }
        }
        Ok(false)
    }

    fn any_process_running(&self, settings: &ReconnectSettings) -> bool {
        settings.process_names.iter().any(|name| {
            self.process.is_running(name).unwrap_or_else(|e| {
                log::warn!("Process check for {} failed: {}", name, e);
                false
            })
        })
    }

    fn apply_window_mode(
        &self,
        settings: &ReconnectSettings,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<(), AutomationError> {
        let title = settings.window_title.as_str();
        if !self.process.find_and_focus_window(title)? {
            return Err(PlatformError::Window(format!("no window titled {title:?}")).into());
        }

        match settings.window_mode {
            WindowMode::Windowed => self.process.restore_and_maximize(title)?,
            WindowMode::Fullscreen => {
                if !self.process.is_fullscreen(title)? {
                    self.process.toggle_fullscreen(title)?;
                    self.wait(FULLSCREEN_SETTLE, cancelled)?;
                    if !self.process.is_fullscreen(title)? {
                        log::warn!("Fullscreen toggle did not stick, resizing borderless");
                        self.process.resize_borderless(title)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Send the confirm keys, switching to the fallback path if a key fails
    fn confirm_prompt(
        &self,
        settings: &ReconnectSettings,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<(), AutomationError> {
        let pause = Duration::from_millis(settings.confirm_key_pause_ms);

        for (i, key) in settings.confirm_keys.iter().enumerate() {
            if i > 0 {
                self.wait(pause, cancelled)?;
            }
            if let Err(e) = self.input.send_key(key) {
                log::warn!("Key {} failed ({}), using fallback input", key, e);
                self.input.send_key_fallback(key)?;
            }
        }
        Ok(())
    }

    fn wait(
        &self,
        duration: Duration,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<(), AutomationError> {
        if interruptible_sleep(self.clock.as_ref(), duration, cancelled) {
            Ok(())
        } else {
            Err(AutomationError::Cancelled)
        }
    }

    fn timer(&self) -> MutexGuard<'_, Option<Duration>> {
        match self.timer_start.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
