//! Time, cancellation and polling primitives
//!
//! Every wait in the automation loop goes through these helpers: sleeps are
//! sliced into short chunks with a cancellation check after each, and busy
//! polls share one [`poll_until`] loop. Time is read from an injectable
//! [`Clock`] so the loop can run against virtual time in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::AutomationError;

/// Longest uninterrupted slice of any sleep
pub const SLEEP_GRANULARITY: Duration = Duration::from_millis(100);

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);

    /// Time elapsed since an earlier reading of [`Clock::now`]
    fn since(&self, earlier: Duration) -> Duration {
        self.now().saturating_sub(earlier)
    }
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: sleeping advances time instantly
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Process-wide emergency stop.
///
/// The loop is live only while both `running` (a run was started) and
/// `toggled` (the user's start/stop toggle) are set.
#[derive(Debug, Default)]
pub struct StopSignal {
    running: AtomicBool,
    toggled: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a run as started and toggled on
    pub fn arm(&self) {
        self.toggled.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Trip the emergency stop
    pub fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.toggled.store(false, Ordering::SeqCst);
    }

    pub fn set_toggled(&self, toggled: bool) {
        self.toggled.store(toggled, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        !self.toggled.load(Ordering::SeqCst) || !self.running.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the stop has tripped
    pub fn check(&self) -> Result<(), AutomationError> {
        if self.is_stopped() {
            Err(AutomationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sleep in [`SLEEP_GRANULARITY`] slices, checking `cancelled` after each.
///
/// Returns `false` if the sleep was cut short.
pub fn interruptible_sleep(
    clock: &dyn Clock,
    duration: Duration,
    cancelled: &dyn Fn() -> bool,
) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancelled() {
            return false;
        }
        let slice = remaining.min(SLEEP_GRANULARITY);
        clock.sleep(slice);
        remaining -= slice;
    }
    !cancelled()
}

/// Interruptible sleep bound to the emergency stop
pub fn sleep_or_cancel(
    clock: &dyn Clock,
    stop: &StopSignal,
    duration: Duration,
) -> Result<(), AutomationError> {
    if interruptible_sleep(clock, duration, &|| stop.is_stopped()) {
        Ok(())
    } else {
        Err(AutomationError::Cancelled)
    }
}

/// How a [`poll_until`] loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value
    Ready(T),
    /// The timeout elapsed before the probe produced a value
    TimedOut,
    /// The emergency stop tripped
    Cancelled,
}

/// Run `probe` every `interval` until it yields a value, `timeout` elapses or
/// the stop trips.
///
/// Each iteration checks the stop, then the timeout, then probes, then
/// sleeps. A zero interval gives a tight loop that still honours the stop.
pub fn poll_until<T>(
    clock: &dyn Clock,
    stop: &StopSignal,
    interval: Duration,
    timeout: Option<Duration>,
    mut probe: impl FnMut() -> Option<T>,
) -> PollOutcome<T> {
    let started = clock.now();

    loop {
        if stop.is_stopped() {
            return PollOutcome::Cancelled;
        }
        if timeout.is_some_and(|limit| clock.since(started) >= limit) {
            return PollOutcome::TimedOut;
        }
        if let Some(value) = probe() {
            return PollOutcome::Ready(value);
        }
        if !interval.is_zero() && !interruptible_sleep(clock, interval, &|| stop.is_stopped()) {
            return PollOutcome::Cancelled;
        }
    }
}
