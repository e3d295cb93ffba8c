//! Simulated platform
//!
//! Scripted stand-ins for every host seam: an input recorder, a screen that
//! plays the fishing minigame on a schedule, a game client process that can
//! be killed and relaunched, a macro player, a result reader and a
//! notification recorder. Used by the test suites and by the CLI's
//! `--simulate` mode.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::Rgb;

use super::{
    InputDriver, LaunchMethod, MacroPlayer, MacroRecording, MouseButton, Notification,
    NotificationKind, Notifier, PlatformError, ProcessControl, ScrollDirection, TerminateStrategy,
};
use crate::automation::timing::Clock;
use crate::automation::Drivers;
use crate::config::{ScreenPoints, ScreenRegions, Settings};
use crate::vision::{color_matches, PixelSource, Point, Region, ResultReader, VisionError, WHITE};

/// How far a click may land from a calibrated point and still count as it
const CLICK_SLOP: i32 = 6;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn near(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() <= CLICK_SLOP && (a.y - b.y).abs() <= CLICK_SLOP
}

/// Input event recorded by [`SimInput`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimInputEvent {
    Click(Point),
    ClickHere(MouseButton),
    Move(Point),
    Down(MouseButton),
    Up(MouseButton),
    KeyDown(String),
    KeyUp(String),
    Scroll(ScrollDirection, u32),
    FallbackKey(String),
}

type InputHook = Box<dyn Fn(&SimInputEvent) + Send + Sync>;

/// Input driver that records every event
#[derive(Default)]
pub struct SimInput {
    events: Mutex<Vec<SimInputEvent>>,
    hooks: Mutex<Vec<InputHook>>,
    /// Make the primary key path fail
    failing_keys: AtomicBool,
}

impl SimInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<SimInputEvent> {
        lock(&self.events).clone()
    }

    /// Clicks landing near `point`
    pub fn clicks_near(&self, point: Point) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| matches!(event, SimInputEvent::Click(p) if near(*p, point)))
            .count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    /// Run `hook` after every recorded event
    pub fn on_event(&self, hook: impl Fn(&SimInputEvent) + Send + Sync + 'static) {
        lock(&self.hooks).push(Box::new(hook));
    }

    pub fn set_failing_keys(&self, failing: bool) {
        self.failing_keys.store(failing, Ordering::SeqCst);
    }

    fn record(&self, event: SimInputEvent) -> Result<(), PlatformError> {
        lock(&self.events).push(event.clone());
        for hook in lock(&self.hooks).iter() {
            hook(&event);
        }
        Ok(())
    }

    fn key_path(&self, key: &str) -> Result<(), PlatformError> {
        if self.failing_keys.load(Ordering::SeqCst) {
            Err(PlatformError::Input(format!("key {key} rejected")))
        } else {
            Ok(())
        }
    }
}

impl InputDriver for SimInput {
    fn move_and_click(&self, point: Point, _speed: u32) -> Result<(), PlatformError> {
        self.record(SimInputEvent::Click(point))
    }

    fn move_to(&self, point: Point) -> Result<(), PlatformError> {
        self.record(SimInputEvent::Move(point))
    }

    fn click(&self, button: MouseButton) -> Result<(), PlatformError> {
        self.record(SimInputEvent::ClickHere(button))
    }

    fn mouse_down(&self, button: MouseButton) -> Result<(), PlatformError> {
        self.record(SimInputEvent::Down(button))
    }

    fn mouse_up(&self, button: MouseButton) -> Result<(), PlatformError> {
        self.record(SimInputEvent::Up(button))
    }

    fn key_down(&self, key: &str) -> Result<(), PlatformError> {
        self.key_path(key)?;
        self.record(SimInputEvent::KeyDown(key.to_string()))
    }

    fn key_up(&self, key: &str) -> Result<(), PlatformError> {
        self.key_path(key)?;
        self.record(SimInputEvent::KeyUp(key.to_string()))
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), PlatformError> {
        self.record(SimInputEvent::Scroll(direction, amount))
    }

    fn send_key_fallback(&self, key: &str) -> Result<(), PlatformError> {
        self.record(SimInputEvent::FallbackKey(key.to_string()))
    }
}

/// When the trigger pixel turns white
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiteSchedule {
    Never,
    /// At a fixed clock reading
    At(Duration),
    /// A fixed time after the most recent cast
    AfterCast(Duration),
}

/// Script for [`SimScreen`]
#[derive(Debug, Clone)]
pub struct SimScreenConfig {
    pub bite: BiteSchedule,
    /// Completed border turns white on this check after a cast
    pub border_after_checks: Option<u32>,
    /// Whether the tracked colour is in the reel bar, cycled per scan
    pub reel_pattern: Vec<bool>,
    /// Colour of the shaded reference pixel
    pub shade: Rgb<u8>,
    /// Colour of the fish marker inside the reel bar
    pub marker: Rgb<u8>,
    /// Anti-aliased colour of the completed border
    pub border: Rgb<u8>,
    /// Virtual time consumed by every sample
    pub sample_cost: Duration,
    /// Fail every trigger pixel sample
    pub failing_trigger: bool,
}

impl Default for SimScreenConfig {
    fn default() -> Self {
        Self {
            bite: BiteSchedule::AfterCast(Duration::from_secs(1)),
            border_after_checks: Some(2),
            reel_pattern: vec![false, true, true, true],
            shade: Rgb([90, 160, 220]),
            marker: Rgb([94, 156, 224]),
            border: Rgb([228, 232, 226]),
            sample_cost: Duration::from_millis(1),
            failing_trigger: false,
        }
    }
}

#[derive(Debug, Default)]
struct SimScreenState {
    cast_at: Option<Duration>,
    casts: u32,
    border_checks_since_cast: u32,
    border_checks: u32,
    reel_scans: u32,
}

/// Screen that plays the fishing minigame from a script
pub struct SimScreen {
    clock: Arc<dyn Clock>,
    points: ScreenPoints,
    regions: ScreenRegions,
    config: Mutex<SimScreenConfig>,
    state: Mutex<SimScreenState>,
}

impl SimScreen {
    pub fn new(clock: Arc<dyn Clock>, settings: &Settings, config: SimScreenConfig) -> Self {
        Self {
            clock,
            points: settings.points.clone(),
            regions: settings.regions.clone(),
            config: Mutex::new(config),
            state: Mutex::new(SimScreenState::default()),
        }
    }

    /// Treat clicks on the start point as casts
    pub fn attach(self: &Arc<Self>, input: &SimInput) {
        let screen = Arc::clone(self);
        input.on_event(move |event| {
            if let SimInputEvent::Click(point) = event {
                if near(*point, screen.points.start_fishing) {
                    screen.cast();
                }
            }
        });
    }

    /// Start a new cast now
    pub fn cast(&self) {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        state.cast_at = Some(now);
        state.casts += 1;
        state.border_checks_since_cast = 0;
    }

    pub fn configure(&self, update: impl FnOnce(&mut SimScreenConfig)) {
        update(&mut lock(&self.config));
    }

    pub fn casts(&self) -> u32 {
        lock(&self.state).casts
    }

    /// Completed-border checks since the screen was created
    pub fn border_checks(&self) -> u32 {
        lock(&self.state).border_checks
    }

    pub fn reel_scans(&self) -> u32 {
        lock(&self.state).reel_scans
    }

    fn trigger_white(&self, config: &SimScreenConfig, state: &SimScreenState) -> bool {
        let now = self.clock.now();
        match config.bite {
            BiteSchedule::Never => false,
            BiteSchedule::At(at) => now >= at,
            BiteSchedule::AfterCast(delay) => state
                .cast_at
                .is_some_and(|cast| now.saturating_sub(cast) >= delay),
        }
    }
}

impl PixelSource for SimScreen {
    fn sample_color(&self, point: Point) -> Result<Rgb<u8>, VisionError> {
        let config = lock(&self.config).clone();
        self.clock.sleep(config.sample_cost);
        let mut state = lock(&self.state);

        if point == self.points.trigger_pixel {
            if config.failing_trigger {
                return Err(VisionError::CaptureFailed("simulated capture error".into()));
            }
            let white = self.trigger_white(&config, &state);
            return Ok(if white { WHITE } else { Rgb([40, 60, 80]) });
        }
        if point == self.points.shaded_pixel {
            return Ok(config.shade);
        }
        Ok(Rgb([0, 0, 0]))
    }

    fn find_color_in_region(
        &self,
        region: Region,
        target: Rgb<u8>,
        tolerance: u8,
    ) -> Result<Option<Point>, VisionError> {
        let config = lock(&self.config).clone();
        self.clock.sleep(config.sample_cost);
        let mut state = lock(&self.state);

        if region == self.regions.completed_border {
            state.border_checks += 1;
            state.border_checks_since_cast += 1;
            let done = config
                .border_after_checks
                .is_some_and(|after| state.border_checks_since_cast >= after)
                && color_matches(target, config.border, tolerance);
            return Ok(done.then(|| region.origin()));
        }
        if region == self.regions.reel_bar {
            let index = state.reel_scans as usize;
            state.reel_scans += 1;
            let in_bar = if config.reel_pattern.is_empty() {
                false
            } else {
                config.reel_pattern[index % config.reel_pattern.len()]
            };
            let found = in_bar && color_matches(target, config.marker, tolerance);
            return Ok(found.then(|| region.origin()));
        }
        Ok(None)
    }
}

/// Process control call recorded by [`SimProcess`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    Terminate(String, TerminateStrategy),
    Launch(String, LaunchMethod),
    Focus(String),
    RestoreAndMaximize,
    ToggleFullscreen,
    ResizeBorderless,
}

/// Script for [`SimProcess`]
#[derive(Debug, Clone)]
pub struct SimProcessConfig {
    /// The one launch method that works
    pub working_launch: Option<LaunchMethod>,
    /// Process reappears on this poll after being killed
    pub appears_after_polls: Option<u32>,
    pub fullscreen_toggle_works: bool,
    pub failing_terminate: Vec<TerminateStrategy>,
}

impl Default for SimProcessConfig {
    fn default() -> Self {
        Self {
            working_launch: Some(LaunchMethod::ProtocolProcess),
            appears_after_polls: Some(3),
            fullscreen_toggle_works: true,
            failing_terminate: Vec::new(),
        }
    }
}

/// Game client process that can be killed and relaunched
pub struct SimProcess {
    config: Mutex<SimProcessConfig>,
    running: AtomicBool,
    fullscreen: AtomicBool,
    polls_since_kill: AtomicU32,
    calls: Mutex<Vec<ProcessCall>>,
}

impl SimProcess {
    pub fn new(config: SimProcessConfig) -> Self {
        Self {
            config: Mutex::new(config),
            running: AtomicBool::new(true),
            fullscreen: AtomicBool::new(false),
            polls_since_kill: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        lock(&self.calls).clone()
    }

    pub fn configure(&self, update: impl FnOnce(&mut SimProcessConfig)) {
        update(&mut lock(&self.config));
    }

    pub fn is_fullscreen_now(&self) -> bool {
        self.fullscreen.load(Ordering::SeqCst)
    }

    fn record(&self, call: ProcessCall) {
        lock(&self.calls).push(call);
    }
}

impl Default for SimProcess {
    fn default() -> Self {
        Self::new(SimProcessConfig::default())
    }
}

impl ProcessControl for SimProcess {
    fn terminate(&self, name: &str, strategy: TerminateStrategy) -> Result<(), PlatformError> {
        self.record(ProcessCall::Terminate(name.to_string(), strategy));
        if lock(&self.config).failing_terminate.contains(&strategy) {
            return Err(PlatformError::Process(format!("{strategy:?} refused for {name}")));
        }
        self.running.store(false, Ordering::SeqCst);
        self.polls_since_kill.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self, _name: &str) -> Result<bool, PlatformError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let polls = self.polls_since_kill.fetch_add(1, Ordering::SeqCst) + 1;
        let appears = lock(&self.config)
            .appears_after_polls
            .is_some_and(|after| polls >= after);
        if appears {
            self.running.store(true, Ordering::SeqCst);
        }
        Ok(appears)
    }

    fn launch(&self, url: &str, method: LaunchMethod) -> Result<bool, PlatformError> {
        self.record(ProcessCall::Launch(url.to_string(), method));
        Ok(lock(&self.config).working_launch == Some(method))
    }

    fn find_and_focus_window(&self, title: &str) -> Result<bool, PlatformError> {
        self.record(ProcessCall::Focus(title.to_string()));
        Ok(self.running.load(Ordering::SeqCst))
    }

    fn restore_and_maximize(&self, _title: &str) -> Result<(), PlatformError> {
        self.record(ProcessCall::RestoreAndMaximize);
        self.fullscreen.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn toggle_fullscreen(&self, _title: &str) -> Result<(), PlatformError> {
        self.record(ProcessCall::ToggleFullscreen);
        if lock(&self.config).fullscreen_toggle_works {
            self.fullscreen.fetch_xor(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_fullscreen(&self, _title: &str) -> Result<bool, PlatformError> {
        Ok(self.fullscreen.load(Ordering::SeqCst))
    }

    fn resize_borderless(&self, _title: &str) -> Result<(), PlatformError> {
        self.record(ProcessCall::ResizeBorderless);
        self.fullscreen.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type MacroHook = Box<dyn Fn(&MacroRecording) + Send + Sync>;

/// Macro player that records which recordings were played
pub struct SimMacroPlayer {
    played: Mutex<Vec<String>>,
    completes: AtomicBool,
    hook: Mutex<Option<MacroHook>>,
}

impl SimMacroPlayer {
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            completes: AtomicBool::new(true),
            hook: Mutex::new(None),
        }
    }

    pub fn played(&self) -> Vec<String> {
        lock(&self.played).clone()
    }

    /// Make subsequent playbacks report incomplete
    pub fn set_completes(&self, completes: bool) {
        self.completes.store(completes, Ordering::SeqCst);
    }

    /// Run `hook` while each recording "plays"
    pub fn on_play(&self, hook: impl Fn(&MacroRecording) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Box::new(hook));
    }
}

impl Default for SimMacroPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroPlayer for SimMacroPlayer {
    fn play(
        &self,
        recording: &MacroRecording,
        _initial_delay: Duration,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<bool, PlatformError> {
        lock(&self.played).push(recording.name.clone());
        if let Some(hook) = lock(&self.hook).as_ref() {
            hook(recording);
        }
        Ok(self.completes.load(Ordering::SeqCst) && !cancelled())
    }
}

/// Result reader returning fixed text
pub struct SimReader {
    text: Mutex<String>,
}

impl SimReader {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }
}

impl ResultReader for SimReader {
    fn read_raw(&self) -> Result<String, VisionError> {
        Ok(lock(&self.text).clone())
    }
}

/// Notifier that keeps every notification
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        lock(&self.sent).iter().map(|n| n.kind).collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        lock(&self.sent).iter().filter(|n| n.kind == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), PlatformError> {
        log::debug!("sim notification: {:?} {}", notification.kind, notification.title);
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

/// A complete simulated platform with handles to each part
pub struct SimWorld {
    pub clock: Arc<dyn Clock>,
    pub input: Arc<SimInput>,
    pub screen: Arc<SimScreen>,
    pub process: Arc<SimProcess>,
    pub macros: Arc<SimMacroPlayer>,
    pub reader: Arc<SimReader>,
    pub notifier: Arc<RecordingNotifier>,
}

impl SimWorld {
    pub fn new(clock: Arc<dyn Clock>, settings: &Settings, screen: SimScreenConfig) -> Self {
        let input = Arc::new(SimInput::new());
        let screen = Arc::new(SimScreen::new(clock.clone(), settings, screen));
        screen.attach(&input);

        Self {
            clock,
            input,
            screen,
            process: Arc::new(SimProcess::default()),
            macros: Arc::new(SimMacroPlayer::new()),
            reader: Arc::new(SimReader::new("Salmon")),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    /// Driver bundle backed by this world
    pub fn drivers(&self) -> Drivers {
        Drivers {
            clock: self.clock.clone(),
            input: self.input.clone(),
            screen: self.screen.clone(),
            process: self.process.clone(),
            macros: self.macros.clone(),
            notifier: self.notifier.clone(),
            reader: self.reader.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::timing::ManualClock;

    #[test]
    fn test_screen_bites_after_cast() {
        let clock = Arc::new(ManualClock::new());
        let settings = Settings::testing_preset();
        let config = SimScreenConfig {
            sample_cost: Duration::ZERO,
            ..SimScreenConfig::default()
        };
        let world = SimWorld::new(clock.clone(), &settings, config);

        let trigger = settings.points.trigger_pixel;
        assert_ne!(world.screen.sample_color(trigger).unwrap(), WHITE);

        world
            .input
            .move_and_click(settings.points.start_fishing, 0)
            .unwrap();
        assert_eq!(world.screen.casts(), 1);

        clock.advance(Duration::from_millis(999));
        assert_ne!(world.screen.sample_color(trigger).unwrap(), WHITE);
        clock.advance(Duration::from_millis(1));
        assert_eq!(world.screen.sample_color(trigger).unwrap(), WHITE);
    }

    #[test]
    fn test_process_relaunch() {
        let process = SimProcess::default();
        process.terminate("client.exe", TerminateStrategy::Kill).unwrap();

        assert!(!process.is_running("client.exe").unwrap());
        assert!(!process.is_running("client.exe").unwrap());
        assert!(process.is_running("client.exe").unwrap());
        assert!(process.is_running("client.exe").unwrap());
    }
}
