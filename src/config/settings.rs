//! User settings
//!
//! Defines all configurable options for the automation: calibrated screen
//! points, detection tolerances, failsafe and reconnect behaviour, selling
//! and timings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform::WindowMode;
use crate::stealth::StealthConfig;
use crate::vision::{Point, Region};

/// Shortest allowed wait for the client to finish loading after a relaunch
pub const MIN_LOAD_WAIT_SECONDS: f64 = 60.0;

/// Main settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Calibrated click and sample points
    pub points: ScreenPoints,
    /// Calibrated sample regions
    pub regions: ScreenRegions,
    /// Colour tolerances
    pub detection: DetectionSettings,
    /// Stall detection and local recovery
    pub failsafe: FailsafeSettings,
    /// Scheduled and failsafe client restarts
    pub reconnect: ReconnectSettings,
    /// Periodic selling
    pub auto_sell: AutoSellSettings,
    /// Menu points and recorded travel macros
    pub navigation: NavigationSettings,
    /// Delays and timeouts
    pub timings: TimingSettings,
    /// Click humanization
    pub humanize: StealthConfig,
    /// Names the result reader may report
    pub known_items: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            points: ScreenPoints::default(),
            regions: ScreenRegions::default(),
            detection: DetectionSettings::default(),
            failsafe: FailsafeSettings::default(),
            reconnect: ReconnectSettings::default(),
            auto_sell: AutoSellSettings::default(),
            navigation: NavigationSettings::default(),
            timings: TimingSettings::default(),
            humanize: StealthConfig::default(),
            known_items: [
                "Anchovy",
                "Bream",
                "Carp",
                "Cod",
                "Goldfish",
                "Largemouth Bass",
                "Mackerel",
                "Perch",
                "Pike",
                "Salmon",
                "Sardine",
                "Trout",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Settings {
    /// Settings for long unattended sessions: failsafe escalates to
    /// reconnects and the client is restarted on a schedule
    pub fn unattended_preset() -> Self {
        let mut settings = Self::default();
        settings.failsafe.reconnect_enabled = true;
        settings.reconnect.enabled = true;
        settings.auto_sell.enabled = true;
        settings
    }

    /// Settings with every delay zeroed and humanization off, for dry runs
    pub fn testing_preset() -> Self {
        Self {
            humanize: StealthConfig::disabled(),
            timings: TimingSettings {
                click_delay_ms: 0,
                completed_settle_ms: 0,
                recovery_delay_ms: 0,
                sell_click_delay_ms: 0,
                ..TimingSettings::default()
            },
            navigation: NavigationSettings {
                menu_delay_ms: 0,
                macro_initial_delay_ms: 0,
                ..NavigationSettings::default()
            },
            ..Self::default()
        }
    }

    /// Load settings from a JSON file and clamp them into range
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let payload = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings = serde_json::from_str(&payload)?;

        for adjustment in settings.validate() {
            log::warn!("{}: {}", path.display(), adjustment);
        }
        Ok(settings)
    }

    /// Save settings as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Clamp out-of-range values, returning a description of each change
    #[allow(clippy::neg_cmp_op_on_partial_ord)] // NaN must fail the checks too
    pub fn validate(&mut self) -> Vec<String> {
        let mut adjustments = Vec::new();

        if !(self.failsafe.timeout_seconds > 0.0) {
            adjustments.push(format!(
                "failsafe.timeout_seconds {} raised to 1",
                self.failsafe.timeout_seconds
            ));
            self.failsafe.timeout_seconds = 1.0;
        }
        if self.failsafe.reconnect_threshold == 0 {
            adjustments.push("failsafe.reconnect_threshold 0 raised to 1".to_string());
            self.failsafe.reconnect_threshold = 1;
        }
        if !(self.reconnect.load_wait_seconds >= MIN_LOAD_WAIT_SECONDS) {
            adjustments.push(format!(
                "reconnect.load_wait_seconds {} raised to {}",
                self.reconnect.load_wait_seconds, MIN_LOAD_WAIT_SECONDS
            ));
            self.reconnect.load_wait_seconds = MIN_LOAD_WAIT_SECONDS;
        }
        if !(self.reconnect.interval_seconds > 0.0) {
            adjustments.push(format!(
                "reconnect.interval_seconds {} raised to 60",
                self.reconnect.interval_seconds
            ));
            self.reconnect.interval_seconds = 60.0;
        }
        if self.reconnect.detect_attempts == 0 {
            adjustments.push("reconnect.detect_attempts 0 raised to 1".to_string());
            self.reconnect.detect_attempts = 1;
        }
        if self.timings.poll_interval_ms == 0 {
            adjustments.push("timings.poll_interval_ms 0 raised to 1".to_string());
            self.timings.poll_interval_ms = 1;
        }
        if self.timings.completed_check_every == 0 {
            adjustments.push("timings.completed_check_every 0 raised to 1".to_string());
            self.timings.completed_check_every = 1;
        }
        if self.auto_sell.enabled && self.auto_sell.target_fish_count == 0 {
            adjustments.push("auto_sell.target_fish_count 0 raised to 1".to_string());
            self.auto_sell.target_fish_count = 1;
        }

        adjustments
    }
}

/// Calibrated click and sample points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenPoints {
    /// Click to cast / start the minigame
    pub start_fishing: Point,
    /// Pixel that turns near-white when a fish bites
    pub trigger_pixel: Point,
    /// Pixel holding the colour the reel bar must track
    pub shaded_pixel: Point,
    /// Where the pointer rests so it does not cover sampled pixels
    pub idle_position: Point,
    /// Dismisses the catch result
    pub close_result: Point,
    /// Failsafe: close whatever dialog is open
    pub failsafe_close: Point,
    /// Failsafe: confirm the close
    pub failsafe_confirm: Point,
    /// Shop: first item in the inventory list
    pub sell_first_item: Point,
    /// Shop: sell button
    pub sell_button: Point,
    /// Shop: confirm sale
    pub sell_confirm: Point,
    /// Shop: leave the shop
    pub shop_exit: Point,
}

impl Default for ScreenPoints {
    fn default() -> Self {
        Self {
            start_fishing: Point::new(960, 900),
            trigger_pixel: Point::new(960, 640),
            shaded_pixel: Point::new(960, 858),
            idle_position: Point::new(1700, 200),
            close_result: Point::new(960, 780),
            failsafe_close: Point::new(1410, 290),
            failsafe_confirm: Point::new(960, 610),
            sell_first_item: Point::new(640, 420),
            sell_button: Point::new(1180, 760),
            sell_confirm: Point::new(960, 620),
            shop_exit: Point::new(1560, 200),
        }
    }
}

/// Calibrated sample regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenRegions {
    /// Bar scanned for the tracked colour during the reel minigame
    pub reel_bar: Region,
    /// Border that turns white once the minigame is won
    pub completed_border: Region,
}

impl Default for ScreenRegions {
    fn default() -> Self {
        Self {
            reel_bar: Region::new(660, 840, 1260, 876),
            completed_border: Region::new(650, 830, 670, 886),
        }
    }
}

/// Colour tolerances (per channel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub trigger_tolerance: u8,
    pub reel_tolerance: u8,
    /// Wider tolerance for the anti-aliased completed border
    pub border_tolerance: u8,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            trigger_tolerance: 10,
            reel_tolerance: 12,
            border_tolerance: 40,
        }
    }
}

/// Stall detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailsafeSettings {
    pub enabled: bool,
    /// Longest wait for the trigger pixel before recovering
    pub timeout_seconds: f64,
    /// Escalate repeated stalls to a full reconnect
    pub reconnect_enabled: bool,
    /// Consecutive stalls before escalating
    pub reconnect_threshold: u32,
}

impl Default for FailsafeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 20.0,
            reconnect_enabled: false,
            reconnect_threshold: 5,
        }
    }
}

impl FailsafeSettings {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_seconds)
    }
}

/// Client restart settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Restart the client on a schedule
    pub enabled: bool,
    pub interval_seconds: f64,
    /// Private server link to rejoin; empty to rely on the reconnect prompt
    pub server_link: String,
    pub window_mode: WindowMode,
    /// Client process image names to terminate and wait for
    pub process_names: Vec<String>,
    /// Substring of the client's window title
    pub window_title: String,
    pub kill_settle_seconds: f64,
    pub detect_interval_ms: u64,
    pub detect_attempts: u32,
    pub detect_settle_seconds: f64,
    /// Wait for the client to load after it is detected (at least 60 s)
    pub load_wait_seconds: f64,
    /// Keys sent to accept the in-client reconnect prompt
    pub confirm_keys: Vec<String>,
    pub confirm_key_pause_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 7200.0,
            server_link: String::new(),
            window_mode: WindowMode::Windowed,
            process_names: vec!["RobloxPlayerBeta.exe".to_string()],
            window_title: "Roblox".to_string(),
            kill_settle_seconds: 3.0,
            detect_interval_ms: 500,
            detect_attempts: 120,
            detect_settle_seconds: 5.0,
            load_wait_seconds: MIN_LOAD_WAIT_SECONDS,
            confirm_keys: vec!["tab".to_string(), "tab".to_string(), "enter".to_string()],
            confirm_key_pause_ms: 500,
        }
    }
}

impl ReconnectSettings {
    pub fn interval(&self) -> Duration {
        seconds(self.interval_seconds)
    }

    pub fn kill_settle(&self) -> Duration {
        seconds(self.kill_settle_seconds)
    }

    pub fn detect_settle(&self) -> Duration {
        seconds(self.detect_settle_seconds)
    }

    pub fn load_wait(&self) -> Duration {
        seconds(self.load_wait_seconds.max(MIN_LOAD_WAIT_SECONDS))
    }
}

/// Selling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSellSettings {
    pub enabled: bool,
    /// Catches before heading to the shop
    pub target_fish_count: u32,
    /// Sell everything with a fixed number of passes instead of one per catch
    pub sell_all: bool,
}

impl Default for AutoSellSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_fish_count: 30,
            sell_all: true,
        }
    }
}

/// Camera drag used to look up at the shop keeper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragGesture {
    pub start: Point,
    /// Vertical travel in pixels (negative drags upward)
    pub distance: i32,
    pub steps: u32,
    pub step_delay_ms: u64,
}

impl Default for DragGesture {
    fn default() -> Self {
        Self {
            start: Point::new(960, 540),
            distance: -300,
            steps: 15,
            step_delay_ms: 10,
        }
    }
}

/// Navigation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    pub menu_open: Point,
    pub menu_close: Point,
    pub menu_delay_ms: u64,
    /// Recording that resets the camera to a known angle
    pub camera_align_macro: Option<PathBuf>,
    pub travel_to_fishing_macro: Option<PathBuf>,
    pub travel_to_shop_macro: Option<PathBuf>,
    pub macro_initial_delay_ms: u64,
    pub drag_up: DragGesture,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            menu_open: Point::new(40, 540),
            menu_close: Point::new(1490, 215),
            menu_delay_ms: 700,
            camera_align_macro: None,
            travel_to_fishing_macro: None,
            travel_to_shop_macro: None,
            macro_initial_delay_ms: 500,
            drag_up: DragGesture::default(),
        }
    }
}

/// Timing settings for screen interactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Settle delay after every click (ms)
    pub click_delay_ms: u64,
    /// Pointer speed passed to the input driver
    pub click_speed: u32,
    /// Trigger pixel poll interval (ms)
    pub poll_interval_ms: u64,
    /// Hard cap on the reel minigame
    pub reactive_timeout_seconds: f64,
    /// Reel iterations between completed-border checks
    pub completed_check_every: u32,
    /// Settle after the completed border is seen (ms)
    pub completed_settle_ms: u64,
    pub result_read_timeout_seconds: f64,
    /// Settle between failsafe recovery clicks (ms)
    pub recovery_delay_ms: u64,
    /// Backoff after a critical error in the main loop
    pub error_backoff_seconds: f64,
    /// Settle between shop clicks (ms)
    pub sell_click_delay_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            click_delay_ms: 150,
            click_speed: 0,
            poll_interval_ms: 50,
            reactive_timeout_seconds: 9.0,
            completed_check_every: 50,
            completed_settle_ms: 500,
            result_read_timeout_seconds: 5.0,
            recovery_delay_ms: 500,
            error_backoff_seconds: 2.0,
            sell_click_delay_ms: 300,
        }
    }
}

impl TimingSettings {
    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(self.click_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reactive_timeout(&self) -> Duration {
        seconds(self.reactive_timeout_seconds)
    }

    pub fn result_read_timeout(&self) -> Duration {
        seconds(self.result_read_timeout_seconds)
    }

    pub fn error_backoff(&self) -> Duration {
        seconds(self.error_backoff_seconds)
    }
}

/// Non-negative seconds as a `Duration`, saturating past its range
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Settings loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
}
