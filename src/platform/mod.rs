//! Host platform seams
//!
//! The automation core never touches the OS directly. Input injection,
//! process and window control, recorded macro playback and notification
//! delivery are reached through the traits in this module, implemented by
//! the host application (or by [`sim`] for dry runs and tests).

pub mod input;
pub mod macros;
pub mod notify;
pub mod sim;

use serde::{Deserialize, Serialize};

use crate::vision::Point;

pub use input::{Clicker, DragGuard};
pub use macros::{InputAction, MacroPlayer, MacroRecording, ReplayPlayer, TimedInputEvent};
pub use notify::{LogNotifier, Notification, NotificationKind, Notifier};

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Scroll wheel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Window presentation mode of the game client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    #[default]
    Windowed,
    Fullscreen,
}

/// Ways to terminate the game client, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateStrategy {
    /// Kill the process directly
    Kill,
    /// Ask the OS task tool to kill it by image name
    OsCommand,
    /// Post a polite close message to its windows
    CloseWindow,
}

impl TerminateStrategy {
    pub const ALL: [TerminateStrategy; 3] = [
        TerminateStrategy::Kill,
        TerminateStrategy::OsCommand,
        TerminateStrategy::CloseWindow,
    ];
}

/// Ways to open a server link, from most to least specific
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMethod {
    /// Start the protocol handler process with the URL
    ProtocolProcess,
    /// Go through an intermediate launcher script
    LauncherScript,
    /// Generic "open this URL" call
    UrlOpen,
    /// OS shell `start`/`open` fallback
    Shell,
}

impl LaunchMethod {
    pub const ALL: [LaunchMethod; 4] = [
        LaunchMethod::ProtocolProcess,
        LaunchMethod::LauncherScript,
        LaunchMethod::UrlOpen,
        LaunchMethod::Shell,
    ];
}

/// Input injection primitive. All calls are fire-and-forget.
pub trait InputDriver: Send + Sync {
    /// Move the pointer to `point` and left-click there
    fn move_and_click(&self, point: Point, speed: u32) -> Result<(), PlatformError>;

    /// Move the pointer without clicking
    fn move_to(&self, point: Point) -> Result<(), PlatformError>;

    /// Click at the current pointer position
    fn click(&self, button: MouseButton) -> Result<(), PlatformError>;

    fn mouse_down(&self, button: MouseButton) -> Result<(), PlatformError>;

    fn mouse_up(&self, button: MouseButton) -> Result<(), PlatformError>;

    fn key_down(&self, key: &str) -> Result<(), PlatformError>;

    fn key_up(&self, key: &str) -> Result<(), PlatformError>;

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), PlatformError>;

    /// Press and release a key
    fn send_key(&self, key: &str) -> Result<(), PlatformError> {
        self.key_down(key)?;
        self.key_up(key)
    }

    /// Press a key through the secondary injection path
    fn send_key_fallback(&self, key: &str) -> Result<(), PlatformError> {
        self.send_key(key)
    }
}

/// External process and window control for the game client
pub trait ProcessControl: Send + Sync {
    /// Terminate every process called `name` with one strategy
    fn terminate(&self, name: &str, strategy: TerminateStrategy) -> Result<(), PlatformError>;

    fn is_running(&self, name: &str) -> Result<bool, PlatformError>;

    /// Open `url` with one launch method; `Ok(false)` if the method is unavailable
    fn launch(&self, url: &str, method: LaunchMethod) -> Result<bool, PlatformError>;

    /// Focus the first window whose title contains `title`
    fn find_and_focus_window(&self, title: &str) -> Result<bool, PlatformError>;

    fn restore_and_maximize(&self, title: &str) -> Result<(), PlatformError>;

    fn toggle_fullscreen(&self, title: &str) -> Result<(), PlatformError>;

    fn is_fullscreen(&self, title: &str) -> Result<bool, PlatformError>;

    /// Resize the window to cover the monitor without decorations
    fn resize_borderless(&self, title: &str) -> Result<(), PlatformError>;
}

/// Platform errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("input injection failed: {0}")]
    Input(String),
    #[error("process control failed: {0}")]
    Process(String),
    #[error("window control failed: {0}")]
    Window(String),
    #[error("macro playback failed: {0}")]
    Macro(String),
    #[error("notification delivery failed: {0}")]
    Notify(String),
}
