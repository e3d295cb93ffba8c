//! Recorded input macros
//!
//! A recording is a JSON list of input events stamped with their offset
//! from the start of the recording. Playback consults a cancellation check
//! between every event and never leaves a key or button held down when it
//! stops early.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{InputDriver, MouseButton, PlatformError, ScrollDirection};
use crate::automation::timing::{interruptible_sleep, Clock};
use crate::vision::Point;

/// One input action of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputAction {
    KeyDown { key: String },
    KeyUp { key: String },
    MouseMove { x: i32, y: i32 },
    MouseDown { button: MouseButton },
    MouseUp { button: MouseButton },
    Scroll { direction: ScrollDirection, amount: u32 },
}

/// An input action with its offset from the start of the recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedInputEvent {
    /// Milliseconds since the recording started
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: InputAction,
}

/// A named, ordered list of timed input events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroRecording {
    pub name: String,
    pub events: Vec<TimedInputEvent>,
}

impl MacroRecording {
    /// Load a recording from a JSON file
    pub fn load(path: &Path) -> Result<Self, PlatformError> {
        let payload = fs::read_to_string(path)
            .map_err(|e| PlatformError::Macro(format!("read {}: {e}", path.display())))?;
        let mut recording: MacroRecording = serde_json::from_str(&payload)
            .map_err(|e| PlatformError::Macro(format!("parse {}: {e}", path.display())))?;

        if recording.name.is_empty() {
            recording.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        recording.events.sort_by_key(|event| event.at_ms);
        Ok(recording)
    }

    /// Write the recording as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), PlatformError> {
        let payload = serde_json::to_string_pretty(self)
            .map_err(|e| PlatformError::Macro(format!("encode {}: {e}", self.name)))?;
        fs::write(path, payload)
            .map_err(|e| PlatformError::Macro(format!("write {}: {e}", path.display())))
    }

    /// Length of the recording
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.events.last().map_or(0, |event| event.at_ms))
    }
}

/// Recorded macro player
pub trait MacroPlayer: Send + Sync {
    /// Replay `recording` after `initial_delay`.
    ///
    /// Returns `Ok(false)` if `cancelled` reported true before the last event.
    fn play(
        &self,
        recording: &MacroRecording,
        initial_delay: Duration,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<bool, PlatformError>;
}

/// Player that replays recordings through an [`InputDriver`]
pub struct ReplayPlayer {
    input: Arc<dyn InputDriver>,
    clock: Arc<dyn Clock>,
}

impl ReplayPlayer {
    pub fn new(input: Arc<dyn InputDriver>, clock: Arc<dyn Clock>) -> Self {
        Self { input, clock }
    }

    fn dispatch(&self, action: &InputAction) -> Result<(), PlatformError> {
        match action {
            InputAction::KeyDown { key } => self.input.key_down(key),
            InputAction::KeyUp { key } => self.input.key_up(key),
            InputAction::MouseMove { x, y } => self.input.move_to(Point::new(*x, *y)),
            InputAction::MouseDown { button } => self.input.mouse_down(*button),
            InputAction::MouseUp { button } => self.input.mouse_up(*button),
            InputAction::Scroll { direction, amount } => self.input.scroll(*direction, *amount),
        }
    }
}

/// Keys and buttons currently pressed by a replay
#[derive(Default)]
struct HeldInputs {
    keys: Vec<String>,
    buttons: Vec<MouseButton>,
}

impl HeldInputs {
    fn track(&mut self, action: &InputAction) {
        match action {
            InputAction::KeyDown { key } if !self.keys.contains(key) => self.keys.push(key.clone()),
            InputAction::KeyUp { key } => self.keys.retain(|held| held != key),
            InputAction::MouseDown { button } if !self.buttons.contains(button) => {
                self.buttons.push(*button)
            }
            InputAction::MouseUp { button } => self.buttons.retain(|held| held != button),
            _ => {}
        }
    }

    fn release(&mut self, input: &dyn InputDriver) {
        for key in self.keys.drain(..) {
            if let Err(e) = input.key_up(&key) {
                log::warn!("Failed to release key {}: {}", key, e);
            }
        }
        for button in self.buttons.drain(..) {
            if let Err(e) = input.mouse_up(button) {
                log::warn!("Failed to release {:?} button: {}", button, e);
            }
        }
    }
}

impl MacroPlayer for ReplayPlayer {
    fn play(
        &self,
        recording: &MacroRecording,
        initial_delay: Duration,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<bool, PlatformError> {
        log::debug!(
            "Playing macro {} ({} events, {:?})",
            recording.name,
            recording.events.len(),
            recording.duration()
        );

        if !interruptible_sleep(self.clock.as_ref(), initial_delay, cancelled) {
            return Ok(false);
        }

        let started = self.clock.now();
        let mut held = HeldInputs::default();

        for event in &recording.events {
            let due = Duration::from_millis(event.at_ms);
            let wait = due.saturating_sub(self.clock.since(started));
            if cancelled() || !interruptible_sleep(self.clock.as_ref(), wait, cancelled) {
                held.release(self.input.as_ref());
                log::info!("Macro {} cancelled", recording.name);
                return Ok(false);
            }

            if let Err(e) = self.dispatch(&event.action) {
                held.release(self.input.as_ref());
                return Err(e);
            }
            held.track(&event.action);
        }

        held.release(self.input.as_ref());
        Ok(true)
    }
}
