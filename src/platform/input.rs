//! Click helpers
//!
//! Wraps the raw [`InputDriver`] with the emergency stop, settle delays and
//! click humanization, so every click in the automation loop is a single
//! cancellable call.

use std::sync::Arc;
use std::time::Duration;

use super::{InputDriver, MouseButton};
use crate::automation::timing::{sleep_or_cancel, Clock, StopSignal};
use crate::automation::AutomationError;
use crate::config::DragGesture;
use crate::stealth::{Humanizer, StealthConfig};
use crate::vision::Point;

/// Cancellable, humanized clicks
pub struct Clicker {
    input: Arc<dyn InputDriver>,
    clock: Arc<dyn Clock>,
    stop: Arc<StopSignal>,
    humanizer: Humanizer,
    /// Pointer speed passed to the driver
    speed: u32,
}

impl Clicker {
    pub fn new(
        input: Arc<dyn InputDriver>,
        clock: Arc<dyn Clock>,
        stop: Arc<StopSignal>,
        humanizer: Humanizer,
    ) -> Self {
        Self {
            input,
            clock,
            stop,
            humanizer,
            speed: 0,
        }
    }

    /// Pick up settings changed since the last tick
    pub fn configure(&mut self, speed: u32, humanize: &StealthConfig) {
        self.speed = speed;
        self.humanizer.set_config(humanize.clone());
    }

    /// Move to `point`, click, then settle for `settle`
    pub fn click(&mut self, point: Point, settle: Duration) -> Result<(), AutomationError> {
        self.stop.check()?;
        let target = self.humanizer.point(point);
        log::trace!("Click at ({}, {})", target.x, target.y);
        self.input.move_and_click(target, self.speed)?;
        self.pause(settle)
    }

    /// Left-click wherever the pointer is
    pub fn click_here(&mut self) -> Result<(), AutomationError> {
        self.stop.check()?;
        self.input.click(MouseButton::Left)?;
        Ok(())
    }

    pub fn move_to(&mut self, point: Point) -> Result<(), AutomationError> {
        self.stop.check()?;
        self.input.move_to(point)?;
        Ok(())
    }

    /// Humanized, interruptible sleep
    pub fn pause(&mut self, duration: Duration) -> Result<(), AutomationError> {
        let duration = self.humanizer.delay(duration);
        sleep_or_cancel(self.clock.as_ref(), &self.stop, duration)
    }

    /// Right-button camera drag; the button is released on every exit path
    pub fn drag(&mut self, gesture: &DragGesture) -> Result<(), AutomationError> {
        self.move_to(gesture.start)?;
        let _held = DragGuard::press(self.input.as_ref(), MouseButton::Right)?;

        let steps = gesture.steps.max(1) as i32;
        for step in 1..=steps {
            self.stop.check()?;
            let dy = gesture.distance * step / steps;
            self.input.move_to(gesture.start.offset(0, dy))?;
            sleep_or_cancel(
                self.clock.as_ref(),
                &self.stop,
                Duration::from_millis(gesture.step_delay_ms),
            )?;
        }

        Ok(())
    }
}

/// Holds a mouse button down until dropped
pub struct DragGuard<'a> {
    input: &'a dyn InputDriver,
    button: MouseButton,
}

impl<'a> DragGuard<'a> {
    pub fn press(input: &'a dyn InputDriver, button: MouseButton) -> Result<Self, AutomationError> {
        input.mouse_down(button)?;
        Ok(Self { input, button })
    }
}

impl Drop for DragGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.input.mouse_up(self.button) {
            log::warn!("Failed to release {:?} button: {}", self.button, e);
        }
    }
}
