//! Configuration module
//!
//! Handles user settings: calibration points, failsafe, reconnect, selling
//! and timing preferences.

pub mod settings;

use std::sync::{Arc, RwLock};

pub use settings::{
    AutoSellSettings, ConfigError, DetectionSettings, DragGesture, FailsafeSettings,
    NavigationSettings, ReconnectSettings, ScreenPoints, ScreenRegions, Settings, TimingSettings,
};

/// Settings shared between the front-end (writer) and the worker (reader)
pub type SharedSettings = Arc<RwLock<Settings>>;

/// Clone the current settings, recovering from a poisoned lock
pub fn snapshot(shared: &SharedSettings) -> Settings {
    match shared.read() {
        Ok(settings) => settings.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
