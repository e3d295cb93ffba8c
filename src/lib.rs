//! Autoreel - unattended fishing automation
//!
//! This library provides the core of a screen-driven fishing bot: the phase
//! state machine (navigate, fish, sell), the fishing minigame, stall
//! detection with local recovery, and full client restarts on a schedule or
//! after repeated stalls.
//!
//! ## Host integration
//!
//! The library never touches the OS directly. The host supplies input
//! injection, pixel sampling, process control, macro playback, result
//! reading and notifications as a [`Drivers`] bundle. The `platform::sim`
//! module provides simulated drivers for dry runs and tests.

pub mod automation;
pub mod config;
pub mod game;
pub mod platform;
pub mod stealth;
pub mod vision;

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use crate::automation::{PhaseController, ReconnectController, StopSignal};
use crate::config::{Settings, SharedSettings};
use crate::game::{StatusBoard, StatusSnapshot};

pub use crate::automation::Drivers;

/// Control surface for one automation session
pub struct Autoreel {
    settings: SharedSettings,
    drivers: Drivers,
    stop: Arc<StopSignal>,
    reconnect: Arc<ReconnectController>,
    status: Arc<StatusBoard>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Autoreel {
    /// Create a stopped session with the given settings and host drivers
    pub fn new(settings: Settings, drivers: Drivers) -> Self {
        let stop = Arc::new(StopSignal::new());
        Self {
            settings: Arc::new(RwLock::new(settings)),
            reconnect: Arc::new(ReconnectController::new(&drivers, stop.clone())),
            status: Arc::new(StatusBoard::new()),
            drivers,
            stop,
            worker: Mutex::new(None),
        }
    }

    /// Settings handle; writes take effect at the worker's next tick
    pub fn settings(&self) -> SharedSettings {
        self.settings.clone()
    }

    /// Emergency stop shared with the worker
    pub fn stop_signal(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    /// Start the worker. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut worker = self.worker();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            log::debug!("Start ignored, already running");
            return false;
        }
        if let Some(finished) = worker.take() {
            let _ = finished.join();
        }

        let mut controller = PhaseController::new(
            self.settings.clone(),
            &self.drivers,
            self.stop.clone(),
            self.reconnect.clone(),
            self.status.clone(),
        );
        controller.start();

        let stop = self.stop.clone();
        let spawned = thread::Builder::new()
            .name("autoreel-worker".into())
            .spawn(move || {
                while !stop.is_stopped() {
                    controller.tick();
                }
                controller.stop();
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                true
            }
            Err(e) => {
                log::error!("Failed to start worker thread: {}", e);
                self.stop.halt();
                false
            }
        }
    }

    /// Trip the stop and wait for the worker. Returns `false` if not running.
    pub fn stop(&self) -> bool {
        self.stop.halt();
        let Some(handle) = self.worker().take() else {
            return false;
        };

        if handle.join().is_err() {
            log::error!("Worker thread panicked");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Latest published status
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot(self.drivers.clock.now())
    }

    /// Force an immediate reconnect for diagnostics
    pub fn test_reconnect(&self) -> bool {
        let settings = config::snapshot(&self.settings);
        self.reconnect.test_reconnect(&settings.reconnect)
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Autoreel {
    fn drop(&mut self) {
        self.stop();
    }
}
