//! Walking between the fishing spot and the shop, and selling

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::timing::StopSignal;
use super::AutomationError;
use crate::config::{NavigationSettings, Settings};
use crate::platform::{Clicker, MacroPlayer, MacroRecording};

/// Sell passes in sell-all mode, enough to empty any inventory
pub const SELL_ALL_PASSES: u32 = 51;

/// Raises the navigation flag for as long as it lives
struct NavigationGuard<'a>(&'a AtomicBool);

impl<'a> NavigationGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for NavigationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs the navigation and selling sequences
pub struct Navigator {
    macros: Arc<dyn MacroPlayer>,
    stop: Arc<StopSignal>,
    navigation_running: Arc<AtomicBool>,
}

impl Navigator {
    pub fn new(
        macros: Arc<dyn MacroPlayer>,
        stop: Arc<StopSignal>,
        navigation_running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            macros,
            stop,
            navigation_running,
        }
    }

    /// Menu reset, camera alignment and the walk to the fishing spot.
    ///
    /// `Ok(false)` if a macro did not finish.
    pub fn to_fishing_spot(
        &self,
        clicker: &mut Clicker,
        settings: &Settings,
    ) -> Result<bool, AutomationError> {
        let nav = &settings.navigation;
        log::info!("Navigating to the fishing spot");

        self.reset_menu(clicker, nav)?;
        Ok(self.play(&nav.camera_align_macro, "camera alignment", nav)?
            && self.play(&nav.travel_to_fishing_macro, "travel to fishing", nav)?)
    }

    /// Menu reset, camera alignment, the walk to the shop and the drag up
    /// to face the shop keeper
    pub fn to_shop(
        &self,
        clicker: &mut Clicker,
        settings: &Settings,
    ) -> Result<bool, AutomationError> {
        let nav = &settings.navigation;
        log::info!("Navigating to the shop");

        self.reset_menu(clicker, nav)?;
        if !(self.play(&nav.camera_align_macro, "camera alignment", nav)?
            && self.play(&nav.travel_to_shop_macro, "travel to shop", nav)?)
        {
            return Ok(false);
        }

        clicker.drag(&nav.drag_up)?;
        Ok(true)
    }

    /// Run the sell sequence and leave the shop. Returns the passes made.
    pub fn sell(&self, clicker: &mut Clicker, settings: &Settings) -> Result<u32, AutomationError> {
        let passes = if settings.auto_sell.sell_all {
            SELL_ALL_PASSES
        } else {
            settings.auto_sell.target_fish_count
        };
        let points = &settings.points;
        let delay = Duration::from_millis(settings.timings.sell_click_delay_ms);
        log::info!("Selling ({} passes)", passes);

        for pass in 1..=passes {
            self.stop.check()?;
            log::trace!("Sell pass {}/{}", pass, passes);
            clicker.click(points.sell_first_item, delay)?;
            clicker.click(points.sell_button, delay)?;
            clicker.click(points.sell_confirm, delay)?;
        }

        clicker.click(points.shop_exit, settings.timings.click_delay())?;
        Ok(passes)
    }

    fn reset_menu(
        &self,
        clicker: &mut Clicker,
        nav: &NavigationSettings,
    ) -> Result<(), AutomationError> {
        let delay = Duration::from_millis(nav.menu_delay_ms);
        clicker.click(nav.menu_open, delay)?;
        clicker.click(nav.menu_close, delay)
    }

    /// Play one recorded macro; an unset path is skipped
    fn play(
        &self,
        path: &Option<PathBuf>,
        label: &str,
        nav: &NavigationSettings,
    ) -> Result<bool, AutomationError> {
        let Some(path) = path else {
            log::debug!("No {} macro configured, skipping", label);
            return Ok(true);
        };

        let recording = MacroRecording::load(path)?;
        log::info!("Playing {} ({} events)", label, recording.events.len());

        let _navigating = NavigationGuard::raise(&self.navigation_running);
        let stop = &self.stop;
        let completed = self.macros.play(
            &recording,
            Duration::from_millis(nav.macro_initial_delay_ms),
            &|| stop.is_stopped(),
        )?;

        self.stop.check()?;
        if !completed {
            log::warn!("Macro {} did not complete", recording.name);
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::timing::ManualClock;
    use crate::platform::sim::{SimInputEvent, SimScreenConfig, SimWorld};
    use crate::platform::{InputAction, MouseButton, TimedInputEvent};
    use crate::stealth::{Humanizer, StealthConfig};

    struct Rig {
        world: SimWorld,
        clicker: Clicker,
        navigator: Navigator,
        flag: Arc<AtomicBool>,
        stop: Arc<StopSignal>,
    }

    fn rig(settings: &Settings) -> Rig {
        let clock = Arc::new(ManualClock::new());
        let world = SimWorld::new(clock, settings, SimScreenConfig::default());
        let stop = Arc::new(StopSignal::new());
        stop.arm();
        let flag = Arc::new(AtomicBool::new(false));
        let drivers = world.drivers();
        Rig {
            clicker: Clicker::new(
                drivers.input.clone(),
                drivers.clock.clone(),
                stop.clone(),
                Humanizer::seeded(StealthConfig::disabled(), 3),
            ),
            navigator: Navigator::new(drivers.macros.clone(), stop.clone(), flag.clone()),
            world,
            flag,
            stop,
        }
    }

    fn write_macro(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(format!("{name}.json"));
        MacroRecording {
            name: name.to_string(),
            events: vec![TimedInputEvent {
                at_ms: 0,
                action: InputAction::KeyDown { key: "w".into() },
            }],
        }
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn test_to_fishing_spot_plays_macros_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::testing_preset();
        settings.navigation.camera_align_macro = Some(write_macro(dir.path(), "align"));
        settings.navigation.travel_to_fishing_macro = Some(write_macro(dir.path(), "to_pier"));
        let mut rig = rig(&settings);

        let flag = rig.flag.clone();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        rig.world.macros.on_play({
            let seen = seen.clone();
            move |_| seen.lock().unwrap().push(flag.load(Ordering::SeqCst))
        });

        assert!(rig.navigator.to_fishing_spot(&mut rig.clicker, &settings).unwrap());
        assert_eq!(rig.world.macros.played(), vec!["align", "to_pier"]);
        // The flag is up during playback and down afterwards
        assert_eq!(*seen.lock().unwrap(), vec![true, true]);
        assert!(!rig.flag.load(Ordering::SeqCst));
        assert_eq!(
            rig.world.input.events()[..2],
            [
                SimInputEvent::Click(settings.navigation.menu_open),
                SimInputEvent::Click(settings.navigation.menu_close)
            ]
        );
    }

    #[test]
    fn test_incomplete_macro_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::testing_preset();
        settings.navigation.camera_align_macro = Some(write_macro(dir.path(), "align"));
        settings.navigation.travel_to_shop_macro = Some(write_macro(dir.path(), "to_shop"));
        let mut rig = rig(&settings);
        rig.world.macros.set_completes(false);

        assert!(!rig.navigator.to_shop(&mut rig.clicker, &settings).unwrap());
        // Stopped after the first macro, no drag
        assert_eq!(rig.world.macros.played(), vec!["align"]);
        assert!(!rig
            .world
            .input
            .events()
            .contains(&SimInputEvent::Down(MouseButton::Right)));
    }

    #[test]
    fn test_to_shop_drags_camera() {
        let settings = Settings::testing_preset();
        let mut rig = rig(&settings);

        assert!(rig.navigator.to_shop(&mut rig.clicker, &settings).unwrap());
        let events = rig.world.input.events();
        assert!(events.contains(&SimInputEvent::Down(MouseButton::Right)));
        assert_eq!(events.last(), Some(&SimInputEvent::Up(MouseButton::Right)));
    }

    #[test]
    fn test_missing_macro_file_is_an_error() {
        let mut settings = Settings::testing_preset();
        settings.navigation.camera_align_macro = Some(PathBuf::from("/nonexistent/align.json"));
        let mut rig = rig(&settings);

        assert!(matches!(
            rig.navigator.to_fishing_spot(&mut rig.clicker, &settings),
            Err(AutomationError::Platform(_))
        ));
        assert!(!rig.flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sell_pass_counts() {
        let mut settings = Settings::testing_preset();
        let mut rig = rig(&settings);

        assert_eq!(rig.navigator.sell(&mut rig.clicker, &settings).unwrap(), SELL_ALL_PASSES);
        assert_eq!(rig.world.input.clicks_near(settings.points.sell_button), 51);

        settings.auto_sell.sell_all = false;
        settings.auto_sell.target_fish_count = 4;
        rig.world.input.clear();
        assert_eq!(rig.navigator.sell(&mut rig.clicker, &settings).unwrap(), 4);
        assert_eq!(rig.world.input.clicks_near(settings.points.sell_confirm), 4);
        assert_eq!(
            rig.world.input.events().last(),
            Some(&SimInputEvent::Click(settings.points.shop_exit))
        );
    }

    #[test]
    fn test_sell_stops_when_cancelled() {
        let settings = Settings::testing_preset();
        let mut rig = rig(&settings);
        let stop = rig.stop.clone();
        let sell_button = settings.points.sell_button;
        rig.world.input.on_event(move |event| {
            if *event == SimInputEvent::Click(sell_button) {
                stop.halt();
            }
        });

        assert!(matches!(
            rig.navigator.sell(&mut rig.clicker, &settings),
            Err(AutomationError::Cancelled)
        ));
        assert_eq!(rig.world.input.clicks_near(settings.points.sell_button), 1);
        assert_eq!(rig.world.input.clicks_near(settings.points.shop_exit), 0);
    }
}
