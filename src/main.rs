//! Autoreel CLI - testing and development entry point
//!
//! Loads and validates a settings file, prints the effective configuration
//! and can run a whole session against simulated drivers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use autoreel::automation::SystemClock;
use autoreel::config::Settings;
use autoreel::platform::sim::{BiteSchedule, SimScreenConfig, SimWorld};
use autoreel::Autoreel;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "autoreel")]
#[command(version)]
#[command(about = "Unattended fishing automation with stall detection and reconnect recovery")]
struct Args {
    /// Settings file (JSON); defaults are used when omitted
    settings: Option<PathBuf>,

    /// Run a session against simulated drivers for this many seconds
    #[arg(long, value_name = "SECS")]
    simulate: Option<u64>,

    /// Write the default settings to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_default: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Some(path) = &args.write_default {
        if let Err(e) = Settings::default().save(path) {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
        println!("Wrote default settings to {}", path.display());
        return ExitCode::SUCCESS;
    }

    let mut settings = match &args.settings {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };
    for adjustment in settings.validate() {
        log::warn!("{}", adjustment);
    }

    println!("Autoreel - unattended fishing automation");
    println!("========================================");
    println!();
    print_settings(&settings);

    match args.simulate {
        Some(secs) => simulate(settings, Duration::from_secs(secs)),
        None => {
            println!();
            println!("No host drivers are built into the CLI.");
            println!("Use --simulate SECONDS for a dry run against simulated drivers.");
            ExitCode::SUCCESS
        }
    }
}

fn print_settings(settings: &Settings) {
    println!("Current Configuration:");
    println!(
        "  - Failsafe: {} ({}s timeout, reconnect after {} stalls: {})",
        on_off(settings.failsafe.enabled),
        settings.failsafe.timeout_seconds,
        settings.failsafe.reconnect_threshold,
        on_off(settings.failsafe.reconnect_enabled)
    );
    println!(
        "  - Scheduled reconnect: {} (every {}s, {:?})",
        on_off(settings.reconnect.enabled),
        settings.reconnect.interval_seconds,
        settings.reconnect.window_mode
    );
    println!(
        "  - Auto-sell: {} (at {} fish, sell all: {})",
        on_off(settings.auto_sell.enabled),
        settings.auto_sell.target_fish_count,
        settings.auto_sell.sell_all
    );
    println!(
        "  - Humanize: timing {}, position {}",
        on_off(settings.humanize.humanize_timing),
        on_off(settings.humanize.humanize_position)
    );
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn simulate(settings: Settings, duration: Duration) -> ExitCode {
    let screen = SimScreenConfig {
        bite: BiteSchedule::AfterCast(Duration::from_secs(2)),
        ..SimScreenConfig::default()
    };
    let world = SimWorld::new(Arc::new(SystemClock::new()), &settings, screen);
    let session = Autoreel::new(settings, world.drivers());

    let stop = session.stop_signal();
    if let Err(e) = ctrlc::set_handler(move || stop.halt()) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    println!();
    println!("Simulating for {}s (Ctrl+C to stop)", duration.as_secs());
    if !session.start() {
        return ExitCode::FAILURE;
    }

    let started = Instant::now();
    while session.is_running() && started.elapsed() < duration {
        thread::sleep(Duration::from_secs(1));
        println!("{}", session.status().to_json());
    }
    session.stop();

    let status = session.status();
    println!();
    println!("Finished in {} with {} fish", status.phase, status.fish_count);
    println!(
        "Simulated input events: {}, notifications: {}",
        world.input.events().len(),
        world.notifier.sent().len()
    );
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_options() {
        let args = Args::try_parse_from([
            "autoreel",
            "settings.json",
            "--simulate",
            "30",
            "--write-default",
            "out.json",
        ])
        .unwrap();

        assert_eq!(args.settings, Some(PathBuf::from("settings.json")));
        assert_eq!(args.simulate, Some(30));
        assert_eq!(args.write_default, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_parse_defaults_and_rejects_bad_values() {
        let args = Args::try_parse_from(["autoreel"]).unwrap();
        assert!(args.settings.is_none());
        assert!(args.simulate.is_none());

        assert!(Args::try_parse_from(["autoreel", "--simulate", "soon"]).is_err());
        assert!(Args::try_parse_from(["autoreel", "--unknown"]).is_err());
    }
}
