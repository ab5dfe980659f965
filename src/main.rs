//! revex-io - RevEx sensor daemon
//!
//! Connects to the sleeve over the configured transport and runs the fusion
//! pipeline at a fixed tick rate until Ctrl-C, logging orientation and
//! flexion periodically.
//!
//! With `--calibrate-magnetometer` it instead collects raw magnetometer
//! samples while the user rotates the sleeve through every orientation and
//! reports the hard-iron bias to put in `[fusion] hard_iron_bias`.

use revex_io::config::AppConfig;
use revex_io::core::transceiver::Transceiver;
use revex_io::devices::create_transceiver;
use revex_io::error::{Error, Result};
use revex_io::fusion::HardIronEstimator;
use revex_io::tracker::Tracker;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG_PATH: &str = "/etc/revex.toml";

/// Command line options.
///
/// Supports:
/// - `revex-io <path>` (positional)
/// - `revex-io --config <path>` / `-c <path>`
/// - `revex-io --calibrate-magnetometer`
struct Args {
    config_path: String,
    calibrate_magnetometer: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut config_path = None;
    let mut calibrate_magnetometer = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = Some(args[i + 1].clone());
                i += 1;
            }
            "--calibrate-magnetometer" => calibrate_magnetometer = true,
            arg if !arg.starts_with('-') && config_path.is_none() => {
                config_path = Some(arg.to_string());
            }
            arg => eprintln!("Ignoring unknown argument: {}", arg),
        }
        i += 1;
    }

    Args {
        config_path: config_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
        calibrate_magnetometer,
    }
}

fn load_config(path: &str) -> Result<(AppConfig, bool)> {
    if Path::new(path).exists() {
        Ok((AppConfig::from_file(path)?, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let (config, from_file) = load_config(&args.config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("RevexIO v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        log::info!("Using config: {}", args.config_path);
    } else {
        log::warn!("{} not found, using built-in defaults", args.config_path);
    }
    log::info!("Transport: {:?}", config.transport.kind);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let transceiver = create_transceiver(&config, None)?;

    if args.calibrate_magnetometer {
        calibrate_magnetometer(transceiver, &config, &running)
    } else {
        run_tracker(transceiver, &config, &running)
    }
}

fn tick_period(config: &AppConfig) -> Duration {
    Duration::from_secs_f32(1.0 / config.tracker.tick_hz)
}

fn run_tracker(
    transceiver: Box<dyn Transceiver>,
    config: &AppConfig,
    running: &AtomicBool,
) -> Result<()> {
    let mut tracker = Tracker::new(transceiver, config.fusion.clone());
    let period = tick_period(config);
    let report_every = config.tracker.report_every;

    log::info!(
        "Tracking at {:.0} Hz. Press Ctrl-C to stop.",
        config.tracker.tick_hz
    );

    let mut last = Instant::now();
    let mut ticks: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let start = Instant::now();
        let elapsed = start.duration_since(last);
        last = start;

        let output = match tracker.tick(elapsed) {
            Ok(output) => output,
            Err(e) => {
                log::error!("Tick failed: {}", e);
                break;
            }
        };

        ticks += 1;
        if report_every > 0 && ticks % u64::from(report_every) == 0 && output.connected {
            let (roll, pitch, yaw) = output.euler.to_degrees();
            log::info!(
                "roll={:7.2} pitch={:7.2} yaw={:7.2} flexion={:6.1} (raw {:6.1}) battery={}",
                roll,
                pitch,
                yaw,
                output.smoothed_flexion_deg,
                output.flexion_angle_deg,
                tracker
                    .battery_voltage()
                    .map(|v| format!("{:.2} V", v))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }

        if let Some(remaining) = period.checked_sub(start.elapsed()) {
            thread::sleep(remaining);
        }
    }

    log::info!("Shutting down...");
    tracker.close()?;
    log::info!("RevexIO stopped");
    Ok(())
}

fn calibrate_magnetometer(
    mut transceiver: Box<dyn Transceiver>,
    config: &AppConfig,
    running: &AtomicBool,
) -> Result<()> {
    log::info!("Magnetometer calibration: rotate the sleeve slowly through every orientation.");
    log::info!("Press Ctrl-C when done.");

    let period = tick_period(config);
    let mut estimator = HardIronEstimator::new();
    let mut connected = false;
    let mut last_report = Instant::now();

    while running.load(Ordering::Relaxed) {
        if !connected {
            match transceiver.try_establish_connection() {
                Ok(ready) => connected = ready,
                Err(e) if e.is_discovery() => log::warn!("{}, retrying", e),
                Err(e) => {
                    transceiver.close()?;
                    return Err(e);
                }
            }
        }
        while let Some(fault) = transceiver.take_fault() {
            log::warn!("Transport fault: {}", fault);
        }

        if let Some(samples) = transceiver.try_get_sensor_data() {
            for sample in &samples {
                estimator.update(sample.magnetic_field);
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            if let (Some(bias), Some(radius)) = (estimator.bias(), estimator.field_radius()) {
                log::info!(
                    "{} samples, bias=({:.3}, {:.3}, {:.3}) radius=({:.2}, {:.2}, {:.2}) µT",
                    estimator.sample_count(),
                    bias.x,
                    bias.y,
                    bias.z,
                    radius.x,
                    radius.y,
                    radius.z
                );
            }
        }

        thread::sleep(period);
    }

    transceiver.close()?;

    match estimator.bias() {
        Some(bias) => {
            log::info!(
                "Calibration done after {} samples. Add to the [fusion] section:",
                estimator.sample_count()
            );
            log::info!(
                "hard_iron_bias = [{:.3}, {:.3}, {:.3}]",
                bias.x,
                bias.y,
                bias.z
            );
        }
        None => log::warn!("No magnetometer samples received, nothing to report"),
    }
    Ok(())
}
