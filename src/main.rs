//! Onboard optical-flow sensor: capture thread plus a polling consumer

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use optflow::capture::ReplayDevice;
use optflow::flow::BlockMatchFlow;
use optflow::gyro::NoGyro;
use optflow::platform::Generic;
use optflow::{utils, CaptureError, Config, OpticalFlowSensor, SensorFault};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "OPTFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Play back a recording instead of opening the camera
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Seconds between statistics lines
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("optflow=info"));
    let fmt = tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime());
    let registry = tracing_subscriber::registry().with(filter).with(fmt);

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    let args = Args::parse();
    info!("Optical flow sensor launching...");

    let mut config = Config::load(args.config.as_deref())?;

    let sensor = match &args.replay {
        Some(path) => {
            let device = ReplayDevice::open_recording(
                path,
                config.capture.output_width,
                config.capture.output_height,
                config.capture.record_metadata,
            )?;
            // Don't record the replay onto itself
            config.capture.record_path = None;
            OpticalFlowSensor::start_with(device, &Generic, BlockMatchFlow::new, NoGyro, &config)
        }
        None => {
            if config.capture.device.is_empty() {
                config.capture.device = utils::auto_detect_device()?.path;
            }
            info!("Using capture device: {}", config.capture.device);
            OpticalFlowSensor::start(&config, NoGyro)
        }
    };
    optflow::CONFIG.store(Arc::new(config));

    let sensor = match sensor {
        Ok(sensor) => sensor,
        Err(fault) => {
            error!("Optical flow sensor failed to start: {}", fault);
            return Err(fault.into());
        }
    };

    let poll_hz = optflow::CONFIG.load().consumer.poll_hz.max(1);
    let mut poll = tokio::time::interval(Duration::from_secs(1) / poll_hz);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let stats_every = Duration::from_secs(args.stats_interval.max(1));
    let mut last_stats = Instant::now();

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Some(integral) = sensor.read() {
                    debug!(
                        flow_x = integral.pixel_flow_x_integral,
                        flow_y = integral.pixel_flow_y_integral,
                        gyro_x = integral.gyro_x_integral,
                        gyro_y = integral.gyro_y_integral,
                        dt_us = integral.integration_timespan_us,
                        quality = integral.quality,
                        "flow integral"
                    );
                }
                if last_stats.elapsed() >= stats_every {
                    let stats = sensor.stats();
                    info!(
                        "frames {} pairs {} reads {} empty reads {}",
                        stats.frames_captured, stats.samples_added, stats.reads, stats.empty_reads
                    );
                    last_stats = Instant::now();
                }
            }
            fault = sensor.faults().recv_async() => {
                let replay_done = args.replay.is_some()
                    && matches!(
                        fault,
                        Ok(SensorFault::FrameAcquisition(CaptureError::EndOfStream))
                    );
                return match fault {
                    Ok(_) if replay_done => {
                        if let Some(rest) = sensor.read() {
                            info!("Final integral: {:?}", rest);
                        }
                        info!("Replay finished");
                        Ok(())
                    }
                    Ok(fault) => {
                        error!("Optical flow sensor fault: {}", fault);
                        Err(fault.into())
                    }
                    Err(_) => Err(eyre!("capture thread went away")),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Optical flow sensor shutting down");
                return Ok(());
            }
        }
    }
}
