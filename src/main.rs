use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lpcvox::api::config::{ExcitationKind, VocoderConfig};
use lpcvox::api::device::{AudioHost, MidiHost};
use lpcvox::args::{Cli, Commands, RunArgs};
use lpcvox::audio::CpalHost;
use lpcvox::midi::MidirHost;
use lpcvox::pipeline::{excitation_from_config, Pipeline};
use log::{info, warn};

const METER_INTERVAL: Duration = Duration::from_millis(100);
const TICKS_PER_REPORT: u64 = 10;

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        log::error!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Run(args) => run_vocoder(args).await,
    }
}

fn list_devices() -> Result<()> {
    let host = CpalHost::new();
    let devices = host.devices().context("Failed to enumerate audio devices")?;
    if devices.is_empty() {
        println!("No audio devices found.");
    }
    for device in devices.iter().filter(|d| d.is_input()) {
        println!("Input: {} ({} ch)", device.name, device.max_input_channels);
    }
    for device in devices.iter().filter(|d| d.is_output()) {
        println!("Output: {} ({} ch)", device.name, device.max_output_channels);
    }

    match MidirHost.ports() {
        Ok(ports) if ports.is_empty() => println!("No MIDI input ports found."),
        Ok(ports) => ports.iter().for_each(|p| println!("MIDI: {}", p)),
        Err(e) => warn!("MIDI unavailable: {}", e),
    }
    Ok(())
}

fn apply_overrides(config: &mut VocoderConfig, args: &RunArgs) {
    if let Some(file) = &args.file {
        config.excitation.file = Some(file.clone());
        config.excitation.source = ExcitationKind::Recorded;
    }
    if let Some(source) = args.source {
        config.excitation.source = source;
    }
    if let Some(threshold_db) = args.threshold_db {
        config.gate.threshold_db = threshold_db;
    }
    if let Some(gain) = args.gain {
        config.output.gain = gain;
    }
}

async fn run_vocoder(args: RunArgs) -> Result<()> {
    let mut config = VocoderConfig::discover(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;
    info!(
        "{}Hz, {} sample frames, LPC order {}",
        config.audio.sample_rate,
        config.frame_size(),
        config.lpc.order
    );

    let source = excitation_from_config(&config)?;
    let mut pipeline = Pipeline::new(config, Box::new(CpalHost::new()), Box::new(MidirHost), source)?;
    let controls = pipeline.controls();

    pipeline
        .start(&args.input, &args.output, &args.midi)
        .context("Failed to start pipeline")?;

    let deadline = async {
        match args.seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut meter = tokio::time::interval(METER_INTERVAL);
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = meter.tick() => {
                ticks += 1;
                if ticks % TICKS_PER_REPORT == 0 {
                    info!(
                        "level {:6.1}dB  threshold {:.1}dB  frames {}  underruns {}",
                        controls.level_db(),
                        controls.threshold_db(),
                        controls.frames_processed(),
                        controls.underruns()
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("Run time elapsed");
                break;
            }
        }
    }

    pipeline.stop()?;
    Ok(())
}
