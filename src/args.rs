use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::api::config::ExcitationKind;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time LPC voice vocoder.")]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Vocode live input until interrupted.
    Run(RunArgs),
    /// List audio devices and MIDI ports.
    Devices,
}

#[derive(clap::Args)]
#[command(allow_negative_numbers = true)]
pub struct RunArgs {
    /// Input device name, empty for the system default.
    #[arg(short, long, default_value = "")]
    pub input: String,
    /// Output device name, empty for the system default.
    #[arg(short, long, default_value = "")]
    pub output: String,
    /// MIDI input port; omit to run without MIDI.
    #[arg(short, long, default_value = "")]
    pub midi: String,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub source: Option<ExcitationKind>,
    /// Recorded excitation file, implies `--source recorded`.
    #[arg(long)]
    pub file: Option<String>,
    #[arg(long)]
    pub threshold_db: Option<f32>,
    #[arg(long)]
    pub gain: Option<f32>,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "lpcvox", "run", "--input", "Mic", "--midi", "Keys", "--source", "noise",
            "--threshold-db", "-50", "--gain", "0.5", "--seconds", "2.5",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.input, "Mic");
        assert_eq!(args.output, "");
        assert_eq!(args.midi, "Keys");
        assert_eq!(args.source, Some(ExcitationKind::Noise));
        assert_eq!(args.threshold_db, Some(-50.0));
        assert_eq!(args.gain, Some(0.5));
        assert_eq!(args.seconds, Some(2.5));
    }

    #[test]
    fn test_negative_threshold_with_equals_and_space() {
        for argv in [
            ["lpcvox", "run", "--threshold-db", "-35.5"],
            ["lpcvox", "run", "--threshold-db=-35.5", "--seconds=1"],
        ] {
            let Commands::Run(args) = Cli::parse_from(argv).command else {
                panic!("expected run");
            };
            assert_eq!(args.threshold_db, Some(-35.5));
        }
    }

    #[test]
    fn test_parse_devices() {
        assert!(matches!(Cli::parse_from(["lpcvox", "devices"]).command, Commands::Devices));
    }
}
