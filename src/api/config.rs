use std::path::Path;

use anyhow::Context;
use directories::ProjectDirs;
use knuffel::{Decode, DecodeScalar};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::VocoderError;
use crate::util::frame_size_for;
use crate::vocoder::lpc::check_order;

pub const CONFIG_FILE_NAME: &str = "config.kdl";

#[derive(Decode, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocoderConfig {
    #[knuffel(child, default)]
    pub audio: AudioConfig,
    #[knuffel(child, default)]
    pub lpc: LpcConfig,
    #[knuffel(child, default)]
    pub gate: GateConfig,
    #[knuffel(child, default)]
    pub excitation: ExcitationConfig,
    #[knuffel(child, default)]
    pub output: OutputConfig,
}

#[derive(Decode, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[knuffel(property(name = "sample-rate"), default = 48000)]
    pub sample_rate: u32,
    #[knuffel(property(name = "frame-duration-ms"), default = 10.0)]
    pub frame_duration_ms: f64,
    #[knuffel(property(name = "windows-per-frame"), default = 2)]
    pub windows_per_frame: usize,
    #[knuffel(property(name = "input-highpass-hz"), default = 0.0)]
    pub input_highpass_hz: f64,
}

#[derive(Decode, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpcConfig {
    #[knuffel(property, default = 48)]
    pub order: usize,
    #[knuffel(property, default = 0.97)]
    pub alpha: f64,
}

#[derive(Decode, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[knuffel(property(name = "threshold-db"), default = -40.0)]
    pub threshold_db: f32,
}

#[derive(DecodeScalar, clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExcitationKind {
    Synth,
    Noise,
    Recorded,
}

#[derive(Decode, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcitationConfig {
    #[knuffel(property, default = ExcitationKind::Synth)]
    pub source: ExcitationKind,
    #[knuffel(property(name = "noise-std"), default = 0.01)]
    pub noise_std: f32,
    #[knuffel(property)]
    pub seed: Option<u64>,
    #[knuffel(property)]
    pub file: Option<String>,
    #[knuffel(property(name = "note-amplitude"), default = 1.0)]
    pub note_amplitude: f32,
}

#[derive(Decode, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[knuffel(property, default = 1.0)]
    pub gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            frame_duration_ms: 10.0,
            windows_per_frame: 2,
            input_highpass_hz: 0.0,
        }
    }
}

impl Default for LpcConfig {
    fn default() -> Self {
        Self { order: 48, alpha: 0.97 }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { threshold_db: -40.0 }
    }
}

impl Default for ExcitationConfig {
    fn default() -> Self {
        Self {
            source: ExcitationKind::Synth,
            noise_std: 0.01,
            seed: None,
            file: None,
            note_amplitude: 1.0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl VocoderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config = knuffel::parse::<Self>(CONFIG_FILE_NAME, content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn discover(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            info!("Loading config from {}", path.display());
            return Self::load(path);
        }
        if let Some(dirs) = ProjectDirs::from("com", "lpcvox", "lpcvox") {
            let default_path = dirs.config_dir().join(CONFIG_FILE_NAME);
            if default_path.exists() {
                info!("Loading config from {}", default_path.display());
                return Self::load(&default_path);
            }
        }
        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn frame_size(&self) -> usize {
        frame_size_for(self.audio.frame_duration_ms, self.audio.sample_rate)
    }

    pub fn window_size(&self) -> usize {
        self.frame_size() / self.audio.windows_per_frame.max(1)
    }

    pub fn validate(&self) -> Result<(), VocoderError> {
        if self.audio.sample_rate == 0 {
            return Err(VocoderError::InvalidConfig("sample rate must be positive".to_string()));
        }
        if !(self.audio.frame_duration_ms.is_finite() && self.audio.frame_duration_ms > 0.0) {
            return Err(VocoderError::InvalidConfig(format!(
                "frame duration {}ms must be positive",
                self.audio.frame_duration_ms
            )));
        }
        let frame_size = self.frame_size();
        let windows = self.audio.windows_per_frame;
        if windows == 0 || frame_size % windows != 0 {
            return Err(VocoderError::InvalidConfig(format!(
                "frame of {} samples cannot be split into {} windows",
                frame_size, windows
            )));
        }
        let window_size = self.window_size();
        if window_size < 2 || window_size % 2 != 0 || frame_size % 2 != 0 {
            return Err(VocoderError::InvalidConfig(format!(
                "frame ({}) and window ({}) sizes must be even",
                frame_size, window_size
            )));
        }
        check_order(self.lpc.order, window_size)?;
        if !(0.0..1.0).contains(&self.lpc.alpha) {
            return Err(VocoderError::InvalidConfig(format!(
                "pre-emphasis coefficient {} must be in [0, 1)",
                self.lpc.alpha
            )));
        }
        if !self.gate.threshold_db.is_finite() {
            return Err(VocoderError::InvalidConfig(format!(
                "gate threshold {}dB must be finite",
                self.gate.threshold_db
            )));
        }
        let nyquist = self.audio.sample_rate as f64 / 2.0;
        if self.audio.input_highpass_hz < 0.0 || self.audio.input_highpass_hz >= nyquist {
            return Err(VocoderError::InvalidConfig(format!(
                "input high-pass {}Hz must be in [0, {})",
                self.audio.input_highpass_hz, nyquist
            )));
        }
        if self.excitation.note_amplitude < 0.0 {
            return Err(VocoderError::InvalidAmplitude(self.excitation.note_amplitude));
        }
        if self.excitation.source == ExcitationKind::Recorded && self.excitation.file.is_none() {
            return Err(VocoderError::InvalidConfig(
                "recorded excitation needs a file".to_string(),
            ));
        }
        if !(self.output.gain.is_finite() && self.output.gain >= 0.0) {
            return Err(VocoderError::InvalidConfig(format!(
                "output gain {} must be non-negative",
                self.output.gain
            )));
        }
        Ok(())
    }
}
