use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, VocoderError};
use crate::vocoder::synthesis::Synthesizer;

pub trait ExcitationSource: Send {
    fn name(&self) -> &'static str;

    fn next_frame(&mut self) -> Vec<f32>;

    fn note_on(&mut self, _amplitude: f32, _frequency: f32) -> Result<()> {
        Ok(())
    }

    fn note_off(&mut self, _frequency: f32) -> Result<bool> {
        Ok(false)
    }

    fn reset(&mut self) {}
}

impl ExcitationSource for Synthesizer {
    fn name(&self) -> &'static str {
        "synth"
    }

    fn next_frame(&mut self) -> Vec<f32> {
        self.generate_frame()
    }

    fn note_on(&mut self, amplitude: f32, frequency: f32) -> Result<()> {
        Synthesizer::note_on(self, amplitude, frequency)
    }

    fn note_off(&mut self, frequency: f32) -> Result<bool> {
        Synthesizer::note_off(self, frequency)
    }

    fn reset(&mut self) {
        self.all_notes_off();
        Synthesizer::reset(self);
    }
}

pub struct NoiseExcitation {
    frame_size: usize,
    rng: StdRng,
    std_dev: f32,
}

impl NoiseExcitation {
    pub fn new(frame_size: usize, std_dev: f32, seed: Option<u64>) -> Result<Self> {
        if !(std_dev.is_finite() && std_dev >= 0.0) {
            return Err(VocoderError::InvalidConfig(format!(
                "noise std {} must be non-negative",
                std_dev
            )));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { frame_size, rng, std_dev })
    }

    fn sample(&mut self) -> f32 {
        // Box-Muller; u1 in (0, 1] keeps the log finite
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (z * self.std_dev as f64) as f32
    }
}

impl ExcitationSource for NoiseExcitation {
    fn name(&self) -> &'static str {
        "noise"
    }

    fn next_frame(&mut self) -> Vec<f32> {
        (0..self.frame_size).map(|_| self.sample()).collect()
    }
}

pub struct RecordedExcitation {
    frame_size: usize,
    samples: Vec<f32>,
    position: usize,
}

impl RecordedExcitation {
    pub fn new(frame_size: usize, samples: Vec<f32>) -> Result<Self> {
        if samples.is_empty() {
            return Err(VocoderError::InvalidConfig("recorded excitation is empty".to_string()));
        }
        Ok(Self {
            frame_size,
            samples,
            position: 0,
        })
    }
}

impl ExcitationSource for RecordedExcitation {
    fn name(&self) -> &'static str {
        "recorded"
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn next_frame(&mut self) -> Vec<f32> {
        let mut frame = Vec::with_capacity(self.frame_size);
        while frame.len() < self.frame_size {
            let take = (self.frame_size - frame.len()).min(self.samples.len() - self.position);
            frame.extend_from_slice(&self.samples[self.position..self.position + take]);
            self.position = (self.position + take) % self.samples.len();
        }
        frame
    }
}
