use std::collections::BTreeMap;

use log::debug;

use crate::error::{Result, VocoderError};
use crate::util::{frequency_key, hann};
use crate::vocoder::shift::ShiftBuffer;

pub struct Synthesizer {
    frame_size: usize,
    sample_rate: u32,
    step_size: usize,
    step_index: u64,
    // keyed by frequency in millihertz
    notes: BTreeMap<i64, f32>,
    frames: ShiftBuffer,
    window: Vec<f64>,
}

impl Synthesizer {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            frame_size,
            sample_rate,
            step_size: frame_size / 2,
            step_index: 0,
            notes: BTreeMap::new(),
            frames: ShiftBuffer::new(frame_size, 3),
            window: hann(frame_size),
        }
    }

    pub fn note_on(&mut self, amplitude: f32, frequency: f32) -> Result<()> {
        if !amplitude.is_finite() || amplitude < 0.0 {
            return Err(VocoderError::InvalidAmplitude(amplitude));
        }
        validate_frequency(frequency)?;
        debug!("Note on: {:.3}Hz amplitude {}", frequency, amplitude);
        self.notes.insert(frequency_key(frequency), amplitude);
        Ok(())
    }

    pub fn note_off(&mut self, frequency: f32) -> Result<bool> {
        validate_frequency(frequency)?;
        let removed = self.notes.remove(&frequency_key(frequency)).is_some();
        if removed {
            debug!("Note off: {:.3}Hz", frequency);
        }
        Ok(removed)
    }

    pub fn all_notes_off(&mut self) {
        self.notes.clear();
    }

    pub fn generate_waveform(&self, time: &[f64]) -> Vec<f32> {
        let mut out = vec![0.0_f64; time.len()];
        let nyquist = self.sample_rate as f64 / 2.0;

        for (&key, &amplitude) in &self.notes {
            let freq = key as f64 / 1000.0;
            if freq <= 0.0 || amplitude == 0.0 {
                continue;
            }
            // Harmonics strictly below Nyquist.
            let num_harmonics = ((nyquist / freq).ceil() as usize).saturating_sub(1);
            if num_harmonics == 0 {
                continue;
            }
            let terms = (2 * num_harmonics + 1) as f64;
            for (y, &t) in out.iter_mut().zip(time) {
                *y += amplitude as f64 * (dirichlet(freq * t, terms) - 1.0 / terms);
            }
        }

        out.into_iter().map(|y| y as f32).collect()
    }

    pub fn generate_frame(&mut self) -> Vec<f32> {
        let n = self.frame_size;
        self.frames.shift();

        for start in [n / 2 + n, 2 * n] {
            let t = self.next_frame_time();
            let mut grain = self.generate_waveform(&t);
            grain.iter_mut().zip(&self.window).for_each(|(s, &w)| *s *= w as f32);
            self.frames.accumulate(start, &grain);
        }

        self.frames.head().to_vec()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.step_index = 0;
    }

    fn next_frame_time(&mut self) -> Vec<f64> {
        let offset = self.step_index * self.step_size as u64;
        self.step_index += 1;
        let fs = self.sample_rate as f64;
        (0..self.frame_size as u64).map(|i| (offset + i) as f64 / fs).collect()
    }
}

fn validate_frequency(frequency: f32) -> Result<()> {
    if !frequency.is_finite() || frequency < 0.0 {
        return Err(VocoderError::InvalidFrequency(frequency));
    }
    Ok(())
}

// `terms` is odd, so the value at every period boundary is exactly one.
fn dirichlet(cycles: f64, terms: f64) -> f64 {
    let half = std::f64::consts::PI * cycles.fract();
    let denom = half.sin();
    if denom.abs() < 1e-9 {
        return 1.0;
    }
    (terms * half).sin() / (terms * denom)
}
