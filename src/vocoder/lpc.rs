use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{Result, VocoderError};
use crate::filter::{all_pole, preemphasis};
use crate::util::hann;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VocodeOptions {
    pub apply_filter: bool,
    pub apply_window: bool,
    pub normalize: bool,
}

impl Default for VocodeOptions {
    fn default() -> Self {
        Self {
            apply_filter: true,
            apply_window: true,
            normalize: true,
        }
    }
}

pub fn check_order(order: usize, window: usize) -> Result<()> {
    if order == 0 || order >= window {
        return Err(VocoderError::InvalidOrder { order, window });
    }
    Ok(())
}

/// Stops early once a reflection coefficient reaches the unit circle or the
/// prediction error is no longer positive; the remaining coefficients stay
/// zero, so the result always has `order` entries and a stable filter.
pub fn levinson_durbin(r: &[f64], order: usize) -> Result<Vec<f64>> {
    if order == 0 || r.len() < order + 1 {
        return Err(VocoderError::InvalidOrder { order, window: r.len() });
    }

    let mut a = vec![0.0; order];
    let mut prev = vec![0.0; order];
    let mut err = r[0];
    if !(err.is_finite() && err > 0.0) {
        return Ok(a);
    }

    for i in 0..order {
        let mut acc = r[i + 1];
        for j in 0..i {
            acc -= a[j] * r[i - j];
        }
        let k = acc / err;
        if !k.is_finite() || k.abs() >= 1.0 {
            break;
        }

        prev[..i].copy_from_slice(&a[..i]);
        for j in 0..i {
            a[j] = prev[j] - k * prev[i - 1 - j];
        }
        a[i] = k;

        err *= 1.0 - k * k;
        if !(err.is_finite() && err > 0.0) {
            break;
        }
    }

    Ok(a)
}

pub fn error_filter(predictor: &[f64]) -> Vec<f64> {
    std::iter::once(1.0)
        .chain(predictor.iter().map(|&a| -a))
        .collect()
}

pub struct LpcAnalyzer {
    planner: FftPlanner<f64>,
    scratch: Vec<Complex<f64>>,
    window: Vec<f64>,
}

impl Default for LpcAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LpcAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            scratch: Vec::new(),
            window: Vec::new(),
        }
    }

    pub fn autocorrelation(&mut self, signal: &[f64], max_lag: usize) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return vec![0.0; max_lag + 1];
        }

        // Zero padding to at least 2n - 1 keeps the circular product linear.
        let fft_len = (2 * n - 1).next_power_of_two();
        let forward = self.planner.plan_fft_forward(fft_len);
        let inverse = self.planner.plan_fft_inverse(fft_len);

        self.scratch.clear();
        self.scratch.extend(signal.iter().map(|&x| Complex::new(x, 0.0)));
        self.scratch.resize(fft_len, Complex::new(0.0, 0.0));

        forward.process(&mut self.scratch);
        for c in self.scratch.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        inverse.process(&mut self.scratch);

        let scale = 1.0 / fft_len as f64;
        (0..=max_lag)
            .map(|k| if k < n { self.scratch[k].re * scale } else { 0.0 })
            .collect()
    }

    pub fn vocode_frame(
        &mut self,
        voice: &[f32],
        excitation: &[f32],
        order: usize,
        alpha: f64,
        options: VocodeOptions,
    ) -> Result<Vec<f32>> {
        if voice.len() != excitation.len() {
            return Err(VocoderError::LengthMismatch {
                voice: voice.len(),
                excitation: excitation.len(),
            });
        }
        let n = voice.len();
        check_order(order, n)?;

        let excitation: Vec<f64> = excitation.iter().map(|&x| x as f64).collect();
        let mut y = if options.apply_filter {
            let voice: Vec<f64> = voice.iter().map(|&x| x as f64).collect();
            let emphasized = preemphasis(&voice, alpha);
            let mut rxx = self.autocorrelation(&emphasized, order);

            let energy = rxx[0];
            if !(energy.is_normal() && energy > 0.0) {
                // No voice energy to model: nothing to shape the excitation with.
                return Ok(vec![0.0; n]);
            }
            if options.normalize {
                rxx.iter_mut().for_each(|r| *r /= energy);
            }

            let predictor = levinson_durbin(&rxx, order)?;
            all_pole(&error_filter(&predictor), &excitation)
        } else {
            excitation
        };

        if options.apply_window {
            if self.window.len() != n {
                self.window = hann(n);
            }
            y.iter_mut().zip(&self.window).for_each(|(s, w)| *s *= w);
        }

        Ok(y.into_iter().map(|s| s as f32).collect())
    }
}

pub fn vocode_frame(
    voice: &[f32],
    excitation: &[f32],
    order: usize,
    alpha: f64,
    options: VocodeOptions,
) -> Result<Vec<f32>> {
    LpcAnalyzer::new().vocode_frame(voice, excitation, order, alpha, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-0.5..0.5)).collect()
    }

    #[test]
    fn test_autocorrelation_matches_direct_sum() {
        let signal = [1.0, 2.0, -1.0, 0.5, 0.0, 3.0];
        let mut analyzer = LpcAnalyzer::new();
        let fast = analyzer.autocorrelation(&signal, 4);
        for (k, r) in fast.iter().enumerate() {
            let direct: f64 = (0..signal.len() - k).map(|i| signal[i] * signal[i + k]).sum();
            assert!((r - direct).abs() < 1e-9, "lag {}: {} vs {}", k, r, direct);
        }
    }

    #[test]
    fn test_levinson_recovers_ar1() {
        // AR(1) with coefficient 0.9 has r[k] = 0.9^k
        let r: Vec<f64> = (0..4).map(|k| 0.9_f64.powi(k)).collect();
        let a = levinson_durbin(&r, 3).unwrap();
        assert!((a[0] - 0.9).abs() < 1e-9);
        assert!(a[1].abs() < 1e-9);
        assert!(a[2].abs() < 1e-9);
        assert_eq!(error_filter(&a)[0], 1.0);
        assert!((error_filter(&a)[1] + 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_levinson_rejects_short_input() {
        assert!(matches!(
            levinson_durbin(&[1.0, 0.5], 2),
            Err(VocoderError::InvalidOrder { .. })
        ));
        assert!(levinson_durbin(&[1.0, 0.5], 0).is_err());
    }

    #[test]
    fn test_vocode_frame_length_mismatch() {
        let err = vocode_frame(&[0.0; 64], &[0.0; 32], 8, 0.97, VocodeOptions::default());
        assert_eq!(err, Err(VocoderError::LengthMismatch { voice: 64, excitation: 32 }));
    }

    #[test]
    fn test_vocode_frame_invalid_order() {
        let err = vocode_frame(&[0.0; 16], &[0.0; 16], 16, 0.97, VocodeOptions::default());
        assert_eq!(err, Err(VocoderError::InvalidOrder { order: 16, window: 16 }));
    }

    #[test]
    fn test_silent_voice_gives_silent_output() {
        let excitation = noise(256, 1);
        for normalize in [true, false] {
            let options = VocodeOptions { normalize, ..Default::default() };
            let out = vocode_frame(&[0.0; 256], &excitation, 24, 0.97, options).unwrap();
            assert_eq!(out.len(), 256);
            assert!(out.iter().all(|&y| y == 0.0));
        }
    }

    #[test]
    fn test_bypass_returns_excitation() {
        let excitation = noise(128, 2);
        let options = VocodeOptions {
            apply_filter: false,
            apply_window: false,
            normalize: true,
        };
        let out = vocode_frame(&noise(128, 3), &excitation, 16, 0.97, options).unwrap();
        assert_eq!(out, excitation);
    }

    #[test]
    fn test_filter_imposes_resonance() {
        // Voice from a sharp two-pole resonator driven by noise.
        let r = 0.98_f64;
        let theta = 2.0 * std::f64::consts::PI * 0.05;
        let denom = [1.0, -2.0 * r * theta.cos(), r * r];
        let source: Vec<f64> = noise(1024, 4).iter().map(|&x| x as f64).collect();
        let voice: Vec<f32> = all_pole(&denom, &source).iter().map(|&x| x as f32).collect();

        let mut impulse = vec![0.0_f32; 1024];
        impulse[0] = 1.0;
        let options = VocodeOptions { apply_window: false, ..Default::default() };
        let out = vocode_frame(&voice, &impulse, 8, 0.0, options).unwrap();

        // The impulse response of a resonant model rings well past the first sample.
        let tail: f32 = out[1..64].iter().map(|y| y.abs()).sum();
        assert!(tail > 1.0, "expected ringing, tail energy {}", tail);
        assert!(out.iter().all(|y| y.is_finite()));
    }

    proptest! {
        #[test]
        fn prop_output_length_matches_input(len in 16usize..512, order in 1usize..16, seed in any::<u64>()) {
            let voice = noise(len, seed);
            let excitation = noise(len, seed.wrapping_add(1));
            let out = vocode_frame(&voice, &excitation, order, 0.97, VocodeOptions::default()).unwrap();
            prop_assert_eq!(out.len(), len);
            prop_assert!(out.iter().all(|y| y.is_finite()));
        }

        #[test]
        fn prop_levinson_coefficient_count(len in 8usize..256, seed in any::<u64>(), frac in 0.0f64..1.0) {
            let order = 1 + ((len - 2) as f64 * frac) as usize;
            let signal: Vec<f64> = noise(len, seed).iter().map(|&x| x as f64).collect();
            let r = LpcAnalyzer::new().autocorrelation(&signal, order);
            let a = levinson_durbin(&r, order).unwrap();
            prop_assert_eq!(a.len(), order);
            let e = error_filter(&a);
            prop_assert_eq!(e.len(), order + 1);
            prop_assert_eq!(e[0], 1.0);
        }
    }
}
