use anyhow::{anyhow, Result};
use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F64};

// The sample before the window is extrapolated as `2 * x[0] - x[1]`.
pub fn preemphasis(signal: &[f64], alpha: f64) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let mut prev = match signal {
        [a, b, ..] => 2.0 * a - b,
        [a] => *a,
        [] => 0.0,
    };
    signal
        .iter()
        .map(|&x| {
            let y = x - alpha * prev;
            prev = x;
            y
        })
        .collect()
}

pub fn all_pole(denominator: &[f64], input: &[f64]) -> Vec<f64> {
    let a0 = denominator.first().copied().unwrap_or(1.0);
    let taps = denominator.get(1..).unwrap_or(&[]);
    let mut output = vec![0.0; input.len()];
    for n in 0..input.len() {
        let mut acc = input[n];
        for (k, &a) in taps.iter().enumerate() {
            let lag = k + 1;
            if lag > n {
                break;
            }
            acc -= a * output[n - lag];
        }
        let y = acc / a0;
        output[n] = if y.is_finite() { y } else { 0.0 };
    }
    output
}

pub fn make_coefficients(f_type: Type<f64>, fs: f64, freq: f64, q: f64) -> Result<Coefficients<f64>> {
    Coefficients::<f64>::from_params(f_type, fs.hz(), freq.hz(), q).map_err(|_| anyhow!("Failed to create filter coefficients"))
}

pub struct InputConditioner {
    hpf: DirectForm1<f64>,
}

impl InputConditioner {
    pub fn new(sample_rate: u32, cutoff_hz: f64) -> Result<Self> {
        let coeffs = make_coefficients(Type::HighPass, sample_rate as f64, cutoff_hz, Q_BUTTERWORTH_F64)?;
        Ok(Self { hpf: DirectForm1::<f64>::new(coeffs) })
    }

    pub fn process(&mut self, frame: &mut [f32]) {
        frame.iter_mut().for_each(|x| *x = self.hpf.run(*x as f64) as f32);
    }

    pub fn reset(&mut self) {
        self.hpf.reset_state();
    }
}
