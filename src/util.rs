pub const LEVEL_FLOOR_DB: f32 = -100.0;

pub fn midi_to_hz(note: f64) -> f64 {
    440.0 * 2.0_f64.powf((note - 69.0) / 12.0)
}

/// Periodic Hann window. Two copies shifted by `size / 2` sum to exactly one.
pub fn hann(size: usize) -> Vec<f64> {
    if size == 0 {
        return Vec::new();
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos()))
        .collect()
}

pub fn std_dev(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt() as f32
}

pub fn amplitude_to_db(level: f32) -> f32 {
    if !level.is_finite() || level <= 0.0 {
        return LEVEL_FLOOR_DB;
    }
    (20.0 * level.log10()).max(LEVEL_FLOOR_DB)
}

pub fn frequency_key(frequency: f32) -> i64 {
    (frequency as f64 * 1000.0).round() as i64
}

pub fn frame_size_for(duration_ms: f64, sample_rate: u32) -> usize {
    (duration_ms * sample_rate as f64 / 1000.0) as usize
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.len() < 2 || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let next = (idx + 1).min(samples.len() - 1);
            lerp(samples[idx] as f64, samples[next] as f64, pos - idx as f64) as f32
        })
        .collect()
}
