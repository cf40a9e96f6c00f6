use crate::error::{Result, VocoderError};
use crate::vocoder::lpc::{check_order, LpcAnalyzer, VocodeOptions};
use crate::vocoder::shift::ShiftBuffer;

/// 50% overlap-add over two windows per call; output lags input by one frame.
pub struct LpcEngine {
    frame_size: usize,
    order: usize,
    alpha: f64,
    options: VocodeOptions,
    analyzer: LpcAnalyzer,
    voice: ShiftBuffer,
    excitation: ShiftBuffer,
    output: ShiftBuffer,
}

impl LpcEngine {
    pub fn new(frame_size: usize, order: usize, alpha: f64) -> Result<Self> {
        Self::with_options(frame_size, order, alpha, VocodeOptions::default())
    }

    pub fn with_options(frame_size: usize, order: usize, alpha: f64, options: VocodeOptions) -> Result<Self> {
        if frame_size < 2 {
            return Err(VocoderError::InvalidConfig(format!(
                "frame size {} is too small for overlap-add",
                frame_size
            )));
        }
        check_order(order, frame_size)?;
        Ok(Self {
            frame_size,
            order,
            alpha,
            options,
            analyzer: LpcAnalyzer::new(),
            voice: ShiftBuffer::new(frame_size, 2),
            excitation: ShiftBuffer::new(frame_size, 2),
            output: ShiftBuffer::new(frame_size, 2),
        })
    }

    pub fn process_frame(&mut self, voice_frame: &[f32], excitation_frame: &[f32]) -> Result<Vec<f32>> {
        for len in [voice_frame.len(), excitation_frame.len()] {
            if len != self.frame_size {
                return Err(VocoderError::ShapeMismatch {
                    expected: self.frame_size,
                    actual: len,
                });
            }
        }

        let n = self.frame_size;
        self.voice.push(voice_frame);
        self.excitation.push(excitation_frame);
        self.output.shift();

        for start in [n / 2, n] {
            let y = self.analyzer.vocode_frame(
                self.voice.window(start, n),
                self.excitation.window(start, n),
                self.order,
                self.alpha,
                self.options,
            )?;
            self.output.accumulate(start, &y);
        }

        Ok(self.output.head().to_vec())
    }

    pub fn reset(&mut self) {
        self.voice.clear();
        self.excitation.clear();
        self.output.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_rejects_wrong_frame_length() {
        let mut engine = LpcEngine::new(64, 8, 0.97).unwrap();
        let err = engine.process_frame(&[0.0; 64], &[0.0; 63]);
        assert_eq!(err, Err(VocoderError::ShapeMismatch { expected: 64, actual: 63 }));
        let err = engine.process_frame(&[0.0; 10], &[0.0; 64]);
        assert_eq!(err, Err(VocoderError::ShapeMismatch { expected: 64, actual: 10 }));
    }

    #[test]
    fn test_rejects_order_at_construction() {
        assert!(matches!(
            LpcEngine::new(32, 32, 0.97),
            Err(VocoderError::InvalidOrder { order: 32, window: 32 })
        ));
    }

    #[test]
    fn test_overlap_add_envelope_is_flat() {
        let options = VocodeOptions {
            apply_filter: false,
            apply_window: true,
            normalize: true,
        };
        let mut engine = LpcEngine::with_options(480, 48, 0.97, options).unwrap();
        let voice = vec![0.0_f32; 480];
        let excitation = vec![1.0_f32; 480];

        let mut outputs = Vec::new();
        for _ in 0..8 {
            outputs.push(engine.process_frame(&voice, &excitation).unwrap());
        }
        // First frame out is the one-frame delay.
        assert!(outputs[0].iter().all(|&y| y == 0.0));
        for frame in &outputs[1..] {
            for &y in frame {
                assert!((y - 1.0).abs() < 1e-4, "envelope sample {}", y);
            }
        }
    }

    #[test]
    fn test_output_is_delayed_one_frame() {
        let options = VocodeOptions {
            apply_filter: false,
            apply_window: true,
            normalize: true,
        };
        let mut engine = LpcEngine::with_options(16, 4, 0.97, options).unwrap();
        let ones = vec![1.0_f32; 16];
        let zeros = vec![0.0_f32; 16];
        assert!(engine.process_frame(&zeros, &ones).unwrap().iter().all(|&y| y == 0.0));
        let second = engine.process_frame(&zeros, &zeros).unwrap();
        assert!(second.iter().any(|&y| y > 0.0));
    }

    #[test]
    fn test_vocoded_stream_is_finite() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut engine = LpcEngine::new(480, 48, 0.97).unwrap();
        for frame_index in 0..6 {
            let voice: Vec<f32> = (0..480)
                .map(|i| ((frame_index * 480 + i) as f32 * 0.07).sin() * 0.3)
                .collect();
            let excitation: Vec<f32> = (0..480).map(|_| rng.gen_range(-0.02..0.02)).collect();
            let out = engine.process_frame(&voice, &excitation).unwrap();
            assert_eq!(out.len(), 480);
            assert!(out.iter().all(|y| y.is_finite()));
        }
        engine.reset();
        let out = engine.process_frame(&[0.0; 480], &[0.0; 480]).unwrap();
        assert!(out.iter().all(|&y| y == 0.0));
    }
}
