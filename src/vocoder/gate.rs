use crate::util::{amplitude_to_db, std_dev};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub level_db: f32,
    pub open: bool,
}

#[derive(Debug, Clone)]
pub struct VoiceGate {
    threshold_db: f32,
}

impl VoiceGate {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn set_threshold_db(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db;
    }

    pub fn measure(voice: &[f32]) -> f32 {
        amplitude_to_db(std_dev(voice))
    }

    pub fn apply(&self, voice: &[f32], excitation: &mut [f32]) -> GateDecision {
        let level_db = Self::measure(voice);
        let open = level_db >= self.threshold_db;
        if !open {
            excitation.fill(0.0);
        }
        GateDecision { level_db, open }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::LEVEL_FLOOR_DB;

    #[test]
    fn test_silence_closes_gate_at_floor() {
        let gate = VoiceGate::new(-40.0);
        let mut excitation = vec![0.5; 32];
        let decision = gate.apply(&[0.0; 32], &mut excitation);
        assert_eq!(decision.level_db, LEVEL_FLOOR_DB);
        assert!(!decision.open);
        assert!(excitation.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_loud_voice_keeps_excitation() {
        let gate = VoiceGate::new(-40.0);
        let voice: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        let mut excitation = vec![0.5; 64];
        let decision = gate.apply(&voice, &mut excitation);
        assert!((decision.level_db + 20.0).abs() < 1e-3);
        assert!(decision.open);
        assert!(excitation.iter().all(|&x| x == 0.5));
    }

    #[test]
    fn test_threshold_update() {
        let mut gate = VoiceGate::new(-40.0);
        let voice: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        gate.set_threshold_db(-10.0);
        assert_eq!(gate.threshold_db(), -10.0);
        let mut excitation = vec![0.5; 64];
        assert!(!gate.apply(&voice, &mut excitation).open);
    }
}
