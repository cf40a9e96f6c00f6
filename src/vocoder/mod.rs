pub mod engine;
pub mod excitation;
pub mod gate;
pub mod lpc;
pub mod shift;
pub mod synthesis;

pub use engine::LpcEngine;
pub use excitation::{ExcitationSource, NoiseExcitation, RecordedExcitation};
pub use gate::{GateDecision, VoiceGate};
pub use lpc::{error_filter, levinson_durbin, vocode_frame, LpcAnalyzer, VocodeOptions};
pub use shift::ShiftBuffer;
pub use synthesis::Synthesizer;
