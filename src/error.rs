use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VocoderError {
    #[error("frame has {actual} samples, engine expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("voice window has {voice} samples but excitation window has {excitation}")]
    LengthMismatch { voice: usize, excitation: usize },

    #[error("LPC order {order} must be in 1..{window}")]
    InvalidOrder { order: usize, window: usize },

    #[error("amplitude must be a non-negative number, got {0}")]
    InvalidAmplitude(f32),

    #[error("frequency must be a non-negative number, got {0}")]
    InvalidFrequency(f32),

    #[error("cannot {action} while pipeline is {state}")]
    InvalidStateTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, VocoderError>;
