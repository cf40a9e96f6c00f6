pub mod api;
pub mod args;
pub mod audio;
pub mod error;
pub mod filter;
pub mod midi;
pub mod pipeline;
pub mod stream;
pub mod util;
pub mod vocoder;

pub use error::{Result, VocoderError};
pub use pipeline::{Controls, Pipeline, PipelineState, Telemetry};
