pub mod config;
pub mod device;

pub use config::{ExcitationKind, VocoderConfig};
pub use device::{AudioHost, DeviceInfo, MidiHost, StreamFormat, StreamHandle};
