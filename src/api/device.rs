use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

use crate::midi::MidiEvent;
use crate::stream::{InputPort, OutputPort};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
}

impl DeviceInfo {
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub frame_size: usize,
}

pub trait StreamHandle {
    fn close(self: Box<Self>);
}

pub trait AudioHost {
    fn devices(&self) -> anyhow::Result<Vec<DeviceInfo>>;

    fn open_input(
        &mut self,
        device: &str,
        format: StreamFormat,
        port: InputPort,
    ) -> anyhow::Result<Box<dyn StreamHandle>>;

    fn open_output(
        &mut self,
        device: &str,
        format: StreamFormat,
        port: OutputPort,
    ) -> anyhow::Result<Box<dyn StreamHandle>>;
}

pub trait MidiHost {
    fn ports(&self) -> anyhow::Result<Vec<String>>;

    fn connect(&mut self, port: &str, sink: Sender<MidiEvent>) -> anyhow::Result<Box<dyn StreamHandle>>;
}
