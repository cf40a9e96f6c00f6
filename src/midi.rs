use anyhow::{anyhow, Result};
use crossbeam::channel::Sender;
use log::{debug, info, warn};
use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::api::device::{MidiHost, StreamHandle};
use crate::util::midi_to_hz;

const CLIENT_NAME: &str = "lpcvox";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
}

impl MidiEvent {
    pub fn parse(message: &[u8]) -> Option<Self> {
        match *message {
            [status, note, velocity, ..] if status & 0xF0 == 0x90 && velocity > 0 => Some(Self::NoteOn {
                note: note & 0x7F,
                velocity,
            }),
            [status, note, _, ..] if status & 0xF0 == 0x90 || status & 0xF0 == 0x80 => {
                Some(Self::NoteOff { note: note & 0x7F })
            }
            _ => None,
        }
    }

    pub fn note(&self) -> u8 {
        match *self {
            Self::NoteOn { note, .. } | Self::NoteOff { note } => note,
        }
    }

    pub fn frequency(&self) -> f32 {
        midi_to_hz(self.note() as f64) as f32
    }
}

pub struct MidirHost;

struct MidirConnection(MidiInputConnection<()>);

impl StreamHandle for MidirConnection {
    fn close(self: Box<Self>) {
        let _ = self.0.close();
    }
}

impl MidiHost for MidirHost {
    fn ports(&self) -> Result<Vec<String>> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        Ok(midi_in
            .ports()
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_else(|_| "unknown-midi".to_string()))
            .collect())
    }

    fn connect(&mut self, port: &str, sink: Sender<MidiEvent>) -> Result<Box<dyn StreamHandle>> {
        let mut midi_in = MidiInput::new(CLIENT_NAME)?;
        midi_in.ignore(Ignore::All);

        let wanted = port.trim();
        let found = midi_in
            .ports()
            .into_iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|n| n.eq_ignore_ascii_case(wanted))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("MIDI port not found: '{}'", wanted))?;

        info!("Opening MIDI input '{}'", wanted);
        let connection = midi_in
            .connect(
                &found,
                "lpcvox-in",
                move |_stamp, message, _| {
                    if let Some(event) = MidiEvent::parse(message) {
                        debug!("MIDI {:?}", event);
                        if sink.send(event).is_err() {
                            warn!("MIDI event dropped, pipeline is gone");
                        }
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect MIDI input '{}': {}", wanted, e))?;
        Ok(Box::new(MidirConnection(connection)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_messages() {
        assert_eq!(
            MidiEvent::parse(&[0x90, 69, 100]),
            Some(MidiEvent::NoteOn { note: 69, velocity: 100 })
        );
        assert_eq!(MidiEvent::parse(&[0x93, 60, 0]), Some(MidiEvent::NoteOff { note: 60 }));
        assert_eq!(MidiEvent::parse(&[0x80, 81, 64]), Some(MidiEvent::NoteOff { note: 81 }));
        assert_eq!(MidiEvent::parse(&[0xB0, 7, 127]), None);
        assert_eq!(MidiEvent::parse(&[0x90, 69]), None);
    }

    #[test]
    fn test_event_frequency() {
        assert_eq!(MidiEvent::NoteOn { note: 69, velocity: 1 }.frequency(), 440.0);
        assert_eq!(MidiEvent::NoteOff { note: 81 }.frequency(), 880.0);
    }
}
