use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};
use log::warn;

use crate::pipeline::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Continue,
    Stop,
}

pub struct InputPort {
    frame_size: usize,
    pending: Vec<f32>,
    tx: Sender<Vec<f32>>,
}

impl InputPort {
    pub fn new(frame_size: usize, tx: Sender<Vec<f32>>) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
            tx,
        }
    }

    pub fn push(&mut self, data: &[f32], channels: usize) -> StreamStatus {
        let channels = channels.max(1);
        for chunk in data.chunks(channels) {
            let mono = chunk.iter().sum::<f32>() / chunk.len() as f32;
            self.pending.push(mono);
            if self.pending.len() == self.frame_size {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                if let Err(TrySendError::Disconnected(_)) = self.tx.try_send(frame) {
                    return StreamStatus::Stop;
                }
            }
        }
        StreamStatus::Continue
    }
}

pub struct OutputPort {
    rx: Receiver<Vec<f32>>,
    pending: VecDeque<f32>,
    telemetry: Arc<Telemetry>,
}

impl OutputPort {
    pub fn new(frame_size: usize, rx: Receiver<Vec<f32>>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            rx,
            pending: VecDeque::with_capacity(frame_size * 2),
            telemetry,
        }
    }

    pub fn fill(&mut self, data: &mut [f32], channels: usize) -> StreamStatus {
        let channels = channels.max(1);
        let needed = data.len() / channels + usize::from(data.len() % channels != 0);
        let mut status = StreamStatus::Continue;

        while self.pending.len() < needed {
            match self.rx.try_recv() {
                Ok(frame) => self.pending.extend(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    status = StreamStatus::Stop;
                    break;
                }
            }
        }

        let mut underrun = false;
        for chunk in data.chunks_mut(channels) {
            let sample = self.pending.pop_front().unwrap_or_else(|| {
                underrun = true;
                0.0
            });
            chunk.fill(sample);
        }

        if underrun && status == StreamStatus::Continue {
            let count = self.telemetry.underruns.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 64 == 1 {
                warn!("Output underrun (total {})", count);
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_input_port_frames_and_downmixes() {
        let (tx, rx) = unbounded();
        let mut port = InputPort::new(4, tx);
        assert_eq!(port.push(&[1.0, 3.0, 2.0, 2.0, 0.0, 0.0], 2), StreamStatus::Continue);
        assert!(rx.try_recv().is_err());
        port.push(&[4.0, 4.0, 5.0, 5.0, 6.0, 6.0], 2);
        assert_eq!(rx.try_recv().unwrap(), vec![2.0, 2.0, 0.0, 4.0]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_input_port_stops_when_pipeline_gone() {
        let (tx, rx) = unbounded();
        drop(rx);
        let mut port = InputPort::new(2, tx);
        assert_eq!(port.push(&[0.0, 0.0], 1), StreamStatus::Stop);
    }

    #[test]
    fn test_output_port_counts_underruns() {
        let (tx, rx) = unbounded();
        let telemetry = Arc::new(Telemetry::new(-40.0, 1.0));
        let mut port = OutputPort::new(4, rx, telemetry.clone());
        tx.send(vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        let mut data = [9.0_f32; 6];
        assert_eq!(port.fill(&mut data, 2), StreamStatus::Continue);
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
        assert_eq!(telemetry.underruns(), 0);

        let mut data = [9.0_f32; 4];
        port.fill(&mut data, 1);
        assert_eq!(data, [0.4, 0.0, 0.0, 0.0]);
        assert_eq!(telemetry.underruns(), 1);

        drop(tx);
        assert_eq!(port.fill(&mut data, 1), StreamStatus::Stop);
        assert!(data.iter().all(|&x| x == 0.0));
    }
}
