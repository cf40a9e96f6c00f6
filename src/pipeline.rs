use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::api::config::{ExcitationKind, VocoderConfig};
use crate::api::device::{AudioHost, MidiHost, StreamFormat, StreamHandle};
use crate::audio::load_audio;
use crate::error::{Result, VocoderError};
use crate::filter::InputConditioner;
use crate::midi::MidiEvent;
use crate::stream::{InputPort, OutputPort};
use crate::util::{resample_linear, LEVEL_FLOOR_DB};
use crate::vocoder::{ExcitationSource, LpcEngine, NoiseExcitation, RecordedExcitation, Synthesizer, VoiceGate};

#[derive(Debug)]
pub struct Telemetry {
    level_db: AtomicCell<f32>,
    threshold_db: AtomicCell<f32>,
    gain: AtomicCell<f32>,
    pub(crate) underruns: AtomicU64,
    frames: AtomicU64,
}

impl Telemetry {
    pub fn new(threshold_db: f32, gain: f32) -> Self {
        Self {
            level_db: AtomicCell::new(LEVEL_FLOOR_DB),
            threshold_db: AtomicCell::new(threshold_db),
            gain: AtomicCell::new(gain),
            underruns: AtomicU64::new(0),
            frames: AtomicU64::new(0),
        }
    }

    pub fn level_db(&self) -> f32 {
        self.level_db.load()
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db.load()
    }

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Threshold(f32),
    Gain(f32),
}

#[derive(Debug, Clone)]
pub struct Controls {
    tx: Sender<Control>,
    telemetry: Arc<Telemetry>,
}

impl Controls {
    pub fn set_threshold_db(&self, threshold_db: f32) -> Result<()> {
        if !threshold_db.is_finite() {
            return Err(VocoderError::InvalidConfig(format!("gate threshold {}dB must be finite", threshold_db)));
        }
        let _ = self.tx.send(Control::Threshold(threshold_db));
        Ok(())
    }

    pub fn set_gain(&self, gain: f32) -> Result<()> {
        if !(gain.is_finite() && gain >= 0.0) {
            return Err(VocoderError::InvalidConfig(format!("output gain {} must be non-negative", gain)));
        }
        let _ = self.tx.send(Control::Gain(gain));
        Ok(())
    }

    pub fn level_db(&self) -> f32 {
        self.telemetry.level_db()
    }

    pub fn threshold_db(&self) -> f32 {
        self.telemetry.threshold_db()
    }

    pub fn gain(&self) -> f32 {
        self.telemetry.gain()
    }

    pub fn underruns(&self) -> u64 {
        self.telemetry.underruns()
    }

    pub fn frames_processed(&self) -> u64 {
        self.telemetry.frames_processed()
    }
}

pub fn excitation_from_config(config: &VocoderConfig) -> anyhow::Result<Box<dyn ExcitationSource>> {
    let frame_size = config.frame_size();
    let sample_rate = config.audio.sample_rate;
    let ex = &config.excitation;
    let source: Box<dyn ExcitationSource> = match ex.source {
        ExcitationKind::Synth => Box::new(Synthesizer::new(frame_size, sample_rate)),
        ExcitationKind::Noise => Box::new(NoiseExcitation::new(frame_size, ex.noise_std, ex.seed)?),
        ExcitationKind::Recorded => {
            let path = ex
                .file
                .as_deref()
                .context("Recorded excitation selected but no file configured")?;
            let (samples, file_rate) = load_audio(path)
                .with_context(|| format!("Failed to load excitation from {}", path))?;
            if file_rate != sample_rate {
                debug!("Resampling excitation {}Hz -> {}Hz", file_rate, sample_rate);
            }
            let samples = resample_linear(&samples, file_rate, sample_rate);
            Box::new(RecordedExcitation::new(frame_size, samples)?)
        }
    };
    info!("Excitation source: {}", source.name());
    Ok(source)
}

struct Processor {
    frame_size: usize,
    window_size: usize,
    note_amplitude: f32,
    engine: LpcEngine,
    gate: VoiceGate,
    gain: f32,
    conditioner: Option<InputConditioner>,
    source: Box<dyn ExcitationSource>,
    voice_rx: Receiver<Vec<f32>>,
    excitation_tx: Sender<Vec<f32>>,
    excitation_rx: Receiver<Vec<f32>>,
    output_tx: Sender<Vec<f32>>,
    control_rx: Receiver<Control>,
    midi_rx: Receiver<MidiEvent>,
    telemetry: Arc<Telemetry>,
    wait: Duration,
}

impl Processor {
    fn drain_controls(&mut self) {
        for control in self.control_rx.try_iter() {
            match control {
                Control::Threshold(db) => self.gate.set_threshold_db(db),
                Control::Gain(gain) => self.gain = gain,
            }
        }
        self.telemetry.threshold_db.store(self.gate.threshold_db());
        self.telemetry.gain.store(self.gain);
    }

    fn dispatch_midi(&mut self) {
        for event in self.midi_rx.try_iter() {
            let frequency = event.frequency();
            let result = match event {
                MidiEvent::NoteOn { .. } => self.source.note_on(self.note_amplitude, frequency),
                MidiEvent::NoteOff { .. } => self.source.note_off(frequency).map(|_| ()),
            };
            if let Err(e) = result {
                warn!("Ignoring MIDI {:?}: {}", event, e);
            }
        }
    }

    fn process(&mut self, mut voice: Vec<f32>, mut excitation: Vec<f32>) -> Result<Vec<f32>> {
        if voice.len() != self.frame_size {
            return Err(VocoderError::ShapeMismatch {
                expected: self.frame_size,
                actual: voice.len(),
            });
        }
        if excitation.len() != voice.len() {
            return Err(VocoderError::LengthMismatch {
                voice: voice.len(),
                excitation: excitation.len(),
            });
        }
        if let Some(conditioner) = self.conditioner.as_mut() {
            conditioner.process(&mut voice);
        }

        let mut output = Vec::with_capacity(self.frame_size);
        for (v, e) in voice
            .chunks(self.window_size)
            .zip(excitation.chunks_mut(self.window_size))
        {
            self.drain_controls();
            let decision = self.gate.apply(v, e);
            self.telemetry.level_db.store(decision.level_db);
            output.extend(self.engine.process_frame(v, e)?);
        }
        if self.gain != 1.0 {
            output.iter_mut().for_each(|s| *s *= self.gain);
        }
        Ok(output)
    }

    fn step(&mut self) -> Result<bool> {
        self.drain_controls();
        self.dispatch_midi();

        if self.excitation_rx.is_empty() {
            let frame = self.source.next_frame();
            let _ = self.excitation_tx.send(frame);
        }

        let voice = match self.voice_rx.recv_timeout(self.wait) {
            Ok(voice) => voice,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return Ok(false),
        };
        let excitation = self
            .excitation_rx
            .try_recv()
            .unwrap_or_else(|_| self.source.next_frame());

        let output = match self.process(voice, excitation) {
            Ok(output) => output,
            Err(e) => {
                self.send_silence();
                return Err(e);
            }
        };
        let _ = self.output_tx.send(output);
        self.telemetry.frames.fetch_add(1, Ordering::Release);
        Ok(true)
    }

    fn run(mut self, running: &AtomicBool) -> Self {
        debug!("Processing thread started");
        while running.load(Ordering::Acquire) {
            if let Err(e) = self.step() {
                error!("Dropped frame: {}", e);
            }
        }
        debug!("Processing thread finished");
        self
    }

    fn send_silence(&self) {
        let _ = self.output_tx.send(vec![0.0; self.frame_size]);
    }

    fn reset(&mut self) {
        self.voice_rx.try_iter().for_each(drop);
        self.excitation_rx.try_iter().for_each(drop);
        self.midi_rx.try_iter().for_each(drop);
        self.source.reset();
        self.engine.reset();
        if let Some(conditioner) = self.conditioner.as_mut() {
            conditioner.reset();
        }
        self.telemetry.level_db.store(LEVEL_FLOOR_DB);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
}

impl PipelineState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

pub struct Pipeline {
    config: VocoderConfig,
    audio: Box<dyn AudioHost>,
    midi: Box<dyn MidiHost>,
    state: PipelineState,
    telemetry: Arc<Telemetry>,
    controls: Controls,
    running: Arc<AtomicBool>,
    processor: Option<Processor>,
    worker: Option<JoinHandle<Processor>>,
    streams: Vec<Box<dyn StreamHandle>>,
    voice_tx: Sender<Vec<f32>>,
    output_rx: Receiver<Vec<f32>>,
    midi_tx: Sender<MidiEvent>,
}

impl Pipeline {
    pub fn new(
        config: VocoderConfig,
        audio: Box<dyn AudioHost>,
        midi: Box<dyn MidiHost>,
        source: Box<dyn ExcitationSource>,
    ) -> Result<Self> {
        config.validate()?;
        let frame_size = config.frame_size();
        let window_size = config.window_size();
        let engine = LpcEngine::new(window_size, config.lpc.order, config.lpc.alpha)?;
        let conditioner = if config.audio.input_highpass_hz > 0.0 {
            Some(
                InputConditioner::new(config.audio.sample_rate, config.audio.input_highpass_hz)
                    .map_err(|e| VocoderError::InvalidConfig(e.to_string()))?,
            )
        } else {
            None
        };

        let telemetry = Arc::new(Telemetry::new(config.gate.threshold_db, config.output.gain));
        let (voice_tx, voice_rx) = unbounded();
        let (excitation_tx, excitation_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let (midi_tx, midi_rx) = unbounded();

        // A quarter frame keeps the loop responsive to stop without spinning.
        let frame_secs = frame_size as f64 / config.audio.sample_rate as f64;
        let wait = Duration::from_secs_f64(frame_secs / 4.0);

        debug!(
            "Pipeline: frame {} window {} order {} alpha {} threshold {}dB",
            frame_size, window_size, config.lpc.order, config.lpc.alpha, config.gate.threshold_db
        );

        let processor = Processor {
            frame_size,
            window_size,
            note_amplitude: config.excitation.note_amplitude,
            engine,
            gate: VoiceGate::new(config.gate.threshold_db),
            gain: config.output.gain,
            conditioner,
            source,
            voice_rx,
            excitation_tx,
            excitation_rx,
            output_tx,
            control_rx,
            midi_rx,
            telemetry: telemetry.clone(),
            wait,
        };

        Ok(Self {
            config,
            audio,
            midi,
            state: PipelineState::Stopped,
            controls: Controls {
                tx: control_tx,
                telemetry: telemetry.clone(),
            },
            telemetry,
            running: Arc::new(AtomicBool::new(false)),
            processor: Some(processor),
            worker: None,
            streams: Vec::new(),
            voice_tx,
            output_rx,
            midi_tx,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn controls(&self) -> Controls {
        self.controls.clone()
    }

    pub fn start(&mut self, input: &str, output: &str, midi: &str) -> Result<()> {
        if self.state != PipelineState::Stopped {
            return Err(VocoderError::InvalidStateTransition {
                action: "start",
                state: self.state.as_str(),
            });
        }
        let mut processor = self
            .processor
            .take()
            .ok_or_else(|| VocoderError::Device("processing state was lost".to_string()))?;

        processor.reset();
        self.output_rx.try_iter().for_each(drop);
        processor.send_silence();

        let format = StreamFormat {
            sample_rate: self.config.audio.sample_rate,
            frame_size: self.config.frame_size(),
        };
        if let Err(e) = self.open_streams(input, output, midi, format) {
            for stream in self.streams.drain(..) {
                stream.close();
            }
            self.output_rx.try_iter().for_each(drop);
            self.processor = Some(processor);
            return Err(VocoderError::Device(format!("{:#}", e)));
        }

        self.running.store(true, Ordering::Release);
        let running = self.running.clone();
        self.worker = Some(thread::spawn(move || processor.run(&running)));
        self.state = PipelineState::Running;
        info!("Pipeline started");
        Ok(())
    }

    fn open_streams(&mut self, input: &str, output: &str, midi: &str, format: StreamFormat) -> anyhow::Result<()> {
        let port = OutputPort::new(format.frame_size, self.output_rx.clone(), self.telemetry.clone());
        let stream = self
            .audio
            .open_output(output, format, port)
            .with_context(|| format!("Failed to open output device '{}'", output))?;
        self.streams.push(stream);

        let port = InputPort::new(format.frame_size, self.voice_tx.clone());
        let stream = self
            .audio
            .open_input(input, format, port)
            .with_context(|| format!("Failed to open input device '{}'", input))?;
        self.streams.push(stream);

        if !midi.trim().is_empty() {
            let connection = self
                .midi
                .connect(midi, self.midi_tx.clone())
                .with_context(|| format!("Failed to open MIDI input '{}'", midi))?;
            self.streams.push(connection);
        } else {
            debug!("No MIDI input requested");
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.state != PipelineState::Running {
            return Err(VocoderError::InvalidStateTransition {
                action: "stop",
                state: self.state.as_str(),
            });
        }
        self.running.store(false, Ordering::Release);
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(processor)) => self.processor = Some(processor),
            _ => error!("Processing thread panicked"),
        }
        for stream in self.streams.drain(..) {
            stream.close();
        }
        self.output_rx.try_iter().for_each(drop);
        self.state = PipelineState::Stopped;
        info!(
            "Pipeline stopped after {} frames ({} underruns)",
            self.telemetry.frames_processed(),
            self.telemetry.underruns()
        );
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            let _ = self.stop();
        }
    }
}
