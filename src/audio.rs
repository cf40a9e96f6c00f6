use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_codecs;
use symphonia::default::get_probe;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::api::device::{AudioHost, DeviceInfo, StreamFormat, StreamHandle};
use crate::stream::{InputPort, OutputPort, StreamStatus};

pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    info!("Loading audio from {}", path.display());

    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(BufReader::new(file))), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .with_context(|| "Failed to probe audio format")?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .with_context(|| "No supported audio tracks found")?;

    let track_id = track.id;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params.sample_rate.unwrap_or(48000);
    info!("Audio sample rate: {}Hz", sample_rate);

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(codec_params, &dec_opts)
        .with_context(|| "Failed to create decoder")?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::ResetRequired) => {
                debug!("Decoder reset required");
                continue;
            }
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let duration = decoded.capacity() as u64;
                if duration == 0 {
                    continue;
                }

                let channels = spec.channels.count();
                let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
                sample_buf.copy_interleaved_ref(decoded);

                if channels > 1 {
                    samples.extend(
                        sample_buf
                            .samples()
                            .chunks(channels)
                            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32),
                    );
                } else {
                    samples.extend_from_slice(sample_buf.samples());
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                debug!("Decode error encountered, skipping packet");
                continue;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => {
                debug!("Decoder reset required during decode");
                continue;
            }
            Err(e) => {
                return Err(anyhow!("Decode error: {}", e));
            }
        }
    }

    info!("Loaded {} samples", samples.len());
    Ok((samples, sample_rate))
}

pub struct CpalHost {
    host: cpal::Host,
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalHost {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Audio host: {:?}", host.id());
        Self { host }
    }

    fn find_input_device(&self, name: &str) -> Result<cpal::Device> {
        let name = name.trim();
        if name.is_empty() {
            return self
                .host
                .default_input_device()
                .ok_or_else(|| anyhow!("default input device not found"));
        }
        self.host
            .input_devices()?
            .find(|d| d.name().map(|n| n.eq_ignore_ascii_case(name)).unwrap_or(false))
            .ok_or_else(|| anyhow!("input device not found: '{}'", name))
    }

    fn find_output_device(&self, name: &str) -> Result<cpal::Device> {
        let name = name.trim();
        if name.is_empty() {
            return self
                .host
                .default_output_device()
                .ok_or_else(|| anyhow!("default output device not found"));
        }
        self.host
            .output_devices()?
            .find(|d| d.name().map(|n| n.eq_ignore_ascii_case(name)).unwrap_or(false))
            .ok_or_else(|| anyhow!("output device not found: '{}'", name))
    }
}

fn stream_config(default: cpal::SupportedStreamConfig, format: StreamFormat) -> Result<cpal::StreamConfig> {
    if default.sample_format() != cpal::SampleFormat::F32 {
        return Err(anyhow!(
            "only f32 sample format is supported, device uses {:?}",
            default.sample_format()
        ));
    }
    Ok(cpal::StreamConfig {
        channels: default.channels(),
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    })
}

struct CpalStream(cpal::Stream);

impl StreamHandle for CpalStream {
    fn close(self: Box<Self>) {
        if let Err(e) = self.0.pause() {
            debug!("Failed to pause stream before close: {}", e);
        }
    }
}

impl AudioHost for CpalHost {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut infos = Vec::new();
        for device in self.host.devices()? {
            let name = device.name().unwrap_or_else(|_| "unknown-device".to_string());
            let max_input_channels = device
                .supported_input_configs()
                .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            let max_output_channels = device
                .supported_output_configs()
                .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            infos.push(DeviceInfo {
                name,
                max_input_channels,
                max_output_channels,
            });
        }
        Ok(infos)
    }

    fn open_input(
        &mut self,
        device: &str,
        format: StreamFormat,
        mut port: InputPort,
    ) -> Result<Box<dyn StreamHandle>> {
        let device = self.find_input_device(device)?;
        let config = stream_config(device.default_input_config()?, format)?;
        let channels = config.channels as usize;
        info!(
            "Opening input '{}' ({} ch @ {}Hz)",
            device.name().unwrap_or_else(|_| "unknown-input".to_string()),
            channels,
            format.sample_rate
        );

        let mut stopped = false;
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !stopped && port.push(data, channels) == StreamStatus::Stop {
                    stopped = true;
                    warn!("Input stream has no consumer, dropping audio");
                }
            },
            |err| error!("Input stream error: {}", err),
            None,
        )?;
        stream.play()?;
        Ok(Box::new(CpalStream(stream)))
    }

    fn open_output(
        &mut self,
        device: &str,
        format: StreamFormat,
        mut port: OutputPort,
    ) -> Result<Box<dyn StreamHandle>> {
        let device = self.find_output_device(device)?;
        let config = stream_config(device.default_output_config()?, format)?;
        let channels = config.channels as usize;
        info!(
            "Opening output '{}' ({} ch @ {}Hz)",
            device.name().unwrap_or_else(|_| "unknown-output".to_string()),
            channels,
            format.sample_rate
        );

        let mut stopped = false;
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if stopped {
                    data.fill(0.0);
                } else if port.fill(data, channels) == StreamStatus::Stop {
                    stopped = true;
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )?;
        stream.play()?;
        Ok(Box::new(CpalStream(stream)))
    }
}
