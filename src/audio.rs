// src/audio.rs

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::engine::AudioContext;

/// Default output device and the config it prefers.
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> Result<OutputConfig> {
    let host = cpal::default_host();
    let device = host.default_output_device().context("no output device available")?;
    let supported_config = device.default_output_config().context("querying output config")?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::info!("output device: {output_channels} channel(s) at {output_sample_rate} Hz, {sample_format:?}");

    Ok(OutputConfig { device, config, sample_format, output_channels, output_sample_rate })
}

/// Output stream that pulls stereo blocks from `ctx`, advancing its clock.
///
/// Channels past the second are silenced; a mono device gets the left channel.
pub fn build_stream<T>(device: &Device, config: &StreamConfig, ctx: AudioContext) -> Result<Stream>
where
    T: Sample + FromSample<f32> + SizedSample,
{
    let device_channels = (config.channels as usize).max(1);
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / device_channels;
            if scratch.len() != frames * 2 {
                scratch.resize(frames * 2, 0.0);
            }
            ctx.render(&mut scratch);

            for (frame, stereo) in data.chunks_mut(device_channels).zip(scratch.chunks(2)) {
                for (i, out) in frame.iter_mut().enumerate() {
                    let s = if i < 2 { stereo[i] } else { 0.0 };
                    *out = T::from_sample(s);
                }
            }
        },
        |err| log::error!("output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
