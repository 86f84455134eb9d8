// src/audio_runtime.rs

use anyhow::{Result, bail};
use cpal::traits::StreamTrait;
use cpal::{SampleFormat, Stream};

use crate::audio::{build_stream, setup_output_device};
use crate::engine::AudioContext;

/// Owns the output stream that drives an [`AudioContext`]'s clock.
///
/// The context is created at the device rate, so buffers scheduled on it
/// play back at their own rate without further conversion.
pub struct AudioRuntime {
    ctx: AudioContext,
    _stream: Stream,
}

impl AudioRuntime {
    pub fn new() -> Result<Self> {
        let output = setup_output_device()?;
        let ctx = AudioContext::new(output.output_sample_rate);

        let stream = match output.sample_format {
            SampleFormat::F32 => build_stream::<f32>(&output.device, &output.config, ctx.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&output.device, &output.config, ctx.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&output.device, &output.config, ctx.clone())?,
            other => bail!("unsupported output sample format {other:?}"),
        };
        stream.play()?;
        log::debug!("audio runtime started");

        Ok(Self { ctx, _stream: stream })
    }

    pub fn context(&self) -> &AudioContext {
        &self.ctx
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate()
    }
}

impl Drop for AudioRuntime {
    fn drop(&mut self) {
        self.ctx.stop_all();
        log::debug!("audio runtime stopped");
    }
}
