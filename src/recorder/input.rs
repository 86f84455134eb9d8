// src/recorder/input.rs

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};

use super::{CaptureSource, RecorderError};

/// About four seconds of stereo at 48 kHz between polls.
const CAPTURE_CAPACITY: usize = 384_000;

/// Default input device feeding a lock-free ring buffer.
///
/// The stream lives only while recording; dropping it ends the capture.
pub struct MicRecorder {
    stream: Option<Stream>,
    consumer: Option<HeapCons<f32>>,
    channels: usize,
    sample_rate: u32,
}

impl Default for MicRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MicRecorder {
    pub fn new() -> Self {
        Self { stream: None, consumer: None, channels: 1, sample_rate: 44_100 }
    }
}

impl CaptureSource for MicRecorder {
    fn start(&mut self) -> Result<(), RecorderError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(RecorderError::NoInputDevice)?;

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let (producer, consumer) = HeapRb::<f32>::new(CAPTURE_CAPACITY).split();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream(&device, &config, producer, |s: f32| s)?,
            SampleFormat::I16 => build_stream(&device, &config, producer, |s: i16| s as f32 / i16::MAX as f32)?,
            SampleFormat::U16 => {
                build_stream(&device, &config, producer, |s: u16| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)?
            }
            other => return Err(RecorderError::UnsupportedFormat(other)),
        };
        stream.play()?;

        self.channels = config.channels as usize;
        self.sample_rate = config.sample_rate.0;
        self.stream = Some(stream);
        self.consumer = Some(consumer);
        log::info!("capturing {} channel(s) at {} Hz", self.channels, self.sample_rate);
        Ok(())
    }

    fn stop(&mut self) {
        self.stream.take();
        self.consumer.take();
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn take_chunk(&mut self) -> Vec<f32> {
        self.consumer.as_mut().map(|c| c.pop_iter().collect()).unwrap_or_default()
    }
}

fn build_stream<T, P>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: P,
    convert: fn(T) -> f32,
) -> Result<Stream, RecorderError>
where
    T: SizedSample + Send + 'static,
    P: Producer<Item = f32> + Send + 'static,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &s in data {
                // buffer full: drop the rest of the block
                if producer.try_push(convert(s)).is_err() {
                    break;
                }
            }
        },
        |err| log::error!("input stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
