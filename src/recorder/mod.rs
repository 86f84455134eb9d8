// src/recorder/mod.rs

pub mod input;

pub use input::MicRecorder;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("No input device available")]
    NoInputDevice,
    #[error(transparent)]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    Build(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    Play(#[from] cpal::PlayStreamError),
    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),
}

/// Something the playlist can record from.
///
/// The playlist polls `take_chunk` once per tick and appends whatever
/// arrived to the recording track.
pub trait CaptureSource {
    fn start(&mut self) -> Result<(), RecorderError>;

    fn stop(&mut self);

    fn is_recording(&self) -> bool;

    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Interleaved samples captured since the last call.
    fn take_chunk(&mut self) -> Vec<f32>;
}
