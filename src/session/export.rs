// src/session/export.rs

//! WAV encoding of rendered audio, on a worker thread.

use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

use crate::buffer::AudioBuffer;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("export worker is gone")]
    WorkerGone,
}

/// Float sample to 16-bit PCM: clamped, negatives scaled by 0x8000 and
/// positives by 0x7FFF, then truncated.
pub fn float_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 { (s * 0x8000 as f32) as i16 } else { (s * 0x7FFF as f32) as i16 }
}

/// `L0 R0 L1 R1 ...`. The shorter side is padded with silence.
pub fn interleave(left: &[f32], right: &[f32]) -> Vec<f32> {
    let frames = left.len().max(right.len());
    let mut out = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        out.push(left.get(i).copied().unwrap_or(0.0));
        out.push(right.get(i).copied().unwrap_or(0.0));
    }
    out
}

/// A complete 16-bit PCM WAV file with a 44-byte header.
pub fn encode_wav(interleaved: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>, ExportError> {
    let spec = WavSpec { channels, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + interleaved.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        let mut samples = writer.get_i16_writer(interleaved.len() as u32);
        for &s in interleaved {
            samples.write_sample(float_to_i16(s));
        }
        samples.flush()?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Stereo WAV of the first two channels of `buffer`. Mono is duplicated.
pub fn buffer_to_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, ExportError> {
    let left = buffer.channel(0);
    let right = if buffer.number_of_channels() > 1 { buffer.channel(1) } else { left };
    encode_wav(&interleave(left, right), 2, buffer.sample_rate())
}

pub fn write_wav_file(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    log::info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

enum Command {
    Init { sample_rate: u32 },
    Record { left: Vec<f32>, right: Vec<f32> },
    ExportWav,
    Clear,
}

/// Collects stereo chunks and encodes them on request, off the caller's thread.
pub struct ExportWorker {
    commands: Option<Sender<Command>>,
    results: Receiver<Result<Vec<u8>, ExportError>>,
    handle: Option<JoinHandle<()>>,
}

impl ExportWorker {
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = channel::<Command>();
        let (res_tx, res_rx) = channel();

        let handle = thread::spawn(move || {
            let mut sample_rate = 44_100;
            let mut left: Vec<f32> = Vec::new();
            let mut right: Vec<f32> = Vec::new();

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Init { sample_rate: sr } => sample_rate = sr,
                    Command::Record { left: l, right: r } => {
                        left.extend_from_slice(&l);
                        right.extend_from_slice(&r);
                    }
                    Command::ExportWav => {
                        let wav = encode_wav(&interleave(&left, &right), 2, sample_rate);
                        if res_tx.send(wav).is_err() {
                            break;
                        }
                    }
                    Command::Clear => {
                        left.clear();
                        right.clear();
                    }
                }
            }
            log::debug!("export worker exiting");
        });

        Self { commands: Some(cmd_tx), results: res_rx, handle: Some(handle) }
    }

    fn send(&self, cmd: Command) -> Result<(), ExportError> {
        self.commands
            .as_ref()
            .ok_or(ExportError::WorkerGone)?
            .send(cmd)
            .map_err(|_| ExportError::WorkerGone)
    }

    pub fn init(&self, sample_rate: u32) -> Result<(), ExportError> {
        self.send(Command::Init { sample_rate })
    }

    pub fn record(&self, left: Vec<f32>, right: Vec<f32>) -> Result<(), ExportError> {
        self.send(Command::Record { left, right })
    }

    pub fn export_wav(&self) -> Result<(), ExportError> {
        self.send(Command::ExportWav)
    }

    pub fn clear(&self) -> Result<(), ExportError> {
        self.send(Command::Clear)
    }

    /// A finished encoding, if one is ready.
    pub fn try_result(&self) -> Option<Result<Vec<u8>, ExportError>> {
        match self.results.try_recv() {
            Ok(r) => Some(r),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ExportError::WorkerGone)),
        }
    }

    pub fn wait_result(&self, timeout: Duration) -> Option<Result<Vec<u8>, ExportError>> {
        match self.results.recv_timeout(timeout) {
            Ok(r) => Some(r),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ExportError::WorkerGone)),
        }
    }
}

impl Drop for ExportWorker {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_scaling_is_asymmetric() {
        assert_eq!(float_to_i16(1.0), 0x7FFF);
        assert_eq!(float_to_i16(-1.0), -0x8000);
        assert_eq!(float_to_i16(2.5), 0x7FFF);
        assert_eq!(float_to_i16(0.5), 16383);
        assert_eq!(float_to_i16(-0.5), -16384);
    }

    #[test]
    fn interleave_starts_at_zero() {
        assert_eq!(interleave(&[1.0, 2.0], &[-1.0, -2.0]), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn header_and_data_size() {
        let bytes = encode_wav(&interleave(&[0.0; 100], &[0.0; 100]), 2, 44_100).unwrap();
        assert_eq!(bytes.len(), 44 + 100 * 2 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 44_100);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
    }

    #[test]
    fn worker_accumulates_until_cleared() {
        let worker = ExportWorker::spawn();
        worker.init(8000).unwrap();
        worker.record(vec![0.5; 10], vec![-0.5; 10]).unwrap();
        worker.record(vec![0.5; 10], vec![-0.5; 10]).unwrap();
        worker.export_wav().unwrap();
        let wav = worker.wait_result(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(wav.len(), 44 + 20 * 4);

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(&samples[..2], &[16383, -16384]);

        worker.clear().unwrap();
        worker.export_wav().unwrap();
        let empty = worker.wait_result(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(empty.len(), 44);
    }
}
