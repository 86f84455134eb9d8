// src/loader/mod.rs

//! Turning a track's source into an [`AudioBuffer`].

pub mod decode;
pub mod resample;

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::buffer::AudioBuffer;

pub use decode::decode;
pub use resample::resample;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported file type {0}")]
    UnsupportedFileType(String),
    #[error("decode failed: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("no audio track in {0}")]
    NoAudioTrack(String),
    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
    #[error("cannot build resampler: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),
}

/// Progress of a single load, as reported in `audiorequeststatechange`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LoadState {
    Uninitialized = 0,
    Loading = 1,
    Decoding = 2,
    Finished = 3,
}

impl From<LoadState> for u8 {
    fn from(s: LoadState) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for LoadState {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(LoadState::Uninitialized),
            1 => Ok(LoadState::Loading),
            2 => Ok(LoadState::Decoding),
            3 => Ok(LoadState::Finished),
            other => Err(format!("unknown load state {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadEvent {
    StateChange(LoadState),
    /// Percent of the source read so far.
    Progress(f64),
}

/// Where a track's audio comes from.
#[derive(Clone)]
pub enum AudioSource {
    /// An encoded file on disk.
    Path(PathBuf),
    /// Encoded bytes with their MIME type, such as a capture.
    Blob { bytes: Arc<[u8]>, mime: String },
    /// Audio that is already decoded.
    Buffer(Arc<AudioBuffer>),
}

impl AudioSource {
    /// Text used to identify the source in events and track details.
    pub fn label(&self) -> String {
        match self {
            AudioSource::Path(p) => p.display().to_string(),
            AudioSource::Blob { mime, .. } => format!("blob:{mime}"),
            AudioSource::Buffer(_) => "buffer".to_string(),
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            AudioSource::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Loads and decodes the source, reporting state changes to `on_event`.
    pub fn load(&self, on_event: &mut dyn FnMut(LoadEvent)) -> Result<Arc<AudioBuffer>, LoadError> {
        match self {
            AudioSource::Buffer(buffer) => Ok(buffer.clone()),
            AudioSource::Path(path) => {
                let file = File::open(path)?;
                let total = file.metadata().map(|m| m.len()).unwrap_or(0);
                let bytes = read_with_progress(file, total, on_event)?;
                let hint = path.extension().and_then(|e| e.to_str()).map(str::to_string);
                decode_bytes(bytes, hint, on_event)
            }
            AudioSource::Blob { bytes, mime } => {
                if !(mime.starts_with("audio") || mime.starts_with("video/ogg")) {
                    return Err(LoadError::UnsupportedFileType(mime.clone()));
                }
                let bytes = read_with_progress(&bytes[..], bytes.len() as u64, on_event)?;
                decode_bytes(bytes, mime_extension(mime), on_event)
            }
        }
    }
}

fn decode_bytes(
    bytes: Vec<u8>,
    hint: Option<String>,
    on_event: &mut dyn FnMut(LoadEvent),
) -> Result<Arc<AudioBuffer>, LoadError> {
    on_event(LoadEvent::StateChange(LoadState::Decoding));
    let buffer = decode(bytes, hint.as_deref())?;
    on_event(LoadEvent::StateChange(LoadState::Finished));
    Ok(Arc::new(buffer))
}

fn read_with_progress(
    mut reader: impl Read,
    total: u64,
    on_event: &mut dyn FnMut(LoadEvent),
) -> Result<Vec<u8>, LoadError> {
    on_event(LoadEvent::StateChange(LoadState::Loading));
    let mut out = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
        let percent = if total > 0 { out.len() as f64 / total as f64 * 100.0 } else { 0.0 };
        on_event(LoadEvent::Progress(percent));
    }
    Ok(out)
}

fn mime_extension(mime: &str) -> Option<String> {
    let sub = mime.split('/').nth(1)?.split(';').next()?.trim();
    let ext = match sub {
        "mpeg" | "mp3" => "mp3",
        "wav" | "wave" | "x-wav" => "wav",
        "flac" | "x-flac" => "flac",
        "ogg" => "ogg",
        "aac" | "mp4" => "aac",
        _ => return None,
    };
    Some(ext.to_string())
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            AudioSource::Blob { bytes, mime } => {
                f.debug_struct("Blob").field("len", &bytes.len()).field("mime", mime).finish()
            }
            AudioSource::Buffer(b) => f
                .debug_struct("Buffer")
                .field("channels", &b.number_of_channels())
                .field("length", &b.length())
                .finish(),
        }
    }
}

impl PartialEq for AudioSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AudioSource::Path(a), AudioSource::Path(b)) => a == b,
            (AudioSource::Blob { bytes: a, .. }, AudioSource::Blob { bytes: b, .. }) => Arc::ptr_eq(a, b),
            (AudioSource::Buffer(a), AudioSource::Buffer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Only file paths survive serialization; in-memory sources become `null`.
impl Serialize for AudioSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AudioSource::Path(p) => serializer.serialize_str(&p.to_string_lossy()),
            _ => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for AudioSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let path = String::deserialize(deserializer)?;
        Ok(AudioSource::Path(PathBuf::from(path)))
    }
}
