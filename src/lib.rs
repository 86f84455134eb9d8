// src/lib.rs

pub mod audio;
pub mod audio_runtime;
pub mod buffer;
pub mod controller;
pub mod effects;
pub mod engine;
pub mod loader;
pub mod peaks;
pub mod playlist;
pub mod recorder;
pub mod render;
pub mod session;
pub mod vdom;

pub use buffer::AudioBuffer;
pub use playlist::{Playlist, PlaylistConfig, PlaylistError, PlaylistEvent};
