// src/engine/mod.rs

pub mod automation;
pub mod fades;
pub mod graph;
pub mod interaction;
pub mod mixer;
pub mod playout;
pub mod time;
pub mod track;

pub use automation::{AudioParam, AutomationError};
pub use fades::{FadeError, FadeShape, FadeType};
pub use graph::{AudioContext, Completion, EndReason, GraphEvent, OfflineAudioContext};
pub use interaction::{Intent, Interaction, InteractionMode, PointerKind};
pub use mixer::Mixer;
pub use playout::{Playout, PlayoutState};
pub use time::DurationFormat;
pub use track::{EnabledStates, Fade, FadeInfo, PlayOptions, Track, TrackDetails, TrackError, TrackId};
