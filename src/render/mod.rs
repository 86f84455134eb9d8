// src/render/mod.rs

//! Building view trees for the playlist, and the hooks that paint them.

pub mod hooks;
pub mod terminal;
pub mod timescale;
pub mod track;

pub use terminal::render_ascii;
pub use timescale::TimeScale;
pub use track::{MAX_CANVAS_WIDTH, TrackRenderData, render_track};
