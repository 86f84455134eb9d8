// src/effects/mod.rs

pub mod equalizer;

pub use equalizer::{EqBand, EqChain, EqFilterType, EqParams};
