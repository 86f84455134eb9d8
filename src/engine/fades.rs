// src/engine/fades.rs

use super::automation::{AudioParam, AutomationError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Points in every scheduled fade curve.
pub const CURVE_LENGTH: usize = 10_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FadeError {
    #[error("Unsupported fade type {0:?}")]
    InvalidFadeType(String),
    #[error("Unsupported fade shape {0:?}")]
    UnsupportedFadeShape(String),
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FadeType {
    FadeIn,
    FadeOut,
}

impl FadeType {
    fn rotation(self) -> i8 {
        match self {
            FadeType::FadeIn => 1,
            FadeType::FadeOut => -1,
        }
    }
}

impl FromStr for FadeType {
    type Err = FadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FadeIn" => Ok(FadeType::FadeIn),
            "FadeOut" => Ok(FadeType::FadeOut),
            other => Err(FadeError::InvalidFadeType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FadeShape {
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "exponential")]
    Exponential,
    #[default]
    #[serde(rename = "logarithmic")]
    Logarithmic,
    #[serde(rename = "sCurve")]
    SCurve,
}

impl FadeShape {
    pub fn as_str(self) -> &'static str {
        match self {
            FadeShape::Linear => "linear",
            FadeShape::Exponential => "exponential",
            FadeShape::Logarithmic => "logarithmic",
            FadeShape::SCurve => "sCurve",
        }
    }
}

impl fmt::Display for FadeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FadeShape {
    type Err = FadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(FadeShape::Linear),
            "exponential" => Ok(FadeShape::Exponential),
            "logarithmic" => Ok(FadeShape::Logarithmic),
            "sCurve" => Ok(FadeShape::SCurve),
            other => Err(FadeError::UnsupportedFadeShape(other.to_string())),
        }
    }
}

pub fn linear(length: usize, rotation: i8) -> Vec<f32> {
    let scale = length.saturating_sub(1).max(1) as f64;
    (0..length)
        .map(|i| {
            let x = i as f64 / scale;
            if rotation > 0 { x as f32 } else { (1.0 - x) as f32 }
        })
        .collect()
}

pub fn exponential(length: usize, rotation: i8) -> Vec<f32> {
    let scale = length.saturating_sub(1).max(1) as f64;
    let mut curve = vec![0.0f32; length];
    for i in 0..length {
        let x = i as f64 / scale;
        let index = if rotation > 0 { i } else { length - 1 - i };
        curve[index] = ((2.0 * x - 1.0).exp() / 1f64.exp()) as f32;
    }
    curve
}

pub fn s_curve(length: usize, rotation: i8) -> Vec<f32> {
    let phase = if rotation > 0 { PI / 2.0 } else { -(PI / 2.0) };
    (0..length)
        .map(|i| ((PI * i as f64 / length as f64 - phase).sin() / 2.0 + 0.5) as f32)
        .collect()
}

pub fn logarithmic(length: usize, base: f64, rotation: i8) -> Vec<f32> {
    let mut curve = vec![0.0f32; length];
    for i in 0..length {
        let index = if rotation > 0 { i } else { length - 1 - i };
        let x = i as f64 / length as f64;
        curve[index] = ((1.0 + base * x).ln() / (1.0 + base).ln()) as f32;
    }
    curve
}

/// The gain curve of a fade drawn or scheduled over `length` points.
pub fn curve(shape: FadeShape, fade_type: FadeType, length: usize) -> Vec<f32> {
    let rotation = fade_type.rotation();
    match shape {
        FadeShape::Linear => linear(length, rotation),
        FadeShape::Exponential => exponential(length, rotation),
        FadeShape::SCurve => s_curve(length, rotation),
        FadeShape::Logarithmic => logarithmic(length, 10.0, rotation),
    }
}

/// Schedules a fade onto `gain`. `now` is the clock time the schedule is made at.
pub fn create_fade(
    gain: &mut AudioParam,
    fade_type: FadeType,
    shape: FadeShape,
    start: f64,
    duration: f64,
    now: f64,
) -> Result<(), FadeError> {
    let (from, to) = match fade_type {
        FadeType::FadeIn => (0.0, 1.0),
        FadeType::FadeOut => (1.0, 0.0),
    };

    match shape {
        FadeShape::Linear => {
            gain.linear_ramp_to_value_at_time(from, start, now)?;
            gain.linear_ramp_to_value_at_time(to, start + duration, now)?;
        }
        FadeShape::Exponential => {
            // an exponential ramp cannot reach zero
            let (from, to) = (from.max(0.01), to.max(0.01));
            gain.exponential_ramp_to_value_at_time(from, start, now)?;
            gain.exponential_ramp_to_value_at_time(to, start + duration, now)?;
        }
        FadeShape::SCurve | FadeShape::Logarithmic => {
            let values: Arc<[f32]> = curve(shape, fade_type, CURVE_LENGTH).into();
            gain.set_value_curve_at_time(values, start, duration, now)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn curves_have_expected_ends() {
        let lin = curve(FadeShape::Linear, FadeType::FadeIn, CURVE_LENGTH);
        assert_eq!(lin.len(), CURVE_LENGTH);
        assert_eq!(lin[0], 0.0);
        assert_eq!(lin[CURVE_LENGTH - 1], 1.0);

        let exp = curve(FadeShape::Exponential, FadeType::FadeOut, CURVE_LENGTH);
        assert_abs_diff_eq!(exp[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(exp[CURVE_LENGTH - 1], (-2f64).exp() as f32, epsilon = 1e-6);

        let s = curve(FadeShape::SCurve, FadeType::FadeIn, 4);
        assert_abs_diff_eq!(s[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(s[2], 0.5, epsilon = 1e-6);

        let log = curve(FadeShape::Logarithmic, FadeType::FadeIn, 10);
        assert_eq!(log[0], 0.0);
        assert!(log.windows(2).all(|w| w[0] < w[1]));
        let log_out = curve(FadeShape::Logarithmic, FadeType::FadeOut, 10);
        assert_eq!(log_out[9], 0.0);
    }

    #[test]
    fn every_curve_stays_in_unit_range() {
        for shape in [FadeShape::Linear, FadeShape::Exponential, FadeShape::SCurve, FadeShape::Logarithmic] {
            for ty in [FadeType::FadeIn, FadeType::FadeOut] {
                assert!(curve(shape, ty, 500).iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn unknown_names_are_errors() {
        assert_eq!("cubic".parse::<FadeShape>(), Err(FadeError::UnsupportedFadeShape("cubic".into())));
        assert_eq!("Fade".parse::<FadeType>(), Err(FadeError::InvalidFadeType("Fade".into())));
        assert_eq!("sCurve".parse::<FadeShape>(), Ok(FadeShape::SCurve));
    }

    #[test]
    fn linear_fade_out_ramps_down() {
        let mut gain = AudioParam::new(1.0);
        create_fade(&mut gain, FadeType::FadeOut, FadeShape::Linear, 1.0, 2.0, 0.0).unwrap();
        assert_abs_diff_eq!(gain.value_at(1.0), 1.0);
        assert_abs_diff_eq!(gain.value_at(2.0), 0.5);
        assert_abs_diff_eq!(gain.value_at(3.5), 0.0);
    }

    #[test]
    fn logarithmic_fade_in_uses_curve() {
        let mut gain = AudioParam::new(1.0);
        create_fade(&mut gain, FadeType::FadeIn, FadeShape::Logarithmic, 0.0, 1.0, 0.0).unwrap();
        assert_abs_diff_eq!(gain.value_at(0.0), 0.0);
        assert!(gain.value_at(0.5) > 0.5);
        assert_abs_diff_eq!(gain.value_at(2.0), curve(FadeShape::Logarithmic, FadeType::FadeIn, CURVE_LENGTH)[CURVE_LENGTH - 1]);
    }
}
