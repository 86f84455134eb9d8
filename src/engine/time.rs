// src/engine/time.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub fn samples_to_seconds(samples: usize, sample_rate: u32) -> f64 {
    samples as f64 / sample_rate as f64
}

pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds * sample_rate as f64).ceil().max(0.0) as usize
}

pub fn samples_to_pixels(samples: usize, samples_per_pixel: usize) -> usize {
    samples / samples_per_pixel.max(1)
}

pub fn pixels_to_samples(pixels: f64, samples_per_pixel: usize) -> usize {
    (pixels * samples_per_pixel as f64).floor().max(0.0) as usize
}

pub fn pixels_to_seconds(pixels: f64, samples_per_pixel: usize, sample_rate: u32) -> f64 {
    pixels * samples_per_pixel as f64 / sample_rate as f64
}

pub fn seconds_to_pixels(seconds: f64, samples_per_pixel: usize, sample_rate: u32) -> f64 {
    (seconds * sample_rate as f64 / samples_per_pixel as f64).ceil()
}

/// Fixed-point text with ties rounded away from zero.
pub fn to_fixed(value: f64, decimals: usize) -> String {
    let scale = 10f64.powi(decimals as i32);
    let rounded = (value * scale).round() / scale;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.decimals$}")
}

/// How the playhead and selection times are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DurationFormat {
    #[serde(rename = "seconds")]
    Seconds,
    #[serde(rename = "thousandths")]
    Thousandths,
    #[serde(rename = "hh:mm:ss")]
    Clock,
    #[serde(rename = "hh:mm:ss.u")]
    ClockTenths,
    #[serde(rename = "hh:mm:ss.uu")]
    ClockHundredths,
    #[default]
    #[serde(rename = "hh:mm:ss.uuu")]
    ClockThousandths,
}

fn clock(seconds: f64, decimals: usize) -> String {
    let hours = (seconds / 3600.0).trunc() as i64 % 24;
    let minutes = (seconds / 60.0).trunc() as i64 % 60;
    let secs = to_fixed(seconds % 60.0, decimals);
    let pad_secs = secs.parse::<f64>().is_ok_and(|s| s < 10.0);
    format!(
        "{:02}:{:02}:{}{}",
        hours,
        minutes,
        if pad_secs { "0" } else { "" },
        secs
    )
}

impl DurationFormat {
    pub fn format(self, seconds: f64) -> String {
        match self {
            DurationFormat::Seconds => to_fixed(seconds, 0),
            DurationFormat::Thousandths => to_fixed(seconds, 3),
            DurationFormat::Clock => clock(seconds, 0),
            DurationFormat::ClockTenths => clock(seconds, 1),
            DurationFormat::ClockHundredths => clock(seconds, 2),
            DurationFormat::ClockThousandths => clock(seconds, 3),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DurationFormat::Seconds => "seconds",
            DurationFormat::Thousandths => "thousandths",
            DurationFormat::Clock => "hh:mm:ss",
            DurationFormat::ClockTenths => "hh:mm:ss.u",
            DurationFormat::ClockHundredths => "hh:mm:ss.uu",
            DurationFormat::ClockThousandths => "hh:mm:ss.uuu",
        }
    }
}

impl fmt::Display for DurationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown duration format {0:?}")]
pub struct UnknownFormat(pub String);

impl FromStr for DurationFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            DurationFormat::Seconds,
            DurationFormat::Thousandths,
            DurationFormat::Clock,
            DurationFormat::ClockTenths,
            DurationFormat::ClockHundredths,
            DurationFormat::ClockThousandths,
        ]
        .into_iter()
        .find(|f| f.as_str() == s)
        .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn conversions_round_the_right_way() {
        assert_relative_eq!(samples_to_seconds(22050, 44100), 0.5);
        assert_eq!(seconds_to_samples(0.50001, 44100), 22051);
        assert_eq!(samples_to_pixels(4095, 1000), 4);
        assert_eq!(pixels_to_samples(2.5, 1000), 2500);
        assert_relative_eq!(pixels_to_seconds(10.0, 4410, 44100), 1.0);
        assert_eq!(seconds_to_pixels(1.0001, 4410, 44100), 11.0);
    }

    #[test]
    fn clock_formats_pad_fields() {
        assert_eq!(DurationFormat::Clock.format(3725.0), "01:02:05");
        assert_eq!(DurationFormat::ClockThousandths.format(61.5), "00:01:01.500");
        assert_eq!(DurationFormat::ClockTenths.format(12.34), "00:00:12.3");
        assert_eq!(DurationFormat::ClockHundredths.format(0.0), "00:00:00.00");
    }

    #[test]
    fn hours_wrap_at_a_day() {
        assert_eq!(DurationFormat::Clock.format(25.0 * 3600.0), "01:00:00");
    }

    #[test]
    fn plain_formats() {
        assert_eq!(DurationFormat::Seconds.format(2.5), "3");
        assert_eq!(DurationFormat::Thousandths.format(1.23456), "1.235");
        assert_eq!(to_fixed(-0.0001, 2), "0.00");
    }

    #[test]
    fn parses_names() {
        assert_eq!("hh:mm:ss.u".parse::<DurationFormat>().unwrap(), DurationFormat::ClockTenths);
        assert!("minutes".parse::<DurationFormat>().is_err());
    }
}
