// src/peaks/mod.rs

pub mod worker;

pub use worker::{JobKey, PeakJob, PeakResult, PeakWorker, Submission, ThrottlePolicy};

use crate::buffer::AudioBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeakError {
    #[error("Invalid number of bits specified for peaks: {0}")]
    InvalidBitDepth(u32),
    #[error("samples per pixel must be positive")]
    ZeroResolution,
}

/// Width of the signed integers a peak is stored as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bits {
    Eight,
    Sixteen,
    ThirtyTwo,
}

impl Bits {
    pub fn as_u32(self) -> u32 {
        match self {
            Bits::Eight => 8,
            Bits::Sixteen => 16,
            Bits::ThirtyTwo => 32,
        }
    }

    /// `2^(bits-1)`, the magnitude of the most negative value.
    pub fn max_magnitude(self) -> f64 {
        2f64.powi(self.as_u32() as i32 - 1)
    }
}

impl TryFrom<u32> for Bits {
    type Error = PeakError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(Bits::Eight),
            16 => Ok(Bits::Sixteen),
            32 => Ok(Bits::ThirtyTwo),
            other => Err(PeakError::InvalidBitDepth(other)),
        }
    }
}

impl From<Bits> for u32 {
    fn from(bits: Bits) -> u32 {
        bits.as_u32()
    }
}

/// Interleaved `(min, max)` pairs per channel.
///
/// `data[c].len() == length * 2` for every channel and every value lies in
/// `[-2^(bits-1), 2^(bits-1) - 1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeakSet {
    pub length: usize,
    pub bits: Bits,
    pub data: Vec<Vec<i32>>,
}

impl PeakSet {
    pub fn empty(bits: Bits) -> Self {
        Self { length: 0, bits, data: vec![Vec::new()] }
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    /// Normalised `(min, max)` of one pixel, in `[-1, 1]`.
    pub fn normalized(&self, channel: usize, pixel: usize) -> Option<(f32, f32)> {
        let ch = self.data.get(channel)?;
        let min = *ch.get(pixel * 2)?;
        let max = *ch.get(pixel * 2 + 1)?;
        let scale = self.bits.max_magnitude();
        Some(((min as f64 / scale) as f32, (max as f64 / scale) as f32))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PeakOptions {
    pub samples_per_pixel: usize,
    pub mono: bool,
    /// First sample index (inclusive). `None` starts at 0.
    pub cue_in: Option<usize>,
    /// Last sample index (exclusive). `None` runs to the end.
    pub cue_out: Option<usize>,
    pub bits: u32,
}

impl Default for PeakOptions {
    fn default() -> Self {
        Self {
            samples_per_pixel: 1000,
            mono: true,
            cue_in: None,
            cue_out: None,
            bits: 16,
        }
    }
}

fn find_min_max(segment: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &s in segment {
        if min > s {
            min = s;
        }
        if max < s {
            max = s;
        }
    }
    (min, max)
}

/// Float sample to a two's complement value of `bits` width.
/// Negative values scale by `2^(bits-1)`, positive by `2^(bits-1) - 1`.
pub fn convert(value: f32, bits: Bits) -> i32 {
    let max = bits.max_magnitude();
    let v = value as f64;
    let v = if v < 0.0 { v * max } else { v * (max - 1.0) };
    // `as` truncates toward zero and maps NaN to 0.
    v.clamp(-max, max - 1.0) as i32
}

/// Min/max of each `samples_per_pixel` block of `channel`; the final block may be short.
pub fn extract_peaks(channel: &[f32], samples_per_pixel: usize, bits: Bits) -> Result<Vec<i32>, PeakError> {
    if samples_per_pixel == 0 {
        return Err(PeakError::ZeroResolution);
    }
    let num_peaks = channel.len().div_ceil(samples_per_pixel);
    let mut peaks = Vec::with_capacity(num_peaks * 2);

    for segment in channel.chunks(samples_per_pixel) {
        let (min, max) = find_min_max(segment);
        peaks.push(convert(min, bits));
        peaks.push(convert(max, bits));
    }

    Ok(peaks)
}

/// Averages channel peaks into one channel with weight `1 / channels`.
pub fn make_mono(channel_peaks: &[Vec<i32>]) -> Vec<i32> {
    let num_chan = channel_peaks.len();
    if num_chan == 0 {
        return Vec::new();
    }
    let weight = 1.0 / num_chan as f64;
    let len = channel_peaks.iter().map(Vec::len).min().unwrap_or(0);

    (0..len)
        .map(|i| {
            let sum: f64 = channel_peaks.iter().map(|c| weight * c[i] as f64).sum();
            sum as i32
        })
        .collect()
}

fn clamp_range(len: usize, cue_in: Option<usize>, cue_out: Option<usize>) -> (usize, usize) {
    let end = cue_out.unwrap_or(len).min(len);
    let start = cue_in.unwrap_or(0).min(end);
    (start, end)
}

/// Peaks for every channel of `source` within `[cue_in, cue_out)`.
pub fn audio_peaks(source: &AudioBuffer, opts: PeakOptions) -> Result<PeakSet, PeakError> {
    let bits = Bits::try_from(opts.bits)?;
    let (start, end) = clamp_range(source.length(), opts.cue_in, opts.cue_out);

    let mut data = Vec::with_capacity(source.number_of_channels());
    for c in 0..source.number_of_channels() {
        data.push(extract_peaks(&source.channel(c)[start..end], opts.samples_per_pixel, bits)?);
    }

    if opts.mono && data.len() > 1 {
        data = vec![make_mono(&data)];
    }

    let length = data[0].len() / 2;
    Ok(PeakSet { length, bits, data })
}

/// Peaks for a single raw channel, as used for live recordings.
pub fn slice_peaks(samples: &[f32], opts: PeakOptions) -> Result<PeakSet, PeakError> {
    let bits = Bits::try_from(opts.bits)?;
    let (start, end) = clamp_range(samples.len(), opts.cue_in, opts.cue_out);
    let peaks = extract_peaks(&samples[start..end], opts.samples_per_pixel, bits)?;
    Ok(PeakSet { length: peaks.len() / 2, bits, data: vec![peaks] })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 / len as f32) * 2.0 - 1.0).collect()
    }

    #[test]
    fn one_sample_per_pixel_keeps_every_sample() {
        let samples = vec![0.5f32, -0.25, 1.0, -1.0, 0.0];
        let peaks = extract_peaks(&samples, 1, Bits::Sixteen).unwrap();
        assert_eq!(peaks.len(), samples.len() * 2);
        for (i, &s) in samples.iter().enumerate() {
            let v = convert(s, Bits::Sixteen);
            assert_eq!(peaks[i * 2], v);
            assert_eq!(peaks[i * 2 + 1], v);
        }
    }

    #[test]
    fn conversion_scales_asymmetrically() {
        assert_eq!(convert(1.0, Bits::Eight), 127);
        assert_eq!(convert(-1.0, Bits::Eight), -128);
        assert_eq!(convert(0.5, Bits::Sixteen), 16383);
        assert_eq!(convert(-0.5, Bits::Sixteen), -16384);
        assert_eq!(convert(1.0, Bits::ThirtyTwo), i32::MAX);
        assert_eq!(convert(-1.0, Bits::ThirtyTwo), i32::MIN);
        assert_eq!(convert(4.0, Bits::Eight), 127);
        assert_eq!(convert(f32::NAN, Bits::Eight), 0);
    }

    #[test]
    fn values_stay_in_range_for_all_depths() {
        let samples = ramp(4097);
        for bits in [8u32, 16, 32] {
            let b = Bits::try_from(bits).unwrap();
            let max = b.max_magnitude() as i64;
            for spp in [1usize, 7, 256] {
                for v in extract_peaks(&samples, spp, b).unwrap() {
                    assert!((v as i64) >= -max && (v as i64) <= max - 1);
                }
            }
        }
    }

    #[test]
    fn last_segment_may_be_short() {
        let samples = vec![0.1f32, 0.2, 0.3, -0.9, 0.4];
        let peaks = extract_peaks(&samples, 2, Bits::Eight).unwrap();
        assert_eq!(peaks.len(), 6);
        assert_eq!(peaks[4], convert(0.4, Bits::Eight));
        assert_eq!(peaks[5], convert(0.4, Bits::Eight));
        assert_eq!(peaks[2], convert(-0.9, Bits::Eight));
    }

    #[test]
    fn rejects_unknown_bit_depth() {
        let buf = AudioBuffer::silent(1, 10, 100);
        let err = audio_peaks(&buf, PeakOptions { bits: 12, ..Default::default() }).unwrap_err();
        assert_eq!(err, PeakError::InvalidBitDepth(12));
    }

    #[test]
    fn mono_mix_averages_channels() {
        let buf = AudioBuffer::new(100, vec![vec![1.0, 1.0], vec![-1.0, 0.0]]);
        let set = audio_peaks(&buf, PeakOptions { samples_per_pixel: 2, bits: 8, ..Default::default() }).unwrap();
        assert_eq!(set.data.len(), 1);
        assert_eq!(set.length, 1);
        // min: (127 + -128) / 2 truncated, max: (127 + 0) / 2 truncated
        assert_eq!(set.data[0], vec![0, 63]);
    }

    #[test]
    fn stereo_kept_when_not_mono() {
        let buf = AudioBuffer::new(100, vec![vec![0.5; 10], vec![-0.5; 10]]);
        let set = audio_peaks(&buf, PeakOptions { samples_per_pixel: 3, mono: false, ..Default::default() }).unwrap();
        assert_eq!(set.channels(), 2);
        assert_eq!(set.length, 4);
        assert!(set.data.iter().all(|c| c.len() == set.length * 2));
    }

    #[test]
    fn cue_range_limits_the_scan() {
        let mut samples = vec![0.0f32; 100];
        samples[10] = 1.0;
        samples[90] = -1.0;
        let buf = AudioBuffer::new(100, vec![samples]);
        let set = audio_peaks(
            &buf,
            PeakOptions { samples_per_pixel: 100, cue_in: Some(20), cue_out: Some(80), bits: 8, ..Default::default() },
        )
        .unwrap();
        assert_eq!(set.data[0], vec![0, 0]);
    }

    #[test]
    fn normalized_divides_by_magnitude() {
        let set = PeakSet { length: 1, bits: Bits::Eight, data: vec![vec![-128, 64]] };
        assert_eq!(set.normalized(0, 0), Some((-1.0, 0.5)));
        assert_eq!(set.normalized(0, 1), None);
    }
}
