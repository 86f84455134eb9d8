// src/loader/resample.rs

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction, calculate_cutoff,
};

use super::LoadError;
use crate::buffer::AudioBuffer;

const CHUNK_SIZE: usize = 1024;

fn build_resampler(src_rate: u32, dst_rate: u32, channels: usize) -> Result<SincFixedIn<f32>, LoadError> {
    let ratio = dst_rate as f64 / src_rate as f64;
    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    Ok(SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_SIZE, channels)?)
}

fn append(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(block) {
        dst.extend_from_slice(&src);
    }
}

/// Converts `buffer` to `dst_rate`. The result has `ceil(length * ratio)` frames.
pub fn resample(buffer: &AudioBuffer, dst_rate: u32) -> Result<AudioBuffer, LoadError> {
    let src_rate = buffer.sample_rate();
    if src_rate == dst_rate || buffer.length() == 0 {
        return Ok(AudioBuffer::new(dst_rate, buffer.channels().to_vec()));
    }

    let channels = buffer.number_of_channels();
    let mut resampler = build_resampler(src_rate, dst_rate, channels)?;
    let expected = (buffer.length() as f64 * dst_rate as f64 / src_rate as f64).ceil() as usize;
    let delay = resampler.output_delay();

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut pos = 0;
    let length = buffer.length();
    while length - pos >= resampler.input_frames_next() {
        let need = resampler.input_frames_next();
        let block: Vec<&[f32]> = buffer.channels().iter().map(|c| &c[pos..pos + need]).collect();
        append(&mut out, resampler.process(&block, None)?);
        pos += need;
    }
    if pos < length {
        let rest: Vec<&[f32]> = buffer.channels().iter().map(|c| &c[pos..]).collect();
        append(&mut out, resampler.process_partial(Some(rest.as_slice()), None)?);
    }

    // flush the filter tail until the delayed signal is all out
    let mut produced = out.first().map_or(0, Vec::len);
    while produced < expected + delay {
        append(&mut out, resampler.process_partial::<&[f32]>(None, None)?);
        let now = out.first().map_or(0, Vec::len);
        if now == produced {
            break;
        }
        produced = now;
    }

    let resampled = out
        .into_iter()
        .map(|mut ch| {
            ch.drain(..delay.min(ch.len()));
            ch.resize(expected, 0.0);
            ch
        })
        .collect();
    Ok(AudioBuffer::new(dst_rate, resampled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn same_rate_is_a_copy() {
        let b = AudioBuffer::new(44100, vec![vec![0.25; 10]]);
        let r = resample(&b, 44100).unwrap();
        assert_eq!(r.channel(0), b.channel(0));
    }

    #[test]
    fn doubles_length_and_keeps_level() {
        let sr = 22050;
        let tone: Vec<f32> = (0..sr).map(|i| (2.0 * PI * 441.0 * i as f32 / sr as f32).sin() * 0.5).collect();
        let b = AudioBuffer::new(sr as u32, vec![tone.clone(), tone]);
        let r = resample(&b, 44100).unwrap();
        assert_eq!(r.sample_rate(), 44100);
        assert_eq!(r.length(), 44100);
        assert_eq!(r.number_of_channels(), 2);
        let peak = r.channel(0)[4410..39690].iter().fold(0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.02, "peak {peak}");
    }
}
