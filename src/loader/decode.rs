// src/loader/decode.rs

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use super::LoadError;
use crate::buffer::AudioBuffer;

/// Decodes a complete encoded file held in memory.
///
/// `hint` is a file extension that helps the probe pick a reader.
pub fn decode(bytes: Vec<u8>, hint: Option<&str>) -> Result<AudioBuffer, LoadError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut probe_hint = Hint::new();
    if let Some(ext) = hint {
        probe_hint.with_extension(ext);
    }
    let probed = get_probe().format(&probe_hint, mss, &FormatOptions::default(), &MetadataOptions::default())?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| LoadError::NoAudioTrack(hint.unwrap_or("stream").to_string()))?;
    let track_id = track.id;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut interleaved = Vec::<f32>::new();
    let mut layout: Option<(u32, usize)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("skipping undecodable packet: {msg}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count();
        // the first non-empty packet fixes the layout
        if layout.is_none() {
            if decoded.frames() == 0 {
                continue;
            }
            log::debug!("decoding at {} Hz, {} channels", spec.rate, packet_channels);
            layout = Some((spec.rate, packet_channels));
        }
        let channels = layout.map_or(packet_channels, |(_, c)| c);

        if sample_buf.as_ref().is_none_or(|b| b.capacity() < decoded.capacity()) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        let samples = buf.samples();

        if packet_channels == channels {
            interleaved.extend_from_slice(samples);
        } else if packet_channels == 1 && channels == 2 {
            for &s in samples {
                interleaved.push(s);
                interleaved.push(s);
            }
        } else if packet_channels == 2 && channels == 1 {
            interleaved.extend(samples.chunks(2).map(|p| (p[0] + p.get(1).copied().unwrap_or(p[0])) * 0.5));
        } else {
            log::warn!("dropping packet with {packet_channels} channels in a {channels} channel stream");
        }
    }

    let (sample_rate, channels) = layout.ok_or_else(|| LoadError::NoAudioTrack(hint.unwrap_or("stream").to_string()))?;
    Ok(AudioBuffer::from_interleaved(&interleaved, channels, sample_rate))
}
