// tests/export_wav.rs

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use dawsome::engine::AudioContext;
use dawsome::playlist::{Playlist, PlaylistConfig, PlaylistEvent, RenderOutput, RenderType};
use dawsome::session::{load_track_list, write_wav_file};

const RATE: u32 = 44_100;

fn write_tone(path: &std::path::Path, frames: usize) {
    let spec = hound::WavSpec { channels: 1, sample_rate: RATE, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..frames {
        writer.write_sample(i16::MAX / 4).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn track_list_renders_to_a_stereo_wav_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_tone(&dir.path().join("tone.wav"), RATE as usize / 2);
    let list = dir.path().join("tracks.json");
    std::fs::write(&list, r#"[{"src": "tone.wav", "name": "Tone"}]"#).unwrap();

    let mut playlist = Playlist::new(AudioContext::new(RATE), PlaylistConfig::default()).unwrap();
    let rendered = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&rendered);
    playlist.subscribe(move |e| {
        if let PlaylistEvent::AudioRenderingFinished(RenderOutput::Wav(bytes)) = e {
            *sink.borrow_mut() = Some(bytes.clone());
        }
    });

    playlist.load(load_track_list(&list).unwrap()).unwrap();
    assert_eq!(playlist.tracks().len(), 1);

    playlist.dispatch(PlaylistEvent::StartAudioRendering(RenderType::Wav)).unwrap();
    for _ in 0..400 {
        playlist.tick().unwrap();
        if rendered.borrow().is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let bytes = rendered.borrow_mut().take().expect("wav export never finished");

    let out = dir.path().join("mix.wav");
    write_wav_file(&out, &bytes).unwrap();

    let mut reader = hound::WavReader::open(&out).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.duration(), RATE / 2);

    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    let loudest = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!(loudest > 1000);
}
