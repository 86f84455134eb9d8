// tests/project_roundtrip.rs

use approx::assert_relative_eq;

use dawsome::engine::{AudioContext, FadeInfo, FadeShape};
use dawsome::playlist::{Playlist, PlaylistConfig};
use dawsome::session::{TrackInfo, load_project, save_project};

const RATE: u32 = 8000;

fn write_tone(path: &std::path::Path, frames: usize) {
    let spec = hound::WavSpec { channels: 2, sample_rate: RATE, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let s = if i % 2 == 0 { 4000 } else { -4000 };
        writer.write_sample(s as i16).unwrap();
        writer.write_sample(-s as i16).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn saved_project_loads_back_into_the_same_layout() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("loop.wav");
    write_tone(&wav, RATE as usize * 2);

    let mut original = Playlist::new(AudioContext::new(RATE), PlaylistConfig::default()).unwrap();
    original
        .load(vec![TrackInfo {
            name: Some("Loop".to_string()),
            start: Some(1.5),
            cuein: Some(0.25),
            gain: Some(0.8),
            stereo_pan: Some(-0.5),
            fade_in: Some(FadeInfo { shape: FadeShape::Linear, duration: 0.5 }),
            ..TrackInfo::from_path(&wav)
        }])
        .unwrap();
    original.set_zoom(1024).unwrap();
    original.set_master_gain(0.5);

    let project = dir.path().join("project.json");
    save_project(&original, &project).unwrap();

    let mut restored = Playlist::new(AudioContext::new(RATE), PlaylistConfig::default()).unwrap();
    load_project(&mut restored, &project).unwrap();

    assert_eq!(restored.samples_per_pixel(), 1024);
    assert_relative_eq!(restored.master_gain(), 0.5);
    assert_eq!(restored.get_info(), original.get_info());

    let track = &restored.tracks()[0];
    assert_eq!(track.name, "Loop");
    assert_relative_eq!(track.start_time(), 1.5);
    assert_relative_eq!(track.duration(), 1.75);
    assert_relative_eq!(restored.duration(), 3.25);
}
