// tests/playlist_flow.rs

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use dawsome::engine::{AudioContext, GraphEvent};
use dawsome::loader::AudioSource;
use dawsome::playlist::{Playlist, PlaylistConfig, PlaylistEvent};
use dawsome::session::TrackInfo;
use dawsome::AudioBuffer;

const RATE: u32 = 1000;

fn tone(name: &str, seconds: f64) -> TrackInfo {
    let frames = (seconds * RATE as f64) as usize;
    TrackInfo {
        src: Some(AudioSource::Buffer(Arc::new(AudioBuffer::new(RATE, vec![vec![0.5; frames]])))),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn block(ctx: &AudioContext, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0; frames * 2];
    ctx.render(&mut out);
    out
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

#[test]
fn muting_silences_the_live_mix_until_toggled_back() {
    let ctx = AudioContext::new(RATE);
    let mut playlist = Playlist::new(ctx.clone(), PlaylistConfig::default()).unwrap();
    playlist.load(vec![tone("a", 5.0)]).unwrap();
    let id = playlist.tracks()[0].id();

    playlist.dispatch(PlaylistEvent::Play { start: None, end: None }).unwrap();
    assert!(peak(&block(&ctx, 100)) > 0.1);

    playlist.dispatch(PlaylistEvent::Mute(id)).unwrap();
    assert_eq!(peak(&block(&ctx, 100)), 0.0);

    playlist.dispatch(PlaylistEvent::Mute(id)).unwrap();
    assert!(peak(&block(&ctx, 100)) > 0.1);
}

#[test]
fn seeking_while_playing_replaces_every_voice() {
    let ctx = AudioContext::new(RATE);
    let mut playlist = Playlist::new(ctx.clone(), PlaylistConfig::default()).unwrap();
    playlist.load(vec![tone("a", 5.0), tone("b", 4.0)]).unwrap();

    playlist.play(Some(0.0), None).unwrap();
    block(&ctx, 500);
    ctx.clear_events();

    playlist.queue().push(PlaylistEvent::Select { start: 2.0, end: 2.0, track: None });
    playlist.tick().unwrap();

    let events = ctx.events();
    let first_setup = events.iter().position(|e| matches!(e, GraphEvent::Setup { .. })).unwrap();
    let last_teardown = events.iter().rposition(|e| matches!(e, GraphEvent::Teardown { .. })).unwrap();
    assert!(last_teardown < first_setup);
    assert_eq!(events.iter().filter(|e| matches!(e, GraphEvent::Setup { .. })).count(), 2);
    for track in playlist.tracks() {
        assert_eq!(ctx.active_voices(track.id().0), 1);
    }
    assert!(playlist.is_playing());
}

#[test]
fn playback_runs_to_the_end_and_reports_finished() {
    let ctx = AudioContext::new(RATE);
    let mut playlist = Playlist::new(ctx.clone(), PlaylistConfig::default()).unwrap();
    playlist.load(vec![tone("a", 1.0)]).unwrap();

    let finished = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&finished);
    playlist.subscribe(move |e| {
        if matches!(e, PlaylistEvent::Finished) {
            *sink.borrow_mut() += 1;
        }
    });

    playlist.play(None, None).unwrap();
    // eighths of a second keep the clock exact
    for _ in 0..12 {
        block(&ctx, 125);
        playlist.tick().unwrap();
    }

    assert!(!playlist.is_playing());
    assert_eq!(*finished.borrow(), 1);
}
