// src/engine/playout.rs

use super::fades::{FadeError, FadeShape, FadeType, create_fade};
use super::graph::{AudioContext, Completion, EndReason, OwnerId, VoiceId};
use crate::buffer::AudioBuffer;
use crate::effects::EqParams;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayoutState {
    Idle,
    Playing,
    Stopped,
    EndedNaturally,
}

/// One track's path through an audio context.
///
/// Each `setup_source` builds a fresh single-use voice; the returned
/// completion resolves once that voice is stopped or runs out.
pub struct Playout {
    ctx: AudioContext,
    owner: OwnerId,
    buffer: Arc<AudioBuffer>,
    effects: Vec<EqParams>,
    voice: Option<VoiceId>,
    completion: Option<Completion>,
}

impl Playout {
    pub fn new(ctx: AudioContext, owner: OwnerId, buffer: Arc<AudioBuffer>) -> Self {
        Self { ctx, owner, buffer, effects: Vec::new(), voice: None, completion: None }
    }

    pub fn context(&self) -> &AudioContext {
        &self.ctx
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    pub fn state(&self) -> PlayoutState {
        match self.completion.as_ref().map(Completion::reason) {
            None => PlayoutState::Idle,
            Some(None) => PlayoutState::Playing,
            Some(Some(EndReason::Stopped)) => PlayoutState::Stopped,
            Some(Some(EndReason::EndedNaturally)) => PlayoutState::EndedNaturally,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayoutState::Playing
    }

    /// Returns the chain to `Idle` once the running voice has ended, giving
    /// back the state it ended in.
    pub fn settle(&mut self) -> Option<PlayoutState> {
        let ended = match self.state() {
            PlayoutState::Idle | PlayoutState::Playing => return None,
            ended => ended,
        };
        self.voice = None;
        self.completion = None;
        Some(ended)
    }

    pub fn setup_source(&mut self) -> Completion {
        if let Some(old) = self.voice.take() {
            // a voice nobody stopped would keep sounding under the new one
            self.ctx.stop(old, 0.0);
        }
        let (voice, completion) = self.ctx.create_voice(self.owner, self.buffer.clone());
        self.ctx.set_effects(voice, &self.effects);
        self.voice = Some(voice);
        self.completion = Some(completion.clone());
        completion
    }

    pub fn apply_fade(&mut self, fade_type: FadeType, start: f64, duration: f64, shape: FadeShape) -> Result<(), FadeError> {
        let Some(voice) = self.voice else {
            return Ok(());
        };
        self.ctx
            .automate_fade(voice, |gain, now| create_fade(gain, fade_type, shape, start, duration, now))
            .unwrap_or(Ok(()))
    }

    pub fn apply_fade_in(&mut self, start: f64, duration: f64, shape: FadeShape) -> Result<(), FadeError> {
        self.apply_fade(FadeType::FadeIn, start, duration, shape)
    }

    pub fn apply_fade_out(&mut self, start: f64, duration: f64, shape: FadeShape) -> Result<(), FadeError> {
        self.apply_fade(FadeType::FadeOut, start, duration, shape)
    }

    pub fn set_volume_gain_level(&self, level: f32) {
        if let Some(v) = self.voice {
            self.ctx.set_volume(v, level);
        }
    }

    pub fn set_should_play(&self, should_play: bool) {
        if let Some(v) = self.voice {
            self.ctx.set_should_play(v, should_play);
        }
    }

    pub fn set_master_gain_level(&self, level: f32) {
        self.ctx.set_master_gain(level);
    }

    pub fn set_stereo_pan_value(&self, pan: f32) {
        if let Some(v) = self.voice {
            self.ctx.set_pan(v, pan);
        }
    }

    /// Takes effect from the next `setup_source`, and on the running voice.
    pub fn set_effects(&mut self, effects: Vec<EqParams>) {
        if let Some(v) = self.voice {
            self.ctx.set_effects(v, &effects);
        }
        self.effects = effects;
    }

    pub fn play(&self, when: f64, start: f64, duration: f64) {
        if let Some(v) = self.voice {
            self.ctx.start(v, when, start, duration);
        }
    }

    pub fn stop(&mut self, when: f64) {
        if let Some(v) = self.voice {
            self.ctx.stop(v, when);
            if !self.ctx.is_active(v) {
                self.voice = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playout(ctx: &AudioContext) -> Playout {
        let buffer = Arc::new(AudioBuffer::new(100, vec![vec![1.0; 100]]));
        Playout::new(ctx.clone(), 1, buffer)
    }

    #[test]
    fn states_follow_the_voice() {
        let ctx = AudioContext::new(100);
        let mut p = playout(&ctx);
        assert_eq!(p.state(), PlayoutState::Idle);

        p.setup_source();
        p.play(0.0, 0.0, 0.5);
        assert!(p.is_playing());

        let mut out = vec![0.0; 2 * 60];
        ctx.render(&mut out);
        assert_eq!(p.state(), PlayoutState::EndedNaturally);

        let done = p.setup_source();
        p.play(0.0, 0.0, 1.0);
        p.stop(0.0);
        assert_eq!(done.reason(), Some(EndReason::Stopped));
        assert_eq!(p.state(), PlayoutState::Stopped);
    }

    #[test]
    fn settled_chain_is_idle_again() {
        let ctx = AudioContext::new(100);
        let mut p = playout(&ctx);
        assert_eq!(p.settle(), None);

        p.setup_source();
        p.play(0.0, 0.0, 0.5);
        assert_eq!(p.settle(), None);

        let mut out = vec![0.0; 2 * 60];
        ctx.render(&mut out);
        assert_eq!(p.settle(), Some(PlayoutState::EndedNaturally));
        assert_eq!(p.state(), PlayoutState::Idle);
        assert_eq!(p.settle(), None);

        p.setup_source();
        p.play(0.0, 0.0, 1.0);
        p.stop(0.0);
        assert_eq!(p.settle(), Some(PlayoutState::Stopped));
        assert_eq!(p.state(), PlayoutState::Idle);
    }

    #[test]
    fn setters_before_setup_are_ignored() {
        let ctx = AudioContext::new(100);
        let mut p = playout(&ctx);
        p.set_volume_gain_level(0.5);
        p.set_stereo_pan_value(1.0);
        assert!(p.apply_fade_in(0.0, 1.0, FadeShape::Linear).is_ok());
        p.stop(0.0);
        assert_eq!(p.state(), PlayoutState::Idle);
    }

    #[test]
    fn fade_in_shapes_the_output() {
        let ctx = AudioContext::new(100);
        let mut p = playout(&ctx);
        p.setup_source();
        p.apply_fade_in(0.0, 0.5, FadeShape::Linear).unwrap();
        p.set_stereo_pan_value(-1.0);
        p.play(0.0, 0.0, 1.0);

        let mut out = vec![0.0; 2 * 100];
        ctx.render(&mut out);
        assert_eq!(out[0], 0.0);
        assert!((out[2 * 25] - 0.5).abs() < 1e-4);
        assert!((out[2 * 80] - 1.0).abs() < 1e-4);
    }
}
