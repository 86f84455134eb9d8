// src/engine/graph.rs

//! A clocked graph of one-shot buffer voices.
//!
//! `AudioContext` is a cheap handle onto shared graph state. The realtime
//! context is advanced by whoever pulls audio out of it (the output stream
//! callback, or a test); the offline context renders a fixed number of
//! frames as fast as it can. Both run the same voice code, so a mix rendered
//! offline matches what the device would have played.
//!
//! Every voice runs source -> fade gain -> volume -> mute gain -> panner ->
//! effects, and the voices are summed into master gain -> master effects.

use super::automation::AudioParam;
use super::mixer::Mixer;
use crate::buffer::AudioBuffer;
use crate::effects::{EqChain, EqParams};
use std::collections::VecDeque;
use std::f32::consts::FRAC_PI_2;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type VoiceId = u64;
/// Whoever created a voice; tracks use their own id.
pub type OwnerId = u64;

const OUTPUT_CHANNELS: usize = 2;
const EVENT_LOG_LIMIT: usize = 1024;
const OFFLINE_BLOCK: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    Stopped,
    EndedNaturally,
}

/// Voice lifecycle as seen by the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    Setup { owner: OwnerId, voice: VoiceId },
    Teardown { owner: OwnerId, voice: VoiceId, reason: EndReason },
}

/// Resolves exactly once, when a voice stops or runs out of audio.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    inner: Arc<(Mutex<Option<EndReason>>, Condvar)>,
}

impl Completion {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn resolved(reason: EndReason) -> Self {
        let c = Self::default();
        c.resolve(reason);
        c
    }

    fn slot(&self) -> MutexGuard<'_, Option<EndReason>> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, reason: EndReason) {
        let mut slot = self.slot();
        if slot.is_none() {
            *slot = Some(reason);
            self.inner.1.notify_all();
        }
    }

    pub fn reason(&self) -> Option<EndReason> {
        *self.slot()
    }

    pub fn is_resolved(&self) -> bool {
        self.reason().is_some()
    }

    pub fn wait(&self) -> EndReason {
        let mut slot = self.slot();
        loop {
            if let Some(reason) = *slot {
                return reason;
            }
            slot = self.inner.1.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<EndReason> {
        let slot = self.slot();
        let (slot, _) = self
            .inner
            .1
            .wait_timeout_while(slot, timeout, |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *slot
    }
}

/// Stereo panning with the equal-power law of a stereo panner node.
pub fn stereo_pan(left: f32, right: f32, input_is_stereo: bool, pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if !input_is_stereo {
        let x = (pan + 1.0) / 2.0;
        return (left * (x * FRAC_PI_2).cos(), left * (x * FRAC_PI_2).sin());
    }
    if pan <= 0.0 {
        let x = pan + 1.0;
        let (gl, gr) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
        (left + right * gl, right * gr)
    } else {
        let x = pan;
        let (gl, gr) = ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin());
        (left * gl, right + left * gr)
    }
}

struct Voice {
    id: VoiceId,
    owner: OwnerId,
    buffer: Arc<AudioBuffer>,
    started: bool,
    start_frame: u64,
    pos: f64,
    end_pos: f64,
    stop_frame: Option<u64>,
    fade: AudioParam,
    volume: f32,
    should_play: f32,
    pan: f32,
    effects: Option<EqChain>,
    completion: Completion,
}

impl Voice {
    fn read(&self, channel: usize) -> f32 {
        let data = self.buffer.channel(channel);
        let idx = self.pos.floor() as usize;
        let Some(&a) = data.get(idx) else {
            return 0.0;
        };
        let b = data.get(idx + 1).copied().unwrap_or(a);
        a + (b - a) * (self.pos - idx as f64) as f32
    }

    /// Writes this voice's share of the block. Returns how it ended, if it did.
    fn render(&mut self, out: &mut [f32], block_start: u64, sample_rate: u32) -> Option<EndReason> {
        let step = self.buffer.sample_rate() as f64 / sample_rate as f64;
        let stereo = self.buffer.number_of_channels() > 1;
        let sr = sample_rate as f64;

        for (i, frame) in out.chunks_exact_mut(OUTPUT_CHANNELS).enumerate() {
            let now = block_start + i as u64;
            if self.stop_frame.is_some_and(|stop| now >= stop) {
                return Some(EndReason::Stopped);
            }
            if now < self.start_frame {
                continue;
            }
            if self.pos >= self.end_pos {
                return Some(EndReason::EndedNaturally);
            }

            let gain = self.fade.value_at(now as f64 / sr) * self.volume * self.should_play;
            let left = self.read(0) * gain;
            let right = if stereo { self.read(1) * gain } else { left };
            let (l, r) = stereo_pan(left, right, stereo, self.pan);
            let (l, r) = match self.effects.as_mut() {
                Some(eq) => eq.process_frame(l, r),
                None => (l, r),
            };
            frame[0] = l;
            frame[1] = r;
            self.pos += step;
        }

        (self.pos >= self.end_pos).then_some(EndReason::EndedNaturally)
    }
}

struct GraphState {
    sample_rate: u32,
    frame: u64,
    voices: Vec<Voice>,
    next_voice: VoiceId,
    master_gain: f32,
    master_effects: Option<EqChain>,
    mixer: Mixer,
    events: VecDeque<GraphEvent>,
}

impl GraphState {
    fn log(&mut self, event: GraphEvent) {
        if self.events.len() == EVENT_LOG_LIMIT {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn finish(&mut self, id: VoiceId, reason: EndReason) {
        if let Some(at) = self.voices.iter().position(|v| v.id == id) {
            let voice = self.voices.swap_remove(at);
            voice.completion.resolve(reason);
            self.log(GraphEvent::Teardown { owner: voice.owner, voice: id, reason });
        }
    }

    fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.id == id)
    }

    fn render(&mut self, out: &mut [f32]) {
        let frames = out.len() / OUTPUT_CHANNELS;
        let block_start = self.frame;
        let sample_rate = self.sample_rate;
        self.mixer.begin_block(frames);

        let mut ended = Vec::new();
        for voice in self.voices.iter_mut().filter(|v| v.started) {
            let scratch = self.mixer.scratch();
            if let Some(reason) = voice.render(scratch, block_start, sample_rate) {
                ended.push((voice.id, reason));
            }
            self.mixer.accumulate();
        }
        for (id, reason) in ended {
            self.finish(id, reason);
        }

        let master = self.master_gain;
        let mix = self.mixer.mix_mut();
        for frame in mix.chunks_exact_mut(OUTPUT_CHANNELS) {
            let (l, r) = (frame[0] * master, frame[1] * master);
            let (l, r) = match self.master_effects.as_mut() {
                Some(eq) => eq.process_frame(l, r),
                None => (l, r),
            };
            frame[0] = l;
            frame[1] = r;
        }
        self.mixer.mix_into(out);
        self.frame += frames as u64;
    }
}

/// Handle onto a voice graph and its clock.
#[derive(Clone)]
pub struct AudioContext {
    state: Arc<Mutex<GraphState>>,
    offline: bool,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_mode(sample_rate, false)
    }

    fn with_mode(sample_rate: u32, offline: bool) -> Self {
        let state = GraphState {
            sample_rate: sample_rate.max(1),
            frame: 0,
            voices: Vec::new(),
            next_voice: 1,
            master_gain: 1.0,
            master_effects: None,
            mixer: Mixer::new(OUTPUT_CHANNELS),
            events: VecDeque::new(),
        };
        Self { state: Arc::new(Mutex::new(state)), offline }
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn channels(&self) -> usize {
        OUTPUT_CHANNELS
    }

    pub fn current_frame(&self) -> u64 {
        self.lock().frame
    }

    /// Seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        let g = self.lock();
        g.frame as f64 / g.sample_rate as f64
    }

    pub fn master_gain(&self) -> f32 {
        self.lock().master_gain
    }

    pub fn set_master_gain(&self, level: f32) {
        self.lock().master_gain = level;
    }

    pub fn set_master_effects(&self, bands: &[EqParams]) {
        let mut g = self.lock();
        g.master_effects = EqChain::from_spec(g.sample_rate, bands);
    }

    /// Allocates a voice for `buffer`. It makes no sound until `start`.
    pub fn create_voice(&self, owner: OwnerId, buffer: Arc<AudioBuffer>) -> (VoiceId, Completion) {
        let mut g = self.lock();
        let id = g.next_voice;
        g.next_voice += 1;
        let completion = Completion::pending();
        g.voices.push(Voice {
            id,
            owner,
            buffer,
            started: false,
            start_frame: 0,
            pos: 0.0,
            end_pos: 0.0,
            stop_frame: None,
            fade: AudioParam::new(1.0),
            volume: 1.0,
            should_play: 1.0,
            pan: 0.0,
            effects: None,
            completion: completion.clone(),
        });
        g.log(GraphEvent::Setup { owner, voice: id });
        (id, completion)
    }

    pub fn is_active(&self, id: VoiceId) -> bool {
        self.lock().voices.iter().any(|v| v.id == id)
    }

    pub fn active_voices(&self, owner: OwnerId) -> usize {
        self.lock().voices.iter().filter(|v| v.owner == owner).count()
    }

    pub fn set_volume(&self, id: VoiceId, level: f32) {
        if let Some(v) = self.lock().voice_mut(id) {
            v.volume = level;
        }
    }

    pub fn set_should_play(&self, id: VoiceId, should_play: bool) {
        if let Some(v) = self.lock().voice_mut(id) {
            v.should_play = if should_play { 1.0 } else { 0.0 };
        }
    }

    pub fn set_pan(&self, id: VoiceId, pan: f32) {
        if let Some(v) = self.lock().voice_mut(id) {
            v.pan = pan;
        }
    }

    pub fn set_effects(&self, id: VoiceId, bands: &[EqParams]) {
        let mut g = self.lock();
        let sr = g.sample_rate;
        if let Some(v) = g.voice_mut(id) {
            v.effects = EqChain::from_spec(sr, bands);
        }
    }

    /// Runs `f` against the voice's fade gain with the current clock time.
    pub fn automate_fade<R>(&self, id: VoiceId, f: impl FnOnce(&mut AudioParam, f64) -> R) -> Option<R> {
        let mut g = self.lock();
        let now = g.frame as f64 / g.sample_rate as f64;
        g.voice_mut(id).map(|v| f(&mut v.fade, now))
    }

    /// Plays `duration` seconds of the buffer from `offset`, beginning at clock time `when`.
    pub fn start(&self, id: VoiceId, when: f64, offset: f64, duration: f64) {
        let mut g = self.lock();
        let sr = g.sample_rate as f64;
        let now = g.frame;
        if let Some(v) = g.voice_mut(id) {
            let buffer_sr = v.buffer.sample_rate() as f64;
            let len = v.buffer.length() as f64;
            let offset = offset.max(0.0);
            v.started = true;
            v.start_frame = ((when * sr).round().max(0.0) as u64).max(now);
            v.pos = offset * buffer_sr;
            v.end_pos = ((offset + duration.max(0.0)) * buffer_sr).min(len);
        }
    }

    /// Stops the voice at clock time `when`; a time already reached stops it now.
    pub fn stop(&self, id: VoiceId, when: f64) {
        let mut g = self.lock();
        let sr = g.sample_rate as f64;
        let stop_frame = (when * sr).round().max(0.0) as u64;
        if stop_frame <= g.frame {
            g.finish(id, EndReason::Stopped);
        } else if let Some(v) = g.voice_mut(id) {
            v.stop_frame = Some(stop_frame);
        }
    }

    /// Renders interleaved stereo into `out` and advances the clock.
    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out);
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.lock().events.iter().copied().collect()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Ends every voice still in the graph.
    pub fn stop_all(&self) {
        let mut g = self.lock();
        let ids: Vec<VoiceId> = g.voices.iter().map(|v| v.id).collect();
        for id in ids {
            g.finish(id, EndReason::Stopped);
        }
    }
}

/// A context rendered ahead of time into a buffer of fixed length.
pub struct OfflineAudioContext {
    context: AudioContext,
    channels: usize,
    length: usize,
}

impl OfflineAudioContext {
    pub fn new(channels: usize, length: usize, sample_rate: u32) -> Self {
        Self { context: AudioContext::with_mode(sample_rate, true), channels: channels.max(1), length }
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn start_rendering(self) -> AudioBuffer {
        let sample_rate = self.context.sample_rate();
        let mut planar = vec![Vec::with_capacity(self.length); self.channels];
        let mut block = vec![0.0f32; OFFLINE_BLOCK * OUTPUT_CHANNELS];
        let mut remaining = self.length;

        while remaining > 0 {
            let frames = remaining.min(OFFLINE_BLOCK);
            let out = &mut block[..frames * OUTPUT_CHANNELS];
            self.context.render(out);
            for frame in out.chunks_exact(OUTPUT_CHANNELS) {
                match self.channels {
                    1 => planar[0].push((frame[0] + frame[1]) * 0.5),
                    _ => {
                        planar[0].push(frame[0]);
                        planar[1].push(frame[1]);
                        for ch in planar.iter_mut().skip(2) {
                            ch.push(0.0);
                        }
                    }
                }
            }
            remaining -= frames;
        }

        self.context.stop_all();
        AudioBuffer::new(sample_rate, planar)
    }
}
