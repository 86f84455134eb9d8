// src/playlist/mod.rs

//! The timeline coordinator: owns the tracks, runs the transport, and keeps
//! the rendered document in step with its state.

pub mod config;
pub mod events;

pub use config::PlaylistConfig;
pub use events::{DragDirection, EventQueue, PlaylistEvent, RenderOutput, RenderType, Subscriber};

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::buffer::AudioBuffer;
use crate::engine::time::pixels_to_seconds;
use crate::engine::{
    AudioContext, Completion, DurationFormat, FadeShape, InteractionMode, OfflineAudioContext, PlayOptions, Track,
    TrackDetails, TrackError, TrackId,
};
use crate::loader::{AudioSource, LoadError, LoadEvent, resample};
use crate::peaks::{PeakJob, PeakWorker, ThrottlePolicy};
use crate::recorder::{CaptureSource, RecorderError};
use crate::render::hooks::ScrollHook;
use crate::render::{TimeScale, TrackRenderData, render_track};
use crate::session::export::ExportError;
use crate::session::{AnnotationList, AnnotationView, ExportWorker, TimeSelection, TrackInfo};
use crate::vdom::{Document, NodeId, VTree, VdomError, create_element, diff, h, patch, props};
use config::SeekStyle;

const OFFLINE_SAMPLE_RATE: u32 = 44_100;
const SCROLL_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("initial zoom level {0} is not in the zoom levels")]
    ZoomNotInLevels(usize),
    #[error("no track with id {0:?}")]
    UnknownTrack(TrackId),
    #[error(transparent)]
    Track(#[from] TrackError),
    #[error(transparent)]
    Vdom(#[from] VdomError),
    #[error("no capture source attached")]
    NoRecorder,
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Animation {
    /// Playhead follows the audio clock from this position.
    Editor(f64),
    /// Recording clock.
    Timer(f64),
}

/// Capture in progress and the track it lands in.
struct Recording {
    track: TrackId,
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

fn notify(subscribers: &mut [Subscriber], event: &PlaylistEvent) {
    for s in subscribers.iter_mut() {
        s(event);
    }
}

pub struct Playlist {
    ctx: AudioContext,
    config: PlaylistConfig,
    sample_rate: u32,
    samples_per_pixel: usize,
    zoom_index: usize,
    state: InteractionMode,
    fade_type: FadeShape,
    duration_format: DurationFormat,
    master_gain: f32,

    tracks: Vec<Track>,
    next_track: u64,
    soloed: Vec<TrackId>,
    muted: Vec<TrackId>,
    collapsed: Vec<TrackId>,
    active_track: Option<TrackId>,

    time_selection: TimeSelection,
    cursor: f64,
    paused_at: Option<f64>,
    last_seeked: Option<f64>,
    last_play: f64,
    last_draw: f64,
    playback_seconds: f64,
    duration: f64,
    view_duration: f64,
    scroll_left: Rc<Cell<f64>>,
    is_scrolling: bool,
    scroll_settles_at: Option<Instant>,

    animation: Option<Animation>,
    playouts: Vec<Completion>,
    pending_restart: Option<(f64, Option<f64>)>,

    is_rendering: bool,
    export_worker: ExportWorker,
    peak_worker: PeakWorker,
    recorder: Option<Box<dyn CaptureSource>>,
    recording: Option<Recording>,

    annotations: AnnotationList,
    queue: EventQueue,
    subscribers: Vec<Subscriber>,

    document: Document,
    root: NodeId,
    tree: VTree,
    draw_pending: bool,
}

impl Playlist {
    pub fn new(ctx: AudioContext, config: PlaylistConfig) -> Result<Self, PlaylistError> {
        let zoom_index = config.zoom_index().ok_or(PlaylistError::ZoomNotInLevels(config.samples_per_pixel))?;
        let sample_rate = config.sample_rate.unwrap_or_else(|| ctx.sample_rate());
        let queue = EventQueue::new();

        let mut annotations = AnnotationList::new(queue.clone(), config.annotation_list.annotations.clone());
        annotations.editable = config.annotation_list.editable;
        annotations.link_endpoints = config.annotation_list.link_endpoints;
        annotations.is_continuous_play = config.annotation_list.is_continuous_play;

        ctx.set_master_effects(&config.effects);

        let mut document = Document::new();
        let tree = h("div.playlist", props(), ())?;
        let root = create_element(&mut document, &tree)?;

        let mut playlist = Self {
            ctx,
            sample_rate,
            samples_per_pixel: config.samples_per_pixel,
            zoom_index,
            state: config.state,
            fade_type: config.fade_type,
            duration_format: DurationFormat::default(),
            master_gain: 1.0,
            tracks: Vec::new(),
            next_track: 1,
            soloed: Vec::new(),
            muted: Vec::new(),
            collapsed: Vec::new(),
            active_track: None,
            time_selection: TimeSelection::default(),
            cursor: 0.0,
            paused_at: None,
            last_seeked: None,
            last_play: 0.0,
            last_draw: 0.0,
            playback_seconds: 0.0,
            duration: 0.0,
            view_duration: 0.0,
            scroll_left: Rc::new(Cell::new(0.0)),
            is_scrolling: false,
            scroll_settles_at: None,
            animation: None,
            playouts: Vec::new(),
            pending_restart: None,
            is_rendering: false,
            export_worker: ExportWorker::spawn(),
            peak_worker: PeakWorker::spawn(ThrottlePolicy::DropWhileBusy),
            recorder: None,
            recording: None,
            annotations,
            queue,
            subscribers: Vec::new(),
            document,
            root,
            tree,
            draw_pending: false,
            config,
        };
        playlist.draw()?;
        Ok(playlist)
    }

    // ---- accessors ----

    pub fn context(&self) -> &AudioContext {
        &self.ctx
    }

    pub fn config(&self) -> &PlaylistConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples_per_pixel(&self) -> usize {
        self.samples_per_pixel
    }

    pub fn zoom_levels(&self) -> &[usize] {
        &self.config.zoom_levels
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track, PlaylistError> {
        self.tracks.iter_mut().find(|t| t.id() == id).ok_or(PlaylistError::UnknownTrack(id))
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn view_duration(&self) -> f64 {
        self.view_duration
    }

    pub fn playback_seconds(&self) -> f64 {
        self.playback_seconds
    }

    pub fn scroll_left(&self) -> f64 {
        self.scroll_left.get()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn paused_at(&self) -> Option<f64> {
        self.paused_at
    }

    pub fn duration_format(&self) -> DurationFormat {
        self.duration_format
    }

    pub fn fade_type(&self) -> FadeShape {
        self.fade_type
    }

    pub fn is_rendering(&self) -> bool {
        self.is_rendering
    }

    pub fn annotations(&self) -> &AnnotationList {
        &self.annotations
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Handle for pushing inbound events; they run on the next `process_events`.
    pub fn queue(&self) -> EventQueue {
        self.queue.clone()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&PlaylistEvent) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn CaptureSource>) {
        self.recorder = Some(recorder);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.as_ref().is_some_and(|r| r.is_recording())
    }

    pub fn get_info(&self) -> Vec<TrackDetails> {
        self.tracks.iter().map(Track::get_track_details).collect()
    }

    // ---- events ----

    fn emit(&mut self, event: PlaylistEvent) {
        notify(&mut self.subscribers, &event);
    }

    /// Delivers `event` to subscribers, then acts on it.
    pub fn dispatch(&mut self, event: PlaylistEvent) -> Result<(), PlaylistError> {
        log::trace!("dispatch {}", event.name());
        notify(&mut self.subscribers, &event);
        self.handle(event)
    }

    pub fn process_events(&mut self) -> Result<(), PlaylistError> {
        while let Some(event) = self.queue.pop() {
            self.dispatch(event)?;
        }
        Ok(())
    }

    fn handle(&mut self, event: PlaylistEvent) -> Result<(), PlaylistError> {
        use PlaylistEvent as E;
        match event {
            E::Play { start, end } => self.play(start, end)?,
            E::Pause => self.pause(),
            E::Stop => self.stop(),
            E::Rewind => self.rewind()?,
            E::FastForward => self.fast_forward()?,
            E::Record => self.record()?,
            E::Clear => {
                self.clear();
                self.request_draw();
            }
            E::Select { start, end, track } => {
                if self.is_playing() {
                    self.last_seeked = Some(start);
                    self.paused_at = None;
                    self.restart_play_from(start, None)?;
                } else {
                    self.seek(start, end, track)?;
                    self.emit(E::TimeUpdate(start));
                    self.request_draw();
                }
            }
            E::StateChange(state) => {
                self.set_state(state);
                self.request_draw();
            }
            E::Shift { delta, track } => {
                let t = self.track_mut(track)?;
                t.set_start_time(t.start_time() + delta);
                self.adjust_duration();
                self.request_draw();
            }
            E::Trim => self.trim_selection()?,
            E::NewTrack(info) => self.load(vec![info])?,
            E::Solo(id) => {
                self.solo_track(id);
                self.adjust_track_playout();
                self.request_draw();
            }
            E::Mute(id) => {
                self.mute_track(id);
                self.adjust_track_playout();
                self.request_draw();
            }
            E::RemoveTrack(id) => {
                self.remove_track(id);
                self.adjust_track_playout();
                self.request_draw();
            }
            E::ChangeTrackView { track, collapsed } => {
                self.collapse_track(track, collapsed);
                self.request_draw();
            }
            E::VolumeChange { volume, track } => {
                self.track_mut(track)?.set_gain_level(volume / 100.0);
                self.request_draw();
            }
            E::MasterVolumeChange(volume) => {
                self.master_gain = volume / 100.0;
                for t in &self.tracks {
                    t.set_master_gain_level(self.master_gain);
                }
            }
            E::StereoPan { pan, track } => {
                self.track_mut(track)?.set_stereo_pan_value(pan);
                self.request_draw();
            }
            E::FadeIn { duration, track } => {
                let shape = self.fade_type;
                self.track_mut(track)?.set_fade_in(duration, shape)?;
                self.request_draw();
            }
            E::FadeOut { duration, track } => {
                let shape = self.fade_type;
                self.track_mut(track)?.set_fade_out(duration, shape)?;
                self.request_draw();
            }
            E::FadeType(shape) => self.fade_type = shape,
            E::ZoomIn => self.zoom_in()?,
            E::ZoomOut => self.zoom_out()?,
            E::Scroll => {
                self.is_scrolling = true;
                self.scroll_settles_at = Some(Instant::now() + SCROLL_SETTLE);
                self.request_draw();
            }
            E::DurationFormat(format) => {
                self.duration_format = format;
                self.request_draw();
            }
            E::AutomaticScroll(on) => self.config.is_automatic_scroll = on,
            E::ContinuousPlay(on) => self.annotations.is_continuous_play = on,
            E::LinkEndpoints(on) => self.annotations.link_endpoints = on,
            E::StartAudioRendering(kind) => self.start_offline_render(kind)?,
            E::Dragged { delta, index, direction } => {
                self.annotations.drag(delta, index, direction, self.duration);
                self.request_draw();
            }
            E::AnnotationsRequest => match self.annotations.export_json() {
                Ok(json) => self.emit(E::AnnotationsExported(json)),
                Err(e) => log::error!("annotation export failed: {e}"),
            },
            // notifications, nothing to do on the way in
            E::TimeUpdate(_)
            | E::Finished
            | E::AudioRenderingStarting
            | E::AudioRenderingFinished(_)
            | E::AudioRequestStateChange { .. }
            | E::LoadProgress { .. }
            | E::AudioSourcesLoaded
            | E::AudioSourcesRendered
            | E::AudioSourcesError(_)
            | E::AnnotationsExported(_) => {}
        }
        Ok(())
    }

    // ---- loading ----

    fn next_id(&mut self) -> TrackId {
        let id = TrackId(self.next_track);
        self.next_track += 1;
        id
    }

    /// Loads and appends tracks. Load failures abort the batch and are
    /// reported as `AudioSourcesError`, not returned.
    pub fn load(&mut self, infos: Vec<TrackInfo>) -> Result<(), PlaylistError> {
        let rate = self.sample_rate;
        let mut buffers = Vec::with_capacity(infos.len());

        for info in &infos {
            let Some(source) = &info.src else {
                self.emit(PlaylistEvent::AudioSourcesError("track has no source".to_string()));
                return Ok(());
            };
            let label = source.label();
            let subscribers = &mut self.subscribers;
            let loaded = source
                .load(&mut |ev| {
                    let event = match ev {
                        LoadEvent::StateChange(state) => {
                            PlaylistEvent::AudioRequestStateChange { state, src: label.clone() }
                        }
                        LoadEvent::Progress(percent) => PlaylistEvent::LoadProgress { percent, src: label.clone() },
                    };
                    notify(subscribers, &event);
                })
                .and_then(|buffer| {
                    if buffer.sample_rate() == rate {
                        Ok(buffer)
                    } else {
                        resample(&buffer, rate).map(Arc::new)
                    }
                });

            match loaded {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    log::error!("loading {label} failed: {e}");
                    self.emit(PlaylistEvent::AudioSourcesError(e.to_string()));
                    return Ok(());
                }
            }
        }

        self.emit(PlaylistEvent::AudioSourcesLoaded);

        let mut built = Vec::with_capacity(buffers.len());
        for (info, buffer) in infos.into_iter().zip(buffers) {
            match self.build_track(info, buffer) {
                Ok(track) => built.push(track),
                Err(e) => {
                    log::error!("building track failed: {e}");
                    self.emit(PlaylistEvent::AudioSourcesError(e.to_string()));
                    return Ok(());
                }
            }
        }

        log::info!("loaded {} track(s)", built.len());
        self.tracks.extend(built);
        self.adjust_duration();
        self.draw()?;
        self.emit(PlaylistEvent::AudioSourcesRendered);
        Ok(())
    }

    fn build_track(&mut self, info: TrackInfo, buffer: Arc<AudioBuffer>) -> Result<Track, TrackError> {
        let id = self.next_id();
        let mut track = Track::new(id);
        let buffer_duration = buffer.duration();

        track.name = info.name.unwrap_or_else(|| "Untitled".to_string());
        track.src = info.src.as_ref().map(AudioSource::label);
        track.set_buffer(buffer);
        track.set_enabled_states(info.states.unwrap_or_default());
        track.set_cues(info.cuein.unwrap_or(0.0), info.cueout.unwrap_or(buffer_duration))?;
        track.custom_class = info.custom_class;
        track.wave_outline_color = info.wave_outline_color;

        if let Some(fade) = info.fade_in {
            track.set_fade_in(fade.duration, fade.shape)?;
        }
        if let Some(fade) = info.fade_out {
            track.set_fade_out(fade.duration, fade.shape)?;
        }
        if let Some(selected) = info.selected {
            self.active_track = Some(id);
            self.set_time_selection(selected.start, selected.end);
        }

        track.peak_mono = info.peaks.map_or(self.config.mono, |p| p.mono);
        track.set_state(Some(self.state));
        track.set_start_time(info.start.unwrap_or(0.0));
        track.set_playout(&self.ctx);
        track.set_effects(info.effects);
        track.set_gain_level(info.gain.unwrap_or(1.0));
        track.set_stereo_pan_value(info.stereo_pan.unwrap_or(0.0));

        if info.muted {
            self.mute_track(id);
        }
        if info.soloed {
            self.solo_track(id);
        }

        track.calculate_peaks(self.samples_per_pixel, self.sample_rate)?;
        Ok(track)
    }

    // ---- track lists ----

    pub fn mute_track(&mut self, id: TrackId) {
        match self.muted.iter().position(|t| *t == id) {
            Some(i) => {
                self.muted.remove(i);
            }
            None => self.muted.push(id),
        }
    }

    pub fn solo_track(&mut self, id: TrackId) {
        match self.soloed.iter().position(|t| *t == id) {
            Some(i) => {
                self.soloed.remove(i);
            }
            None if self.config.excl_solo => self.soloed = vec![id],
            None => self.soloed.push(id),
        }
    }

    pub fn collapse_track(&mut self, id: TrackId, collapsed: bool) {
        let present = self.collapsed.contains(&id);
        if collapsed && !present {
            self.collapsed.push(id);
        } else if !collapsed {
            self.collapsed.retain(|t| *t != id);
        }
    }

    pub fn remove_track(&mut self, id: TrackId) {
        if let Some(i) = self.tracks.iter().position(|t| t.id() == id) {
            let mut track = self.tracks.remove(i);
            if track.is_playing() {
                track.schedule_stop(0.0);
            }
        }
        self.muted.retain(|t| *t != id);
        self.soloed.retain(|t| *t != id);
        self.collapsed.retain(|t| *t != id);
        if self.active_track == Some(id) {
            self.active_track = None;
        }
    }

    pub fn is_muted(&self, id: TrackId) -> bool {
        self.muted.contains(&id)
    }

    pub fn is_soloed(&self, id: TrackId) -> bool {
        self.soloed.contains(&id)
    }

    /// Soloed tracks win; without any, every unmuted track plays.
    pub fn should_track_play(&self, id: TrackId) -> bool {
        if self.soloed.is_empty() {
            !self.muted.contains(&id)
        } else {
            self.soloed.contains(&id)
        }
    }

    pub fn adjust_track_playout(&self) {
        for t in &self.tracks {
            t.set_should_play(self.should_track_play(t.id()));
        }
    }

    pub fn adjust_duration(&mut self) {
        self.duration = self.tracks.iter().map(Track::end_time).fold(0.0, f64::max);
    }

    pub fn set_active_track(&mut self, id: Option<TrackId>) {
        self.active_track = id;
    }

    pub fn active_track(&self) -> Option<TrackId> {
        self.active_track
    }

    /// Every track is active for a point selection; a segment belongs to the active track only.
    pub fn is_active_track(&self, id: TrackId) -> bool {
        !self.is_segment_selection() || self.active_track == Some(id)
    }

    pub fn time_selection(&self) -> TimeSelection {
        self.time_selection
    }

    pub fn is_segment_selection(&self) -> bool {
        self.time_selection.is_segment()
    }

    /// Also moves the cursor to `start`.
    pub fn set_time_selection(&mut self, start: f64, end: f64) {
        self.time_selection = TimeSelection::new(start, end);
        self.cursor = start;
    }

    pub fn state(&self) -> InteractionMode {
        self.state
    }

    pub fn set_state(&mut self, state: InteractionMode) {
        self.state = state;
        for t in &mut self.tracks {
            t.set_state(Some(state));
        }
    }

    /// Sets the master level, `0..=1`.
    pub fn set_master_gain(&mut self, level: f32) {
        self.master_gain = level;
        for t in &self.tracks {
            t.set_master_gain_level(level);
        }
        self.emit(PlaylistEvent::MasterVolumeChange(level * 100.0));
    }

    fn trim_selection(&mut self) -> Result<(), PlaylistError> {
        let Some(id) = self.active_track else {
            return Ok(());
        };
        let TimeSelection { start, end } = self.time_selection;
        let (spp, rate) = (self.samples_per_pixel, self.sample_rate);
        let track = self.track_mut(id)?;
        track.trim(start, end)?;
        track.calculate_peaks(spp, rate)?;
        self.set_time_selection(0.0, 0.0);
        self.request_draw();
        Ok(())
    }

    // ---- zoom ----

    pub fn set_zoom(&mut self, zoom: usize) -> Result<(), PlaylistError> {
        let index = self.config.zoom_levels.iter().position(|z| *z == zoom).ok_or(PlaylistError::ZoomNotInLevels(zoom))?;
        self.samples_per_pixel = zoom;
        self.zoom_index = index;
        for t in &mut self.tracks {
            t.calculate_peaks(zoom, self.sample_rate)?;
        }
        Ok(())
    }

    fn change_zoom(&mut self, index: usize) -> Result<(), PlaylistError> {
        if let Some(&zoom) = self.config.zoom_levels.get(index) {
            if zoom != self.samples_per_pixel {
                self.set_zoom(zoom)?;
                self.request_draw();
            }
        }
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<(), PlaylistError> {
        self.change_zoom(self.zoom_index.saturating_sub(1))
    }

    pub fn zoom_out(&mut self) -> Result<(), PlaylistError> {
        let last = self.config.zoom_levels.len().saturating_sub(1);
        self.change_zoom((self.zoom_index + 1).min(last))
    }

    // ---- transport ----

    pub fn is_playing(&self) -> bool {
        self.tracks.iter().any(Track::is_playing)
    }

    pub fn get_elapsed_time(&self) -> f64 {
        self.ctx.current_time() - self.last_play
    }

    pub fn get_current_time(&self) -> f64 {
        let position = self.last_seeked.or(self.paused_at).unwrap_or(self.cursor);
        if self.is_playing() { position + self.get_elapsed_time() } else { position }
    }

    fn play_options(&self, id: TrackId) -> PlayOptions {
        PlayOptions { should_play: self.should_track_play(id), master_gain: self.master_gain, is_offline: false }
    }

    /// Starts playback at `start` (or where the transport rests). A segment
    /// selection past `start` bounds the end when none is given.
    pub fn play(&mut self, start: Option<f64>, end: Option<f64>) -> Result<(), PlaylistError> {
        let now = self.ctx.current_time();
        let selected = self.time_selection;
        let start = start.or(self.paused_at).unwrap_or(self.cursor);
        let end = end.or_else(|| (selected.is_segment() && selected.end > start).then_some(selected.end));

        if self.is_playing() {
            return self.restart_play_from(start, end);
        }

        self.ctx.set_master_effects(&self.config.effects);
        let options: Vec<PlayOptions> = self.tracks.iter().map(|t| self.play_options(t.id())).collect();
        let mut playouts = Vec::with_capacity(self.tracks.len());
        for (track, opts) in self.tracks.iter_mut().zip(options) {
            track.set_state(Some(InteractionMode::Cursor));
            playouts.push(track.schedule_play(now, start, end, opts)?);
        }

        log::debug!("play from {start:.3}s");
        self.last_play = now;
        self.playouts = playouts;
        self.start_animation(start);
        Ok(())
    }

    /// Stops every track and plays again once all of their voices have ended.
    fn restart_play_from(&mut self, start: f64, end: Option<f64>) -> Result<(), PlaylistError> {
        self.stop_animation();
        for t in &mut self.tracks {
            t.schedule_stop(0.0);
        }
        self.pending_restart = Some((start, end));
        self.resume_restart()
    }

    fn resume_restart(&mut self) -> Result<(), PlaylistError> {
        if self.pending_restart.is_some() && self.playouts.iter().all(Completion::is_resolved) {
            if let Some((start, end)) = self.pending_restart.take() {
                self.play(Some(start), end)?;
            }
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        self.paused_at = Some(self.get_current_time());
        self.playback_reset();
    }

    pub fn stop(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            if recorder.is_recording() {
                recorder.stop();
                log::info!("recording stopped");
            }
        }
        self.recording = None;
        self.paused_at = None;
        self.playback_seconds = 0.0;
        self.playback_reset();
    }

    fn playback_reset(&mut self) {
        self.last_seeked = None;
        self.pending_restart = None;
        self.stop_animation();
        let state = self.state;
        for t in &mut self.tracks {
            t.schedule_stop(0.0);
            t.set_state(Some(state));
        }
        self.request_draw();
    }

    pub fn seek(&mut self, start: f64, end: f64, track: Option<TrackId>) -> Result<(), PlaylistError> {
        if self.is_playing() {
            self.last_seeked = Some(start);
            self.paused_at = None;
            return self.restart_play_from(start, None);
        }
        self.active_track = track.or_else(|| self.tracks.first().map(Track::id));
        self.paused_at = Some(start);
        self.set_time_selection(start, end);
        if self.config.seek_style == SeekStyle::Fill {
            self.playback_seconds = start;
        }
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<(), PlaylistError> {
        self.stop();
        self.scroll_left.set(0.0);
        self.dispatch(PlaylistEvent::Select { start: 0.0, end: 0.0, track: None })
    }

    pub fn fast_forward(&mut self) -> Result<(), PlaylistError> {
        self.stop();
        let left = if self.view_duration < self.duration { self.duration - self.view_duration } else { 0.0 };
        self.scroll_left.set(left);
        self.dispatch(PlaylistEvent::Select { start: self.duration, end: self.duration, track: None })
    }

    pub fn clear(&mut self) {
        self.stop();
        self.tracks.clear();
        self.soloed.clear();
        self.muted.clear();
        self.collapsed.clear();
        self.playouts.clear();
        self.active_track = None;
        self.cursor = 0.0;
        self.playback_seconds = 0.0;
        self.duration = 0.0;
        self.scroll_left.set(0.0);
        // nothing is playing, so this cannot restart anything
        if let Err(e) = self.seek(0.0, 0.0, None) {
            log::warn!("reset seek failed: {e}");
        }
    }

    /// Starts capturing into a new "Recording" track while every other track plays from zero.
    pub fn record(&mut self) -> Result<(), PlaylistError> {
        let recorder = self.recorder.as_mut().ok_or(PlaylistError::NoRecorder)?;
        recorder.start()?;
        let (channels, sample_rate) = (recorder.channels(), recorder.sample_rate());

        let id = self.next_id();
        let mut track = Track::new(id);
        track.name = "Recording".to_string();
        self.tracks.push(track);
        self.recording = Some(Recording { track: id, samples: Vec::new(), channels, sample_rate });
        log::info!("recording into track {id:?}");

        let now = self.ctx.current_time();
        let options: Vec<PlayOptions> = self.tracks.iter().map(|t| self.play_options(t.id())).collect();
        let mut playouts = Vec::with_capacity(self.tracks.len());
        for (t, opts) in self.tracks.iter_mut().zip(options) {
            t.set_state(None);
            playouts.push(t.schedule_play(now, 0.0, None, opts)?);
        }
        self.playouts = playouts;

        let start = self.paused_at.unwrap_or(self.cursor);
        self.start_timer(start);
        Ok(())
    }

    /// Feeds captured audio into the recording track. A new peak job is only
    /// started once the previous one has landed; chunks arriving meanwhile
    /// are kept and picked up with the next one.
    fn poll_recording(&mut self) -> Result<(), PlaylistError> {
        for result in self.peak_worker.poll() {
            let peaks = result.peaks.map_err(TrackError::from)?;
            if let Some(track) = self.tracks.iter_mut().find(|t| t.id().0 == result.key) {
                track.set_peaks(peaks);
                self.draw_pending = true;
            }
        }

        let (Some(recorder), Some(recording)) = (self.recorder.as_mut(), self.recording.as_mut()) else {
            return Ok(());
        };
        let chunk = recorder.take_chunk();
        if chunk.is_empty() {
            return Ok(());
        }
        recording.samples.extend_from_slice(&chunk);

        let key = recording.track.0;
        if self.peak_worker.is_busy(key) {
            return Ok(());
        }

        let mut buffer = AudioBuffer::from_interleaved(&recording.samples, recording.channels, recording.sample_rate);
        if buffer.sample_rate() != self.sample_rate {
            buffer = resample(&buffer, self.sample_rate)?;
        }
        let samples = buffer.channel(0).to_vec();
        let duration = buffer.duration();
        let id = recording.track;

        if let Some(track) = self.tracks.iter_mut().find(|t| t.id() == id) {
            track.set_buffer(Arc::new(buffer));
            track.set_playout(&self.ctx);
            track.set_cues(0.0, duration)?;
        }
        self.adjust_duration();
        self.peak_worker.submit(PeakJob::new(key, samples).with_resolution(self.samples_per_pixel));
        Ok(())
    }

    // ---- offline render ----

    /// Renders the mix ahead of time at 44.1 kHz. Ignored while a render is running.
    pub fn start_offline_render(&mut self, kind: RenderType) -> Result<(), PlaylistError> {
        if self.is_rendering {
            return Ok(());
        }
        self.is_rendering = true;

        let length = (OFFLINE_SAMPLE_RATE as f64 * self.duration).ceil() as usize;
        let offline = OfflineAudioContext::new(2, length, OFFLINE_SAMPLE_RATE);
        offline.context().set_master_effects(&self.config.effects);
        self.emit(PlaylistEvent::AudioRenderingStarting);
        log::info!("offline render of {:.3}s started", self.duration);

        let should_play: Vec<bool> = self.tracks.iter().map(|t| self.should_track_play(t.id())).collect();
        for (track, should_play) in self.tracks.iter_mut().zip(should_play) {
            track.set_offline_playout(offline.context());
            let opts = PlayOptions { should_play, master_gain: 1.0, is_offline: true };
            if let Err(e) = track.schedule_play(0.0, 0.0, None, opts) {
                self.is_rendering = false;
                return Err(e.into());
            }
        }

        let rendered = offline.start_rendering();
        match kind {
            RenderType::Buffer => {
                self.is_rendering = false;
                log::info!("offline render finished");
                self.emit(PlaylistEvent::AudioRenderingFinished(RenderOutput::Buffer(Arc::new(rendered))));
            }
            RenderType::Wav => {
                let mut channels = rendered.into_channels().into_iter();
                let left = channels.next().unwrap_or_default();
                let right = channels.next().unwrap_or_else(|| left.clone());
                let sent = self
                    .export_worker
                    .init(OFFLINE_SAMPLE_RATE)
                    .and_then(|()| self.export_worker.record(left, right))
                    .and_then(|()| self.export_worker.export_wav());
                if let Err(e) = sent {
                    self.is_rendering = false;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn poll_export(&mut self) -> Result<(), PlaylistError> {
        if !self.is_rendering {
            return Ok(());
        }
        let Some(result) = self.export_worker.try_result() else {
            return Ok(());
        };
        self.is_rendering = false;
        let wav = result?;
        log::info!("wav export finished, {} bytes", wav.len());
        self.emit(PlaylistEvent::AudioRenderingFinished(RenderOutput::Wav(wav)));
        self.export_worker.clear()?;
        Ok(())
    }

    // ---- animation ----

    fn start_animation(&mut self, start: f64) {
        self.last_draw = self.ctx.current_time();
        self.animation = Some(Animation::Editor(start));
    }

    fn start_timer(&mut self, start: f64) {
        self.last_draw = self.ctx.current_time();
        self.animation = Some(Animation::Timer(start));
    }

    fn stop_animation(&mut self) {
        self.animation = None;
    }

    fn update_editor(&mut self, cursor: f64) {
        let now = self.ctx.current_time();
        let elapsed = now - self.last_draw;

        if self.is_playing() {
            let playback = cursor + elapsed;
            self.emit(PlaylistEvent::TimeUpdate(playback));
            self.animation = Some(Animation::Editor(playback));
            self.playback_seconds = playback;
            self.request_draw();
            self.last_draw = now;
            return;
        }

        let selection = self.time_selection;
        let end = if selection.is_segment() { selection.end } else { self.duration };
        if cursor + elapsed >= end {
            self.emit(PlaylistEvent::Finished);
        }
        self.stop_animation();

        self.paused_at = None;
        self.last_seeked = None;
        self.set_state(self.state);
        self.playback_seconds = 0.0;
        self.request_draw();
    }

    fn update_timer(&mut self, cursor: f64) {
        let now = self.ctx.current_time();
        let playback = cursor + (now - self.last_draw);
        self.emit(PlaylistEvent::TimeUpdate(playback));
        self.animation = Some(Animation::Timer(playback));
        self.playback_seconds = playback;
        self.last_draw = now;
    }

    /// One turn of the host loop: events, worker results, the playhead and a
    /// redraw when something changed.
    pub fn tick(&mut self) -> Result<(), PlaylistError> {
        self.process_events()?;
        for t in &mut self.tracks {
            t.settle_playouts();
        }
        self.poll_recording()?;
        self.poll_export()?;
        self.resume_restart()?;

        if self.scroll_settles_at.is_some_and(|t| Instant::now() >= t) {
            self.is_scrolling = false;
            self.scroll_settles_at = None;
        }

        match self.animation {
            Some(Animation::Editor(cursor)) => self.update_editor(cursor),
            Some(Animation::Timer(cursor)) => self.update_timer(cursor),
            None => {}
        }

        if self.draw_pending {
            self.draw()?;
        }
        Ok(())
    }

    // ---- drawing ----

    pub fn request_draw(&mut self) {
        self.draw_pending = true;
    }

    pub fn draw(&mut self) -> Result<(), PlaylistError> {
        self.draw_pending = false;
        let tree = self.render()?;
        let patches = diff(&self.tree, &tree)?;
        self.root = patch(&mut self.document, self.root, &patches)?;
        self.tree = tree;
        self.view_duration = pixels_to_seconds(
            self.config.container_width - self.config.controls.visible_width(),
            self.samples_per_pixel,
            self.sample_rate,
        );
        Ok(())
    }

    pub fn render(&self) -> Result<VTree, VdomError> {
        let mut children = Vec::with_capacity(3);
        if self.config.timescale {
            let scale = TimeScale {
                duration: self.duration,
                offset: self.scroll_left.get(),
                samples_per_pixel: self.samples_per_pixel,
                sample_rate: self.sample_rate,
                margin_left: self.config.controls.visible_width(),
                time_color: self.config.colors.time_color.clone(),
            };
            children.push(scale.render()?);
        }
        children.push(self.render_track_section()?);
        if !self.annotations.is_empty() {
            let view = AnnotationView {
                samples_per_pixel: self.samples_per_pixel,
                sample_rate: self.sample_rate,
                scroll_left: self.scroll_left.get(),
                margin_left: self.config.controls.visible_width(),
                is_playing: self.is_playing(),
                playback_seconds: self.playback_seconds,
                duration_format: self.duration_format,
            };
            children.push(self.annotations.render(&view)?);
        }
        h("div.playlist", props().attr("style", "overflow: hidden; position: relative;"), children)
    }

    fn render_track_section(&self) -> Result<VTree, VdomError> {
        let config = &self.config;
        let tracks = self
            .tracks
            .iter()
            .map(|track| {
                let id = track.id();
                let collapsed = self.collapsed.contains(&id);
                let data = TrackRenderData {
                    height: if collapsed { config.collapsed_wave_height } else { config.wave_height },
                    samples_per_pixel: self.samples_per_pixel,
                    sample_rate: self.sample_rate,
                    controls: config.controls,
                    is_active: self.is_active_track(id),
                    time_selection: self.time_selection,
                    playlist_length: self.duration,
                    playback_seconds: self.playback_seconds,
                    colors: &config.colors,
                    bar_width: config.bar_width,
                    bar_gap: config.bar_gap,
                    should_play: self.should_track_play(id),
                    soloed: self.soloed.contains(&id),
                    muted: self.muted.contains(&id),
                    collapsed,
                };
                render_track(track, &data, &self.queue)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let hook = ScrollHook {
            scroll_left: self.scroll_left.clone(),
            is_scrolling: self.is_scrolling,
            is_automatic_scroll: config.is_automatic_scroll,
            is_playing: self.is_playing(),
            playback_seconds: self.playback_seconds,
            selection_start: self.time_selection.start,
            duration: self.duration,
            container_width: config.container_width,
            controls_width: config.controls.visible_width(),
            samples_per_pixel: self.samples_per_pixel,
            sample_rate: self.sample_rate,
        };
        let (scroll_left, queue) = (self.scroll_left.clone(), self.queue.clone());
        let (spp, rate) = (self.samples_per_pixel, self.sample_rate);

        h(
            "div.playlist-tracks",
            props()
                .attr("style", "overflow: auto;")
                .on("scroll", move |e| {
                    scroll_left.set(pixels_to_seconds(e.offset_x, spp, rate));
                    queue.push(PlaylistEvent::Scroll);
                })
                .hook("hook", Rc::new(hook)),
            tracks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FadeInfo, GraphEvent};
    use crate::session::AeneasInput;
    use crate::vdom::DomEvent;
    use approx::assert_relative_eq;
    use std::cell::RefCell;

    const RATE: u32 = 1000;

    fn tone(seconds: f64) -> Arc<AudioBuffer> {
        let frames = (seconds * RATE as f64) as usize;
        Arc::new(AudioBuffer::new(RATE, vec![vec![0.5; frames]]))
    }

    fn entry(name: &str, seconds: f64) -> TrackInfo {
        TrackInfo {
            src: Some(AudioSource::Buffer(tone(seconds))),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn playlist() -> (AudioContext, Playlist) {
        let ctx = AudioContext::new(RATE);
        let p = Playlist::new(ctx.clone(), PlaylistConfig::default()).unwrap();
        (ctx, p)
    }

    fn advance(ctx: &AudioContext, seconds: f64) {
        let mut out = vec![0.0; 2 * (seconds * RATE as f64) as usize];
        ctx.render(&mut out);
    }

    fn record_names(p: &mut Playlist) -> Rc<RefCell<Vec<&'static str>>> {
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = names.clone();
        p.subscribe(move |e| sink.borrow_mut().push(e.name()));
        names
    }

    #[test]
    fn initial_zoom_must_be_a_level() {
        let config = PlaylistConfig { samples_per_pixel: 3000, ..Default::default() };
        let err = Playlist::new(AudioContext::new(RATE), config).err();
        assert!(matches!(err, Some(PlaylistError::ZoomNotInLevels(3000))));
    }

    #[test]
    fn load_builds_tracks_and_reports_progress() {
        let (_, mut p) = playlist();
        let names = record_names(&mut p);
        let mut second = entry("b", 2.0);
        second.start = Some(3.0);
        second.cuein = Some(0.5);
        second.fade_in = Some(FadeInfo { shape: FadeShape::Linear, duration: 0.5 });
        second.muted = true;

        p.load(vec![entry("a", 4.0), second]).unwrap();

        assert_eq!(p.tracks().len(), 2);
        assert_relative_eq!(p.duration(), 4.5);
        let b = &p.tracks()[1];
        assert_eq!(b.name, "b");
        assert_relative_eq!(b.duration(), 1.5);
        assert!(b.fade_in().is_some());
        assert!(b.peaks().length > 0);
        assert!(!p.should_track_play(b.id()));

        let names = names.borrow();
        let loaded = names.iter().position(|n| *n == "audiosourcesloaded").unwrap();
        let rendered = names.iter().position(|n| *n == "audiosourcesrendered").unwrap();
        assert!(loaded < rendered);
        assert_eq!(p.document().find_by_class(p.root(), "channel-wrapper").len(), 2);
    }

    #[test]
    fn bad_entry_is_reported_not_returned() {
        let (_, mut p) = playlist();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        p.subscribe(move |e| {
            if let PlaylistEvent::AudioSourcesError(msg) = e {
                sink.borrow_mut().push(msg.clone());
            }
        });
        let mut bad = entry("a", 1.0);
        bad.fade_out = Some(FadeInfo { shape: FadeShape::Linear, duration: 3.0 });

        assert!(p.load(vec![bad]).is_ok());
        assert!(p.tracks().is_empty());
        assert!(errors.borrow()[0].contains("Invalid Fade Out"));
    }

    #[test]
    fn solo_beats_mute_and_exclusive_solo_replaces() {
        let ctx = AudioContext::new(RATE);
        let config = PlaylistConfig { excl_solo: true, ..Default::default() };
        let mut p = Playlist::new(ctx, config).unwrap();
        p.load(vec![entry("a", 1.0), entry("b", 1.0)]).unwrap();
        let (a, b) = (p.tracks()[0].id(), p.tracks()[1].id());

        p.mute_track(a);
        assert!(!p.should_track_play(a) && p.should_track_play(b));
        p.solo_track(a);
        assert!(p.should_track_play(a) && !p.should_track_play(b));
        p.solo_track(b);
        assert!(!p.is_soloed(a) && p.is_soloed(b));
        p.solo_track(b);
        assert!(!p.should_track_play(a) && p.should_track_play(b));
    }

    #[test]
    fn pause_resumes_where_it_stopped() {
        let (ctx, mut p) = playlist();
        p.load(vec![entry("a", 5.0)]).unwrap();

        p.play(None, None).unwrap();
        assert!(p.is_playing());
        advance(&ctx, 1.0);
        assert_relative_eq!(p.get_current_time(), 1.0);

        p.pause();
        assert!(!p.is_playing());
        assert_eq!(p.paused_at(), Some(1.0));

        p.play(None, None).unwrap();
        advance(&ctx, 1.0);
        assert_relative_eq!(p.get_current_time(), 2.0);

        p.stop();
        assert_eq!(p.paused_at(), None);
        assert_eq!(p.playback_seconds(), 0.0);
    }

    #[test]
    fn stopped_transport_reports_the_cursor() {
        let (ctx, mut p) = playlist();
        p.load(vec![entry("a", 5.0)]).unwrap();

        p.play(None, None).unwrap();
        advance(&ctx, 2.0);
        p.stop();
        advance(&ctx, 2.0);

        assert!(!p.is_playing());
        assert_relative_eq!(p.get_current_time(), p.cursor());
        assert_relative_eq!(p.get_current_time(), 0.0);
    }

    #[test]
    fn touching_fades_of_mixed_shapes_still_play() {
        let (ctx, mut p) = playlist();
        p.load(vec![TrackInfo {
            fade_in: Some(FadeInfo { shape: FadeShape::Linear, duration: 2.0 }),
            fade_out: Some(FadeInfo { shape: FadeShape::Logarithmic, duration: 2.0 }),
            ..entry("a", 4.0)
        }])
        .unwrap();

        p.play(None, None).unwrap();
        assert!(p.is_playing());
        advance(&ctx, 4.5);
        p.tick().unwrap();
        assert!(!p.is_playing());
    }

    #[test]
    fn replaying_tears_down_before_setting_up() {
        let (ctx, mut p) = playlist();
        p.load(vec![entry("a", 5.0)]).unwrap();
        let owner = p.tracks()[0].id().0;

        p.play(Some(0.0), None).unwrap();
        p.play(Some(3.0), None).unwrap();

        assert_eq!(ctx.active_voices(owner), 1);
        let events = ctx.events();
        let setups: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, GraphEvent::Setup { .. }))
            .map(|(i, _)| i)
            .collect();
        let teardown = events.iter().position(|e| matches!(e, GraphEvent::Teardown { .. })).unwrap();
        assert_eq!(setups.len(), 2);
        assert!(setups[0] < teardown && teardown < setups[1]);
    }

    #[test]
    fn select_while_stopped_moves_the_cursor() {
        let (_, mut p) = playlist();
        p.set_zoom(512).unwrap();
        p.load(vec![entry("a", 5.0)]).unwrap();
        let names = record_names(&mut p);
        let id = p.tracks()[0].id();

        p.queue().push(PlaylistEvent::Select { start: 1.0, end: 2.5, track: Some(id) });
        p.tick().unwrap();

        assert_eq!(p.time_selection(), TimeSelection::new(1.0, 2.5));
        assert_eq!(p.cursor(), 1.0);
        assert_eq!(p.paused_at(), Some(1.0));
        assert_eq!(p.active_track(), Some(id));
        assert_eq!(*names.borrow(), vec!["select", "timeupdate"]);
        assert_eq!(p.document().find_by_class(p.root(), "segment").len(), 1);
    }

    #[test]
    fn segment_selection_bounds_playback() {
        let (ctx, mut p) = playlist();
        p.load(vec![entry("a", 5.0)]).unwrap();
        let names = record_names(&mut p);
        p.seek(1.0, 2.0, None).unwrap();

        p.play(None, None).unwrap();
        p.tick().unwrap();
        advance(&ctx, 0.5);
        p.tick().unwrap();
        assert_relative_eq!(p.playback_seconds(), 1.5);

        advance(&ctx, 1.0);
        p.tick().unwrap();
        assert!(!p.is_playing());
        assert!(names.borrow().contains(&"finished"));
        assert_eq!(p.playback_seconds(), 0.0);
        assert_eq!(p.paused_at(), None);
    }

    #[test]
    fn overlay_click_selects_through_the_queue() {
        let (_, mut p) = playlist();
        p.set_zoom(512).unwrap();
        p.load(vec![entry("a", 5.0)]).unwrap();
        let overlay = p.document().find_by_class(p.root(), "playlist-overlay")[0];

        // 512 samples per pixel at 1 kHz
        p.document().dispatch(&DomEvent::new("click", overlay).at(2.0));
        p.tick().unwrap();
        assert_relative_eq!(p.cursor(), 1.024);
    }

    #[test]
    fn shift_and_trim_edit_the_active_track() {
        let (_, mut p) = playlist();
        p.load(vec![entry("a", 4.0)]).unwrap();
        let id = p.tracks()[0].id();

        p.dispatch(PlaylistEvent::Shift { delta: 1.0, track: id }).unwrap();
        assert_relative_eq!(p.duration(), 5.0);

        p.seek(2.0, 3.0, Some(id)).unwrap();
        p.dispatch(PlaylistEvent::Trim).unwrap();
        let t = p.track(id).unwrap();
        assert_relative_eq!(t.start_time(), 2.0);
        assert_relative_eq!(t.duration(), 1.0);
        assert_relative_eq!(t.cue_in(), 1.0);
        assert_eq!(p.time_selection(), TimeSelection::new(0.0, 0.0));

        assert!(matches!(
            p.dispatch(PlaylistEvent::Shift { delta: 1.0, track: TrackId(99) }),
            Err(PlaylistError::UnknownTrack(TrackId(99)))
        ));
    }

    #[test]
    fn zoom_steps_through_levels() {
        let (_, mut p) = playlist();
        p.load(vec![entry("a", 10.0)]).unwrap();
        let coarse = p.tracks()[0].peaks().length;

        p.zoom_out().unwrap();
        assert_eq!(p.samples_per_pixel(), 4096);
        p.zoom_in().unwrap();
        assert_eq!(p.samples_per_pixel(), 2048);
        assert!(p.tracks()[0].peaks().length > coarse);
        assert!(matches!(p.set_zoom(100), Err(PlaylistError::ZoomNotInLevels(100))));
    }

    #[test]
    fn rewind_and_fast_forward_select_the_ends() {
        let (_, mut p) = playlist();
        p.load(vec![entry("a", 3.0)]).unwrap();

        p.fast_forward().unwrap();
        assert_eq!(p.time_selection(), TimeSelection::new(3.0, 3.0));
        p.rewind().unwrap();
        assert_eq!(p.time_selection(), TimeSelection::new(0.0, 0.0));
        assert_eq!(p.scroll_left(), 0.0);
    }

    #[test]
    fn master_volume_reaches_the_graph() {
        let (ctx, mut p) = playlist();
        p.load(vec![entry("a", 1.0)]).unwrap();
        p.play(None, None).unwrap();
        p.dispatch(PlaylistEvent::MasterVolumeChange(50.0)).unwrap();
        assert_relative_eq!(p.master_gain(), 0.5);
        assert_relative_eq!(ctx.master_gain(), 0.5);
    }

    #[test]
    fn offline_buffer_render_covers_the_mix() {
        let (_, mut p) = playlist();
        p.load(vec![entry("a", 0.5)]).unwrap();
        let out = Rc::new(RefCell::new(None));
        let sink = out.clone();
        p.subscribe(move |e| {
            if let PlaylistEvent::AudioRenderingFinished(RenderOutput::Buffer(b)) = e {
                *sink.borrow_mut() = Some(b.clone());
            }
        });

        p.dispatch(PlaylistEvent::StartAudioRendering(RenderType::Buffer)).unwrap();
        let buffer = out.borrow().clone().unwrap();
        assert_eq!(buffer.length(), 22_050);
        assert_eq!(buffer.number_of_channels(), 2);
        assert!(buffer.channel(0)[11_000].abs() > 0.1);
        assert!(!p.is_rendering());
    }

    #[test]
    fn wav_render_arrives_on_a_later_tick() {
        let (_, mut p) = playlist();
        p.load(vec![entry("a", 0.5)]).unwrap();
        let out = Rc::new(RefCell::new(None));
        let sink = out.clone();
        p.subscribe(move |e| {
            if let PlaylistEvent::AudioRenderingFinished(RenderOutput::Wav(bytes)) = e {
                *sink.borrow_mut() = Some(bytes.clone());
            }
        });

        p.start_offline_render(RenderType::Wav).unwrap();
        assert!(p.is_rendering());
        for _ in 0..200 {
            p.tick().unwrap();
            if out.borrow().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let bytes = out.borrow().clone().unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(bytes.len(), 44 + 22_050 * 2 * 2);
        assert!(!p.is_rendering());
    }

    struct FakeMic {
        recording: bool,
        pending: Rc<RefCell<Vec<f32>>>,
    }

    impl CaptureSource for FakeMic {
        fn start(&mut self) -> Result<(), RecorderError> {
            self.recording = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.recording = false;
        }

        fn is_recording(&self) -> bool {
            self.recording
        }

        fn channels(&self) -> usize {
            1
        }

        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn take_chunk(&mut self) -> Vec<f32> {
            std::mem::take(&mut *self.pending.borrow_mut())
        }
    }

    #[test]
    fn recording_grows_a_track_with_peaks() {
        let (_, mut p) = playlist();
        assert!(matches!(p.record(), Err(PlaylistError::NoRecorder)));

        let pending = Rc::new(RefCell::new(Vec::new()));
        p.set_recorder(Box::new(FakeMic { recording: false, pending: pending.clone() }));
        p.record().unwrap();
        assert!(p.is_recording());
        assert_eq!(p.tracks().last().unwrap().name, "Recording");

        pending.borrow_mut().extend(std::iter::repeat_n(0.25, 2000));
        p.tick().unwrap();
        let id = p.tracks().last().unwrap().id();
        assert_relative_eq!(p.track(id).unwrap().duration(), 2.0);
        assert_relative_eq!(p.duration(), 2.0);

        for _ in 0..200 {
            p.tick().unwrap();
            if p.track(id).unwrap().peaks().length > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(p.track(id).unwrap().peaks().length > 0);

        p.stop();
        assert!(!p.is_recording());
    }

    #[test]
    fn annotations_export_on_request() {
        let ctx = AudioContext::new(RATE);
        let mut config = PlaylistConfig::default();
        config.annotation_list.annotations = vec![AeneasInput {
            id: Some(serde_json::json!("f1")),
            begin: Some(serde_json::json!("0.5")),
            end: Some(serde_json::json!(1.25)),
            lines: Some(vec!["hello".into()]),
            language: None,
        }];
        let mut p = Playlist::new(ctx, config).unwrap();
        let json = Rc::new(RefCell::new(String::new()));
        let sink = json.clone();
        p.subscribe(move |e| {
            if let PlaylistEvent::AnnotationsExported(s) = e {
                *sink.borrow_mut() = s.clone();
            }
        });

        p.dispatch(PlaylistEvent::AnnotationsRequest).unwrap();
        assert!(json.borrow().contains(r#""begin":"0.500""#));
        assert!(json.borrow().contains(r#""end":"1.250""#));
    }
}
