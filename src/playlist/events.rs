// src/playlist/events.rs

//! Everything that flows over the playlist's event bus.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::engine::{DurationFormat, FadeShape, InteractionMode, TrackId};
use crate::loader::LoadState;
use crate::session::TrackInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderType {
    Buffer,
    Wav,
}

#[derive(Clone, Debug)]
pub enum RenderOutput {
    Buffer(Arc<AudioBuffer>),
    /// A complete WAV file.
    Wav(Vec<u8>),
}

/// Which edge of an annotation a drag moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragDirection {
    Left,
    Right,
}

/// Inbound requests and outbound notifications. Times are in seconds.
#[derive(Clone, Debug)]
pub enum PlaylistEvent {
    Play { start: Option<f64>, end: Option<f64> },
    Pause,
    Stop,
    Rewind,
    FastForward,
    Record,
    Clear,
    Select { start: f64, end: f64, track: Option<TrackId> },
    TimeUpdate(f64),
    Finished,

    StateChange(InteractionMode),
    Shift { delta: f64, track: TrackId },
    Trim,
    NewTrack(TrackInfo),
    Solo(TrackId),
    Mute(TrackId),
    RemoveTrack(TrackId),
    ChangeTrackView { track: TrackId, collapsed: bool },

    /// Track volume in percent.
    VolumeChange { volume: f32, track: TrackId },
    /// Master volume in percent.
    MasterVolumeChange(f32),
    /// Pan in `[-1, 1]`.
    StereoPan { pan: f32, track: TrackId },
    FadeIn { duration: f64, track: TrackId },
    FadeOut { duration: f64, track: TrackId },
    FadeType(FadeShape),

    ZoomIn,
    ZoomOut,
    Scroll,
    DurationFormat(DurationFormat),
    AutomaticScroll(bool),
    ContinuousPlay(bool),
    LinkEndpoints(bool),

    StartAudioRendering(RenderType),
    AudioRenderingStarting,
    AudioRenderingFinished(RenderOutput),

    AudioRequestStateChange { state: LoadState, src: String },
    LoadProgress { percent: f64, src: String },
    AudioSourcesLoaded,
    AudioSourcesRendered,
    AudioSourcesError(String),

    Dragged { delta: f64, index: usize, direction: DragDirection },
    AnnotationsRequest,
    /// The annotations as aeneas JSON.
    AnnotationsExported(String),
}

impl PlaylistEvent {
    /// The name listeners know this event by.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Rewind => "rewind",
            Self::FastForward => "fastforward",
            Self::Record => "record",
            Self::Clear => "clear",
            Self::Select { .. } => "select",
            Self::TimeUpdate(_) => "timeupdate",
            Self::Finished => "finished",
            Self::StateChange(_) => "statechange",
            Self::Shift { .. } => "shift",
            Self::Trim => "trim",
            Self::NewTrack(_) => "newtrack",
            Self::Solo(_) => "solo",
            Self::Mute(_) => "mute",
            Self::RemoveTrack(_) => "removeTrack",
            Self::ChangeTrackView { .. } => "changeTrackView",
            Self::VolumeChange { .. } => "volumechange",
            Self::MasterVolumeChange(_) => "mastervolumechange",
            Self::StereoPan { .. } => "stereopan",
            Self::FadeIn { .. } => "fadein",
            Self::FadeOut { .. } => "fadeout",
            Self::FadeType(_) => "fadetype",
            Self::ZoomIn => "zoomin",
            Self::ZoomOut => "zoomout",
            Self::Scroll => "scroll",
            Self::DurationFormat(_) => "durationformat",
            Self::AutomaticScroll(_) => "automaticscroll",
            Self::ContinuousPlay(_) => "continuousplay",
            Self::LinkEndpoints(_) => "linkendpoints",
            Self::StartAudioRendering(_) => "startaudiorendering",
            Self::AudioRenderingStarting => "audiorenderingstarting",
            Self::AudioRenderingFinished(_) => "audiorenderingfinished",
            Self::AudioRequestStateChange { .. } => "audiorequeststatechange",
            Self::LoadProgress { .. } => "loadprogress",
            Self::AudioSourcesLoaded => "audiosourcesloaded",
            Self::AudioSourcesRendered => "audiosourcesrendered",
            Self::AudioSourcesError(_) => "audiosourceserror",
            Self::Dragged { .. } => "dragged",
            Self::AnnotationsRequest => "annotationsrequest",
            Self::AnnotationsExported(_) => "annotationsexported",
        }
    }
}

/// Shared inbox. Render handlers hold clones and push into it; the
/// playlist drains it in `process_events`.
#[derive(Clone, Default)]
pub struct EventQueue {
    inner: Rc<RefCell<VecDeque<PlaylistEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: PlaylistEvent) {
        self.inner.borrow_mut().push_back(event);
    }

    pub fn pop(&self) -> Option<PlaylistEvent> {
        self.inner.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

pub type Subscriber = Box<dyn FnMut(&PlaylistEvent)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_queue() {
        let queue = EventQueue::new();
        let handle = queue.clone();
        handle.push(PlaylistEvent::ZoomIn);
        handle.push(PlaylistEvent::Mute(TrackId(2)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|e| e.name()), Some("zoomin"));
        assert!(matches!(queue.pop(), Some(PlaylistEvent::Mute(TrackId(2)))));
        assert!(handle.is_empty());
    }

    #[test]
    fn names_keep_their_casing() {
        assert_eq!(PlaylistEvent::RemoveTrack(TrackId(0)).name(), "removeTrack");
        assert_eq!(
            PlaylistEvent::ChangeTrackView { track: TrackId(0), collapsed: true }.name(),
            "changeTrackView"
        );
        assert_eq!(PlaylistEvent::StartAudioRendering(RenderType::Wav).name(), "startaudiorendering");
    }
}
