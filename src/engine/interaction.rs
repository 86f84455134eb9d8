// src/engine/interaction.rs

use super::time::pixels_to_seconds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How pointer input over a track's waveform is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Cursor,
    Select,
    Shift,
    FadeIn,
    FadeOut,
}

impl InteractionMode {
    pub const ALL: [InteractionMode; 5] = [
        InteractionMode::Cursor,
        InteractionMode::Select,
        InteractionMode::Shift,
        InteractionMode::FadeIn,
        InteractionMode::FadeOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionMode::Cursor => "cursor",
            InteractionMode::Select => "select",
            InteractionMode::Shift => "shift",
            InteractionMode::FadeIn => "fadein",
            InteractionMode::FadeOut => "fadeout",
        }
    }

    /// Class of the overlay element while this mode is active.
    pub fn class_name(self) -> String {
        format!("state-{}", self.as_str())
    }

    /// Pointer events the overlay listens to.
    pub fn events(self) -> &'static [PointerKind] {
        match self {
            InteractionMode::Cursor | InteractionMode::FadeIn | InteractionMode::FadeOut => &[PointerKind::Click],
            InteractionMode::Select | InteractionMode::Shift => {
                &[PointerKind::Down, PointerKind::Move, PointerKind::Up, PointerKind::Leave]
            }
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown interaction state {0:?}")]
pub struct UnknownMode(pub String);

impl FromStr for InteractionMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Click,
    Down,
    Move,
    Up,
    Leave,
}

impl PointerKind {
    pub fn event_name(self) -> &'static str {
        match self {
            PointerKind::Click => "click",
            PointerKind::Down => "mousedown",
            PointerKind::Move => "mousemove",
            PointerKind::Up => "mouseup",
            PointerKind::Leave => "mouseleave",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        [PointerKind::Click, PointerKind::Down, PointerKind::Move, PointerKind::Up, PointerKind::Leave]
            .into_iter()
            .find(|k| k.event_name() == name)
    }
}

/// What a pointer gesture asks the playlist to do. Times are in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Intent {
    Select { start: f64, end: f64 },
    Shift { delta: f64 },
    FadeIn { duration: f64 },
    FadeOut { duration: f64 },
}

/// Result of feeding one pointer event to an interaction.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Handled {
    pub intent: Option<Intent>,
    pub prevent_default: bool,
}

impl Handled {
    fn ignored() -> Self {
        Self::default()
    }

    fn consumed(intent: Option<Intent>) -> Self {
        Self { intent, prevent_default: true }
    }
}

/// Live state of one track's interaction mode.
#[derive(Clone, Debug)]
pub struct Interaction {
    mode: InteractionMode,
    samples_per_pixel: usize,
    sample_rate: u32,
    active: bool,
    anchor_x: f64,
}

impl Interaction {
    pub fn new(mode: InteractionMode) -> Self {
        Self { mode, samples_per_pixel: 4096, sample_rate: 44_100, active: false, anchor_x: 0.0 }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn setup(&mut self, samples_per_pixel: usize, sample_rate: u32) {
        self.samples_per_pixel = samples_per_pixel;
        self.sample_rate = sample_rate;
    }

    fn seconds(&self, x: f64) -> f64 {
        pixels_to_seconds(x, self.samples_per_pixel, self.sample_rate)
    }

    fn selection(&self, x: f64) -> Intent {
        Intent::Select {
            start: self.seconds(x.min(self.anchor_x)),
            end: self.seconds(x.max(self.anchor_x)),
        }
    }

    fn shift(&mut self, x: f64) -> Intent {
        let delta = self.seconds(x - self.anchor_x);
        self.anchor_x = x;
        Intent::Shift { delta }
    }

    /// `span` is the track's `(start_time, end_time)` on the timeline.
    pub fn handle(&mut self, kind: PointerKind, x: f64, span: (f64, f64)) -> Handled {
        let (track_start, track_end) = span;
        match (self.mode, kind) {
            (InteractionMode::Cursor, PointerKind::Click) => {
                let t = self.seconds(x);
                Handled::consumed(Some(Intent::Select { start: t, end: t }))
            }
            (InteractionMode::FadeIn, PointerKind::Click) => {
                let t = self.seconds(x);
                let intent = (t > track_start && t < track_end).then(|| Intent::FadeIn { duration: t - track_start });
                Handled { intent, prevent_default: false }
            }
            (InteractionMode::FadeOut, PointerKind::Click) => {
                let t = self.seconds(x);
                let intent = (t > track_start && t < track_end).then(|| Intent::FadeOut { duration: track_end - t });
                Handled { intent, prevent_default: false }
            }
            (InteractionMode::Select, PointerKind::Down) => {
                self.active = true;
                self.anchor_x = x;
                let t = self.seconds(x);
                Handled::consumed(Some(Intent::Select { start: t, end: t }))
            }
            (InteractionMode::Shift, PointerKind::Down) => {
                self.active = true;
                self.anchor_x = x;
                Handled::consumed(None)
            }
            (InteractionMode::Select, PointerKind::Move) if self.active => Handled::consumed(Some(self.selection(x))),
            (InteractionMode::Shift, PointerKind::Move) if self.active => Handled::consumed(Some(self.shift(x))),
            (InteractionMode::Select, PointerKind::Up | PointerKind::Leave) if self.active => {
                self.active = false;
                Handled::consumed(Some(self.selection(x)))
            }
            (InteractionMode::Shift, PointerKind::Up | PointerKind::Leave) if self.active => {
                self.active = false;
                Handled::consumed(Some(self.shift(x)))
            }
            _ => Handled::ignored(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn interaction(mode: InteractionMode) -> Interaction {
        let mut i = Interaction::new(mode);
        i.setup(1000, 1000);
        i
    }

    #[test]
    fn cursor_click_selects_a_point() {
        let mut i = interaction(InteractionMode::Cursor);
        let h = i.handle(PointerKind::Click, 3.0, (0.0, 10.0));
        assert_eq!(h.intent, Some(Intent::Select { start: 3.0, end: 3.0 }));
        assert!(h.prevent_default);
        assert_eq!(i.handle(PointerKind::Down, 3.0, (0.0, 10.0)), Handled::default());
    }

    #[test]
    fn select_drag_orders_the_range() {
        let mut i = interaction(InteractionMode::Select);
        i.handle(PointerKind::Down, 5.0, (0.0, 10.0));
        let h = i.handle(PointerKind::Move, 2.0, (0.0, 10.0));
        assert_eq!(h.intent, Some(Intent::Select { start: 2.0, end: 5.0 }));
        let h = i.handle(PointerKind::Leave, 7.0, (0.0, 10.0));
        assert_eq!(h.intent, Some(Intent::Select { start: 5.0, end: 7.0 }));
        assert!(!i.is_active());
        assert_eq!(i.handle(PointerKind::Move, 1.0, (0.0, 10.0)).intent, None);
    }

    #[test]
    fn shift_reports_deltas() {
        let mut i = interaction(InteractionMode::Shift);
        assert_eq!(i.handle(PointerKind::Down, 1.0, (0.0, 10.0)).intent, None);
        let Some(Intent::Shift { delta }) = i.handle(PointerKind::Move, 1.5, (0.0, 10.0)).intent else {
            panic!("expected a shift");
        };
        assert_relative_eq!(delta, 0.5);
        let Some(Intent::Shift { delta }) = i.handle(PointerKind::Up, 1.0, (0.0, 10.0)).intent else {
            panic!("expected a shift");
        };
        assert_relative_eq!(delta, -0.5);
    }

    #[test]
    fn fades_only_inside_the_track() {
        let mut fade_in = interaction(InteractionMode::FadeIn);
        assert_eq!(fade_in.handle(PointerKind::Click, 4.0, (1.0, 6.0)).intent, Some(Intent::FadeIn { duration: 3.0 }));
        assert_eq!(fade_in.handle(PointerKind::Click, 0.5, (1.0, 6.0)).intent, None);

        let mut fade_out = interaction(InteractionMode::FadeOut);
        assert_eq!(fade_out.handle(PointerKind::Click, 4.0, (1.0, 6.0)).intent, Some(Intent::FadeOut { duration: 2.0 }));
        assert_eq!(fade_out.handle(PointerKind::Click, 6.0, (1.0, 6.0)).intent, None);
    }

    #[test]
    fn names_round_trip_through_strings() {
        assert_eq!("fadein".parse::<InteractionMode>().unwrap(), InteractionMode::FadeIn);
        assert_eq!(InteractionMode::Select.class_name(), "state-select");
        assert!("none".parse::<InteractionMode>().is_err());
        assert_eq!(PointerKind::from_event_name("mouseleave"), Some(PointerKind::Leave));
    }
}
