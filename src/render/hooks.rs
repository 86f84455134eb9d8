// src/render/hooks.rs

//! Hooks that paint canvases and poke live properties after a patch.

use std::any::Any;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::engine::fades::{FadeShape, FadeType, curve};
use crate::engine::time::{pixels_to_seconds, seconds_to_pixels};
use crate::peaks::PeakSet;
use crate::vdom::{Document, Hook, NodeId, PropValue};

fn previous_hook<'a, T: 'static>(previous: Option<&'a PropValue>) -> Option<&'a T> {
    match previous {
        Some(PropValue::Hook(h)) => h.as_any().downcast_ref::<T>(),
        _ => None,
    }
}

/// Draws one tile of a channel's peaks.
pub struct CanvasHook {
    pub peaks: Arc<PeakSet>,
    pub channel: usize,
    /// First pixel of the tile within the channel.
    pub offset: usize,
    pub color: String,
    pub height: usize,
    pub bar_width: usize,
    pub bar_gap: usize,
}

impl CanvasHook {
    fn is_current(&self, prev: &CanvasHook) -> bool {
        Arc::ptr_eq(&prev.peaks, &self.peaks) && prev.height == self.height
    }
}

fn draw_frame(canvas: &mut crate::vdom::Canvas, h2: f64, x: f64, min_peak: f64, max_peak: f64, width: f64, gap: f64) {
    let min = (min_peak * h2).abs();
    let max = (max_peak * h2).abs();

    canvas.fill_rect(x, 0.0, width, h2 - max);
    canvas.fill_rect(x, h2 + min, width, h2 - min);
    if gap != 0.0 {
        canvas.fill_rect(x + width, 0.0, gap, h2 * 2.0);
    }
}

impl Hook for CanvasHook {
    fn hook(&self, doc: &mut Document, node: NodeId, _prop: &str, previous: Option<&PropValue>) {
        if previous_hook::<CanvasHook>(previous).is_some_and(|p| self.is_current(p)) {
            return;
        }
        let Some(canvas) = doc.canvas_mut(node) else {
            return;
        };

        let len = canvas.width;
        let h2 = canvas.height as f64 / 2.0;
        let max_value = self.peaks.bits.max_magnitude();
        let step = (self.bar_width + self.bar_gap).max(1);
        let channel = self.peaks.data.get(self.channel).map(Vec::as_slice).unwrap_or(&[]);

        canvas.clear();
        canvas.fill_style = self.color.clone();
        canvas.draws += 1;

        for pixel in (0..len).step_by(step) {
            let at = (pixel + self.offset) * 2;
            let (Some(&min), Some(&max)) = (channel.get(at), channel.get(at + 1)) else {
                break;
            };
            draw_frame(
                canvas,
                h2,
                pixel as f64,
                min as f64 / max_value,
                max as f64 / max_value,
                self.bar_width as f64,
                self.bar_gap as f64,
            );
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Draws a fade's gain curve across its overlay canvas.
pub struct FadeCanvasHook {
    pub fade_type: FadeType,
    pub shape: FadeShape,
    pub duration: f64,
    pub samples_per_pixel: usize,
    pub color: String,
}

impl Hook for FadeCanvasHook {
    fn hook(&self, doc: &mut Document, node: NodeId, _prop: &str, previous: Option<&PropValue>) {
        let unchanged = previous_hook::<FadeCanvasHook>(previous).is_some_and(|p| {
            p.shape == self.shape
                && p.fade_type == self.fade_type
                && p.duration == self.duration
                && p.samples_per_pixel == self.samples_per_pixel
        });
        if unchanged {
            return;
        }
        let Some(canvas) = doc.canvas_mut(node) else {
            return;
        };

        let height = canvas.height as f64;
        let points = curve(self.shape, self.fade_type, canvas.width);
        canvas.clear();
        canvas.fill_style = self.color.clone();
        canvas.draws += 1;

        let Some(first) = points.first() else {
            return;
        };
        let mut from = (0.0, height - *first as f64 * height);
        for (i, v) in points.iter().enumerate().skip(1) {
            let to = (i as f64, height - *v as f64 * height);
            canvas.line(from, to);
            from = to;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct VolumeSliderHook {
    pub gain: f32,
}

impl VolumeSliderHook {
    pub fn title(&self) -> String {
        format!("{}% volume", (self.gain * 100.0).round())
    }
}

impl Hook for VolumeSliderHook {
    fn hook(&self, doc: &mut Document, node: NodeId, _prop: &str, _previous: Option<&PropValue>) {
        doc.set_property(node, "value", PropValue::Num((self.gain * 100.0) as f64));
        doc.set_property(node, "title", PropValue::Str(self.title()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct StereoPanSliderHook {
    pub stereo_pan: f32,
}

impl StereoPanSliderHook {
    pub fn title(&self) -> String {
        let pan = self.stereo_pan;
        if pan == 0.0 {
            return "Pan: Center".to_string();
        }
        let side = if pan < 0.0 { "Left" } else { "Right" };
        format!("Pan: {}% {side}", (pan * 100.0).round().abs())
    }
}

impl Hook for StereoPanSliderHook {
    fn hook(&self, doc: &mut Document, node: NodeId, _prop: &str, _previous: Option<&PropValue>) {
        doc.set_property(node, "value", PropValue::Num((self.stereo_pan * 100.0) as f64));
        doc.set_property(node, "title", PropValue::Str(self.title()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Keeps the track container scrolled to the playlist's `scroll_left`.
///
/// With automatic scroll on, the view jumps so the playhead (or the
/// selection start when stopped) stays visible.
pub struct ScrollHook {
    pub scroll_left: Rc<Cell<f64>>,
    pub is_scrolling: bool,
    pub is_automatic_scroll: bool,
    pub is_playing: bool,
    pub playback_seconds: f64,
    pub selection_start: f64,
    pub duration: f64,
    /// Visible width in pixels, controls included.
    pub container_width: f64,
    pub controls_width: f64,
    pub samples_per_pixel: usize,
    pub sample_rate: u32,
}

impl ScrollHook {
    /// The scroll position after following the playhead, in seconds.
    pub fn follow(&self) -> f64 {
        let mut left = self.scroll_left.get();
        if self.is_automatic_scroll {
            let width = pixels_to_seconds(
                self.container_width - self.controls_width,
                self.samples_per_pixel,
                self.sample_rate,
            );
            let time_point = if self.is_playing { self.playback_seconds } else { self.selection_start };
            if time_point < left || time_point >= left + width {
                left = time_point.min(self.duration - width);
            }
        }
        left
    }
}

impl Hook for ScrollHook {
    fn hook(&self, doc: &mut Document, node: NodeId, _prop: &str, _previous: Option<&PropValue>) {
        if self.is_scrolling {
            return;
        }
        let left = self.follow();
        self.scroll_left.set(left);
        let px = seconds_to_pixels(left, self.samples_per_pixel, self.sample_rate);
        doc.set_property(node, "scrollLeft", PropValue::Num(px));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Paints the tick marks of the time scale.
pub struct TimeScaleHook {
    /// Tick height by pixel column.
    pub ticks: BTreeMap<i64, usize>,
    pub offset: f64,
    pub samples_per_pixel: usize,
    pub duration: f64,
    pub color: String,
}

impl Hook for TimeScaleHook {
    fn hook(&self, doc: &mut Document, node: NodeId, _prop: &str, previous: Option<&PropValue>) {
        let unchanged = previous_hook::<TimeScaleHook>(previous).is_some_and(|p| {
            p.offset == self.offset && p.duration == self.duration && p.samples_per_pixel == self.samples_per_pixel
        });
        if unchanged {
            return;
        }
        let Some(canvas) = doc.canvas_mut(node) else {
            return;
        };
        let height = canvas.height as f64;
        canvas.clear();
        canvas.fill_style = self.color.clone();
        canvas.draws += 1;
        for (&x, &tick) in &self.ticks {
            let tick = tick as f64;
            canvas.fill_rect(x as f64, height - tick, 1.0, tick);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::Bits;

    fn canvas_node(doc: &mut Document, w: usize, h: usize) -> NodeId {
        let n = doc.create_element("CANVAS", None);
        doc.set_attribute(n, "width", w.to_string());
        doc.set_attribute(n, "height", h.to_string());
        n
    }

    fn peaks() -> Arc<PeakSet> {
        // silent pixel then a full-scale pixel
        Arc::new(PeakSet { length: 2, bits: Bits::Eight, data: vec![vec![0, 0, -128, 127]] })
    }

    fn canvas_hook(peaks: Arc<PeakSet>, height: usize) -> CanvasHook {
        CanvasHook { peaks, channel: 0, offset: 0, color: "white".into(), height, bar_width: 1, bar_gap: 0 }
    }

    #[test]
    fn canvas_paints_outside_the_wave() {
        let mut doc = Document::new();
        let n = canvas_node(&mut doc, 2, 10);
        canvas_hook(peaks(), 10).hook(&mut doc, n, "hook", None);

        let c = doc.canvas(n).unwrap();
        // silence paints the whole column
        assert!(c.pixel(0, 0));
        assert!(c.pixel(0, 9));
        // a full-scale peak leaves the column almost empty
        assert!(!c.pixel(1, 2));
        assert!(!c.pixel(1, 7));
        assert_eq!(c.fill_style, "white");
    }

    #[test]
    fn canvas_skips_identical_peaks() {
        let mut doc = Document::new();
        let n = canvas_node(&mut doc, 2, 10);
        let shared = peaks();
        let first = canvas_hook(shared.clone(), 10);
        first.hook(&mut doc, n, "hook", None);

        let prev = PropValue::Hook(Rc::new(canvas_hook(shared.clone(), 10)));
        canvas_hook(shared, 10).hook(&mut doc, n, "hook", Some(&prev));
        assert_eq!(doc.canvas(n).unwrap().draws, 1);

        canvas_hook(peaks(), 10).hook(&mut doc, n, "hook", Some(&prev));
        assert_eq!(doc.canvas(n).unwrap().draws, 2);
    }

    #[test]
    fn slider_titles() {
        assert_eq!(VolumeSliderHook { gain: 0.75 }.title(), "75% volume");
        assert_eq!(StereoPanSliderHook { stereo_pan: -0.5 }.title(), "Pan: 50% Left");
        assert_eq!(StereoPanSliderHook { stereo_pan: 0.25 }.title(), "Pan: 25% Right");
        assert_eq!(StereoPanSliderHook { stereo_pan: 0.0 }.title(), "Pan: Center");

        let mut doc = Document::new();
        let n = doc.create_element("INPUT", None);
        VolumeSliderHook { gain: 0.5 }.hook(&mut doc, n, "hook", None);
        assert!(matches!(doc.property(n, "value"), Some(PropValue::Num(v)) if *v == 50.0));
    }

    #[test]
    fn scroll_follows_the_playhead() {
        let hook = ScrollHook {
            scroll_left: Rc::new(Cell::new(0.0)),
            is_scrolling: false,
            is_automatic_scroll: true,
            is_playing: true,
            playback_seconds: 15.0,
            selection_start: 0.0,
            duration: 100.0,
            container_width: 100.0,
            controls_width: 0.0,
            samples_per_pixel: 100,
            sample_rate: 1000,
        };
        let mut doc = Document::new();
        let n = doc.create_element("DIV", None);
        hook.hook(&mut doc, n, "hook", None);
        assert_eq!(hook.scroll_left.get(), 15.0);
        assert!(matches!(doc.property(n, "scrollLeft"), Some(PropValue::Num(v)) if *v == 150.0));
    }

    #[test]
    fn fade_curve_spans_the_canvas() {
        let mut doc = Document::new();
        let n = canvas_node(&mut doc, 20, 10);
        let hook = FadeCanvasHook {
            fade_type: FadeType::FadeIn,
            shape: FadeShape::Linear,
            duration: 1.0,
            samples_per_pixel: 1000,
            color: "black".into(),
        };
        hook.hook(&mut doc, n, "hook", None);
        let c = doc.canvas(n).unwrap();
        // the curve starts on the bottom edge, one row below the bitmap
        assert!(c.pixel(1, 9));
        assert!(c.pixel(19, 0));
    }
}
