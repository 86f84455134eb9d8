// src/session/annotations.rs

//! Timed text annotations: aeneas JSON in and out, edge dragging, and a
//! read-only rendering of the boxes and text rows.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::DurationFormat;
use crate::engine::time::{pixels_to_seconds, seconds_to_pixels, to_fixed};
use crate::playlist::events::{DragDirection, EventQueue, PlaylistEvent};
use crate::vdom::{Child, DomEvent, VTree, VdomError, format_number, h, props};

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub lines: Vec<String>,
    pub lang: String,
}

/// One entry as aeneas writes it. Times may be strings or numbers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AeneasInput {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub begin: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
    #[serde(default)]
    pub lines: Option<Vec<String>>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AeneasOutput {
    pub begin: String,
    pub end: String,
    pub id: String,
    pub language: String,
    pub lines: Vec<String>,
}

fn number(v: Option<&Value>) -> f64 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    };
    if n.is_nan() { 0.0 } else { n }
}

fn id_text(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

impl From<AeneasInput> for Annotation {
    fn from(a: AeneasInput) -> Self {
        Self {
            id: id_text(a.id.as_ref()).unwrap_or_else(|| Uuid::new_v4().to_string()),
            start: number(a.begin.as_ref()),
            end: number(a.end.as_ref()),
            lines: a.lines.unwrap_or_else(|| vec![String::new()]),
            lang: a.language.filter(|l| !l.is_empty()).unwrap_or_else(|| "en".to_string()),
        }
    }
}

impl From<&Annotation> for AeneasOutput {
    fn from(a: &Annotation) -> Self {
        Self {
            begin: to_fixed(a.start, 3),
            end: to_fixed(a.end, 3),
            id: a.id.clone(),
            language: a.lang.clone(),
            lines: a.lines.clone(),
        }
    }
}

/// Drag state for one resize handle.
///
/// Positions arrive in `DomEvent::offset_x`; each move is reported as a
/// `dragged` event carrying the change in seconds.
pub struct DragInteraction {
    queue: EventQueue,
    index: usize,
    direction: DragDirection,
    active: Cell<bool>,
    prev_x: Cell<f64>,
    scale: Cell<(usize, u32)>,
}

impl DragInteraction {
    pub fn new(queue: EventQueue, index: usize, direction: DragDirection) -> Self {
        Self {
            queue,
            index,
            direction,
            active: Cell::new(false),
            prev_x: Cell::new(0.0),
            scale: Cell::new((4096, 44_100)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    fn emit_drag(&self, x: f64) {
        let delta_x = x - self.prev_x.get();
        if delta_x != 0.0 {
            let (spp, sr) = self.scale.get();
            self.prev_x.set(x);
            self.queue.push(PlaylistEvent::Dragged {
                delta: pixels_to_seconds(delta_x, spp, sr),
                index: self.index,
                direction: self.direction,
            });
        }
    }

    pub fn dragstart(&self, e: &DomEvent) {
        self.active.set(true);
        self.prev_x.set(e.offset_x);
    }

    pub fn dragover(&self, e: &DomEvent) {
        if self.active.get() {
            e.prevent_default();
            self.emit_drag(e.offset_x);
        }
    }

    pub fn dragend(&self, e: &DomEvent) {
        if self.active.get() {
            e.prevent_default();
            self.active.set(false);
        }
    }
}

/// Playlist state the annotation rendering reads.
#[derive(Clone, Copy, Debug)]
pub struct AnnotationView {
    pub samples_per_pixel: usize,
    pub sample_rate: u32,
    pub scroll_left: f64,
    pub margin_left: f64,
    pub is_playing: bool,
    pub playback_seconds: f64,
    pub duration_format: DurationFormat,
}

pub struct AnnotationList {
    annotations: Rc<RefCell<Vec<Annotation>>>,
    handles: Vec<Rc<DragInteraction>>,
    queue: EventQueue,
    pub editable: bool,
    pub link_endpoints: bool,
    pub is_continuous_play: bool,
}

impl AnnotationList {
    pub fn new(queue: EventQueue, input: Vec<AeneasInput>) -> Self {
        let mut list = Self {
            annotations: Rc::new(RefCell::new(input.into_iter().map(Annotation::from).collect())),
            handles: Vec::new(),
            queue,
            editable: false,
            link_endpoints: false,
            is_continuous_play: false,
        };
        list.setup_interactions();
        list
    }

    fn setup_interactions(&mut self) {
        let count = self.annotations.borrow().len();
        self.handles = (0..count)
            .flat_map(|i| [DragDirection::Left, DragDirection::Right].map(|d| (i, d)))
            .map(|(i, d)| Rc::new(DragInteraction::new(self.queue.clone(), i, d)))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.annotations.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn annotations(&self) -> Ref<'_, Vec<Annotation>> {
        self.annotations.borrow()
    }

    /// Moves one edge of annotation `index` by `delta` seconds, keeping its
    /// neighbours from overlapping it. `duration` bounds the right edge.
    pub fn drag(&mut self, delta: f64, index: usize, direction: DragDirection, duration: f64) {
        let mut notes = self.annotations.borrow_mut();
        if index >= notes.len() {
            return;
        }
        match direction {
            DragDirection::Left => {
                let original = notes[index].start;
                let start = (original + delta).max(0.0);
                notes[index].start = start;
                if index > 0 {
                    let prev = &mut notes[index - 1];
                    if prev.end > start || (self.link_endpoints && prev.end == original) {
                        prev.end = start;
                    }
                }
            }
            DragDirection::Right => {
                let original = notes[index].end;
                let end = (original + delta).min(duration);
                notes[index].end = end;
                if let Some(next) = notes.get_mut(index + 1) {
                    if next.start < end || (self.link_endpoints && next.start == original) {
                        next.start = end;
                    }
                }
            }
        }
    }

    pub fn to_aeneas(&self) -> Vec<AeneasOutput> {
        self.annotations.borrow().iter().map(AeneasOutput::from).collect()
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_aeneas())
    }

    fn render_resize(&self, i: usize, direction: DragDirection, view: &AnnotationView) -> Result<VTree, VdomError> {
        let slot = i * 2 + usize::from(direction == DragDirection::Right);
        let (selector, side) = match direction {
            DragDirection::Left => ("div.resize-handle.resize-w", "left"),
            DragDirection::Right => ("div.resize-handle.resize-e", "right"),
        };
        let mut p = props()
            .attr("style", format!("position: absolute; height: 30px; width: 10px; top: 0; {side}: -2px"))
            .attr("draggable", true);
        if let Some(handle) = self.handles.get(slot) {
            handle.scale.set((view.samples_per_pixel, view.sample_rate));
            let (a, b, c) = (handle.clone(), handle.clone(), handle.clone());
            p = p
                .on("dragstart", move |e| a.dragstart(e))
                .on("dragover", move |e| b.dragover(e))
                .on("dragend", move |e| c.dragend(e));
        }
        h(selector, p, ())
    }

    fn render_box(&self, i: usize, note: &Annotation, view: &AnnotationView) -> Result<VTree, VdomError> {
        let pix_per_sec = view.sample_rate as f64 / view.samples_per_pixel as f64;
        let pix_offset = seconds_to_pixels(view.scroll_left, view.samples_per_pixel, view.sample_rate);
        let left = (note.start * pix_per_sec - pix_offset).floor();
        let width = (note.end * pix_per_sec - note.start * pix_per_sec).ceil();

        let annotations = self.annotations.clone();
        let queue = self.queue.clone();
        let continuous = self.is_continuous_play;
        let on_click = move |_: &DomEvent| {
            let Some((start, end)) = annotations.borrow().get(i).map(|a| (a.start, a.end)) else {
                return;
            };
            if continuous {
                queue.push(PlaylistEvent::Select { start, end: start, track: None });
                queue.push(PlaylistEvent::Play { start: Some(start), end: None });
            } else {
                queue.push(PlaylistEvent::Select { start, end, track: None });
                queue.push(PlaylistEvent::Play { start: Some(start), end: Some(end) });
            }
        };

        h(
            "div.annotation-box",
            props()
                .attr(
                    "style",
                    format!(
                        "position: absolute; height: 30px; width: {}px; left: {}px",
                        format_number(width),
                        format_number(left)
                    ),
                )
                .attr("data-id", note.id.as_str()),
            vec![
                self.render_resize(i, DragDirection::Left, view)?,
                h("span.id", props().on("click", on_click), note.id.as_str())?,
                self.render_resize(i, DragDirection::Right, view)?,
            ],
        )
    }

    fn render_row(&self, i: usize, note: &Annotation, view: &AnnotationView) -> Result<VTree, VdomError> {
        let current = view.is_playing && view.playback_seconds >= note.start && view.playback_seconds <= note.end;
        let selector = if current { "div.annotation.current" } else { "div.annotation" };

        let mut lines_props = props();
        if self.editable {
            let annotations = self.annotations.clone();
            lines_props = lines_props.attr("contenteditable", true).on("input", move |e: &DomEvent| {
                if let (Some(text), Some(note)) = (e.value.as_ref(), annotations.borrow_mut().get_mut(i)) {
                    note.lines = vec![text.clone()];
                }
            });
        }
        let lines: Vec<Child> = note.lines.iter().map(|l| Child::from(l.as_str())).collect();

        h(
            selector,
            props(),
            vec![
                h("span.annotation-id", props(), note.id.as_str())?,
                h("span.annotation-start", props(), view.duration_format.format(note.start))?,
                h("span.annotation-end", props(), view.duration_format.format(note.end))?,
                h("span.annotation-lines", lines_props, lines)?,
                h("span.annotation-actions", props(), ())?,
            ],
        )
    }

    pub fn render(&self, view: &AnnotationView) -> Result<VTree, VdomError> {
        let notes = self.annotations.borrow().clone();

        let boxes = notes
            .iter()
            .enumerate()
            .map(|(i, note)| self.render_box(i, note, view))
            .collect::<Result<Vec<_>, _>>()?;
        let boxes = h(
            "div.annotations-boxes",
            props().attr(
                "style",
                format!("height: 30px; position: relative; margin-left: {}px;", format_number(view.margin_left)),
            ),
            boxes,
        )?;
        let wrapper = h("div.annotations-boxes-wrapper", props().attr("style", "overflow: hidden;"), boxes)?;

        let rows = notes
            .iter()
            .enumerate()
            .map(|(i, note)| self.render_row(i, note, view))
            .collect::<Result<Vec<_>, _>>()?;
        let text = h("div.annotations-text", props(), rows)?;

        h("div.annotations", props(), vec![wrapper, text])
    }
}
