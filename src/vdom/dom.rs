// src/vdom/dom.rs

//! A small retained document: elements and text nodes in an arena.
//!
//! Only the operations the patcher and the hooks need are modelled:
//! tree surgery, attributes, inline style, free-form properties, event
//! handlers and a pixel canvas per element.

use super::{Handler, PropValue, Props};
use std::cell::Cell;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Event delivered to handlers. `value` carries an input's current value.
#[derive(Debug)]
pub struct DomEvent {
    pub kind: String,
    pub target: NodeId,
    pub offset_x: f64,
    pub value: Option<String>,
    pub shift_key: bool,
    default_prevented: Cell<bool>,
}

impl DomEvent {
    pub fn new(kind: impl Into<String>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
            offset_x: 0.0,
            value: None,
            shift_key: false,
            default_prevented: Cell::new(false),
        }
    }

    pub fn at(mut self, offset_x: f64) -> Self {
        self.offset_x = offset_x;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// Coverage bitmap for a canvas element. Anything painted is `1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pub fill_style: String,
    pixels: Vec<u8>,
    /// Number of times a hook repainted this canvas.
    pub draws: usize,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, fill_style: String::new(), pixels: vec![0; width * height], draws: 0 }
    }

    pub fn clear(&mut self) {
        self.pixels.iter_mut().for_each(|p| *p = 0);
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let x0 = x.floor().max(0.0) as usize;
        let y0 = y.floor().max(0.0) as usize;
        let x1 = ((x + w).ceil().max(0.0) as usize).min(self.width);
        let y1 = ((y + h).ceil().max(0.0) as usize).min(self.height);
        for row in y0..y1 {
            for col in x0..x1 {
                self.pixels[row * self.width + col] = 1;
            }
        }
    }

    /// Strokes a straight segment one pixel wide.
    pub fn line(&mut self, from: (f64, f64), to: (f64, f64)) {
        let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            self.set(x.round(), y.round());
        }
    }

    fn set(&mut self, x: f64, y: f64) {
        if x < 0.0 || y < 0.0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = 1;
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x] != 0
    }

    pub fn painted(&self) -> usize {
        self.pixels.iter().filter(|&&p| p != 0).count()
    }
}

#[derive(Default)]
pub struct Element {
    pub tag_name: String,
    pub namespace: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
    pub properties: Props,
    events: BTreeMap<String, Handler>,
    canvas: Option<Canvas>,
}

enum Kind {
    Element(Box<Element>),
    Text(String),
}

struct Slot {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena of nodes. Released slots are reused for later allocations.
#[derive(Default)]
pub struct Document {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
}

/// Owned structural view of a subtree, for comparisons.
#[derive(Clone, Debug, PartialEq)]
pub enum DomSnapshot {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        style: BTreeMap<String, String>,
        class_name: Option<String>,
        children: Vec<DomSnapshot>,
    },
    Text(String),
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: Kind) -> NodeId {
        let slot = Slot { kind, parent: None, children: Vec::new() };
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.slot(id)?.kind {
            Kind::Element(e) => Some(e),
            Kind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.slot_mut(id)?.kind {
            Kind::Element(e) => Some(e),
            Kind::Text(_) => None,
        }
    }

    pub fn create_element(&mut self, tag_name: &str, namespace: Option<&str>) -> NodeId {
        self.alloc(Kind::Element(Box::new(Element {
            tag_name: tag_name.to_string(),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        })))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Kind::Text(text.to_string()))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.slot(id).map(|s| &s.kind), Some(Kind::Text(_)))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.slot(id)?.kind {
            Kind::Text(t) => Some(t),
            Kind::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(Slot { kind: Kind::Text(t), .. }) = self.slot_mut(id) {
            *t = text.to_string();
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag_name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.parent(child) {
            if let Some(p) = self.slot_mut(parent) {
                p.children.retain(|&c| c != child);
            }
        }
        if let Some(c) = self.slot_mut(child) {
            c.parent = None;
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Inserts `child` before `reference`, or at the end when `reference` is `None`
    /// or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if !self.is_live(parent) || !self.is_live(child) || parent == child {
            return;
        }
        self.detach(child);
        if let Some(p) = self.slot_mut(parent) {
            let at = reference
                .and_then(|r| p.children.iter().position(|&c| c == r))
                .unwrap_or(p.children.len());
            p.children.insert(at, child);
        }
        if let Some(c) = self.slot_mut(child) {
            c.parent = Some(parent);
        }
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.parent(child) == Some(parent) {
            self.detach(child);
        }
    }

    pub fn replace_child(&mut self, parent: NodeId, new_child: NodeId, old_child: NodeId) {
        if self.parent(old_child) != Some(parent) {
            return;
        }
        self.insert_before(parent, new_child, Some(old_child));
        self.detach(old_child);
    }

    /// Frees a detached subtree. Ids into it become dead.
    pub fn release(&mut self, id: NodeId) {
        if self.parent(id).is_some() {
            return;
        }
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(slot) = self.slots.get_mut(n.0).and_then(Option::take) {
                stack.extend(slot.children);
                self.free.push(n.0);
            }
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: String) {
        if let Some(e) = self.element_mut(id) {
            e.attributes.insert(name.to_string(), value);
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(e) = self.element_mut(id) {
            e.attributes.remove(name);
        }
    }

    pub fn style(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.style.get(name).map(String::as_str)
    }

    /// An empty value clears the declaration.
    pub fn set_style(&mut self, id: NodeId, name: &str, value: String) {
        if let Some(e) = self.element_mut(id) {
            if value.is_empty() {
                e.style.remove(name);
            } else {
                e.style.insert(name.to_string(), value);
            }
        }
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&PropValue> {
        self.element(id)?.properties.get(name)
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: PropValue) {
        if let Some(e) = self.element_mut(id) {
            e.properties.insert(name.to_string(), value);
        }
    }

    pub fn remove_property(&mut self, id: NodeId, name: &str) {
        if let Some(e) = self.element_mut(id) {
            e.properties.remove(name);
        }
    }

    pub fn class_name(&self, id: NodeId) -> Option<&str> {
        self.property(id, "className").and_then(PropValue::as_str)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.class_name(id).is_some_and(|c| c.split_whitespace().any(|p| p == class))
    }

    pub fn set_listener(&mut self, id: NodeId, event: &str, handler: Option<Handler>) {
        if let Some(e) = self.element_mut(id) {
            match handler {
                Some(h) => {
                    e.events.insert(event.to_string(), h);
                }
                None => {
                    e.events.remove(event);
                }
            }
        }
    }

    /// Invokes the `on<kind>` property handler and any delegated listener on the target.
    pub fn dispatch(&self, event: &DomEvent) -> bool {
        let mut handled = false;
        let Some(el) = self.element(event.target) else {
            return false;
        };
        if let Some(PropValue::Handler(h)) = el.properties.get(&format!("on{}", event.kind)) {
            h(event);
            handled = true;
        }
        if let Some(h) = el.events.get(&event.kind) {
            h(event);
            handled = true;
        }
        handled
    }

    /// The element's bitmap, sized from its `width`/`height` attributes.
    /// Resizing the element resets the bitmap.
    pub fn canvas_mut(&mut self, id: NodeId) -> Option<&mut Canvas> {
        let el = self.element_mut(id)?;
        let dim = |name: &str| el.attributes.get(name).and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0) as usize;
        let (w, h) = (dim("width"), dim("height"));
        let stale = el.canvas.as_ref().is_none_or(|c| c.width != w || c.height != h);
        if stale {
            el.canvas = Some(Canvas::new(w, h));
        }
        el.canvas.as_mut()
    }

    pub fn canvas(&self, id: NodeId) -> Option<&Canvas> {
        self.element(id)?.canvas.as_ref()
    }

    /// Depth-first search for elements carrying `class`.
    pub fn find_by_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            if self.has_class(n, class) {
                found.push(n);
            }
            stack.extend(self.children(n).iter().rev());
        }
        found
    }

    pub fn snapshot(&self, id: NodeId) -> Option<DomSnapshot> {
        let slot = self.slot(id)?;
        Some(match &slot.kind {
            Kind::Text(t) => DomSnapshot::Text(t.clone()),
            Kind::Element(e) => DomSnapshot::Element {
                tag: e.tag_name.clone(),
                attributes: e.attributes.clone(),
                style: e.style.clone(),
                class_name: self.class_name(id).map(str::to_string),
                children: slot.children.iter().filter_map(|&c| self.snapshot(c)).collect(),
            },
        })
    }
}
