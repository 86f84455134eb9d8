// src/vdom/mod.rs

//! Immutable view trees, a tree diff, and a patcher that reconciles a
//! [`dom::Document`] with the newest tree.
//!
//! Trees are cheap to clone: every node is reference counted, and two
//! subtrees that are the same allocation are skipped by the diff without
//! being walked.

pub mod diff;
pub mod dom;
mod h;
pub mod patch;

pub use diff::{Insert, Moves, Patch, PropDiff, PropPatch, Remove, VPatch, diff};
pub use dom::{Canvas, DomEvent, DomSnapshot, Document, NodeId};
pub use h::{Child, PropsBuilder, h, props};
pub use patch::{create_element, patch};

use std::any::Any;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VdomError {
    #[error(
        "Unexpected virtual child passed to h().\nExpected a VNode / Vthunk / VWidget / string but:\ngot:\n{foreign}.\nThe parent vnode is:\n{parent_tag}"
    )]
    UnexpectedVirtualElement { foreign: String, parent_tag: String },
    #[error("thunk did not return a valid node")]
    InvalidThunk,
    #[error("patch root is not a live node")]
    DetachedNode,
}

pub type Handler = Rc<dyn Fn(&DomEvent)>;
pub type Props = BTreeMap<String, PropValue>;

/// A property value on a virtual node.
#[derive(Clone)]
pub enum PropValue {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Nested map, such as `attributes` or `style`.
    Object(Props),
    Hook(Rc<dyn Hook>),
    Handler(Handler),
}

impl PropValue {
    /// Identity for hooks and handlers, value equality for scalars.
    /// Objects are never identical; the diff recurses into them instead.
    pub fn same(&self, other: &PropValue) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Num(a), PropValue::Num(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Hook(a), PropValue::Hook(b)) => Rc::ptr_eq(a, b),
            (PropValue::Handler(a), PropValue::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used when the value lands in an attribute.
    pub fn to_attribute(&self) -> String {
        match self {
            PropValue::Str(s) => s.clone(),
            PropValue::Num(n) => format_number(*n),
            PropValue::Bool(b) => b.to_string(),
            PropValue::Object(_) => "[object Object]".to_string(),
            PropValue::Hook(_) | PropValue::Handler(_) => String::new(),
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{s:?}"),
            PropValue::Num(n) => write!(f, "{n}"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Object(o) => f.debug_map().entries(o.iter()).finish(),
            PropValue::Hook(_) => f.write_str("<hook>"),
            PropValue::Handler(_) => f.write_str("<handler>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Num(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Num(v as f64)
    }
}

impl From<usize> for PropValue {
    fn from(v: usize) -> Self {
        PropValue::Num(v as f64)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

/// Integers print without a fractional part, like a JavaScript number.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Runs against the live node when the property carrying it is applied.
pub trait Hook {
    fn hook(&self, doc: &mut Document, node: NodeId, prop: &str, previous: Option<&PropValue>);

    fn unhook(&self, _doc: &mut Document, _node: NodeId, _prop: &str, _next: Option<&PropValue>) {}

    /// Nodes only track hooks that need an unhook call on removal.
    fn has_unhook(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// A node that manages its own DOM subtree.
pub trait Widget {
    fn init(&self, doc: &mut Document) -> NodeId;

    /// Return a replacement node, or `None` to keep `node`.
    fn update(&self, _previous: &dyn Widget, _node: NodeId, _doc: &mut Document) -> Option<NodeId> {
        None
    }

    fn destroy(&self, _node: NodeId, _doc: &mut Document) {}

    fn has_destroy(&self) -> bool {
        false
    }

    /// Named widgets are matched by id; unnamed ones by concrete type.
    fn id(&self) -> Option<&str> {
        None
    }

    fn key(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Lazily rendered subtree. The render runs at most once per thunk.
pub struct Thunk {
    key: Option<String>,
    render: Box<dyn Fn(Option<&VTree>) -> VTree>,
    rendered: OnceCell<VTree>,
}

impl Thunk {
    pub fn new(render: impl Fn(Option<&VTree>) -> VTree + 'static) -> Rc<Self> {
        Rc::new(Self { key: None, render: Box::new(render), rendered: OnceCell::new() })
    }

    pub fn keyed(key: impl Into<String>, render: impl Fn(Option<&VTree>) -> VTree + 'static) -> Rc<Self> {
        Rc::new(Self { key: Some(key.into()), render: Box::new(render), rendered: OnceCell::new() })
    }

    pub(crate) fn resolve(&self, previous: Option<&VTree>) -> Result<VTree, VdomError> {
        let tree = self.rendered.get_or_init(|| (self.render)(previous));
        match tree {
            VTree::Thunk(_) => Err(VdomError::InvalidThunk),
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VText {
    pub text: String,
}

pub struct VNode {
    pub tag_name: String,
    pub properties: Props,
    pub children: Vec<VTree>,
    pub key: Option<String>,
    pub namespace: Option<String>,
    /// Number of descendants in pre-order.
    pub count: usize,
    pub has_widgets: bool,
    pub has_thunks: bool,
    pub hooks: Option<BTreeMap<String, Rc<dyn Hook>>>,
    pub descendant_hooks: bool,
}

impl VNode {
    pub fn new(
        tag_name: impl Into<String>,
        properties: Props,
        children: Vec<VTree>,
        key: Option<String>,
        namespace: Option<String>,
    ) -> Self {
        let mut hooks: Option<BTreeMap<String, Rc<dyn Hook>>> = None;
        for (name, value) in &properties {
            if let PropValue::Hook(hk) = value {
                if hk.has_unhook() {
                    hooks.get_or_insert_with(BTreeMap::new).insert(name.clone(), hk.clone());
                }
            }
        }

        let mut descendants = 0;
        let mut has_widgets = false;
        let mut has_thunks = false;
        let mut descendant_hooks = false;

        for child in &children {
            match child {
                VTree::Node(n) => {
                    descendants += n.count;
                    has_widgets |= n.has_widgets;
                    has_thunks |= n.has_thunks;
                    descendant_hooks |= n.hooks.is_some() || n.descendant_hooks;
                }
                VTree::Widget(w) => has_widgets |= w.has_destroy(),
                VTree::Thunk(_) => has_thunks = true,
                VTree::Text(_) => {}
            }
        }

        Self {
            tag_name: tag_name.into(),
            properties,
            count: children.len() + descendants,
            children,
            key,
            namespace,
            has_widgets,
            has_thunks,
            hooks,
            descendant_hooks,
        }
    }
}

#[derive(Clone)]
pub enum VTree {
    Node(Rc<VNode>),
    Text(Rc<VText>),
    Widget(Rc<dyn Widget>),
    Thunk(Rc<Thunk>),
}

impl VTree {
    pub fn text(text: impl Into<String>) -> Self {
        VTree::Text(Rc::new(VText { text: text.into() }))
    }

    pub fn node(node: VNode) -> Self {
        VTree::Node(Rc::new(node))
    }

    /// Same allocation, the `===` of the tree world.
    pub fn ptr_eq(&self, other: &VTree) -> bool {
        match (self, other) {
            (VTree::Node(a), VTree::Node(b)) => Rc::ptr_eq(a, b),
            (VTree::Text(a), VTree::Text(b)) => Rc::ptr_eq(a, b),
            (VTree::Widget(a), VTree::Widget(b)) => Rc::ptr_eq(a, b),
            (VTree::Thunk(a), VTree::Thunk(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            VTree::Node(n) => n.count,
            _ => 0,
        }
    }

    /// Empty keys count as no key.
    pub fn key(&self) -> Option<&str> {
        let key = match self {
            VTree::Node(n) => n.key.as_deref(),
            VTree::Widget(w) => w.key(),
            VTree::Thunk(t) => t.key.as_deref(),
            VTree::Text(_) => None,
        };
        key.filter(|k| !k.is_empty())
    }

    pub fn as_node(&self) -> Option<&Rc<VNode>> {
        match self {
            VTree::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_widget(&self) -> bool {
        matches!(self, VTree::Widget(_))
    }

    pub fn is_thunk(&self) -> bool {
        matches!(self, VTree::Thunk(_))
    }
}

impl fmt::Debug for VTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VTree::Node(n) => f
                .debug_struct("VNode")
                .field("tag", &n.tag_name)
                .field("key", &n.key)
                .field("properties", &n.properties)
                .field("children", &n.children)
                .finish(),
            VTree::Text(t) => write!(f, "VText({:?})", t.text),
            VTree::Widget(_) => f.write_str("Widget"),
            VTree::Thunk(_) => f.write_str("Thunk"),
        }
    }
}
