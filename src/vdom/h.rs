// src/vdom/h.rs

use super::{Document, DomEvent, Handler, Hook, NodeId, PropValue, Props, VNode, VTree, VdomError, format_number};
use serde_json::Value;
use std::any::Any;
use std::rc::Rc;

/// Anything that may appear in a child position of [`h`].
pub enum Child {
    Tree(VTree),
    Text(String),
    Number(f64),
    List(Vec<Child>),
    Empty,
    /// Loosely typed data, e.g. annotation lines read from JSON.
    Foreign(Value),
}

impl From<VTree> for Child {
    fn from(v: VTree) -> Self {
        Child::Tree(v)
    }
}

impl From<Option<VTree>> for Child {
    fn from(v: Option<VTree>) -> Self {
        v.map(Child::Tree).unwrap_or(Child::Empty)
    }
}

impl From<&str> for Child {
    fn from(v: &str) -> Self {
        Child::Text(v.to_string())
    }
}

impl From<String> for Child {
    fn from(v: String) -> Self {
        Child::Text(v)
    }
}

impl From<f64> for Child {
    fn from(v: f64) -> Self {
        Child::Number(v)
    }
}

impl From<()> for Child {
    fn from(_: ()) -> Self {
        Child::Empty
    }
}

impl From<Vec<VTree>> for Child {
    fn from(v: Vec<VTree>) -> Self {
        Child::List(v.into_iter().map(Child::Tree).collect())
    }
}

impl From<Vec<Child>> for Child {
    fn from(v: Vec<Child>) -> Self {
        Child::List(v)
    }
}

impl From<Value> for Child {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Child::Text(s),
            Value::Number(n) => n.as_f64().map(Child::Number).unwrap_or(Child::Foreign(Value::Number(n))),
            Value::Null => Child::Empty,
            Value::Array(items) => Child::List(items.into_iter().map(Child::from).collect()),
            other => Child::Foreign(other),
        }
    }
}

/// Fluent construction of a property map.
#[derive(Default, Clone)]
pub struct PropsBuilder {
    props: Props,
}

pub fn props() -> PropsBuilder {
    PropsBuilder::default()
}

impl PropsBuilder {
    fn set_in(&mut self, object: &str, name: &str, value: PropValue) {
        let mut map = match self.props.remove(object) {
            Some(PropValue::Object(map)) => map,
            _ => Props::new(),
        };
        map.insert(name.to_string(), value);
        self.props.insert(object.to_string(), PropValue::Object(map));
    }

    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.set_in("attributes", name, value.into());
        self
    }

    pub fn style(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_in("style", name, PropValue::Str(value.into()));
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.to_string(), value.into());
        self
    }

    pub fn class(self, class_name: impl Into<String>) -> Self {
        self.prop("className", class_name.into())
    }

    pub fn hook(mut self, name: &str, hook: Rc<dyn Hook>) -> Self {
        self.props.insert(name.to_string(), PropValue::Hook(hook));
        self
    }

    /// Sets an `on<event>` handler property.
    pub fn on(mut self, event: &str, handler: impl Fn(&DomEvent) + 'static) -> Self {
        self.props.insert(format!("on{event}"), PropValue::Handler(Rc::new(handler)));
        self
    }

    /// Registers a delegated `ev-<event>` listener.
    pub fn ev(mut self, event: &str, handler: impl Fn(&DomEvent) + 'static) -> Self {
        self.props.insert(format!("ev-{event}"), PropValue::Handler(Rc::new(handler)));
        self
    }

    pub fn key(self, key: impl Into<String>) -> Self {
        self.prop("key", key.into())
    }

    pub fn namespace(self, namespace: impl Into<String>) -> Self {
        self.prop("namespace", namespace.into())
    }

    pub fn build(self) -> Props {
        self.props
    }
}

impl From<PropsBuilder> for Props {
    fn from(b: PropsBuilder) -> Self {
        b.props
    }
}

/// Writes the value only when the live property differs, so the caret of a
/// focused input is not reset on every render.
struct SoftSetHook {
    value: PropValue,
}

impl Hook for SoftSetHook {
    fn hook(&self, doc: &mut Document, node: NodeId, prop: &str, _previous: Option<&PropValue>) {
        let unchanged = doc.property(node, prop).is_some_and(|v| v.same(&self.value));
        if !unchanged {
            doc.set_property(node, prop, self.value.clone());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct EvHook {
    handler: Handler,
}

impl Hook for EvHook {
    fn hook(&self, doc: &mut Document, node: NodeId, prop: &str, _previous: Option<&PropValue>) {
        doc.set_listener(node, &prop[3..], Some(self.handler.clone()));
    }

    fn unhook(&self, doc: &mut Document, node: NodeId, prop: &str, _next: Option<&PropValue>) {
        doc.set_listener(node, &prop[3..], None);
    }

    fn has_unhook(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn is_selector_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '-' || c >= '\u{7f}'
}

fn tag_parts(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in selector.chars() {
        if c == '.' || c == '#' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current.push(c);
        } else if is_selector_char(c) {
            current.push(c);
        } else if !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    // a bare prefix with no name is not a part
    parts.retain(|p| p != "." && p != "#");
    parts
}

/// Splits `tag.class#id` selectors, folding classes and id into `props`.
pub(crate) fn parse_tag(selector: &str, props: &mut Props) -> String {
    if selector.is_empty() {
        return "DIV".to_string();
    }

    let no_id = !props.contains_key("id");
    let parts = tag_parts(selector);
    let mut tag_name = match parts.first() {
        Some(p) if p.starts_with('.') || p.starts_with('#') => Some("DIV".to_string()),
        _ => None,
    };
    let mut classes: Vec<String> = Vec::new();

    for part in parts {
        if tag_name.is_none() {
            tag_name = Some(part);
        } else if let Some(class) = part.strip_prefix('.') {
            classes.push(class.to_string());
        } else if let Some(id) = part.strip_prefix('#') {
            if no_id {
                props.insert("id".to_string(), PropValue::Str(id.to_string()));
            }
        }
    }

    if !classes.is_empty() {
        if let Some(PropValue::Str(existing)) = props.get("className") {
            if !existing.is_empty() {
                classes.push(existing.clone());
            }
        }
        props.insert("className".to_string(), PropValue::Str(classes.join(" ")));
    }

    let tag_name = tag_name.unwrap_or_else(|| "DIV".to_string());
    if props.contains_key("namespace") { tag_name } else { tag_name.to_uppercase() }
}

fn describe(value: &PropValue) -> Option<Value> {
    Some(match value {
        PropValue::Str(s) => Value::from(s.as_str()),
        PropValue::Num(n) => Value::from(*n),
        PropValue::Bool(b) => Value::from(*b),
        PropValue::Object(o) => Value::Object(o.iter().filter_map(|(k, v)| Some((k.clone(), describe(v)?))).collect()),
        PropValue::Hook(_) => Value::Object(Default::default()),
        PropValue::Handler(_) => return None,
    })
}

fn pretty(value: &Value) -> String {
    use serde::Serialize;
    let mut out = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, fmt);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => value.to_string(),
    }
}

fn add_child(c: Child, nodes: &mut Vec<VTree>, tag: &str, props: &Props) -> Result<(), VdomError> {
    match c {
        Child::Tree(t) => nodes.push(t),
        Child::Text(s) => nodes.push(VTree::text(s)),
        Child::Number(n) => nodes.push(VTree::text(format_number(n))),
        Child::List(items) => {
            for item in items {
                add_child(item, nodes, tag, props)?;
            }
        }
        Child::Empty => {}
        Child::Foreign(value) => {
            let parent = serde_json::json!({
                "tagName": tag,
                "properties": describe(&PropValue::Object(props.clone())),
            });
            return Err(VdomError::UnexpectedVirtualElement { foreign: pretty(&value), parent_tag: pretty(&parent) });
        }
    }
    Ok(())
}

fn take_string(props: &mut Props, name: &str) -> Option<String> {
    match props.remove(name)? {
        PropValue::Str(s) => Some(s),
        PropValue::Num(n) => Some(format_number(n)),
        PropValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Builds a virtual node from a selector, properties and children.
pub fn h(selector: &str, properties: impl Into<Props>, children: impl Into<Child>) -> Result<VTree, VdomError> {
    let mut props: Props = properties.into();
    let tag = parse_tag(selector, &mut props);

    let key = take_string(&mut props, "key");
    let namespace = take_string(&mut props, "namespace");

    if tag == "INPUT" && namespace.is_none() {
        if let Some(value) = props.get("value") {
            if !matches!(value, PropValue::Hook(_)) {
                let hook: Rc<dyn Hook> = Rc::new(SoftSetHook { value: value.clone() });
                props.insert("value".to_string(), PropValue::Hook(hook));
            }
        }
    }

    for (name, value) in props.iter_mut() {
        if name.starts_with("ev-") {
            if let PropValue::Handler(handler) = value {
                let hook: Rc<dyn Hook> = Rc::new(EvHook { handler: handler.clone() });
                *value = PropValue::Hook(hook);
            }
        }
    }

    let mut nodes = Vec::new();
    add_child(children.into(), &mut nodes, &tag, &props)?;

    Ok(VTree::node(VNode::new(tag, props, nodes, key, namespace)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(t: &VTree) -> &VNode {
        t.as_node().unwrap()
    }

    #[test]
    fn selector_classes_and_id() {
        let t = h("span.a.b#main", props().class("c"), ()).unwrap();
        let n = node(&t);
        assert_eq!(n.tag_name, "SPAN");
        assert_eq!(n.properties["className"].as_str(), Some("a b c"));
        assert_eq!(n.properties["id"].as_str(), Some("main"));
    }

    #[test]
    fn bare_class_defaults_to_div() {
        let t = h(".cursor", props(), ()).unwrap();
        assert_eq!(node(&t).tag_name, "DIV");
        assert_eq!(node(&h("", props(), ()).unwrap()).tag_name, "DIV");
    }

    #[test]
    fn explicit_id_wins_over_selector() {
        let t = h("div#x", props().prop("id", "y"), ()).unwrap();
        assert_eq!(node(&t).properties["id"].as_str(), Some("y"));
    }

    #[test]
    fn namespaced_tags_keep_case() {
        let t = h("svg", props().namespace("http://www.w3.org/2000/svg"), ()).unwrap();
        let n = node(&t);
        assert_eq!(n.tag_name, "svg");
        assert_eq!(n.namespace.as_deref(), Some("http://www.w3.org/2000/svg"));
        assert!(!n.properties.contains_key("namespace"));
    }

    #[test]
    fn key_is_lifted_out_of_props() {
        let t = h("li", props().key("k1"), ()).unwrap();
        assert_eq!(node(&t).key.as_deref(), Some("k1"));
        assert!(!node(&t).properties.contains_key("key"));
    }

    #[test]
    fn mixed_children_are_flattened() {
        let inner = h("b", props(), "x").unwrap();
        let t = h(
            "div",
            props(),
            vec![Child::from("a"), Child::from(3.0), Child::from(vec![inner]), Child::Empty],
        )
        .unwrap();
        let n = node(&t);
        assert_eq!(n.children.len(), 3);
        assert_eq!(n.count, 4);
    }

    #[test]
    fn input_value_becomes_hook() {
        let t = h("input", props().prop("value", "5"), ()).unwrap();
        assert!(matches!(node(&t).properties["value"], PropValue::Hook(_)));
    }

    #[test]
    fn ev_handlers_become_unhookable() {
        let t = h("div", props().ev("click", |_| {}), ()).unwrap();
        let n = node(&t);
        assert!(n.hooks.as_ref().is_some_and(|hk| hk.contains_key("ev-click")));
    }

    #[test]
    fn foreign_child_is_rejected_with_context() {
        let err = h("div.lines", props(), Child::from(serde_json::json!([{"bogus": 1}]))).unwrap_err();
        match err {
            VdomError::UnexpectedVirtualElement { foreign, parent_tag } => {
                assert!(foreign.contains("bogus"));
                assert!(parent_tag.contains("DIV"));
                assert!(parent_tag.contains("lines"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn json_strings_and_numbers_are_text() {
        let t = h("div", props(), Child::from(serde_json::json!(["a", 2, null]))).unwrap();
        assert_eq!(node(&t).children.len(), 2);
    }
}
