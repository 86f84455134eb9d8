// src/vdom/patch.rs

use super::diff::{Moves, Patch, PropDiff, PropPatch, VPatch};
use super::{Document, NodeId, PropValue, Props, VTree, VdomError, Widget};
use std::collections::HashMap;

/// Renders a fresh DOM subtree for `tree`.
pub fn create_element(doc: &mut Document, tree: &VTree) -> Result<NodeId, VdomError> {
    let tree = match tree {
        VTree::Thunk(t) => t.resolve(None)?,
        other => other.clone(),
    };

    match &tree {
        VTree::Widget(w) => Ok(w.init(doc)),
        VTree::Text(t) => Ok(doc.create_text(&t.text)),
        VTree::Node(n) => {
            let node = doc.create_element(&n.tag_name, n.namespace.as_deref());
            for (name, value) in &n.properties {
                apply_property(doc, node, name, Change::Value(value), None);
            }
            for child in &n.children {
                let child_node = create_element(doc, child)?;
                doc.append_child(node, child_node);
            }
            Ok(node)
        }
        VTree::Thunk(_) => Err(VdomError::InvalidThunk),
    }
}

/// Applies `patches` to the DOM rendered from `patches.a`, returning the
/// (possibly replaced) root.
pub fn patch(doc: &mut Document, root: NodeId, patches: &Patch) -> Result<NodeId, VdomError> {
    if !doc.is_live(root) {
        return Err(VdomError::DetachedNode);
    }
    let mut detached = Vec::new();
    let root = patch_into(doc, root, patches, &mut detached)?;
    // Freed only once every index has been resolved, so no slot is reused mid-patch.
    for node in detached {
        doc.release(node);
    }
    Ok(root)
}

fn patch_into(doc: &mut Document, root: NodeId, patches: &Patch, detached: &mut Vec<NodeId>) -> Result<NodeId, VdomError> {
    let indices = patches.indices();
    if indices.is_empty() {
        return Ok(root);
    }

    let mut nodes = HashMap::new();
    dom_index(doc, Some(root), &patches.a, &indices, &mut nodes, 0);

    let mut root = root;
    for index in indices {
        let Some(&dom_node) = nodes.get(&index) else {
            continue;
        };
        for op in patches.get(index) {
            let new_node = apply_op(doc, op, dom_node, detached)?;
            if dom_node == root {
                if let Some(n) = new_node {
                    root = n;
                }
            }
        }
    }
    Ok(root)
}

// Maps pre-order indices onto live nodes, only descending where a wanted index lives.
fn dom_index(
    doc: &Document,
    node: Option<NodeId>,
    tree: &VTree,
    indices: &[usize],
    nodes: &mut HashMap<usize, NodeId>,
    mut root_index: usize,
) {
    let Some(node) = node else {
        return;
    };
    if index_in_range(indices, root_index, root_index) {
        nodes.insert(root_index, node);
    }

    if let VTree::Node(v) = tree {
        let child_nodes = doc.children(node).to_vec();
        for (i, v_child) in v.children.iter().enumerate() {
            root_index += 1;
            let next_index = root_index + v_child.count();
            if index_in_range(indices, root_index, next_index) {
                dom_index(doc, child_nodes.get(i).copied(), v_child, indices, nodes, root_index);
            }
            root_index = next_index;
        }
    }
}

/// Whether any of the sorted `indices` falls in `[left, right]`.
fn index_in_range(indices: &[usize], left: usize, right: usize) -> bool {
    let at = indices.partition_point(|&i| i < left);
    indices.get(at).is_some_and(|&i| i <= right)
}

fn apply_op(doc: &mut Document, op: &VPatch, dom_node: NodeId, detached: &mut Vec<NodeId>) -> Result<Option<NodeId>, VdomError> {
    match op {
        VPatch::Remove(v) => {
            if let Some(parent) = doc.parent(dom_node) {
                doc.remove_child(parent, dom_node);
            }
            destroy_widget(doc, dom_node, v);
            detached.push(dom_node);
            Ok(None)
        }
        VPatch::Insert(v) => {
            let new_node = create_element(doc, v)?;
            doc.append_child(dom_node, new_node);
            Ok(Some(dom_node))
        }
        VPatch::VText { next, .. } => {
            if doc.is_text(dom_node) {
                doc.set_text(dom_node, &next.text);
                return Ok(Some(dom_node));
            }
            let new_node = doc.create_text(&next.text);
            replace(doc, dom_node, new_node, detached);
            Ok(Some(new_node))
        }
        VPatch::Widget { prev, next } => {
            let prev_widget = match prev {
                VTree::Widget(w) => Some(w.as_ref()),
                _ => None,
            };
            let updating = prev_widget.is_some_and(|p| same_widget(p, next.as_ref()));
            let new_node = match prev_widget {
                Some(p) if updating => next.update(p, dom_node, doc).unwrap_or(dom_node),
                _ => next.init(doc),
            };
            if new_node != dom_node {
                replace(doc, dom_node, new_node, detached);
            }
            if !updating {
                destroy_widget(doc, dom_node, prev);
            }
            Ok(Some(new_node))
        }
        VPatch::VNode { next, .. } => {
            let new_node = create_element(doc, &VTree::Node(next.clone()))?;
            replace(doc, dom_node, new_node, detached);
            Ok(Some(new_node))
        }
        VPatch::Order(moves) => {
            reorder_children(doc, dom_node, moves);
            Ok(Some(dom_node))
        }
        VPatch::Props { node, diff } => {
            let previous = node.as_node().map(|n| &n.properties);
            for (name, change) in diff {
                let change = match change {
                    PropPatch::Remove => Change::Remove,
                    PropPatch::Set(v) => Change::Value(v),
                    PropPatch::Nested(d) => Change::Nested(d),
                };
                apply_property(doc, dom_node, name, change, previous);
            }
            Ok(Some(dom_node))
        }
        VPatch::Thunk(sub) => {
            let new_root = patch_into(doc, dom_node, sub, detached)?;
            if new_root != dom_node {
                if let Some(parent) = doc.parent(dom_node) {
                    doc.replace_child(parent, new_root, dom_node);
                }
            }
            Ok(Some(new_root))
        }
    }
}

fn replace(doc: &mut Document, old: NodeId, new: NodeId, detached: &mut Vec<NodeId>) {
    if let Some(parent) = doc.parent(old) {
        doc.replace_child(parent, new, old);
        detached.push(old);
    }
}

fn same_widget(a: &dyn Widget, b: &dyn Widget) -> bool {
    match (a.id(), b.id()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_any().type_id() == b.as_any().type_id(),
    }
}

fn destroy_widget(doc: &mut Document, node: NodeId, v: &VTree) {
    if let VTree::Widget(w) = v {
        if w.has_destroy() {
            w.destroy(node, doc);
        }
    }
}

fn reorder_children(doc: &mut Document, node: NodeId, moves: &Moves) {
    let mut key_map = HashMap::new();

    for remove in &moves.removes {
        let Some(&child) = doc.children(node).get(remove.from) else {
            continue;
        };
        if let Some(key) = &remove.key {
            key_map.insert(key.clone(), child);
        }
        doc.remove_child(node, child);
    }

    // The length grows with every insert even though `children` is re-read,
    // so an index at or past it always appends.
    let mut length = doc.children(node).len();
    for insert in &moves.inserts {
        let Some(&child) = key_map.get(&insert.key) else {
            continue;
        };
        let reference = if insert.to >= length { None } else { doc.children(node).get(insert.to).copied() };
        length += 1;
        doc.insert_before(node, child, reference);
    }
}

enum Change<'a> {
    Remove,
    Value(&'a PropValue),
    Nested(&'a PropDiff),
}

fn apply_property(doc: &mut Document, node: NodeId, name: &str, change: Change<'_>, previous: Option<&Props>) {
    match change {
        Change::Remove => remove_property(doc, node, name, None, previous),
        Change::Value(PropValue::Hook(hook)) => {
            let next = PropValue::Hook(hook.clone());
            remove_property(doc, node, name, Some(&next), previous);
            hook.hook(doc, node, name, previous.and_then(|p| p.get(name)));
        }
        Change::Value(PropValue::Object(obj)) => {
            let entries = obj.iter().map(|(k, v)| (k.as_str(), Some(v)));
            patch_object(doc, node, name, entries);
        }
        Change::Nested(diff) => {
            let entries = diff.iter().map(|(k, p)| {
                let v = match p {
                    PropPatch::Set(v) => Some(v),
                    PropPatch::Remove | PropPatch::Nested(_) => None,
                };
                (k.as_str(), v)
            });
            patch_object(doc, node, name, entries);
        }
        Change::Value(value) => doc.set_property(node, name, value.clone()),
    }
}

fn remove_property(doc: &mut Document, node: NodeId, name: &str, next: Option<&PropValue>, previous: Option<&Props>) {
    let Some(prev) = previous.and_then(|p| p.get(name)) else {
        return;
    };
    match prev {
        PropValue::Hook(hook) => hook.unhook(doc, node, name, next),
        PropValue::Object(obj) if name == "attributes" => {
            for attr in obj.keys() {
                doc.remove_attribute(node, attr);
            }
        }
        PropValue::Object(obj) if name == "style" => {
            for decl in obj.keys() {
                doc.set_style(node, decl, String::new());
            }
        }
        PropValue::Str(_) => doc.set_property(node, name, PropValue::Str(String::new())),
        _ => doc.remove_property(node, name),
    }
}

fn patch_object<'a>(doc: &mut Document, node: NodeId, name: &str, entries: impl Iterator<Item = (&'a str, Option<&'a PropValue>)>) {
    match name {
        "attributes" => {
            for (attr, value) in entries {
                match value {
                    Some(v) => doc.set_attribute(node, attr, v.to_attribute()),
                    None => doc.remove_attribute(node, attr),
                }
            }
        }
        "style" => {
            for (decl, value) in entries {
                doc.set_style(node, decl, value.map(PropValue::to_attribute).unwrap_or_default());
            }
        }
        _ => {
            let mut current = match doc.property(node, name) {
                Some(PropValue::Object(map)) => map.clone(),
                _ => Props::new(),
            };
            for (k, value) in entries {
                match value {
                    Some(v) => {
                        current.insert(k.to_string(), v.clone());
                    }
                    None => {
                        current.remove(k);
                    }
                }
            }
            doc.set_property(node, name, PropValue::Object(current));
        }
    }
}
