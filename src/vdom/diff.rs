// src/vdom/diff.rs

use super::{PropValue, Props, VNode, VText, VTree, VdomError, Widget};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Change to a single property. `Remove` is the "undefined" of a property map.
#[derive(Clone, Debug)]
pub enum PropPatch {
    Remove,
    Set(PropValue),
    Nested(PropDiff),
}

pub type PropDiff = BTreeMap<String, PropPatch>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remove {
    pub from: usize,
    pub key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Insert {
    pub key: String,
    pub to: usize,
}

/// Keyed child moves. Removes run first, then inserts in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Moves {
    pub removes: Vec<Remove>,
    pub inserts: Vec<Insert>,
}

#[derive(Clone)]
pub enum VPatch {
    Remove(VTree),
    Insert(VTree),
    VText { prev: VTree, next: Rc<VText> },
    Widget { prev: VTree, next: Rc<dyn Widget> },
    VNode { prev: VTree, next: Rc<VNode> },
    Props { node: VTree, diff: PropDiff },
    Order(Moves),
    Thunk(Patch),
}

impl std::fmt::Debug for VPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VPatch::Remove(_) => f.write_str("REMOVE"),
            VPatch::Insert(t) => write!(f, "INSERT({t:?})"),
            VPatch::VText { next, .. } => write!(f, "VTEXT({:?})", next.text),
            VPatch::Widget { .. } => f.write_str("WIDGET"),
            VPatch::VNode { next, .. } => write!(f, "VNODE({})", next.tag_name),
            VPatch::Props { diff, .. } => write!(f, "PROPS({diff:?})"),
            VPatch::Order(m) => write!(f, "ORDER({m:?})"),
            VPatch::Thunk(p) => write!(f, "THUNK({:?})", p.ops),
        }
    }
}

/// Patch operations keyed by the pre-order index of the node they target in `a`.
#[derive(Clone)]
pub struct Patch {
    pub a: VTree,
    pub ops: BTreeMap<usize, Vec<VPatch>>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.ops.keys().copied().collect()
    }

    pub fn get(&self, index: usize) -> &[VPatch] {
        self.ops.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    fn append(&mut self, index: usize, op: VPatch) {
        self.ops.entry(index).or_default().push(op);
    }
}

pub fn diff(a: &VTree, b: &VTree) -> Result<Patch, VdomError> {
    diff_opt(a, Some(b))
}

fn diff_opt(a: &VTree, b: Option<&VTree>) -> Result<Patch, VdomError> {
    let mut patch = Patch { a: a.clone(), ops: BTreeMap::new() };
    walk(a, b, &mut patch, 0)?;
    Ok(patch)
}

fn walk(a: &VTree, b: Option<&VTree>, patch: &mut Patch, index: usize) -> Result<(), VdomError> {
    if b.is_some_and(|b| a.ptr_eq(b)) {
        return Ok(());
    }

    if a.is_thunk() || b.is_some_and(VTree::is_thunk) {
        return thunks(a, b, patch, index);
    }

    let Some(b) = b else {
        // A widget gets its own REMOVE; only descendants need clearing.
        if !a.is_widget() {
            clear_state(a, patch, index)?;
        }
        patch.append(index, VPatch::Remove(a.clone()));
        return Ok(());
    };

    let mut apply_clear = false;
    match b {
        VTree::Node(bn) => match a {
            VTree::Node(an)
                if an.tag_name == bn.tag_name && an.namespace == bn.namespace && an.key == bn.key =>
            {
                if let Some(props) = diff_props(&an.properties, &bn.properties) {
                    patch.append(index, VPatch::Props { node: a.clone(), diff: props });
                }
                diff_children(an, bn, patch, index)?;
            }
            _ => {
                patch.append(index, VPatch::VNode { prev: a.clone(), next: bn.clone() });
                apply_clear = true;
            }
        },
        VTree::Text(bt) => match a {
            VTree::Text(at) => {
                if at.text != bt.text {
                    patch.append(index, VPatch::VText { prev: a.clone(), next: bt.clone() });
                }
            }
            _ => {
                patch.append(index, VPatch::VText { prev: a.clone(), next: bt.clone() });
                apply_clear = true;
            }
        },
        VTree::Widget(bw) => {
            if !a.is_widget() {
                apply_clear = true;
            }
            patch.append(index, VPatch::Widget { prev: a.clone(), next: bw.clone() });
        }
        VTree::Thunk(_) => return thunks(a, Some(b), patch, index),
    }

    if apply_clear {
        clear_state(a, patch, index)?;
    }
    Ok(())
}

fn diff_children(an: &VNode, bn: &VNode, patch: &mut Patch, mut index: usize) -> Result<(), VdomError> {
    let parent_index = index;
    let (ordered, moves) = reorder(&an.children, &bn.children);
    let len = an.children.len().max(ordered.len());

    for i in 0..len {
        let left = an.children.get(i);
        let right = ordered.get(i).and_then(Option::as_ref);
        index += 1;

        match left {
            None => {
                if let Some(right) = right {
                    patch.append(parent_index, VPatch::Insert(right.clone()));
                }
            }
            Some(left) => walk(left, right, patch, index)?,
        }

        if let Some(left) = left {
            index += left.count();
        }
    }

    if let Some(moves) = moves {
        patch.append(parent_index, VPatch::Order(moves));
    }
    Ok(())
}

fn clear_state(v: &VTree, patch: &mut Patch, index: usize) -> Result<(), VdomError> {
    unhook(v, patch, index)?;
    destroy_widgets(v, patch, index)
}

// Widgets need a REMOVE record so the patcher can hand their DOM node to `destroy`.
fn destroy_widgets(v: &VTree, patch: &mut Patch, mut index: usize) -> Result<(), VdomError> {
    match v {
        VTree::Widget(w) => {
            if w.has_destroy() {
                patch.append(index, VPatch::Remove(v.clone()));
            }
        }
        VTree::Node(n) if n.has_widgets || n.has_thunks => {
            for child in &n.children {
                index += 1;
                destroy_widgets(child, patch, index)?;
                index += child.count();
            }
        }
        VTree::Thunk(_) => thunks(v, None, patch, index)?,
        _ => {}
    }
    Ok(())
}

fn unhook(v: &VTree, patch: &mut Patch, mut index: usize) -> Result<(), VdomError> {
    match v {
        VTree::Node(n) => {
            if let Some(hooks) = &n.hooks {
                let diff = hooks.keys().map(|k| (k.clone(), PropPatch::Remove)).collect();
                patch.append(index, VPatch::Props { node: v.clone(), diff });
            }
            if n.descendant_hooks || n.has_thunks {
                for child in &n.children {
                    index += 1;
                    unhook(child, patch, index)?;
                    index += child.count();
                }
            }
        }
        VTree::Thunk(_) => thunks(v, None, patch, index)?,
        _ => {}
    }
    Ok(())
}

// A thunk's rendered trees are diffed separately and patched as one unit.
fn thunks(a: &VTree, b: Option<&VTree>, patch: &mut Patch, index: usize) -> Result<(), VdomError> {
    let rendered_b = match b {
        Some(VTree::Thunk(t)) => Some(t.resolve(Some(a))?),
        Some(other) => Some(other.clone()),
        None => None,
    };
    let rendered_a = match a {
        VTree::Thunk(t) => t.resolve(None)?,
        other => other.clone(),
    };

    let sub = diff_opt(&rendered_a, rendered_b.as_ref())?;
    if !sub.is_empty() {
        patch.ops.insert(index, vec![VPatch::Thunk(sub)]);
    }
    Ok(())
}

/// Shallow property diff, recursing into nested maps. `None` means no change.
pub fn diff_props(a: &Props, b: &Props) -> Option<PropDiff> {
    let mut diff = PropDiff::new();

    for (key, av) in a {
        match b.get(key) {
            None => {
                diff.insert(key.clone(), PropPatch::Remove);
            }
            Some(bv) if av.same(bv) => {}
            Some(PropValue::Object(bo)) => {
                if let PropValue::Object(ao) = av {
                    if let Some(nested) = diff_props(ao, bo) {
                        diff.insert(key.clone(), PropPatch::Nested(nested));
                    }
                } else {
                    diff.insert(key.clone(), PropPatch::Set(PropValue::Object(bo.clone())));
                }
            }
            Some(bv) => {
                diff.insert(key.clone(), PropPatch::Set(bv.clone()));
            }
        }
    }

    for (key, bv) in b {
        if !a.contains_key(key) {
            diff.insert(key.clone(), PropPatch::Set(bv.clone()));
        }
    }

    (!diff.is_empty()).then_some(diff)
}

struct KeyIndex {
    keys: HashMap<String, usize>,
    free: Vec<usize>,
}

fn key_index(children: &[VTree]) -> KeyIndex {
    let mut keys = HashMap::new();
    let mut free = Vec::new();
    for (i, child) in children.iter().enumerate() {
        match child.key() {
            Some(k) => {
                keys.insert(k.to_string(), i);
            }
            None => free.push(i),
        }
    }
    KeyIndex { keys, free }
}

fn key_of(item: Option<&Option<VTree>>) -> Option<String> {
    item.and_then(Option::as_ref).and_then(|t| t.key().map(str::to_string))
}

fn take(simulate: &mut Vec<Option<VTree>>, index: usize, key: Option<String>) -> Remove {
    simulate.remove(index);
    Remove { from: index, key }
}

/// Lines the children of `b` up against those of `a`.
///
/// Keyed children follow their key; unkeyed ones fill the free slots of `a`
/// left to right. Returns the aligned list (`None` where an `a` child is
/// deleted) and the keyed moves needed to reach `b`'s order, if any.
pub fn reorder(a_children: &[VTree], b_children: &[VTree]) -> (Vec<Option<VTree>>, Option<Moves>) {
    let b_index = key_index(b_children);
    if b_index.free.len() == b_children.len() {
        return (b_children.iter().cloned().map(Some).collect(), None);
    }

    let a_index = key_index(a_children);
    if a_index.free.len() == a_children.len() {
        return (b_children.iter().cloned().map(Some).collect(), None);
    }

    let mut new_children: Vec<Option<VTree>> = Vec::with_capacity(a_children.len().max(b_children.len()));
    let mut free_index = 0;
    let free_count = b_index.free.len();
    let mut deleted_items = 0;

    for a_item in a_children {
        match a_item.key() {
            Some(k) => match b_index.keys.get(k) {
                Some(&i) => new_children.push(Some(b_children[i].clone())),
                None => {
                    deleted_items += 1;
                    new_children.push(None);
                }
            },
            None => {
                if free_index < free_count {
                    let i = b_index.free[free_index];
                    free_index += 1;
                    new_children.push(Some(b_children[i].clone()));
                } else {
                    deleted_items += 1;
                    new_children.push(None);
                }
            }
        }
    }

    let last_free_index = b_index.free.get(free_index).copied().unwrap_or(b_children.len());

    for (j, new_item) in b_children.iter().enumerate() {
        match new_item.key() {
            Some(k) => {
                if !a_index.keys.contains_key(k) {
                    new_children.push(Some(new_item.clone()));
                }
            }
            None => {
                if j >= last_free_index {
                    new_children.push(Some(new_item.clone()));
                }
            }
        }
    }

    let mut simulate = new_children.clone();
    let mut simulate_index = 0;
    let mut removes = Vec::new();
    let mut inserts = Vec::new();

    let mut k = 0;
    while k < b_children.len() {
        let wanted = &b_children[k];
        let wanted_key = wanted.key().map(str::to_string);

        while matches!(simulate.get(simulate_index), Some(None)) {
            removes.push(take(&mut simulate, simulate_index, None));
        }

        let item_present = matches!(simulate.get(simulate_index), Some(Some(_)));
        let item_key = key_of(simulate.get(simulate_index));

        if item_present && item_key == wanted_key {
            simulate_index += 1;
            k += 1;
            continue;
        }

        match (&wanted_key, item_key) {
            (Some(wk), Some(ik)) => {
                if b_index.keys.get(&ik) != Some(&(k + 1)) {
                    removes.push(take(&mut simulate, simulate_index, Some(ik)));
                    let now_present = matches!(simulate.get(simulate_index), Some(Some(_)));
                    if now_present && key_of(simulate.get(simulate_index)).as_ref() == Some(wk) {
                        simulate_index += 1;
                    } else {
                        inserts.push(Insert { key: wk.clone(), to: k });
                    }
                } else {
                    inserts.push(Insert { key: wk.clone(), to: k });
                }
                k += 1;
            }
            (Some(wk), None) => {
                inserts.push(Insert { key: wk.clone(), to: k });
                k += 1;
            }
            (None, Some(ik)) => {
                removes.push(take(&mut simulate, simulate_index, Some(ik)));
            }
            // Unkeyed wanted item with nothing left to match: the aligned
            // list always holds every child of `b`, so this cannot loop.
            (None, None) => break,
        }
    }

    while simulate_index < simulate.len() {
        let key = key_of(simulate.get(simulate_index));
        removes.push(take(&mut simulate, simulate_index, key));
    }

    if removes.len() == deleted_items && inserts.is_empty() {
        return (new_children, None);
    }

    (new_children, Some(Moves { removes, inserts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::{h, props};

    fn keyed(key: &str) -> VTree {
        h("li", props().key(key), key).unwrap()
    }

    fn keys(children: &[Option<VTree>]) -> Vec<Option<String>> {
        children.iter().map(|c| key_of(Some(c))).collect()
    }

    #[test]
    fn identical_tree_yields_empty_patch() {
        let a = h("div.a", props().attr("title", "x"), vec![h("span", props(), "hi").unwrap()]).unwrap();
        assert!(diff(&a, &a).unwrap().is_empty());
    }

    #[test]
    fn structurally_equal_trees_yield_empty_patch() {
        let make = || h("div.a", props().attr("title", "x"), vec![h("span", props(), "hi").unwrap()]).unwrap();
        assert!(diff(&make(), &make()).unwrap().is_empty());
    }

    #[test]
    fn text_change_targets_text_index() {
        let a = h("div", props(), vec![h("span", props(), "a").unwrap()]).unwrap();
        let b = h("div", props(), vec![h("span", props(), "b").unwrap()]).unwrap();
        let p = diff(&a, &b).unwrap();
        assert_eq!(p.indices(), vec![2]);
        assert!(matches!(p.get(2)[0], VPatch::VText { .. }));
    }

    #[test]
    fn tag_change_replaces_node() {
        let a = h("div", props(), vec![h("span", props(), "").unwrap()]).unwrap();
        let b = h("div", props(), vec![h("p", props(), "").unwrap()]).unwrap();
        let p = diff(&a, &b).unwrap();
        assert!(matches!(p.get(1)[0], VPatch::VNode { .. }));
    }

    #[test]
    fn removed_and_nested_props() {
        let a = h("div", props().attr("a", "1").attr("b", "2").style("width", "1px"), "").unwrap();
        let b = h("div", props().attr("a", "1").attr("c", "3"), "").unwrap();
        let VTree::Node(an) = &a else { unreachable!() };
        let VTree::Node(bn) = &b else { unreachable!() };
        let d = diff_props(&an.properties, &bn.properties).unwrap();
        let Some(PropPatch::Nested(attrs)) = d.get("attributes") else { panic!("{d:?}") };
        assert!(matches!(attrs.get("b"), Some(PropPatch::Remove)));
        assert!(matches!(attrs.get("c"), Some(PropPatch::Set(_))));
        assert!(!attrs.contains_key("a"));
        assert!(matches!(d.get("style"), Some(PropPatch::Remove)));
    }

    #[test]
    fn unkeyed_lists_need_no_moves() {
        let a = vec![VTree::text("a"), VTree::text("b")];
        let b = vec![VTree::text("b")];
        let (children, moves) = reorder(&a, &b);
        assert_eq!(children.len(), 1);
        assert!(moves.is_none());
    }

    #[test]
    fn swapping_two_keys() {
        let a = vec![keyed("a"), keyed("b")];
        let b = vec![keyed("b"), keyed("a")];
        let (children, moves) = reorder(&a, &b);
        assert_eq!(keys(&children), vec![Some("a".into()), Some("b".into())]);
        let moves = moves.unwrap();
        assert_eq!(moves.removes, vec![Remove { from: 1, key: Some("b".into()) }]);
        assert_eq!(moves.inserts, vec![Insert { key: "b".into(), to: 0 }]);
    }

    #[test]
    fn deleting_a_key_is_left_to_remove_patches() {
        let a = vec![keyed("a"), keyed("b"), keyed("c")];
        let b = vec![keyed("a"), keyed("c")];
        let (children, moves) = reorder(&a, &b);
        assert!(moves.is_none());
        assert_eq!(keys(&children), vec![Some("a".into()), None, Some("c".into())]);
    }

    #[test]
    fn new_keys_are_appended_then_moved() {
        let a = vec![keyed("a"), keyed("b")];
        let b = vec![keyed("c"), keyed("a"), keyed("b")];
        let (children, moves) = reorder(&a, &b);
        assert_eq!(keys(&children).len(), 3);
        let moves = moves.unwrap();
        assert_eq!(moves.inserts[0], Insert { key: "c".into(), to: 0 });
    }
}
