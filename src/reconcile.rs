//! # Reconciler
//!
//! Patches the live DOM from an old vnode tree to a new one.
//!
//! ## Rules
//!
//! 1. Different node types: the new node is created, inserted before the old
//!    one, and the old one removed. Children of a replaced node are not diffed.
//! 2. Same element tag: attributes are diffed by name, then children.
//! 3. Children match by `key` when keyed and by position among the unkeyed
//!    otherwise. Unmatched old children are removed, unmatched new children
//!    are created.
//! 4. A reused child stays put when it belongs to every longest run of
//!    reused children whose old order is preserved; the rest are re-inserted
//!    (moves). Insertions and removals move nothing, rotating a list by one
//!    moves one node, and swapping two keyed siblings moves both.
//! 5. Text nodes are updated in place.
//!
//! Reconciliation never fails. Shapes that cannot be applied (a vnode with
//! no place to go, a `Host` below the root) are skipped with a warning.

use markup5ever_rcdom::{Handle, NodeData};
use std::collections::HashMap;

use crate::dom::{comment_text, is_element, parent_of, same_node, Dom};
use crate::error::ReconcileError;
use crate::vdom::{Attrs, VNode, VNodeKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub removed: usize,
    pub moved: usize,
    pub replaced: usize,
}

/// Where a reconciled child has to go once all siblings are patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Keep,
    Move,
    Insert,
    /// Lives under another parent (projected into a slot); left where it is.
    Elsewhere,
}

pub struct Reconciler<'d> {
    dom: &'d mut Dom,
    stats: ReconcileStats,
}

impl<'d> Reconciler<'d> {
    pub fn new(dom: &'d mut Dom) -> Self {
        Reconciler {
            dom,
            stats: ReconcileStats::default(),
        }
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Bring `parent`'s rendering of `old` up to date with `new`. Returns the
    /// new tree bound to live nodes.
    pub fn reconcile(
        &mut self,
        old: Option<VNode>,
        new: Option<VNode>,
        parent: &Handle,
    ) -> Option<VNode> {
        let new = match new {
            Some(new) if new.kind == VNodeKind::Host => {
                return Some(self.render_host(parent, old, new));
            }
            other => other,
        };
        match (old, new) {
            (None, None) => None,
            (Some(old), None) => {
                self.remove_vnode(&old);
                None
            }
            (old, Some(new)) => match old {
                Some(old) if old.elm.is_some() => Some(self.patch(old, new)),
                _ => {
                    if !can_hold_children(parent) {
                        let tag = new.tag().unwrap_or("#text").to_string();
                        tracing::warn!(error = %ReconcileError::NoInsertionPoint { tag }, "skipping vnode");
                        return None;
                    }
                    let created = self.create(new)?;
                    if let Some(elm) = &created.elm {
                        self.dom.append(parent, elm);
                    }
                    Some(created)
                }
            },
        }
    }

    /// Render a component root into its host element. A root that is not a
    /// `Host` vnode is treated as the host's only child.
    pub fn render_host(&mut self, host_elm: &Handle, old: Option<VNode>, new: VNode) -> VNode {
        let new = match new.kind {
            VNodeKind::Host => new,
            _ => VNode {
                kind: VNodeKind::Host,
                attrs: Attrs::new(),
                children: vec![new],
                key: None,
                elm: None,
            },
        };
        if !is_element(host_elm) {
            tracing::warn!(error = %ReconcileError::HostNotElement, "skipping host render");
            return new;
        }

        let (old_attrs, old_children) = match old {
            Some(old) if old.kind == VNodeKind::Host => (old.attrs, old.children),
            Some(old) => (Attrs::new(), vec![old]),
            None => (Attrs::new(), Vec::new()),
        };
        self.update_attrs(host_elm, &old_attrs, &new.attrs);
        let children = self.update_children(host_elm, old_children, new.children);

        VNode {
            kind: VNodeKind::Host,
            attrs: new.attrs,
            children,
            key: None,
            elm: Some(host_elm.clone()),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Patching
    // ───────────────────────────────────────────────────────────────────────

    fn patch(&mut self, old: VNode, new: VNode) -> VNode {
        let Some(elm) = old.elm.clone() else {
            return self.create(new.clone()).unwrap_or(new);
        };

        if !old.same_node_type(&new) {
            return self.replace(&old, &elm, new);
        }

        let VNode {
            kind,
            attrs,
            children,
            key,
            ..
        } = new;

        let mut elm = elm;
        let mut bound_children = Vec::new();
        match &kind {
            VNodeKind::Text(value) => {
                if old.text() != Some(value.as_str()) {
                    self.dom.set_text(&elm, value);
                }
            }
            VNodeKind::Comment(value) => {
                if comment_text(&elm).as_deref() != Some(value.as_str()) {
                    elm = self.dom.set_comment(&elm, value);
                }
            }
            VNodeKind::Slot(_) => {}
            VNodeKind::Element(_) | VNodeKind::Host => {
                self.update_attrs(&elm, &old.attrs, &attrs);
                bound_children = self.update_children(&elm, old.children, children);
            }
        }

        VNode {
            kind,
            attrs,
            children: bound_children,
            key,
            elm: Some(elm),
        }
    }

    fn replace(&mut self, old: &VNode, old_elm: &Handle, new: VNode) -> VNode {
        let Some(created) = self.create(new.clone()) else {
            self.remove_vnode(old);
            return new;
        };
        if let (Some(parent), Some(new_elm)) = (parent_of(old_elm), &created.elm) {
            self.dom.insert_before(&parent, new_elm, Some(old_elm));
        }
        self.dom.remove(old_elm);
        self.stats.replaced += 1;
        created
    }

    fn update_attrs(&mut self, elm: &Handle, old: &Attrs, new: &Attrs) {
        for (name, value) in old {
            let still_rendered = new.get(name).and_then(|v| v.rendered()).is_some();
            if value.rendered().is_some() && !still_rendered {
                self.dom.remove_attribute(elm, name);
            }
        }
        for (name, value) in new {
            if let Some(rendered) = value.rendered() {
                if old.get(name).and_then(|v| v.rendered()) != Some(rendered) {
                    self.dom.set_attribute(elm, name, rendered);
                }
            }
        }
    }

    fn update_children(&mut self, parent: &Handle, old: Vec<VNode>, new: Vec<VNode>) -> Vec<VNode> {
        let mut keyed: HashMap<String, usize> = HashMap::new();
        let mut unkeyed = Vec::new();
        for (index, child) in old.iter().enumerate() {
            match &child.key {
                Some(key) => {
                    keyed.entry(key.clone()).or_insert(index);
                }
                None => unkeyed.push(index),
            }
        }

        let mut old_slots: Vec<Option<VNode>> = old.into_iter().map(Some).collect();
        let mut unkeyed = unkeyed.into_iter();
        let mut stale = Vec::new();
        let mut pairs: Vec<(VNode, Option<(usize, VNode)>)> = Vec::with_capacity(new.len());

        for child in new {
            let index = match &child.key {
                Some(key) => keyed.remove(key),
                None => unkeyed.next(),
            };
            let matched = index.and_then(|i| old_slots[i].take().map(|o| (i, o)));
            let matched = match matched {
                Some((_, o)) if child.key.is_some() && !o.same_node_type(&child) => {
                    stale.push(o);
                    None
                }
                Some((_, o)) if o.elm.is_none() => None,
                other => other,
            };
            pairs.push((child, matched));
        }

        for old_child in old_slots.into_iter().flatten().chain(stale) {
            self.remove_vnode(&old_child);
        }

        // Old positions of the reused children still under `parent`, in new order.
        let in_place: Vec<Option<usize>> = pairs
            .iter()
            .map(|(_, matched)| match matched {
                Some((index, o)) if o.elm.as_ref().map_or(false, |e| is_child_of(e, parent)) => {
                    Some(*index)
                }
                _ => None,
            })
            .collect();
        let order: Vec<usize> = in_place.iter().flatten().copied().collect();
        let mut stays = stable_positions(&order).into_iter();

        let mut results: Vec<(VNode, Placement)> = Vec::with_capacity(pairs.len());
        for ((child, matched), position) in pairs.into_iter().zip(in_place) {
            let (bound, placement) = match (matched, position) {
                (Some((_, old_child)), Some(_)) => {
                    let placement = if stays.next().unwrap_or(false) {
                        Placement::Keep
                    } else {
                        Placement::Move
                    };
                    (self.patch(old_child, child), placement)
                }
                (Some((_, old_child)), None) => (self.patch(old_child, child), Placement::Elsewhere),
                (None, _) => match self.create(child) {
                    Some(created) => (created, Placement::Insert),
                    None => continue,
                },
            };
            results.push((bound, placement));
        }

        let mut anchor: Option<Handle> = None;
        for (child, placement) in results.iter().rev() {
            let Some(elm) = &child.elm else {
                continue;
            };
            match placement {
                Placement::Elsewhere => continue,
                Placement::Keep => {}
                Placement::Move => {
                    self.dom.insert_before(parent, elm, anchor.as_ref());
                    self.stats.moved += 1;
                }
                Placement::Insert => self.dom.insert_before(parent, elm, anchor.as_ref()),
            }
            anchor = Some(elm.clone());
        }

        results.into_iter().map(|(child, _)| child).collect()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Creation / removal
    // ───────────────────────────────────────────────────────────────────────

    fn create(&mut self, vnode: VNode) -> Option<VNode> {
        let VNode {
            kind,
            attrs,
            children,
            key,
            ..
        } = vnode;

        let (elm, bound_children) = match &kind {
            VNodeKind::Element(tag) => {
                let elm = self.dom.create_element(tag);
                for (name, value) in &attrs {
                    if let Some(rendered) = value.rendered() {
                        self.dom.set_attribute(&elm, name, rendered);
                    }
                }
                let mut bound = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(created) = self.create(child) {
                        if let Some(child_elm) = &created.elm {
                            self.dom.append(&elm, child_elm);
                        }
                        bound.push(created);
                    }
                }
                (elm, bound)
            }
            VNodeKind::Text(value) => (self.dom.create_text(value), Vec::new()),
            VNodeKind::Comment(value) => (self.dom.create_comment(value), Vec::new()),
            VNodeKind::Slot(_) => (self.dom.create_comment(""), Vec::new()),
            VNodeKind::Host => {
                tracing::warn!("host vnode below a render root ignored");
                return None;
            }
        };
        self.stats.created += 1;

        Some(VNode {
            kind,
            attrs,
            children: bound_children,
            key,
            elm: Some(elm),
        })
    }

    fn remove_vnode(&mut self, vnode: &VNode) {
        if let Some(elm) = &vnode.elm {
            self.dom.remove(elm);
            self.stats.removed += 1;
        }
    }
}

/// For each entry of `order` (distinct old indices), whether it lies on every
/// longest increasing subsequence. Those entries are already in relative
/// order and never need to move.
fn stable_positions(order: &[usize]) -> Vec<bool> {
    let n = order.len();
    let mut ending = vec![0; n];
    let mut tails: Vec<usize> = Vec::new();
    for (i, &x) in order.iter().enumerate() {
        let pos = tails.partition_point(|&t| t < x);
        if pos == tails.len() {
            tails.push(x);
        } else {
            tails[pos] = x;
        }
        ending[i] = pos + 1;
    }
    let longest = tails.len();

    let mut starting = vec![0; n];
    tails.clear();
    for (i, &x) in order.iter().enumerate().rev() {
        let pos = tails.partition_point(|&t| t > x);
        if pos == tails.len() {
            tails.push(x);
        } else {
            tails[pos] = x;
        }
        starting[i] = pos + 1;
    }

    let on_longest: Vec<bool> = (0..n).map(|i| ending[i] + starting[i] - 1 == longest).collect();
    let mut per_level = vec![0usize; longest + 1];
    for i in (0..n).filter(|&i| on_longest[i]) {
        per_level[ending[i]] += 1;
    }
    (0..n).map(|i| on_longest[i] && per_level[ending[i]] == 1).collect()
}

fn is_child_of(node: &Handle, parent: &Handle) -> bool {
    parent_of(node).map_or(false, |p| same_node(&p, parent))
}

fn can_hold_children(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. } | NodeData::Document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{children, inner_html, text_content};
    use crate::vdom::{h, host, no_attrs, slot, text, AttrValue};

    fn keyed(key: &str, body: &str) -> VNode {
        h("div", vec![("key", key.into())], vec![text(body)])
    }

    fn list(items: &[&str]) -> VNode {
        h("section", no_attrs(), items.iter().map(|k| keyed(k, k)).collect::<Vec<_>>())
    }

    fn mount(dom: &mut Dom, vnode: VNode) -> VNode {
        let body = dom.body().unwrap();
        let bound = Reconciler::new(dom).reconcile(None, Some(vnode), &body).unwrap();
        dom.take_ops();
        bound
    }

    fn elm_for_key(tree: &VNode, key: &str) -> Handle {
        tree.children
            .iter()
            .find(|c| c.key.as_deref() == Some(key))
            .and_then(|c| c.elm.clone())
            .unwrap()
    }

    #[test]
    fn test_initial_render() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let tree = h(
            "div",
            vec![("class", "a".into()), ("hidden", AttrValue::Bool(false))],
            vec![text("hello"), h("b", no_attrs(), vec![text("!")])],
        );
        let mut reconciler = Reconciler::new(&mut dom);
        reconciler.reconcile(None, Some(tree), &body);
        assert_eq!(reconciler.stats().created, 4);
        assert_eq!(inner_html(&body).unwrap(), "<div class=\"a\">hello<b>!</b></div>");
    }

    #[test]
    fn test_attribute_change_keeps_identity() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, h("div", vec![("class", "a".into()), ("title", "t".into())], vec![text("x")]));
        let before = old.elm.clone().unwrap();

        let new = h("div", vec![("class", "b".into()), ("role", "note".into())], vec![text("x")]);
        let bound = Reconciler::new(&mut dom).reconcile(Some(old), Some(new), &body).unwrap();

        assert!(same_node(&before, bound.elm.as_ref().unwrap()));
        assert_eq!(dom.ops.created, 0);
        assert_eq!(inner_html(&body).unwrap(), "<div class=\"b\" role=\"note\">x</div>");
    }

    #[test]
    fn test_keyed_swap_moves_two_nodes() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, list(&["a", "b"]));
        let (a, b) = (elm_for_key(&old, "a"), elm_for_key(&old, "b"));

        let mut reconciler = Reconciler::new(&mut dom);
        let bound = reconciler.reconcile(Some(old), Some(list(&["b", "a"])), &body).unwrap();
        let stats = reconciler.stats();

        assert_eq!(stats.created, 0);
        assert_eq!(stats.moved, 2);
        assert_eq!(dom.ops.created, 0);
        assert_eq!(dom.ops.moved, 2);
        assert!(same_node(&a, &elm_for_key(&bound, "a")));
        assert!(same_node(&b, &elm_for_key(&bound, "b")));
        assert_eq!(
            inner_html(&body).unwrap(),
            "<section><div>b</div><div>a</div></section>"
        );
    }

    #[test]
    fn test_keyed_rotation_moves_one_node() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, list(&["a", "b", "c", "d", "e", "f"]));
        let b = elm_for_key(&old, "b");

        let mut reconciler = Reconciler::new(&mut dom);
        let bound = reconciler
            .reconcile(Some(old), Some(list(&["b", "c", "d", "e", "f", "a"])), &body)
            .unwrap();
        let stats = reconciler.stats();

        assert_eq!(stats.moved, 1);
        assert_eq!(stats.created, 0);
        assert_eq!(dom.ops.moved, 1);
        assert!(same_node(&b, &elm_for_key(&bound, "b")));
        assert_eq!(
            inner_html(&body).unwrap(),
            "<section><div>b</div><div>c</div><div>d</div><div>e</div><div>f</div><div>a</div></section>"
        );
    }

    #[test]
    fn test_stable_positions() {
        assert_eq!(stable_positions(&[0, 1, 2]), vec![true, true, true]);
        assert_eq!(stable_positions(&[1, 0]), vec![false, false]);
        assert_eq!(
            stable_positions(&[1, 2, 3, 4, 5, 0]),
            vec![true, true, true, true, true, false]
        );
        assert_eq!(stable_positions(&[0, 2, 1, 3]), vec![true, false, false, true]);
        assert!(stable_positions(&[]).is_empty());
    }

    #[test]
    fn test_keyed_shuffle_preserves_identity() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let keys = ["a", "b", "c", "d", "e"];
        let old = mount(&mut dom, list(&keys));
        let before: Vec<Handle> = keys.iter().map(|k| elm_for_key(&old, k)).collect();

        let shuffled = ["d", "a", "e", "c", "b"];
        let bound = Reconciler::new(&mut dom)
            .reconcile(Some(old), Some(list(&shuffled)), &body)
            .unwrap();

        assert_eq!(dom.ops.created, 0);
        assert_eq!(dom.ops.removed, 0);
        for (key, elm) in keys.iter().zip(&before) {
            assert!(same_node(elm, &elm_for_key(&bound, key)));
        }
        let section = bound.elm.unwrap();
        let order: Vec<String> = children(&section)
            .iter()
            .map(|c| text_content(&children(c)[0]).unwrap())
            .collect();
        assert_eq!(order, shuffled);
    }

    #[test]
    fn test_insert_and_remove_do_not_move() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, list(&["a", "c"]));

        let mut reconciler = Reconciler::new(&mut dom);
        let bound = reconciler.reconcile(Some(old), Some(list(&["a", "b", "c"])), &body);
        assert_eq!(reconciler.stats().moved, 0);
        assert_eq!(reconciler.stats().created, 2);
        assert_eq!(
            inner_html(&body).unwrap(),
            "<section><div>a</div><div>b</div><div>c</div></section>"
        );

        let mut reconciler = Reconciler::new(&mut dom);
        reconciler.reconcile(bound, Some(list(&["a", "c"])), &body);
        assert_eq!(reconciler.stats().moved, 0);
        assert_eq!(reconciler.stats().removed, 1);
        assert_eq!(inner_html(&body).unwrap(), "<section><div>a</div><div>c</div></section>");
    }

    #[test]
    fn test_tag_change_replaces_node() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, h("div", no_attrs(), vec![h("span", no_attrs(), vec![text("x")]), text("tail")]));

        let new = h("div", no_attrs(), vec![h("em", no_attrs(), vec![text("x")]), text("tail")]);
        let mut reconciler = Reconciler::new(&mut dom);
        reconciler.reconcile(Some(old), Some(new), &body);
        assert_eq!(reconciler.stats().replaced, 1);
        assert_eq!(inner_html(&body).unwrap(), "<div><em>x</em>tail</div>");
    }

    #[test]
    fn test_text_updates_in_place() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, h("p", no_attrs(), vec![text("0")]));
        let text_node = old.children[0].elm.clone().unwrap();

        let bound = Reconciler::new(&mut dom)
            .reconcile(Some(old), Some(h("p", no_attrs(), vec![text("1")])), &body)
            .unwrap();
        assert!(same_node(&text_node, bound.children[0].elm.as_ref().unwrap()));
        assert_eq!(dom.ops.text_writes, 1);
        assert_eq!(inner_html(&body).unwrap(), "<p>1</p>");
    }

    #[test]
    fn test_absent_children_are_removed() {
        let mut dom = Dom::parse("").unwrap();
        let body = dom.body().unwrap();
        let old = mount(&mut dom, h("ul", no_attrs(), vec![h("li", no_attrs(), vec![text("1")]), h("li", no_attrs(), vec![text("2")])]));

        let new = h("ul", no_attrs(), vec![Some(h("li", no_attrs(), vec![text("1")])), None]);
        Reconciler::new(&mut dom).reconcile(Some(old), Some(new), &body);
        assert_eq!(inner_html(&body).unwrap(), "<ul><li>1</li></ul>");

        let root = dom.query("ul").unwrap();
        let old = h("ul", no_attrs(), Vec::<VNode>::new());
        let old = VNode { elm: Some(root), ..old };
        Reconciler::new(&mut dom).reconcile(Some(old), None, &body);
        assert_eq!(inner_html(&body).unwrap(), "");
    }

    #[test]
    fn test_render_host_merges_attributes() {
        let mut dom = Dom::parse("<cmp-a class=\"outer\"></cmp-a>").unwrap();
        let host_elm = dom.query("cmp-a").unwrap();

        let first = host(vec![("role", "alert".into()), ("hidden", false.into())], vec![text("0")]);
        let bound = Reconciler::new(&mut dom).render_host(&host_elm, None, first);
        assert_eq!(
            crate::dom::outer_html(&host_elm).unwrap(),
            "<cmp-a class=\"outer\" role=\"alert\">0</cmp-a>"
        );

        let second = host(vec![("role", "alert".into()), ("hidden", true.into())], vec![text("1")]);
        Reconciler::new(&mut dom).render_host(&host_elm, Some(bound), second);
        assert_eq!(
            crate::dom::outer_html(&host_elm).unwrap(),
            "<cmp-a class=\"outer\" role=\"alert\" hidden=\"\">1</cmp-a>"
        );
    }

    #[test]
    fn test_slot_renders_as_comment() {
        let mut dom = Dom::parse("<cmp-a></cmp-a>").unwrap();
        let host_elm = dom.query("cmp-a").unwrap();
        let bound = Reconciler::new(&mut dom).render_host(
            &host_elm,
            None,
            h("div", no_attrs(), vec![slot("")]),
        );
        assert_eq!(bound.kind, VNodeKind::Host);
        assert_eq!(crate::dom::inner_html(&host_elm).unwrap(), "<div><!----></div>");
    }
}
