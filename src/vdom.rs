//! # Virtual Nodes
//!
//! Render functions describe their output as a tree of [`VNode`]s built with
//! [`h`], [`text`], [`comment`], [`host`] and [`slot`]. A tree is never mutated
//! after it is built; the reconciler returns a copy with `elm` bound to the
//! live nodes.

use markup5ever_rcdom::Handle;
use std::collections::BTreeMap;
use std::fmt;

pub const KEY_ATTR: &str = "key";

/// Attribute value as written by a render function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    /// `true` renders as an empty attribute, `false` renders nothing.
    Bool(bool),
    Null,
}

impl AttrValue {
    /// The DOM attribute value, or `None` when no attribute should exist.
    pub fn rendered(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Bool(true) => Some(""),
            AttrValue::Bool(false) | AttrValue::Null => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

pub type Attrs = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VNodeKind {
    Element(String),
    Text(String),
    Comment(String),
    /// The component's own host element.
    Host,
    /// Named insertion point for light DOM content; `""` is the default slot.
    Slot(String),
}

#[derive(Clone)]
pub struct VNode {
    pub kind: VNodeKind,
    pub attrs: Attrs,
    pub children: Vec<VNode>,
    pub key: Option<String>,
    /// Live node this vnode was last rendered into.
    pub elm: Option<Handle>,
}

impl VNode {
    fn leaf(kind: VNodeKind) -> Self {
        VNode {
            kind,
            attrs: Attrs::new(),
            children: Vec::new(),
            key: None,
            elm: None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            VNodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            VNodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether `other` can be patched into this vnode's live node.
    pub fn same_node_type(&self, other: &VNode) -> bool {
        match (&self.kind, &other.kind) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Text(_), VNodeKind::Text(_)) => true,
            (VNodeKind::Comment(_), VNodeKind::Comment(_)) => true,
            (VNodeKind::Host, VNodeKind::Host) => true,
            (VNodeKind::Slot(a), VNodeKind::Slot(b)) => a == b,
            _ => false,
        }
    }

    /// Depth-first walk over this node and all descendants.
    pub fn walk<'v>(&'v self, f: &mut impl FnMut(&'v VNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

impl PartialEq for VNode {
    // Live node bindings are not part of a vnode's value.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.attrs == other.attrs
            && self.children == other.children
            && self.key == other.key
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("kind", &self.kind)
            .field("attrs", &self.attrs)
            .field("children", &self.children)
            .field("key", &self.key)
            .field("bound", &self.elm.is_some())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDERS
// ═══════════════════════════════════════════════════════════════════════════════

fn build_attrs<K: Into<String>>(attrs: Vec<(K, AttrValue)>) -> (Attrs, Option<String>) {
    let mut map = Attrs::new();
    let mut key = None;
    for (name, value) in attrs {
        let name = name.into();
        if name == KEY_ATTR {
            if let AttrValue::Text(k) = value {
                key = Some(k);
            }
            continue;
        }
        map.insert(name, value);
    }
    (map, key)
}

/// Drop absent children and merge adjacent text.
fn normalize_children<I, C>(children: I) -> Vec<VNode>
where
    I: IntoIterator<Item = C>,
    C: Into<Option<VNode>>,
{
    let mut out: Vec<VNode> = Vec::new();
    for child in children.into_iter().filter_map(|c| -> Option<VNode> { c.into() }) {
        if let VNodeKind::Text(next) = &child.kind {
            if let Some(VNodeKind::Text(prev)) = out.last_mut().map(|last| &mut last.kind) {
                prev.push_str(next);
                continue;
            }
        }
        out.push(child);
    }
    out
}

/// Build an element vnode. A `key` attribute becomes the vnode key.
pub fn h<K, I, C>(tag: &str, attrs: Vec<(K, AttrValue)>, children: I) -> VNode
where
    K: Into<String>,
    I: IntoIterator<Item = C>,
    C: Into<Option<VNode>>,
{
    let (attrs, key) = build_attrs(attrs);
    VNode {
        kind: VNodeKind::Element(tag.to_string()),
        attrs,
        children: normalize_children(children),
        key,
        elm: None,
    }
}

pub fn text(value: impl Into<String>) -> VNode {
    VNode::leaf(VNodeKind::Text(value.into()))
}

pub fn comment(value: impl Into<String>) -> VNode {
    VNode::leaf(VNodeKind::Comment(value.into()))
}

/// The component root. Its attributes are merged onto the host element.
pub fn host<K, I, C>(attrs: Vec<(K, AttrValue)>, children: I) -> VNode
where
    K: Into<String>,
    I: IntoIterator<Item = C>,
    C: Into<Option<VNode>>,
{
    let (attrs, _) = build_attrs(attrs);
    VNode {
        kind: VNodeKind::Host,
        attrs,
        children: normalize_children(children),
        key: None,
        elm: None,
    }
}

pub fn slot(name: &str) -> VNode {
    VNode::leaf(VNodeKind::Slot(name.to_string()))
}

/// No attributes; saves a turbofish at call sites.
pub fn no_attrs() -> Vec<(&'static str, AttrValue)> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_lifted() {
        let node = h("div", vec![("key", "a".into()), ("class", "x".into())], vec![text("1")]);
        assert_eq!(node.key.as_deref(), Some("a"));
        assert!(!node.attrs.contains_key("key"));
        assert_eq!(node.attrs.get("class"), Some(&AttrValue::from("x")));
    }

    #[test]
    fn test_absent_children_are_dropped_and_text_merged() {
        let node = h(
            "p",
            no_attrs(),
            vec![Some(text("a")), None, Some(text("b")), Some(h("b", no_attrs(), Vec::<VNode>::new())), Some(text("c"))],
        );
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[0].text(), Some("ab"));
        assert_eq!(node.children[2].text(), Some("c"));
    }

    #[test]
    fn test_attr_rendering() {
        assert_eq!(AttrValue::from(true).rendered(), Some(""));
        assert_eq!(AttrValue::from(false).rendered(), None);
        assert_eq!(AttrValue::from(None::<&str>).rendered(), None);
        assert_eq!(AttrValue::from(Some("true")).rendered(), Some("true"));
    }

    #[test]
    fn test_same_node_type() {
        let a = h("div", no_attrs(), Vec::<VNode>::new());
        let b = h("span", no_attrs(), Vec::<VNode>::new());
        assert!(a.same_node_type(&a.clone()));
        assert!(!a.same_node_type(&b));
        assert!(text("x").same_node_type(&text("y")));
        assert!(!slot("a").same_node_type(&slot("b")));
    }
}
