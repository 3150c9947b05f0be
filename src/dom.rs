//! # Live DOM
//!
//! A thin mutation layer over an `html5ever` / `markup5ever_rcdom` document.
//! Every structural write goes through [`Dom`] so that [`DomOps`] is an exact
//! journal of what a render cost.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tree_builder::{ElementFlags, TreeSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, QualName};
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use tendril::{StrTendril, TendrilSink};

use crate::error::DomError;

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
}

/// Counters for every DOM write, in the order the runtime performs them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomOps {
    pub created: usize,
    pub inserted: usize,
    /// Insertions of a node that already had a parent.
    pub moved: usize,
    pub removed: usize,
    pub attr_writes: usize,
    pub text_writes: usize,
}

pub struct Dom {
    sink: RcDom,
    pub ops: DomOps,
}

impl Dom {
    pub fn parse(html: &str) -> Result<Self, DomError> {
        let sink = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .map_err(DomError::Parse)?;
        Ok(Dom {
            sink,
            ops: DomOps::default(),
        })
    }

    pub fn body(&self) -> Result<Handle, DomError> {
        find_first(&self.sink.document, &|node| tag_name(node).as_deref() == Some("body"))
            .ok_or(DomError::MissingBody)
    }

    /// Every element with the given tag, in document order.
    pub fn query_all(&self, tag: &str) -> Vec<Handle> {
        let mut found = Vec::new();
        collect(&self.sink.document, &mut |node| {
            if tag_name(node).as_deref() == Some(tag) {
                found.push(node.clone());
            }
        });
        found
    }

    pub fn query(&self, tag: &str) -> Option<Handle> {
        find_first(&self.sink.document, &|node| tag_name(node).as_deref() == Some(tag))
    }

    /// Return the journal and start a fresh one.
    pub fn take_ops(&mut self) -> DomOps {
        std::mem::take(&mut self.ops)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Node creation
    // ───────────────────────────────────────────────────────────────────────

    pub fn create_element(&mut self, tag: &str) -> Handle {
        self.ops.created += 1;
        let name = QualName::new(None, Namespace::from(HTML_NS), LocalName::from(tag));
        self.sink.create_element(name, Vec::new(), ElementFlags::default())
    }

    pub fn create_text(&mut self, text: &str) -> Handle {
        self.ops.created += 1;
        Node::new(NodeData::Text {
            contents: RefCell::new(StrTendril::from(text)),
        })
    }

    pub fn create_comment(&mut self, text: &str) -> Handle {
        self.ops.created += 1;
        self.sink.create_comment(StrTendril::from(text))
    }

    // ───────────────────────────────────────────────────────────────────────
    // Tree mutation
    // ───────────────────────────────────────────────────────────────────────

    /// Insert `child` into `parent` before `reference`, or append when
    /// `reference` is `None` or not a child of `parent`.
    pub fn insert_before(&mut self, parent: &Handle, child: &Handle, reference: Option<&Handle>) {
        if reference.map_or(false, |r| Rc::ptr_eq(r, child)) {
            return;
        }
        if parent_of(child).is_some() {
            self.ops.moved += 1;
            detach(child);
        }
        self.ops.inserted += 1;

        let mut siblings = parent.children.borrow_mut();
        let index = reference
            .and_then(|r| siblings.iter().position(|c| Rc::ptr_eq(c, r)))
            .unwrap_or(siblings.len());
        siblings.insert(index, child.clone());
        child.parent.set(Some(Rc::downgrade(parent)));
    }

    pub fn append(&mut self, parent: &Handle, child: &Handle) {
        self.insert_before(parent, child, None);
    }

    pub fn remove(&mut self, node: &Handle) {
        if parent_of(node).is_some() {
            self.ops.removed += 1;
            detach(node);
        }
    }

    pub fn set_attribute(&mut self, elm: &Handle, name: &str, value: &str) {
        let NodeData::Element { attrs, .. } = &elm.data else {
            return;
        };
        self.ops.attr_writes += 1;
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|a| &*a.name.local == name) {
            Some(existing) => existing.value = StrTendril::from(value),
            None => attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
                value: StrTendril::from(value),
            }),
        }
    }

    pub fn remove_attribute(&mut self, elm: &Handle, name: &str) {
        let NodeData::Element { attrs, .. } = &elm.data else {
            return;
        };
        let mut attrs = attrs.borrow_mut();
        let before = attrs.len();
        attrs.retain(|a| &*a.name.local != name);
        if attrs.len() != before {
            self.ops.attr_writes += 1;
        }
    }

    pub fn set_text(&mut self, node: &Handle, text: &str) {
        if let NodeData::Text { contents } = &node.data {
            self.ops.text_writes += 1;
            *contents.borrow_mut() = StrTendril::from(text);
        }
    }

    /// Comment text is immutable in the tree, so the node is swapped for a new
    /// one carrying `text`. Returns the node now in the document.
    pub fn set_comment(&mut self, node: &Handle, text: &str) -> Handle {
        if comment_text(node).as_deref() == Some(text) {
            return node.clone();
        }
        let replacement = self.sink.create_comment(StrTendril::from(text));
        self.ops.text_writes += 1;
        if let Some(parent) = parent_of(node) {
            let mut siblings = parent.children.borrow_mut();
            if let Some(index) = siblings.iter().position(|c| Rc::ptr_eq(c, node)) {
                siblings[index] = replacement.clone();
                replacement.parent.set(Some(Rc::downgrade(&parent)));
                node.parent.set(None);
            }
        }
        replacement
    }

    // ───────────────────────────────────────────────────────────────────────
    // Serialization
    // ───────────────────────────────────────────────────────────────────────

    pub fn to_html(&self) -> Result<String, DomError> {
        inner_html(&self.sink.document)
    }
}

pub fn inner_html(node: &Handle) -> Result<String, DomError> {
    serialize_node(node, TraversalScope::ChildrenOnly(None))
}

pub fn outer_html(node: &Handle) -> Result<String, DomError> {
    serialize_node(node, TraversalScope::IncludeNode)
}

/// Markup with every comment dropped, the way rendered output is compared.
pub fn strip_comments(html: &str) -> String {
    COMMENT_RE.replace_all(html, "").into_owned()
}

fn serialize_node(node: &Handle, traversal_scope: TraversalScope) -> Result<String, DomError> {
    let mut buf = Vec::new();
    let handle = SerializableHandle::from(node.clone());
    serialize(
        &mut buf,
        &handle,
        SerializeOpts {
            traversal_scope,
            ..Default::default()
        },
    )
    .map_err(DomError::Serialize)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ═══════════════════════════════════════════════════════════════════════════════
// READ HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

/// Whether `node` is still reachable from the document root.
pub fn is_connected(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if matches!(current.data, NodeData::Document) {
            return true;
        }
        match parent_of(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

fn detach(node: &Handle) {
    if let Some(parent) = node.parent.take().and_then(|w| w.upgrade()) {
        parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, node));
    }
}

pub fn next_sibling(node: &Handle) -> Option<Handle> {
    let parent = parent_of(node)?;
    let siblings = parent.children.borrow();
    let index = siblings.iter().position(|c| Rc::ptr_eq(c, node))?;
    siblings.get(index + 1).cloned()
}

pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

pub fn get_attribute(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

pub fn text_content(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

pub fn comment_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Comment { contents } => Some(contents.to_string()),
        _ => None,
    }
}

pub fn same_node(a: &Handle, b: &Handle) -> bool {
    Rc::ptr_eq(a, b)
}

fn collect(node: &Handle, f: &mut impl FnMut(&Handle)) {
    f(node);
    for child in node.children.borrow().iter() {
        collect(child, f);
    }
}

fn find_first(node: &Handle, pred: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    if pred(node) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_first(child, pred))
}

/// Node identity as a map key, for side tables keyed by live node.
#[derive(Clone)]
pub struct NodeRef(pub Handle);

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl From<&Handle> for NodeRef {
    fn from(handle: &Handle) -> Self {
        NodeRef(handle.clone())
    }
}
