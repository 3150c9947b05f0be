//! # Component Runtime
//!
//! Connects host elements to component definitions and keeps them rendered.
//!
//! Per-node bookkeeping lives in side tables keyed by node identity rather
//! than on the nodes themselves:
//!
//! - [`HostRegistry`]: host element → [`HostRef`] (props, last vnode, content
//!   reference comment).
//! - [`NodeTable`]: original-location comment → the light DOM node that slot
//!   projection moved away from it.
//!
//! Every component renders into its host's light DOM. Shadow encapsulation
//! only changes the hydration metadata (`s-hn`), the way server rendering
//! treats it.

use markup5ever_rcdom::Handle;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::annotate::{annotate, AnnotationReport};
use crate::descriptor::{extract_descriptor, ComponentConfig, ComponentDescriptor, Encapsulation};
use crate::dom::{
    children, get_attribute, inner_html, is_connected, next_sibling, parent_of, tag_name, Dom, NodeRef,
};
use crate::error::{InvalidComponentConfig, RuntimeError};
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::vdom::{VNode, VNodeKind};

pub const SLOT_ATTR: &str = "slot";

pub type Props = Map<String, Value>;

type RenderFn = Rc<dyn Fn(&Props) -> VNode>;

/// A component: its descriptor plus the render function.
#[derive(Clone)]
pub struct ComponentDefinition {
    pub descriptor: ComponentDescriptor,
    render: RenderFn,
}

impl ComponentDefinition {
    pub fn new<F>(descriptor: ComponentDescriptor, render: F) -> Self
    where
        F: Fn(&Props) -> VNode + 'static,
    {
        ComponentDefinition {
            descriptor,
            render: Rc::new(render),
        }
    }

    pub fn from_config<F>(config: &ComponentConfig, render: F) -> Result<Self, InvalidComponentConfig>
    where
        F: Fn(&Props) -> VNode + 'static,
    {
        Ok(Self::new(extract_descriptor(config)?, render))
    }

    pub fn tag(&self) -> &str {
        &self.descriptor.tag
    }

    pub fn render(&self, props: &Props) -> VNode {
        (self.render)(props)
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIDE TABLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Runtime state of one connected host element.
#[derive(Debug)]
pub struct HostRef {
    pub tag: String,
    pub encapsulation: Encapsulation,
    pub props: Props,
    /// Tree of the last render, bound to live nodes.
    pub vnode: Option<VNode>,
    /// Comment marking where the host's own content starts.
    pub content_ref: Option<Handle>,
    pub renders: usize,
    /// A render is queued and has not run yet.
    pub update_queued: bool,
}

#[derive(Default)]
pub struct HostRegistry {
    hosts: HashMap<NodeRef, HostRef>,
}

impl HostRegistry {
    pub fn get(&self, elm: &Handle) -> Option<&HostRef> {
        self.hosts.get(&NodeRef::from(elm))
    }

    pub fn get_mut(&mut self, elm: &Handle) -> Option<&mut HostRef> {
        self.hosts.get_mut(&NodeRef::from(elm))
    }

    pub fn contains(&self, elm: &Handle) -> bool {
        self.hosts.contains_key(&NodeRef::from(elm))
    }

    pub fn insert(&mut self, elm: &Handle, host: HostRef) {
        self.hosts.insert(NodeRef::from(elm), host);
    }

    /// Drop hosts whose element left the document. Returns how many went.
    pub fn prune_disconnected(&mut self) -> usize {
        let before = self.hosts.len();
        self.hosts.retain(|elm, _| is_connected(&elm.0));
        before - self.hosts.len()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[derive(Default)]
pub struct NodeTable {
    relocations: HashMap<NodeRef, Handle>,
}

impl NodeTable {
    pub fn record_relocation(&mut self, origin: &Handle, node: &Handle) {
        self.relocations.insert(NodeRef::from(origin), node.clone());
    }

    /// The node that was moved away from `origin`, if `origin` is an
    /// original-location comment.
    pub fn relocated_node(&self, origin: &Handle) -> Option<&Handle> {
        self.relocations.get(&NodeRef::from(origin))
    }

    pub fn is_original_location(&self, node: &Handle) -> bool {
        self.relocations.contains_key(&NodeRef::from(node))
    }

    /// Follow an original-location comment that was replaced in the document.
    pub fn rebind_origin(&mut self, old: &Handle, new: &Handle) {
        if let Some(node) = self.relocations.remove(&NodeRef::from(old)) {
            self.relocations.insert(NodeRef::from(new), node);
        }
    }

    /// Forget relocations whose origin comment left the document.
    pub fn prune_disconnected(&mut self) -> usize {
        let before = self.relocations.len();
        self.relocations.retain(|origin, _| is_connected(&origin.0));
        before - self.relocations.len()
    }

    pub fn len(&self) -> usize {
        self.relocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relocations.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone)]
pub struct RenderOutcome {
    pub stats: ReconcileStats,
    /// Light DOM nodes projected into slots on this render.
    pub relocated: usize,
    /// Hosts that this render removed from the document.
    pub disconnected: usize,
    /// Unconnected component hosts found in the rendered output.
    pub discovered: Vec<Handle>,
}

pub struct Runtime {
    dom: Dom,
    components: HashMap<String, ComponentDefinition>,
    declared: HashSet<String>,
    hosts: HostRegistry,
    nodes: NodeTable,
}

impl Runtime {
    pub fn new(dom: Dom) -> Self {
        Runtime {
            dom,
            components: HashMap::new(),
            declared: HashSet::new(),
            hosts: HostRegistry::default(),
            nodes: NodeTable::default(),
        }
    }

    pub fn from_html(html: &str) -> Result<Self, RuntimeError> {
        Ok(Self::new(Dom::parse(html)?))
    }

    /// Announce a component tag whose definition is loaded later.
    pub fn declare(&mut self, tag: &str) {
        self.declared.insert(tag.to_string());
    }

    pub fn define(&mut self, definition: ComponentDefinition) {
        self.declared.insert(definition.tag().to_string());
        self.components
            .insert(definition.tag().to_string(), definition);
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.components.contains_key(tag)
    }

    pub fn is_component(&self, tag: &str) -> bool {
        self.declared.contains(tag)
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Unconnected component hosts in the document body, in document order.
    pub fn pending_hosts(&self) -> Result<Vec<Handle>, RuntimeError> {
        let body = self.dom.body()?;
        Ok(self.pending_hosts_in(&body))
    }

    fn pending_hosts_in(&self, root: &Handle) -> Vec<Handle> {
        let mut found = Vec::new();
        let mut stack: Vec<Handle> = children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if let Some(tag) = tag_name(&node) {
                if self.is_component(&tag) && !self.hosts.contains(&node) {
                    found.push(node.clone());
                }
            }
            stack.extend(children(&node).into_iter().rev());
        }
        found
    }

    /// Register `elm` as a host. Initial props are its attributes. Returns
    /// `false` if it was already connected.
    pub fn connect(&mut self, elm: &Handle) -> Result<bool, RuntimeError> {
        if self.hosts.contains(elm) {
            return Ok(false);
        }
        let tag = tag_name(elm).unwrap_or_default();
        if !self.is_component(&tag) {
            return Err(RuntimeError::UnknownComponent(tag));
        }

        let mut props = Props::new();
        if let markup5ever_rcdom::NodeData::Element { attrs, .. } = &elm.data {
            for attr in attrs.borrow().iter() {
                props.insert(attr.name.local.to_string(), Value::String(attr.value.to_string()));
            }
        }
        let encapsulation = self
            .components
            .get(&tag)
            .map(|d| d.descriptor.encapsulation)
            .unwrap_or_default();

        tracing::debug!(tag = %tag, "host connected");
        self.hosts.insert(
            elm,
            HostRef {
                tag,
                encapsulation,
                props,
                vnode: None,
                content_ref: None,
                renders: 0,
                update_queued: false,
            },
        );
        Ok(true)
    }

    /// Render (or re-render) a connected host.
    pub fn render(&mut self, elm: &Handle) -> Result<RenderOutcome, RuntimeError> {
        let host = self
            .hosts
            .get_mut(elm)
            .ok_or_else(|| RuntimeError::NotConnected(tag_name(elm).unwrap_or_default()))?;
        let definition = self
            .components
            .get(&host.tag)
            .ok_or_else(|| RuntimeError::UnknownComponent(host.tag.clone()))?;

        host.encapsulation = definition.descriptor.encapsulation;
        let vnode = definition.render(&host.props);
        let old = host.vnode.take();
        let first_render = host.renders == 0;

        let mut light = Vec::new();
        if first_render {
            light = children(elm);
            let content_ref = self.dom.create_comment("");
            self.dom.insert_before(elm, &content_ref, light.first());
            host.content_ref = Some(content_ref);
        }

        let mut reconciler = Reconciler::new(&mut self.dom);
        let bound = reconciler.render_host(elm, old, vnode);
        let stats = reconciler.stats();

        let relocated = if first_render {
            self.relocate_light_children(&bound, light)
        } else {
            0
        };

        if let Some(host) = self.hosts.get_mut(elm) {
            host.vnode = Some(bound);
            host.renders += 1;
            host.update_queued = false;
        }

        let disconnected = self.prune_disconnected();

        Ok(RenderOutcome {
            stats,
            relocated,
            disconnected,
            discovered: self.pending_hosts_in(elm),
        })
    }

    /// Update one prop. Returns whether the value changed.
    pub fn set_prop(&mut self, elm: &Handle, name: &str, value: Value) -> Result<bool, RuntimeError> {
        let host = self
            .hosts
            .get_mut(elm)
            .ok_or_else(|| RuntimeError::NotConnected(tag_name(elm).unwrap_or_default()))?;
        if host.props.get(name) == Some(&value) {
            return Ok(false);
        }
        host.props.insert(name.to_string(), value);
        Ok(true)
    }

    /// Mark a host as needing a render. Returns `false` when one is already
    /// queued, so repeated prop writes coalesce into a single render.
    pub fn request_update(&mut self, elm: &Handle) -> bool {
        match self.hosts.get_mut(elm) {
            Some(host) if !host.update_queued => {
                host.update_queued = true;
                true
            }
            _ => false,
        }
    }

    /// Forget every host and relocation that is no longer in the document.
    fn prune_disconnected(&mut self) -> usize {
        let hosts = self.hosts.prune_disconnected();
        let origins = self.nodes.prune_disconnected();
        if hosts > 0 || origins > 0 {
            tracing::debug!(hosts, origins, "disconnected nodes pruned");
        }
        hosts
    }

    /// Stamp hydration markers and serialize the body.
    pub fn hydration_html(&mut self) -> Result<(String, AnnotationReport), RuntimeError> {
        let report = annotate(&mut self.dom, &mut self.hosts, &mut self.nodes)?;
        let body = self.dom.body()?;
        Ok((inner_html(&body)?, report))
    }

    /// Move the host's original light DOM children next to the slot they
    /// target. Each moved node leaves an original-location comment behind.
    /// Children without a matching slot are dropped.
    fn relocate_light_children(&mut self, bound: &VNode, light: Vec<Handle>) -> usize {
        let mut slots: Vec<(String, Handle)> = Vec::new();
        bound.walk(&mut |vnode| {
            if let (VNodeKind::Slot(name), Some(elm)) = (&vnode.kind, &vnode.elm) {
                if !slots.iter().any(|(n, _)| n == name) {
                    slots.push((name.clone(), elm.clone()));
                }
            }
        });

        let mut last_in_slot: HashMap<String, Handle> = HashMap::new();
        let mut relocated = 0;
        for node in light {
            let name = get_attribute(&node, SLOT_ATTR).unwrap_or_default();
            let target = slots
                .iter()
                .find(|(slot_name, _)| *slot_name == name)
                .and_then(|(_, slot_ref)| parent_of(slot_ref).map(|p| (p, slot_ref.clone())));
            let Some((slot_parent, slot_ref)) = target else {
                tracing::debug!(slot = %name, "no slot for light DOM node, dropping it");
                self.dom.remove(&node);
                continue;
            };

            let origin = self.dom.create_comment("");
            if let Some(parent) = parent_of(&node) {
                self.dom.insert_before(&parent, &origin, Some(&node));
            }
            let after = last_in_slot.get(&name).cloned().unwrap_or(slot_ref);
            let reference = next_sibling(&after);
            self.dom.insert_before(&slot_parent, &node, reference.as_ref());
            self.nodes.record_relocation(&origin, &node);
            last_in_slot.insert(name, node);
            relocated += 1;
        }
        relocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{outer_html, strip_comments};
    use crate::vdom::{h, host, no_attrs, slot, text};
    use serde_json::json;

    fn counter() -> ComponentDefinition {
        ComponentDefinition::from_config(&ComponentConfig::new("cmp-counter"), |props| {
            let count = props.get("count").and_then(Value::as_i64).unwrap_or(0);
            host(no_attrs(), vec![h("span", no_attrs(), vec![text(count.to_string())])])
        })
        .unwrap()
    }

    #[test]
    fn test_connect_render_and_rerender() {
        let mut runtime = Runtime::from_html("<cmp-counter></cmp-counter>").unwrap();
        runtime.define(counter());
        let pending = runtime.pending_hosts().unwrap();
        assert_eq!(pending.len(), 1);
        let elm = pending[0].clone();

        assert!(runtime.connect(&elm).unwrap());
        assert!(!runtime.connect(&elm).unwrap());
        runtime.render(&elm).unwrap();
        assert_eq!(
            outer_html(&elm).unwrap(),
            "<cmp-counter><!----><span>0</span></cmp-counter>"
        );
        let span = runtime.dom().query("span").unwrap();

        assert!(runtime.set_prop(&elm, "count", json!(5)).unwrap());
        assert!(!runtime.set_prop(&elm, "count", json!(5)).unwrap());
        let outcome = runtime.render(&elm).unwrap();
        assert_eq!(outcome.stats.created, 0);
        assert!(crate::dom::same_node(&span, &runtime.dom().query("span").unwrap()));
        assert_eq!(
            strip_comments(&outer_html(&elm).unwrap()),
            "<cmp-counter><span>5</span></cmp-counter>"
        );
    }

    #[test]
    fn test_unknown_component() {
        let mut runtime = Runtime::from_html("<cmp-x></cmp-x>").unwrap();
        let elm = runtime.dom().query("cmp-x").unwrap();
        assert!(matches!(
            runtime.connect(&elm),
            Err(RuntimeError::UnknownComponent(tag)) if tag == "cmp-x"
        ));
        runtime.declare("cmp-x");
        runtime.connect(&elm).unwrap();
        assert!(matches!(runtime.render(&elm), Err(RuntimeError::UnknownComponent(_))));
    }

    #[test]
    fn test_slot_projection_leaves_origin_markers() {
        let card = ComponentDefinition::new(ComponentDescriptor::new("cmp-card"), |_| {
            host(
                no_attrs(),
                vec![
                    h("header", no_attrs(), vec![slot("title")]),
                    h("main", no_attrs(), vec![slot("")]),
                ],
            )
        });
        let mut runtime =
            Runtime::from_html("<cmp-card><b slot=\"title\">T</b>body<i>!</i><u slot=\"none\">x</u></cmp-card>")
                .unwrap();
        runtime.define(card);
        let elm = runtime.dom().query("cmp-card").unwrap();
        runtime.connect(&elm).unwrap();
        let outcome = runtime.render(&elm).unwrap();

        assert_eq!(outcome.relocated, 3);
        assert_eq!(runtime.nodes().len(), 3);
        assert_eq!(
            strip_comments(&outer_html(&elm).unwrap()),
            "<cmp-card><header><b slot=\"title\">T</b></header><main>body<i>!</i></main></cmp-card>"
        );
        // content ref, three origin markers, then the rendered tree
        assert_eq!(
            outer_html(&elm).unwrap(),
            "<cmp-card><!----><!----><!----><!----><header><!----><b slot=\"title\">T</b></header><main><!---->body<i>!</i></main></cmp-card>"
        );
    }

    #[test]
    fn test_unmounted_host_is_disconnected() {
        let outer = ComponentDefinition::new(ComponentDescriptor::new("cmp-out"), |props| {
            let show = props.get("show").and_then(Value::as_bool).unwrap_or(false);
            let inner = show.then(|| h("cmp-in", no_attrs(), vec![h("b", no_attrs(), vec![text("x")])]));
            host(no_attrs(), vec![inner])
        });
        let inner = ComponentDefinition::new(ComponentDescriptor::new("cmp-in"), |_| {
            host(no_attrs(), vec![h("div", no_attrs(), vec![slot("")])])
        });
        let mut runtime = Runtime::from_html("<cmp-out></cmp-out>").unwrap();
        runtime.define(outer);
        runtime.define(inner);
        let elm = runtime.dom().query("cmp-out").unwrap();
        runtime.connect(&elm).unwrap();
        runtime.render(&elm).unwrap();

        for _ in 0..3 {
            runtime.set_prop(&elm, "show", json!(true)).unwrap();
            let outcome = runtime.render(&elm).unwrap();
            assert_eq!(outcome.discovered.len(), 1);
            let child = outcome.discovered[0].clone();
            runtime.connect(&child).unwrap();
            assert_eq!(runtime.render(&child).unwrap().relocated, 1);
            assert_eq!(runtime.hosts().len(), 2);
            assert_eq!(runtime.nodes().len(), 1);

            runtime.set_prop(&elm, "show", json!(false)).unwrap();
            let outcome = runtime.render(&elm).unwrap();
            assert_eq!(outcome.disconnected, 1);
            assert_eq!(runtime.hosts().len(), 1);
            assert!(runtime.nodes().is_empty());
            assert!(!runtime.hosts().contains(&child));
        }
        assert_eq!(strip_comments(&outer_html(&elm).unwrap()), "<cmp-out></cmp-out>");
    }

    #[test]
    fn test_nested_hosts_are_discovered() {
        let outer = ComponentDefinition::new(ComponentDescriptor::new("cmp-outer"), |_| {
            host(no_attrs(), vec![h("cmp-counter", vec![("count", "2".into())], Vec::<VNode>::new())])
        });
        let mut runtime = Runtime::from_html("<cmp-outer></cmp-outer>").unwrap();
        runtime.define(outer);
        runtime.define(counter());
        let elm = runtime.dom().query("cmp-outer").unwrap();
        runtime.connect(&elm).unwrap();
        let outcome = runtime.render(&elm).unwrap();
        assert_eq!(outcome.discovered.len(), 1);
        assert_eq!(tag_name(&outcome.discovered[0]).as_deref(), Some("cmp-counter"));
        assert!(runtime.pending_hosts().unwrap().len() == 1);
    }
}
