//! # Host/Slot Annotator
//!
//! Stamps hydration ids onto a rendered document right before it is
//! serialized. See `hydration.rs` for the marker formats.
//!
//! Two passes:
//!
//! 1. Walk the body in document order. Every connected host gets the next
//!    host id, and the nodes of its last render get node ids depth-first.
//!    Original-location comments met on the way are collected.
//! 2. Resolve each original-location comment to the id of the node that was
//!    relocated away from it. Ids are only final after pass 1, since the
//!    relocated node may belong to a host that comes later in the document.
//!    Relocated nodes that no host rendered get host `0` and a root-level id.
//!
//! Comment text cannot be changed in place, so rewritten comments are new
//! nodes; the host registry, node table and vnode trees are updated to point
//! at them.

use markup5ever_rcdom::{Handle, NodeData};
use std::collections::HashMap;

use crate::descriptor::Encapsulation;
use crate::dom::{children, parent_of, Dom, NodeRef};
use crate::error::DomError;
use crate::hydration::{ChildId, Marker, HYDRATE_CHILD_ID, HYDRATE_HOST_ID, HYDRATE_HOST_NAME};
use crate::runtime::{HostRegistry, NodeTable};
use crate::vdom::{VNode, VNodeKind};

/// What one annotation pass stamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub hosts: u32,
    pub nodes: usize,
    pub relocations: usize,
    /// Relocated nodes that got a host `0` id.
    pub root_level: u32,
}

struct DocContext<'a> {
    dom: &'a mut Dom,
    hosts: &'a mut HostRegistry,
    host_ids: u32,
    root_level_ids: u32,
    /// `(hostId, nodeId)` given to each node in pass 1.
    identities: HashMap<NodeRef, (u32, u32)>,
    origins: Vec<Handle>,
}

pub fn annotate(
    dom: &mut Dom,
    hosts: &mut HostRegistry,
    nodes: &mut NodeTable,
) -> Result<AnnotationReport, DomError> {
    let body = dom.body()?;
    let mut ctx = DocContext {
        dom,
        hosts,
        host_ids: 0,
        root_level_ids: 0,
        identities: HashMap::new(),
        origins: Vec::new(),
    };

    annotate_element(&mut ctx, &body, nodes);

    let origins = std::mem::take(&mut ctx.origins);
    let relocations = origins.len();
    for origin in origins {
        let Some(relocated) = nodes.relocated_node(&origin).cloned() else {
            continue;
        };

        let id = match ctx.identities.get(&NodeRef::from(&relocated)) {
            Some(&(host_id, node_id)) => ChildId::short(host_id, node_id),
            None => {
                ctx.root_level_ids += 1;
                let id = ChildId::short(0, ctx.root_level_ids);
                stamp_node(ctx.dom, &relocated, id);
                id
            }
        };

        let rewritten = ctx
            .dom
            .set_comment(&origin, &Marker::OriginalLocation(id).to_string());
        nodes.rebind_origin(&origin, &rewritten);
    }

    let report = AnnotationReport {
        hosts: ctx.host_ids,
        nodes: ctx.identities.len(),
        relocations,
        root_level: ctx.root_level_ids,
    };
    tracing::debug!(?report, "hydration markers inserted");
    Ok(report)
}

fn annotate_element(ctx: &mut DocContext<'_>, node: &Handle, nodes: &NodeTable) {
    if nodes.is_original_location(node) {
        ctx.origins.push(node.clone());
    }
    if !matches!(node.data, NodeData::Element { .. }) {
        return;
    }
    for child in children(node) {
        if ctx.hosts.contains(&child) {
            annotate_host(ctx, &child);
        }
        annotate_element(ctx, &child, nodes);
    }
}

fn annotate_host(ctx: &mut DocContext<'_>, host_elm: &Handle) {
    let Some(host) = ctx.hosts.get_mut(host_elm) else {
        return;
    };
    let Some(mut vnode) = host.vnode.take() else {
        return;
    };
    let (tag, encapsulation, content_ref) = (host.tag.clone(), host.encapsulation, host.content_ref.clone());

    ctx.host_ids += 1;
    let host_id = ctx.host_ids;
    ctx.dom.set_attribute(host_elm, HYDRATE_HOST_ID, &host_id.to_string());
    if encapsulation != Encapsulation::None {
        ctx.dom.set_attribute(host_elm, HYDRATE_HOST_NAME, &tag);
    }
    let content_ref = content_ref
        .map(|cr| ctx.dom.set_comment(&cr, &Marker::ContentRef(host_id).to_string()));

    let mut node_ids = 0;
    for (index, child) in vnode.children.iter_mut().enumerate() {
        annotate_child(ctx, child, host_id, &mut node_ids, 0, index as u32);
    }

    if let Some(host) = ctx.hosts.get_mut(host_elm) {
        host.vnode = Some(vnode);
        host.content_ref = content_ref;
    }
}

fn annotate_child(
    ctx: &mut DocContext<'_>,
    vnode: &mut VNode,
    host_id: u32,
    node_ids: &mut u32,
    depth: u32,
    index: u32,
) {
    let Some(elm) = vnode.elm.clone() else {
        return;
    };
    let node_id = *node_ids;
    *node_ids += 1;
    let id = ChildId::new(host_id, node_id, depth, index);
    ctx.identities.insert(NodeRef::from(&elm), (host_id, node_id));

    match (&elm.data, &vnode.kind) {
        (NodeData::Comment { .. }, VNodeKind::Slot(name)) => {
            let marker = Marker::Slot {
                id,
                name: name.clone(),
            };
            vnode.elm = Some(ctx.dom.set_comment(&elm, &marker.to_string()));
        }
        _ => stamp_node(ctx.dom, &elm, id),
    }

    for (child_index, child) in vnode.children.iter_mut().enumerate() {
        annotate_child(ctx, child, host_id, node_ids, depth + 1, child_index as u32);
    }
}

/// `c-id` on elements, a `t.` comment before text nodes.
fn stamp_node(dom: &mut Dom, node: &Handle, id: ChildId) {
    match &node.data {
        NodeData::Element { .. } => dom.set_attribute(node, HYDRATE_CHILD_ID, &id.to_string()),
        NodeData::Text { .. } => {
            if let Some(parent) = parent_of(node) {
                let marker = dom.create_comment(&Marker::Text(id).to_string());
                dom.insert_before(&parent, &marker, Some(node));
            }
        }
        _ => {}
    }
}
