//! Hydration wire format.
//!
//! Server rendering leaves these markers in the serialized HTML and the
//! client reads them back to match live nodes without re-creating them:
//!
//! | marker                         | where                        |
//! |--------------------------------|------------------------------|
//! | `s-id="<hostId>"`              | attribute on a host element  |
//! | `s-hn="<tag>"`                 | attribute on an encapsulated host |
//! | `c-id="<h>.<n>.<depth>.<idx>"` | attribute on a rendered element |
//! | `<!--t.<childId>-->`           | comment right before a text node |
//! | `<!--s.<childId>.<slot>-->`    | slot reference comment       |
//! | `<!--o.<childId>-->`           | original location of relocated content |
//! | `<!--c.<hostId>-->`            | content reference of a host  |

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

pub const HYDRATE_HOST_ID: &str = "s-id";
pub const HYDRATE_HOST_NAME: &str = "s-hn";
pub const HYDRATE_CHILD_ID: &str = "c-id";
pub const TEXT_NODE_ID: &str = "t";
pub const SLOT_NODE_ID: &str = "s";
pub const ORG_LOCATION_ID: &str = "o";
pub const CONTENT_REF_ID: &str = "c";

lazy_static! {
    static ref CHILD_ID_RE: Regex = Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+)\.(\d+))?$").unwrap();
    static ref SLOT_MARKER_RE: Regex = Regex::new(r"^s\.(\d+\.\d+\.\d+\.\d+)\.(.*)$").unwrap();
    static ref HOST_ID_ATTR_RE: Regex = Regex::new(r#"\ss-id="(\d+)""#).unwrap();
    static ref CHILD_ID_ATTR_RE: Regex = Regex::new(r#"\sc-id="([0-9.]+)""#).unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)<!--(.*?)-->").unwrap();
}

/// `hostId.nodeId`, optionally followed by `.depth.index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildId {
    pub host_id: u32,
    pub node_id: u32,
    /// `(depth, index)` for nodes rendered by a host; absent for root-level ids.
    pub position: Option<(u32, u32)>,
}

impl ChildId {
    pub fn new(host_id: u32, node_id: u32, depth: u32, index: u32) -> Self {
        ChildId {
            host_id,
            node_id,
            position: Some((depth, index)),
        }
    }

    pub fn short(host_id: u32, node_id: u32) -> Self {
        ChildId {
            host_id,
            node_id,
            position: None,
        }
    }

    /// Just the `(hostId, nodeId)` pair.
    pub fn identity(&self) -> (u32, u32) {
        (self.host_id, self.node_id)
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.host_id, self.node_id)?;
        if let Some((depth, index)) = self.position {
            write!(f, ".{}.{}", depth, index)?;
        }
        Ok(())
    }
}

impl FromStr for ChildId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = CHILD_ID_RE.captures(s).ok_or(())?;
        let num = |i: usize| -> Result<Option<u32>, ()> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u32>().map_err(|_| ()))
                .transpose()
        };
        let host_id = num(1)?.ok_or(())?;
        let node_id = num(2)?.ok_or(())?;
        let position = match (num(3)?, num(4)?) {
            (Some(depth), Some(index)) => Some((depth, index)),
            _ => None,
        };
        Ok(ChildId {
            host_id,
            node_id,
            position,
        })
    }
}

/// A hydration comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Text(ChildId),
    Slot { id: ChildId, name: String },
    OriginalLocation(ChildId),
    ContentRef(u32),
}

impl Marker {
    pub fn parse(text: &str) -> Option<Marker> {
        if let Some(caps) = SLOT_MARKER_RE.captures(text) {
            let id = caps.get(1)?.as_str().parse().ok()?;
            let name = caps.get(2).map_or("", |m| m.as_str()).to_string();
            return Some(Marker::Slot { id, name });
        }
        let (prefix, rest) = text.split_once('.')?;
        match prefix {
            TEXT_NODE_ID => rest.parse().ok().map(Marker::Text),
            ORG_LOCATION_ID => rest.parse().ok().map(Marker::OriginalLocation),
            CONTENT_REF_ID => rest.parse().ok().map(Marker::ContentRef),
            _ => None,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Text(id) => write!(f, "{}.{}", TEXT_NODE_ID, id),
            Marker::Slot { id, name } => write!(f, "{}.{}.{}", SLOT_NODE_ID, id, name),
            Marker::OriginalLocation(id) => write!(f, "{}.{}", ORG_LOCATION_ID, id),
            Marker::ContentRef(host_id) => write!(f, "{}.{}", CONTENT_REF_ID, host_id),
        }
    }
}

/// Everything hydration-related found in a serialized document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HydrationScan {
    pub host_ids: Vec<u32>,
    /// Ids of elements (`c-id`) and text nodes (`t.` comments), in document order.
    pub node_ids: Vec<ChildId>,
    pub markers: Vec<Marker>,
}

/// Read markers back out of serialized HTML.
pub fn scan(html: &str) -> HydrationScan {
    let mut out = HydrationScan::default();
    out.host_ids = HOST_ID_ATTR_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();

    let mut positioned: Vec<(usize, ChildId)> = CHILD_ID_ATTR_RE
        .captures_iter(html)
        .filter_map(|c| {
            let m = c.get(1)?;
            Some((m.start(), m.as_str().parse().ok()?))
        })
        .collect();

    for caps in COMMENT_RE.captures_iter(html) {
        let Some(body) = caps.get(1) else {
            continue;
        };
        if let Some(marker) = Marker::parse(body.as_str()) {
            if let Marker::Text(id) = &marker {
                positioned.push((body.start(), *id));
            }
            out.markers.push(marker);
        }
    }

    positioned.sort_by_key(|(offset, _)| *offset);
    out.node_ids = positioned.into_iter().map(|(_, id)| id).collect();
    out
}
