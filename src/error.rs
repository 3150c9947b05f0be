//! Error taxonomy for the compiler and the runtime.
//!
//! Compile-time failures are scoped to one file and end up as diagnostics.
//! Runtime failures never leave a half-applied patch behind: the reconciler
//! does not fail on well-formed trees, and scheduled task failures are
//! captured and re-raised only once every phase has settled.

use thiserror::Error;

use crate::scheduler::Phase;

/// The component configuration does not name a usable tag.
///
/// Extraction yields no descriptor and the class is left without static
/// members. This is a skip, never a hard failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidComponentConfig {
    #[error("component config has no tag")]
    MissingTag,
    #[error("component tag must be a string, found {found}")]
    TagNotString { found: String },
    #[error("component tag is empty")]
    EmptyTag,
}

/// Unexpected syntax shape while lowering one file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },
    #[error("failed to read {file}: {message}")]
    Read { file: String, message: String },
}

impl TransformError {
    pub fn file(&self) -> &str {
        match self {
            Self::Parse { file, .. } | Self::Read { file, .. } => file,
        }
    }
}

/// An optional tool dependency could not be provided.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("missing dependencies: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("{0} was required before it was ensured")]
    NotEnsured(String),
}

/// Reconciliation problems.
///
/// Never returned for well-formed trees; malformed ones are turned into no-ops
/// and logged instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("vnode <{tag}> has no insertion point")]
    NoInsertionPoint { tag: String },
    #[error("host element is not an element node")]
    HostNotElement,
}

/// A callback failed during a phase drain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduledTaskError {
    #[error("{phase} task failed: {message}")]
    Failed { phase: Phase, message: String },
    #[error("task queues did not settle after {rounds} rounds")]
    Unsettled { rounds: usize },
}

impl ScheduledTaskError {
    pub fn failed(phase: Phase, message: impl Into<String>) -> Self {
        Self::Failed {
            phase,
            message: message.into(),
        }
    }
}

/// Errors from the live document layer.
#[derive(Error, Debug)]
pub enum DomError {
    #[error("failed to parse html: {0}")]
    Parse(#[source] std::io::Error),
    #[error("failed to serialize html: {0}")]
    Serialize(#[source] std::io::Error),
    #[error("document has no <body>")]
    MissingBody,
}

/// Errors surfaced by the component runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("no component is defined for <{0}>")]
    UnknownComponent(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Scheduled(#[from] ScheduledTaskError),
    #[error("<{0}> is not a connected host")]
    NotConnected(String),
}
