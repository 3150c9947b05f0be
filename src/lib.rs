//! # wc-native
//!
//! Compiler and rehydration runtime for components that lower to custom
//! elements.
//!
//! ## Compile side
//!
//! 1. **Metadata**: a `@Component({...})` decorator (or an explicit
//!    `ComponentConfig`) is read into a `ComponentDescriptor`. Only literal
//!    option values count; anything else is reported and ignored.
//! 2. **Lowering**: the decorator is removed and the descriptor is injected as
//!    `static get` members. Everything else in the file is kept byte for byte,
//!    and lowering already-lowered output changes nothing.
//! 3. **Project**: files lower in parallel. A broken file becomes an error
//!    diagnostic; it never takes its siblings down.
//!
//! ## Runtime side
//!
//! 1. **Render**: components render `VNode` trees through `h`.
//! 2. **Reconcile**: the new tree is diffed against the last one. Keyed
//!    children keep their DOM nodes across reorders; attribute changes never
//!    replace a node.
//! 3. **Slots**: on first render a host's light DOM moves next to the slot it
//!    targets and leaves an original-location comment behind.
//! 4. **Hydration**: right before serialization every host, rendered node and
//!    relocated node is stamped with an id. `(hostId, nodeId)` is unique per
//!    pass.
//! 5. **Scheduling**: connects, module loads and renders run as tick,
//!    module-load and write tasks. A drain settles all three and reports the
//!    first failure only after everything has run.

mod annotate;
mod cache;
mod collaborators;
mod config;
mod descriptor;
mod diagnostics;
mod dom;
mod error;
mod hydration;
mod literal;
mod lowering;
mod metadata;
mod project;
mod reconcile;
mod runtime;
mod scheduler;
mod testing;
mod vdom;


// Compiler
pub use cache::LoweringCache;
pub use collaborators::{
    CollectingSink, DependencyInstaller, DiagnosticsSink, FileSystem, MemoryFileSystem,
    PreinstalledDependencies, StdFileSystem,
};
pub use config::{CompileOptions, SchedulerOptions};
pub use descriptor::{
    extract_descriptor, ComponentConfig, ComponentDescriptor, Encapsulation, ModeStyle, StyleUrls,
};
pub use diagnostics::{Diagnostic, DiagnosticLevel};
pub use literal::LiteralValue;
pub use lowering::{is_valid_custom_element_name, lower_module, LoweredModule};
pub use metadata::read_static_descriptors;
pub use project::{compile_project, discover_sources, ProjectOutput};

#[cfg(feature = "napi")]
pub use descriptor::extract_descriptor_native;
#[cfg(feature = "napi")]
pub use lowering::{is_valid_custom_element_name_native, lower_module_native};
#[cfg(feature = "napi")]
pub use project::compile_project_native;

// Runtime
pub use annotate::{annotate, AnnotationReport};
pub use dom::{inner_html, outer_html, strip_comments, Dom, DomOps, NodeRef};
pub use hydration::{scan, ChildId, HydrationScan, Marker};
pub use reconcile::{ReconcileStats, Reconciler};
pub use runtime::{
    ComponentDefinition, HostRef, HostRegistry, NodeTable, Props, RenderOutcome, Runtime,
};
pub use scheduler::{Module, Phase, PhaseReport, Scheduler, TaskResult};
pub use testing::SpecPage;
pub use vdom::{comment, h, host, no_attrs, slot, text, AttrValue, Attrs, VNode, VNodeKind};

pub use error::{
    DependencyError, DomError, InvalidComponentConfig, ReconcileError, RuntimeError,
    ScheduledTaskError, TransformError,
};
