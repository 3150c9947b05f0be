//! # Test Page
//!
//! Test harness that renders component hosts in a document the way a page
//! load would: every declared component is loaded lazily, hosts connect in a
//! tick, their module resolves in a module-load pass, and renders happen in
//! write passes. `flush` settles all of it.

use markup5ever_rcdom::Handle;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

use crate::annotate::AnnotationReport;
use crate::config::SchedulerOptions;
use crate::dom::{children, inner_html, is_element, outer_html, strip_comments, tag_name};
use crate::error::{RuntimeError, ScheduledTaskError};
use crate::runtime::{ComponentDefinition, Runtime};
use crate::scheduler::{Module, Phase, Scheduler};

pub struct SpecPage {
    runtime: Rc<RefCell<Runtime>>,
    scheduler: Scheduler,
}

impl SpecPage {
    /// Load `html`, register `components` as lazy bundles and settle the
    /// initial render.
    pub fn new(components: Vec<ComponentDefinition>, html: &str) -> Result<Self, RuntimeError> {
        Self::with_options(components, html, SchedulerOptions::default())
    }

    pub fn with_options(
        components: Vec<ComponentDefinition>,
        html: &str,
        options: SchedulerOptions,
    ) -> Result<Self, RuntimeError> {
        let mut page = Self::unloaded(html, options)?;
        for definition in components {
            let tag = definition.tag().to_string();
            page.runtime.borrow_mut().declare(&tag);
            page.scheduler.register_module(&tag, Rc::new(definition));
        }
        page.connect_pending()?;
        page.flush()?;
        Ok(page)
    }

    /// A page with nothing registered and nothing scheduled yet.
    pub fn unloaded(html: &str, options: SchedulerOptions) -> Result<Self, RuntimeError> {
        Ok(SpecPage {
            runtime: Rc::new(RefCell::new(Runtime::from_html(html)?)),
            scheduler: Scheduler::new(options),
        })
    }

    /// Queue a connect for every unconnected host in the document.
    pub fn connect_pending(&mut self) -> Result<usize, RuntimeError> {
        let pending = self.runtime.borrow().pending_hosts()?;
        let count = pending.len();
        for elm in pending {
            queue_connect(&mut self.scheduler, &self.runtime, elm);
        }
        Ok(count)
    }

    /// Run every queued task until the page is idle.
    pub fn flush(&mut self) -> Result<(), ScheduledTaskError> {
        self.scheduler.drain_all()
    }

    /// Write a prop and queue a render if it changed. Call `flush` to apply.
    pub fn set_prop(&mut self, elm: &Handle, name: &str, value: Value) -> Result<(), RuntimeError> {
        let changed = self.runtime.borrow_mut().set_prop(elm, name, value)?;
        if changed {
            queue_render(&mut self.scheduler, &self.runtime, elm.clone());
        }
        Ok(())
    }

    /// First element in the body.
    pub fn root(&self) -> Option<Handle> {
        let body = self.runtime.borrow().dom().body().ok()?;
        children(&body).into_iter().find(is_element)
    }

    pub fn query(&self, tag: &str) -> Option<Handle> {
        self.runtime.borrow().dom().query(tag)
    }

    /// Markup of the root element with comments removed.
    pub fn root_html(&self) -> Result<String, RuntimeError> {
        match self.root() {
            Some(root) => Ok(strip_comments(&outer_html(&root)?)),
            None => Ok(String::new()),
        }
    }

    /// Markup of the whole body with comments removed.
    pub fn body_html(&self) -> Result<String, RuntimeError> {
        let body = self.runtime.borrow().dom().body()?;
        Ok(strip_comments(&inner_html(&body)?))
    }

    /// Body markup with hydration markers.
    pub fn hydration_html(&mut self) -> Result<String, RuntimeError> {
        self.flush()?;
        let (html, report) = self.runtime.borrow_mut().hydration_html()?;
        tracing::trace!(hosts = report.hosts, "page annotated");
        Ok(html)
    }

    pub fn annotate(&mut self) -> Result<AnnotationReport, RuntimeError> {
        self.flush()?;
        let (_, report) = self.runtime.borrow_mut().hydration_html()?;
        Ok(report)
    }

    pub fn runtime(&self) -> Rc<RefCell<Runtime>> {
        Rc::clone(&self.runtime)
    }

    pub fn scheduler(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }
}

fn queue_connect(scheduler: &mut Scheduler, runtime: &Rc<RefCell<Runtime>>, elm: Handle) {
    let runtime = Rc::clone(runtime);
    scheduler.schedule_tick(move |s| {
        let connected = runtime
            .borrow_mut()
            .connect(&elm)
            .map_err(|e| ScheduledTaskError::failed(Phase::Tick, e.to_string()))?;
        if !connected {
            return Ok(());
        }

        let tag = tag_name(&elm).unwrap_or_default();
        if runtime.borrow().is_defined(&tag) {
            queue_render(s, &runtime, elm);
            return Ok(());
        }

        let bundle_id = tag.clone();
        s.schedule_module_load(&bundle_id, move |s, module: Option<Module>| {
            let definition = module
                .and_then(|m| m.downcast_ref::<ComponentDefinition>().cloned())
                .ok_or_else(|| {
                    ScheduledTaskError::failed(Phase::ModuleLoad, format!("no bundle registered for <{}>", tag))
                })?;
            runtime.borrow_mut().define(definition);
            queue_render(s, &runtime, elm);
            Ok(())
        });
        Ok(())
    });
}

fn queue_render(scheduler: &mut Scheduler, runtime: &Rc<RefCell<Runtime>>, elm: Handle) {
    if !runtime.borrow_mut().request_update(&elm) {
        return;
    }
    let runtime = Rc::clone(runtime);
    scheduler.schedule_write(move |s| {
        if !runtime.borrow().hosts().contains(&elm) {
            // removed by an ancestor's render before this one ran
            return Ok(());
        }
        let outcome = runtime
            .borrow_mut()
            .render(&elm)
            .map_err(|e| ScheduledTaskError::failed(Phase::Write, e.to_string()))?;
        for discovered in outcome.discovered {
            queue_connect(s, &runtime, discovered);
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ComponentConfig, ComponentDescriptor};
    use crate::runtime::Props;
    use crate::vdom::{h, host, no_attrs, text, AttrValue};
    use serde_json::json;

    fn flag(props: &Props, name: &str) -> bool {
        props.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    fn count(props: &Props) -> i64 {
        props.get("count").and_then(Value::as_i64).unwrap_or(0)
    }

    fn alert() -> ComponentDefinition {
        ComponentDefinition::new(ComponentDescriptor::new("cmp-a"), |props| {
            let hidden = flag(props, "hidden");
            host(
                vec![
                    ("role", AttrValue::from("alert")),
                    ("aria-hidden", if hidden { "true".into() } else { AttrValue::Null }),
                    ("hidden", hidden.into()),
                ],
                Vec::<crate::vdom::VNode>::new(),
            )
        })
    }

    #[test]
    fn test_host_attributes_follow_props() {
        let mut page = SpecPage::new(vec![alert()], "<cmp-a></cmp-a>").unwrap();
        assert_eq!(page.root_html().unwrap(), r#"<cmp-a role="alert"></cmp-a>"#);

        let root = page.root().unwrap();
        page.set_prop(&root, "hidden", json!(true)).unwrap();
        page.flush().unwrap();
        assert_eq!(
            page.root_html().unwrap(),
            r#"<cmp-a role="alert" aria-hidden="true" hidden=""></cmp-a>"#
        );

        page.set_prop(&root, "hidden", json!(false)).unwrap();
        page.flush().unwrap();
        assert_eq!(page.root_html().unwrap(), r#"<cmp-a role="alert"></cmp-a>"#);
    }

    fn parent_and_child() -> Vec<ComponentDefinition> {
        let parent = ComponentDefinition::new(ComponentDescriptor::new("cmp-a"), |props| {
            host(
                no_attrs(),
                vec![
                    h("span", no_attrs(), vec![text(count(props).to_string())]),
                    h("cmp-b", no_attrs(), Vec::<crate::vdom::VNode>::new()),
                ],
            )
        });
        let child = ComponentDefinition::new(ComponentDescriptor::new("cmp-b"), |props| {
            host(no_attrs(), vec![text(count(props).to_string())])
        });
        vec![parent, child]
    }

    #[test]
    fn test_nested_host_renders_after_its_parent() {
        let mut page = SpecPage::new(parent_and_child(), "<cmp-a></cmp-a>").unwrap();
        assert_eq!(
            page.root_html().unwrap(),
            "<cmp-a><span>0</span><cmp-b>0</cmp-b></cmp-a>"
        );

        let child = page.query("cmp-b").unwrap();
        page.set_prop(&child, "count", json!(1)).unwrap();
        page.flush().unwrap();
        let root = page.root().unwrap();
        page.set_prop(&root, "count", json!(1)).unwrap();
        page.flush().unwrap();
        assert_eq!(
            page.root_html().unwrap(),
            "<cmp-a><span>1</span><cmp-b>1</cmp-b></cmp-a>"
        );

        // the parent re-render leaves the child's own content alone
        let runtime = page.runtime();
        let runtime = runtime.borrow();
        assert_eq!(runtime.hosts().get(&root).map(|h| h.renders), Some(2));
        assert_eq!(runtime.hosts().get(&child).map(|h| h.renders), Some(2));
    }

    #[test]
    fn test_prop_writes_coalesce_into_one_render() {
        let mut page = SpecPage::new(parent_and_child(), "<cmp-a></cmp-a>").unwrap();
        let root = page.root().unwrap();
        for n in 1..=3 {
            page.set_prop(&root, "count", json!(n)).unwrap();
        }
        assert_eq!(page.scheduler().pending(Phase::Write), 1);
        page.flush().unwrap();
        assert_eq!(page.runtime().borrow().hosts().get(&root).map(|h| h.renders), Some(2));
        assert_eq!(
            page.root_html().unwrap(),
            "<cmp-a><span>3</span><cmp-b>0</cmp-b></cmp-a>"
        );
    }

    #[test]
    fn test_toggled_child_host_is_released() {
        let outer = ComponentDefinition::new(ComponentDescriptor::new("cmp-out"), |props| {
            let inner = flag(props, "open").then(|| h("cmp-in", no_attrs(), Vec::<crate::vdom::VNode>::new()));
            host(no_attrs(), vec![inner])
        });
        let inner = ComponentDefinition::new(ComponentDescriptor::new("cmp-in"), |_| {
            host(no_attrs(), vec![text("in")])
        });
        let mut page = SpecPage::new(vec![outer, inner], "<cmp-out></cmp-out>").unwrap();
        let root = page.root().unwrap();

        for _ in 0..5 {
            page.set_prop(&root, "open", json!(true)).unwrap();
            page.flush().unwrap();
            assert_eq!(page.root_html().unwrap(), "<cmp-out><cmp-in>in</cmp-in></cmp-out>");
            assert_eq!(page.runtime().borrow().hosts().len(), 2);

            page.set_prop(&root, "open", json!(false)).unwrap();
            page.flush().unwrap();
            assert_eq!(page.root_html().unwrap(), "<cmp-out></cmp-out>");
        }
        assert_eq!(page.runtime().borrow().hosts().len(), 1);
    }

    #[test]
    fn test_render_waits_for_module_load() {
        let mut page = SpecPage::unloaded("<cmp-a></cmp-a>", SchedulerOptions::default()).unwrap();
        let definition =
            ComponentDefinition::from_config(&ComponentConfig::new("cmp-a"), |_| host(no_attrs(), vec![text("ready")]))
                .unwrap();
        page.runtime().borrow_mut().declare("cmp-a");
        page.scheduler().register_module("cmp-a", Rc::new(definition));
        assert_eq!(page.connect_pending().unwrap(), 1);

        page.scheduler().drain_phase(Phase::Tick);
        assert_eq!(page.scheduler().pending(Phase::ModuleLoad), 1);
        assert_eq!(page.scheduler().pending(Phase::Write), 0);

        page.scheduler().flush_module_loads(Some("cmp-a"));
        assert_eq!(page.scheduler().pending(Phase::Write), 1);
        assert_eq!(page.root_html().unwrap(), "<cmp-a></cmp-a>");

        page.flush().unwrap();
        assert_eq!(page.root_html().unwrap(), "<cmp-a>ready</cmp-a>");
    }

    #[test]
    fn test_missing_bundle_surfaces_as_error() {
        let mut page = SpecPage::unloaded("<cmp-a></cmp-a>", SchedulerOptions::default()).unwrap();
        page.runtime().borrow_mut().declare("cmp-a");
        page.connect_pending().unwrap();
        let err = page.flush().unwrap_err();
        assert_eq!(
            err,
            ScheduledTaskError::failed(Phase::ModuleLoad, "no bundle registered for <cmp-a>")
        );
        assert!(page.scheduler().is_idle());
        assert_eq!(page.root_html().unwrap(), "<cmp-a></cmp-a>");
    }
}
