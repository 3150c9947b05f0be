//! # Deferred Task Scheduler
//!
//! Owned phase queues for tick, write and module-load callbacks. Callbacks get
//! `&mut Scheduler` and may enqueue more work into any phase.
//!
//! ## Invariants
//!
//! 1. **FIFO**: callbacks of one phase run in submission order.
//! 2. **Fixed point**: a phase drain keeps going until the phase queue stays
//!    empty, so work queued during a drain runs in the same drain.
//! 3. **Settling**: `drain_all` rotates tick → moduleLoad → write until all
//!    three queues are empty at once.
//! 4. **Errors**: a failing callback never stops a drain. The first failure
//!    is returned once everything settled; later ones are dropped.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::config::SchedulerOptions;
use crate::error::ScheduledTaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Tick,
    Write,
    ModuleLoad,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Tick => "tick",
            Phase::Write => "write",
            Phase::ModuleLoad => "moduleLoad",
        };
        f.write_str(name)
    }
}

pub type TaskResult = Result<(), ScheduledTaskError>;

/// A loaded module, whatever the registering side put there.
pub type Module = Rc<dyn Any>;

type Task = Box<dyn FnOnce(&mut Scheduler) -> TaskResult>;
type ModuleCallback = Box<dyn FnOnce(&mut Scheduler, Option<Module>) -> TaskResult>;

struct QueuedModuleLoad {
    bundle_id: String,
    callback: ModuleCallback,
}

/// What one phase drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub executed: usize,
    pub failed: usize,
    /// Passes over the queue; more than one means work was queued mid-drain.
    pub passes: usize,
}

#[derive(Default)]
pub struct Scheduler {
    ticks: Vec<Task>,
    writes: Vec<Task>,
    module_loads: Vec<QueuedModuleLoad>,
    modules: HashMap<String, Module>,
    errors: Vec<ScheduledTaskError>,
    options: SchedulerOptions,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("ticks", &self.ticks.len())
            .field("writes", &self.writes.len())
            .field("module_loads", &self.module_loads.len())
            .field("modules", &self.modules.len())
            .field("errors", &self.errors)
            .finish()
    }
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Scheduler {
            options,
            ..Default::default()
        }
    }

    pub fn schedule_tick<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Scheduler) -> TaskResult + 'static,
    {
        self.ticks.push(Box::new(task));
    }

    pub fn schedule_write<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Scheduler) -> TaskResult + 'static,
    {
        self.writes.push(Box::new(task));
    }

    /// Queue a continuation that runs once `bundle_id` is loaded. It receives
    /// the registered module, or `None` if nothing was registered.
    pub fn schedule_module_load<F>(&mut self, bundle_id: &str, callback: F)
    where
        F: FnOnce(&mut Scheduler, Option<Module>) -> TaskResult + 'static,
    {
        self.module_loads.push(QueuedModuleLoad {
            bundle_id: bundle_id.to_string(),
            callback: Box::new(callback),
        });
    }

    pub fn register_module(&mut self, bundle_id: &str, module: Module) {
        self.modules.insert(bundle_id.to_string(), module);
    }

    pub fn pending(&self, phase: Phase) -> usize {
        match phase {
            Phase::Tick => self.ticks.len(),
            Phase::Write => self.writes.len(),
            Phase::ModuleLoad => self.module_loads.len(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.ticks.is_empty() && self.writes.is_empty() && self.module_loads.is_empty()
    }

    /// Failures captured so far and not yet reported.
    pub fn captured_errors(&self) -> &[ScheduledTaskError] {
        &self.errors
    }

    /// Run `phase` until its queue stays empty.
    pub fn drain_phase(&mut self, phase: Phase) -> PhaseReport {
        let mut report = PhaseReport::default();
        loop {
            let ran = match phase {
                Phase::Tick => {
                    let batch = std::mem::take(&mut self.ticks);
                    self.run_tasks(phase, batch, &mut report)
                }
                Phase::Write => {
                    let batch = std::mem::take(&mut self.writes);
                    self.run_tasks(phase, batch, &mut report)
                }
                Phase::ModuleLoad => {
                    let batch = std::mem::take(&mut self.module_loads);
                    self.run_module_loads(batch, &mut report)
                }
            };
            if ran == 0 {
                break;
            }
            report.passes += 1;
            if report.passes >= self.options.max_rounds {
                tracing::warn!(%phase, passes = report.passes, "phase keeps requeueing, yielding");
                break;
            }
        }
        report
    }

    /// Settle every phase, then return the first captured failure.
    pub fn drain_all(&mut self) -> Result<(), ScheduledTaskError> {
        let mut rounds = 0;
        while !self.is_idle() {
            if rounds >= self.options.max_rounds {
                tracing::warn!(rounds, "task queues did not settle");
                self.errors.clear();
                return Err(ScheduledTaskError::Unsettled { rounds });
            }
            rounds += 1;
            self.drain_phase(Phase::Tick);
            self.drain_phase(Phase::ModuleLoad);
            self.drain_phase(Phase::Write);
        }
        let mut errors = std::mem::take(&mut self.errors).into_iter();
        match errors.next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    /// Resolve queued module loads: only those for `bundle_id` when given,
    /// all of them otherwise. Loads queued by the callbacks wait for the next
    /// flush.
    pub fn flush_module_loads(&mut self, bundle_id: Option<&str>) -> PhaseReport {
        let queued = std::mem::take(&mut self.module_loads);
        let (batch, kept): (Vec<_>, Vec<_>) = queued
            .into_iter()
            .partition(|load| bundle_id.map_or(true, |id| load.bundle_id == id));
        self.module_loads = kept;

        let mut report = PhaseReport::default();
        if self.run_module_loads(batch, &mut report) > 0 {
            report.passes = 1;
        }
        report
    }

    /// Drop queued loads for `bundle_id`. Returns how many were removed.
    pub fn cancel_module_loads(&mut self, bundle_id: &str) -> usize {
        let before = self.module_loads.len();
        self.module_loads.retain(|load| load.bundle_id != bundle_id);
        before - self.module_loads.len()
    }

    /// Clear every queue, registered module and captured error.
    pub fn reset(&mut self) {
        self.ticks.clear();
        self.writes.clear();
        self.module_loads.clear();
        self.modules.clear();
        self.errors.clear();
    }

    fn run_tasks(&mut self, phase: Phase, batch: Vec<Task>, report: &mut PhaseReport) -> usize {
        let count = batch.len();
        for task in batch {
            let result = task(self);
            self.record(phase, result, report);
        }
        count
    }

    fn run_module_loads(&mut self, batch: Vec<QueuedModuleLoad>, report: &mut PhaseReport) -> usize {
        let count = batch.len();
        for load in batch {
            let module = self.modules.get(&load.bundle_id).cloned();
            let result = (load.callback)(self, module);
            self.record(Phase::ModuleLoad, result, report);
        }
        count
    }

    fn record(&mut self, phase: Phase, result: TaskResult, report: &mut PhaseReport) {
        report.executed += 1;
        if let Err(err) = result {
            tracing::debug!(%phase, error = %err, "scheduled task failed");
            report.failed += 1;
            self.errors.push(err);
        }
    }
}
