//! Cooperative testbench processes and their per-cycle scheduler.
//!
//! A process runs side effects (stimulus, assertions, logging) and yields
//! once per simulated cycle by returning from [`Process::step`]. The
//! scheduler steps every attached process exactly once per cycle, in the
//! order they were attached, before that cycle's compute phase.

use std::collections::VecDeque;
use std::fmt;

use tock_common::Value;
use tracing::debug;

use crate::error::SimError;
use crate::module::Module;
use crate::signal::Signal;

/// What a process wants after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Step again next cycle.
    Continue,
    /// The process is finished and is detached.
    Done,
}

/// A testbench task stepped once per cycle.
///
/// `top` is the module whose [`run`](Module::run) is driving the
/// simulation; [`Module::cycle`] reports the cycle about to be computed.
/// Returning an error aborts the run.
pub trait Process {
    /// Advances the process by one cycle.
    fn step(&mut self, top: &Module) -> Result<Step, SimError>;
}

impl<F> Process for F
where
    F: FnMut(&Module) -> Result<Step, SimError>,
{
    fn step(&mut self, top: &Module) -> Result<Step, SimError> {
        self(top)
    }
}

/// Drives a free signal with one value per cycle, then finishes.
///
/// The last value stays on the signal after the process detaches.
#[derive(Debug)]
pub struct Stimulus {
    signal: Signal,
    values: VecDeque<Value>,
}

impl Stimulus {
    /// Creates a stimulus writing `values` to `signal`, one per cycle.
    pub fn new<V: Into<Value>>(signal: &Signal, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            signal: signal.clone(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Process for Stimulus {
    fn step(&mut self, _top: &Module) -> Result<Step, SimError> {
        let Some(value) = self.values.pop_front() else {
            return Ok(Step::Done);
        };
        self.signal.write(value);
        Ok(if self.values.is_empty() {
            Step::Done
        } else {
            Step::Continue
        })
    }
}

/// Fails with [`SimError::AssertionFailed`] at the current cycle unless
/// `condition` holds.
pub fn check(top: &Module, condition: bool, message: impl Into<String>) -> Result<(), SimError> {
    if condition {
        Ok(())
    } else {
        Err(SimError::AssertionFailed {
            cycle: top.cycle(),
            message: message.into(),
        })
    }
}

/// FIFO list of attached processes.
#[derive(Default)]
pub(crate) struct Scheduler {
    tasks: Vec<Box<dyn Process>>,
}

impl Scheduler {
    pub(crate) fn attach(&mut self, process: Box<dyn Process>) {
        self.tasks.push(process);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Appends processes attached elsewhere while this list was detached.
    pub(crate) fn absorb(&mut self, other: Scheduler) {
        self.tasks.extend(other.tasks);
    }

    /// Steps every process once, in order. Finished processes are removed;
    /// on error the failing process and those after it stay attached.
    ///
    /// Kernel errors raised by a step are wrapped in [`SimError::Process`]
    /// with the current cycle; assertion failures already carry it.
    pub(crate) fn advance(&mut self, top: &Module) -> Result<(), SimError> {
        let mut index = 0;
        while index < self.tasks.len() {
            let step = self.tasks[index]
                .step(top)
                .map_err(|e| in_process(top.cycle(), e))?;
            match step {
                Step::Continue => index += 1,
                Step::Done => {
                    drop(self.tasks.remove(index));
                    debug!(cycle = top.cycle(), remaining = self.tasks.len(), "process finished");
                }
            }
        }
        Ok(())
    }
}

fn in_process(cycle: u64, error: SimError) -> SimError {
    match error {
        SimError::AssertionFailed { .. } | SimError::Process { .. } => error,
        other => SimError::Process {
            cycle,
            source: Box::new(other),
        },
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
