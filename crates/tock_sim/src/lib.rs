//! Cycle-accurate simulation kernel for composable hardware modules.
//!
//! Designs are built from [`ModuleDef`] descriptors that declare named ports,
//! registers and sub-modules. Instantiating a definition binds arguments to
//! ports, materializes defaults, and auto-wires sibling sub-modules that
//! share a placeholder name, producing a live [`Module`].
//!
//! # Architecture
//!
//! Each simulated cycle has three phases, driven by [`Module::run`]:
//!
//! 1. every attached [`Process`] is stepped once, in attachment order;
//! 2. [`Module::compute`] settles combinational logic on demand: a module's
//!    body runs only when it has not yet run this cycle or one of its inputs
//!    changed, and reading an input first settles that input's driver;
//! 3. [`Module::tick`] commits every [`Register`] in the hierarchy.
//!
//! Values are [`Value`]s, which carry an explicit Unknown state that
//! propagates through arithmetic and never compares equal.
//!
//! # Usage
//!
//! ```ignore
//! use tock_sim::{simulate, Args, ModuleDef, SimConfig};
//!
//! let top = ModuleDef::new("top").instantiate(Args::new())?;
//! let result = simulate(&top, &SimConfig::default())?;
//! println!("stopped at cycle {}", result.final_cycle);
//! ```
//!
//! # Modules
//!
//! - `error`: simulation error type
//! - `signal`: shared signal handles and driver tracking
//! - `register`: two-phase registers
//! - `port`: module descriptors and instantiation arguments
//! - `module`: live module instances and the compute/tick engine
//! - `process`: cooperative testbench processes and their scheduler

#![warn(missing_docs)]

pub mod error;
pub mod module;
pub mod port;
pub mod process;
pub mod register;
mod resolver;
pub mod signal;

use tock_config::SimSection;
use tracing::debug;

pub use error::SimError;
pub use module::Module;
pub use port::{
    Args, Binding, Body, Direction, ModuleDef, ModuleFactory, PortDecl, PortDefault, Ports,
    Resource,
};
pub use process::{check, Process, Step, Stimulus};
pub use register::Register;
pub use signal::Signal;
pub use tock_common::Value;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Cycles to run, or the upper bound when `until_idle` is set.
    pub cycles: u64,
    /// Stop early once no process remains attached.
    pub until_idle: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cycles: 1,
            until_idle: false,
        }
    }
}

impl From<&SimSection> for SimConfig {
    fn from(section: &SimSection) -> Self {
        Self {
            cycles: section.cycles,
            until_idle: section.until_idle,
        }
    }
}

/// Outcome of [`simulate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimResult {
    /// Cycles executed by this call.
    pub cycles_run: u64,
    /// The top module's cycle counter after the run.
    pub final_cycle: u64,
    /// Processes still attached when the run stopped.
    pub processes_remaining: usize,
}

/// High-level entry point: runs `top` as configured.
///
/// With `until_idle` the run stops as soon as every process has finished,
/// after at most `config.cycles` cycles; otherwise exactly `config.cycles`
/// cycles run.
pub fn simulate(top: &Module, config: &SimConfig) -> Result<SimResult, SimError> {
    let start = top.cycle();
    let cycles_run = if config.until_idle {
        top.run_until_idle(config.cycles)?
    } else {
        top.run(config.cycles)?;
        config.cycles
    };
    let result = SimResult {
        cycles_run,
        final_cycle: top.cycle(),
        processes_remaining: top.process_count(),
    };
    debug!(
        module = %top.name(),
        start,
        cycles_run,
        remaining = result.processes_remaining,
        "simulation finished"
    );
    Ok(result)
}
