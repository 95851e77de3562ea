//! Simulation error types for the cycle simulation kernel.
//!
//! All errors that can occur while instantiating a module, looking up its
//! resources, or running cycles are represented as variants of [`SimError`].

/// Errors that can occur during module instantiation or simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A keyword argument names a parameter the module does not declare.
    #[error("module `{module}` has no parameter named `{name}`")]
    UnknownParameter {
        /// The module being instantiated.
        module: String,
        /// The offending keyword.
        name: String,
    },

    /// More positional arguments than declared parameters.
    #[error("module `{module}` declares {expected} parameters but {given} positional arguments were given")]
    TooManyArguments {
        /// The module being instantiated.
        module: String,
        /// Number of declared parameters.
        expected: usize,
        /// Number of positional arguments supplied.
        given: usize,
    },

    /// A parameter was bound by more than one argument.
    #[error("parameter `{name}` of module `{module}` is bound more than once")]
    DuplicateBinding {
        /// The module being instantiated.
        module: String,
        /// The parameter bound twice.
        name: String,
    },

    /// A module definition declares the same port name twice.
    #[error("module `{module}` declares port `{name}` more than once")]
    DuplicatePort {
        /// The module definition.
        module: String,
        /// The repeated port name.
        name: String,
    },

    /// A name is not a port, register or sub-module of the module.
    #[error("`{name}` is not a port, register or sub-module of `{module}`")]
    NotFound {
        /// The module that was searched.
        module: String,
        /// The name that was looked up.
        name: String,
    },

    /// A name exists but refers to a different kind of resource.
    #[error("`{name}` in module `{module}` is not a {expected}")]
    WrongKind {
        /// The module that was searched.
        module: String,
        /// The name that was looked up.
        name: String,
        /// The kind of resource the caller asked for.
        expected: &'static str,
    },

    /// A port is still bound to a placeholder that no sibling shares.
    #[error("port `{name}` of module `{module}` is waiting on unconnected placeholder `{placeholder}`")]
    UnresolvedPort {
        /// The module owning the port.
        module: String,
        /// The port name.
        name: String,
        /// The placeholder text.
        placeholder: String,
    },

    /// Two modules claim to drive the same signal.
    #[error("signal `{signal}` is driven by `{existing}` and cannot also be driven by `{claimant}`")]
    MultipleDrivers {
        /// The signal's label, or `<anonymous>`.
        signal: String,
        /// The module already driving it.
        existing: String,
        /// The module that tried to claim it.
        claimant: String,
    },

    /// Settling a module's inputs re-entered the module itself.
    #[error("combinational loop through module `{module}`")]
    CombinationalLoop {
        /// The module that was re-entered.
        module: String,
    },

    /// A module body reported a failure.
    #[error("module `{module}` failed: {reason}")]
    Body {
        /// The module whose body failed.
        module: String,
        /// Description of the failure.
        reason: String,
    },

    /// A testbench process step failed with a kernel error.
    #[error("process failed at cycle {cycle}: {source}")]
    Process {
        /// Cycle counter when the process failed.
        cycle: u64,
        /// The error returned by the step.
        #[source]
        source: Box<SimError>,
    },

    /// A testbench assertion did not hold.
    #[error("assertion failed at cycle {cycle}: {message}")]
    AssertionFailed {
        /// Cycle counter when the assertion was checked.
        cycle: u64,
        /// The assertion message.
        message: String,
    },
}
