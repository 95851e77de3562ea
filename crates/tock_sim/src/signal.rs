//! Combinational signals: shared value cells with an optional driving module.
//!
//! A [`Signal`] is a cheap-to-clone handle; every clone refers to the same
//! cell, which is how sibling modules connected by auto-wiring observe each
//! other's writes within a single compute pass.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tock_common::Value;

use crate::error::SimError;
use crate::module::{Module, ModuleCore};

/// A named or anonymous wire holding a [`Value`].
///
/// At most one module drives a signal: the module that declares it as an
/// output. A signal without a driver is a free input set from outside,
/// typically by a testbench process.
#[derive(Clone, Default)]
pub struct Signal(Rc<SignalCell>);

#[derive(Default)]
struct SignalCell {
    value: Cell<Value>,
    label: Option<String>,
    driver: RefCell<Weak<ModuleCore>>,
}

impl Signal {
    /// Creates an anonymous signal holding `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a labelled signal holding `Unknown`.
    pub fn named(label: impl Into<String>) -> Self {
        Self(Rc::new(SignalCell {
            label: Some(label.into()),
            ..SignalCell::default()
        }))
    }

    /// Creates an anonymous signal preset to `value`.
    pub fn constant(value: impl Into<Value>) -> Self {
        let signal = Self::new();
        signal.write(value);
        signal
    }

    /// Returns the current value.
    pub fn read(&self) -> Value {
        self.0.value.get()
    }

    /// Overwrites the current value.
    ///
    /// Only the driving module's body (or a testbench, for free inputs)
    /// should call this.
    pub fn write(&self, value: impl Into<Value>) {
        self.0.value.set(value.into());
    }

    /// Returns the label given at construction, if any.
    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    /// Returns the module driving this signal, if it is still alive.
    pub fn driver(&self) -> Option<Module> {
        self.0.driver.borrow().upgrade().map(Module::from_core)
    }

    /// Returns `true` if a live module drives this signal.
    pub fn is_driven(&self) -> bool {
        self.0.driver.borrow().strong_count() > 0
    }

    /// Returns `true` if both handles refer to the same signal.
    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn display_name(&self) -> String {
        self.label().unwrap_or("<anonymous>").to_string()
    }

    /// Records `module` as the driver. Claiming twice from the same module
    /// is a no-op; a different live driver is an error.
    pub(crate) fn claim(&self, module: &Module) -> Result<(), SimError> {
        let mut driver = self.0.driver.borrow_mut();
        if let Some(existing) = driver.upgrade() {
            if !Rc::ptr_eq(&existing, module.core()) {
                return Err(SimError::MultipleDrivers {
                    signal: self.display_name(),
                    existing: existing.name().to_string(),
                    claimant: module.name().to_string(),
                });
            }
        }
        *driver = module.downgrade();
        Ok(())
    }

    /// Drops the driver if it is `module`.
    pub(crate) fn release(&self, module: &Module) {
        let mut driver = self.0.driver.borrow_mut();
        if driver.upgrade().is_some_and(|d| Rc::ptr_eq(&d, module.core())) {
            *driver = Weak::new();
        }
    }

    /// Brings the signal up to date for the current cycle by evaluating its
    /// driver. Returns whether the driver's body actually ran.
    pub(crate) fn settle(&self) -> Result<bool, SimError> {
        let driver = self.0.driver.borrow().upgrade();
        match driver {
            Some(core) => Module::from_core(core).evaluate(),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("label", &self.0.label)
            .field("value", &self.read())
            .field("driven", &self.is_driven())
            .finish()
    }
}
