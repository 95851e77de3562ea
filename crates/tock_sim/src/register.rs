//! Clocked storage with separate next-cycle and visible values.

use std::cell::Cell;
use std::rc::Rc;

use tock_common::Value;

/// A clocked register.
///
/// The owning module's body writes [`write_next`](Register::write_next)
/// during compute; readers see [`read_current`](Register::read_current),
/// which only changes when the owning module ticks. Both start `Unknown`.
#[derive(Clone, Debug, Default)]
pub struct Register(Rc<RegisterCell>);

#[derive(Debug, Default)]
struct RegisterCell {
    next: Cell<Value>,
    current: Cell<Value>,
}

impl Register {
    /// Creates a register with both values `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value that becomes visible after the next clock edge.
    pub fn write_next(&self, value: impl Into<Value>) {
        self.0.next.set(value.into());
    }

    /// Returns the value pending for the next clock edge.
    pub fn read_next(&self) -> Value {
        self.0.next.get()
    }

    /// Returns the value committed at the last clock edge.
    pub fn read_current(&self) -> Value {
        self.0.current.get()
    }

    /// Returns `true` if both handles refer to the same register.
    pub fn ptr_eq(&self, other: &Register) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn commit(&self) {
        self.0.current.set(self.0.next.get());
    }
}
