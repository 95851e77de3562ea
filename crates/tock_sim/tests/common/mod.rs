//! Shared fixtures for the scenario tests.

#![allow(dead_code)]

use tock_sim::{Args, ModuleDef, Module, SimError, Value};

/// Installs a test-writer subscriber once per test binary.
///
/// Honours `RUST_LOG`; silent otherwise.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `out0 = 2 * in0`.
pub fn doubler() -> ModuleDef {
    ModuleDef::new("doubler")
        .input("in0")
        .output("out0")
        .body(|p| {
            let x = p.signal("in0")?.read();
            p.signal("out0")?.write(x * 2);
            Ok(())
        })
}

/// Synchronous counter with active-high reset; `out0` shows the committed
/// count, so a reset cycle reads Unknown.
pub fn counter() -> ModuleDef {
    ModuleDef::new("counter")
        .input("reset")
        .output("out0")
        .register("reg0")
        .body(|p| {
            let reg = p.register("reg0")?;
            let current = reg.read_current();
            if p.signal("reset")?.read() == 1 {
                reg.write_next(0);
            } else if current.is_concrete() {
                reg.write_next(current + 1);
            }
            p.signal("out0")?.write(current);
            Ok(())
        })
}

/// A bare module with a free-running register `r` that starts at 0.
pub fn free_running() -> Result<Module, SimError> {
    ModuleDef::new("top")
        .register("r")
        .body(|p| {
            let r = p.register("r")?;
            let current = r.read_current();
            let next = if current.is_unknown() {
                Value::from(0)
            } else {
                current + 1
            };
            r.write_next(next);
            Ok(())
        })
        .instantiate(Args::new())
}
