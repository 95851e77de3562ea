//! Hierarchical simulation nodes and the per-cycle compute/tick engine.
//!
//! A [`Module`] wraps a logic body, its resolved ports, owned registers and
//! sub-modules. Each simulated cycle runs in three phases:
//!
//! 1. every attached process advances one step;
//! 2. [`compute`](Module::compute) settles combinational logic top-down;
//! 3. [`tick`](Module::tick) commits every register in the hierarchy.
//!
//! Evaluation is demand-driven. Before a body runs, each of its input signals
//! is settled, which evaluates the signal's driver first. A per-cycle
//! `settled` flag memoizes bodies so a module reached along several paths in
//! the same cycle runs at most once unless one of its inputs was recomputed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::SimError;
use crate::port::{Args, Body, ModuleDef, Ports, Resource};
use crate::process::{Process, Scheduler};
use crate::register::Register;
use crate::resolver::Resolver;
use crate::signal::Signal;

/// Shared state behind a [`Module`] handle.
pub(crate) struct ModuleCore {
    name: String,
    body: Body,
    resolver: RefCell<Resolver>,
    /// Whether the body already ran in the current cycle.
    settled: Cell<bool>,
    /// Set while inputs are settling and the body runs.
    evaluating: Cell<bool>,
    cycle: Cell<u64>,
    scheduler: RefCell<Scheduler>,
}

impl ModuleCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

/// Clears the evaluation flag on every exit path, errors included.
struct EvalGuard<'a>(&'a Cell<bool>);

impl<'a> EvalGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A live module instance.
///
/// Handles are cheap to clone; all clones refer to the same instance.
#[derive(Clone)]
pub struct Module(Rc<ModuleCore>);

impl Module {
    pub(crate) fn instantiate(def: &ModuleDef, args: Args) -> Result<Self, SimError> {
        let resolver = Resolver::bind(def, args)?;
        let module = Module(Rc::new(ModuleCore {
            name: def.name().to_string(),
            body: def.logic(),
            resolver: RefCell::new(resolver),
            settled: Cell::new(false),
            evaluating: Cell::new(false),
            cycle: Cell::new(0),
            scheduler: RefCell::new(Scheduler::default()),
        }));
        module.claim_outputs()?;
        trace!(module = %module.name(), "instantiated");
        Ok(module)
    }

    pub(crate) fn from_core(core: Rc<ModuleCore>) -> Self {
        Module(core)
    }

    pub(crate) fn core(&self) -> &Rc<ModuleCore> {
        &self.0
    }

    pub(crate) fn downgrade(&self) -> Weak<ModuleCore> {
        Rc::downgrade(&self.0)
    }

    /// Returns the name of the definition this module was built from.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the number of cycles [`run`](Module::run) has executed.
    pub fn cycle(&self) -> u64 {
        self.0.cycle.get()
    }

    /// Returns `true` if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Module) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Looks up a port, register or sub-module by its declared name.
    pub fn get(&self, name: &str) -> Result<Resource, SimError> {
        self.0.resolver.borrow().get(name)
    }

    /// Returns the signal bound to port `name`.
    pub fn port(&self, name: &str) -> Result<Signal, SimError> {
        self.0.resolver.borrow().signal(name).cloned()
    }

    /// Returns the register bound to `name`.
    pub fn register(&self, name: &str) -> Result<Register, SimError> {
        self.0.resolver.borrow().register(name).cloned()
    }

    /// Returns the sub-module bound to `name`.
    pub fn submodule(&self, name: &str) -> Result<Module, SimError> {
        self.0.resolver.borrow().submodule(name).cloned()
    }

    /// Resolves a dotted path such as `"m1.out0"` through the sub-module tree.
    pub fn lookup(&self, path: &str) -> Result<Resource, SimError> {
        let mut owner = self.clone();
        let mut segments = path.split('.');
        let mut name = segments.next().unwrap_or_default();
        let mut current = owner.get(name)?;
        for segment in segments {
            let Resource::Module(next) = current else {
                return Err(SimError::WrongKind {
                    module: owner.name().to_string(),
                    name: name.to_string(),
                    expected: "sub-module",
                });
            };
            owner = next;
            current = owner.get(segment)?;
            name = segment;
        }
        Ok(current)
    }

    /// Rebinds a port to `signal`.
    ///
    /// `key` is either the placeholder text a port is still waiting on or
    /// the port's name. Output ports are re-claimed by this module and the
    /// signal they replace loses this module as its driver.
    pub fn set_arg(&self, key: &str, signal: Signal) -> Result<(), SimError> {
        let previous = self.0.resolver.borrow_mut().rebind(key, signal)?;
        if let Some(old) = previous {
            old.release(self);
        }
        self.claim_outputs()
    }

    pub(crate) fn connect_placeholder(&self, name: &str, signal: &Signal) -> Result<(), SimError> {
        self.0
            .resolver
            .borrow_mut()
            .connect_placeholder(name, signal);
        self.claim_outputs()
    }

    pub(crate) fn pending_placeholders(&self) -> Vec<String> {
        self.0.resolver.borrow().pending_placeholders()
    }

    fn claim_outputs(&self) -> Result<(), SimError> {
        let resolver = self.0.resolver.borrow();
        for output in resolver.outputs() {
            output.claim(self)?;
        }
        Ok(())
    }

    fn submodules(&self) -> Vec<Module> {
        self.0.resolver.borrow().submodules().cloned().collect()
    }

    /// Settles this module's inputs and runs its body if needed.
    ///
    /// The body runs when it has not run yet this cycle or when any input's
    /// driver was recomputed while settling. Returns whether it ran.
    pub(crate) fn evaluate(&self) -> Result<bool, SimError> {
        let core = &self.0;
        if core.evaluating.get() {
            return Err(SimError::CombinationalLoop {
                module: core.name.clone(),
            });
        }
        let _guard = EvalGuard::enter(&core.evaluating);

        let inputs = core.resolver.borrow().inputs();
        let mut inputs_changed = false;
        for input in &inputs {
            inputs_changed |= input.settle()?;
        }

        if core.settled.get() && !inputs_changed {
            return Ok(false);
        }

        trace!(module = %core.name, inputs_changed, "evaluating body");
        let resolver = core.resolver.borrow();
        (core.body)(&Ports::new(&resolver))?;
        core.settled.set(true);
        Ok(true)
    }

    /// Settles this module and, unconditionally, every sub-module.
    ///
    /// Sub-modules are visited even when this body did not run, since their
    /// registers may present new values after a clock edge. Returns whether
    /// this module's own body ran.
    pub fn compute(&self) -> Result<bool, SimError> {
        let recomputed = self.evaluate()?;
        for sub in self.submodules() {
            sub.compute()?;
        }
        Ok(recomputed)
    }

    /// Clock edge: ticks sub-modules, commits owned registers and makes every
    /// body eligible to run again.
    pub fn tick(&self) {
        for sub in self.submodules() {
            sub.tick();
        }
        for register in self.0.resolver.borrow().registers() {
            register.commit();
        }
        self.0.settled.set(false);
    }

    /// Attaches a process, stepped once per cycle after those attached before it.
    pub fn attach(&self, process: impl Process + 'static) {
        self.0.scheduler.borrow_mut().attach(Box::new(process));
    }

    /// Returns the number of processes still attached.
    pub fn process_count(&self) -> usize {
        self.0.scheduler.borrow().len()
    }

    /// Runs one cycle: process steps, compute, tick, then the cycle counter
    /// advances.
    ///
    /// On error the cycle counter is not advanced and registers are not
    /// committed; signals keep whatever was written before the failure. Every
    /// body becomes eligible to run again, so retrying recomputes the cycle.
    pub fn run_cycle(&self) -> Result<(), SimError> {
        let cycle = self.cycle();
        debug!(module = %self.name(), cycle, "cycle start");
        if let Err(err) = self.advance_processes().and_then(|()| self.compute()) {
            debug!(module = %self.name(), cycle, error = %err, "cycle aborted");
            self.clear_settled();
            return Err(err);
        }
        self.tick();
        self.0.cycle.set(cycle + 1);
        Ok(())
    }

    /// Marks every body in the hierarchy as not yet run this cycle.
    fn clear_settled(&self) {
        for sub in self.submodules() {
            sub.clear_settled();
        }
        self.0.settled.set(false);
    }

    /// Runs `cycles` cycles.
    pub fn run(&self, cycles: u64) -> Result<(), SimError> {
        for _ in 0..cycles {
            self.run_cycle()?;
        }
        Ok(())
    }

    /// Runs until no process remains attached, at most `max_cycles` cycles.
    /// Returns the number of cycles executed.
    pub fn run_until_idle(&self, max_cycles: u64) -> Result<u64, SimError> {
        let mut executed = 0;
        while executed < max_cycles && self.process_count() > 0 {
            self.run_cycle()?;
            executed += 1;
        }
        Ok(executed)
    }

    fn advance_processes(&self) -> Result<(), SimError> {
        // Processes may attach new processes through this handle, so the
        // scheduler is detached while it runs.
        let mut scheduler = std::mem::take(&mut *self.0.scheduler.borrow_mut());
        let result = scheduler.advance(self);
        let mut slot = self.0.scheduler.borrow_mut();
        scheduler.absorb(std::mem::take(&mut *slot));
        *slot = scheduler;
        result
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.0.name)
            .field("cycle", &self.0.cycle.get())
            .field("settled", &self.0.settled.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortDecl;
    use crate::process::Step;
    use std::rc::Rc;

    /// `out = in + 1`, counting body runs.
    fn incrementer(runs: Rc<Cell<u32>>) -> ModuleDef {
        ModuleDef::new("inc")
            .input("a")
            .output("y")
            .body(move |p| {
                runs.set(runs.get() + 1);
                let a = p.signal("a")?.read();
                p.signal("y")?.write(a + 1);
                Ok(())
            })
    }

    #[test]
    fn body_runs_once_per_cycle_without_input_change() {
        let runs = Rc::new(Cell::new(0));
        let m = incrementer(runs.clone())
            .instantiate(Args::new().kw("a", Signal::constant(1)))
            .unwrap();

        assert!(m.compute().unwrap());
        assert!(!m.compute().unwrap());
        assert!(!m.compute().unwrap());
        assert_eq!(runs.get(), 1);
        assert_eq!(m.port("y").unwrap().read(), 2);
    }

    #[test]
    fn tick_makes_body_eligible_again() {
        let runs = Rc::new(Cell::new(0));
        let m = incrementer(runs.clone()).instantiate(Args::new()).unwrap();
        m.compute().unwrap();
        m.tick();
        assert!(m.compute().unwrap());
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn outputs_are_driven_by_their_module() {
        let m = incrementer(Rc::default()).instantiate(Args::new()).unwrap();
        let y = m.port("y").unwrap();
        assert!(y.driver().is_some_and(|d| d.ptr_eq(&m)));
        assert!(!m.port("a").unwrap().is_driven());
    }

    #[test]
    fn downstream_settle_recomputes_upstream_once() {
        // a -> first -> mid -> second, and a diamond: both `left` and `right`
        // read `mid`; `first` must still run once per cycle.
        let first_runs = Rc::new(Cell::new(0));
        let first = incrementer(first_runs.clone());
        let follower = incrementer(Rc::default());
        let source = ModuleDef::new("src").output("o").body(|p| {
            p.signal("o")?.write(10);
            Ok(())
        });
        let top = ModuleDef::new("top")
            .submodule("first", &first, Args::new().kw("a", "src").kw("y", "mid"))
            .submodule("left", &follower, Args::new().kw("a", "mid"))
            .submodule("right", &follower, Args::new().kw("a", "mid"))
            .submodule("source", &source, Args::new().kw("o", "src"))
            .instantiate(Args::new())
            .unwrap();

        top.run(1).unwrap();
        assert_eq!(first_runs.get(), 1);
        assert_eq!(top.lookup("left.y").map(port_value).unwrap(), 12);
        assert_eq!(top.lookup("right.y").map(port_value).unwrap(), 12);

        top.run(2).unwrap();
        assert_eq!(first_runs.get(), 3);
    }

    fn port_value(resource: Resource) -> tock_common::Value {
        match resource {
            Resource::Port(s) => s.read(),
            other => panic!("expected port, got {other:?}"),
        }
    }

    #[test]
    fn register_current_lags_next_by_one_cycle() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let def = ModuleDef::new("acc").register("r").body(move |p| {
            let r = p.register("r")?;
            log.borrow_mut().push(r.read_current());
            let next = r.read_current().concrete().map_or(100, |v| v + 1);
            r.write_next(next);
            Ok(())
        });
        let m = def.instantiate(Args::new()).unwrap();
        m.run(4).unwrap();

        let seen = seen.borrow();
        assert!(seen[0].is_unknown());
        assert_eq!(seen[1..], [100, 101, 102]);
        assert_eq!(m.register("r").unwrap().read_current(), 103);
    }

    #[test]
    fn submodules_compute_even_when_parent_is_settled() {
        let runs = Rc::new(Cell::new(0));
        let top = ModuleDef::new("top")
            .submodule("child", &incrementer(runs.clone()), Args::new())
            .instantiate(Args::new())
            .unwrap();
        assert!(top.compute().unwrap());
        top.tick();
        top.evaluate().unwrap();
        // Parent already settled this cycle, children still get their turn.
        assert!(!top.compute().unwrap());
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn self_loop_is_detected() {
        let def = ModuleDef::new("inv").input("a").output("y").body(|p| {
            let a = p.signal("a")?.read();
            p.signal("y")?.write(!a);
            Ok(())
        });
        let wire = Signal::named("loop");
        let m = def
            .instantiate(Args::new().pos(&wire).pos(&wire))
            .unwrap();
        let err = m.compute().unwrap_err();
        assert!(matches!(err, SimError::CombinationalLoop { ref module } if module == "inv"));
        // The guard was released: the error is reproducible, not a stuck flag.
        assert!(matches!(
            m.compute(),
            Err(SimError::CombinationalLoop { .. })
        ));
    }

    #[test]
    fn second_driver_is_rejected() {
        let driver = ModuleDef::new("drv").output("y");
        let wire = Signal::named("w");
        let _first = driver.instantiate(Args::new().pos(&wire)).unwrap();
        let err = driver.instantiate(Args::new().pos(&wire)).unwrap_err();
        assert!(matches!(err, SimError::MultipleDrivers { ref signal, .. } if signal == "w"));
    }

    #[test]
    fn driver_claim_lapses_when_module_is_dropped() {
        let driver = ModuleDef::new("drv").output("y");
        let wire = Signal::named("w");
        drop(driver.instantiate(Args::new().pos(&wire)).unwrap());
        assert!(!wire.is_driven());
        assert!(driver.instantiate(Args::new().pos(&wire)).is_ok());
    }

    #[test]
    fn set_arg_moves_driver_claim() {
        let m = ModuleDef::new("drv")
            .output("y")
            .instantiate(Args::new())
            .unwrap();
        let old = m.port("y").unwrap();
        let new = Signal::named("new");
        m.set_arg("y", new.clone()).unwrap();
        assert!(!old.is_driven());
        assert!(new.driver().is_some_and(|d| d.ptr_eq(&m)));
        assert!(m.port("y").unwrap().ptr_eq(&new));
    }

    #[test]
    fn set_arg_resolves_lone_placeholder() {
        let runs = Rc::new(Cell::new(0));
        let m = incrementer(runs)
            .instantiate(Args::new().kw("a", "feed"))
            .unwrap();
        assert_eq!(m.pending_placeholders(), ["feed"]);

        let feed = Signal::constant(41);
        m.set_arg("feed", feed).unwrap();
        m.tick();
        m.compute().unwrap();
        assert_eq!(m.port("y").unwrap().read(), 42);
    }

    #[test]
    fn body_reading_pending_port_fails() {
        let m = incrementer(Rc::default())
            .instantiate(Args::new().kw("a", "feed"))
            .unwrap();
        assert!(matches!(
            m.compute(),
            Err(SimError::UnresolvedPort { .. })
        ));
    }

    #[test]
    fn lookup_walks_submodules() {
        let leaf = ModuleDef::new("leaf").register("r");
        let mid = ModuleDef::new("mid").submodule("leaf", &leaf, Args::new());
        let top = ModuleDef::new("top")
            .submodule("mid", &mid, Args::new())
            .instantiate(Args::new())
            .unwrap();

        assert!(matches!(top.lookup("mid.leaf.r"), Ok(Resource::Register(_))));
        assert!(matches!(top.lookup("mid.leaf"), Ok(Resource::Module(_))));
        assert!(matches!(
            top.lookup("mid.leaf.r.q"),
            Err(SimError::WrongKind { ref name, .. }) if name == "r"
        ));
        assert!(matches!(
            top.lookup("mid.nope"),
            Err(SimError::NotFound { ref module, .. }) if module == "mid"
        ));
        assert!(top.submodule("mid").is_ok());
        assert!(matches!(top.register("mid"), Err(SimError::WrongKind { .. })));
    }

    #[test]
    fn untyped_parameter_is_bound_but_not_an_input() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let upstream = incrementer(Rc::default());
        let def = ModuleDef::new("sink")
            .port(PortDecl::param("tap"))
            .body(move |_| {
                counter.set(counter.get() + 1);
                Ok(())
            });
        let up = upstream.instantiate(Args::new()).unwrap();
        let sink = def
            .instantiate(Args::new().pos(up.port("y").unwrap()))
            .unwrap();
        sink.compute().unwrap();
        // `tap` is not an input, so settling never reaches `up`.
        assert!(!up.0.settled.get());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn processes_attached_mid_step_start_next_cycle() {
        let m = ModuleDef::new("idle").instantiate(Args::new()).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer_log = log.clone();
        let mut spawned = false;
        m.attach(move |top: &Module| -> Result<Step, SimError> {
            outer_log.borrow_mut().push(format!("outer {}", top.cycle()));
            if !spawned {
                spawned = true;
                let inner_log = outer_log.clone();
                top.attach(move |top: &Module| -> Result<Step, SimError> {
                    inner_log.borrow_mut().push(format!("inner {}", top.cycle()));
                    Ok(Step::Done)
                });
            }
            Ok(Step::Continue)
        });
        m.run(2).unwrap();
        assert_eq!(*log.borrow(), ["outer 0", "outer 1", "inner 1"]);
        assert_eq!(m.process_count(), 1);
    }
}
