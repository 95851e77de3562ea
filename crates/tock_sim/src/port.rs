//! Declarative module descriptors and instantiation arguments.
//!
//! A [`ModuleDef`] enumerates a module's ports once, at definition time:
//! each port's name, optional [`Direction`], and optional [`PortDefault`].
//! The resolver consumes this descriptor together with the [`Args`] of one
//! instantiation to produce a live [`Module`].

use std::fmt;
use std::rc::Rc;

use crate::error::SimError;
use crate::module::Module;
use crate::register::Register;
use crate::resolver::Resolver;
use crate::signal::Signal;

/// Direction of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read by the module; settling it may trigger its driver.
    Input,
    /// Written by the module, which becomes the signal's driver.
    Output,
}

/// The combinational logic of a module.
pub type Body = Rc<dyn Fn(&Ports<'_>) -> Result<(), SimError>>;

/// Produces a fresh sub-module for each instantiation of the parent.
pub type ModuleFactory = Rc<dyn Fn() -> Result<Module, SimError>>;

/// What a port is bound to when the instantiation does not supply it.
#[derive(Clone)]
pub enum PortDefault {
    /// A specific signal, shared by every instance.
    Signal(Signal),
    /// A named placeholder, connected by the parent to any sibling
    /// holding the same name.
    Placeholder(String),
    /// A fresh register owned by the instance.
    Register,
    /// A fresh sub-module owned by the instance.
    Module(ModuleFactory),
}

impl fmt::Debug for PortDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDefault::Signal(s) => f.debug_tuple("Signal").field(s).finish(),
            PortDefault::Placeholder(p) => f.debug_tuple("Placeholder").field(p).finish(),
            PortDefault::Register => write!(f, "Register"),
            PortDefault::Module(_) => write!(f, "Module(..)"),
        }
    }
}

/// A single declared port.
#[derive(Clone, Debug)]
pub struct PortDecl {
    /// The port name, unique within the module.
    pub name: String,
    /// Declared direction; `None` for plain parameters.
    pub direction: Option<Direction>,
    /// Binding used when the instantiation does not supply one.
    pub default: Option<PortDefault>,
}

impl PortDecl {
    /// An input port with no default.
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, Some(Direction::Input))
    }

    /// An output port with no default.
    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, Some(Direction::Output))
    }

    /// A parameter without a direction.
    pub fn param(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    fn new(name: impl Into<String>, direction: Option<Direction>) -> Self {
        Self {
            name: name.into(),
            direction,
            default: None,
        }
    }

    /// Sets the default binding.
    pub fn with_default(mut self, default: PortDefault) -> Self {
        self.default = Some(default);
        self
    }
}

/// A module definition: its name, ordered ports and logic body.
///
/// Definitions are cheap to clone and are typically captured by the
/// factories of parent modules.
#[derive(Clone)]
pub struct ModuleDef {
    name: String,
    ports: Vec<PortDecl>,
    body: Body,
}

impl ModuleDef {
    /// Starts a definition with no ports and an empty body.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            body: Rc::new(empty_body),
        }
    }

    /// Adds an input port.
    pub fn input(self, name: impl Into<String>) -> Self {
        self.port(PortDecl::input(name))
    }

    /// Adds an output port.
    pub fn output(self, name: impl Into<String>) -> Self {
        self.port(PortDecl::output(name))
    }

    /// Adds a parameter without a direction.
    pub fn param(self, name: impl Into<String>) -> Self {
        self.port(PortDecl::param(name))
    }

    /// Adds a register owned by each instance.
    pub fn register(self, name: impl Into<String>) -> Self {
        self.port(PortDecl::param(name).with_default(PortDefault::Register))
    }

    /// Adds a sub-module instantiated from `def` with `args` for each instance.
    pub fn submodule(self, name: impl Into<String>, def: &ModuleDef, args: Args) -> Self {
        let def = def.clone();
        self.submodule_with(name, move || def.instantiate(args.clone()))
    }

    /// Adds a sub-module produced by `factory` for each instance.
    pub fn submodule_with(
        self,
        name: impl Into<String>,
        factory: impl Fn() -> Result<Module, SimError> + 'static,
    ) -> Self {
        self.port(PortDecl::param(name).with_default(PortDefault::Module(Rc::new(factory))))
    }

    /// Adds an arbitrary port declaration.
    pub fn port(mut self, decl: PortDecl) -> Self {
        self.ports.push(decl);
        self
    }

    /// Sets the logic body.
    pub fn body(mut self, body: impl Fn(&Ports<'_>) -> Result<(), SimError> + 'static) -> Self {
        self.body = Rc::new(body);
        self
    }

    /// Returns the definition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared ports in order.
    pub fn ports(&self) -> &[PortDecl] {
        &self.ports
    }

    pub(crate) fn logic(&self) -> Body {
        Rc::clone(&self.body)
    }

    /// Binds `args` to the declared ports and builds a live module.
    pub fn instantiate(&self, args: Args) -> Result<Module, SimError> {
        Module::instantiate(self, args)
    }
}

fn empty_body(_: &Ports<'_>) -> Result<(), SimError> {
    Ok(())
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

/// A value supplied for a parameter, or the binding a parameter ended up with.
#[derive(Clone, Debug)]
pub enum Binding {
    /// A concrete signal.
    Signal(Signal),
    /// A placeholder name still waiting for a shared signal.
    Pending(String),
    /// A register.
    Register(Register),
    /// A module instance.
    Module(Module),
}

impl Binding {
    pub(crate) fn is_pending(&self, name: &str) -> bool {
        matches!(self, Binding::Pending(p) if p == name)
    }
}

impl From<Signal> for Binding {
    fn from(signal: Signal) -> Self {
        Binding::Signal(signal)
    }
}

impl From<&Signal> for Binding {
    fn from(signal: &Signal) -> Self {
        Binding::Signal(signal.clone())
    }
}

impl From<&str> for Binding {
    fn from(name: &str) -> Self {
        Binding::Pending(name.to_string())
    }
}

impl From<String> for Binding {
    fn from(name: String) -> Self {
        Binding::Pending(name)
    }
}

impl From<Register> for Binding {
    fn from(register: Register) -> Self {
        Binding::Register(register)
    }
}

impl From<Module> for Binding {
    fn from(module: Module) -> Self {
        Binding::Module(module)
    }
}

/// Positional and keyword arguments for one instantiation.
#[derive(Clone, Debug, Default)]
pub struct Args {
    pub(crate) positional: Vec<Binding>,
    pub(crate) keyword: Vec<(String, Binding)>,
}

impl Args {
    /// No arguments: every port takes its default or a fresh signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn pos(mut self, binding: impl Into<Binding>) -> Self {
        self.positional.push(binding.into());
        self
    }

    /// Adds a keyword argument.
    pub fn kw(mut self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        self.keyword.push((name.into(), binding.into()));
        self
    }
}

/// A resolved port, register or sub-module.
#[derive(Clone, Debug)]
pub enum Resource {
    /// A signal-bound port.
    Port(Signal),
    /// An owned or supplied register.
    Register(Register),
    /// A sub-module.
    Module(Module),
}

/// The view a module body gets of its resolved bindings.
pub struct Ports<'a> {
    resolver: &'a Resolver,
}

impl<'a> Ports<'a> {
    pub(crate) fn new(resolver: &'a Resolver) -> Self {
        Self { resolver }
    }

    /// Returns the name of the module being evaluated.
    pub fn module_name(&self) -> &'a str {
        self.resolver.module_name()
    }

    /// Returns the signal bound to port `name`.
    pub fn signal(&self, name: &str) -> Result<&'a Signal, SimError> {
        self.resolver.signal(name)
    }

    /// Returns the register bound to `name`.
    pub fn register(&self, name: &str) -> Result<&'a Register, SimError> {
        self.resolver.register(name)
    }

    /// Returns the sub-module bound to `name`.
    pub fn submodule(&self, name: &str) -> Result<&'a Module, SimError> {
        self.resolver.submodule(name)
    }

    /// Looks up any resource by name.
    pub fn get(&self, name: &str) -> Result<Resource, SimError> {
        self.resolver.get(name)
    }

    /// Iterates every parameter binding in declaration order.
    pub fn bindings(&self) -> impl Iterator<Item = (&'a str, &'a Binding)> + 'a {
        self.resolver.bindings()
    }

    /// Builds a body failure for this module.
    pub fn fail(&self, reason: impl Into<String>) -> SimError {
        SimError::Body {
            module: self.module_name().to_string(),
            reason: reason.into(),
        }
    }
}
