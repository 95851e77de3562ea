//! Port binding and automatic sibling wiring.
//!
//! [`Resolver`] turns a [`ModuleDef`]'s declared ports plus one
//! instantiation's [`Args`] into concrete bindings:
//!
//! 1. Keyword arguments must name declared ports.
//! 2. Each port takes, in order of preference, its positional argument, its
//!    keyword argument, its declared default, or a fresh anonymous signal.
//! 3. Register and sub-module defaults become owned by the instance.
//! 4. Sub-modules holding a pending placeholder with the same text are
//!    connected through one shared signal, created here and only here.
//!
//! Driver claims for output ports need the owning module handle, so they are
//! made by [`Module`] once it exists.

use tracing::{debug, trace};

use crate::error::SimError;
use crate::module::Module;
use crate::port::{Args, Binding, Direction, ModuleDef, PortDefault, Resource};
use crate::register::Register;
use crate::signal::Signal;

/// Where a binding came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    Positional,
    Keyword,
    Default,
    /// No argument and no default: a fresh anonymous signal.
    Auto,
}

#[derive(Debug)]
struct Slot {
    name: String,
    direction: Option<Direction>,
    origin: Origin,
    binding: Binding,
}

/// The resolved bindings of one module instance.
#[derive(Debug)]
pub(crate) struct Resolver {
    module: String,
    /// One slot per declared port, in declaration order.
    slots: Vec<Slot>,
    submodules: Vec<(String, Module)>,
    registers: Vec<(String, Register)>,
}

impl Resolver {
    /// Binds `args` against `def`'s declared ports and wires sibling
    /// placeholders.
    pub(crate) fn bind(def: &ModuleDef, args: Args) -> Result<Self, SimError> {
        let module = def.name().to_string();
        let decls = def.ports();

        for (index, decl) in decls.iter().enumerate() {
            if decls[..index].iter().any(|d| d.name == decl.name) {
                return Err(SimError::DuplicatePort {
                    module,
                    name: decl.name.clone(),
                });
            }
        }

        let positional_count = args.positional.len();
        if positional_count > decls.len() {
            return Err(SimError::TooManyArguments {
                module,
                expected: decls.len(),
                given: positional_count,
            });
        }

        let mut keyword: Vec<(String, Binding)> = Vec::with_capacity(args.keyword.len());
        for (name, binding) in args.keyword {
            let Some(index) = decls.iter().position(|d| d.name == name) else {
                return Err(SimError::UnknownParameter { module, name });
            };
            if index < positional_count || keyword.iter().any(|(k, _)| *k == name) {
                return Err(SimError::DuplicateBinding { module, name });
            }
            keyword.push((name, binding));
        }

        let mut resolver = Resolver {
            module,
            slots: Vec::with_capacity(decls.len()),
            submodules: Vec::new(),
            registers: Vec::new(),
        };

        let mut positional = args.positional.into_iter();
        for decl in decls {
            let (origin, binding) = if let Some(binding) = positional.next() {
                (Origin::Positional, binding)
            } else if let Some(index) = keyword.iter().position(|(k, _)| *k == decl.name) {
                (Origin::Keyword, keyword.swap_remove(index).1)
            } else if let Some(default) = &decl.default {
                (Origin::Default, resolver.materialize(&decl.name, default)?)
            } else {
                (Origin::Auto, Binding::Signal(Signal::new()))
            };
            resolver.slots.push(Slot {
                name: decl.name.clone(),
                direction: decl.direction,
                origin,
                binding,
            });
        }

        resolver.auto_wire()?;
        Ok(resolver)
    }

    fn materialize(&mut self, name: &str, default: &PortDefault) -> Result<Binding, SimError> {
        Ok(match default {
            PortDefault::Signal(signal) => Binding::Signal(signal.clone()),
            PortDefault::Placeholder(text) => Binding::Pending(text.clone()),
            PortDefault::Register => {
                let register = Register::new();
                self.registers.push((name.to_string(), register.clone()));
                Binding::Register(register)
            }
            PortDefault::Module(factory) => {
                let module = factory()?;
                self.submodules.push((name.to_string(), module.clone()));
                Binding::Module(module)
            }
        })
    }

    /// Connects every placeholder name held by two or more sub-modules
    /// through one fresh signal labelled with that name.
    fn auto_wire(&self) -> Result<(), SimError> {
        // placeholder -> indices of the sub-modules holding it, first-seen order
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (index, (_, sub)) in self.submodules.iter().enumerate() {
            for name in sub.pending_placeholders() {
                match groups.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, holders)) => holders.push(index),
                    None => groups.push((name, vec![index])),
                }
            }
        }

        for (name, holders) in groups {
            if holders.len() < 2 {
                trace!(module = %self.module, placeholder = %name, "placeholder left pending");
                continue;
            }
            debug!(
                module = %self.module,
                placeholder = %name,
                fanout = holders.len(),
                "auto-wired placeholder"
            );
            let signal = Signal::named(name.as_str());
            for index in holders {
                self.submodules[index].1.connect_placeholder(&name, &signal)?;
            }
        }
        Ok(())
    }

    /// Replaces every pending `name` binding with `signal`. Returns how many
    /// slots were bound.
    pub(crate) fn connect_placeholder(&mut self, name: &str, signal: &Signal) -> usize {
        let mut bound = 0;
        for slot in self.slots.iter_mut().filter(|s| s.binding.is_pending(name)) {
            slot.binding = Binding::Signal(signal.clone());
            bound += 1;
        }
        bound
    }

    /// Rebinds one port to `signal`.
    ///
    /// `key` first matches a slot still pending on that placeholder text
    /// (positional arguments before the rest), then a port name. Returns the
    /// signal previously bound to an output slot so the caller can release
    /// its driver claim.
    pub(crate) fn rebind(&mut self, key: &str, signal: Signal) -> Result<Option<Signal>, SimError> {
        let index = self
            .slots
            .iter()
            .position(|s| s.origin == Origin::Positional && s.binding.is_pending(key))
            .or_else(|| self.slots.iter().position(|s| s.binding.is_pending(key)))
            .or_else(|| self.slots.iter().position(|s| s.name == key))
            .ok_or_else(|| self.not_found(key))?;

        let slot = &mut self.slots[index];
        if matches!(slot.binding, Binding::Register(_) | Binding::Module(_)) {
            return Err(SimError::WrongKind {
                module: self.module.clone(),
                name: slot.name.clone(),
                expected: "port",
            });
        }
        let previous = std::mem::replace(&mut slot.binding, Binding::Signal(signal));
        Ok(match previous {
            Binding::Signal(old) if slot.direction == Some(Direction::Output) => Some(old),
            _ => None,
        })
    }

    pub(crate) fn module_name(&self) -> &str {
        &self.module
    }

    /// Signals bound to input ports.
    pub(crate) fn inputs(&self) -> Vec<Signal> {
        self.signals_with(Direction::Input).cloned().collect()
    }

    /// Signals bound to output ports.
    pub(crate) fn outputs(&self) -> impl Iterator<Item = &Signal> {
        self.signals_with(Direction::Output)
    }

    fn signals_with(&self, direction: Direction) -> impl Iterator<Item = &Signal> {
        self.slots
            .iter()
            .filter(move |s| s.direction == Some(direction))
            .filter_map(|s| match &s.binding {
                Binding::Signal(signal) => Some(signal),
                _ => None,
            })
    }

    /// Distinct placeholder names still pending, in slot order.
    pub(crate) fn pending_placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for slot in &self.slots {
            if let Binding::Pending(name) = &slot.binding {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub(crate) fn submodules(&self) -> impl Iterator<Item = &Module> {
        self.submodules.iter().map(|(_, m)| m)
    }

    pub(crate) fn registers(&self) -> impl Iterator<Item = &Register> {
        self.registers.iter().map(|(_, r)| r)
    }

    pub(crate) fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.slots.iter().map(|s| (s.name.as_str(), &s.binding))
    }

    fn slot(&self, name: &str) -> Result<&Slot, SimError> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| self.not_found(name))
    }

    fn not_found(&self, name: &str) -> SimError {
        SimError::NotFound {
            module: self.module.clone(),
            name: name.to_string(),
        }
    }

    fn unresolved(&self, slot: &Slot, placeholder: &str) -> SimError {
        SimError::UnresolvedPort {
            module: self.module.clone(),
            name: slot.name.clone(),
            placeholder: placeholder.to_string(),
        }
    }

    fn wrong_kind(&self, slot: &Slot, expected: &'static str) -> SimError {
        SimError::WrongKind {
            module: self.module.clone(),
            name: slot.name.clone(),
            expected,
        }
    }

    pub(crate) fn get(&self, name: &str) -> Result<Resource, SimError> {
        let slot = self.slot(name)?;
        match &slot.binding {
            Binding::Signal(s) => Ok(Resource::Port(s.clone())),
            Binding::Register(r) => Ok(Resource::Register(r.clone())),
            Binding::Module(m) => Ok(Resource::Module(m.clone())),
            Binding::Pending(p) => Err(self.unresolved(slot, p)),
        }
    }

    pub(crate) fn signal(&self, name: &str) -> Result<&Signal, SimError> {
        let slot = self.slot(name)?;
        match &slot.binding {
            Binding::Signal(s) => Ok(s),
            Binding::Pending(p) => Err(self.unresolved(slot, p)),
            _ => Err(self.wrong_kind(slot, "signal")),
        }
    }

    pub(crate) fn register(&self, name: &str) -> Result<&Register, SimError> {
        let slot = self.slot(name)?;
        match &slot.binding {
            Binding::Register(r) => Ok(r),
            _ => Err(self.wrong_kind(slot, "register")),
        }
    }

    pub(crate) fn submodule(&self, name: &str) -> Result<&Module, SimError> {
        let slot = self.slot(name)?;
        match &slot.binding {
            Binding::Module(m) => Ok(m),
            _ => Err(self.wrong_kind(slot, "sub-module")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortDecl;

    fn origins(resolver: &Resolver) -> Vec<Origin> {
        resolver.slots.iter().map(|s| s.origin).collect()
    }

    #[test]
    fn binding_precedence() {
        let shared = Signal::named("shared");
        let def = ModuleDef::new("m")
            .input("a")
            .input("b")
            .port(PortDecl::input("c").with_default(PortDefault::Signal(shared.clone())))
            .output("d");
        let a = Signal::named("a");
        let b = Signal::named("b");
        let resolver = Resolver::bind(&def, Args::new().pos(&a).kw("b", &b)).unwrap();

        assert_eq!(
            origins(&resolver),
            [Origin::Positional, Origin::Keyword, Origin::Default, Origin::Auto]
        );
        assert!(resolver.signal("a").unwrap().ptr_eq(&a));
        assert!(resolver.signal("b").unwrap().ptr_eq(&b));
        assert!(resolver.signal("c").unwrap().ptr_eq(&shared));
        assert!(resolver.signal("d").unwrap().label().is_none());
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        let def = ModuleDef::new("m").input("a");
        let err = Resolver::bind(&def, Args::new().kw("z", Signal::new())).unwrap_err();
        assert!(matches!(err, SimError::UnknownParameter { ref name, .. } if name == "z"));
    }

    #[test]
    fn keyword_repeating_positional_is_rejected() {
        let def = ModuleDef::new("m").input("a").input("b");
        let args = Args::new().pos(Signal::new()).kw("a", Signal::new());
        let err = Resolver::bind(&def, args).unwrap_err();
        assert!(matches!(err, SimError::DuplicateBinding { ref name, .. } if name == "a"));
    }

    #[test]
    fn too_many_positionals_are_rejected() {
        let def = ModuleDef::new("m").input("a");
        let args = Args::new().pos(Signal::new()).pos(Signal::new());
        let err = Resolver::bind(&def, args).unwrap_err();
        assert!(matches!(
            err,
            SimError::TooManyArguments {
                expected: 1,
                given: 2,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_port_declaration_is_rejected() {
        let def = ModuleDef::new("m").input("a").output("a");
        let err = Resolver::bind(&def, Args::new()).unwrap_err();
        assert!(matches!(err, SimError::DuplicatePort { .. }));
    }

    #[test]
    fn register_defaults_are_owned_and_fresh() {
        let def = ModuleDef::new("m").register("r");
        let first = Resolver::bind(&def, Args::new()).unwrap();
        let second = Resolver::bind(&def, Args::new()).unwrap();
        assert_eq!(first.registers().count(), 1);
        assert!(!first
            .register("r")
            .unwrap()
            .ptr_eq(second.register("r").unwrap()));
    }

    #[test]
    fn lookups_report_kind_mismatch() {
        let def = ModuleDef::new("m").input("a").register("r");
        let resolver = Resolver::bind(&def, Args::new()).unwrap();
        assert!(matches!(
            resolver.register("a"),
            Err(SimError::WrongKind { expected: "register", .. })
        ));
        assert!(matches!(
            resolver.signal("r"),
            Err(SimError::WrongKind { expected: "signal", .. })
        ));
        assert!(matches!(
            resolver.submodule("a"),
            Err(SimError::WrongKind { .. })
        ));
        assert!(matches!(resolver.get("nope"), Err(SimError::NotFound { .. })));
    }

    #[test]
    fn pending_placeholder_is_unresolved() {
        let def = ModuleDef::new("m").input("a");
        let resolver = Resolver::bind(&def, Args::new().kw("a", "cnt")).unwrap();
        assert_eq!(resolver.pending_placeholders(), ["cnt"]);
        assert!(matches!(
            resolver.signal("a"),
            Err(SimError::UnresolvedPort { ref placeholder, .. }) if placeholder == "cnt"
        ));
        assert!(resolver.inputs().is_empty());
    }

    #[test]
    fn connect_placeholder_binds_every_matching_slot() {
        let def = ModuleDef::new("m").input("a").input("b").input("c");
        let mut resolver =
            Resolver::bind(&def, Args::new().pos("x").pos("x").pos("y")).unwrap();
        let wire = Signal::named("x");
        assert_eq!(resolver.connect_placeholder("x", &wire), 2);
        assert!(resolver.signal("a").unwrap().ptr_eq(&wire));
        assert!(resolver.signal("b").unwrap().ptr_eq(&wire));
        assert_eq!(resolver.pending_placeholders(), ["y"]);
    }

    #[test]
    fn rebind_prefers_placeholder_text_then_name() {
        let def = ModuleDef::new("m").input("a").output("b");
        let mut resolver = Resolver::bind(&def, Args::new().pos("b")).unwrap();

        // "b" matches the pending placeholder on port `a`, not the port named `b`.
        let wire = Signal::named("wire");
        assert!(resolver.rebind("b", wire.clone()).unwrap().is_none());
        assert!(resolver.signal("a").unwrap().ptr_eq(&wire));

        // Now no slot is pending on "b", so the name is used; the old output comes back.
        let old = resolver.signal("b").unwrap().clone();
        let replaced = resolver.rebind("b", Signal::new()).unwrap();
        assert!(replaced.is_some_and(|s| s.ptr_eq(&old)));
    }

    #[test]
    fn rebind_rejects_registers_and_unknown_names() {
        let def = ModuleDef::new("m").register("r");
        let mut resolver = Resolver::bind(&def, Args::new()).unwrap();
        assert!(matches!(
            resolver.rebind("r", Signal::new()),
            Err(SimError::WrongKind { .. })
        ));
        assert!(matches!(
            resolver.rebind("q", Signal::new()),
            Err(SimError::NotFound { .. })
        ));
    }
}
