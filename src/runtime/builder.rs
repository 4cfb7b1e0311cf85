//! Staged actor construction
//!
//! `ActorBuilder::new(&system)` then `.construct(..)` or `.with_ctor(..)`,
//! then `.configure(args)` and finally `.spawn()`. Each stage is its own
//! type, so an actor cannot be spawned before its constructor is applied.

use std::sync::Arc;

use tracing::debug;

use crate::error::{KernelError, RuntimeError, RuntimeResult};
use crate::kernel::{
    ActorCfg, ActorCtor, ActorRefObj, Complete, Env, EnvEntry, Ident, Instr, Operand, Proc, Value,
    ValueOrVar, Var,
};
use crate::runtime::{arg_bindings, ActorSystem};
use crate::types::Address;

const CTOR: &str = "$ctor";
const CFG: &str = "$cfg";

/// First stage: choose an address and a constructor
pub struct ActorBuilder<'a> {
    system: &'a ActorSystem,
    address: Option<Address>,
}

impl<'a> ActorBuilder<'a> {
    pub fn new(system: &'a ActorSystem) -> Self {
        ActorBuilder {
            system,
            address: None,
        }
    }

    /// Fixed address; a fresh one is generated otherwise
    pub fn address(mut self, address: impl Into<Address>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Run `instr` in a child of the root environment holding `ctor_ident`,
    /// then take the actor constructor bound to it
    pub fn construct(self, instr: Instr, ctor_ident: &str) -> RuntimeResult<ActorBuilderConstructed<'a>> {
        let kernel = self.system.kernel();
        let ident = Ident::new(ctor_ident);
        let env = kernel.root_env().extend_fresh(&[ident.clone()]);
        kernel.run_to_end(Arc::new(instr), &env, kernel.config().configure_step_limit)?;
        match settled(&env, &ident)? {
            Value::Proc(Proc::ActorCtor(ctor)) => Ok(self.with_ctor(ctor)),
            other => Err(RuntimeError::ConfigureFailed(format!(
                "{} is bound to {}, not an actor constructor",
                ctor_ident,
                other.kind_name()
            ))),
        }
    }

    pub fn with_ctor(self, ctor: Arc<ActorCtor>) -> ActorBuilderConstructed<'a> {
        ActorBuilderConstructed {
            system: self.system,
            address: self.address,
            ctor,
        }
    }
}

/// Second stage: apply the constructor
pub struct ActorBuilderConstructed<'a> {
    system: &'a ActorSystem,
    address: Option<Address>,
    ctor: Arc<ActorCtor>,
}

impl<'a> ActorBuilderConstructed<'a> {
    pub fn ctor(&self) -> &Arc<ActorCtor> {
        &self.ctor
    }

    /// Apply the constructor to `args`, yielding the actor configuration.
    /// Nothing runs inside an actor yet.
    pub fn configure(self, args: Vec<Complete>) -> RuntimeResult<ActorBuilderConfigured<'a>> {
        if args.len() != self.ctor.arity() {
            return Err(KernelError::InvalidArgCount {
                name: "actor constructor".to_string(),
                expected: self.ctor.arity(),
                actual: args.len(),
            }
            .into());
        }
        let kernel = self.system.kernel();
        let (mut entries, mut operands) = arg_bindings(&args);
        let ctor = Value::Proc(Proc::ActorCtor(self.ctor.clone()));
        entries.push(EnvEntry::new(CTOR, Var::bound(ctor)));
        entries.push(EnvEntry::new(CFG, Var::new()));
        operands.push(Operand::ident(CFG));
        let env = kernel.root_env().extend(entries);
        let instr = Instr::apply(CTOR, operands);
        kernel.run_to_end(Arc::new(instr), &env, kernel.config().configure_step_limit)?;
        match settled(&env, &Ident::new(CFG))? {
            Value::ActorCfg(cfg) => Ok(ActorBuilderConfigured {
                system: self.system,
                address: self.address,
                cfg,
            }),
            other => Err(RuntimeError::ConfigureFailed(format!(
                "constructor produced {}",
                other.kind_name()
            ))),
        }
    }
}

/// Final stage: spawn a live actor from the configuration
pub struct ActorBuilderConfigured<'a> {
    system: &'a ActorSystem,
    address: Option<Address>,
    cfg: Arc<ActorCfg>,
}

impl<'a> ActorBuilderConfigured<'a> {
    pub fn actor_cfg(&self) -> &Arc<ActorCfg> {
        &self.cfg
    }

    /// Register the actor and queue its configuration
    pub fn spawn(self) -> RuntimeResult<ActorRefObj> {
        let address = self.address.unwrap_or_else(|| Address::generate("actor"));
        debug!(address = %address, args = self.cfg.args.len(), "spawning actor");
        self.system.spawn(address, self.cfg)
    }
}

fn settled(env: &Env, ident: &Ident) -> RuntimeResult<Value> {
    match env.var(ident)?.resolve() {
        ValueOrVar::Value(value) => Ok(value),
        ValueOrVar::Var(var) => Err(RuntimeError::Blocked(var.to_string())),
    }
}
