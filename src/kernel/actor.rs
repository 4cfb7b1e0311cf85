//! Actor values seen from inside the kernel
//!
//! An [`ActorCtor`] applied to its arguments yields an [`ActorCfg`]: plain
//! data from which the runtime instantiates a live actor. A live actor is
//! reachable through an [`ActorRefObj`], a complete value whose `ask` and
//! `tell` procedures enqueue [`Envelope`]s. Kernel code turns a configuration
//! into a live actor through the machine's [`Spawner`].

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{KernelError, KernelResult};
use crate::kernel::complete::Complete;
use crate::kernel::composite::{ObjProcEntry, ObjProcTable};
use crate::kernel::env::Env;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::proc::Closure;
use crate::kernel::value::{Value, ValueOrVar};
use crate::types::Address;

/// Anything that accepts envelopes: live actors and external requesters
pub trait ActorRef: Send + Sync {
    fn address(&self) -> &Address;

    /// Thread-safe enqueue. Envelopes sent to a stopped receiver are dropped.
    fn send(&self, envelope: Envelope);
}

/// Creates live actors for kernel code running inside an actor system
pub trait Spawner: Send + Sync {
    /// Start an actor from `cfg` at a fresh address derived from `parent`
    fn spawn(&self, parent: &Address, cfg: Arc<ActorCfg>) -> Result<ActorRefObj, KernelError>;
}

/// Unit of communication between actors
pub enum Envelope {
    /// Ask: the receiver answers with a `Response` to `requester`
    Request {
        message: Complete,
        requester: Arc<dyn ActorRef>,
        target: ValueOrVar,
    },
    /// Tell: no response path
    Notify { message: Complete },
    /// Answer to a request, bound into `target` by the requester
    Response { value: Complete, target: ValueOrVar },
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => "request",
            Envelope::Notify { .. } => "notify",
            Envelope::Response { .. } => "response",
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::Request {
                message, requester, ..
            } => write!(f, "Request({} from {})", message, requester.address()),
            Envelope::Notify { message } => write!(f, "Notify({})", message),
            Envelope::Response { value, .. } => write!(f, "Response({})", value),
        }
    }
}

/// Complete value referring to an actor
#[derive(Clone)]
pub struct ActorRefObj(Arc<dyn ActorRef>);

static ACTOR_REF_PROCS: ObjProcTable<ActorRefObj> = ObjProcTable::new(&[
    ObjProcEntry {
        name: "ask",
        proc: ActorRefObj::ask,
    },
    ObjProcEntry {
        name: "tell",
        proc: ActorRefObj::tell,
    },
]);

impl ActorRefObj {
    pub fn new(actor: Arc<dyn ActorRef>) -> Self {
        ActorRefObj(actor)
    }

    pub fn procs() -> &'static ObjProcTable<ActorRefObj> {
        &ACTOR_REF_PROCS
    }

    pub fn address(&self) -> &Address {
        self.0.address()
    }

    pub fn actor(&self) -> &Arc<dyn ActorRef> {
        &self.0
    }

    pub fn send(&self, envelope: Envelope) {
        self.0.send(envelope)
    }

    /// Same live actor. A later actor spawned at a reused address is a
    /// different actor.
    pub fn same(&self, other: &ActorRefObj) -> bool {
        Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
    }

    // ask(message, target)
    fn ask(&self, args: &[Operand], env: &Env, machine: &mut Machine) -> KernelResult<()> {
        check_arg_count(args, 2, "ActorRef.ask")?;
        let requester = machine
            .actor()
            .cloned()
            .ok_or_else(|| KernelError::InvalidArgument("ask requires an actor context".to_string()))?;
        if requester.address() == self.address() {
            return Err(KernelError::SelfRefAsk(self.address().to_string()).into());
        }
        let message = args[0].resolve_value_or_var(env)?.check_complete()?;
        let target = args[1].resolve_value_or_var(env)?;
        trace!(from = %requester.address(), to = %self.address(), "ask");
        self.send(Envelope::Request {
            message,
            requester,
            target,
        });
        Ok(())
    }

    // tell(message)
    fn tell(&self, args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
        check_arg_count(args, 1, "ActorRef.tell")?;
        let message = args[0].resolve_value_or_var(env)?.check_complete()?;
        trace!(to = %self.address(), "tell");
        self.send(Envelope::Notify { message });
        Ok(())
    }
}

impl fmt::Debug for ActorRefObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRefObj({})", self.address())
    }
}

/// Actor constructor: wraps the handlers-constructor closure
#[derive(Debug)]
pub struct ActorCtor {
    handlers_ctor: Arc<Closure>,
}

impl ActorCtor {
    pub fn new(handlers_ctor: Arc<Closure>) -> Self {
        ActorCtor { handlers_ctor }
    }

    pub fn handlers_ctor(&self) -> &Arc<Closure> {
        &self.handlers_ctor
    }

    /// Number of constructor arguments, excluding the result target
    pub fn arity(&self) -> usize {
        self.handlers_ctor.def.params().len().saturating_sub(1)
    }

    /// `ctor(a0, ..., an, target)`: completes the arguments and binds the
    /// target to the resulting configuration. No actor is created yet.
    pub(crate) fn apply(&self, args: &[Operand], env: &Env) -> KernelResult<()> {
        check_arg_count(args, self.arity() + 1, "actor constructor")?;
        let (target, ctor_args) = match args.split_last() {
            Some(split) => split,
            None => return Err(KernelError::InvalidArgument("missing target".to_string()).into()),
        };
        let mut completed = Vec::with_capacity(ctor_args.len());
        for arg in ctor_args {
            completed.push(arg.resolve_value_or_var(env)?.check_complete()?);
        }
        let cfg = ActorCfg::new(completed, self.handlers_ctor.clone());
        bind_operand(env, target, Value::ActorCfg(Arc::new(cfg)))
    }
}

/// Constructor arguments paired with the handlers constructor
#[derive(Debug)]
pub struct ActorCfg {
    pub args: Vec<Complete>,
    pub handlers_ctor: Arc<Closure>,
}

impl ActorCfg {
    pub fn new(args: Vec<Complete>, handlers_ctor: Arc<Closure>) -> Self {
        ActorCfg {
            args,
            handlers_ctor,
        }
    }
}
