//! KLVM kernel - values, dataflow variables and the instruction interpreter
//!
//! The [`Kernel`] is the explicit runtime context: it owns the configuration
//! and the root environment of native modules, and runs instruction trees
//! outside of any actor.

pub mod actor;
pub mod complete;
pub mod composite;
pub mod env;
pub mod failed;
pub mod feature;
pub mod instr;
pub mod machine;
pub mod native;
pub mod num;
pub mod proc;
pub mod stack;
pub mod unify;
pub mod value;
pub mod var;

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{KlvmResult, RuntimeError, RuntimeResult};
use crate::types::{Address, KlvmConfig};

pub use actor::{ActorCfg, ActorCtor, ActorRef, ActorRefObj, Envelope, Spawner};
pub use complete::Complete;
pub use composite::{Composite, Field, Obj, ObjProcEntry, ObjProcTable, Rec, RecBuilder};
pub use env::{Env, EnvEntry};
pub use failed::{error_record, FailedValue};
pub use feature::{Feature, Ident, Token};
pub use instr::{FieldDef, FieldPattern, Instr, Operand, Pattern};
pub use machine::{ComputeAdvice, Machine};
pub use num::{ArithOp, Num, RelOp};
pub use proc::{Closure, NativeProc, Proc, ProcDef};
pub use stack::{Stack, StackEntry};
pub use unify::{entails, unify};
pub use value::{Literal, Scalar, Value, ValueOrVar};
pub use var::{Continuation, Resume, Var};

/// Owner address of computations run directly by the kernel
pub const KERNEL_OWNER: &str = "kernel";

/// Run queue of resumed stacks for computations outside an actor
pub struct WorkQueue {
    tx: Sender<Stack>,
    rx: Receiver<Stack>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        WorkQueue { tx, rx }
    }

    /// Next resumed stack, if any
    pub fn try_next(&self) -> Option<Stack> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Resume for WorkQueue {
    fn resume(&self, stack: Stack) {
        if self.tx.send(stack).is_err() {
            warn!("work queue closed; dropping resumed stack");
        }
    }
}

/// Compiled program: identifiers to create, then an instruction tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub locals: Vec<Ident>,
    pub instr: Arc<Instr>,
}

impl Program {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Runtime context: configuration plus the root environment
#[derive(Clone)]
pub struct Kernel {
    config: Arc<KlvmConfig>,
    root_env: Env,
}

impl Kernel {
    pub fn new(config: KlvmConfig) -> KlvmResult<Self> {
        config.validate()?;
        Ok(Kernel {
            config: Arc::new(config),
            root_env: native::root_env()?,
        })
    }

    pub fn config(&self) -> &KlvmConfig {
        &self.config
    }

    /// Environment binding the native modules
    pub fn root_env(&self) -> &Env {
        &self.root_env
    }

    /// Run `instr` against `env` to completion or first suspension within
    /// one time slice. A suspended computation is pushed onto `queue` once
    /// the variable it waits on is bound.
    pub fn compute_instr(&self, instr: Arc<Instr>, env: &Env, queue: &Arc<WorkQueue>) -> ComputeAdvice {
        let mut machine = Machine::new(Address::new(KERNEL_OWNER), queue.clone());
        machine.compute(Stack::of(instr, env.clone()), self.config.time_slice)
    }

    /// Run `instr` to the end, driving preemptions and resumptions inline.
    /// Fails when the computation waits on a variable nothing will bind,
    /// halts, or executes more than `step_limit` instructions.
    pub fn run_to_end(&self, instr: Arc<Instr>, env: &Env, step_limit: usize) -> RuntimeResult<()> {
        let queue = Arc::new(WorkQueue::new());
        let mut machine = Machine::new(Address::new(KERNEL_OWNER), queue.clone());
        let mut next = Some(Stack::of(instr, env.clone()));
        let mut parked: Vec<Var> = Vec::new();
        while let Some(stack) = next.take().or_else(|| queue.try_next()) {
            let executed = machine.executed();
            if executed >= step_limit {
                return Err(RuntimeError::StepLimitExceeded(step_limit));
            }
            let slice = self.config.time_slice.min(step_limit - executed);
            match machine.compute(stack, slice) {
                ComputeAdvice::End => {}
                ComputeAdvice::Preempt(stack) => next = Some(stack),
                ComputeAdvice::Wait(var) => parked.push(var),
                ComputeAdvice::Halt(failed) => return Err(RuntimeError::Failed(failed)),
            }
        }
        if let Some(var) = parked.iter().find(|var| !var.is_bound()) {
            return Err(RuntimeError::Blocked(var.to_string()));
        }
        debug!(steps = machine.executed(), "run to end");
        Ok(())
    }

    /// Run a program in a fresh child of the root environment. Returns each
    /// local with its variable.
    pub fn run_program(&self, program: &Program) -> RuntimeResult<Vec<(Ident, Var)>> {
        let env = self.root_env.extend_fresh(&program.locals);
        self.run_to_end(program.instr.clone(), &env, self.config.configure_step_limit)?;
        Ok(env
            .entries()
            .iter()
            .map(|entry| (entry.ident.clone(), entry.var.clone()))
            .collect())
    }
}
