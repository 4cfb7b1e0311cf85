//! Procedures: closures, native procedures and object bindings

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::KernelResult;
use crate::kernel::actor::ActorCtor;
use crate::kernel::composite::Obj;
use crate::kernel::env::Env;
use crate::kernel::feature::Ident;
use crate::kernel::instr::{Instr, Operand};
use crate::kernel::machine::Machine;
use crate::kernel::native::iter::RecIter;

/// Procedure definition: parameters, body and the free identifiers the
/// body captures from its defining scope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ProcDefRepr", into = "ProcDefRepr")]
pub struct ProcDef {
    params: Vec<Ident>,
    body: Arc<Instr>,
    captures: Vec<Ident>,
}

#[derive(Serialize, Deserialize)]
struct ProcDefRepr {
    params: Vec<Ident>,
    body: Arc<Instr>,
}

impl From<ProcDefRepr> for ProcDef {
    fn from(repr: ProcDefRepr) -> Self {
        ProcDef::new(repr.params, repr.body)
    }
}

impl From<ProcDef> for ProcDefRepr {
    fn from(def: ProcDef) -> Self {
        ProcDefRepr {
            params: def.params,
            body: def.body,
        }
    }
}

impl ProcDef {
    pub fn new(params: Vec<Ident>, body: Arc<Instr>) -> Self {
        let mut bound = params.clone();
        let mut free = std::collections::BTreeSet::new();
        body.collect_free(&mut bound, &mut free);
        ProcDef {
            params,
            body,
            captures: free.into_iter().collect(),
        }
    }

    pub fn params(&self) -> &[Ident] {
        &self.params
    }

    pub fn body(&self) -> &Arc<Instr> {
        &self.body
    }

    pub fn captures(&self) -> &[Ident] {
        &self.captures
    }
}

/// Procedure definition closed over the variables it captures
pub struct Closure {
    pub def: Arc<ProcDef>,
    /// Frame holding exactly the captured identifiers
    pub env: Env,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.def.params)
            .field("captures", &self.def.captures)
            .finish()
    }
}

/// Signature of a native procedure. The last argument is the result target
/// by convention.
pub type NativeFn = fn(&[Operand], &Env, &mut Machine) -> KernelResult<()>;

/// Native procedure
#[derive(Clone, Copy)]
pub struct NativeProc {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeProc {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        NativeProc { name, func }
    }
}

impl fmt::Debug for NativeProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeProc({})", self.name)
    }
}

/// Object procedure table entry bound to a receiver. Cheap to create: the
/// table is static and only the receiver and index are stored.
#[derive(Debug, Clone)]
pub struct ObjProcBinding {
    pub obj: Obj,
    pub index: usize,
}

impl ObjProcBinding {
    pub fn new(obj: Obj, index: usize) -> Self {
        ObjProcBinding { obj, index }
    }
}

/// Callable value
#[derive(Debug, Clone)]
pub enum Proc {
    Closure(Arc<Closure>),
    Native(NativeProc),
    Bound(ObjProcBinding),
    Iter(Arc<RecIter>),
    ActorCtor(Arc<ActorCtor>),
}

impl Proc {
    /// Same procedure instance
    pub fn same(&self, other: &Proc) -> bool {
        match (self, other) {
            (Proc::Closure(a), Proc::Closure(b)) => Arc::ptr_eq(a, b),
            (Proc::Native(a), Proc::Native(b)) => {
                a.name == b.name && a.func as usize == b.func as usize
            }
            (Proc::Bound(a), Proc::Bound(b)) => a.index == b.index && a.obj.same(&b.obj),
            (Proc::Iter(a), Proc::Iter(b)) => Arc::ptr_eq(a, b),
            (Proc::ActorCtor(a), Proc::ActorCtor(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Proc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proc::Closure(_) => f.write_str("<proc>"),
            Proc::Native(native) => write!(f, "<proc {}>", native.name),
            Proc::Bound(binding) => {
                write!(f, "<proc {}.{}>", binding.obj, binding.obj.entry_name(binding.index))
            }
            Proc::Iter(_) => f.write_str("<iter>"),
            Proc::ActorCtor(_) => f.write_str("<actor_ctor>"),
        }
    }
}
