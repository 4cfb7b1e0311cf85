//! Mutable single-slot cells

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::KernelResult;
use crate::kernel::composite::{Obj, ObjProcEntry, ObjProcTable};
use crate::kernel::env::Env;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::native::NativeModule;
use crate::kernel::proc::NativeProc;
use crate::kernel::unify::unify;
use crate::kernel::value::{Value, ValueOrVar};

pub static MODULE: NativeModule = NativeModule {
    name: "Cell",
    procs: &[("new", NativeProc::new("Cell.new", cell_new))],
};

// Cell.new(initial, target)
fn cell_new(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    check_arg_count(args, 2, "Cell.new")?;
    let initial = args[0].resolve_value_or_var(env)?;
    let cell = CellObj::new(initial);
    bind_operand(env, &args[1], Value::Obj(Obj::Cell(Arc::new(cell))))
}

static CELL_PROCS: ObjProcTable<CellObj> = ObjProcTable::new(&[
    ObjProcEntry {
        name: "get",
        proc: CellObj::get_proc,
    },
    ObjProcEntry {
        name: "set",
        proc: CellObj::set_proc,
    },
]);

/// Mutable cell holding a value or an unbound variable. Inherently partial.
pub struct CellObj {
    content: Mutex<ValueOrVar>,
}

impl CellObj {
    pub fn new(initial: ValueOrVar) -> Self {
        CellObj {
            content: Mutex::new(initial),
        }
    }

    pub fn procs() -> &'static ObjProcTable<CellObj> {
        &CELL_PROCS
    }

    pub fn get(&self) -> ValueOrVar {
        self.content.lock().clone()
    }

    /// Replace the content, returning the previous one
    pub fn set(&self, content: ValueOrVar) -> ValueOrVar {
        std::mem::replace(&mut *self.content.lock(), content)
    }

    // cell.get(target)
    fn get_proc(&self, args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
        check_arg_count(args, 1, "Cell.get")?;
        unify(&args[0].resolve_value_or_var(env)?, &self.get())
    }

    // cell.set(value)
    fn set_proc(&self, args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
        check_arg_count(args, 1, "Cell.set")?;
        self.set(args[0].resolve_value_or_var(env)?);
        Ok(())
    }
}

impl fmt::Debug for CellObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellObj({})", self.get())
    }
}
