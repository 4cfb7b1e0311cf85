//! Rec module

use crate::error::{KernelError, KernelResult};
use crate::kernel::composite::{Composite, Rec};
use crate::kernel::env::Env;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::native::NativeModule;
use crate::kernel::proc::NativeProc;
use crate::kernel::value::Value;

pub static MODULE: NativeModule = NativeModule {
    name: "Rec",
    procs: &[
        ("assign", NativeProc::new("Rec.assign", rec_assign)),
        ("size", NativeProc::new("Rec.size", rec_size)),
    ],
};

/// Fields of `from` plus the fields of `to` that `from` lacks. The result
/// has a null label.
pub fn assign(from: &Rec, to: &Rec) -> Result<Rec, KernelError> {
    let mut builder = Rec::builder();
    for field in from.fields() {
        builder.add(field.feature.clone(), field.value.clone());
    }
    for field in to.fields() {
        if !from.contains(&field.feature) {
            builder.add(field.feature.clone(), field.value.clone());
        }
    }
    builder.build()
}

// Rec.assign(from, to, target)
fn rec_assign(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    check_arg_count(args, 3, "Rec.assign")?;
    let from = args[0].resolve_value(env)?;
    let to = args[1].resolve_value(env)?;
    let result = assign(from.as_rec()?, to.as_rec()?)?;
    bind_operand(env, &args[2], Value::rec(result))
}

// Rec.size(rec, target)
fn rec_size(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    check_arg_count(args, 2, "Rec.size")?;
    let rec = args[0].resolve_value(env)?;
    let size = rec.as_rec()?.field_count() as i32;
    bind_operand(env, &args[1], Value::int32(size))
}
