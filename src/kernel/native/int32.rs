//! Int32 module

use crate::error::{KernelError, KernelResult};
use crate::kernel::env::Env;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::native::NativeModule;
use crate::kernel::proc::NativeProc;
use crate::kernel::value::Value;

pub static MODULE: NativeModule = NativeModule {
    name: "Int32",
    procs: &[("parse", NativeProc::new("Int32.parse", int32_parse))],
};

// Int32.parse(text, target)
fn int32_parse(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    check_arg_count(args, 2, "Int32.parse")?;
    let text = args[0].resolve_value(env)?;
    let text = text.as_str()?;
    let n: i32 = text
        .trim()
        .parse()
        .map_err(|_| KernelError::NumberFormat(format!("'{}' is not an Int32", text)))?;
    bind_operand(env, &args[1], Value::int32(n))
}
