//! Token module

use crate::error::KernelResult;
use crate::kernel::env::Env;
use crate::kernel::feature::Token;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::native::NativeModule;
use crate::kernel::proc::NativeProc;
use crate::kernel::value::{Literal, Value};

pub static MODULE: NativeModule = NativeModule {
    name: "Token",
    procs: &[("new", NativeProc::new("Token.new", token_new))],
};

// Token.new(target)
fn token_new(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    check_arg_count(args, 1, "Token.new")?;
    bind_operand(env, &args[0], Value::Lit(Literal::Token(Token::next())))
}
