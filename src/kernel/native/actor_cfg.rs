//! ActorCfg module

use std::sync::Arc;

use tracing::debug;

use crate::error::{KernelError, KernelResult};
use crate::kernel::composite::Obj;
use crate::kernel::env::Env;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::native::NativeModule;
use crate::kernel::proc::NativeProc;
use crate::kernel::value::Value;

pub static MODULE: NativeModule = NativeModule {
    name: "ActorCfg",
    procs: &[("spawn", NativeProc::new("ActorCfg.spawn", actor_cfg_spawn))],
};

// ActorCfg.spawn(cfg, target)
fn actor_cfg_spawn(args: &[Operand], env: &Env, machine: &mut Machine) -> KernelResult<()> {
    check_arg_count(args, 2, "ActorCfg.spawn")?;
    let cfg = match args[0].resolve_value(env)? {
        Value::ActorCfg(cfg) => cfg,
        other => return Err(KernelError::type_mismatch("ActorCfg", other.kind_name()).into()),
    };
    // The child configures on another thread; every capture must be bound
    Value::ActorCfg(Arc::clone(&cfg)).check_complete()?;
    let spawner = machine
        .spawner()
        .cloned()
        .ok_or_else(|| KernelError::InvalidArgument("spawn requires an actor system".to_string()))?;
    let actor = spawner.spawn(machine.owner(), cfg)?;
    debug!(parent = %machine.owner(), child = %actor.address(), "spawned child actor");
    bind_operand(env, &args[1], Value::Obj(Obj::ActorRef(actor)))
}
