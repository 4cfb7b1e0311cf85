//! Built-in native modules
//!
//! Each module exposes a namesake record whose features are native
//! procedures, for example `Int32.parse`. Native procedures validate their
//! argument count, resolve what they need (blocking when an argument is
//! still unbound) and bind their result into the last argument.

pub mod actor_cfg;
pub mod cell;
pub mod int32;
pub mod iter;
pub mod rec;
pub mod token;

use crate::error::KernelError;
use crate::kernel::composite::Rec;
use crate::kernel::env::Env;
use crate::kernel::feature::Ident;
use crate::kernel::proc::{NativeProc, Proc};
use crate::kernel::value::Value;

/// A native module: its namesake identifier and procedures
pub struct NativeModule {
    pub name: &'static str,
    pub procs: &'static [(&'static str, NativeProc)],
}

impl NativeModule {
    /// Namesake record `{name: <proc>, ...}`
    pub fn namesake(&self) -> Result<Value, KernelError> {
        let mut builder = Rec::builder();
        for (feature, proc) in self.procs {
            builder = builder.field(*feature, Value::Proc(Proc::Native(*proc)));
        }
        Ok(Value::rec(builder.build()?))
    }
}

/// Every module bound in the root environment
pub fn modules() -> [&'static NativeModule; 7] {
    [
        &actor_cfg::MODULE,
        &cell::MODULE,
        &int32::MODULE,
        &rec::MODULE,
        &token::MODULE,
        &iter::FIELD_ITER_MODULE,
        &iter::VALUE_ITER_MODULE,
    ]
}

/// Root environment binding each module's namesake record
pub fn root_env() -> Result<Env, KernelError> {
    let mut values = Vec::new();
    for module in modules() {
        values.push((Ident::new(module.name), module.namesake()?));
    }
    Ok(Env::with_values(None, values))
}
