//! # KLVM: Kernel Virtual Machine
//!
//! A dataflow interpreter and actor runtime.
//!
//! The kernel interprets compiled instruction trees over single-assignment
//! dataflow variables. A computation that needs an unbound variable parks
//! its continuation on that variable and resumes once it is bound; long
//! computations yield after a fixed time slice. The runtime hosts many
//! actors on a small worker pool, each processing one envelope at a time.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod kernel;
pub mod runtime;
pub mod types;

pub use error::{
    ConfigError, ConfigResult, Interrupt, KernelError, KernelResult, KlvmError, KlvmResult,
    RuntimeError, RuntimeResult,
};
pub use kernel::{
    ActorRefObj, Complete, ComputeAdvice, Env, FailedValue, Ident, Instr, Kernel, Machine, Operand,
    Pattern, Program, Stack, Value, ValueOrVar, Var,
};
pub use runtime::{ActorBuilder, ActorSystem, RequestClient};
pub use types::{Address, KlvmConfig, DEFAULT_TIME_SLICE};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
