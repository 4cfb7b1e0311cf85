//! Error types for KLVM

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::kernel::{FailedValue, Var};
use crate::types::Address;

/// Longest value text carried in a fault
pub const FAULT_TEXT_LIMIT: usize = 512;

/// Main error type for KLVM operations
#[derive(Error, Debug)]
pub enum KlvmError {
    /// Kernel faults
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// Actor runtime errors
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed program documents
    #[error("Invalid program: {0}")]
    Program(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults raised while executing kernel instructions or native procedures.
///
/// A fault is never a crash: the machine converts it into an error record that
/// the running program may catch, and an uncaught fault ends the computation
/// with a [`FailedValue`].
#[derive(Error, Debug, Clone)]
pub enum KernelError {
    /// Selecting a feature that a composite does not have
    #[error("Feature not found: {feature} in {value}")]
    FeatureNotFound { feature: String, value: String },

    /// Indexing a composite outside of its field range
    #[error("Index out of bounds: {index} (field count {count})")]
    IndexOutOfBounds { index: usize, count: usize },

    /// Calling a procedure with the wrong number of arguments
    #[error("Invalid argument count for {name}: expected {expected}, got {actual}")]
    InvalidArgCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Completing a value that is inherently partial (cells, iterators)
    #[error("Cannot complete value: {0}")]
    CannotComplete(String),

    /// An actor asking itself would deadlock its own mailbox
    #[error("Actor {0} cannot ask itself")]
    SelfRefAsk(String),

    /// Binding a variable to a value inconsistent with its current binding
    #[error("Bind conflict: {existing} is not {incoming}")]
    BindConflict { existing: String, incoming: String },

    /// Operand of an unexpected type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Identifier missing from the environment
    #[error("Identifier not found: {0}")]
    IdentNotFound(String),

    /// Arithmetic fault such as division by zero
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// A case instruction without an else branch found no match
    #[error("No match found for {0}")]
    NoMatch(String),

    /// Invalid argument to a native procedure
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Text that does not parse as a number
    #[error("Number format error: {0}")]
    NumberFormat(String),

    /// Applying a value that is not a procedure
    #[error("Not a procedure: {0}")]
    NotAProc(String),

    /// Using a represented failure as an ordinary operand
    #[error("Failed value: {0}")]
    FailedValue(Arc<FailedValue>),
}

impl KernelError {
    /// Stable name used in error records
    pub fn name(&self) -> &'static str {
        match self {
            KernelError::FeatureNotFound { .. } => "FeatureNotFound",
            KernelError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            KernelError::InvalidArgCount { .. } => "InvalidArgCount",
            KernelError::CannotComplete(_) => "CannotComplete",
            KernelError::SelfRefAsk(_) => "SelfRefAsk",
            KernelError::BindConflict { .. } => "BindConflict",
            KernelError::TypeMismatch { .. } => "TypeMismatch",
            KernelError::IdentNotFound(_) => "IdentNotFound",
            KernelError::Arithmetic(_) => "Arithmetic",
            KernelError::NoMatch(_) => "NoMatch",
            KernelError::InvalidArgument(_) => "InvalidArgument",
            KernelError::NumberFormat(_) => "NumberFormat",
            KernelError::NotAProc(_) => "NotAProc",
            KernelError::FailedValue(_) => "FailedValue",
        }
    }

    pub(crate) fn feature_not_found(feature: &impl fmt::Display, value: &impl fmt::Display) -> Self {
        KernelError::FeatureNotFound {
            feature: capped_text(feature),
            value: capped_text(value),
        }
    }

    pub(crate) fn bind_conflict(existing: &impl fmt::Display, incoming: &impl fmt::Display) -> Self {
        KernelError::BindConflict {
            existing: capped_text(existing),
            incoming: capped_text(incoming),
        }
    }

    pub(crate) fn type_mismatch(expected: &str, actual: impl ToString) -> Self {
        KernelError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Display text cut to [`FAULT_TEXT_LIMIT`] bytes on a char boundary
fn capped_text(value: &impl fmt::Display) -> String {
    let mut text = value.to_string();
    if text.len() > FAULT_TEXT_LIMIT {
        let mut end = FAULT_TEXT_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    text
}

/// Non-local outcome of a kernel step.
///
/// `Blocked` is the suspension signal: the step needs the value of an unbound
/// variable. It is never reported as an error; the machine parks the
/// continuation on the variable instead.
#[derive(Error, Debug, Clone)]
pub enum Interrupt {
    /// Waiting on an unbound variable
    #[error("Blocked on unbound variable {0}")]
    Blocked(Var),

    /// A fault
    #[error(transparent)]
    Fault(#[from] KernelError),
}

/// Actor runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The actor stopped accepting envelopes
    #[error("Actor {0} is terminated")]
    ActorTerminated(Address),

    /// No actor registered at the address
    #[error("Actor {0} not found")]
    ActorNotFound(Address),

    /// Another live actor already holds the address
    #[error("Address {0} is already in use")]
    AddressInUse(Address),

    /// Ask response did not arrive in time
    #[error("Request to {address} timed out after {timeout:?}")]
    RequestTimeout { address: Address, timeout: Duration },

    /// Response channel closed before a response arrived
    #[error("Response channel for {0} disconnected")]
    Disconnected(Address),

    /// Actor constructor or handlers constructor did not produce a configuration
    #[error("Configure failed: {0}")]
    ConfigureFailed(String),

    /// Synchronous computation waited on a variable nothing will bind
    #[error("Computation blocked on unbound variable {0}")]
    Blocked(String),

    /// Synchronous computation exceeded its step bound
    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    /// Computation halted with an uncaught failure
    #[error("Computation failed: {0}")]
    Failed(Arc<FailedValue>),

    /// Executor no longer accepts work
    #[error("Executor is shut down")]
    ExecutorShutdown,

    /// A worker thread could not be started
    #[error("Failed to start worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    /// Kernel fault outside of a computation
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to render TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Out-of-range value
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for KLVM operations
pub type KlvmResult<T> = Result<T, KlvmError>;

/// Result type for kernel steps that may suspend
pub type KernelResult<T> = Result<T, Interrupt>;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;
