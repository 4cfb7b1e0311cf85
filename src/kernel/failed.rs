//! Represented failure

use std::fmt;

use crate::error::KernelError;
use crate::kernel::composite::Rec;
use crate::kernel::value::{Literal, Value};
use crate::types::Address;

/// Label of records built from kernel faults
pub const ERROR_LABEL: &str = "error";

/// A computation that ended with an uncaught throw.
///
/// Failures are ordinary data: they travel as ask responses and can be
/// inspected or forwarded like any other complete value.
#[derive(Debug, Clone)]
pub struct FailedValue {
    /// Address of the actor (or kernel context) that failed
    pub owner: Address,
    /// The thrown value
    pub error: Value,
    /// Fault that raised the throw, if it came from the VM
    pub native_cause: Option<KernelError>,
}

impl FailedValue {
    pub fn new(owner: Address, error: Value, native_cause: Option<KernelError>) -> Self {
        FailedValue {
            owner,
            error,
            native_cause,
        }
    }

    /// Failure raised directly from a fault
    pub fn from_error(owner: Address, error: KernelError) -> Self {
        FailedValue::new(owner, error_record(&error), Some(error))
    }
}

impl fmt::Display for FailedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed with {}", self.owner, self.error)
    }
}

/// `error#{name: <Str>, message: <Str>}` for a fault
pub fn error_record(error: &KernelError) -> Value {
    let rec = Rec::builder()
        .label(Literal::str(ERROR_LABEL))
        .field("message", Value::str(error.to_string()))
        .field("name", Value::str(error.name()))
        .build();
    match rec {
        Ok(rec) => Value::rec(rec),
        // Features are distinct constants
        Err(_) => Value::str(error.to_string()),
    }
}
