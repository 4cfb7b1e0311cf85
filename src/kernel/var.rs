//! Dataflow variables
//!
//! A variable is bound at most once. Readers that need the value of an
//! unbound variable park a [`Continuation`] on it; binding the variable hands
//! every parked continuation back to its [`Resume`] target exactly once.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Interrupt, KernelResult};
use crate::kernel::stack::Stack;
use crate::kernel::unify::unify_values;
use crate::kernel::value::{Value, ValueOrVar};

/// Receiver of resumed computations
pub trait Resume: Send + Sync {
    /// Schedule a continuation whose blocking variable became bound
    fn resume(&self, stack: Stack);
}

/// Suspended computation waiting on a variable
pub struct Continuation {
    pub stack: Stack,
    pub target: Arc<dyn Resume>,
}

impl Continuation {
    pub fn new(stack: Stack, target: Arc<dyn Resume>) -> Self {
        Continuation { stack, target }
    }

    fn wake(self) {
        self.target.resume(self.stack);
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation").finish_non_exhaustive()
    }
}

enum VarState {
    Unbound(Vec<Continuation>),
    Bound(Value),
    Link(Var),
}

struct VarCell {
    id: u64,
    state: Mutex<VarState>,
}

/// Single-assignment logic variable
#[derive(Clone)]
pub struct Var(Arc<VarCell>);

fn next_var_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl Var {
    /// Create an unbound variable
    pub fn new() -> Self {
        Var(Arc::new(VarCell {
            id: next_var_id(),
            state: Mutex::new(VarState::Unbound(Vec::new())),
        }))
    }

    /// Create a variable already bound to `value`
    pub fn bound(value: Value) -> Self {
        Var(Arc::new(VarCell {
            id: next_var_id(),
            state: Mutex::new(VarState::Bound(value)),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &Var) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Follow links to the end of the chain
    fn representative(&self) -> Var {
        let mut current = self.clone();
        loop {
            let next = match &*current.0.state.lock() {
                VarState::Link(next) => Some(next.clone()),
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// The bound value, or the unbound representative variable
    pub fn resolve(&self) -> ValueOrVar {
        let rep = self.representative();
        let bound = match &*rep.0.state.lock() {
            VarState::Bound(value) => Some(value.clone()),
            _ => None,
        };
        match bound {
            Some(value) => ValueOrVar::Value(value),
            None => ValueOrVar::Var(rep),
        }
    }

    /// The bound value, or the blocking signal naming this variable
    pub fn resolve_value(&self) -> KernelResult<Value> {
        match self.resolve() {
            ValueOrVar::Value(value) => Ok(value),
            ValueOrVar::Var(var) => Err(Interrupt::Blocked(var)),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.resolve(), ValueOrVar::Value(_))
    }

    /// Bind to a value. Binding an already-bound variable unifies the two
    /// values and fails with a bind conflict when they are inconsistent.
    pub fn bind_to_value(&self, value: Value) -> KernelResult<()> {
        loop {
            let rep = self.representative();
            let mut state = rep.0.state.lock();
            match &mut *state {
                VarState::Unbound(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = VarState::Bound(value);
                    drop(state);
                    wake_all(rep.id(), waiters);
                    return Ok(());
                }
                VarState::Bound(existing) => {
                    let existing = existing.clone();
                    drop(state);
                    return unify_values(&existing, &value, &mut HashSet::new());
                }
                // Linked after we found the representative; walk again
                VarState::Link(_) => continue,
            }
        }
    }

    /// Bind two variables together. Two unbound variables merge into one
    /// representative holding the union of both wait-lists.
    pub fn bind_to_var(&self, other: &Var) -> KernelResult<()> {
        loop {
            let a = self.representative();
            let b = other.representative();
            if a.ptr_eq(&b) {
                return Ok(());
            }
            let (first, second) = if a.id() < b.id() { (&a, &b) } else { (&b, &a) };
            let mut first_state = first.0.state.lock();
            let mut second_state = second.0.state.lock();
            match (&mut *first_state, &mut *second_state) {
                (VarState::Link(_), _) | (_, VarState::Link(_)) => continue,
                (VarState::Bound(x), VarState::Bound(y)) => {
                    let (x, y) = (x.clone(), y.clone());
                    drop(second_state);
                    drop(first_state);
                    return unify_values(&x, &y, &mut HashSet::new());
                }
                (VarState::Bound(value), VarState::Unbound(waiters)) => {
                    let value = value.clone();
                    let waiters = std::mem::take(waiters);
                    *second_state = VarState::Bound(value);
                    drop(second_state);
                    drop(first_state);
                    wake_all(second.id(), waiters);
                    return Ok(());
                }
                (VarState::Unbound(waiters), VarState::Bound(value)) => {
                    let value = value.clone();
                    let waiters = std::mem::take(waiters);
                    *first_state = VarState::Bound(value);
                    drop(second_state);
                    drop(first_state);
                    wake_all(first.id(), waiters);
                    return Ok(());
                }
                (VarState::Unbound(first_waiters), VarState::Unbound(second_waiters)) => {
                    let moved = std::mem::take(first_waiters);
                    second_waiters.extend(moved);
                    *first_state = VarState::Link(second.clone());
                    return Ok(());
                }
            }
        }
    }

    /// Bind to a value or to another variable
    pub fn bind_to_value_or_var(&self, other: &ValueOrVar) -> KernelResult<()> {
        match other {
            ValueOrVar::Value(value) => self.bind_to_value(value.clone()),
            ValueOrVar::Var(var) => self.bind_to_var(var),
        }
    }

    /// Park a continuation until this variable is bound. Gives the
    /// continuation back when the variable is already bound.
    pub fn suspend(&self, continuation: Continuation) -> Result<(), Continuation> {
        loop {
            let rep = self.representative();
            let mut state = rep.0.state.lock();
            match &mut *state {
                VarState::Unbound(waiters) => {
                    waiters.push(continuation);
                    return Ok(());
                }
                VarState::Bound(_) => return Err(continuation),
                VarState::Link(_) => continue,
            }
        }
    }
}

fn wake_all(id: u64, waiters: Vec<Continuation>) {
    if !waiters.is_empty() {
        trace!(var = id, count = waiters.len(), "resuming waiters");
    }
    for waiter in waiters {
        waiter.wake();
    }
}

impl Default for Var {
    fn default() -> Self {
        Var::new()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_v{}", self.0.id)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var(_v{})", self.0.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use std::sync::atomic::AtomicUsize;

    struct CountingResume(AtomicUsize);

    impl Resume for CountingResume {
        fn resume(&self, _stack: Stack) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_bind_is_idempotent_for_equal_values() {
        let var = Var::new();
        var.bind_to_value(Value::int32(5)).unwrap();
        var.bind_to_value(Value::int32(5)).unwrap();
        assert!(matches!(var.resolve_value().unwrap(), Value::Num(_)));
    }

    #[test]
    fn test_bind_conflict() {
        let var = Var::new();
        var.bind_to_value(Value::str("a")).unwrap();
        let err = var.bind_to_value(Value::str("b")).unwrap_err();
        assert!(matches!(err, Interrupt::Fault(KernelError::BindConflict { .. })));
    }

    #[test]
    fn test_unbound_resolve_blocks() {
        let var = Var::new();
        match var.resolve_value() {
            Err(Interrupt::Blocked(blocked)) => assert!(blocked.ptr_eq(&var)),
            other => panic!("expected blocked, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_and_bind_propagates() {
        let a = Var::new();
        let b = Var::new();
        a.bind_to_var(&b).unwrap();
        b.bind_to_value(Value::bool(true)).unwrap();
        assert!(a.resolve_value().unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_waiters_resume_exactly_once() {
        let counter = Arc::new(CountingResume(AtomicUsize::new(0)));
        let a = Var::new();
        let b = Var::new();
        a.suspend(Continuation::new(Stack::empty(), counter.clone())).unwrap();
        b.suspend(Continuation::new(Stack::empty(), counter.clone())).unwrap();
        a.bind_to_var(&b).unwrap();
        a.bind_to_value(Value::int32(1)).unwrap();
        b.bind_to_value(Value::int32(1)).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_suspend_on_bound_returns_continuation() {
        let counter = Arc::new(CountingResume(AtomicUsize::new(0)));
        let var = Var::bound(Value::null());
        assert!(var.suspend(Continuation::new(Stack::empty(), counter.clone())).is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
