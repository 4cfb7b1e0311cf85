//! Field and value iterators over records

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::KernelResult;
use crate::kernel::composite::{Composite, Rec};
use crate::kernel::env::Env;
use crate::kernel::instr::Operand;
use crate::kernel::machine::{bind_operand, check_arg_count, Machine};
use crate::kernel::native::NativeModule;
use crate::kernel::proc::{NativeProc, Proc};
use crate::kernel::unify::unify;
use crate::kernel::value::{Literal, Value, ValueOrVar};

pub static FIELD_ITER_MODULE: NativeModule = NativeModule {
    name: "FieldIter",
    procs: &[("new", NativeProc::new("FieldIter.new", field_iter_new))],
};

pub static VALUE_ITER_MODULE: NativeModule = NativeModule {
    name: "ValueIter",
    procs: &[("new", NativeProc::new("ValueIter.new", value_iter_new))],
};

/// What each step of an iterator yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    /// `[feature, value]` tuples
    Fields,
    /// Field values
    Values,
}

/// Stateful iterator procedure: `iter(next)` binds `next` to the next item,
/// then to `eof` once the record is exhausted
pub struct RecIter {
    rec: Arc<Rec>,
    kind: IterKind,
    position: AtomicUsize,
}

impl RecIter {
    pub fn new(rec: Arc<Rec>, kind: IterKind) -> Self {
        RecIter {
            rec,
            kind,
            position: AtomicUsize::new(0),
        }
    }

    /// Next item, or `eof`
    pub fn next_item(&self) -> ValueOrVar {
        let index = self.position.fetch_add(1, Ordering::SeqCst);
        if index >= self.rec.field_count() {
            self.position.store(self.rec.field_count(), Ordering::SeqCst);
            return ValueOrVar::Value(Value::eof());
        }
        let field = &self.rec.fields()[index];
        match self.kind {
            IterKind::Values => field.value.clone(),
            IterKind::Fields => ValueOrVar::Value(Value::rec(Rec::tuple(
                Literal::Null,
                vec![
                    ValueOrVar::Value(Value::from_feature(&field.feature)),
                    field.value.clone(),
                ],
            ))),
        }
    }

    pub(crate) fn apply(&self, args: &[Operand], env: &Env) -> KernelResult<()> {
        check_arg_count(args, 1, "iterator")?;
        let target = args[0].resolve_value_or_var(env)?;
        unify(&target, &self.next_item())
    }
}

impl fmt::Debug for RecIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecIter")
            .field("kind", &self.kind)
            .field("position", &self.position.load(Ordering::SeqCst))
            .finish()
    }
}

fn iter_new(args: &[Operand], env: &Env, kind: IterKind, name: &str) -> KernelResult<()> {
    check_arg_count(args, 2, name)?;
    let source = args[0].resolve_value(env)?;
    let iter = RecIter::new(source.as_rec()?.clone(), kind);
    bind_operand(env, &args[1], Value::Proc(Proc::Iter(Arc::new(iter))))
}

// FieldIter.new(rec, target)
fn field_iter_new(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    iter_new(args, env, IterKind::Fields, "FieldIter.new")
}

// ValueIter.new(rec, target)
fn value_iter_new(args: &[Operand], env: &Env, _machine: &mut Machine) -> KernelResult<()> {
    iter_new(args, env, IterKind::Values, "ValueIter.new")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_iter_yields_pairs_then_eof() {
        let rec = Rec::builder()
            .field("b", Value::int32(2))
            .field("a", Value::int32(1))
            .build()
            .unwrap();
        let iter = RecIter::new(Arc::new(rec), IterKind::Fields);
        assert_eq!(iter.next_item().to_string(), "['a', 1]");
        assert_eq!(iter.next_item().to_string(), "['b', 2]");
        assert_eq!(iter.next_item().to_string(), "eof");
        assert_eq!(iter.next_item().to_string(), "eof");
    }

    #[test]
    fn test_value_iter() {
        let rec = Rec::tuple(Literal::Null, vec![Value::str("x").into()]);
        let iter = RecIter::new(Arc::new(rec), IterKind::Values);
        assert_eq!(iter.next_item().to_string(), "'x'");
        assert_eq!(iter.next_item().to_string(), "eof");
    }
}
