//! Unification, entailment and pattern matching
//!
//! Structural walks carry a memo of visited record pairs so they terminate
//! on cyclic structures: a pair already under comparison is assumed equal.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Interrupt, KernelError, KernelResult};
use crate::kernel::composite::{Composite, Rec};
use crate::kernel::env::EnvEntry;
use crate::kernel::instr::Pattern;
use crate::kernel::value::{Value, ValueOrVar};
use crate::kernel::var::Var;

type PairMemo = HashSet<(usize, usize)>;

fn pair_key(a: &Arc<Rec>, b: &Arc<Rec>) -> (usize, usize) {
    (Arc::as_ptr(a) as usize, Arc::as_ptr(b) as usize)
}

/// Equality of everything except records, which are compared field-wise
fn same_atom(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Lit(x), Value::Lit(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x.same(y),
        (Value::Obj(x), Value::Obj(y)) => x.same(y),
        (Value::Proc(x), Value::Proc(y)) => x.same(y),
        (Value::ActorCfg(x), Value::ActorCfg(y)) => Arc::ptr_eq(x, y),
        (Value::Failed(x), Value::Failed(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// Records with the same label and feature set
fn same_shape(x: &Rec, y: &Rec) -> bool {
    x.label() == y.label()
        && x.field_count() == y.field_count()
        && x
            .fields()
            .iter()
            .zip(y.fields())
            .all(|(fx, fy)| fx.feature == fy.feature)
}

/// Unify two values or variables, binding unbound variables on either side
pub fn unify(a: &ValueOrVar, b: &ValueOrVar) -> KernelResult<()> {
    unify_with(a, b, &mut HashSet::new())
}

fn unify_with(a: &ValueOrVar, b: &ValueOrVar, memo: &mut PairMemo) -> KernelResult<()> {
    match (a.resolve(), b.resolve()) {
        (ValueOrVar::Var(x), ValueOrVar::Var(y)) => x.bind_to_var(&y),
        (ValueOrVar::Var(x), ValueOrVar::Value(v)) | (ValueOrVar::Value(v), ValueOrVar::Var(x)) => {
            x.bind_to_value(v)
        }
        (ValueOrVar::Value(x), ValueOrVar::Value(y)) => unify_values(&x, &y, memo),
    }
}

pub(crate) fn unify_values(a: &Value, b: &Value, memo: &mut PairMemo) -> KernelResult<()> {
    let consistent = match (a, b) {
        (Value::Rec(x), Value::Rec(y)) => {
            if Arc::ptr_eq(x, y) || !memo.insert(pair_key(x, y)) {
                return Ok(());
            }
            if same_shape(x, y) {
                for (fx, fy) in x.fields().iter().zip(y.fields()) {
                    unify_with(&fx.value, &fy.value, memo)?;
                }
                return Ok(());
            }
            false
        }
        _ => same_atom(a, b),
    };
    if consistent {
        Ok(())
    } else {
        Err(KernelError::bind_conflict(a, b).into())
    }
}

enum Entail {
    Yes,
    No,
    Wait(Var),
}

/// Structural equality. Blocks when the answer depends on an unbound
/// variable; answers `false` as soon as any part definitely differs.
pub fn entails(a: &ValueOrVar, b: &ValueOrVar) -> KernelResult<bool> {
    match entail_with(a, b, &mut HashSet::new()) {
        Entail::Yes => Ok(true),
        Entail::No => Ok(false),
        Entail::Wait(var) => Err(Interrupt::Blocked(var)),
    }
}

fn entail_with(a: &ValueOrVar, b: &ValueOrVar, memo: &mut PairMemo) -> Entail {
    match (a.resolve(), b.resolve()) {
        (ValueOrVar::Var(x), ValueOrVar::Var(y)) => {
            if x.ptr_eq(&y) {
                Entail::Yes
            } else {
                Entail::Wait(x)
            }
        }
        (ValueOrVar::Var(x), ValueOrVar::Value(_)) | (ValueOrVar::Value(_), ValueOrVar::Var(x)) => {
            Entail::Wait(x)
        }
        (ValueOrVar::Value(x), ValueOrVar::Value(y)) => entail_values(&x, &y, memo),
    }
}

fn entail_values(a: &Value, b: &Value, memo: &mut PairMemo) -> Entail {
    match (a, b) {
        (Value::Rec(x), Value::Rec(y)) => {
            if Arc::ptr_eq(x, y) || !memo.insert(pair_key(x, y)) {
                return Entail::Yes;
            }
            if !same_shape(x, y) {
                return Entail::No;
            }
            let mut waiting = None;
            for (fx, fy) in x.fields().iter().zip(y.fields()) {
                match entail_with(&fx.value, &fy.value, memo) {
                    Entail::No => return Entail::No,
                    Entail::Wait(var) => {
                        waiting.get_or_insert(var);
                    }
                    Entail::Yes => {}
                }
            }
            waiting.map_or(Entail::Yes, Entail::Wait)
        }
        _ if same_atom(a, b) => Entail::Yes,
        _ => Entail::No,
    }
}

fn var_for(value: &ValueOrVar) -> Var {
    match value {
        ValueOrVar::Var(var) => var.clone(),
        ValueOrVar::Value(v) => Var::bound(v.clone()),
    }
}

/// Match `value` against `pattern`, pushing captured identifiers. Blocks
/// when the match depends on an unbound variable.
pub fn match_pattern(
    value: &ValueOrVar,
    pattern: &Pattern,
    captures: &mut Vec<EnvEntry>,
) -> KernelResult<bool> {
    match pattern {
        Pattern::Ident(ident) => {
            captures.push(EnvEntry::new(ident.clone(), var_for(value)));
            Ok(true)
        }
        Pattern::Lit(scalar) => entails(value, &ValueOrVar::Value(scalar.to_value())),
        Pattern::Rec {
            label,
            fields,
            partial_arity,
        } => {
            let rec = match value.resolve() {
                ValueOrVar::Var(var) => return Err(Interrupt::Blocked(var)),
                ValueOrVar::Value(Value::Rec(rec)) => rec,
                ValueOrVar::Value(_) => return Ok(false),
            };
            match label.to_value() {
                Value::Lit(lit) if lit == rec.label() => {}
                _ => return Ok(false),
            }
            if !partial_arity && rec.field_count() != fields.len() {
                return Ok(false);
            }
            for field in fields {
                let feature = field.feature.to_value().to_feature()?;
                let sub = match rec.select(&feature) {
                    Ok(sub) => sub,
                    Err(_) => return Ok(false),
                };
                if !match_pattern(&sub, &field.pattern, captures)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::feature::Feature;
    use crate::kernel::value::Scalar;

    fn rec(fields: Vec<(&str, ValueOrVar)>) -> ValueOrVar {
        let mut builder = Rec::builder();
        for (name, value) in fields {
            builder.add(Feature::str(name), value);
        }
        Value::rec(builder.build().unwrap()).into()
    }

    #[test]
    fn test_unify_binds_nested_vars() {
        let x = Var::new();
        let left = rec(vec![("a", x.clone().into()), ("b", Value::int32(2).into())]);
        let right = rec(vec![("a", Value::int32(1).into()), ("b", Value::int32(2).into())]);
        unify(&left, &right).unwrap();
        assert_eq!(x.resolve_value().unwrap().to_string(), "1");
    }

    #[test]
    fn test_unify_shape_mismatch() {
        let left = rec(vec![("a", Value::int32(1).into())]);
        let right = rec(vec![("b", Value::int32(1).into())]);
        assert!(matches!(
            unify(&left, &right),
            Err(Interrupt::Fault(KernelError::BindConflict { .. }))
        ));
    }

    #[test]
    fn test_entails_false_beats_blocked() {
        let x = Var::new();
        let left = rec(vec![("a", x.clone().into()), ("b", Value::int32(2).into())]);
        let right = rec(vec![("a", Value::int32(1).into()), ("b", Value::int32(3).into())]);
        assert!(!entails(&left, &right).unwrap());
        let right = rec(vec![("a", Value::int32(1).into()), ("b", Value::int32(2).into())]);
        assert!(matches!(entails(&left, &right), Err(Interrupt::Blocked(_))));
    }

    #[test]
    fn test_entails_terminates_on_cycles() {
        let x = Var::new();
        let y = Var::new();
        let left = rec(vec![("self", x.clone().into())]);
        let right = rec(vec![("self", y.clone().into())]);
        x.bind_to_value_or_var(&left).unwrap();
        y.bind_to_value_or_var(&right).unwrap();
        assert!(entails(&left, &right).unwrap());
        unify(&left, &right).unwrap();
    }

    #[test]
    fn test_match_record_pattern() {
        let value = rec(vec![("a", Value::int32(1).into()), ("b", Value::str("x").into())]);
        let pattern = Pattern::rec(Scalar::Null, vec![("a", Pattern::ident("first"))], true);
        let mut captures = Vec::new();
        assert!(match_pattern(&value, &pattern, &mut captures).unwrap());
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].var.resolve_value().unwrap().to_string(), "1");

        let exact = Pattern::rec(Scalar::Null, vec![("a", Pattern::ident("first"))], false);
        assert!(!match_pattern(&value, &exact, &mut Vec::new()).unwrap());

        let labelled = Pattern::rec(Scalar::Str("point".to_string()), vec![], true);
        assert!(!match_pattern(&value, &labelled, &mut Vec::new()).unwrap());
    }
}
