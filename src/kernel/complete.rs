//! Partial to complete conversion
//!
//! A complete value has no reachable unbound variable. Completion walks the
//! structure once with an identity-keyed memo; revisiting a node returns its
//! in-progress placeholder, so self-referential closures and cyclic records
//! terminate. The first unbound variable found aborts the walk and is
//! reported as the blocking cause.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::error::{Interrupt, KernelError, KernelResult};
use crate::kernel::composite::{Composite, Obj, Rec};
use crate::kernel::failed::FailedValue;
use crate::kernel::feature::Feature;
use crate::kernel::proc::{Closure, Proc};
use crate::kernel::value::{Literal, Value, ValueOrVar};
use crate::kernel::num::Num;

/// Value proven to contain no unbound variable
#[derive(Debug, Clone)]
pub struct Complete(Value);

type Memo = HashMap<usize, Complete>;

impl Complete {
    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Export as JSON. Records become objects (tuples become arrays) and
    /// values without a data representation become their kernel text.
    pub fn to_json(&self) -> serde_json::Value {
        to_json_depth(&ValueOrVar::Value(self.0.clone()), 0)
    }

    /// A represented failure is complete as-is
    pub fn failed(failed: Arc<FailedValue>) -> Complete {
        Complete(Value::Failed(failed))
    }

    /// Complete literals and numbers without a walk
    pub fn scalar(value: Value) -> Result<Complete, KernelError> {
        match value {
            Value::Lit(_) | Value::Num(_) => Ok(Complete(value)),
            other => Err(KernelError::type_mismatch("scalar", other.kind_name())),
        }
    }
}

impl std::fmt::Display for Complete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Literal> for Complete {
    fn from(lit: Literal) -> Self {
        Complete(Value::Lit(lit))
    }
}

impl From<Num> for Complete {
    fn from(n: Num) -> Self {
        Complete(Value::Num(n))
    }
}

impl ValueOrVar {
    /// Complete this value, or report the first unbound variable reached
    pub fn check_complete(&self) -> KernelResult<Complete> {
        complete_value_or_var(self, &mut HashMap::new())
    }
}

impl Value {
    pub fn check_complete(&self) -> KernelResult<Complete> {
        complete_value(self, &mut HashMap::new())
    }
}

fn complete_value_or_var(value: &ValueOrVar, memo: &mut Memo) -> KernelResult<Complete> {
    match value.resolve() {
        ValueOrVar::Value(v) => complete_value(&v, memo),
        ValueOrVar::Var(var) => Err(Interrupt::Blocked(var)),
    }
}

fn complete_value(value: &Value, memo: &mut Memo) -> KernelResult<Complete> {
    match value {
        Value::Lit(_) | Value::Num(_) | Value::Failed(_) => Ok(Complete(value.clone())),
        // Constructor arguments are complete already; the handlers
        // constructor's captures must be too
        Value::ActorCfg(cfg) => complete_closure(value, &cfg.handlers_ctor, memo),
        Value::Rec(rec) => complete_rec(rec, memo),
        Value::Obj(Obj::ActorRef(_)) => Ok(Complete(value.clone())),
        Value::Obj(Obj::Cell(_)) => Err(KernelError::CannotComplete("Cell".to_string()).into()),
        Value::Proc(proc) => match proc {
            Proc::Closure(closure) => complete_closure(value, closure, memo),
            Proc::ActorCtor(ctor) => complete_closure(value, ctor.handlers_ctor(), memo),
            Proc::Native(_) => Ok(Complete(value.clone())),
            Proc::Bound(binding) => match &binding.obj {
                Obj::ActorRef(_) => Ok(Complete(value.clone())),
                Obj::Cell(_) => {
                    Err(KernelError::CannotComplete("Cell procedure".to_string()).into())
                }
            },
            Proc::Iter(_) => Err(KernelError::CannotComplete("iterator".to_string()).into()),
        },
    }
}

fn complete_rec(rec: &Arc<Rec>, memo: &mut Memo) -> KernelResult<Complete> {
    let key = Arc::as_ptr(rec) as usize;
    if let Some(placeholder) = memo.get(&key) {
        return Ok(placeholder.clone());
    }
    memo.insert(key, Complete(Value::Rec(rec.clone())));
    let rebuilt = rec.map_values(|field| {
        complete_value_or_var(field, memo).map(|c| ValueOrVar::Value(c.into_value()))
    })?;
    let complete = Complete(Value::rec(rebuilt));
    memo.insert(key, complete.clone());
    Ok(complete)
}

fn complete_closure(value: &Value, closure: &Arc<Closure>, memo: &mut Memo) -> KernelResult<Complete> {
    let key = Arc::as_ptr(closure) as usize;
    if let Some(placeholder) = memo.get(&key) {
        return Ok(placeholder.clone());
    }
    // Captured variables never change once bound, so the closure itself is
    // the completed value once every capture completes.
    let complete = Complete(value.clone());
    memo.insert(key, complete.clone());
    for entry in closure.env.entries() {
        complete_value_or_var(&ValueOrVar::Var(entry.var.clone()), memo)?;
    }
    Ok(complete)
}

/// Nesting depth after which JSON export stops descending
const JSON_DEPTH: usize = 64;

fn to_json_depth(value: &ValueOrVar, depth: usize) -> serde_json::Value {
    let value = match value.resolve() {
        ValueOrVar::Value(v) => v,
        ValueOrVar::Var(var) => return json!(var.to_string()),
    };
    if depth > JSON_DEPTH {
        return json!("...");
    }
    match &value {
        Value::Lit(Literal::Bool(b)) => json!(b),
        Value::Lit(Literal::Null) => serde_json::Value::Null,
        Value::Lit(Literal::Str(s)) => json!(s.as_ref()),
        Value::Lit(Literal::Eof) | Value::Lit(Literal::Token(_)) => json!(value.to_string()),
        Value::Num(Num::Int32(n)) => json!(n),
        Value::Num(Num::Int64(n)) => json!(n),
        Value::Num(Num::Flt32(x)) => json!(x),
        Value::Num(Num::Flt64(x)) => json!(x),
        Value::Num(Num::Dec128(d)) => json!(d.to_string()),
        Value::Rec(rec) if rec.is_tuple() && rec.label() == Literal::Null => {
            serde_json::Value::Array(
                rec.fields()
                    .iter()
                    .map(|field| to_json_depth(&field.value, depth + 1))
                    .collect(),
            )
        }
        Value::Rec(rec) => {
            let mut object = serde_json::Map::new();
            if rec.label() != Literal::Null {
                object.insert("$label".to_string(), json!(rec.label().to_string()));
            }
            for field in rec.fields() {
                let key = match &field.feature {
                    Feature::Str(s) => s.to_string(),
                    other => other.to_string(),
                };
                object.insert(key, to_json_depth(&field.value, depth + 1));
            }
            serde_json::Value::Object(object)
        }
        other => json!(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::env::{Env, EnvEntry};
    use crate::kernel::feature::Ident;
    use crate::kernel::instr::Instr;
    use crate::kernel::proc::ProcDef;
    use crate::kernel::var::Var;

    #[test]
    fn test_complete_acyclic_record() {
        let x = Var::new();
        let rec = Rec::builder()
            .field("a", x.clone())
            .field("b", Value::str("two"))
            .build()
            .unwrap();
        let value = Value::rec(rec);
        match value.check_complete() {
            Err(Interrupt::Blocked(var)) => assert!(var.ptr_eq(&x)),
            other => panic!("expected blocked, got {:?}", other),
        }
        x.bind_to_value(Value::int32(1)).unwrap();
        let complete = value.check_complete().unwrap();
        let rec = complete.value().as_rec().unwrap();
        assert!(matches!(rec.value_at(0).unwrap(), ValueOrVar::Value(_)));
        assert_eq!(complete.to_json(), json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn test_complete_self_referential_closure() {
        let me = Var::new();
        let def = Arc::new(ProcDef::new(
            vec![],
            Arc::new(Instr::apply("me", vec![])),
        ));
        let closure = Arc::new(Closure {
            def,
            env: Env::new(None, vec![EnvEntry::new(Ident::new("me"), me.clone())]),
        });
        let value = Value::Proc(Proc::Closure(closure));
        me.bind_to_value(value.clone()).unwrap();
        assert!(value.check_complete().is_ok());
    }

    #[test]
    fn test_actor_cfg_waits_for_captures() {
        let dep = Var::new();
        let def = Arc::new(ProcDef::new(
            vec![Ident::new("handlers")],
            Arc::new(Instr::bind("handlers", "dep".into())),
        ));
        let closure = Arc::new(Closure {
            def,
            env: Env::new(None, vec![EnvEntry::new(Ident::new("dep"), dep.clone())]),
        });
        let value = Value::ActorCfg(Arc::new(crate::kernel::actor::ActorCfg::new(vec![], closure)));
        match value.check_complete() {
            Err(Interrupt::Blocked(var)) => assert!(var.ptr_eq(&dep)),
            other => panic!("expected blocked, got {:?}", other),
        }
        dep.bind_to_value(Value::null()).unwrap();
        assert!(value.check_complete().is_ok());
    }

    #[test]
    fn test_cell_cannot_complete() {
        let cell = crate::kernel::native::cell::CellObj::new(Value::int32(0).into());
        let value = Value::Obj(Obj::Cell(Arc::new(cell)));
        assert!(matches!(
            value.check_complete(),
            Err(Interrupt::Fault(KernelError::CannotComplete(_)))
        ));
    }

    #[test]
    fn test_tuple_json() {
        let tuple = Rec::tuple(Literal::Null, vec![Value::int32(1).into(), Value::bool(true).into()]);
        let complete = Value::rec(tuple).check_complete().unwrap();
        assert_eq!(complete.to_json(), json!([1, true]));
    }
}
