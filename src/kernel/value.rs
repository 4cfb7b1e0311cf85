//! Kernel values

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::kernel::actor::ActorCfg;
use crate::kernel::composite::{Obj, Rec};
use crate::kernel::failed::FailedValue;
use crate::kernel::feature::{Feature, Token};
use crate::kernel::num::Num;
use crate::kernel::proc::Proc;
use crate::kernel::var::Var;

/// Nesting depth after which `Display` elides structure
const DISPLAY_DEPTH: usize = 32;

/// Nodes one `Display` call renders before eliding the rest
const DISPLAY_NODES: usize = 256;

/// Marker written where a record contains itself
pub const CYCLE_MARKER: &str = "<cycle>";

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Bool(bool),
    Null,
    Eof,
    Str(Arc<str>),
    Token(Token),
}

impl Literal {
    pub fn str(text: impl AsRef<str>) -> Self {
        Literal::Str(Arc::from(text.as_ref()))
    }

    pub fn to_feature(&self) -> Feature {
        match self {
            Literal::Bool(b) => Feature::Bool(*b),
            Literal::Null => Feature::Null,
            Literal::Eof => Feature::Eof,
            Literal::Str(s) => Feature::Str(s.clone()),
            Literal::Token(t) => Feature::Token(*t),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
            Literal::Eof => f.write_str("eof"),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Literal::Token(t) => write!(f, "{}", t),
        }
    }
}

/// Serialisable constant used as an instruction operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Bool(bool),
    Null,
    Eof,
    Str(String),
    Int32(i32),
    Int64(i64),
    Flt32(f32),
    Flt64(f64),
    Dec128(Decimal),
}

impl Scalar {
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Lit(Literal::Bool(*b)),
            Scalar::Null => Value::Lit(Literal::Null),
            Scalar::Eof => Value::Lit(Literal::Eof),
            Scalar::Str(s) => Value::Lit(Literal::str(s)),
            Scalar::Int32(n) => Value::Num(Num::Int32(*n)),
            Scalar::Int64(n) => Value::Num(Num::Int64(*n)),
            Scalar::Flt32(x) => Value::Num(Num::Flt32(*x)),
            Scalar::Flt64(x) => Value::Num(Num::Flt64(*x)),
            Scalar::Dec128(d) => Value::Num(Num::Dec128(*d)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Root of every runtime datum
#[derive(Debug, Clone)]
pub enum Value {
    Lit(Literal),
    Num(Num),
    Rec(Arc<Rec>),
    Obj(Obj),
    Proc(Proc),
    ActorCfg(Arc<ActorCfg>),
    Failed(Arc<FailedValue>),
}

impl Value {
    pub fn null() -> Self {
        Value::Lit(Literal::Null)
    }

    pub fn eof() -> Self {
        Value::Lit(Literal::Eof)
    }

    pub fn bool(b: bool) -> Self {
        Value::Lit(Literal::Bool(b))
    }

    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Lit(Literal::str(text))
    }

    pub fn int32(n: i32) -> Self {
        Value::Num(Num::Int32(n))
    }

    pub fn int64(n: i64) -> Self {
        Value::Num(Num::Int64(n))
    }

    pub fn rec(rec: Rec) -> Self {
        Value::Rec(Arc::new(rec))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Lit(Literal::Bool(_)) => "Bool",
            Value::Lit(Literal::Null) => "Null",
            Value::Lit(Literal::Eof) => "Eof",
            Value::Lit(Literal::Str(_)) => "Str",
            Value::Lit(Literal::Token(_)) => "Token",
            Value::Num(n) => n.kind_name(),
            Value::Rec(_) => "Rec",
            Value::Obj(obj) => obj.kind_name(),
            Value::Proc(_) => "Proc",
            Value::ActorCfg(_) => "ActorCfg",
            Value::Failed(_) => "FailedValue",
        }
    }

    /// Feature view of a literal or integer value
    pub fn to_feature(&self) -> Result<Feature, KernelError> {
        match self {
            Value::Lit(lit) => Ok(lit.to_feature()),
            Value::Num(n) => n
                .as_i64()
                .map(Feature::Int)
                .ok_or_else(|| KernelError::type_mismatch("Feature", n.kind_name())),
            other => Err(KernelError::type_mismatch("Feature", other.kind_name())),
        }
    }

    /// Value view of a feature. Integer features become Int32 when they fit.
    pub fn from_feature(feature: &Feature) -> Self {
        match feature {
            Feature::Str(s) => Value::Lit(Literal::Str(s.clone())),
            Feature::Int(n) => match i32::try_from(*n) {
                Ok(small) => Value::int32(small),
                Err(_) => Value::int64(*n),
            },
            Feature::Bool(b) => Value::bool(*b),
            Feature::Eof => Value::eof(),
            Feature::Null => Value::null(),
            Feature::Token(t) => Value::Lit(Literal::Token(*t)),
        }
    }

    pub fn as_literal(&self) -> Result<&Literal, KernelError> {
        match self {
            Value::Lit(lit) => Ok(lit),
            other => Err(KernelError::type_mismatch("Literal", other.kind_name())),
        }
    }

    pub fn as_bool(&self) -> Result<bool, KernelError> {
        match self {
            Value::Lit(Literal::Bool(b)) => Ok(*b),
            other => Err(KernelError::type_mismatch("Bool", other.kind_name())),
        }
    }

    pub fn as_str(&self) -> Result<&str, KernelError> {
        match self {
            Value::Lit(Literal::Str(s)) => Ok(s),
            other => Err(KernelError::type_mismatch("Str", other.kind_name())),
        }
    }

    pub fn as_num(&self) -> Result<Num, KernelError> {
        match self {
            Value::Num(n) => Ok(*n),
            other => Err(KernelError::type_mismatch("Num", other.kind_name())),
        }
    }

    pub fn as_rec(&self) -> Result<&Arc<Rec>, KernelError> {
        match self {
            Value::Rec(rec) => Ok(rec),
            other => Err(KernelError::type_mismatch("Rec", other.kind_name())),
        }
    }
}

/// Rendering state for one `Display` call. Records on the current path are
/// printed as [`CYCLE_MARKER`] when reached again, and the node budget caps
/// output for wide shared structures.
pub(crate) struct Printer {
    path: Vec<usize>,
    remaining: usize,
}

impl Printer {
    pub(crate) fn new() -> Self {
        Printer {
            path: Vec::new(),
            remaining: DISPLAY_NODES,
        }
    }

    pub(crate) fn value(&mut self, f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
        if self.remaining == 0 || self.path.len() > DISPLAY_DEPTH {
            return f.write_str("...");
        }
        self.remaining -= 1;
        match value {
            Value::Lit(lit) => write!(f, "{}", lit),
            Value::Num(n) => write!(f, "{}", n),
            Value::Rec(rec) => self.rec(f, rec),
            Value::Obj(obj) => write!(f, "{}", obj),
            Value::Proc(proc) => write!(f, "{}", proc),
            Value::ActorCfg(_) => f.write_str("<actor_cfg>"),
            Value::Failed(failed) => {
                f.write_str("<failed ")?;
                self.value(f, &failed.error)?;
                f.write_str(">")
            }
        }
    }

    pub(crate) fn value_or_var(&mut self, f: &mut fmt::Formatter<'_>, value: &ValueOrVar) -> fmt::Result {
        match value.resolve() {
            ValueOrVar::Value(v) => self.value(f, &v),
            ValueOrVar::Var(var) => write!(f, "{}", var),
        }
    }

    pub(crate) fn rec(&mut self, f: &mut fmt::Formatter<'_>, rec: &Rec) -> fmt::Result {
        let key = rec as *const Rec as usize;
        if self.path.contains(&key) {
            return f.write_str(CYCLE_MARKER);
        }
        self.path.push(key);
        let result = rec.fmt_fields(f, self);
        self.path.pop();
        result
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new().value(f, self)
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        Value::Lit(lit)
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Self {
        Value::Num(n)
    }
}

/// A value or a dataflow variable standing in for one
#[derive(Debug, Clone)]
pub enum ValueOrVar {
    Value(Value),
    Var(Var),
}

impl ValueOrVar {
    /// Follow variable bindings: the bound value, or the unbound representative
    pub fn resolve(&self) -> ValueOrVar {
        match self {
            ValueOrVar::Value(v) => ValueOrVar::Value(v.clone()),
            ValueOrVar::Var(var) => var.resolve(),
        }
    }

    /// The bound value, or `None` while unbound
    pub fn value(&self) -> Option<Value> {
        match self.resolve() {
            ValueOrVar::Value(v) => Some(v),
            ValueOrVar::Var(_) => None,
        }
    }

}

impl fmt::Display for ValueOrVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new().value_or_var(f, self)
    }
}

impl From<Value> for ValueOrVar {
    fn from(value: Value) -> Self {
        ValueOrVar::Value(value)
    }
}

impl From<Var> for ValueOrVar {
    fn from(var: Var) -> Self {
        ValueOrVar::Var(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_conversions() {
        assert_eq!(Value::int32(3).to_feature().unwrap(), Feature::Int(3));
        assert_eq!(Value::str("a").to_feature().unwrap(), Feature::str("a"));
        assert!(Value::Num(Num::Flt64(1.0)).to_feature().is_err());
        assert!(matches!(
            Value::from_feature(&Feature::Int(1 << 40)),
            Value::Num(Num::Int64(_))
        ));
    }

    fn cyclic_pair() -> Value {
        let x = Var::new();
        let rec = Rec::builder()
            .field("a", x.clone())
            .field("b", x.clone())
            .build()
            .unwrap();
        let value = Value::rec(rec);
        x.bind_to_value(value.clone()).unwrap();
        value
    }

    #[test]
    fn test_display_marks_cycles() {
        assert_eq!(cyclic_pair().to_string(), "{a: <cycle>, b: <cycle>}");
    }

    #[test]
    fn test_display_caps_shared_structure() {
        let mut value = Value::int32(0);
        for _ in 0..40 {
            let rec = Rec::builder()
                .field("l", value.clone())
                .field("r", value.clone())
                .build()
                .unwrap();
            value = Value::rec(rec);
        }
        let text = value.to_string();
        assert!(text.ends_with("}"));
        assert!(text.contains("..."));
        assert!(text.len() < 32 * DISPLAY_NODES);
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Value::str("hi").to_string(), "'hi'");
        assert_eq!(Value::null().to_string(), "null");
        assert_eq!(Value::int64(7).to_string(), "7L");
    }
}
