//! Compiled kernel instructions
//!
//! Instruction trees are produced outside the VM and are plain data: they
//! serialise with `serde` and are shared with `Arc`. The helper constructors
//! at the bottom build trees by hand.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Interrupt, KernelError, KernelResult};
use crate::kernel::env::Env;
use crate::kernel::feature::Ident;
use crate::kernel::num::{ArithOp, RelOp};
use crate::kernel::proc::ProcDef;
use crate::kernel::value::{Scalar, Value, ValueOrVar};
use crate::kernel::var::Var;

/// Instruction argument: an identifier or a constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Ident(Ident),
    Lit(Scalar),
}

impl Operand {
    pub fn ident(name: &str) -> Self {
        Operand::Ident(Ident::new(name))
    }

    pub fn int32(n: i32) -> Self {
        Operand::Lit(Scalar::Int32(n))
    }

    pub fn str(text: &str) -> Self {
        Operand::Lit(Scalar::Str(text.to_string()))
    }

    pub fn bool(b: bool) -> Self {
        Operand::Lit(Scalar::Bool(b))
    }

    pub fn null() -> Self {
        Operand::Lit(Scalar::Null)
    }

    /// Value or variable this operand denotes in `env`
    pub fn resolve_value_or_var(&self, env: &Env) -> Result<ValueOrVar, KernelError> {
        match self {
            Operand::Ident(ident) => Ok(env.var(ident)?.resolve()),
            Operand::Lit(scalar) => Ok(ValueOrVar::Value(scalar.to_value())),
        }
    }

    /// Bound value of this operand. Blocks while unbound; a failed value is
    /// raised as a fault.
    pub fn resolve_value(&self, env: &Env) -> KernelResult<Value> {
        match self.resolve_value_or_var(env)? {
            ValueOrVar::Value(Value::Failed(failed)) => {
                Err(KernelError::FailedValue(failed).into())
            }
            ValueOrVar::Value(value) => Ok(value),
            ValueOrVar::Var(var) => Err(Interrupt::Blocked(var)),
        }
    }

    /// Variable for this operand; constants get a fresh bound variable
    pub fn to_var(&self, env: &Env) -> Result<Var, KernelError> {
        match self {
            Operand::Ident(ident) => env.var(ident),
            Operand::Lit(scalar) => Ok(Var::bound(scalar.to_value())),
        }
    }

    fn collect_free(&self, bound: &[Ident], free: &mut BTreeSet<Ident>) {
        if let Operand::Ident(ident) = self {
            use_ident(ident, bound, free);
        }
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::ident(name)
    }
}

/// Record field definition in `CreateRec`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub feature: Operand,
    pub value: Operand,
}

/// Pattern tested by `Case`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Matches a value entailing the constant
    Lit(Scalar),
    /// Matches anything and captures it
    Ident(Ident),
    /// Matches a record with the given label and fields. With
    /// `partial_arity` the record may carry additional fields.
    Rec {
        #[serde(default = "null_scalar")]
        label: Scalar,
        fields: Vec<FieldPattern>,
        #[serde(default)]
        partial_arity: bool,
    },
}

fn null_scalar() -> Scalar {
    Scalar::Null
}

/// Field of a record pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPattern {
    pub feature: Scalar,
    pub pattern: Pattern,
}

impl Pattern {
    pub fn ident(name: &str) -> Self {
        Pattern::Ident(Ident::new(name))
    }

    pub fn int32(n: i32) -> Self {
        Pattern::Lit(Scalar::Int32(n))
    }

    pub fn str(text: &str) -> Self {
        Pattern::Lit(Scalar::Str(text.to_string()))
    }

    /// Record pattern with string features
    pub fn rec(label: Scalar, fields: Vec<(&str, Pattern)>, partial_arity: bool) -> Self {
        Pattern::Rec {
            label,
            fields: fields
                .into_iter()
                .map(|(name, pattern)| FieldPattern {
                    feature: Scalar::Str(name.to_string()),
                    pattern,
                })
                .collect(),
            partial_arity,
        }
    }

    /// Tuple pattern `[p0, p1, ...]`
    pub fn tuple(patterns: Vec<Pattern>) -> Self {
        Pattern::Rec {
            label: Scalar::Null,
            fields: patterns
                .into_iter()
                .enumerate()
                .map(|(i, pattern)| FieldPattern {
                    feature: Scalar::Int32(i as i32),
                    pattern,
                })
                .collect(),
            partial_arity: false,
        }
    }

    /// Identifiers captured by this pattern
    pub fn captures(&self, out: &mut Vec<Ident>) {
        match self {
            Pattern::Lit(_) => {}
            Pattern::Ident(ident) => out.push(ident.clone()),
            Pattern::Rec { fields, .. } => {
                for field in fields {
                    field.pattern.captures(out);
                }
            }
        }
    }
}

/// Kernel instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    Skip,
    Seq {
        instrs: Vec<Arc<Instr>>,
    },
    /// Introduce fresh unbound variables for the body
    Local {
        idents: Vec<Ident>,
        body: Arc<Instr>,
    },
    /// Unify `x` with `y`
    Bind {
        x: Ident,
        y: Operand,
    },
    Arith {
        #[serde(rename = "operator")]
        op: ArithOp,
        a: Operand,
        b: Operand,
        x: Ident,
    },
    Negate {
        a: Operand,
        x: Ident,
    },
    Not {
        a: Operand,
        x: Ident,
    },
    Rel {
        #[serde(rename = "operator")]
        op: RelOp,
        a: Operand,
        b: Operand,
        x: Ident,
    },
    /// `x = (a == b)`
    Entails {
        a: Operand,
        b: Operand,
        x: Ident,
    },
    /// `x = (a != b)`
    Disentails {
        a: Operand,
        b: Operand,
        x: Ident,
    },
    If {
        cond: Operand,
        then: Arc<Instr>,
        #[serde(rename = "else")]
        otherwise: Arc<Instr>,
    },
    Case {
        arg: Operand,
        pat: Pattern,
        then: Arc<Instr>,
        #[serde(rename = "else", default)]
        otherwise: Option<Arc<Instr>>,
    },
    Try {
        body: Arc<Instr>,
        catch_ident: Ident,
        handler: Arc<Instr>,
    },
    Throw {
        value: Operand,
    },
    Apply {
        proc: Operand,
        args: Vec<Operand>,
    },
    Select {
        rec: Operand,
        feature: Operand,
        x: Ident,
    },
    SelectApply {
        rec: Operand,
        feature: Operand,
        args: Vec<Operand>,
    },
    CreateRec {
        x: Ident,
        #[serde(default)]
        label: Option<Operand>,
        fields: Vec<FieldDef>,
    },
    CreateTuple {
        x: Ident,
        #[serde(default)]
        label: Option<Operand>,
        values: Vec<Operand>,
    },
    CreateProc {
        x: Ident,
        def: Arc<ProcDef>,
    },
    CreateActorCtor {
        x: Ident,
        def: Arc<ProcDef>,
    },
    GetCell {
        cell: Operand,
        x: Ident,
    },
    SetCell {
        cell: Operand,
        value: Operand,
    },
}

fn use_ident(ident: &Ident, bound: &[Ident], free: &mut BTreeSet<Ident>) {
    if !bound.contains(ident) {
        free.insert(ident.clone());
    }
}

impl Instr {
    /// Identifiers used by this instruction but not introduced inside it
    pub fn free_idents(&self) -> BTreeSet<Ident> {
        let mut free = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut free);
        free
    }

    pub(crate) fn collect_free(&self, bound: &mut Vec<Ident>, free: &mut BTreeSet<Ident>) {
        match self {
            Instr::Skip => {}
            Instr::Seq { instrs } => {
                for instr in instrs {
                    instr.collect_free(bound, free);
                }
            }
            Instr::Local { idents, body } => {
                let mark = bound.len();
                bound.extend(idents.iter().cloned());
                body.collect_free(bound, free);
                bound.truncate(mark);
            }
            Instr::Bind { x, y } => {
                use_ident(x, bound, free);
                y.collect_free(bound, free);
            }
            Instr::Arith { a, b, x, .. }
            | Instr::Rel { a, b, x, .. }
            | Instr::Entails { a, b, x }
            | Instr::Disentails { a, b, x } => {
                a.collect_free(bound, free);
                b.collect_free(bound, free);
                use_ident(x, bound, free);
            }
            Instr::Negate { a, x } | Instr::Not { a, x } => {
                a.collect_free(bound, free);
                use_ident(x, bound, free);
            }
            Instr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_free(bound, free);
                then.collect_free(bound, free);
                otherwise.collect_free(bound, free);
            }
            Instr::Case {
                arg,
                pat,
                then,
                otherwise,
            } => {
                arg.collect_free(bound, free);
                let mark = bound.len();
                pat.captures(bound);
                then.collect_free(bound, free);
                bound.truncate(mark);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_free(bound, free);
                }
            }
            Instr::Try {
                body,
                catch_ident,
                handler,
            } => {
                body.collect_free(bound, free);
                bound.push(catch_ident.clone());
                handler.collect_free(bound, free);
                bound.pop();
            }
            Instr::Throw { value } => value.collect_free(bound, free),
            Instr::Apply { proc, args } => {
                proc.collect_free(bound, free);
                for arg in args {
                    arg.collect_free(bound, free);
                }
            }
            Instr::Select { rec, feature, x } => {
                rec.collect_free(bound, free);
                feature.collect_free(bound, free);
                use_ident(x, bound, free);
            }
            Instr::SelectApply { rec, feature, args } => {
                rec.collect_free(bound, free);
                feature.collect_free(bound, free);
                for arg in args {
                    arg.collect_free(bound, free);
                }
            }
            Instr::CreateRec { x, label, fields } => {
                use_ident(x, bound, free);
                if let Some(label) = label {
                    label.collect_free(bound, free);
                }
                for field in fields {
                    field.feature.collect_free(bound, free);
                    field.value.collect_free(bound, free);
                }
            }
            Instr::CreateTuple { x, label, values } => {
                use_ident(x, bound, free);
                if let Some(label) = label {
                    label.collect_free(bound, free);
                }
                for value in values {
                    value.collect_free(bound, free);
                }
            }
            Instr::CreateProc { x, def } | Instr::CreateActorCtor { x, def } => {
                use_ident(x, bound, free);
                for ident in def.captures() {
                    use_ident(ident, bound, free);
                }
            }
            Instr::GetCell { cell, x } => {
                cell.collect_free(bound, free);
                use_ident(x, bound, free);
            }
            Instr::SetCell { cell, value } => {
                cell.collect_free(bound, free);
                value.collect_free(bound, free);
            }
        }
    }

    pub fn seq(instrs: Vec<Instr>) -> Self {
        Instr::Seq {
            instrs: instrs.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn local(idents: &[&str], body: Instr) -> Self {
        Instr::Local {
            idents: idents.iter().map(|name| Ident::new(name)).collect(),
            body: Arc::new(body),
        }
    }

    pub fn bind(x: &str, y: Operand) -> Self {
        Instr::Bind {
            x: Ident::new(x),
            y,
        }
    }

    pub fn arith(op: ArithOp, a: Operand, b: Operand, x: &str) -> Self {
        Instr::Arith {
            op,
            a,
            b,
            x: Ident::new(x),
        }
    }

    pub fn rel(op: RelOp, a: Operand, b: Operand, x: &str) -> Self {
        Instr::Rel {
            op,
            a,
            b,
            x: Ident::new(x),
        }
    }

    pub fn entails(a: Operand, b: Operand, x: &str) -> Self {
        Instr::Entails {
            a,
            b,
            x: Ident::new(x),
        }
    }

    pub fn if_else(cond: Operand, then: Instr, otherwise: Instr) -> Self {
        Instr::If {
            cond,
            then: Arc::new(then),
            otherwise: Arc::new(otherwise),
        }
    }

    pub fn case(arg: Operand, pat: Pattern, then: Instr, otherwise: Option<Instr>) -> Self {
        Instr::Case {
            arg,
            pat,
            then: Arc::new(then),
            otherwise: otherwise.map(Arc::new),
        }
    }

    pub fn try_catch(body: Instr, catch_ident: &str, handler: Instr) -> Self {
        Instr::Try {
            body: Arc::new(body),
            catch_ident: Ident::new(catch_ident),
            handler: Arc::new(handler),
        }
    }

    pub fn throw(value: Operand) -> Self {
        Instr::Throw { value }
    }

    pub fn apply(proc: &str, args: Vec<Operand>) -> Self {
        Instr::Apply {
            proc: Operand::ident(proc),
            args,
        }
    }

    pub fn select(rec: &str, feature: Operand, x: &str) -> Self {
        Instr::Select {
            rec: Operand::ident(rec),
            feature,
            x: Ident::new(x),
        }
    }

    /// `rec.feature(args...)`
    pub fn select_apply(rec: &str, feature: &str, args: Vec<Operand>) -> Self {
        Instr::SelectApply {
            rec: Operand::ident(rec),
            feature: Operand::str(feature),
            args,
        }
    }

    /// Record with string features and a null label
    pub fn create_rec(x: &str, fields: Vec<(&str, Operand)>) -> Self {
        Instr::CreateRec {
            x: Ident::new(x),
            label: None,
            fields: fields
                .into_iter()
                .map(|(name, value)| FieldDef {
                    feature: Operand::str(name),
                    value,
                })
                .collect(),
        }
    }

    pub fn create_tuple(x: &str, values: Vec<Operand>) -> Self {
        Instr::CreateTuple {
            x: Ident::new(x),
            label: None,
            values,
        }
    }

    pub fn create_proc(x: &str, params: &[&str], body: Instr) -> Self {
        Instr::CreateProc {
            x: Ident::new(x),
            def: Arc::new(ProcDef::new(
                params.iter().map(|name| Ident::new(name)).collect(),
                Arc::new(body),
            )),
        }
    }

    pub fn create_actor_ctor(x: &str, params: &[&str], body: Instr) -> Self {
        Instr::CreateActorCtor {
            x: Ident::new(x),
            def: Arc::new(ProcDef::new(
                params.iter().map(|name| Ident::new(name)).collect(),
                Arc::new(body),
            )),
        }
    }

    pub fn get_cell(cell: &str, x: &str) -> Self {
        Instr::GetCell {
            cell: Operand::ident(cell),
            x: Ident::new(x),
        }
    }

    pub fn set_cell(cell: &str, value: Operand) -> Self {
        Instr::SetCell {
            cell: Operand::ident(cell),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_idents_respect_scopes() {
        let instr = Instr::local(
            &["x"],
            Instr::seq(vec![
                Instr::bind("x", Operand::int32(1)),
                Instr::arith(ArithOp::Add, "x".into(), "y".into(), "z"),
                Instr::try_catch(Instr::Skip, "e", Instr::bind("w", "e".into())),
            ]),
        );
        let free: Vec<String> = instr.free_idents().iter().map(|i| i.to_string()).collect();
        assert_eq!(free, vec!["w", "y", "z"]);
    }

    #[test]
    fn test_case_pattern_binds_captures() {
        let instr = Instr::case(
            "v".into(),
            Pattern::tuple(vec![Pattern::ident("h"), Pattern::ident("t")]),
            Instr::bind("out", "h".into()),
            Some(Instr::bind("out", "t".into())),
        );
        let free: Vec<String> = instr.free_idents().iter().map(|i| i.to_string()).collect();
        assert_eq!(free, vec!["out", "t", "v"]);
    }

    #[test]
    fn test_instr_json_shape() {
        let instr = Instr::bind("x", Operand::int32(3));
        let json = serde_json::to_value(&instr).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"op": "bind", "x": "x", "y": {"lit": {"int32": 3}}})
        );
        let back: Instr = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Instr::Bind { .. }));
    }
}
