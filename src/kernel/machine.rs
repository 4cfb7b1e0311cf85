//! Time-sliced continuation interpreter
//!
//! `compute` pops frames off a [`Stack`] and executes them until the stack
//! is empty, the time slice runs out, or an instruction needs the value of
//! an unbound variable. A blocked instruction is put back on the stack and
//! the whole stack is parked on the variable; re-running `compute` with the
//! resumed stack re-executes it. Faults are thrown as error records that
//! `try` frames can catch.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Interrupt, KernelError, KernelResult};
use crate::kernel::actor::{ActorCtor, ActorRef, Spawner};
use crate::kernel::composite::{Composite, Obj, Rec};
use crate::kernel::env::{Env, EnvEntry};
use crate::kernel::failed::{error_record, FailedValue};
use crate::kernel::feature::Ident;
use crate::kernel::instr::{Instr, Operand};
use crate::kernel::native::cell::CellObj;
use crate::kernel::num::ArithOp;
use crate::kernel::proc::{Closure, ProcDef, Proc};
use crate::kernel::stack::{Stack, StackEntry};
use crate::kernel::unify::{entails, match_pattern, unify};
use crate::kernel::value::{Literal, Value, ValueOrVar};
use crate::kernel::var::{Continuation, Resume, Var};
use crate::types::Address;

/// Outcome of one `compute` call
#[derive(Debug)]
pub enum ComputeAdvice {
    /// The stack ran to completion
    End,
    /// The time slice ran out; continue with this stack
    Preempt(Stack),
    /// Suspended on an unbound variable; the stack is parked on it
    Wait(Var),
    /// An uncaught throw ended the computation
    Halt(Arc<FailedValue>),
}

enum Flow {
    Next,
    Throw(Value, Option<KernelError>),
}

/// Interpreter state for one owner (an actor or a kernel context)
pub struct Machine {
    owner: Address,
    actor: Option<Arc<dyn ActorRef>>,
    spawner: Option<Arc<dyn Spawner>>,
    resume: Arc<dyn Resume>,
    stack: Stack,
    executed: usize,
}

impl Machine {
    pub fn new(owner: Address, resume: Arc<dyn Resume>) -> Self {
        Machine {
            owner,
            actor: None,
            spawner: None,
            resume,
            stack: Stack::empty(),
            executed: 0,
        }
    }

    /// Attach the actor this machine computes for
    pub fn with_actor(mut self, actor: Arc<dyn ActorRef>) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Attach the system that actors spawned by this machine join
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn spawner(&self) -> Option<&Arc<dyn Spawner>> {
        self.spawner.as_ref()
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Actor this machine computes for, if any
    pub fn actor(&self) -> Option<&Arc<dyn ActorRef>> {
        self.actor.as_ref()
    }

    /// Instructions executed over the machine's lifetime
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Schedule an instruction to run next
    pub fn push(&mut self, instr: Arc<Instr>, env: Env) {
        self.stack = self.stack.push(StackEntry::Instr { instr, env });
    }

    /// Run `stack` for at most `time_slice` instructions
    pub fn compute(&mut self, stack: Stack, time_slice: usize) -> ComputeAdvice {
        self.stack = stack;
        let mut remaining = time_slice;
        loop {
            let Some((entry, rest)) = self.stack.pop() else {
                return ComputeAdvice::End;
            };
            let (instr, env) = match entry {
                // The try body finished without throwing
                StackEntry::Catch { .. } => {
                    self.stack = rest;
                    continue;
                }
                StackEntry::Instr { instr, env } => (instr, env),
            };
            if remaining == 0 {
                trace!(owner = %self.owner, "time slice exhausted");
                return ComputeAdvice::Preempt(std::mem::take(&mut self.stack));
            }
            remaining -= 1;
            self.executed += 1;
            let current = std::mem::replace(&mut self.stack, rest);
            let flow = match self.execute(&instr, &env) {
                Ok(flow) => flow,
                Err(Interrupt::Blocked(var)) => {
                    let continuation = Continuation::new(current, self.resume.clone());
                    match var.suspend(continuation) {
                        Ok(()) => {
                            trace!(owner = %self.owner, var = %var, "suspended");
                            self.stack = Stack::empty();
                            return ComputeAdvice::Wait(var);
                        }
                        // Bound in the meantime; run the instruction again
                        Err(continuation) => {
                            self.stack = continuation.stack;
                            continue;
                        }
                    }
                }
                Err(Interrupt::Fault(KernelError::FailedValue(failed))) => {
                    Flow::Throw(failed.error.clone(), failed.native_cause.clone())
                }
                Err(Interrupt::Fault(error)) => Flow::Throw(error_record(&error), Some(error)),
            };
            if let Flow::Throw(value, cause) = flow {
                if let Some(failed) = self.unwind(value, cause) {
                    debug!(owner = %self.owner, error = %failed.error, "computation halted");
                    return ComputeAdvice::Halt(failed);
                }
            }
        }
    }

    /// Pop frames up to the nearest catch and run its handler. Returns the
    /// failure when nothing catches the value.
    fn unwind(&mut self, value: Value, cause: Option<KernelError>) -> Option<Arc<FailedValue>> {
        while let Some((entry, rest)) = self.stack.pop() {
            self.stack = rest;
            if let StackEntry::Catch {
                ident,
                handler,
                env,
            } = entry
            {
                let env = env.extend(vec![EnvEntry::new(ident, Var::bound(value))]);
                self.push(handler, env);
                return None;
            }
        }
        Some(Arc::new(FailedValue::new(self.owner.clone(), value, cause)))
    }

    fn execute(&mut self, instr: &Arc<Instr>, env: &Env) -> KernelResult<Flow> {
        match instr.as_ref() {
            Instr::Skip => {}
            Instr::Seq { instrs } => {
                for child in instrs.iter().rev() {
                    self.push(child.clone(), env.clone());
                }
            }
            Instr::Local { idents, body } => {
                self.push(body.clone(), env.extend_fresh(idents));
            }
            Instr::Bind { x, y } => {
                let target = env.var(x)?;
                target.bind_to_value_or_var(&y.resolve_value_or_var(env)?)?;
            }
            Instr::Arith { op, a, b, x } => {
                let a = a.resolve_value(env)?;
                let b = b.resolve_value(env)?;
                let result = match (op, &a, &b) {
                    (ArithOp::Add, Value::Lit(Literal::Str(l)), Value::Lit(Literal::Str(r))) => {
                        Value::str(format!("{}{}", l, r))
                    }
                    _ => Value::Num(a.as_num()?.arith(*op, b.as_num()?)?),
                };
                bind_ident(env, x, result)?;
            }
            Instr::Negate { a, x } => {
                let n = a.resolve_value(env)?.as_num()?;
                bind_ident(env, x, Value::Num(n.negate()))?;
            }
            Instr::Not { a, x } => {
                let b = a.resolve_value(env)?.as_bool()?;
                bind_ident(env, x, Value::bool(!b))?;
            }
            Instr::Rel { op, a, b, x } => {
                let a = a.resolve_value(env)?;
                let b = b.resolve_value(env)?;
                let result = match (&a, &b) {
                    (Value::Lit(Literal::Str(l)), Value::Lit(Literal::Str(r))) => op.test(l.cmp(r)),
                    _ => a
                        .as_num()?
                        .compare(b.as_num()?)?
                        .map_or(false, |ordering| op.test(ordering)),
                };
                bind_ident(env, x, Value::bool(result))?;
            }
            Instr::Entails { a, b, x } => {
                let result = entails(&a.resolve_value_or_var(env)?, &b.resolve_value_or_var(env)?)?;
                bind_ident(env, x, Value::bool(result))?;
            }
            Instr::Disentails { a, b, x } => {
                let result = entails(&a.resolve_value_or_var(env)?, &b.resolve_value_or_var(env)?)?;
                bind_ident(env, x, Value::bool(!result))?;
            }
            Instr::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if cond.resolve_value(env)?.as_bool()? {
                    then
                } else {
                    otherwise
                };
                self.push(branch.clone(), env.clone());
            }
            Instr::Case {
                arg,
                pat,
                then,
                otherwise,
            } => {
                let value = arg.resolve_value_or_var(env)?;
                let mut captures = Vec::new();
                if match_pattern(&value, pat, &mut captures)? {
                    self.push(then.clone(), env.extend(captures));
                } else if let Some(otherwise) = otherwise {
                    self.push(otherwise.clone(), env.clone());
                } else {
                    return Err(KernelError::NoMatch(value.to_string()).into());
                }
            }
            Instr::Try {
                body,
                catch_ident,
                handler,
            } => {
                self.stack = self.stack.push(StackEntry::Catch {
                    ident: catch_ident.clone(),
                    handler: handler.clone(),
                    env: env.clone(),
                });
                self.push(body.clone(), env.clone());
            }
            Instr::Throw { value } => {
                let thrown = value.resolve_value_or_var(env)?.check_complete()?;
                return Ok(Flow::Throw(thrown.into_value(), None));
            }
            Instr::Apply { proc, args } => {
                let proc = proc.resolve_value(env)?;
                self.apply(&proc, args, env)?;
            }
            Instr::Select { rec, feature, x } => {
                let selected = select(&rec.resolve_value(env)?, &feature.resolve_value(env)?)?;
                unify(&ValueOrVar::Var(env.var(x)?), &selected)?;
            }
            Instr::SelectApply { rec, feature, args } => {
                let selected = select(&rec.resolve_value(env)?, &feature.resolve_value(env)?)?;
                let proc = match selected.resolve() {
                    ValueOrVar::Value(value) => value,
                    ValueOrVar::Var(var) => return Err(Interrupt::Blocked(var)),
                };
                self.apply(&proc, args, env)?;
            }
            Instr::CreateRec { x, label, fields } => {
                let mut builder = Rec::builder().label(resolve_label(label, env)?);
                for field in fields {
                    let feature = field.feature.resolve_value(env)?.to_feature()?;
                    builder.add(feature, field.value.resolve_value_or_var(env)?);
                }
                bind_ident(env, x, Value::rec(builder.build()?))?;
            }
            Instr::CreateTuple { x, label, values } => {
                let label = resolve_label(label, env)?;
                let values = values
                    .iter()
                    .map(|value| value.resolve_value_or_var(env))
                    .collect::<Result<Vec<_>, _>>()?;
                bind_ident(env, x, Value::rec(Rec::tuple(label, values)))?;
            }
            Instr::CreateProc { x, def } => {
                let closure = close_over(def, env)?;
                bind_ident(env, x, Value::Proc(Proc::Closure(closure)))?;
            }
            Instr::CreateActorCtor { x, def } => {
                let closure = close_over(def, env)?;
                let ctor = ActorCtor::new(closure);
                bind_ident(env, x, Value::Proc(Proc::ActorCtor(Arc::new(ctor))))?;
            }
            Instr::GetCell { cell, x } => {
                let cell_value = cell.resolve_value(env)?;
                let cell = as_cell(&cell_value)?;
                unify(&ValueOrVar::Var(env.var(x)?), &cell.get())?;
            }
            Instr::SetCell { cell, value } => {
                let cell_value = cell.resolve_value(env)?;
                let cell = as_cell(&cell_value)?;
                cell.set(value.resolve_value_or_var(env)?);
            }
        }
        Ok(Flow::Next)
    }

    /// Apply a procedure value to arguments
    pub fn apply(&mut self, proc: &Value, args: &[Operand], env: &Env) -> KernelResult<()> {
        let proc = match proc {
            Value::Proc(proc) => proc,
            Value::Failed(failed) => return Err(KernelError::FailedValue(failed.clone()).into()),
            other => return Err(KernelError::NotAProc(other.to_string()).into()),
        };
        match proc {
            Proc::Closure(closure) => {
                let params = closure.def.params();
                check_arg_count(args, params.len(), "procedure")?;
                let mut entries = Vec::with_capacity(params.len());
                for (param, arg) in params.iter().zip(args) {
                    entries.push(EnvEntry::new(param.clone(), arg.to_var(env)?));
                }
                let call_env = closure.env.extend(entries);
                self.push(closure.def.body().clone(), call_env);
                Ok(())
            }
            Proc::Native(native) => (native.func)(args, env, self),
            Proc::Bound(binding) => binding.obj.apply_entry(binding.index, args, env, self),
            Proc::Iter(iter) => iter.apply(args, env),
            Proc::ActorCtor(ctor) => ctor.apply(args, env),
        }
    }
}

/// Check a native or closure call's argument count
pub fn check_arg_count(args: &[Operand], expected: usize, name: &str) -> Result<(), KernelError> {
    if args.len() != expected {
        return Err(KernelError::InvalidArgCount {
            name: name.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Bind the variable named by `ident` to `value`
pub fn bind_ident(env: &Env, ident: &Ident, value: Value) -> KernelResult<()> {
    env.var(ident)?.bind_to_value(value)
}

/// Bind an operand (normally the result target) to `value`
pub fn bind_operand(env: &Env, operand: &Operand, value: Value) -> KernelResult<()> {
    unify(&operand.resolve_value_or_var(env)?, &ValueOrVar::Value(value))
}

fn select(value: &Value, feature: &Value) -> KernelResult<ValueOrVar> {
    let feature = feature.to_feature()?;
    let selected = match value {
        Value::Rec(rec) => rec.select(&feature)?,
        Value::Obj(obj) => obj.select(&feature)?,
        other => return Err(KernelError::feature_not_found(&feature, other).into()),
    };
    Ok(selected)
}

fn resolve_label(label: &Option<Operand>, env: &Env) -> KernelResult<Literal> {
    match label {
        None => Ok(Literal::Null),
        Some(operand) => Ok(operand.resolve_value(env)?.as_literal()?.clone()),
    }
}

fn close_over(def: &Arc<ProcDef>, env: &Env) -> KernelResult<Arc<Closure>> {
    let mut captured = Vec::with_capacity(def.captures().len());
    for ident in def.captures() {
        captured.push(EnvEntry::new(ident.clone(), env.var(ident)?));
    }
    Ok(Arc::new(Closure {
        def: def.clone(),
        env: Env::new(None, captured),
    }))
}

fn as_cell(value: &Value) -> Result<&Arc<CellObj>, KernelError> {
    match value {
        Value::Obj(Obj::Cell(cell)) => Ok(cell),
        other => Err(KernelError::type_mismatch("Cell", other.kind_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::WorkQueue;

    fn machine() -> Machine {
        Machine::new(Address::new("test"), Arc::new(WorkQueue::new()))
    }

    fn run(instr: Instr, env: &Env) -> ComputeAdvice {
        machine().compute(Stack::of(Arc::new(instr), env.clone()), 10_000)
    }

    fn value_of(env: &Env, name: &str) -> Value {
        env.var(&Ident::new(name)).unwrap().resolve_value().unwrap()
    }

    #[test]
    fn test_arith_and_bind() {
        let env = Env::empty().extend_fresh(&[Ident::new("x"), Ident::new("y")]);
        let instr = Instr::seq(vec![
            Instr::bind("x", Operand::int32(40)),
            Instr::arith(ArithOp::Add, "x".into(), Operand::int32(2), "y"),
        ]);
        assert!(matches!(run(instr, &env), ComputeAdvice::End));
        assert_eq!(value_of(&env, "y").to_string(), "42");
    }

    #[test]
    fn test_preempt_then_finish() {
        let env = Env::empty().extend_fresh(&[Ident::new("x")]);
        let instr = Instr::seq(vec![Instr::Skip, Instr::Skip, Instr::bind("x", Operand::int32(1))]);
        let mut machine = machine();
        let advice = machine.compute(Stack::of(Arc::new(instr), env.clone()), 2);
        let stack = match advice {
            ComputeAdvice::Preempt(stack) => stack,
            other => panic!("expected preempt, got {:?}", other),
        };
        assert!(!env.var(&Ident::new("x")).unwrap().is_bound());
        assert!(matches!(machine.compute(stack, 10), ComputeAdvice::End));
        assert!(env.var(&Ident::new("x")).unwrap().is_bound());
    }

    #[test]
    fn test_wait_on_unbound_then_resume() {
        let queue = Arc::new(WorkQueue::new());
        let mut machine = Machine::new(Address::new("test"), queue.clone());
        let env = Env::empty().extend_fresh(&[Ident::new("a"), Ident::new("b")]);
        let instr = Instr::arith(ArithOp::Mul, "a".into(), Operand::int32(2), "b");
        let advice = machine.compute(Stack::of(Arc::new(instr), env.clone()), 100);
        let var = match advice {
            ComputeAdvice::Wait(var) => var,
            other => panic!("expected wait, got {:?}", other),
        };
        assert!(var.ptr_eq(&env.var(&Ident::new("a")).unwrap()));
        assert!(queue.try_next().is_none());
        var.bind_to_value(Value::int32(21)).unwrap();
        let resumed = queue.try_next().unwrap();
        assert!(matches!(machine.compute(resumed, 100), ComputeAdvice::End));
        assert_eq!(value_of(&env, "b").to_string(), "42");
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn test_fault_caught_as_error_record() {
        let env = Env::empty().extend_fresh(&[Ident::new("x"), Ident::new("name")]);
        let instr = Instr::try_catch(
            Instr::arith(ArithOp::Div, Operand::int32(1), Operand::int32(0), "x"),
            "e",
            Instr::select("e", Operand::str("name"), "name"),
        );
        assert!(matches!(run(instr, &env), ComputeAdvice::End));
        assert_eq!(value_of(&env, "name").to_string(), "'Arithmetic'");
    }

    #[test]
    fn test_uncaught_throw_halts() {
        let env = Env::empty();
        match run(Instr::throw(Operand::str("boom")), &env) {
            ComputeAdvice::Halt(failed) => {
                assert_eq!(failed.error.to_string(), "'boom'");
                assert!(failed.native_cause.is_none());
            }
            other => panic!("expected halt, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_conflict_halts_with_cause() {
        let env = Env::empty().extend_fresh(&[Ident::new("x")]);
        let instr = Instr::seq(vec![
            Instr::bind("x", Operand::int32(1)),
            Instr::bind("x", Operand::int32(2)),
        ]);
        match run(instr, &env) {
            ComputeAdvice::Halt(failed) => {
                assert!(matches!(failed.native_cause, Some(KernelError::BindConflict { .. })));
            }
            other => panic!("expected halt, got {:?}", other),
        }
    }

    #[test]
    fn test_closure_apply() {
        let env = Env::empty().extend_fresh(&[Ident::new("inc"), Ident::new("r")]);
        let instr = Instr::seq(vec![
            Instr::create_proc(
                "inc",
                &["n", "out"],
                Instr::arith(ArithOp::Add, "n".into(), Operand::int32(1), "out"),
            ),
            Instr::apply("inc", vec![Operand::int32(9), "r".into()]),
        ]);
        assert!(matches!(run(instr, &env), ComputeAdvice::End));
        assert_eq!(value_of(&env, "r").to_string(), "10");
    }

    #[test]
    fn test_closure_arity_mismatch() {
        let env = Env::empty().extend_fresh(&[Ident::new("f")]);
        let instr = Instr::seq(vec![
            Instr::create_proc("f", &["a"], Instr::Skip),
            Instr::apply("f", vec![Operand::int32(1), Operand::int32(2)]),
        ]);
        match run(instr, &env) {
            ComputeAdvice::Halt(failed) => assert!(matches!(
                failed.native_cause,
                Some(KernelError::InvalidArgCount { expected: 1, actual: 2, .. })
            )),
            other => panic!("expected halt, got {:?}", other),
        }
    }
}
