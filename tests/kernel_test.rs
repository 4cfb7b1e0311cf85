//! Kernel integration tests
//!
//! Instruction trees are built with the `Instr` helpers and run through the
//! `Kernel` context or a bare `Machine`.

use std::sync::Arc;

use klvm::error::{KernelError, RuntimeError};
use klvm::kernel::{
    ArithOp, ComputeAdvice, Env, Ident, Instr, Kernel, Machine, Operand, Pattern, Program, RelOp,
    Scalar, Stack, Value, WorkQueue,
};
use klvm::types::{Address, KlvmConfig};

fn kernel() -> Kernel {
    Kernel::new(KlvmConfig::default().with_time_slice(64)).unwrap()
}

fn env_with(kernel: &Kernel, names: &[&str]) -> Env {
    let idents: Vec<Ident> = names.iter().map(|name| Ident::new(name)).collect();
    kernel.root_env().extend_fresh(&idents)
}

fn run(kernel: &Kernel, env: &Env, instr: Instr) {
    kernel.run_to_end(Arc::new(instr), env, 100_000).unwrap();
}

fn show(env: &Env, name: &str) -> String {
    env.var(&Ident::new(name)).unwrap().resolve_value().unwrap().to_string()
}

#[test]
fn test_record_create_and_select() {
    let kernel = kernel();
    let env = env_with(&kernel, &["point", "x", "size"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::create_rec("point", vec![("y", Operand::int32(2)), ("x", Operand::int32(1))]),
            Instr::select("point", Operand::str("x"), "x"),
            Instr::select_apply("Rec", "size", vec!["point".into(), "size".into()]),
        ]),
    );
    assert_eq!(show(&env, "point"), "{x: 1, y: 2}");
    assert_eq!(show(&env, "x"), "1");
    assert_eq!(show(&env, "size"), "2");
}

#[test]
fn test_missing_feature_is_catchable() {
    let kernel = kernel();
    let env = env_with(&kernel, &["point", "x", "name"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::create_rec("point", vec![("y", Operand::int32(2))]),
            Instr::try_catch(
                Instr::select("point", Operand::str("x"), "x"),
                "e",
                Instr::select("e", Operand::str("name"), "name"),
            ),
        ]),
    );
    assert_eq!(show(&env, "name"), "'FeatureNotFound'");
    assert!(!env.var(&Ident::new("x")).unwrap().is_bound());
}

/// `x = {a: x, b: x}`
fn bind_self_pair(x: &str) -> Instr {
    Instr::create_rec(x, vec![("a", x.into()), ("b", x.into())])
}

#[test]
fn test_missing_feature_on_cyclic_record_is_catchable() {
    let kernel = kernel();
    let env = env_with(&kernel, &["x", "y", "name", "message"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            bind_self_pair("x"),
            Instr::try_catch(
                Instr::select("x", Operand::str("c"), "y"),
                "e",
                Instr::seq(vec![
                    Instr::select("e", Operand::str("name"), "name"),
                    Instr::select("e", Operand::str("message"), "message"),
                ]),
            ),
        ]),
    );
    assert_eq!(show(&env, "name"), "'FeatureNotFound'");
    assert!(show(&env, "message").contains("<cycle>"));
    assert_eq!(show(&env, "x"), "{a: <cycle>, b: <cycle>}");
}

#[test]
fn test_bind_conflict_on_cyclic_records_is_catchable() {
    let kernel = kernel();
    let env = env_with(&kernel, &["x", "w", "name"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            bind_self_pair("x"),
            Instr::create_rec("w", vec![("a", "w".into()), ("b", Operand::int32(1))]),
            Instr::try_catch(
                Instr::bind("x", "w".into()),
                "e",
                Instr::select("e", Operand::str("name"), "name"),
            ),
        ]),
    );
    assert_eq!(show(&env, "name"), "'BindConflict'");
}

#[test]
fn test_case_destructures_records() {
    let kernel = kernel();
    let env = env_with(&kernel, &["msg", "out"]);
    let pattern = Pattern::rec(
        Scalar::Str("add".to_string()),
        vec![("a", Pattern::ident("a")), ("b", Pattern::ident("b"))],
        false,
    );
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::CreateRec {
                x: Ident::new("msg"),
                label: Some(Operand::str("add")),
                fields: vec![
                    klvm::kernel::FieldDef {
                        feature: Operand::str("a"),
                        value: Operand::int32(40),
                    },
                    klvm::kernel::FieldDef {
                        feature: Operand::str("b"),
                        value: Operand::int32(2),
                    },
                ],
            },
            Instr::case(
                "msg".into(),
                pattern,
                Instr::arith(ArithOp::Add, "a".into(), "b".into(), "out"),
                Some(Instr::bind("out", Operand::str("no match"))),
            ),
        ]),
    );
    assert_eq!(show(&env, "out"), "42");
}

#[test]
fn test_case_without_else_faults() {
    let kernel = kernel();
    let env = env_with(&kernel, &["out"]);
    let instr = Instr::case(Operand::int32(1), Pattern::int32(2), Instr::Skip, None);
    match kernel.run_to_end(Arc::new(instr), &env, 1_000) {
        Err(RuntimeError::Failed(failed)) => {
            assert!(matches!(failed.native_cause, Some(KernelError::NoMatch(_))));
        }
        other => panic!("expected a failure, got {:?}", other.err()),
    }
}

#[test]
fn test_throw_user_value_and_catch() {
    let kernel = kernel();
    let env = env_with(&kernel, &["caught"]);
    run(
        &kernel,
        &env,
        Instr::try_catch(
            Instr::seq(vec![Instr::throw(Operand::str("custom")), Instr::bind("caught", Operand::str("unreachable"))]),
            "e",
            Instr::bind("caught", "e".into()),
        ),
    );
    assert_eq!(show(&env, "caught"), "'custom'");
}

#[test]
fn test_recursive_factorial() {
    let kernel = kernel();
    let env = env_with(&kernel, &["fact", "result"]);
    let body = Instr::local(
        &["base"],
        Instr::seq(vec![
            Instr::rel(RelOp::Le, "n".into(), Operand::int32(1), "base"),
            Instr::if_else(
                "base".into(),
                Instr::bind("out", Operand::int32(1)),
                Instr::local(
                    &["m", "sub"],
                    Instr::seq(vec![
                        Instr::arith(ArithOp::Sub, "n".into(), Operand::int32(1), "m"),
                        Instr::apply("fact", vec!["m".into(), "sub".into()]),
                        Instr::arith(ArithOp::Mul, "n".into(), "sub".into(), "out"),
                    ]),
                ),
            ),
        ]),
    );
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::create_proc("fact", &["n", "out"], body),
            Instr::apply("fact", vec![Operand::int32(10), "result".into()]),
        ]),
    );
    assert_eq!(show(&env, "result"), "3628800");
}

#[test]
fn test_dataflow_between_stacks() {
    let queue = Arc::new(WorkQueue::new());
    let mut machine = Machine::new(Address::new("test"), queue.clone());
    let env = Env::empty().extend_fresh(&[Ident::new("x"), Ident::new("y")]);

    let reader = Instr::arith(ArithOp::Add, "x".into(), Operand::int32(1), "y");
    let advice = machine.compute(Stack::of(Arc::new(reader), env.clone()), 100);
    assert!(matches!(advice, ComputeAdvice::Wait(_)));
    assert!(queue.is_empty());

    let writer = Instr::bind("x", Operand::int32(41));
    assert!(matches!(machine.compute(Stack::of(Arc::new(writer), env.clone()), 100), ComputeAdvice::End));

    // Woken exactly once
    assert_eq!(queue.len(), 1);
    let resumed = queue.try_next().unwrap();
    assert!(matches!(machine.compute(resumed, 100), ComputeAdvice::End));
    assert_eq!(show(&env, "y"), "42");
    assert!(queue.try_next().is_none());
}

#[test]
fn test_compute_instr_stops_at_first_suspension() {
    let kernel = kernel();
    let env = env_with(&kernel, &["x", "y"]);
    let queue = Arc::new(WorkQueue::new());
    let instr = Instr::arith(ArithOp::Mul, "x".into(), Operand::int32(2), "y");
    let x = env.var(&Ident::new("x")).unwrap();
    match kernel.compute_instr(Arc::new(instr), &env, &queue) {
        ComputeAdvice::Wait(var) => assert!(var.ptr_eq(&x)),
        other => panic!("expected wait, got {:?}", other),
    }
    assert!(queue.is_empty());

    // Binding the variable hands the continuation back through the queue
    x.bind_to_value(Value::int32(21)).unwrap();
    let resumed = queue.try_next().unwrap();
    let mut machine = Machine::new(Address::new("resumer"), queue.clone());
    assert!(matches!(machine.compute(resumed, 64), ComputeAdvice::End));
    assert_eq!(show(&env, "y"), "42");
}

#[test]
fn test_compute_instr_preempts_long_runs() {
    let kernel = kernel();
    let env = env_with(&kernel, &[]);
    let instr = Instr::seq((0..200).map(|_| Instr::Skip).collect());
    let queue = Arc::new(WorkQueue::new());
    assert!(matches!(
        kernel.compute_instr(Arc::new(instr), &env, &queue),
        ComputeAdvice::Preempt(_)
    ));
}

#[test]
fn test_entails_and_disentails() {
    let kernel = kernel();
    let env = env_with(&kernel, &["a", "b", "same", "differ", "t1", "t2", "tokens_equal"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::create_tuple("a", vec![Operand::int32(1), Operand::str("x")]),
            Instr::create_tuple("b", vec![Operand::int32(1), Operand::str("x")]),
            Instr::entails("a".into(), "b".into(), "same"),
            Instr::Disentails {
                a: Operand::int32(1),
                b: Operand::int32(2),
                x: Ident::new("differ"),
            },
            Instr::select_apply("Token", "new", vec!["t1".into()]),
            Instr::select_apply("Token", "new", vec!["t2".into()]),
            Instr::entails("t1".into(), "t2".into(), "tokens_equal"),
        ]),
    );
    assert_eq!(show(&env, "same"), "true");
    assert_eq!(show(&env, "differ"), "true");
    assert_eq!(show(&env, "tokens_equal"), "false");
}

#[test]
fn test_string_concat_and_compare() {
    let kernel = kernel();
    let env = env_with(&kernel, &["s", "lt"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::arith(ArithOp::Add, Operand::str("kl"), Operand::str("vm"), "s"),
            Instr::rel(RelOp::Lt, Operand::str("abc"), Operand::str("abd"), "lt"),
        ]),
    );
    assert_eq!(show(&env, "s"), "'klvm'");
    assert_eq!(show(&env, "lt"), "true");
}

#[test]
fn test_cells_hold_state() {
    let kernel = kernel();
    let env = env_with(&kernel, &["c", "before", "after"]);
    run(
        &kernel,
        &env,
        Instr::seq(vec![
            Instr::select_apply("Cell", "new", vec![Operand::int32(1), "c".into()]),
            Instr::get_cell("c", "before"),
            Instr::set_cell("c", Operand::int32(2)),
            Instr::select_apply("c", "get", vec!["after".into()]),
        ]),
    );
    assert_eq!(show(&env, "before"), "1");
    assert_eq!(show(&env, "after"), "2");
    let cell = env.var(&Ident::new("c")).unwrap().resolve_value().unwrap();
    assert!(matches!(
        cell.check_complete(),
        Err(klvm::Interrupt::Fault(KernelError::CannotComplete(_)))
    ));
}

#[test]
fn test_program_json_with_procedure() {
    let text = r#"{
        "locals": ["double", "r"],
        "instr": {"op": "seq", "instrs": [
            {"op": "create_proc", "x": "double", "def": {
                "params": ["n", "out"],
                "body": {"op": "arith", "operator": "mul", "a": {"ident": "n"}, "b": {"lit": {"int32": 2}}, "x": "out"}
            }},
            {"op": "apply", "proc": {"ident": "double"}, "args": [{"lit": {"int32": 21}}, {"ident": "r"}]}
        ]}
    }"#;
    let program = Program::from_json(text).unwrap();
    let locals = kernel().run_program(&program).unwrap();
    let r = locals.iter().find(|(ident, _)| ident.as_str() == "r").unwrap();
    assert_eq!(r.1.resolve_value().unwrap().to_string(), "42");
}

#[test]
fn test_value_helpers() {
    assert_eq!(Value::int32(3).to_string(), "3");
    assert_eq!(Value::str("a").to_string(), "'a'");
    assert_eq!(Value::null().to_string(), "null");
}
