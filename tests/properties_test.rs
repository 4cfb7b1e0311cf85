//! Property tests for records, binding and completion

use proptest::prelude::*;

use klvm::error::{Interrupt, KernelError};
use klvm::kernel::{unify, Composite, Literal, Rec, Value, ValueOrVar, Var};

fn feature_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,6}", 0..12).prop_map(|set| set.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_record_features_strictly_increase(names in feature_names(), ints in prop::collection::btree_set(-50i64..50, 0..8)) {
        let mut builder = Rec::builder();
        for name in &names {
            builder = builder.field(name.as_str(), Value::int32(1));
        }
        for n in &ints {
            builder = builder.field(*n, Value::int32(2));
        }
        let rec = builder.build().unwrap();
        prop_assert_eq!(rec.field_count(), names.len() + ints.len());
        for i in 1..rec.field_count() {
            prop_assert!(rec.feature_at(i - 1).unwrap() < rec.feature_at(i).unwrap());
        }
    }

    #[test]
    fn prop_bind_is_idempotent_on_equal_values(n in any::<i32>()) {
        let var = Var::new();
        prop_assert!(var.bind_to_value(Value::int32(n)).is_ok());
        prop_assert!(var.bind_to_value(Value::int32(n)).is_ok());
        prop_assert_eq!(var.resolve_value().unwrap().to_string(), n.to_string());
    }

    #[test]
    fn prop_unify_conflicts_in_either_order(a in any::<i32>(), b in any::<i32>()) {
        let left: ValueOrVar = Var::bound(Value::int32(a)).into();
        let right: ValueOrVar = Var::bound(Value::int32(b)).into();
        let forward = unify(&left, &right);
        let backward = unify(&right, &left);
        if a == b {
            prop_assert!(forward.is_ok());
            prop_assert!(backward.is_ok());
        } else {
            let forward_conflict = matches!(forward, Err(Interrupt::Fault(KernelError::BindConflict { .. })));
            let backward_conflict = matches!(backward, Err(Interrupt::Fault(KernelError::BindConflict { .. })));
            prop_assert!(forward_conflict);
            prop_assert!(backward_conflict);
        }
    }

    #[test]
    fn prop_complete_keeps_acyclic_structure(values in prop::collection::vec(any::<i32>(), 0..10), label in "[a-z]{0,5}") {
        let label = if label.is_empty() { Literal::Null } else { Literal::str(&label) };
        let inner = Rec::tuple(Literal::Null, values.iter().map(|n| Value::int32(*n).into()).collect());
        let outer = Rec::builder()
            .label(label)
            .field("items", Value::rec(inner))
            .field("count", Value::int32(values.len() as i32))
            .build()
            .unwrap();
        let value = Value::rec(outer);
        let complete = value.check_complete().unwrap();
        prop_assert_eq!(complete.value().to_string(), value.to_string());
    }
}

#[test]
fn test_complete_reports_unbound_var() {
    let hole = Var::new();
    let rec = Rec::tuple(Literal::Null, vec![Value::int32(1).into(), hole.clone().into()]);
    match Value::rec(rec).check_complete() {
        Err(Interrupt::Blocked(var)) => assert!(var.ptr_eq(&hole)),
        other => panic!("expected blocked, got {:?}", other.err()),
    }
}
