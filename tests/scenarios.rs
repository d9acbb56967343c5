//! End-to-end formula scenarios: staging, committing, and re-evaluating
//! against one live slate.

use std::cell::Cell;

use slate_flow::{
    FormulaBuilder, Logger, NodeId, OpKind, PayloadType, Slate, SlateError, Value, ValueType,
};

/// Counts evaluations so tests can assert how much work a drain did.
#[derive(Default)]
struct EvalCounter {
    evaluated: Cell<usize>,
}

impl Logger for EvalCounter {
    fn on_node_evaluated(&self, _node: NodeId, _changed: bool) {
        self.evaluated.set(self.evaluated.get() + 1);
    }
}

#[test]
fn assign_and_get_round_trip() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.create_input("x", 0i64)?;
    builder.build().perform(&mut slate, None)?;

    let mut builder = FormulaBuilder::new(&mut slate);
    let five = builder.constant(5i64);
    builder.assign("x", five)?;
    let x = builder.lookup("x")?;
    builder.get_value(x, "out")?;
    let report = builder.build().perform(&mut slate, None)?;

    assert_eq!(report.get_int("out"), Some(5));
    Ok(())
}

#[test]
fn unchanged_assignment_drains_zero_nodes() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.create_input("x", 0i64)?;
    builder.build().perform(&mut slate, None)?;

    let mut builder = FormulaBuilder::new(&mut slate);
    let five = builder.constant(5i64);
    builder.assign("x", five)?;
    builder.build().perform(&mut slate, None)?;

    // Re-assigning the same value reports no change, so draining touches
    // zero nodes.
    let counter = EvalCounter::default();
    let mut builder = FormulaBuilder::new(&mut slate);
    let five = builder.constant(5i64);
    builder.assign("x", five)?;
    builder.build().perform(&mut slate, Some(&counter))?;

    assert_eq!(counter.evaluated.get(), 0);
    Ok(())
}

#[test]
fn derived_nodes_recompute_incrementally() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let x = builder.create_input("x", 0i64)?;
    let one = builder.constant(1i64);
    let incremented = builder.func(OpKind::Sum, vec![x, one])?;
    builder.define("incremented", incremented)?;
    builder.build().perform(&mut slate, None)?;

    let mut builder = FormulaBuilder::new(&mut slate);
    let forty_one = builder.constant(41i64);
    builder.assign("x", forty_one)?;
    let derived = builder.lookup("incremented")?;
    builder.get_value(derived, "out")?;
    let report = builder.build().perform(&mut slate, None)?;

    assert_eq!(report.get_int("out"), Some(42));
    assert_eq!(slate.value(derived), Some(Value::Int(42)));
    Ok(())
}

#[test]
fn extern_definition_migrates_every_dependent() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    // Two consumers reference `m` before it exists.
    let mut builder = FormulaBuilder::new(&mut slate);
    let m = builder.request_extern("m", PayloadType::Value(ValueType::Int))?;
    let ten = builder.constant(10i64);
    let plus_ten = builder.func(OpKind::Sum, vec![m, ten])?;
    let plus_ten = builder.define("plus_ten", plus_ten)?;
    let two = builder.constant(2i64);
    let doubled = builder.func(OpKind::Product, vec![m, two])?;
    let doubled = builder.define("doubled", doubled)?;
    builder.build().perform(&mut slate, None)?;

    // Placeholders evaluate with their default value.
    assert_eq!(slate.value(plus_ten), Some(Value::Int(10)));
    assert_eq!(slate.children(m).len(), 2);

    // Defining `m` moves both dependents onto the real node atomically and
    // discards the placeholder.
    let mut builder = FormulaBuilder::new(&mut slate);
    let thirty_two = builder.constant(32i64);
    let real = builder.define("m", thirty_two)?;
    builder.get_value(plus_ten, "plus_ten")?;
    builder.get_value(doubled, "doubled")?;
    let report = builder.build().perform(&mut slate, None)?;

    assert!(!slate.contains(m));
    assert_eq!(slate.lookup("m"), Some(real));
    let migrated = slate.children(real);
    assert!(migrated.contains(&plus_ten));
    assert!(migrated.contains(&doubled));
    assert_eq!(report.get_int("plus_ten"), Some(42));
    assert_eq!(report.get_int("doubled"), Some(64));
    Ok(())
}

#[test]
fn assignments_to_a_placeholder_survive_its_definition() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.request_extern("pending", PayloadType::Value(ValueType::Int))?;
    let nine = builder.constant(9i64);
    builder.assign("pending", nine)?;
    builder.build().perform(&mut slate, None)?;

    // The definition is an input, so the placeholder's current value carries
    // over instead of the input's initial value.
    let mut builder = FormulaBuilder::new(&mut slate);
    let real = builder.create_input("pending", 0i64)?;
    builder.get_value(real, "out")?;
    let report = builder.build().perform(&mut slate, None)?;

    assert_eq!(report.get_int("out"), Some(9));
    Ok(())
}

#[test]
fn joined_formulas_share_one_finish() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let t = builder.create_trigger("t")?;
    builder.build().perform(&mut slate, None)?;

    // Performed separately, the first formula's finish clears the flag
    // before the second reads it.
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.provoke("t", None)?;
    builder.build().perform(&mut slate, None)?;
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.get_trigger(t, "fired")?;
    let report = builder.build().perform(&mut slate, None)?;
    assert_eq!(report.provoked("fired"), Some(false));

    // Joined, the batch shares a single trailing finish: the provocation is
    // still visible when the getter runs, and is cleared afterwards.
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.provoke("t", None)?;
    let provoke = builder.build();
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.get_trigger(t, "fired")?;
    let read = builder.build();

    let joined = provoke.join(read);
    let finishes = joined
        .actions()
        .iter()
        .filter(|action| action.is_finish())
        .count();
    assert_eq!(finishes, 1);

    let report = joined.perform(&mut slate, None)?;
    assert_eq!(report.provoked("fired"), Some(true));
    assert_eq!(slate.provoked(t), Some(false));
    Ok(())
}

#[test]
fn conditional_provocation_follows_the_condition() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let gate = builder.create_trigger("gate")?;
    builder.create_trigger("bell")?;
    builder.build().perform(&mut slate, None)?;

    // Unprovoked condition: the target stays quiet.
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.provoke("bell", Some(gate))?;
    let bell = builder.lookup("bell")?;
    builder.get_trigger(bell, "rang")?;
    let report = builder.build().perform(&mut slate, None)?;
    assert_eq!(report.provoked("rang"), Some(false));

    // Provoked condition in the same cycle: the target fires.
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.provoke("gate", None)?;
    builder.provoke("bell", Some(gate))?;
    builder.get_trigger(bell, "rang")?;
    let report = builder.build().perform(&mut slate, None)?;
    assert_eq!(report.provoked("rang"), Some(true));
    Ok(())
}

#[test]
fn trigger_functions_propagate_provocations() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let a = builder.create_trigger("a")?;
    let b = builder.create_trigger("b")?;
    let any = builder.func(OpKind::AnyFired, vec![a, b])?;
    builder.define("any", any)?;
    builder.build().perform(&mut slate, None)?;

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.provoke("b", None)?;
    builder.get_trigger(any, "fired")?;
    let report = builder.build().perform(&mut slate, None)?;

    assert_eq!(report.provoked("fired"), Some(true));
    // Finish cleared the whole chain for the next cycle.
    assert_eq!(slate.provoked(any), Some(false));
    Ok(())
}

#[test]
fn temps_evaluate_but_never_bind_persistently() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let x = builder.create_input("x", 3i64)?;
    let one = builder.constant(1i64);
    let scratch = builder.func(OpKind::Sum, vec![x, one])?;
    let scratch = builder.temp("scratch", scratch)?;
    let two = builder.constant(2i64);
    let result = builder.func(OpKind::Product, vec![scratch, two])?;
    let result = builder.define("result", result)?;
    builder.get_value(result, "out")?;
    let report = builder.build().perform(&mut slate, None)?;

    assert_eq!(report.get_int("out"), Some(8));
    assert_eq!(slate.lookup("scratch"), None);
    // The scratch node was committed as part of `result`'s subgraph.
    assert!(slate.contains(scratch));
    Ok(())
}

#[test]
fn outputs_notify_after_the_cycle_finishes() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let x = builder.create_input("x", 0i64)?;
    let one = builder.constant(1i64);
    let next = builder.func(OpKind::Sum, vec![x, one])?;
    let next = builder.define("next", next)?;
    builder.build().perform(&mut slate, None)?;

    slate.watch("next", next)?;

    let mut builder = FormulaBuilder::new(&mut slate);
    let seven = builder.constant(7i64);
    builder.assign("x", seven)?;
    builder.build().perform(&mut slate, None)?;

    let notes = slate.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].name, "next");

    // A cycle without changes emits nothing.
    let mut builder = FormulaBuilder::new(&mut slate);
    let seven = builder.constant(7i64);
    builder.assign("x", seven)?;
    builder.build().perform(&mut slate, None)?;
    assert!(slate.take_notifications().is_empty());
    Ok(())
}

#[test]
fn construction_rejects_bad_edits_eagerly() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.create_input("x", 0i64)?;
    let err = builder.create_input("x", 1i64);
    assert!(matches!(err, Err(SlateError::NameConflict { .. })));

    let x = builder.lookup("x")?;
    let err = builder.assign("nope", x);
    assert!(matches!(err, Err(SlateError::UnresolvedIdentifier { .. })));

    let flag = builder.constant(true);
    let err = builder.assign("x", flag);
    assert!(matches!(err, Err(SlateError::TypeMismatch { .. })));

    let err = builder.provoke("x", None);
    assert!(matches!(err, Err(SlateError::TypeMismatch { .. })));
    Ok(())
}

#[test]
fn self_referential_definitions_are_rejected() {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    let r = builder
        .request_extern("r", PayloadType::Value(ValueType::Int))
        .unwrap();
    let one = builder.constant(1i64);
    let successor = builder.func(OpKind::Sum, vec![r, one]).unwrap();
    builder.define("r", successor).unwrap();
    let err = builder.build().perform(&mut slate, None);

    assert!(matches!(err, Err(SlateError::GraphCycle { .. })));
    // The abandoned subgraph was discarded.
    assert!(!slate.contains(successor));
}

#[test]
fn failed_formulas_keep_earlier_commits() -> anyhow::Result<()> {
    let mut slate = Slate::new();

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.create_input("x", 1i64)?;
    builder.build().perform(&mut slate, None)?;

    // Two independently built formulas both define `d`; joined, the second
    // definition fails at perform time, after the first committed.
    let mut builder = FormulaBuilder::new(&mut slate);
    builder.create_input("d", 1i64)?;
    let first = builder.build();

    let mut builder = FormulaBuilder::new(&mut slate);
    builder.create_input("d", 2i64)?;
    let nine = builder.constant(9i64);
    builder.assign("x", nine)?;
    let second = builder.build();

    let err = first.join(second).perform(&mut slate, None);
    assert!(matches!(err, Err(SlateError::NameConflict { .. })));

    // The first definition stands; the aborted tail never assigned `x`.
    let d = slate.lookup("d").expect("first definition committed");
    assert_eq!(slate.value(d), Some(Value::Int(1)));
    let x = slate.lookup("x").expect("x exists");
    assert_eq!(slate.value(x), Some(Value::Int(1)));
    Ok(())
}
