//! Revision tags and references observed from the outside.

use std::cell::Cell;
use std::rc::Rc;

use vesper::validator::{
    CONSTANT, combine, consume_tag, create_tag, current_revision, dirty, track, untrack, validate,
    value_for_tag,
};
use vesper::{Reference, TrackedObject, Value};

#[test]
fn revisions_only_move_forward() {
    let tags: Vec<_> = (0..4).map(|_| create_tag()).collect();
    let mut last = current_revision();
    for tag in &tags {
        dirty(tag);
        let now = current_revision();
        assert!(now > last);
        assert_eq!(value_for_tag(&tag.as_tag()), now);
        last = now;
    }
}

#[test]
fn snapshots_validate_until_a_dependency_is_dirtied() {
    let a = create_tag();
    let b = create_tag();
    let unrelated = create_tag();
    let combined = combine([a.as_tag(), b.as_tag()]);
    let snapshot = value_for_tag(&combined);

    dirty(&unrelated);
    assert!(validate(&combined, snapshot));

    dirty(&b);
    assert!(!validate(&combined, snapshot));
    let later = value_for_tag(&combined);
    assert!(later > snapshot);
    assert!(validate(&combined, later));
}

#[test]
fn nested_frames_and_untrack_keep_reads_apart() {
    let outer_tag = create_tag();
    let inner_tag = create_tag();
    let hidden = create_tag();

    let (inner, outer) = track(|| {
        consume_tag(&outer_tag.as_tag());
        let ((), inner) = track(|| consume_tag(&inner_tag.as_tag()));
        untrack(|| consume_tag(&hidden.as_tag()));
        inner
    });

    let outer_snapshot = value_for_tag(&outer);
    let inner_snapshot = value_for_tag(&inner);
    dirty(&hidden);
    assert!(validate(&outer, outer_snapshot));

    // An inner frame records for itself only.
    dirty(&inner_tag);
    assert!(!validate(&inner, inner_snapshot));
    assert!(validate(&outer, outer_snapshot));

    dirty(&outer_tag);
    assert!(!validate(&outer, outer_snapshot));
}

#[test]
fn nothing_consumed_means_constant() {
    let ((), tag) = track(|| {});
    assert!(tag.is_constant());
    assert_eq!(value_for_tag(&tag), CONSTANT);
}

#[test]
fn compute_references_memoize_until_inputs_change() {
    let state = Rc::new(TrackedObject::new().with("first", "Ada").with("last", "Lovelace"));
    let runs = Rc::new(Cell::new(0));
    let full_name = {
        let (state, runs) = (state.clone(), runs.clone());
        Reference::compute(move || {
            runs.set(runs.get() + 1);
            Ok(Value::from(format!(
                "{} {}",
                state.get("first").to_display_string(),
                state.get("last").to_display_string()
            )))
        })
    };

    assert_eq!(full_name.value().unwrap(), Value::from("Ada Lovelace"));
    assert_eq!(full_name.value().unwrap(), Value::from("Ada Lovelace"));
    assert_eq!(runs.get(), 1);
    let snapshot = full_name.snapshot();

    state.set("unrelated", 1.0);
    assert!(full_name.is_valid(snapshot));

    state.set("last", "King");
    assert!(!full_name.is_valid(snapshot));
    assert_eq!(full_name.value().unwrap(), Value::from("Ada King"));
    assert_eq!(runs.get(), 2);
}

#[test]
fn derived_references_depend_transitively() {
    let cell = Reference::primitive(2.0);
    let doubled = {
        let cell = cell.clone();
        Reference::compute(move || match cell.value()? {
            Value::Number(n) => Ok(Value::from(n * 2.0)),
            _ => Ok(Value::Undefined),
        })
    };
    let label = {
        let doubled = doubled.clone();
        Reference::compute(move || Ok(Value::from(format!("= {}", doubled.value()?.to_display_string()))))
    };

    assert_eq!(label.value().unwrap(), Value::from("= 4"));
    assert!(!label.is_const());
    let snapshot = label.snapshot();

    cell.update(5.0).unwrap();
    assert!(!label.is_valid(snapshot));
    assert_eq!(label.value().unwrap(), Value::from("= 10"));
}

#[test]
fn children_are_shared_and_writable() {
    let state = TrackedObject::new().with("user", Value::object(TrackedObject::new().with("name", "Ada")));
    let root = Reference::constant(Value::object(state));
    let name = root.child("user").child("name");
    assert!(name.ptr_eq(&root.child("user").child("name")));
    assert_eq!(name.value().unwrap(), Value::from("Ada"));
    let snapshot = name.snapshot();

    name.update("Grace").unwrap();
    assert!(!name.is_valid(snapshot));
    assert_eq!(name.value().unwrap(), Value::from("Grace"));

    let missing = Reference::undefined().child("anything");
    assert!(missing.is_const());
    assert_eq!(missing.value().unwrap(), Value::Undefined);
}

#[test]
fn constant_computations_are_recognized() {
    let constant = Reference::compute(|| Ok(Value::from("fixed")));
    constant.value().unwrap();
    assert!(constant.is_const());
    assert!(!constant.is_updatable());
    assert!(Reference::primitive(1.0).is_updatable());
}
