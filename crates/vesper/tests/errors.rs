//! Failures at compile time, on the first render and during updates.

mod common;

use common::{check_helper, object, render, try_render};
use vesper::compiler::NoResolver;
use vesper::runtime::{Capabilities, FunctionHelper, HelperDefinition, RegistryError};
use vesper::wire::build::*;
use vesper::wire::Span;
use vesper::{CompileError, CompileOptions, Compiler, Reference, Registry, RenderError, Value};

#[test]
fn unresolved_names_carry_their_span() {
    let template = TemplateBuilder::new().finish(vec![
        text("a"),
        append(call("missing", vec![])).at(Span::new(4, 15)),
    ]);
    let err = Registry::new().compile(&template).unwrap_err();
    match err {
        CompileError::UnresolvedHelper { name, span } => {
            assert_eq!(name, "missing");
            assert_eq!(span, Some(Span::new(4, 15)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_components_and_modifiers_fail_to_compile() {
    let component_use = TemplateBuilder::new().finish(vec![component("Nope", hash(vec![]), &[])]);
    assert!(matches!(
        Registry::new().compile(&component_use),
        Err(CompileError::UnresolvedComponent { .. })
    ));

    let modifier_use = TemplateBuilder::new().finish(vec![open("div"), modifier("nope", vec![]), close()]);
    assert!(matches!(
        Compiler::new(&NoResolver, CompileOptions::default()).compile(&modifier_use),
        Err(CompileError::UnresolvedModifier { .. })
    ));
}

#[test]
fn a_failing_first_render_leaves_nothing_behind() {
    let mut registry = Registry::new();
    registry.register(check_helper()).unwrap();
    let (this, _) = object(vec![("fail", Value::Bool(true))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let body = builder.block(&[], vec![open("b"), append(call("check", vec![path("this.fail")])), close()]);
        builder.finish(vec![
            open("section"),
            text("before"),
            block("if", vec![boolean(true)], hash(vec![]), &[("default", body)]),
            close(),
        ])
    };
    let (doc, result) = try_render(registry, template, this);
    match result {
        Err(RenderError::User(err)) => assert_eq!(err.message, "check failed"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("render should fail"),
    }
    assert_eq!(doc.to_html(doc.root()), "");
}

#[test]
fn a_failing_replay_leaves_a_placeholder_and_retries() {
    let mut registry = Registry::new();
    registry.register(check_helper()).unwrap();
    let (this, state) = object(vec![("show", Value::Bool(false)), ("fail", Value::Bool(true))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let body = builder.block(&[], vec![append(call("check", vec![path("this.fail")]))]);
        builder.finish(vec![
            text("<"),
            block("if", vec![path("this.show")], hash(vec![]), &[("default", body)]),
            text(">"),
        ])
    };
    let mut harness = render(registry, template, this);
    assert_eq!(harness.html(), "&lt;<!---->&gt;");

    state.set("show", true);
    let err = harness.try_rerender().unwrap_err();
    assert!(matches!(err, RenderError::User(_)));
    assert_eq!(harness.html(), "&lt;<!---->&gt;");

    // Nothing changed, but the failed block is retried.
    let err = harness.try_rerender().unwrap_err();
    assert!(matches!(err, RenderError::User(_)));

    state.set("fail", false);
    harness.rerender();
    assert_eq!(harness.html(), "&lt;ok&gt;");
}

#[test]
fn a_failed_replay_is_retried_when_the_condition_flips_back() {
    let mut registry = Registry::new();
    registry.register(check_helper()).unwrap();
    let (this, state) = object(vec![("show", Value::Bool(true)), ("fail", Value::Bool(true))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let shown = builder.block(&[], vec![text("A")]);
        let hidden = builder.block(&[], vec![append(call("check", vec![path("this.fail")]))]);
        builder.finish(vec![block(
            "if",
            vec![path("this.show")],
            hash(vec![]),
            &[("default", shown), ("else", hidden)],
        )])
    };
    let mut harness = render(registry, template, this);
    assert_eq!(harness.html(), "A");

    state.set("show", false);
    assert!(harness.try_rerender().is_err());
    assert_eq!(harness.html(), "<!---->");

    state.set("show", true);
    let stats = harness.rerender();
    assert_eq!(harness.html(), "A");
    assert_eq!(stats.replayed, 1);

    harness.rerender();
    assert_eq!(harness.html(), "A");
}

#[test]
fn a_failing_update_keeps_earlier_patches() {
    let mut registry = Registry::new();
    registry.register(check_helper()).unwrap();
    let (this, state) = object(vec![("a", Value::from("one")), ("fail", Value::Bool(false))]);
    let template = TemplateBuilder::new().finish(vec![
        append(path("this.a")),
        text(" "),
        append(call("check", vec![path("this.fail")])),
    ]);
    let mut harness = render(registry, template, this);

    state.set("a", "two");
    state.set("fail", true);
    assert!(harness.try_rerender().is_err());
    assert_eq!(harness.html(), "two ok");

    state.set("fail", false);
    harness.rerender();
    assert_eq!(harness.html(), "two ok");
}

#[test]
fn dynamic_names_that_do_not_resolve() {
    let (this, _) = object(vec![("which", Value::from("Ghost"))]);
    let template = TemplateBuilder::new()
        .finish(vec![append(call_with("component", vec![path("this.which")], hash(vec![])))]);
    let (doc, result) = try_render(Registry::new(), template, this);
    assert!(matches!(result, Err(RenderError::UnknownComponent { name }) if name == "Ghost"));
    assert_eq!(doc.to_html(doc.root()), "");

    let (this, _) = object(vec![("fn", Value::from("ghost"))]);
    let template = TemplateBuilder::new().finish(vec![append(call("helper", vec![path("this.fn")]))]);
    let (_, result) = try_render(Registry::new(), template, this);
    assert!(matches!(result, Err(RenderError::UnknownHelper { name }) if name == "ghost"));
}

#[test]
fn registry_rejects_duplicates_and_foreign_capabilities() {
    let mut registry = Registry::new();
    registry.register(check_helper()).unwrap();
    assert!(matches!(
        registry.register(check_helper()),
        Err(RegistryError::DuplicateName { name }) if name == "check"
    ));

    struct Layouting;
    impl vesper::runtime::HelperManager for Layouting {
        fn capabilities(&self) -> Capabilities {
            Capabilities::DYNAMIC_LAYOUT
        }
        fn value(&self, _: &vesper::runtime::Bucket, _: &vesper::CapturedArgs) -> vesper::Result<Value> {
            Ok(Value::Undefined)
        }
    }
    let err = registry.register(HelperDefinition::new("layouting", Layouting)).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidCapabilities { excess, .. } if excess == Capabilities::DYNAMIC_LAYOUT));
}

#[test]
fn constant_references_are_read_only() {
    let constant = Reference::constant("fixed");
    assert!(matches!(constant.update("other"), Err(RenderError::ReadOnlyReference)));

    let (this, _) = object(vec![("name", Value::from("Ada"))]);
    let root = Reference::constant(this.clone());
    let name = root.child("name");
    name.update("Bea").unwrap();
    assert_eq!(this.get_property("name"), Value::from("Bea"));

    let scalar = Reference::constant(1.0).child("x");
    assert!(matches!(scalar.update(2.0), Err(RenderError::ReadOnlyReference)));
}

#[test]
fn helpers_that_fail_keep_their_message() {
    let mut registry = Registry::new();
    registry
        .register(HelperDefinition::new(
            "explode",
            FunctionHelper::new(|_, _| Err(vesper::UserError::new("boom"))),
        ))
        .unwrap();
    let template = TemplateBuilder::new().finish(vec![append(call("explode", vec![]))]);
    let (_, result) = try_render(registry, template, Value::Undefined);
    let err = result.err().expect("render fails");
    assert_eq!(err.to_string(), "boom");
}
