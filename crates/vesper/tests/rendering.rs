//! Append and update passes over plain content, attributes and conditionals.

mod common;

use common::{object, render, render_with_config};
use vesper::wire::build::*;
use vesper::{CompileOptions, Registry, RenderConfig, Value};
use vesper_dom::SimpleDocument;

#[test]
fn static_content_renders_once_and_never_updates() {
    let template = TemplateBuilder::new().finish(vec![
        open("p"),
        attr("class", "intro"),
        text("Hello"),
        close(),
        comment("end"),
    ]);
    let mut harness = render(Registry::new(), template, Value::Undefined);
    assert_eq!(harness.html(), r#"<p class="intro">Hello</p><!--end-->"#);

    let stats = harness.rerender();
    assert_eq!(stats.visited, 0);
    assert_eq!(stats.mutations, 0);
}

#[test]
fn text_is_escaped_and_trusted_content_is_not() {
    let (this, _) = object(vec![("markup", Value::from("<b>bold</b> & more"))]);
    let template = TemplateBuilder::new().finish(vec![
        open("p"),
        append(path("this.markup")),
        close(),
        open("div"),
        trusting_append(path("this.markup")),
        close(),
    ]);
    let harness = render(Registry::new(), template, this);
    assert_eq!(
        harness.html(),
        "<p>&lt;b&gt;bold&lt;/b&gt; &amp; more</p><div><b>bold</b> &amp; more</div>"
    );
    let p = harness.element("p");
    assert_eq!(harness.doc.children(p).len(), 1);
    assert!(harness.doc.find_element(p, "b").is_none());
}

#[test]
fn trusted_content_is_replaced_when_it_changes() {
    let (this, state) = object(vec![("markup", Value::from("<i>one</i>"))]);
    let template = TemplateBuilder::new().finish(vec![
        open("div"),
        text("["),
        trusting_append(path("this.markup")),
        text("]"),
        close(),
    ]);
    let mut harness = render(Registry::new(), template, this);
    assert_eq!(harness.html(), "<div>[<i>one</i>]</div>");

    state.set("markup", "<b>two</b><b>three</b>");
    harness.rerender();
    assert_eq!(harness.html(), "<div>[<b>two</b><b>three</b>]</div>");

    state.set("markup", "");
    harness.rerender();
    assert_eq!(harness.html(), "<div>[<!---->]</div>");
}

#[test]
fn changed_text_is_written_in_place() {
    let (this, state) = object(vec![("a", Value::from("one")), ("b", Value::from("two"))]);
    let template = TemplateBuilder::new().finish(vec![
        open("p"),
        append(path("this.a")),
        close(),
        open("p"),
        append(path("this.b")),
        close(),
    ]);
    let mut harness = render(Registry::new(), template, this);
    let paragraphs = harness.elements("p");
    let first = harness.doc.children(paragraphs[0])[0];
    let second = harness.doc.children(paragraphs[1])[0];

    state.set("a", "uno");
    let stats = harness.rerender();
    assert_eq!(harness.html(), "<p>uno</p><p>two</p>");
    assert_eq!(stats.visited, 2);
    assert_eq!(stats.revalidated, 1);
    assert_eq!(stats.mutations, 1);
    assert_eq!(harness.doc.writes(first), 1);
    assert_eq!(harness.doc.writes(second), 0);
    assert_eq!(harness.doc.children(paragraphs[0])[0], first);
}

#[test]
fn rerender_without_changes_touches_nothing() {
    let (this, state) = object(vec![("name", Value::from("Ada")), ("show", Value::Bool(true))]);
    let shown = {
        let mut builder = TemplateBuilder::new();
        let yes = builder.block(&[], vec![open("b"), append(path("this.name")), close()]);
        builder.finish(vec![block("if", vec![path("this.show")], hash(vec![]), &[("default", yes)])])
    };
    let mut harness = render(Registry::new(), shown, this);
    harness.doc.reset_stats();

    let stats = harness.rerender();
    assert_eq!(stats.revalidated, 0);
    assert_eq!(stats.mutations, 0);
    assert_eq!(harness.doc.stats().total(), 0);

    // Writing the same value dirties the tag; the output still does not change.
    state.set("name", "Ada");
    let stats = harness.rerender();
    assert_eq!(stats.revalidated, 1);
    assert_eq!(stats.mutations, 0);
    assert_eq!(harness.html(), "<b>Ada</b>");
}

#[test]
fn dynamic_attributes_follow_their_values() {
    let (this, state) = object(vec![
        ("title", Value::from("first")),
        ("disabled", Value::Bool(true)),
        ("size", Value::from(3.0)),
    ]);
    let template = TemplateBuilder::new().finish(vec![
        open("input"),
        dynamic_attr("title", path("this.title")),
        dynamic_attr("disabled", path("this.disabled")),
        dynamic_attr("size", path("this.size")),
        dynamic_attr("class", concat(vec![string("field "), path("this.title")])),
        close(),
    ]);
    let mut harness = render(Registry::new(), template, this);
    let input = harness.element("input");
    assert_eq!(harness.doc.attribute(input, "title"), Some("first"));
    assert_eq!(harness.doc.attribute(input, "disabled"), Some(""));
    assert_eq!(harness.doc.attribute(input, "size"), Some("3"));
    assert_eq!(harness.doc.attribute(input, "class"), Some("field first"));

    state.set("disabled", false);
    state.set("title", Value::Null);
    harness.rerender();
    assert_eq!(harness.doc.attribute(input, "disabled"), None);
    assert_eq!(harness.doc.attribute(input, "title"), None);
    assert_eq!(harness.doc.attribute(input, "class"), Some("field "));
    assert_eq!(harness.doc.attribute(input, "size"), Some("3"));
}

#[test]
fn script_urls_are_sanitized_unless_trusted_or_disabled() {
    let template = || {
        TemplateBuilder::new().finish(vec![
            open("a"),
            dynamic_attr("href", path("this.url")),
            close(),
            open("img"),
            trusting_attr("src", path("this.url")),
            close(),
        ])
    };
    let this = || object(vec![("url", Value::from("javascript:alert(1)"))]).0;

    let harness = render(Registry::new(), template(), this());
    assert_eq!(harness.doc.attribute(harness.element("a"), "href"), Some("unsafe:javascript:alert(1)"));
    assert_eq!(harness.doc.attribute(harness.element("img"), "src"), Some("javascript:alert(1)"));

    let config = RenderConfig { sanitize_urls: false, ..RenderConfig::default() };
    let harness = render_with_config(Registry::new(), template(), this(), config);
    assert_eq!(harness.doc.attribute(harness.element("a"), "href"), Some("javascript:alert(1)"));
}

#[test]
fn if_else_flips_between_branches() {
    let (this, state) = object(vec![("show", Value::Bool(true))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let yes = builder.block(&[], vec![open("em"), text("yes"), close()]);
        let no = builder.block(&[], vec![text("no")]);
        builder.finish(vec![
            text("<"),
            block("if", vec![path("this.show")], hash(vec![]), &[("default", yes), ("else", no)]),
            text(">"),
        ])
    };
    let mut harness = render(Registry::new(), template, this);
    assert_eq!(harness.html(), "&lt;<em>yes</em>&gt;");

    state.set("show", false);
    let stats = harness.rerender();
    assert_eq!(stats.replayed, 1);
    assert_eq!(harness.html(), "&lt;no&gt;");

    state.set("show", true);
    harness.rerender();
    assert_eq!(harness.html(), "&lt;<em>yes</em>&gt;");
}

#[test]
fn truthiness_of_a_condition_change_does_not_replay() {
    let (this, state) = object(vec![("count", Value::from(1.0))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let some = builder.block(&[], vec![text("some")]);
        builder.finish(vec![block("if", vec![path("this.count")], hash(vec![]), &[("default", some)])])
    };
    let mut harness = render(Registry::new(), template, this);

    state.set("count", 2.0);
    let stats = harness.rerender();
    assert_eq!(stats.replayed, 0);
    assert_eq!(harness.html(), "some");

    state.set("count", 0.0);
    let stats = harness.rerender();
    assert_eq!(stats.replayed, 1);
    assert_eq!(harness.html(), "<!---->");
}

#[test]
fn unless_and_inline_conditionals() {
    let (this, state) = object(vec![("done", Value::Bool(false))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let pending = builder.block(&[], vec![text("pending")]);
        builder.finish(vec![
            block("unless", vec![path("this.done")], hash(vec![]), &[("default", pending)]),
            text("|"),
            append(call("if", vec![path("this.done"), string("finished"), string("working")])),
            text("|"),
            append(call("not", vec![path("this.done")])),
        ])
    };
    let mut harness = render(Registry::new(), template, this);
    assert_eq!(harness.html(), "pending|working|true");

    state.set("done", true);
    harness.rerender();
    assert_eq!(harness.html(), "<!---->|finished|false");
}

#[test]
fn nested_conditionals_keep_outer_output_in_place() {
    let (this, state) = object(vec![("outer", Value::Bool(true)), ("inner", Value::Bool(true))]);
    let template = {
        let mut builder = TemplateBuilder::new();
        let inner = builder.block(&[], vec![text("inner")]);
        let outer = builder.block(
            &[],
            vec![
                open("section"),
                block("if", vec![path("this.inner")], hash(vec![]), &[("default", inner)]),
                close(),
            ],
        );
        builder.finish(vec![
            block("if", vec![path("this.outer")], hash(vec![]), &[("default", outer)]),
            text("tail"),
        ])
    };
    let mut harness = render(Registry::new(), template, this);
    let section = harness.element("section");

    state.set("inner", false);
    let stats = harness.rerender();
    assert_eq!(stats.replayed, 1);
    assert_eq!(harness.html(), "<section><!----></section>tail");
    assert_eq!(harness.element("section"), section);

    state.set("inner", true);
    state.set("outer", false);
    harness.rerender();
    assert_eq!(harness.html(), "<!---->tail");

    state.set("outer", true);
    harness.rerender();
    assert_eq!(harness.html(), "<section>inner</section>tail");
}

#[test]
fn let_bindings_shadow_outer_names() {
    let template = {
        let mut builder = TemplateBuilder::new();
        let inner = builder.block(&["x"], vec![text("("), append(path("x")), text(")")]);
        let outer = builder.block(
            &["x"],
            vec![
                append(path("x")),
                block("let", vec![string("inner")], hash(vec![]), &[("default", inner)]),
                append(path("x")),
            ],
        );
        builder.finish(vec![block("let", vec![string("outer")], hash(vec![]), &[("default", outer)])])
    };
    let harness = render(Registry::new(), template, Value::Undefined);
    assert_eq!(harness.html(), "outer(inner)outer");
}

#[test]
fn expression_keywords() {
    let (this, state) = object(vec![("a", Value::from(1.0)), ("key", Value::from("b"))]);
    let template = TemplateBuilder::new().finish(vec![
        append(call("eq", vec![path("this.a"), number(1.0)])),
        text(" "),
        append(call("get", vec![call_with("hash", vec![], hash(vec![("b", string("bee"))])), path("this.key")])),
        text(" "),
        append(call("array", vec![number(1.0), string("two"), boolean(true)])),
        text(" "),
        append(call("has-block", vec![string("default")])),
    ]);
    let mut harness = render(Registry::new(), template, this);
    assert_eq!(harness.html(), "true bee 1,two,true false");

    state.set("a", 2.0);
    state.set("key", "c");
    harness.rerender();
    assert_eq!(harness.html(), "false  1,two,true false");
}

#[test]
fn lenient_mode_reads_free_names_from_this() {
    let (this, _) = object(vec![("title", Value::from("Lenient"))]);
    let template = TemplateBuilder::new().finish(vec![append(path("title"))]);
    let registry = Registry::with_options(CompileOptions { strict: false, ..CompileOptions::default() });
    let harness = render(registry, template, this);
    assert_eq!(harness.html(), "Lenient");
}

#[test]
fn render_inserts_before_the_given_sibling() {
    use std::rc::Rc;
    use vesper::{Environment, Reference};
    use vesper_dom::Document;

    let mut doc = SimpleDocument::new();
    let root = doc.root();
    let before = doc.create_text("before ");
    let after = doc.create_text(" after");
    doc.insert_before(root, before, None);
    doc.insert_before(root, after, None);

    let registry = Registry::new();
    let template = TemplateBuilder::new().finish(vec![open("b"), text("middle"), close()]);
    let program = Rc::new(registry.compile(&template).unwrap());
    let env = Rc::new(Environment::new(Rc::new(registry)));
    let mut result = vesper::render(program, env, &mut doc, root, Some(after), Reference::undefined()).unwrap();
    assert_eq!(doc.to_html(root), "before <b>middle</b> after");
    assert!(result.first_node().is_some());

    result.destroy(&mut doc);
    assert!(result.is_destroyed());
    assert_eq!(doc.to_html(root), "before  after");
}
