//! Loading templates from JSON, and compiled programs to and from bytes.

mod common;

use std::rc::Rc;

use common::{object, upper_helper};
use vesper::program::serialize::{DecodeError, MAGIC};
use vesper::program::Op;
use vesper::wire::build::*;
use vesper::wire::{MIN_WIRE_FORMAT_VERSION, SerializedTemplate};
use vesper::{CompileOptions, Environment, Program, Reference, Registry, Value};
use vesper_dom::SimpleDocument;

const GREETING: &str = r#"{
    "version": 1,
    "module_name": "greeting",
    "block": {
        "statements": [
            { "node": { "kind": "open-element", "tag": "h1" } },
            { "node": { "kind": "append", "value": { "kind": "get", "head": "this", "path": ["title"] } } },
            { "node": { "kind": "close-element" } }
        ]
    }
}"#;

fn render_html(registry: Registry, program: Program, this: Value) -> String {
    let env = Rc::new(Environment::new(Rc::new(registry)));
    let mut doc = SimpleDocument::new();
    let root = doc.root();
    vesper::render(Rc::new(program), env, &mut doc, root, None, Reference::constant(this)).unwrap();
    doc.to_html(root)
}

#[test]
fn templates_load_from_json() {
    let template = SerializedTemplate::from_json(GREETING).unwrap();
    assert_eq!(template.version, MIN_WIRE_FORMAT_VERSION);
    assert_eq!(template.module_name.as_deref(), Some("greeting"));

    let program = Registry::new().compile(&template).unwrap();
    assert_eq!(program.module_name(), Some("greeting"));
    let (this, _) = object(vec![("title", Value::from("Welcome"))]);
    assert_eq!(render_html(Registry::new(), program, this), "<h1>Welcome</h1>");
}

#[test]
fn compiled_programs_load_back_from_bytes() {
    let mut registry = Registry::with_options(CompileOptions { debug_names: true, ..CompileOptions::default() });
    registry.register(upper_helper()).unwrap();
    let template = {
        let mut builder = TemplateBuilder::new().module_name("shout");
        let item = builder.block(&["word"], vec![append(call("upper", vec![path("word")])), text(" ")]);
        builder.finish(vec![block("each", vec![path("this.words")], hash(vec![]), &[("default", item)])])
    };
    let program = registry.compile(&template).unwrap();

    for op_names in [false, true] {
        let bytes = program.to_bytes(op_names).unwrap();
        assert_eq!(&bytes[..4], &MAGIC);
        let loaded = Program::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, program);
    }

    let loaded = Program::from_bytes(&program.to_bytes(true).unwrap()).unwrap();
    let words = Value::list(vec![Value::from("hey"), Value::from("you")]);
    let (this, _) = object(vec![("words", words)]);
    let mut runtime = Registry::new();
    runtime.register(upper_helper()).unwrap();
    assert_eq!(render_html(runtime, loaded, this), "HEY YOU <!---->");
}

#[test]
fn malformed_bytes_are_rejected() {
    let program = Registry::new().compile(&TemplateBuilder::new().finish(vec![text("x")])).unwrap();
    let bytes = program.to_bytes(false).unwrap();

    assert!(matches!(Program::from_bytes(b"nope"), Err(DecodeError::BadMagic)));
    assert!(matches!(Program::from_bytes(&bytes[..10]), Err(DecodeError::Truncated)));

    let mut wrong_version = bytes.clone();
    wrong_version[4] = 99;
    assert!(matches!(Program::from_bytes(&wrong_version), Err(DecodeError::UnsupportedVersion(99))));
}

/// Re-encodes `bytes` with its JSON metadata passed through `edit`.
fn edit_metadata(bytes: &[u8], edit: impl FnOnce(&mut serde_json::Value)) -> Vec<u8> {
    let heap_len = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
    let meta_at = 20 + heap_len * 4 + 4;
    let mut meta: serde_json::Value = serde_json::from_slice(&bytes[meta_at..]).unwrap();
    edit(&mut meta);
    let meta = serde_json::to_vec(&meta).unwrap();
    let mut out = bytes[..meta_at - 4].to_vec();
    out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta);
    out
}

#[test]
fn blocks_must_cover_whole_instructions() {
    // main: Text "x" (two words), Return (one word)
    let program = Registry::new().compile(&TemplateBuilder::new().finish(vec![text("x")])).unwrap();
    let bytes = program.to_bytes(false).unwrap();
    let main = program.main() as usize;
    assert_eq!(Program::from_bytes(&edit_metadata(&bytes, |_| {})).unwrap(), program);

    for (start, len) in [(u32::MAX, 2), (0, 1_000), (1, 2), (0, 1)] {
        let corrupt = edit_metadata(&bytes, |meta| {
            meta["constants"][main]["value"]["start"] = start.into();
            meta["constants"][main]["value"]["len"] = len.into();
        });
        assert!(
            matches!(Program::from_bytes(&corrupt), Err(DecodeError::BlockOutOfRange { .. })),
            "block {start}+{len} was accepted"
        );
    }
}

#[test]
fn disassembly_lists_every_block() {
    let template = {
        let mut builder = TemplateBuilder::new().module_name("listing");
        let yes = builder.block(&[], vec![text("yes")]);
        builder.finish(vec![
            open("p"),
            dynamic_attr("title", path("this.title")),
            block("if", vec![path("this.ok")], hash(vec![]), &[("default", yes)]),
            close(),
        ])
    };
    let program = Registry::new().compile(&template).unwrap();
    let listing = program.disassemble();

    assert!(listing.starts_with("; module listing"));
    assert!(listing.contains("(main)"));
    assert!(listing.contains(Op::DynamicAttr.name()));
    assert!(listing.contains(Op::EnterTry.name()));
    assert!(listing.contains(Op::JumpUnless.name()));
    assert!(listing.contains("\"yes\""));
    assert_eq!(listing.matches("\nblock ").count(), program.blocks().len());
}
