//! Tests for the shape of the modules the compiler produces.

use cwasm_driver::pipeline::PipelineError;
use cwasm_driver::{Compiler, Library};
use cwasm_macros::{assert_err, assert_matches, assert_ok, assert_some};
use cwasm_opt::OptimizationFlags;
use cwasm_wasm::instr::walk;
use cwasm_wasm::{Instr, WasmModule};
use std::collections::BTreeMap;

fn compile(source: &str) -> WasmModule {
    let module = assert_ok!(Compiler::new().compile_source(source, Some(Library::standard())));
    let bytes = module.to_bytes();
    assert_ok!(wasmparser::Validator::new().validate_all(&bytes));
    module
}

fn count(module: &WasmModule, predicate: impl Fn(&Instr) -> bool) -> usize {
    let mut count = 0;
    for function in &module.functions {
        walk(&function.body, &mut |instr| count += usize::from(predicate(instr)));
    }
    count
}

#[test]
fn test_empty_program_is_an_empty_module() {
    let module = compile("");
    assert_eq!(module.to_bytes().len(), 8);
}

#[test]
fn test_memory_only_when_needed() {
    let pure = compile("int add(int a, int b) { return a + b; }");
    assert!(pure.memory.is_none());
    assert!(pure.globals.is_empty());

    let statics = compile("int counter; int next(void) { return ++counter; }");
    assert_some!(statics.memory.as_ref());
    assert!(statics.globals.is_empty());

    let stack = compile(
        "static void set(int *p) { *p = 9; }
        int run(void) { int x; set(&x); return x; }",
    );
    assert_some!(stack.memory.as_ref());
    assert_eq!(stack.globals.len(), 1);
    assert_eq!(stack.globals[0].name, "__sp");
}

#[test]
fn test_switch_lowering_follows_the_flag() {
    let source = "
        int run(int x) {
            switch (x) {
            case 1: return 10;
            case 2: return 20;
            case 3: return 30;
            case 4: return 40;
            default: return 0;
            }
        }";
    let mut compiler = Compiler::new();
    compiler.set_flags(OptimizationFlags::none());
    let chain = assert_ok!(compiler.compile_snippet(source));
    assert_eq!(count(&chain, |i| matches!(i, Instr::BrTable { .. })), 0);
    assert!(count(&chain, |i| matches!(i, Instr::BrIf(_))) >= 4);

    assert_ok!(compiler.merge_flags([("generation_switch_br_table", true)]));
    let table = assert_ok!(compiler.compile_snippet(source));
    assert_eq!(count(&table, |i| matches!(i, Instr::BrTable { .. })), 1);
    assert_eq!(count(&table, |i| matches!(i, Instr::BrIf(_))), 0);
}

#[test]
fn test_tentative_definitions_across_files() {
    let files = |second: &str| {
        BTreeMap::from([
            (
                "a.c".to_owned(),
                "int shared; int get(void) { return shared; }".to_owned(),
            ),
            ("b.c".to_owned(), second.to_owned()),
        ])
    };
    let compiler = Compiler::new();
    assert_ok!(compiler.compile(&files("int shared; void set(int v) { shared = v; }"), None));
    let module = assert_ok!(compiler.compile(&files("int shared = 3;"), None));
    let mut instance = assert_ok!(module.instantiate(cwasm_wasm::HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("get", &[])), 3);

    let conflicting = BTreeMap::from([
        ("a.c".to_owned(), "int shared = 1; int get(void) { return shared; }".to_owned()),
        ("b.c".to_owned(), "int shared = 2;".to_owned()),
    ]);
    let err = assert_err!(compiler.compile(&conflicting, None));
    assert_matches!(err.kind, PipelineError::Link(_));
}

#[test]
fn test_errors_name_the_offending_file() {
    let files = BTreeMap::from([
        ("good.c".to_owned(), "int one(void) { return 1; }".to_owned()),
        ("bad.c".to_owned(), "int two(void) { return undefined_name; }".to_owned()),
    ]);
    let err = assert_err!(Compiler::new().compile(&files, None));
    assert_matches!(err.kind, PipelineError::Ir(_));
    assert_eq!(err.file.as_deref(), Some("bad.c"));
}
