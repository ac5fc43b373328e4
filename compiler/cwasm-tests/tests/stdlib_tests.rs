//! Tests for linking against the bundled runtime library.

use cwasm_driver::pipeline::PipelineError;
use cwasm_driver::{Compiler, Library};
use cwasm_macros::{assert_err, assert_matches, assert_ok};
use cwasm_opt::OptimizationFlags;
use cwasm_tests::execute;
use cwasm_wasm::WasmModule;

fn compile(source: &str) -> WasmModule {
    let mut compiler = Compiler::new();
    compiler.set_flags(OptimizationFlags::none());
    assert_ok!(compiler.compile_source(source, Some(Library::standard())))
}

fn function_names(module: &WasmModule) -> Vec<&str> {
    module.functions.iter().map(|f| f.name.as_str()).collect()
}

#[test]
fn test_allocation_does_not_pull_in_output() {
    let module = compile(
        "#include <stdlib.h>
        int main(void) {
            int *a = malloc(8);
            int *b = calloc(2, 4);
            a[1] = 5;
            b[1] += a[1];
            free(a);
            return b[1];
        }",
    );
    let names = function_names(&module);
    for name in ["malloc", "calloc", "free"] {
        assert!(names.contains(&name), "{name} missing from {names:?}");
    }
    for name in ["printf", "putchar", "puts"] {
        assert!(!names.contains(&name), "{name} pulled into {names:?}");
    }
    assert!(module.imports.is_empty());
    assert_eq!(assert_ok!(execute(&module)).status, 5);
}

#[test]
fn test_output_does_not_pull_in_allocation() {
    let module = compile(
        "#include <stdio.h>
        int main(void) { printf(\"%d\\n\", 5); return 0; }",
    );
    let names = function_names(&module);
    assert!(names.contains(&"printf"));
    for name in ["malloc", "calloc", "free", "memset"] {
        assert!(!names.contains(&name), "{name} pulled into {names:?}");
    }
    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.imports[0].name, "__put_char");
    let execution = assert_ok!(execute(&module));
    assert_eq!(execution.output, "5\n");
}

#[test]
fn test_programs_may_replace_library_functions() {
    let module = compile(
        "#include <stdio.h>
        int putchar(int c) { return c; }
        int main(void) { puts(\"quiet\"); return 0; }",
    );
    assert!(module.imports.is_empty());
    let execution = assert_ok!(execute(&module));
    assert_eq!(execution.output, "");
}

#[test]
fn test_freed_blocks_are_reused() {
    let module = compile(
        "#include <stdlib.h>
        int main(void) {
            char *first = malloc(16);
            char *second;
            free(first);
            second = malloc(12);
            return first == second;
        }",
    );
    assert_eq!(assert_ok!(execute(&module)).status, 1);
}

#[test]
fn test_unknown_headers_are_reported() {
    let source = "#include <math.h>\nint main(void) { return 0; }";
    let err = assert_err!(Compiler::new().compile_source(source, Some(Library::standard())));
    assert_matches!(err.kind, PipelineError::Preprocess(_));
}

#[test]
fn test_undefined_functions_are_reported() {
    let err = assert_err!(Compiler::new().compile_source(
        "int sqrt_int(int);\nint main(void) { return sqrt_int(16); }",
        Some(Library::standard())
    ));
    assert_matches!(err.kind, PipelineError::Link(_));
    assert_eq!(err.file, None);
}
