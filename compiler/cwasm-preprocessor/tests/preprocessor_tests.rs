use cwasm_macros::{assert_err, assert_matches, assert_ok};
use cwasm_preprocessor::{process, PreprocessError, Preprocessor};
use std::collections::BTreeMap;

fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, source)| (name.to_string(), source.to_string()))
        .collect()
}

#[test]
fn test_object_macro_is_replaced() {
    let output = assert_ok!(process(
        "#define CONSTANT 42\n\nint test() {\n  return CONSTANT;\n}"
    ));
    assert_eq!(output.trim(), "int test() {\n  return 42;\n}");
}

#[test]
fn test_function_macro_call() {
    let output = assert_ok!(process(
        "#define min(X, Y) ((X) < (Y) ? (X) : (Y))\nint test() {\n  return min(1 + 2, 5);\n}"
    ));
    assert_eq!(
        output.trim(),
        "int test() {\n  return ((1 + 2) < (5) ? (1 + 2) : (5));\n}"
    );
}

#[test]
fn test_directive_and_skipped_lines_become_empty() {
    let source = "int a;\n#ifdef missing\nint b;\n#else\nint c;\n#endif\nint d;";
    let output = assert_ok!(process(source));
    assert_eq!(output, "int a;\n\n\n\nint c;\n\nint d;");
    assert_eq!(output.split('\n').count(), source.split('\n').count());
}

#[test]
fn test_if_elif_else_chain() {
    let source = "#define LEVEL 2\n#if LEVEL == 1\none\n#elif LEVEL == 2\ntwo\n#elif LEVEL > 1\nnot this\n#else\nelse\n#endif";
    let output = assert_ok!(process(source));
    assert_eq!(output.split_whitespace().collect::<Vec<_>>(), vec!["two"]);
}

#[test]
fn test_nested_regions_inside_untaken_branch_are_balanced() {
    let source = "#if 0\n#if 1\ninner\n#else\nalso\n#endif\n#undef anything\n#else\nouter\n#endif";
    let output = assert_ok!(process(source));
    assert_eq!(output.split_whitespace().collect::<Vec<_>>(), vec!["outer"]);
}

#[test]
fn test_unknown_directive_only_fails_when_taken() {
    assert_ok!(process("#if 0\n#frobnicate\n#endif"));
    let err = assert_err!(process("int x;\n#frobnicate\n"));
    let err = assert_matches!(err, PreprocessError::Macro(err) => err);
    assert_eq!(err.line, 2);
}

#[test]
fn test_unbalanced_conditionals() {
    let err = assert_err!(process("#ifdef A\nint x;\n"));
    assert_matches!(err, PreprocessError::Macro(err) => assert_eq!(err.line, 1));
    assert_err!(process("#endif"));
    assert_err!(process("#if 1\n#else\n#else\n#endif"));
}

#[test]
fn test_error_directive_message() {
    let files = BTreeMap::new();
    let mut preprocessor = Preprocessor::new(&files);
    let err = assert_err!(preprocessor.process("main.c", "\n#error stop here"));
    assert_eq!(err.to_string(), "In file 'main.c': #error stop here");
}

#[test]
fn test_wrong_arity_is_macro_error() {
    let err = assert_err!(process("#define f(a, b) a + b\nint x = f(1);"));
    assert_matches!(err, PreprocessError::Macro(_));
}

#[test]
fn test_token_pasting_is_macro_error() {
    let err = assert_err!(process("#define cat(a, b) a ## b\nint cat(x, y);"));
    let err = assert_matches!(err, PreprocessError::Macro(e) => e);
    assert_eq!(err.line, 1);
}

#[test]
fn test_include_inlines_processed_file() {
    let files = files(&[
        ("util.h", "#pragma once\n#define TWICE(x) (x * 2)\nint helper(int);"),
        ("main.c", "#include \"util.h\"\n#include \"util.h\"\nint y = TWICE(3);"),
    ]);
    let mut preprocessor = Preprocessor::new(&files);
    let output = assert_ok!(preprocessor.process("main.c", &files["main.c"]));
    assert_eq!(output.matches("int helper(int);").count(), 1);
    assert!(output.contains("int y = (3 * 2);"));
}

#[test]
fn test_include_falls_back_to_second_resolver() {
    let program = files(&[("main.c", "#include <lib.h>\nint x = VALUE;")]);
    let headers = files(&[("lib.h", "#define VALUE 7")]);
    let resolver = (&program, &headers);
    let mut preprocessor = Preprocessor::new(&resolver);
    let output = assert_ok!(preprocessor.process("main.c", &program["main.c"]));
    assert_eq!(output.trim(), "int x = 7;");
}

#[test]
fn test_missing_and_recursive_includes() {
    let err = assert_err!(process("#include \"nowhere.h\""));
    assert_matches!(err, PreprocessError::Include(err) => assert_eq!(err.name, "nowhere.h"));

    let files = files(&[("self.h", "#include \"self.h\"")]);
    let mut preprocessor = Preprocessor::new(&files);
    let err = assert_err!(preprocessor.process("self.h", &files["self.h"]));
    assert_matches!(err, PreprocessError::Include(_));
}

#[test]
fn test_predefined_macros() {
    let files = BTreeMap::new();
    let mut preprocessor = Preprocessor::new(&files);
    assert_ok!(preprocessor.define("DEBUG", "1"));
    assert!(preprocessor.is_defined("DEBUG"));
    let output = assert_ok!(preprocessor.process("main.c", "#if DEBUG\nint debug;\n#endif"));
    assert_eq!(output.trim(), "int debug;");
}

#[test]
fn test_processing_output_again_is_a_no_op() {
    let source = r#"
#define SQUARE(x) x * x
#define NAME "square" // comment
/* block
   comment */
#ifdef SQUARE
int f(int v) { return SQUARE(v + 1); }
#endif
const char *name = NAME;
int g(int a,
      int b) { return a \
  + b; }
"#;
    let once = assert_ok!(process(source));
    let twice = assert_ok!(process(&once));
    assert_eq!(once, twice);
    assert!(once.contains("return (v + 1) * (v + 1);"));
}

#[test]
fn test_nested_function_macros() {
    let output = assert_ok!(process(
        "#define SQUARE(x) ((x) * (x))\n#define AREA(w, h) (SQUARE(w) + (h))\nint f(int a) {\n  return AREA(a + 1, 2);\n}"
    ));
    insta::assert_snapshot!(output.trim(), @r"
    int f(int a) {
      return (((a + 1) * (a + 1)) + (2));
    }
    ");
}
