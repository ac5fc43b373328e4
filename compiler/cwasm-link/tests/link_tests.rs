use cwasm_ir::IrTranslationUnit;
use cwasm_link::error::LinkError;
use cwasm_link::library::IrLibrary;
use cwasm_link::{link, link_restricted};
use cwasm_macros::{assert_err, assert_matches, assert_none, assert_ok, assert_some};

fn unit(name: &str, source: &str) -> IrTranslationUnit {
    let ast = cwasm_syntax::parse(source).expect("test source should parse");
    cwasm_ir::build(name, &ast).expect("test source should build")
}

fn library() -> IrLibrary {
    let units = vec![
        unit(
            "alloc.c",
            "static char heap[1024];
             static int top;
             void *malloc(unsigned int n) { void *p = heap + top; top += n; return p; }
             void *calloc(unsigned int n, unsigned int size) { return malloc(n * size); }
             void free(void *p) {}",
        ),
        unit(
            "stdio.c",
            "import void __put_char(int c);
             int putchar(int c) { __put_char(c); return c; }
             int printf(const char *format, ...) {
                 int n = 0;
                 while (format[n]) { putchar(format[n]); n++; }
                 return n;
             }",
        ),
    ];
    assert_ok!(IrLibrary::new("libc", units))
}

fn function_names(program: &cwasm_link::LinkedProgram) -> Vec<&str> {
    program.functions.iter().map(|f| f.link_name.as_str()).collect()
}

#[test]
fn test_tentative_definitions_merge_across_units() {
    let a = unit("a.c", "int counter; int get(void) { return counter; }");
    let b = unit("b.c", "int counter; void bump(void) { counter++; }");
    let program = assert_ok!(link(&[a, b], &[]));
    assert_eq!(program.variables.len(), 1);
    let counter = assert_some!(program.variable("counter"));
    assert_eq!(counter.data.bytes, vec![0; 4]);
}

#[test]
fn test_one_initializer_among_tentative_definitions() {
    let a = unit("a.c", "int counter; int get(void) { return counter; }");
    let b = unit("b.c", "int counter = 7; void bump(void) { counter++; }");
    let program = assert_ok!(link(&[a, b], &[]));
    let counter = assert_some!(program.variable("counter"));
    assert_eq!(counter.data.bytes, 7i32.to_le_bytes());
}

#[test]
fn test_two_initializers_conflict() {
    let a = unit("a.c", "int counter = 1; int get(void) { return counter; }");
    let b = unit("b.c", "int counter = 2;");
    let err = assert_err!(link(&[a, b], &[]));
    assert_matches!(err, LinkError::ConflictingDefinition(e) => assert_eq!(e.name, "counter"));
}

#[test]
fn test_incompatible_declarations_conflict() {
    let a = unit("a.c", "int value; int get(void) { return value; }");
    let b = unit("b.c", "float value;");
    let err = assert_err!(link(&[a, b], &[]));
    assert_matches!(err, LinkError::ConflictingDefinition(_));

    let a = unit("a.c", "int f(void) { return 1; }");
    let b = unit("b.c", "int f;");
    let err = assert_err!(link(&[a, b], &[]));
    assert_matches!(err, LinkError::ConflictingDefinition(_));

    let a = unit("a.c", "int f(void) { return 1; }");
    let b = unit("b.c", "int f(void) { return 2; }");
    let err = assert_err!(link(&[a, b], &[]));
    assert_matches!(err, LinkError::ConflictingDefinition(_));
}

#[test]
fn test_unreferenced_declarations_are_ignored() {
    let a = unit("a.c", "extern int missing; int g(void); int f(void) { return 1; }");
    let program = assert_ok!(link(&[a], &[]));
    assert_eq!(function_names(&program), vec!["f"]);
    assert!(program.variables.is_empty());
}

#[test]
fn test_unresolved_references_are_rejected() {
    let a = unit("a.c", "int g(void); int f(void) { return g(); }");
    let err = assert_err!(link(&[a], &[]));
    assert_matches!(err, LinkError::UnresolvedSymbol(e) => assert_eq!(e.name, "g"));

    let a = unit("a.c", "extern int x; int f(void) { return x; }");
    let err = assert_err!(link_restricted(&[a]));
    assert_matches!(err, LinkError::UnresolvedSymbol(e) => assert_eq!(e.name, "x"));
}

#[test]
fn test_internal_symbols_do_not_collide() {
    let a = unit("a.c", "static int x = 1; static int h(void) { return x; } int f(void) { return h(); }");
    let b = unit("b.c", "static int x = 2; static int h(void) { return x; } int g(void) { return h(); }");
    let program = assert_ok!(link(&[a, b], &[]));
    assert_eq!(function_names(&program), vec!["h@a.c", "f", "h@b.c", "g"]);
    assert_some!(program.variable("x@a.c"));
    assert_some!(program.variable("x@b.c"));
}

#[test]
fn test_unreachable_internal_items_are_dropped() {
    let a = unit(
        "a.c",
        "static int unused_data = 5;
         static int unused(void) { return unused_data; }
         int f(void) { return 1; }",
    );
    let program = assert_ok!(link(&[a], &[]));
    assert_eq!(function_names(&program), vec!["f"]);
    assert!(program.variables.is_empty());
    assert_eq!(program.exports, vec!["f".to_owned()]);
}

#[test]
fn test_imports_become_host_functions() {
    let a = unit("a.c", "import void log_value(int v); void f(void) { log_value(3); }");
    let program = assert_ok!(link_restricted(&[a]));
    let import = assert_some!(program.import("log_value"));
    assert_eq!(import.ty.parameters.len(), 1);
    assert_none!(program.function("log_value"));
}

#[test]
fn test_library_linking_is_selective() {
    let libc = library();
    let a = unit(
        "main.c",
        "void *malloc(unsigned int n); void free(void *p);
         int run(void) { char *p = malloc(4); free(p); return 0; }",
    );
    let program = assert_ok!(link(&[a], &[&libc]));
    let names = function_names(&program);
    assert!(names.contains(&"malloc") && names.contains(&"free"));
    assert!(!names.contains(&"printf") && !names.contains(&"putchar"));
    assert!(program.imports.is_empty());
    // calloc lives in the same unit but nothing refers to it.
    assert!(!names.contains(&"calloc"));
    assert_eq!(program.exports, vec!["run".to_owned()]);

    let b = unit(
        "main.c",
        "int printf(const char *format, ...);
         int run(void) { return printf(\"hi\"); }",
    );
    let program = assert_ok!(link(&[b], &[&libc]));
    let names = function_names(&program);
    assert!(names.contains(&"printf") && names.contains(&"putchar"));
    assert!(!names.contains(&"malloc"));
    assert_some!(program.import("__put_char"));
}

#[test]
fn test_program_definitions_take_precedence_over_libraries() {
    let libc = library();
    let a = unit(
        "main.c",
        "int putchar(int c) { return c + 1; }
         int printf(const char *format, ...);
         int run(void) { return printf(\"x\"); }",
    );
    let program = assert_ok!(link(&[a], &[&libc]));
    let putchars = program
        .functions
        .iter()
        .filter(|f| f.link_name == "putchar")
        .count();
    assert_eq!(putchars, 1);
    assert_eq!(program.functions[0].link_name, "putchar");
}

#[test]
fn test_library_rejects_duplicate_definitions() {
    let units = vec![
        unit("x.c", "int f(void) { return 1; }"),
        unit("y.c", "int f(void) { return 2; }"),
    ];
    let err = assert_err!(IrLibrary::new("dup", units));
    assert_matches!(err, LinkError::ConflictingDefinition(_));
}

#[test]
fn test_restricted_mode_ignores_libraries() {
    let a = unit("main.c", "void free(void *p); void run(void) { free(0); }");
    let err = assert_err!(link_restricted(&[a]));
    assert_matches!(err, LinkError::UnresolvedSymbol(_));
}
