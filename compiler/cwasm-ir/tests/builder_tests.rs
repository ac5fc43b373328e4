use cwasm_ir::error::{IrError, IrResult};
use cwasm_ir::expr::IrExprKind;
use cwasm_ir::item::{DefinitionState, IrRelocation};
use cwasm_ir::stmt::IrStmt;
use cwasm_ir::ty::{IrIntegerKind, IrTy};
use cwasm_ir::IrTranslationUnit;
use cwasm_macros::{assert_err, assert_matches, assert_ok, assert_some};
use proptest::prelude::*;

fn build(source: &str) -> IrResult<IrTranslationUnit> {
    let ast = cwasm_syntax::parse(source).expect("test source should parse");
    cwasm_ir::build("test", &ast)
}

fn bytes_of<'a>(unit: &'a IrTranslationUnit, name: &str) -> &'a [u8] {
    &assert_some!(unit.variable(name)).data.bytes
}

#[test]
fn test_narrowing_casts_fold_to_wrapped_values() {
    let unit = assert_ok!(build(
        "unsigned char a = (unsigned char)12345;
         signed char b = (signed char)-12345;
         unsigned char c = (unsigned char)-12345;"
    ));
    assert_eq!(bytes_of(&unit, "a"), &[57]);
    assert_eq!(bytes_of(&unit, "b"), &[(-57i8) as u8]);
    assert_eq!(bytes_of(&unit, "c"), &[199]);
}

#[test]
fn test_sizeof_uses_natural_layout() {
    let unit = assert_ok!(build(
        "struct S { char c; double d; short s; };
         union U { char c[5]; int i; };
         int s = sizeof(struct S);
         int u = sizeof(union U);
         int p = sizeof(char *);
         int l = sizeof(long);"
    ));
    assert_eq!(bytes_of(&unit, "s"), &24i32.to_le_bytes());
    assert_eq!(bytes_of(&unit, "u"), &8i32.to_le_bytes());
    assert_eq!(bytes_of(&unit, "p"), &4i32.to_le_bytes());
    assert_eq!(bytes_of(&unit, "l"), &4i32.to_le_bytes());
}

#[test]
fn test_array_length_is_inferred_from_initializer() {
    let unit = assert_ok!(build("int a[] = {1, 2, 3}; char s[] = \"hi\";"));
    let a = assert_some!(unit.variable("a"));
    assert_eq!(a.ty, IrTy::Array(Box::new(IrTy::INT), Some(3)));
    assert_eq!(a.data.bytes.len(), 12);
    assert_eq!(bytes_of(&unit, "s"), b"hi\0");
}

#[test]
fn test_designators_restart_the_position() {
    let unit = assert_ok!(build("int a[5] = {[3] = 7, 8};"));
    let words = bytes_of(&unit, "a")
        .chunks(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<_>>();
    assert_eq!(words, vec![0, 0, 0, 7, 8]);
}

#[test]
fn test_brace_elision_fills_nested_records() {
    let unit = assert_ok!(build(
        "struct P { int x, y; };
         struct P ps[2] = {1, 2, {3, 4}};"
    ));
    let words = bytes_of(&unit, "ps")
        .chunks(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<_>>();
    assert_eq!(words, vec![1, 2, 3, 4]);
}

#[test]
fn test_static_pointers_are_relocated() {
    let unit = assert_ok!(build(
        "int table[4];
         int *third = &table[2];
         const char *greeting = \"hello\";
         int f(void);
         int (*callback)(void) = f;"
    ));
    let third = assert_some!(unit.variable("third"));
    assert_eq!(
        third.data.relocations,
        vec![(
            0,
            IrRelocation::Address {
                symbol: "table".to_owned(),
                addend: 8
            }
        )]
    );
    let greeting = assert_some!(unit.variable("greeting"));
    let symbol = assert_matches!(&greeting.data.relocations[..], [(0, IrRelocation::Address { symbol, addend: 0 })] => symbol.clone());
    assert!(symbol.starts_with("str.") && symbol.ends_with("@test"));
    assert_eq!(bytes_of(&unit, &symbol), b"hello\0");
    let callback = assert_some!(unit.variable("callback"));
    assert_eq!(
        callback.data.relocations,
        vec![(
            0,
            IrRelocation::FunctionIndex {
                symbol: "f".to_owned()
            }
        )]
    );
}

#[test]
fn test_tentative_definitions_merge() {
    let unit = assert_ok!(build("int x; int x; int x = 3; static int y;"));
    let x = assert_some!(unit.variable("x"));
    assert_eq!(x.state, DefinitionState::Defined);
    assert_eq!(x.data.bytes, 3i32.to_le_bytes());
    let y = assert_some!(unit.variable("y@test"));
    assert_eq!(y.state, DefinitionState::Tentative);
    assert_eq!(y.data.bytes, vec![0; 4]);
}

#[test]
fn test_conflicting_redeclarations_are_rejected() {
    let err = assert_err!(build("int x; float x;"));
    assert_matches!(err, IrError::Redeclaration(_));
    let err = assert_err!(build("int x = 1; int x = 2;"));
    assert_matches!(err, IrError::Redeclaration(_));
    let err = assert_err!(build("int f(void) { return 0; } int f(void) { return 1; }"));
    assert_matches!(err, IrError::Redeclaration(_));
}

#[test]
fn test_locals_are_declared_once_per_scope() {
    for source in [
        "void f(void) { int a; char a; }",
        "void f(void) { int a; int a; }",
        "int f(int a, int a) { return a; }",
        "int f(int a) { int a = 1; return a; }",
        "void f(void) { enum { A }; int A; }",
        "void f(void) { int a; extern int a; }",
    ] {
        let err = assert_err!(build(source));
        let err = assert_matches!(err, IrError::Redeclaration(e) => e);
        assert_eq!(err.name.len(), 1, "{source}");
    }
}

#[test]
fn test_inner_blocks_may_shadow() {
    assert_ok!(build("int a; int f(int a) { { int a = 2; { char a; } } return a; }"));
    assert_ok!(build("void f(void) { for (int i = 0; i < 1; i++) { int i = 3; } }"));
}

#[test]
fn test_goto_into_nested_block_is_unsupported() {
    let err = assert_err!(build(
        "int f(int x) {
             goto inner;
             if (x) {
             inner:
                 return 1;
             }
             return 0;
         }"
    ));
    assert_matches!(err, IrError::UnsupportedGoto(_));
}

#[test]
fn test_backward_goto_to_enclosing_block_is_accepted() {
    let unit = assert_ok!(build(
        "int f(int n) {
             int i = 0;
         again:
             if (i < n) {
                 i++;
                 goto again;
             }
             return i;
         }"
    ));
    let f = assert_some!(unit.function("f"));
    assert!(f
        .body
        .iter()
        .any(|s| matches!(s, IrStmt::Labeled { label, .. } if label == "again")));
}

#[test]
fn test_switch_errors() {
    let err = assert_err!(build(
        "int f(int x) { switch (x) { case 1: return 1; case 1: return 2; } return 0; }"
    ));
    assert_matches!(err, IrError::DuplicateCase(_));
    let err = assert_err!(build(
        "int f(int x) { switch (x) { case 1: { case 2: return 1; } } return 0; }"
    ));
    assert_matches!(err, IrError::MisplacedCase(_));
    let err = assert_err!(build("int f(int x) { case 1: return 1; }"));
    assert_matches!(err, IrError::MisplacedCase(_));
}

#[test]
fn test_switch_sections_fall_through_in_order() {
    let unit = assert_ok!(build(
        "int f(int x) {
             int r = 0;
             switch (x) {
             case 1:
             case 2: r = 2;
             default: r++;
             case 5: break;
             }
             return r;
         }"
    ));
    let f = assert_some!(unit.function("f"));
    let sections = assert_some!(f.body.iter().find_map(|s| match s {
        IrStmt::Switch { sections, .. } => Some(sections),
        _ => None,
    }));
    let values = sections.iter().map(|s| s.value).collect::<Vec<_>>();
    assert_eq!(values, vec![Some(1), Some(2), None, Some(5)]);
    assert!(sections[0].body.is_empty());
}

#[test]
fn test_variadic_arguments_are_promoted() {
    let unit = assert_ok!(build(
        "int sum(int n, ...);
         int f(void) { char c = 1; float x = 2.0f; return sum(2, c, x); }"
    ));
    let f = assert_some!(unit.function("f"));
    let IrStmt::Return(Some(value)) = assert_some!(f.body.last()) else {
        panic!("expected a return statement");
    };
    let (types, area) = assert_matches!(&value.kind, IrExprKind::Call { variadic_arguments, variadic_area, .. } => {
        (variadic_arguments.iter().map(|a| a.ty.clone()).collect::<Vec<_>>(), *variadic_area)
    });
    assert_eq!(types, vec![IrTy::INT, IrTy::DOUBLE]);
    let area = assert_some!(area);
    assert_eq!(
        f.local(area).ty,
        IrTy::Array(Box::new(IrTy::Integer(IrIntegerKind::U8)), Some(16))
    );
}

#[test]
fn test_prototyped_call_checks_argument_count() {
    let err = assert_err!(build("int g(int a); int f(void) { return g(1, 2); }"));
    assert_matches!(err, IrError::ArgumentCount(_));
    // Unprototyped functions accept any arguments.
    assert_ok!(build("int g(); int f(void) { return g(1, 2); }"));
}

#[test]
fn test_type_errors() {
    let err = assert_err!(build("void f(void) { return 1; }"));
    assert_matches!(err, IrError::Type(_));
    let err = assert_err!(build("int f(void) { return; }"));
    assert_matches!(err, IrError::Type(_));
    let err = assert_err!(build("struct S { int x; }; int f(struct S s) { return s + 1; }"));
    assert_matches!(err, IrError::Type(_));
    let err = assert_err!(build("int f(void) { int *p; float x = 1; p = x; return 0; }"));
    assert_matches!(err, IrError::Type(_));
}

#[test]
fn test_name_resolution_errors() {
    let err = assert_err!(build("int f(void) { return y; }"));
    assert_matches!(err, IrError::UndeclaredIdentifier(_));
    let err = assert_err!(build("struct S { int x; }; int f(struct S s) { return s.y; }"));
    assert_matches!(err, IrError::UnknownField(_));
    let err = assert_err!(build("int f(void) { 3 = 4; return 0; }"));
    assert_matches!(err, IrError::InvalidLvalue(_));
    let err = assert_err!(build("int f(void) { break; }"));
    assert_matches!(err, IrError::BreakOutsideLoop(_));
}

#[test]
fn test_address_taken_locals_escape() {
    let unit = assert_ok!(build(
        "void g(int *p);
         void f(void) { int a = 1; int b = 2; g(&a); b++; }"
    ));
    let f = assert_some!(unit.function("f"));
    let escapes = f
        .locals
        .iter()
        .map(|l| (l.name.as_str(), l.escapes))
        .collect::<Vec<_>>();
    assert_eq!(escapes, vec![("a", true), ("b", false)]);
}

#[test]
fn test_block_statics_get_unique_internal_names() {
    let unit = assert_ok!(build(
        "int counter(void) { static int n = 5; return ++n; }"
    ));
    let n = assert_some!(unit.variable("counter.n.0@test"));
    assert_eq!(n.data.bytes, 5i32.to_le_bytes());
    let f = assert_some!(unit.function("counter"));
    assert!(f.references.contains("counter.n.0@test"));
}

#[test]
fn test_debug_printer_renders_functions() {
    let unit = assert_ok!(build("int add(int a, int b) { return a + b; }"));
    let text = cwasm_ir::debug::IrDebugPass::format_translation_unit_to_string(&unit);
    assert!(text.contains("external fn add(a%0: int, b%1: int) -> int {"));
    assert!(text.contains("return (a%0 + b%1);"));
}

proptest! {
    #[test]
    fn test_unsigned_char_cast_matches_wrapping(n in any::<i32>()) {
        let unit = build(&format!("unsigned char x = (unsigned char)({n});")).unwrap();
        prop_assert_eq!(bytes_of(&unit, "x"), &[n as u8]);
    }

    #[test]
    fn test_signed_short_cast_matches_wrapping(n in any::<i32>()) {
        let unit = build(&format!("short x = (short)({n});")).unwrap();
        prop_assert_eq!(bytes_of(&unit, "x"), &(n as i16).to_le_bytes());
    }
}
