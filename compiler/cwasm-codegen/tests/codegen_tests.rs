use cwasm_codegen::error::CodegenError;
use cwasm_codegen::generate;
use cwasm_link::link_restricted;
use cwasm_macros::{assert_matches, assert_ok, assert_some};
use cwasm_wasm::instr::BinaryOp;
use cwasm_wasm::{FuncType, HostImports, Instance, Instr, Trap, ValType, Value, WasmModule};
use std::sync::{Arc, Mutex};

fn try_compile(source: &str) -> Result<WasmModule, CodegenError> {
    let ast = cwasm_syntax::parse(source).expect("test source should parse");
    let unit = cwasm_ir::build("test.c", &ast).expect("test source should build");
    let program = assert_ok!(link_restricted(&[unit]));
    generate(&program)
}

fn compile(source: &str) -> WasmModule {
    let module = assert_ok!(try_compile(source));
    let mut validator = wasmparser::Validator::new();
    assert_ok!(validator.validate_all(&module.to_bytes()));
    module
}

fn instance(source: &str) -> Instance {
    assert_ok!(compile(source).instantiate(HostImports::new()))
}

fn run(source: &str, export: &str, args: &[i32]) -> i32 {
    assert_ok!(instance(source).invoke_i32(export, args))
}

#[test]
fn test_scalar_function_uses_only_locals() {
    let module = compile("int add(int a, int b) { return a + b; }");
    let add = assert_some!(module.exported_function("add"));
    assert_eq!(
        add.body,
        vec![
            Instr::LocalGet(0),
            Instr::LocalGet(1),
            Instr::Binary(ValType::I32, BinaryOp::Add)
        ]
    );
    assert!(module.memory.is_none());
    assert!(module.globals.is_empty());
}

#[test]
fn test_recursion() {
    let source = "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }";
    assert_eq!(run(source, "fib", &[10]), 55);
}

#[test]
fn test_narrowing_conversions_wrap() {
    let source = "
        int to_char(int x) { char c = x; return c; }
        int to_uchar(int x) { unsigned char c = x; return c; }
        int to_short(int x) { short s = x; return s; }";
    let mut instance = instance(source);
    assert_eq!(assert_ok!(instance.invoke_i32("to_char", &[200])), -56);
    assert_eq!(assert_ok!(instance.invoke_i32("to_uchar", &[300])), 44);
    assert_eq!(assert_ok!(instance.invoke_i32("to_short", &[70000])), 4464);
}

#[test]
fn test_float_conversions_saturate() {
    let source = "
        int big(void) { double d = 1000.5; signed char c = d; return c; }
        int negative(void) { double d = -3.75; return (int)d; }
        int unsigned_char(void) { float f = 300.0f; unsigned char c = f; return c; }";
    let mut instance = instance(source);
    assert_eq!(assert_ok!(instance.invoke_i32("big", &[])), 127);
    assert_eq!(assert_ok!(instance.invoke_i32("negative", &[])), -3);
    assert_eq!(assert_ok!(instance.invoke_i32("unsigned_char", &[])), 255);
}

#[test]
fn test_signedness_selects_operations() {
    let source = "
        int sdiv(int a, int b) { return a / b; }
        int udiv(int a, int b) { return (unsigned int)a / (unsigned int)b; }
        int slt(int a, int b) { return a < b; }
        int ult(int a, int b) { return (unsigned int)a < (unsigned int)b; }
        int fge(int a, int b) { return (double)a >= (double)b; }";
    let mut instance = instance(source);
    assert_eq!(assert_ok!(instance.invoke_i32("sdiv", &[-7, 2])), -3);
    assert_eq!(assert_ok!(instance.invoke_i32("udiv", &[-2, 2])), i32::MAX);
    assert_eq!(assert_ok!(instance.invoke_i32("slt", &[-1, 1])), 1);
    assert_eq!(assert_ok!(instance.invoke_i32("ult", &[-1, 1])), 0);
    assert_eq!(assert_ok!(instance.invoke_i32("fge", &[-1, 1])), 0);
}

#[test]
fn test_long_long_arithmetic() {
    let source = "int high(int x) { long long v = x; v = v << 40; return (int)(v >> 32); }";
    assert_eq!(run(source, "high", &[1]), 256);
}

#[test]
fn test_struct_results_and_copies() {
    let source = "
        struct point { int x; int y; };
        static struct point make(int x, int y) { struct point p; p.x = x; p.y = y; return p; }
        int sum(int a, int b) {
            struct point q = make(a, b);
            struct point r;
            r = q;
            q.x = 100;
            return r.x * 10 + r.y;
        }";
    let module = compile(source);
    assert!(module.global_index("__sp").is_some());
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("sum", &[3, 4])), 34);
    // Every frame is released on return.
    assert_eq!(instance.global("__sp"), Some(Value::I32(1024)));
}

#[test]
fn test_address_taken_locals_live_in_memory() {
    let source = "
        static void set(int *p, int v) { *p = v; }
        int run(void) { int x = 1; set(&x, 42); return x; }";
    assert_eq!(run(source, "run", &[]), 42);
}

#[test]
fn test_goto_leaves_nested_loops() {
    let source = "
        int find(int n) {
            int i, j;
            for (i = 0; i < n; i++)
                for (j = 0; j < n; j++)
                    if (i * j == 12)
                        goto found;
            return -1;
        found:
            return i * 100 + j;
        }";
    let mut instance = instance(source);
    assert_eq!(assert_ok!(instance.invoke_i32("find", &[5])), 304);
    assert_eq!(assert_ok!(instance.invoke_i32("find", &[3])), -1);
}

#[test]
fn test_backward_goto_loops() {
    let source = "
        int count(int n) {
            int total = 0;
        again:
            total += n;
            if (--n > 0) goto again;
            return total;
        }";
    assert_eq!(run(source, "count", &[4]), 10);
}

#[test]
fn test_switch_falls_through() {
    let source = "
        int classify(int x) {
            int r = 0;
            switch (x) {
            case 1: r += 1;
            case 2: r += 2; break;
            case 5: r = 50; break;
            default: r = -1;
            }
            return r;
        }";
    let mut instance = instance(source);
    assert_eq!(assert_ok!(instance.invoke_i32("classify", &[1])), 3);
    assert_eq!(assert_ok!(instance.invoke_i32("classify", &[2])), 2);
    assert_eq!(assert_ok!(instance.invoke_i32("classify", &[5])), 50);
    assert_eq!(assert_ok!(instance.invoke_i32("classify", &[7])), -1);
}

#[test]
fn test_loops_with_break_and_continue() {
    let source = "
        int odd_sum(int n) {
            int total = 0, i = 0;
            while (1) {
                i++;
                if (i > n) break;
                if (i % 2 == 0) continue;
                total += i;
            }
            do { total++; } while (0);
            return total;
        }";
    assert_eq!(run(source, "odd_sum", &[5]), 10);
}

#[test]
fn test_function_pointers_use_the_table() {
    let source = "
        static int twice(int x) { return 2 * x; }
        static int square(int x) { return x * x; }
        int apply(int which, int v) { int (*f)(int) = which ? square : twice; return f(v); }";
    let module = compile(source);
    assert_eq!(module.table.len(), 2);
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("apply", &[0, 5])), 10);
    assert_eq!(assert_ok!(instance.invoke_i32("apply", &[1, 5])), 25);
}

#[test]
fn test_variadic_arguments() {
    let source = "
        static int sum(int n, ...) {
            char *ap;
            int total = 0;
            __builtin_va_start(ap);
            while (n-- > 0) total += __builtin_va_arg(ap, int);
            return total;
        }
        int run(void) { return sum(3, 10, 20, 30) + sum(0); }";
    assert_eq!(run(source, "run", &[]), 60);
}

#[test]
fn test_static_data_and_strings() {
    let source = "
        static const char *greeting = \"hello\";
        int counter = 5;
        int length(void) { int n = 0; while (greeting[n]) n++; return n + counter; }";
    let module = compile(source);
    let memory = assert_some!(module.memory.as_ref());
    assert_eq!(memory.pages, 17);
    assert_eq!(run(source, "length", &[]), 10);
}

#[test]
fn test_host_imports_are_called() {
    let source = "
        import void __put_char(int c);
        void hello(void) { const char *s = \"hi\"; while (*s) __put_char(*s++); }";
    let module = compile(source);
    assert_eq!(module.imports[0].module, "c2wasm");
    let output = Arc::new(Mutex::new(Vec::new()));
    let sink = output.clone();
    let imports = HostImports::new().function(
        "c2wasm",
        "__put_char",
        FuncType::new(vec![ValType::I32], None),
        move |args| match args {
            [Value::I32(c)] => {
                sink.lock().unwrap().push(*c as u8);
                Ok(None)
            }
            _ => Err(Trap::Host("bad arguments".to_owned())),
        },
    );
    let mut instance = assert_ok!(module.instantiate(imports));
    assert_ok!(instance.invoke("hello", &[]));
    assert_eq!(output.lock().unwrap().as_slice(), b"hi");
}

#[test]
fn test_unprototyped_calls_adapt_to_the_definition() {
    let source = "
        int f();
        int g(void) { return f(1, 2); }
        int f(int a) { return a + 1; }";
    assert_eq!(run(source, "g", &[]), 2);
}

#[test]
fn test_missing_return_value_traps() {
    let source = "int maybe(int x) { if (x) return 1; }";
    let mut instance = instance(source);
    assert_eq!(assert_ok!(instance.invoke_i32("maybe", &[1])), 1);
    assert_eq!(instance.invoke_i32("maybe", &[0]), Err(Trap::Unreachable));
}

#[test]
fn test_huge_frames_are_rejected() {
    let err = try_compile("int f(void) { char big[2000000]; big[0] = 1; return big[0]; }");
    assert_matches!(err, Err(CodegenError::FrameTooLarge(_)));
}
