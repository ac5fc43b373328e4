use cwasm_link::link_restricted;
use cwasm_macros::{assert_ok, assert_some};
use cwasm_opt::{optimize, OptimizationFlags};
use cwasm_wasm::instr::walk;
use cwasm_wasm::{HostImports, Instr, WasmModule};
use proptest::prelude::*;

fn compile(source: &str) -> WasmModule {
    let ast = cwasm_syntax::parse(source).expect("test source should parse");
    let unit = cwasm_ir::build("test.c", &ast).expect("test source should build");
    let program = assert_ok!(link_restricted(&[unit]));
    assert_ok!(cwasm_codegen::generate(&program))
}

fn compile_with(source: &str, flags: &OptimizationFlags) -> WasmModule {
    let mut module = compile(source);
    optimize(&mut module, flags);
    let mut validator = wasmparser::Validator::new();
    assert_ok!(validator.validate_all(&module.to_bytes()));
    module
}

fn run(module: &WasmModule, args: &[i32]) -> i32 {
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_ok!(instance.invoke_i32("run", args))
}

fn count(module: &WasmModule, predicate: impl Fn(&Instr) -> bool) -> usize {
    let mut count = 0;
    for function in &module.functions {
        walk(&function.body, &mut |instr| {
            if predicate(instr) {
                count += 1;
            }
        });
    }
    count
}

/// Single-flag flag sets, plus the default preset and everything enabled.
fn flag_sets() -> Vec<(String, OptimizationFlags)> {
    let mut sets = OptimizationFlags::NAMES
        .iter()
        .map(|name| {
            let mut flags = OptimizationFlags::none();
            assert_ok!(flags.set(name, true));
            (name.to_string(), flags)
        })
        .collect::<Vec<_>>();
    sets.push(("default".to_owned(), OptimizationFlags::default()));
    sets.push(("all".to_owned(), OptimizationFlags::all(true)));
    sets
}

const PROGRAMS: [&str; 4] = [
    "
    static int square(int x) { return x * x; }
    static int add(int a, int b) { return a + b; }
    int run(int n) {
        int total = 0, i;
        for (i = 0; i < n; i++) {
            int k = n * 3 + 1;
            total = add(total, square(i) + k);
        }
        return total;
    }",
    "
    int run(int x) {
        int r = 0;
        switch (x) {
        case 0: r = 10; break;
        case 1: r = 11;
        case 2: r += 12; break;
        case 3: r = 13; break;
        case 4: r = 14; break;
        default: r = -1;
        }
        return r;
    }",
    "
    struct pair { int a; int b; };
    static int swap_sum(struct pair *p) { int t = p->a; p->a = p->b; p->b = t; return p->a * 100 + p->b; }
    int run(int n) {
        struct pair p;
        int values[8];
        int i, s = 0;
        p.a = n;
        p.b = n + 1;
        for (i = 0; i < 8; i++) values[i] = i * n;
        for (i = 0; i < 8; i++) {
            if (values[i] > 20) goto done;
            s += values[i];
        }
    done:
        return s + swap_sum(&p);
    }",
    "
    int run(int n) {
        double d = n;
        long long v = n;
        int i;
        for (i = 0; i < 3; i++) {
            d = d * 1.5 + 0.25;
            v = v * 7 + 3;
        }
        return (int)d + (int)(v % 1000);
    }",
];

const INPUTS: [i32; 6] = [-3, 0, 1, 2, 5, 7];

#[test]
fn test_every_flag_preserves_results() {
    for source in PROGRAMS {
        let reference = compile_with(source, &OptimizationFlags::none());
        let expected = INPUTS.map(|n| run(&reference, &[n]));
        for (name, flags) in flag_sets() {
            let module = compile_with(source, &flags);
            let actual = INPUTS.map(|n| run(&module, &[n]));
            assert_eq!(actual, expected, "results changed with '{name}'");
        }
    }
}

#[test]
fn test_set_then_get_becomes_tee() {
    let flags = OptimizationFlags {
        peephole_local_tee: true,
        ..OptimizationFlags::none()
    };
    let module = compile_with("int f() { int a = 3; return a; }", &flags);
    let f = assert_some!(module.exported_function("f"));
    assert_eq!(f.body, vec![Instr::I32Const(3), Instr::LocalTee(0)]);
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("f", &[])), 3);
}

#[test]
fn test_dense_switch_uses_a_jump_table() {
    let source = PROGRAMS[1];
    let chain = compile_with(source, &OptimizationFlags::none());
    assert_eq!(count(&chain, |i| matches!(i, Instr::BrTable { .. })), 0);
    assert_eq!(count(&chain, |i| matches!(i, Instr::BrIf(_))), 5);
    let flags = OptimizationFlags {
        generation_switch_br_table: true,
        ..OptimizationFlags::none()
    };
    let table = compile_with(source, &flags);
    assert_eq!(count(&table, |i| matches!(i, Instr::BrTable { .. })), 1);
    assert_eq!(count(&table, |i| matches!(i, Instr::BrIf(_))), 0);
}

#[test]
fn test_inlined_helpers_are_removed() {
    let source = PROGRAMS[0];
    let plain = compile_with(source, &OptimizationFlags::none());
    assert_eq!(plain.functions.len(), 3);
    let flags = OptimizationFlags {
        inlining: true,
        ..OptimizationFlags::none()
    };
    let inlined = compile_with(source, &flags);
    assert_eq!(inlined.functions.len(), 1);
    assert_eq!(count(&inlined, |i| matches!(i, Instr::Call(_))), 0);
    assert_eq!(run(&inlined, &[4]), run(&plain, &[4]));
}

proptest! {
    #[test]
    fn test_optimized_arithmetic_matches(a in any::<i32>(), b in any::<i32>()) {
        let source = "
            int run(int a, int b) {
                int t = a * 3 + b;
                int u = t;
                if (t > 10) u = t - b;
                return (u << 2) ^ (a + 0) ^ (4 * 5);
            }";
        let plain = compile_with(source, &OptimizationFlags::none());
        let optimized = compile_with(source, &OptimizationFlags::all(true));
        prop_assert_eq!(run(&plain, &[a, b]), run(&optimized, &[a, b]));
    }
}
