use cwasm_macros::{assert_err, assert_ok};
use cwasm_wasm::instr::{BinaryOp, CompareOp, LoadKind, MemArg, StoreKind};
use cwasm_wasm::{
    BlockType, FuncType, HostImports, Instr, Trap, ValType, Value, WasmData, WasmFunction,
    WasmGlobal, WasmImport, WasmMemory, WasmModule,
};
use std::sync::{Arc, Mutex};

fn validate(bytes: &[u8]) {
    let mut validator = wasmparser::Validator::new();
    assert_ok!(validator.validate_all(bytes));
}

/// A module exercising every section: one import, two functions, a table, memory, the stack
/// pointer global and a data segment.
fn sample_module() -> WasmModule {
    let print = FuncType::new(vec![ValType::I32], None);
    let unary = FuncType::new(vec![ValType::I32], Some(ValType::I32));
    WasmModule {
        imports: vec![WasmImport {
            module: "c2wasm".to_owned(),
            name: "__put_char".to_owned(),
            ty: print,
        }],
        functions: vec![
            WasmFunction {
                name: "double".to_owned(),
                ty: unary.clone(),
                locals: vec![],
                body: vec![
                    Instr::LocalGet(0),
                    Instr::LocalGet(0),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                ],
                export: None,
            },
            WasmFunction {
                name: "run".to_owned(),
                ty: unary.clone(),
                locals: vec![ValType::I32],
                body: vec![
                    // print the string at 32 up to its terminator
                    Instr::I32Const(32),
                    Instr::LocalSet(1),
                    Instr::Block {
                        ty: BlockType::Empty,
                        body: vec![Instr::Loop {
                            ty: BlockType::Empty,
                            body: vec![
                                Instr::LocalGet(1),
                                Instr::Load(LoadKind::I32U8, MemArg::new(0, 0)),
                                Instr::Eqz(ValType::I32),
                                Instr::BrIf(1),
                                Instr::LocalGet(1),
                                Instr::Load(LoadKind::I32U8, MemArg::new(0, 0)),
                                Instr::Call(0),
                                Instr::LocalGet(1),
                                Instr::I32Const(1),
                                Instr::Binary(ValType::I32, BinaryOp::Add),
                                Instr::LocalSet(1),
                                Instr::Br(0),
                            ],
                        }],
                    },
                    Instr::GlobalGet(0),
                    Instr::LocalGet(0),
                    Instr::Store(StoreKind::I32, MemArg::new(0, 2)),
                    Instr::GlobalGet(0),
                    Instr::Load(LoadKind::I32, MemArg::new(0, 2)),
                    Instr::I32Const(1),
                    Instr::CallIndirect(unary),
                ],
                export: Some("run".to_owned()),
            },
        ],
        table: vec![1],
        memory: Some(WasmMemory {
            pages: 17,
            export: Some("__mem".to_owned()),
        }),
        globals: vec![WasmGlobal {
            name: "__sp".to_owned(),
            mutable: true,
            init: Value::I32(1024),
            export: Some("__sp".to_owned()),
        }],
        data: vec![WasmData {
            offset: 32,
            bytes: b"ok\n".to_vec(),
        }],
    }
}

fn capture_output() -> (HostImports, Arc<Mutex<Vec<u8>>>) {
    let output = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&output);
    let imports = HostImports::new().function(
        "c2wasm",
        "__put_char",
        FuncType::new(vec![ValType::I32], None),
        move |args| {
            if let [Value::I32(c)] = args {
                sink.lock().unwrap().push(*c as u8);
            }
            Ok(None)
        },
    );
    (imports, output)
}

#[test]
fn test_empty_module_is_header_only() {
    let bytes = WasmModule::new().to_bytes();
    assert_eq!(bytes, vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]);
    validate(&bytes);
}

#[test]
fn test_sample_module_validates() {
    validate(&sample_module().to_bytes());
}

#[test]
fn test_sample_module_runs_on_the_engine() {
    let (imports, output) = capture_output();
    let mut instance = assert_ok!(sample_module().instantiate(imports));
    assert_eq!(assert_ok!(instance.invoke_i32("run", &[21])), 42);
    assert_eq!(output.lock().unwrap().as_slice(), b"ok\n");
    assert_eq!(instance.global("__sp"), Some(Value::I32(1024)));
    assert_eq!(&instance.memory()[1024..1028], &21i32.to_le_bytes());
    assert_eq!(instance.exports(), vec!["run"]);
}

#[test]
fn test_division_by_zero_traps() {
    let module = WasmModule {
        functions: vec![WasmFunction {
            name: "div".to_owned(),
            ty: FuncType::new(vec![ValType::I32, ValType::I32], Some(ValType::I32)),
            locals: vec![],
            body: vec![
                Instr::LocalGet(0),
                Instr::LocalGet(1),
                Instr::Binary(ValType::I32, BinaryOp::DivS),
            ],
            export: Some("div".to_owned()),
        }],
        ..WasmModule::default()
    };
    validate(&module.to_bytes());
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("div", &[-7, 2])), -3);
    let err = assert_err!(instance.invoke_i32("div", &[1, 0]));
    assert_eq!(err, Trap::IntegerDivideByZero);
    let err = assert_err!(instance.invoke("div", &[Value::I64(1), Value::I32(1)]));
    assert_eq!(err, Trap::BadArguments("div".to_owned()));
}

#[test]
fn test_if_with_result_and_select() {
    let module = WasmModule {
        functions: vec![WasmFunction {
            name: "max".to_owned(),
            ty: FuncType::new(vec![ValType::I32, ValType::I32], Some(ValType::I32)),
            locals: vec![],
            body: vec![
                Instr::LocalGet(0),
                Instr::LocalGet(1),
                Instr::LocalGet(0),
                Instr::LocalGet(1),
                Instr::Compare(ValType::I32, CompareOp::GtS),
                Instr::Select,
                Instr::I32Const(0),
                Instr::Compare(ValType::I32, CompareOp::LtS),
                Instr::If {
                    ty: BlockType::Result(ValType::I32),
                    then: vec![Instr::I32Const(-1)],
                    otherwise: vec![Instr::I32Const(1)],
                },
            ],
            export: Some("max_sign".to_owned()),
        }],
        ..WasmModule::default()
    };
    validate(&module.to_bytes());
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("max_sign", &[-4, -9])), -1);
    assert_eq!(assert_ok!(instance.invoke_i32("max_sign", &[-4, 9])), 1);
}

#[test]
fn test_memory_grow_reports_previous_size() {
    let module = WasmModule {
        functions: vec![WasmFunction {
            name: "grow".to_owned(),
            ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            locals: vec![],
            body: vec![Instr::LocalGet(0), Instr::MemoryGrow],
            export: Some("grow".to_owned()),
        }],
        memory: Some(WasmMemory {
            pages: 2,
            export: None,
        }),
        ..WasmModule::default()
    };
    validate(&module.to_bytes());
    let mut instance = assert_ok!(module.instantiate(HostImports::new()));
    assert_eq!(assert_ok!(instance.invoke_i32("grow", &[3])), 2);
    assert_eq!(assert_ok!(instance.invoke_i32("grow", &[0])), 5);
    assert_eq!(assert_ok!(instance.invoke_i32("grow", &[100_000])), -1);
}

mod numeric {
    use cwasm_wasm::instr::BinaryOp;
    use cwasm_wasm::numeric::binary;
    use cwasm_wasm::{Trap, Value};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_i32_arithmetic_wraps(a in any::<i32>(), b in any::<i32>()) {
            let (x, y) = (Value::I32(a), Value::I32(b));
            prop_assert_eq!(binary(BinaryOp::Add, x, y), Ok(Value::I32(a.wrapping_add(b))));
            prop_assert_eq!(binary(BinaryOp::Mul, x, y), Ok(Value::I32(a.wrapping_mul(b))));
            let shifted = a.wrapping_shl(b as u32);
            prop_assert_eq!(binary(BinaryOp::Shl, x, y), Ok(Value::I32(shifted)));
        }

        #[test]
        fn test_unsigned_division(a in any::<i32>(), b in any::<i32>()) {
            let expected = match b {
                0 => Err(Trap::IntegerDivideByZero),
                _ => Ok(Value::I32((a as u32 / b as u32) as i32)),
            };
            prop_assert_eq!(binary(BinaryOp::DivU, Value::I32(a), Value::I32(b)), expected);
        }
    }
}
