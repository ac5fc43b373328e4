//! Binary encoding of a module description with `wasm-encoder`.
//!
//! Sections are emitted in the canonical order and skipped when they would be empty, so a module
//! without content encodes to the bare eight-byte header.

use crate::instr::{BinaryOp, CompareOp, ConvertOp, Instr, LoadKind, MemArg, StoreKind, UnaryOp};
use crate::module::WasmModule;
use crate::ty::{BlockType, FuncType, ValType, Value};
use cwasm_diagnostics::ice;
use std::borrow::Cow;
use std::collections::HashMap;
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, Ieee32, Ieee64,
    ImportSection, Instruction, MemorySection, MemoryType, Module, RefType, TableSection,
    TableType, TypeSection,
};

/// Interned function signatures in first-use order.
#[derive(Default)]
struct TypeTable {
    types: Vec<FuncType>,
    indices: HashMap<FuncType, u32>,
}

impl TypeTable {
    fn intern(&mut self, ty: &FuncType) -> u32 {
        if let Some(index) = self.indices.get(ty) {
            return *index;
        }
        let index = self.types.len() as u32;
        self.types.push(ty.clone());
        self.indices.insert(ty.clone(), index);
        index
    }

    fn index(&self, ty: &FuncType) -> u32 {
        match self.indices.get(ty) {
            Some(index) => *index,
            None => ice!("signature {} was not interned", ty),
        }
    }
}

/// Encode a module description into a binary module.
pub fn build(module: &WasmModule) -> Vec<u8> {
    let mut types = TypeTable::default();
    for import in &module.imports {
        types.intern(&import.ty);
    }
    for function in &module.functions {
        types.intern(&function.ty);
    }
    for function in &module.functions {
        crate::instr::walk(&function.body, &mut |instr| {
            if let Instr::CallIndirect(ty) = instr {
                types.intern(ty);
            }
        });
    }

    let mut wasm = Module::new();
    if !types.types.is_empty() {
        let mut section = TypeSection::new();
        for ty in &types.types {
            let results = ty.result.map(val_type);
            section
                .ty()
                .function(ty.params.iter().copied().map(val_type), results);
        }
        wasm.section(&section);
    }

    if !module.imports.is_empty() {
        let mut section = ImportSection::new();
        for import in &module.imports {
            section.import(
                &import.module,
                &import.name,
                EntityType::Function(types.index(&import.ty)),
            );
        }
        wasm.section(&section);
    }

    if !module.functions.is_empty() {
        let mut section = FunctionSection::new();
        for function in &module.functions {
            section.function(types.index(&function.ty));
        }
        wasm.section(&section);
    }

    if !module.table.is_empty() {
        let size = module.table.len() as u64 + 1;
        let mut section = TableSection::new();
        section.table(TableType {
            element_type: RefType::FUNCREF,
            table64: false,
            minimum: size,
            maximum: Some(size),
            shared: false,
        });
        wasm.section(&section);
    }

    if let Some(memory) = &module.memory {
        let mut section = MemorySection::new();
        section.memory(MemoryType {
            minimum: memory.pages as u64,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        wasm.section(&section);
    }

    if !module.globals.is_empty() {
        let mut section = GlobalSection::new();
        for global in &module.globals {
            let ty = GlobalType {
                val_type: val_type(global.init.ty()),
                mutable: global.mutable,
                shared: false,
            };
            section.global(ty, &const_expr(global.init));
        }
        wasm.section(&section);
    }

    let mut exports = ExportSection::new();
    let imports = module.import_count();
    for (index, function) in module.functions.iter().enumerate() {
        if let Some(name) = &function.export {
            exports.export(name, ExportKind::Func, imports + index as u32);
        }
    }
    if let Some(name) = module.memory.as_ref().and_then(|m| m.export.as_ref()) {
        exports.export(name, ExportKind::Memory, 0);
    }
    for (index, global) in module.globals.iter().enumerate() {
        if let Some(name) = &global.export {
            exports.export(name, ExportKind::Global, index as u32);
        }
    }
    if !exports.is_empty() {
        wasm.section(&exports);
    }

    if !module.table.is_empty() {
        let mut section = ElementSection::new();
        section.active(
            Some(0),
            &ConstExpr::i32_const(1),
            Elements::Functions(Cow::Borrowed(module.table.as_slice())),
        );
        wasm.section(&section);
    }

    if !module.functions.is_empty() {
        let mut section = CodeSection::new();
        for function in &module.functions {
            let mut encoded =
                Function::new_with_locals_types(function.locals.iter().copied().map(val_type));
            let mut sink = Encoder {
                function: &mut encoded,
                types: &types,
            };
            sink.sequence(&function.body);
            encoded.instruction(&Instruction::End);
            section.function(&encoded);
        }
        wasm.section(&section);
    }

    if !module.data.is_empty() {
        let mut section = DataSection::new();
        for segment in &module.data {
            section.active(
                0,
                &ConstExpr::i32_const(segment.offset as i32),
                segment.bytes.iter().copied(),
            );
        }
        wasm.section(&section);
    }

    let bytes = wasm.finish();
    tracing::debug!(bytes = bytes.len(), "encoded module");
    bytes
}

fn val_type(ty: ValType) -> wasm_encoder::ValType {
    match ty {
        ValType::I32 => wasm_encoder::ValType::I32,
        ValType::I64 => wasm_encoder::ValType::I64,
        ValType::F32 => wasm_encoder::ValType::F32,
        ValType::F64 => wasm_encoder::ValType::F64,
    }
}

fn block_type(ty: BlockType) -> wasm_encoder::BlockType {
    match ty {
        BlockType::Empty => wasm_encoder::BlockType::Empty,
        BlockType::Result(ty) => wasm_encoder::BlockType::Result(val_type(ty)),
    }
}

fn const_expr(value: Value) -> ConstExpr {
    match value {
        Value::I32(v) => ConstExpr::i32_const(v),
        Value::I64(v) => ConstExpr::i64_const(v),
        Value::F32(v) => ConstExpr::f32_const(Ieee32::from(v)),
        Value::F64(v) => ConstExpr::f64_const(Ieee64::from(v)),
    }
}

fn mem_arg(arg: MemArg) -> wasm_encoder::MemArg {
    wasm_encoder::MemArg {
        offset: arg.offset as u64,
        align: arg.align,
        memory_index: 0,
    }
}

struct Encoder<'a> {
    function: &'a mut Function,
    types: &'a TypeTable,
}

impl Encoder<'_> {
    fn emit(&mut self, instruction: Instruction) {
        self.function.instruction(&instruction);
    }

    fn sequence(&mut self, body: &[Instr]) {
        for instr in body {
            self.instr(instr);
        }
    }

    fn instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Unreachable => self.emit(Instruction::Unreachable),
            Instr::Nop => self.emit(Instruction::Nop),
            Instr::Block { ty, body } => {
                self.emit(Instruction::Block(block_type(*ty)));
                self.sequence(body);
                self.emit(Instruction::End);
            }
            Instr::Loop { ty, body } => {
                self.emit(Instruction::Loop(block_type(*ty)));
                self.sequence(body);
                self.emit(Instruction::End);
            }
            Instr::If {
                ty,
                then,
                otherwise,
            } => {
                self.emit(Instruction::If(block_type(*ty)));
                self.sequence(then);
                if !otherwise.is_empty() {
                    self.emit(Instruction::Else);
                    self.sequence(otherwise);
                }
                self.emit(Instruction::End);
            }
            Instr::Br(depth) => self.emit(Instruction::Br(*depth)),
            Instr::BrIf(depth) => self.emit(Instruction::BrIf(*depth)),
            Instr::BrTable { targets, default } => {
                self.emit(Instruction::BrTable(Cow::Borrowed(targets.as_slice()), *default))
            }
            Instr::Return => self.emit(Instruction::Return),
            Instr::Call(index) => self.emit(Instruction::Call(*index)),
            Instr::CallIndirect(ty) => self.emit(Instruction::CallIndirect {
                type_index: self.types.index(ty),
                table_index: 0,
            }),
            Instr::Drop => self.emit(Instruction::Drop),
            Instr::Select => self.emit(Instruction::Select),
            Instr::LocalGet(index) => self.emit(Instruction::LocalGet(*index)),
            Instr::LocalSet(index) => self.emit(Instruction::LocalSet(*index)),
            Instr::LocalTee(index) => self.emit(Instruction::LocalTee(*index)),
            Instr::GlobalGet(index) => self.emit(Instruction::GlobalGet(*index)),
            Instr::GlobalSet(index) => self.emit(Instruction::GlobalSet(*index)),
            Instr::Load(kind, arg) => self.emit(load(*kind, mem_arg(*arg))),
            Instr::Store(kind, arg) => self.emit(store(*kind, mem_arg(*arg))),
            Instr::MemorySize => self.emit(Instruction::MemorySize(0)),
            Instr::MemoryGrow => self.emit(Instruction::MemoryGrow(0)),
            Instr::MemoryCopy => self.emit(Instruction::MemoryCopy {
                src_mem: 0,
                dst_mem: 0,
            }),
            Instr::MemoryFill => self.emit(Instruction::MemoryFill(0)),
            Instr::I32Const(v) => self.emit(Instruction::I32Const(*v)),
            Instr::I64Const(v) => self.emit(Instruction::I64Const(*v)),
            Instr::F32Const(v) => self.emit(Instruction::F32Const(Ieee32::from(*v))),
            Instr::F64Const(v) => self.emit(Instruction::F64Const(Ieee64::from(*v))),
            Instr::Eqz(ValType::I32) => self.emit(Instruction::I32Eqz),
            Instr::Eqz(ValType::I64) => self.emit(Instruction::I64Eqz),
            Instr::Compare(ty, op) => self.emit(compare(*ty, *op)),
            Instr::Unary(ty, op) => self.emit(unary(*ty, *op)),
            Instr::Binary(ty, op) => self.emit(binary(*ty, *op)),
            Instr::Convert(op) => self.emit(convert(*op)),
            Instr::Eqz(ty) => ice!("eqz on {}", ty),
        }
    }
}

fn load(kind: LoadKind, arg: wasm_encoder::MemArg) -> Instruction<'static> {
    match kind {
        LoadKind::I32 => Instruction::I32Load(arg),
        LoadKind::I64 => Instruction::I64Load(arg),
        LoadKind::F32 => Instruction::F32Load(arg),
        LoadKind::F64 => Instruction::F64Load(arg),
        LoadKind::I32S8 => Instruction::I32Load8S(arg),
        LoadKind::I32U8 => Instruction::I32Load8U(arg),
        LoadKind::I32S16 => Instruction::I32Load16S(arg),
        LoadKind::I32U16 => Instruction::I32Load16U(arg),
        LoadKind::I64S8 => Instruction::I64Load8S(arg),
        LoadKind::I64U8 => Instruction::I64Load8U(arg),
        LoadKind::I64S16 => Instruction::I64Load16S(arg),
        LoadKind::I64U16 => Instruction::I64Load16U(arg),
        LoadKind::I64S32 => Instruction::I64Load32S(arg),
        LoadKind::I64U32 => Instruction::I64Load32U(arg),
    }
}

fn store(kind: StoreKind, arg: wasm_encoder::MemArg) -> Instruction<'static> {
    match kind {
        StoreKind::I32 => Instruction::I32Store(arg),
        StoreKind::I64 => Instruction::I64Store(arg),
        StoreKind::F32 => Instruction::F32Store(arg),
        StoreKind::F64 => Instruction::F64Store(arg),
        StoreKind::I32T8 => Instruction::I32Store8(arg),
        StoreKind::I32T16 => Instruction::I32Store16(arg),
        StoreKind::I64T8 => Instruction::I64Store8(arg),
        StoreKind::I64T16 => Instruction::I64Store16(arg),
        StoreKind::I64T32 => Instruction::I64Store32(arg),
    }
}

fn compare(ty: ValType, op: CompareOp) -> Instruction<'static> {
    use CompareOp::*;
    match (ty, op) {
        (ValType::I32, Eq) => Instruction::I32Eq,
        (ValType::I32, Ne) => Instruction::I32Ne,
        (ValType::I32, LtS) => Instruction::I32LtS,
        (ValType::I32, LtU) => Instruction::I32LtU,
        (ValType::I32, GtS) => Instruction::I32GtS,
        (ValType::I32, GtU) => Instruction::I32GtU,
        (ValType::I32, LeS) => Instruction::I32LeS,
        (ValType::I32, LeU) => Instruction::I32LeU,
        (ValType::I32, GeS) => Instruction::I32GeS,
        (ValType::I32, GeU) => Instruction::I32GeU,
        (ValType::I64, Eq) => Instruction::I64Eq,
        (ValType::I64, Ne) => Instruction::I64Ne,
        (ValType::I64, LtS) => Instruction::I64LtS,
        (ValType::I64, LtU) => Instruction::I64LtU,
        (ValType::I64, GtS) => Instruction::I64GtS,
        (ValType::I64, GtU) => Instruction::I64GtU,
        (ValType::I64, LeS) => Instruction::I64LeS,
        (ValType::I64, LeU) => Instruction::I64LeU,
        (ValType::I64, GeS) => Instruction::I64GeS,
        (ValType::I64, GeU) => Instruction::I64GeU,
        (ValType::F32, Eq) => Instruction::F32Eq,
        (ValType::F32, Ne) => Instruction::F32Ne,
        (ValType::F32, Lt) => Instruction::F32Lt,
        (ValType::F32, Gt) => Instruction::F32Gt,
        (ValType::F32, Le) => Instruction::F32Le,
        (ValType::F32, Ge) => Instruction::F32Ge,
        (ValType::F64, Eq) => Instruction::F64Eq,
        (ValType::F64, Ne) => Instruction::F64Ne,
        (ValType::F64, Lt) => Instruction::F64Lt,
        (ValType::F64, Gt) => Instruction::F64Gt,
        (ValType::F64, Le) => Instruction::F64Le,
        (ValType::F64, Ge) => Instruction::F64Ge,
        (ty, op) => ice!("{}.{} is not an instruction", ty, op.name()),
    }
}

fn unary(ty: ValType, op: UnaryOp) -> Instruction<'static> {
    use UnaryOp::*;
    match (ty, op) {
        (ValType::I32, Clz) => Instruction::I32Clz,
        (ValType::I32, Ctz) => Instruction::I32Ctz,
        (ValType::I32, Popcnt) => Instruction::I32Popcnt,
        (ValType::I32, Extend8S) => Instruction::I32Extend8S,
        (ValType::I32, Extend16S) => Instruction::I32Extend16S,
        (ValType::I64, Clz) => Instruction::I64Clz,
        (ValType::I64, Ctz) => Instruction::I64Ctz,
        (ValType::I64, Popcnt) => Instruction::I64Popcnt,
        (ValType::I64, Extend8S) => Instruction::I64Extend8S,
        (ValType::I64, Extend16S) => Instruction::I64Extend16S,
        (ValType::I64, Extend32S) => Instruction::I64Extend32S,
        (ValType::F32, Abs) => Instruction::F32Abs,
        (ValType::F32, Neg) => Instruction::F32Neg,
        (ValType::F32, Sqrt) => Instruction::F32Sqrt,
        (ValType::F32, Ceil) => Instruction::F32Ceil,
        (ValType::F32, Floor) => Instruction::F32Floor,
        (ValType::F32, Trunc) => Instruction::F32Trunc,
        (ValType::F32, Nearest) => Instruction::F32Nearest,
        (ValType::F64, Abs) => Instruction::F64Abs,
        (ValType::F64, Neg) => Instruction::F64Neg,
        (ValType::F64, Sqrt) => Instruction::F64Sqrt,
        (ValType::F64, Ceil) => Instruction::F64Ceil,
        (ValType::F64, Floor) => Instruction::F64Floor,
        (ValType::F64, Trunc) => Instruction::F64Trunc,
        (ValType::F64, Nearest) => Instruction::F64Nearest,
        (ty, op) => ice!("{}.{} is not an instruction", ty, op.name()),
    }
}

fn binary(ty: ValType, op: BinaryOp) -> Instruction<'static> {
    use BinaryOp::*;
    match (ty, op) {
        (ValType::I32, Add) => Instruction::I32Add,
        (ValType::I32, Sub) => Instruction::I32Sub,
        (ValType::I32, Mul) => Instruction::I32Mul,
        (ValType::I32, DivS) => Instruction::I32DivS,
        (ValType::I32, DivU) => Instruction::I32DivU,
        (ValType::I32, RemS) => Instruction::I32RemS,
        (ValType::I32, RemU) => Instruction::I32RemU,
        (ValType::I32, And) => Instruction::I32And,
        (ValType::I32, Or) => Instruction::I32Or,
        (ValType::I32, Xor) => Instruction::I32Xor,
        (ValType::I32, Shl) => Instruction::I32Shl,
        (ValType::I32, ShrS) => Instruction::I32ShrS,
        (ValType::I32, ShrU) => Instruction::I32ShrU,
        (ValType::I32, Rotl) => Instruction::I32Rotl,
        (ValType::I32, Rotr) => Instruction::I32Rotr,
        (ValType::I64, Add) => Instruction::I64Add,
        (ValType::I64, Sub) => Instruction::I64Sub,
        (ValType::I64, Mul) => Instruction::I64Mul,
        (ValType::I64, DivS) => Instruction::I64DivS,
        (ValType::I64, DivU) => Instruction::I64DivU,
        (ValType::I64, RemS) => Instruction::I64RemS,
        (ValType::I64, RemU) => Instruction::I64RemU,
        (ValType::I64, And) => Instruction::I64And,
        (ValType::I64, Or) => Instruction::I64Or,
        (ValType::I64, Xor) => Instruction::I64Xor,
        (ValType::I64, Shl) => Instruction::I64Shl,
        (ValType::I64, ShrS) => Instruction::I64ShrS,
        (ValType::I64, ShrU) => Instruction::I64ShrU,
        (ValType::I64, Rotl) => Instruction::I64Rotl,
        (ValType::I64, Rotr) => Instruction::I64Rotr,
        (ValType::F32, Add) => Instruction::F32Add,
        (ValType::F32, Sub) => Instruction::F32Sub,
        (ValType::F32, Mul) => Instruction::F32Mul,
        (ValType::F32, Div) => Instruction::F32Div,
        (ValType::F32, Min) => Instruction::F32Min,
        (ValType::F32, Max) => Instruction::F32Max,
        (ValType::F32, Copysign) => Instruction::F32Copysign,
        (ValType::F64, Add) => Instruction::F64Add,
        (ValType::F64, Sub) => Instruction::F64Sub,
        (ValType::F64, Mul) => Instruction::F64Mul,
        (ValType::F64, Div) => Instruction::F64Div,
        (ValType::F64, Min) => Instruction::F64Min,
        (ValType::F64, Max) => Instruction::F64Max,
        (ValType::F64, Copysign) => Instruction::F64Copysign,
        (ty, op) => ice!("{}.{} is not an instruction", ty, op.name()),
    }
}

fn convert(op: ConvertOp) -> Instruction<'static> {
    use ConvertOp::*;
    match op {
        I32WrapI64 => Instruction::I32WrapI64,
        I64ExtendI32S => Instruction::I64ExtendI32S,
        I64ExtendI32U => Instruction::I64ExtendI32U,
        I32TruncSatF32S => Instruction::I32TruncSatF32S,
        I32TruncSatF32U => Instruction::I32TruncSatF32U,
        I32TruncSatF64S => Instruction::I32TruncSatF64S,
        I32TruncSatF64U => Instruction::I32TruncSatF64U,
        I64TruncSatF32S => Instruction::I64TruncSatF32S,
        I64TruncSatF32U => Instruction::I64TruncSatF32U,
        I64TruncSatF64S => Instruction::I64TruncSatF64S,
        I64TruncSatF64U => Instruction::I64TruncSatF64U,
        F32ConvertI32S => Instruction::F32ConvertI32S,
        F32ConvertI32U => Instruction::F32ConvertI32U,
        F32ConvertI64S => Instruction::F32ConvertI64S,
        F32ConvertI64U => Instruction::F32ConvertI64U,
        F64ConvertI32S => Instruction::F64ConvertI32S,
        F64ConvertI32U => Instruction::F64ConvertI32U,
        F64ConvertI64S => Instruction::F64ConvertI64S,
        F64ConvertI64U => Instruction::F64ConvertI64U,
        F32DemoteF64 => Instruction::F32DemoteF64,
        F64PromoteF32 => Instruction::F64PromoteF32,
    }
}
