pub mod copy_propagation;
pub mod dead_code;
pub mod inlining;
pub mod locals;
pub mod peephole;
pub mod redundancy;
pub mod switch;

use cwasm_wasm::instr::ConvertOp;
use cwasm_wasm::{Instr, ValType};

/// The local declarations of a function whose body is borrowed separately.
pub struct Locals<'f> {
    params: &'f [ValType],
    locals: &'f mut Vec<ValType>,
}

impl<'f> Locals<'f> {
    pub fn new(params: &'f [ValType], locals: &'f mut Vec<ValType>) -> Self {
        Self { params, locals }
    }

    pub fn ty(&self, index: u32) -> Option<ValType> {
        let index = index as usize;
        match index < self.params.len() {
            true => self.params.get(index).copied(),
            false => self.locals.get(index - self.params.len()).copied(),
        }
    }

    pub fn add(&mut self, ty: ValType) -> u32 {
        self.locals.push(ty);
        (self.params.len() + self.locals.len() - 1) as u32
    }
}

/// The type an instruction pushes, for instructions that push exactly one value.
pub fn result_type(instr: &Instr, locals: &Locals<'_>) -> Option<ValType> {
    match instr {
        Instr::LocalGet(index) | Instr::LocalTee(index) => locals.ty(*index),
        Instr::I32Const(_) | Instr::Eqz(_) | Instr::Compare(..) => Some(ValType::I32),
        Instr::I64Const(_) => Some(ValType::I64),
        Instr::F32Const(_) => Some(ValType::F32),
        Instr::F64Const(_) => Some(ValType::F64),
        Instr::Unary(ty, _) | Instr::Binary(ty, _) => Some(*ty),
        Instr::Convert(op) => Some(ConvertOp::output(op)),
        Instr::Load(kind, _) => Some(kind.result()),
        _ => None,
    }
}
