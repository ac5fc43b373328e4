//! Conversions between scalar representations.
//!
//! Integers narrower than 32 bits are always kept normalized in their `i32`: sign-extended for
//! signed types and zero-extended for unsigned ones. Conversions re-establish that form only when
//! the source range does not already fit the target.

use crate::abi::{integer_kind, val_type};
use crate::function::FunctionGenerator;
use cwasm_ir::ty::{IrFloatKind, IrIntegerKind, IrTy};
use cwasm_wasm::instr::{BinaryOp, CompareOp, ConvertOp, Instr, UnaryOp};
use cwasm_wasm::ValType;

#[derive(Debug, Clone, Copy)]
enum Scalar {
    Int(IrIntegerKind),
    Float(IrFloatKind),
}

fn scalar(ty: &IrTy) -> Option<Scalar> {
    match ty {
        IrTy::Float(kind) => Some(Scalar::Float(*kind)),
        _ => integer_kind(ty).map(Scalar::Int),
    }
}

/// Whether every value of `from` is also a value of `to`.
fn fits(from: IrIntegerKind, to: IrIntegerKind) -> bool {
    from == IrIntegerKind::Bool
        || (from.size() < to.size() && (!from.is_signed() || to.is_signed()))
}

fn float_type(kind: IrFloatKind) -> ValType {
    match kind {
        IrFloatKind::F32 => ValType::F32,
        IrFloatKind::F64 => ValType::F64,
    }
}

impl FunctionGenerator<'_> {
    /// Convert the value on top of the stack from `from` to `to`.
    pub(super) fn convert(&mut self, from: &IrTy, to: &IrTy, out: &mut Vec<Instr>) {
        if to.is_void() {
            if val_type(from).is_some() {
                out.push(Instr::Drop);
            }
            return;
        }
        match (scalar(from), scalar(to)) {
            (Some(Scalar::Int(from)), Some(Scalar::Int(to))) => self.int_to_int(from, to, out),
            (Some(Scalar::Int(from)), Some(Scalar::Float(to))) => {
                let op = match (to, from.size() == 8, from.is_signed()) {
                    (IrFloatKind::F32, false, true) => ConvertOp::F32ConvertI32S,
                    (IrFloatKind::F32, false, false) => ConvertOp::F32ConvertI32U,
                    (IrFloatKind::F32, true, true) => ConvertOp::F32ConvertI64S,
                    (IrFloatKind::F32, true, false) => ConvertOp::F32ConvertI64U,
                    (IrFloatKind::F64, false, true) => ConvertOp::F64ConvertI32S,
                    (IrFloatKind::F64, false, false) => ConvertOp::F64ConvertI32U,
                    (IrFloatKind::F64, true, true) => ConvertOp::F64ConvertI64S,
                    (IrFloatKind::F64, true, false) => ConvertOp::F64ConvertI64U,
                };
                out.push(Instr::Convert(op));
            }
            (Some(Scalar::Float(from)), Some(Scalar::Int(to))) => self.float_to_int(from, to, out),
            (Some(Scalar::Float(from)), Some(Scalar::Float(to))) => match (from, to) {
                (IrFloatKind::F32, IrFloatKind::F64) => {
                    out.push(Instr::Convert(ConvertOp::F64PromoteF32))
                }
                (IrFloatKind::F64, IrFloatKind::F32) => {
                    out.push(Instr::Convert(ConvertOp::F32DemoteF64))
                }
                _ => {}
            },
            // Aggregates are addresses on both sides.
            _ => {}
        }
    }

    fn int_to_int(&mut self, from: IrIntegerKind, to: IrIntegerKind, out: &mut Vec<Instr>) {
        if from == to {
            return;
        }
        let wide_source = from.size() == 8;
        if to == IrIntegerKind::Bool {
            let ty = match wide_source {
                true => ValType::I64,
                false => ValType::I32,
            };
            out.push(Instr::constant(ty.zero()));
            out.push(Instr::Compare(ty, CompareOp::Ne));
            return;
        }
        match (wide_source, to.size() == 8) {
            (true, true) | (false, false) => {}
            (true, false) => out.push(Instr::Convert(ConvertOp::I32WrapI64)),
            (false, true) => {
                out.push(Instr::Convert(match from.is_signed() {
                    true => ConvertOp::I64ExtendI32S,
                    false => ConvertOp::I64ExtendI32U,
                }));
                return;
            }
        }
        if to.size() < 4 && (wide_source || !fits(from, to)) {
            narrow(to, out);
        }
    }

    /// Truncate toward zero, saturating at the bounds of the target type. NaN becomes zero.
    fn float_to_int(&mut self, from: IrFloatKind, to: IrIntegerKind, out: &mut Vec<Instr>) {
        let source = float_type(from);
        if to == IrIntegerKind::Bool {
            out.push(Instr::constant(source.zero()));
            out.push(Instr::Compare(source, CompareOp::Ne));
            return;
        }
        let op = match (from, to.size() == 8, to.is_signed()) {
            (IrFloatKind::F32, false, true) => ConvertOp::I32TruncSatF32S,
            (IrFloatKind::F32, false, false) => ConvertOp::I32TruncSatF32U,
            (IrFloatKind::F64, false, true) => ConvertOp::I32TruncSatF64S,
            (IrFloatKind::F64, false, false) => ConvertOp::I32TruncSatF64U,
            (IrFloatKind::F32, true, true) => ConvertOp::I64TruncSatF32S,
            (IrFloatKind::F32, true, false) => ConvertOp::I64TruncSatF32U,
            (IrFloatKind::F64, true, true) => ConvertOp::I64TruncSatF64S,
            (IrFloatKind::F64, true, false) => ConvertOp::I64TruncSatF64U,
        };
        out.push(Instr::Convert(op));
        if to.size() < 4 {
            self.clamp(to, out);
        }
    }

    /// Saturate the `i32` on top of the stack to the range of a narrow integer type.
    fn clamp(&mut self, to: IrIntegerKind, out: &mut Vec<Instr>) {
        let (min, max) = match to {
            IrIntegerKind::I8 => (i32::from(i8::MIN), i32::from(i8::MAX)),
            IrIntegerKind::U8 => (0, i32::from(u8::MAX)),
            IrIntegerKind::I16 => (i32::from(i16::MIN), i32::from(i16::MAX)),
            _ => (0, i32::from(u16::MAX)),
        };
        let temp = self.temp(ValType::I32);
        let signed = to.is_signed();
        // select keeps the first operand when the condition holds.
        out.extend([
            Instr::LocalSet(temp),
            Instr::LocalGet(temp),
            Instr::I32Const(max),
            Instr::LocalGet(temp),
            Instr::I32Const(max),
            Instr::Compare(
                ValType::I32,
                match signed {
                    true => CompareOp::LtS,
                    false => CompareOp::LtU,
                },
            ),
            Instr::Select,
        ]);
        if signed {
            out.extend([
                Instr::LocalSet(temp),
                Instr::LocalGet(temp),
                Instr::I32Const(min),
                Instr::LocalGet(temp),
                Instr::I32Const(min),
                Instr::Compare(ValType::I32, CompareOp::GtS),
                Instr::Select,
            ]);
        }
    }
}

/// Reduce the `i32` on top of the stack to a narrow type, wrapping modulo its width.
fn narrow(to: IrIntegerKind, out: &mut Vec<Instr>) {
    match to {
        IrIntegerKind::I8 => out.push(Instr::Unary(ValType::I32, UnaryOp::Extend8S)),
        IrIntegerKind::I16 => out.push(Instr::Unary(ValType::I32, UnaryOp::Extend16S)),
        IrIntegerKind::U8 => {
            out.push(Instr::I32Const(0xff));
            out.push(Instr::Binary(ValType::I32, BinaryOp::And));
        }
        IrIntegerKind::U16 => {
            out.push(Instr::I32Const(0xffff));
            out.push(Instr::Binary(ValType::I32, BinaryOp::And));
        }
        _ => {}
    }
}
