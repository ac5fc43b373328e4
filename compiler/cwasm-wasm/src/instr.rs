//! The instruction tree.
//!
//! Structured instructions own their nested sequences, so branch depths are always relative to
//! the tree position of the branch. Numeric instructions are grouped by shape and carry their
//! operand type, which lets rewrites match whole families at once.

use crate::ty::{BlockType, FuncType, ValType, Value};

/// Memory immediate. `align` is the base-2 logarithm of the alignment hint.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemArg {
    pub offset: u32,
    pub align: u32,
}

impl MemArg {
    pub fn new(offset: u32, align: u32) -> Self {
        Self { offset, align }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    I32,
    I64,
    F32,
    F64,
    I32S8,
    I32U8,
    I32S16,
    I32U16,
    I64S8,
    I64U8,
    I64S16,
    I64U16,
    I64S32,
    I64U32,
}

impl LoadKind {
    pub fn result(&self) -> ValType {
        use LoadKind::*;
        match self {
            I32 | I32S8 | I32U8 | I32S16 | I32U16 => ValType::I32,
            I64 | I64S8 | I64U8 | I64S16 | I64U16 | I64S32 | I64U32 => ValType::I64,
            F32 => ValType::F32,
            F64 => ValType::F64,
        }
    }

    /// Bytes read from memory.
    pub fn width(&self) -> u32 {
        use LoadKind::*;
        match self {
            I32S8 | I32U8 | I64S8 | I64U8 => 1,
            I32S16 | I32U16 | I64S16 | I64U16 => 2,
            I32 | F32 | I64S32 | I64U32 => 4,
            I64 | F64 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        use LoadKind::*;
        matches!(self, I32S8 | I32S16 | I64S8 | I64S16 | I64S32)
    }

    pub fn mnemonic(&self) -> &'static str {
        use LoadKind::*;
        match self {
            I32 => "i32.load",
            I64 => "i64.load",
            F32 => "f32.load",
            F64 => "f64.load",
            I32S8 => "i32.load8_s",
            I32U8 => "i32.load8_u",
            I32S16 => "i32.load16_s",
            I32U16 => "i32.load16_u",
            I64S8 => "i64.load8_s",
            I64U8 => "i64.load8_u",
            I64S16 => "i64.load16_s",
            I64U16 => "i64.load16_u",
            I64S32 => "i64.load32_s",
            I64U32 => "i64.load32_u",
        }
    }
}

/// Stores. The `T` variants truncate the operand to the given bit width.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    I32,
    I64,
    F32,
    F64,
    I32T8,
    I32T16,
    I64T8,
    I64T16,
    I64T32,
}

impl StoreKind {
    pub fn operand(&self) -> ValType {
        use StoreKind::*;
        match self {
            I32 | I32T8 | I32T16 => ValType::I32,
            I64 | I64T8 | I64T16 | I64T32 => ValType::I64,
            F32 => ValType::F32,
            F64 => ValType::F64,
        }
    }

    /// Bytes written to memory.
    pub fn width(&self) -> u32 {
        use StoreKind::*;
        match self {
            I32T8 | I64T8 => 1,
            I32T16 | I64T16 => 2,
            I32 | F32 | I64T32 => 4,
            I64 | F64 => 8,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        use StoreKind::*;
        match self {
            I32 => "i32.store",
            I64 => "i64.store",
            F32 => "f32.store",
            F64 => "f64.store",
            I32T8 => "i32.store8",
            I32T16 => "i32.store16",
            I64T8 => "i64.store8",
            I64T16 => "i64.store16",
            I64T32 => "i64.store32",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Clz,
    Ctz,
    Popcnt,
    Extend8S,
    Extend16S,
    /// Only valid on i64.
    Extend32S,
    Abs,
    Neg,
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Nearest,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Clz => "clz",
            UnaryOp::Ctz => "ctz",
            UnaryOp::Popcnt => "popcnt",
            UnaryOp::Extend8S => "extend8_s",
            UnaryOp::Extend16S => "extend16_s",
            UnaryOp::Extend32S => "extend32_s",
            UnaryOp::Abs => "abs",
            UnaryOp::Neg => "neg",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Floor => "floor",
            UnaryOp::Trunc => "trunc",
            UnaryOp::Nearest => "nearest",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
    /// Float division.
    Div,
    Min,
    Max,
    Copysign,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::DivS => "div_s",
            BinaryOp::DivU => "div_u",
            BinaryOp::RemS => "rem_s",
            BinaryOp::RemU => "rem_u",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::ShrS => "shr_s",
            BinaryOp::ShrU => "shr_u",
            BinaryOp::Rotl => "rotl",
            BinaryOp::Rotr => "rotr",
            BinaryOp::Div => "div",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::Copysign => "copysign",
        }
    }

    /// Integer division and remainder trap on a zero divisor.
    pub fn may_trap(&self) -> bool {
        matches!(
            self,
            BinaryOp::DivS | BinaryOp::DivU | BinaryOp::RemS | BinaryOp::RemU
        )
    }

    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
        )
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
    /// Float comparisons.
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn name(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::LtS => "lt_s",
            CompareOp::LtU => "lt_u",
            CompareOp::GtS => "gt_s",
            CompareOp::GtU => "gt_u",
            CompareOp::LeS => "le_s",
            CompareOp::LeU => "le_u",
            CompareOp::GeS => "ge_s",
            CompareOp::GeU => "ge_u",
            CompareOp::Lt => "lt",
            CompareOp::Gt => "gt",
            CompareOp::Le => "le",
            CompareOp::Ge => "ge",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    I32WrapI64,
    I64ExtendI32S,
    I64ExtendI32U,
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F32DemoteF64,
    F64PromoteF32,
}

impl ConvertOp {
    pub fn input(&self) -> ValType {
        use ConvertOp::*;
        match self {
            I32WrapI64 | F32ConvertI64S | F32ConvertI64U | F64ConvertI64S | F64ConvertI64U => {
                ValType::I64
            }
            I64ExtendI32S | I64ExtendI32U | F32ConvertI32S | F32ConvertI32U | F64ConvertI32S
            | F64ConvertI32U => ValType::I32,
            I32TruncSatF32S | I32TruncSatF32U | I64TruncSatF32S | I64TruncSatF32U
            | F64PromoteF32 => ValType::F32,
            I32TruncSatF64S | I32TruncSatF64U | I64TruncSatF64S | I64TruncSatF64U
            | F32DemoteF64 => ValType::F64,
        }
    }

    pub fn output(&self) -> ValType {
        use ConvertOp::*;
        match self {
            I32WrapI64 | I32TruncSatF32S | I32TruncSatF32U | I32TruncSatF64S
            | I32TruncSatF64U => ValType::I32,
            I64ExtendI32S | I64ExtendI32U | I64TruncSatF32S | I64TruncSatF32U
            | I64TruncSatF64S | I64TruncSatF64U => ValType::I64,
            F32ConvertI32S | F32ConvertI32U | F32ConvertI64S | F32ConvertI64U | F32DemoteF64 => {
                ValType::F32
            }
            F64ConvertI32S | F64ConvertI32U | F64ConvertI64S | F64ConvertI64U | F64PromoteF32 => {
                ValType::F64
            }
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        use ConvertOp::*;
        match self {
            I32WrapI64 => "i32.wrap_i64",
            I64ExtendI32S => "i64.extend_i32_s",
            I64ExtendI32U => "i64.extend_i32_u",
            I32TruncSatF32S => "i32.trunc_sat_f32_s",
            I32TruncSatF32U => "i32.trunc_sat_f32_u",
            I32TruncSatF64S => "i32.trunc_sat_f64_s",
            I32TruncSatF64U => "i32.trunc_sat_f64_u",
            I64TruncSatF32S => "i64.trunc_sat_f32_s",
            I64TruncSatF32U => "i64.trunc_sat_f32_u",
            I64TruncSatF64S => "i64.trunc_sat_f64_s",
            I64TruncSatF64U => "i64.trunc_sat_f64_u",
            F32ConvertI32S => "f32.convert_i32_s",
            F32ConvertI32U => "f32.convert_i32_u",
            F32ConvertI64S => "f32.convert_i64_s",
            F32ConvertI64U => "f32.convert_i64_u",
            F64ConvertI32S => "f64.convert_i32_s",
            F64ConvertI32U => "f64.convert_i32_u",
            F64ConvertI64S => "f64.convert_i64_s",
            F64ConvertI64U => "f64.convert_i64_u",
            F32DemoteF64 => "f32.demote_f64",
            F64PromoteF32 => "f64.promote_f32",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Unreachable,
    Nop,
    Block {
        ty: BlockType,
        body: Vec<Instr>,
    },
    Loop {
        ty: BlockType,
        body: Vec<Instr>,
    },
    If {
        ty: BlockType,
        then: Vec<Instr>,
        otherwise: Vec<Instr>,
    },
    Br(u32),
    BrIf(u32),
    BrTable {
        targets: Vec<u32>,
        default: u32,
    },
    Return,
    /// Call by index in the function index space: imports first, then defined functions.
    Call(u32),
    /// Call through the function table with the given signature.
    CallIndirect(FuncType),
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load(LoadKind, MemArg),
    Store(StoreKind, MemArg),
    MemorySize,
    MemoryGrow,
    MemoryCopy,
    MemoryFill,
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    Eqz(ValType),
    Compare(ValType, CompareOp),
    Unary(ValType, UnaryOp),
    Binary(ValType, BinaryOp),
    Convert(ConvertOp),
}

impl Instr {
    pub fn constant(value: Value) -> Instr {
        match value {
            Value::I32(v) => Instr::I32Const(v),
            Value::I64(v) => Instr::I64Const(v),
            Value::F32(v) => Instr::F32Const(v),
            Value::F64(v) => Instr::F64Const(v),
        }
    }

    pub fn as_constant(&self) -> Option<Value> {
        match self {
            Instr::I32Const(v) => Some(Value::I32(*v)),
            Instr::I64Const(v) => Some(Value::I64(*v)),
            Instr::F32Const(v) => Some(Value::F32(*v)),
            Instr::F64Const(v) => Some(Value::F64(*v)),
            _ => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Instr::Block { .. } | Instr::Loop { .. } | Instr::If { .. })
    }

    /// Instructions after which the rest of a sequence is unreachable.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Br(_) | Instr::BrTable { .. } | Instr::Return | Instr::Unreachable
        )
    }

    /// The nested sequences of a structured instruction.
    pub fn bodies(&self) -> Vec<&Vec<Instr>> {
        match self {
            Instr::Block { body, .. } | Instr::Loop { body, .. } => vec![body],
            Instr::If {
                then, otherwise, ..
            } => vec![then, otherwise],
            _ => vec![],
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Instr>> {
        match self {
            Instr::Block { body, .. } | Instr::Loop { body, .. } => vec![body],
            Instr::If {
                then, otherwise, ..
            } => vec![then, otherwise],
            _ => vec![],
        }
    }

    /// Whether evaluating the instruction can have any effect besides pushing its result: a
    /// write, a call, a possible trap or a transfer of control.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Instr::Nop
            | Instr::Drop
            | Instr::Select
            | Instr::LocalGet(_)
            | Instr::GlobalGet(_)
            | Instr::MemorySize
            | Instr::I32Const(_)
            | Instr::I64Const(_)
            | Instr::F32Const(_)
            | Instr::F64Const(_)
            | Instr::Eqz(_)
            | Instr::Compare(..)
            | Instr::Unary(..)
            | Instr::Convert(_) => false,
            Instr::Binary(ty, op) => ty.is_integer() && op.may_trap(),
            _ => true,
        }
    }

    /// Whether the instruction only computes a value from its operands, without reading memory.
    /// Pure instructions can be removed or reordered freely.
    pub fn is_pure(&self) -> bool {
        match self {
            Instr::LocalGet(_) | Instr::GlobalGet(_) => true,
            Instr::Load(..) | Instr::MemorySize => false,
            other => !other.has_side_effects() && !matches!(other, Instr::Nop | Instr::Drop),
        }
    }

    /// Operand and result counts for instructions whose stack effect does not depend on the
    /// enclosing module. Returns `None` for calls and control instructions.
    pub fn stack_effect(&self) -> Option<(usize, usize)> {
        let effect = match self {
            Instr::Nop => (0, 0),
            Instr::Drop => (1, 0),
            Instr::Select => (3, 1),
            Instr::LocalGet(_) | Instr::GlobalGet(_) => (0, 1),
            Instr::LocalSet(_) | Instr::GlobalSet(_) => (1, 0),
            Instr::LocalTee(_) => (1, 1),
            Instr::Load(..) => (1, 1),
            Instr::Store(..) => (2, 0),
            Instr::MemorySize => (0, 1),
            Instr::MemoryGrow => (1, 1),
            Instr::MemoryCopy | Instr::MemoryFill => (3, 0),
            Instr::I32Const(_) | Instr::I64Const(_) | Instr::F32Const(_) | Instr::F64Const(_) => {
                (0, 1)
            }
            Instr::Eqz(_) | Instr::Unary(..) | Instr::Convert(_) => (1, 1),
            Instr::Compare(..) | Instr::Binary(..) => (2, 1),
            _ => return None,
        };
        Some(effect)
    }
}

/// Visit every instruction of `body` in order, including nested ones, parents first.
pub fn walk<'a>(body: &'a [Instr], f: &mut impl FnMut(&'a Instr)) {
    for instr in body {
        f(instr);
        for nested in instr.bodies() {
            walk(nested, f);
        }
    }
}

/// Apply `f` to every sequence in the tree, innermost sequences first.
pub fn walk_sequences_mut(body: &mut Vec<Instr>, f: &mut impl FnMut(&mut Vec<Instr>)) {
    for instr in body.iter_mut() {
        for nested in instr.bodies_mut() {
            walk_sequences_mut(nested, f);
        }
    }
    f(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_is_not_pure() {
        assert!(!Instr::Binary(ValType::I32, BinaryOp::DivS).is_pure());
        assert!(Instr::Binary(ValType::F64, BinaryOp::Div).is_pure());
        assert!(Instr::Binary(ValType::I32, BinaryOp::Add).is_pure());
        assert!(!Instr::Load(LoadKind::I32, MemArg::new(0, 2)).is_pure());
        assert!(!Instr::LocalSet(0).is_pure());
    }

    #[test]
    fn test_walk_visits_nested_sequences() {
        let body = vec![
            Instr::Block {
                ty: BlockType::Empty,
                body: vec![Instr::If {
                    ty: BlockType::Empty,
                    then: vec![Instr::Br(1)],
                    otherwise: vec![Instr::Nop],
                }],
            },
            Instr::Return,
        ];
        let mut count = 0;
        walk(&body, &mut |_| count += 1);
        assert_eq!(count, 5);
    }
}
