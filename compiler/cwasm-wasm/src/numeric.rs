//! Numeric instruction semantics, as needed to fold operations on constants.
//!
//! Operations that would trap at run time report the trap instead of a value, so callers leave
//! them in place.

use crate::instr::{BinaryOp, CompareOp, ConvertOp, UnaryOp};
use crate::runtime::Trap;
use crate::ty::Value;
use cwasm_diagnostics::ice;

pub fn eqz(value: Value) -> bool {
    match value {
        Value::I32(v) => v == 0,
        Value::I64(v) => v == 0,
        other => ice!("eqz on {}", other.ty()),
    }
}

pub fn compare(op: CompareOp, lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => {
            int_compare(op, a as i64, b as i64, a as u32 as u64, b as u32 as u64)
        }
        (Value::I64(a), Value::I64(b)) => int_compare(op, a, b, a as u64, b as u64),
        (Value::F32(a), Value::F32(b)) => float_compare(op, a as f64, b as f64),
        (Value::F64(a), Value::F64(b)) => float_compare(op, a, b),
        (a, b) => ice!("{}.{} on {}", a.ty(), op.name(), b.ty()),
    }
}

fn int_compare(op: CompareOp, a: i64, b: i64, ua: u64, ub: u64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::LtS => a < b,
        CompareOp::LtU => ua < ub,
        CompareOp::GtS => a > b,
        CompareOp::GtU => ua > ub,
        CompareOp::LeS => a <= b,
        CompareOp::LeU => ua <= ub,
        CompareOp::GeS => a >= b,
        CompareOp::GeU => ua >= ub,
        other => ice!("float comparison {} on integers", other.name()),
    }
}

fn float_compare(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Gt => a > b,
        CompareOp::Le => a <= b,
        CompareOp::Ge => a >= b,
        other => ice!("integer comparison {} on floats", other.name()),
    }
}

pub fn unary(op: UnaryOp, value: Value) -> Value {
    use UnaryOp::*;
    match (value, op) {
        (Value::I32(v), Clz) => Value::I32(v.leading_zeros() as i32),
        (Value::I32(v), Ctz) => Value::I32(v.trailing_zeros() as i32),
        (Value::I32(v), Popcnt) => Value::I32(v.count_ones() as i32),
        (Value::I32(v), Extend8S) => Value::I32(v as i8 as i32),
        (Value::I32(v), Extend16S) => Value::I32(v as i16 as i32),
        (Value::I64(v), Clz) => Value::I64(v.leading_zeros() as i64),
        (Value::I64(v), Ctz) => Value::I64(v.trailing_zeros() as i64),
        (Value::I64(v), Popcnt) => Value::I64(v.count_ones() as i64),
        (Value::I64(v), Extend8S) => Value::I64(v as i8 as i64),
        (Value::I64(v), Extend16S) => Value::I64(v as i16 as i64),
        (Value::I64(v), Extend32S) => Value::I64(v as i32 as i64),
        (Value::F32(v), op) => Value::F32(float_unary(op, v as f64) as f32),
        (Value::F64(v), op) => Value::F64(float_unary(op, v)),
        (value, op) => ice!("{}.{} is not an instruction", value.ty(), op.name()),
    }
}

/// Every float unary operation is exact in f64 for f32 inputs, so both widths share this.
fn float_unary(op: UnaryOp, v: f64) -> f64 {
    match op {
        UnaryOp::Abs => v.abs(),
        UnaryOp::Neg => -v,
        UnaryOp::Sqrt => v.sqrt(),
        UnaryOp::Ceil => v.ceil(),
        UnaryOp::Floor => v.floor(),
        UnaryOp::Trunc => v.trunc(),
        UnaryOp::Nearest => v.round_ties_even(),
        other => ice!("integer operation {} on a float", other.name()),
    }
}

pub fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Trap> {
    let value = match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => Value::I32(i32_binary(op, a, b)?),
        (Value::I64(a), Value::I64(b)) => Value::I64(i64_binary(op, a, b)?),
        (Value::F32(a), Value::F32(b)) => Value::F32(f32_binary(op, a, b)),
        (Value::F64(a), Value::F64(b)) => Value::F64(f64_binary(op, a, b)),
        (a, b) => ice!("{}.{} with a {} operand", a.ty(), op.name(), b.ty()),
    };
    Ok(value)
}

fn i32_binary(op: BinaryOp, a: i32, b: i32) -> Result<i32, Trap> {
    use BinaryOp::*;
    let value = match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        DivS => match (a, b) {
            (_, 0) => return Err(Trap::IntegerDivideByZero),
            (i32::MIN, -1) => return Err(Trap::IntegerOverflow),
            _ => a / b,
        },
        DivU => match b {
            0 => return Err(Trap::IntegerDivideByZero),
            _ => ((a as u32) / (b as u32)) as i32,
        },
        RemS => match b {
            0 => return Err(Trap::IntegerDivideByZero),
            _ => a.wrapping_rem(b),
        },
        RemU => match b {
            0 => return Err(Trap::IntegerDivideByZero),
            _ => ((a as u32) % (b as u32)) as i32,
        },
        And => a & b,
        Or => a | b,
        Xor => a ^ b,
        Shl => a.wrapping_shl(b as u32),
        ShrS => a.wrapping_shr(b as u32),
        ShrU => (a as u32).wrapping_shr(b as u32) as i32,
        Rotl => a.rotate_left(b as u32 % 32),
        Rotr => a.rotate_right(b as u32 % 32),
        Div | Min | Max | Copysign => ice!("i32.{} is not an instruction", op.name()),
    };
    Ok(value)
}

fn i64_binary(op: BinaryOp, a: i64, b: i64) -> Result<i64, Trap> {
    use BinaryOp::*;
    let value = match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        DivS => match (a, b) {
            (_, 0) => return Err(Trap::IntegerDivideByZero),
            (i64::MIN, -1) => return Err(Trap::IntegerOverflow),
            _ => a / b,
        },
        DivU => match b {
            0 => return Err(Trap::IntegerDivideByZero),
            _ => ((a as u64) / (b as u64)) as i64,
        },
        RemS => match b {
            0 => return Err(Trap::IntegerDivideByZero),
            _ => a.wrapping_rem(b),
        },
        RemU => match b {
            0 => return Err(Trap::IntegerDivideByZero),
            _ => ((a as u64) % (b as u64)) as i64,
        },
        And => a & b,
        Or => a | b,
        Xor => a ^ b,
        Shl => a.wrapping_shl(b as u32),
        ShrS => a.wrapping_shr(b as u32),
        ShrU => (a as u64).wrapping_shr(b as u32) as i64,
        Rotl => a.rotate_left((b as u64 % 64) as u32),
        Rotr => a.rotate_right((b as u64 % 64) as u32),
        Div | Min | Max | Copysign => ice!("i64.{} is not an instruction", op.name()),
    };
    Ok(value)
}

fn f32_binary(op: BinaryOp, a: f32, b: f32) -> f32 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Min => float_min(a as f64, b as f64) as f32,
        BinaryOp::Max => float_max(a as f64, b as f64) as f32,
        BinaryOp::Copysign => a.copysign(b),
        other => ice!("f32.{} is not an instruction", other.name()),
    }
}

fn f64_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Min => float_min(a, b),
        BinaryOp::Max => float_max(a, b),
        BinaryOp::Copysign => a.copysign(b),
        other => ice!("f64.{} is not an instruction", other.name()),
    }
}

/// NaN-propagating minimum that orders negative zero below positive zero.
fn float_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == b {
        return if a.is_sign_negative() { a } else { b };
    }
    a.min(b)
}

fn float_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == b {
        return if a.is_sign_positive() { a } else { b };
    }
    a.max(b)
}

/// Conversions. Float-to-integer conversions saturate, which is exactly what `as` does.
pub fn convert(op: ConvertOp, value: Value) -> Value {
    use ConvertOp::*;
    match (op, value) {
        (I32WrapI64, Value::I64(v)) => Value::I32(v as i32),
        (I64ExtendI32S, Value::I32(v)) => Value::I64(v as i64),
        (I64ExtendI32U, Value::I32(v)) => Value::I64(v as u32 as i64),
        (I32TruncSatF32S, Value::F32(v)) => Value::I32(v as i32),
        (I32TruncSatF32U, Value::F32(v)) => Value::I32(v as u32 as i32),
        (I32TruncSatF64S, Value::F64(v)) => Value::I32(v as i32),
        (I32TruncSatF64U, Value::F64(v)) => Value::I32(v as u32 as i32),
        (I64TruncSatF32S, Value::F32(v)) => Value::I64(v as i64),
        (I64TruncSatF32U, Value::F32(v)) => Value::I64(v as u64 as i64),
        (I64TruncSatF64S, Value::F64(v)) => Value::I64(v as i64),
        (I64TruncSatF64U, Value::F64(v)) => Value::I64(v as u64 as i64),
        (F32ConvertI32S, Value::I32(v)) => Value::F32(v as f32),
        (F32ConvertI32U, Value::I32(v)) => Value::F32(v as u32 as f32),
        (F32ConvertI64S, Value::I64(v)) => Value::F32(v as f32),
        (F32ConvertI64U, Value::I64(v)) => Value::F32(v as u64 as f32),
        (F64ConvertI32S, Value::I32(v)) => Value::F64(v as f64),
        (F64ConvertI32U, Value::I32(v)) => Value::F64(v as u32 as f64),
        (F64ConvertI64S, Value::I64(v)) => Value::F64(v as f64),
        (F64ConvertI64U, Value::I64(v)) => Value::F64(v as u64 as f64),
        (F32DemoteF64, Value::F64(v)) => Value::F32(v as f32),
        (F64PromoteF32, Value::F32(v)) => Value::F64(v as f64),
        (op, value) => ice!("{} applied to {}", op.mnemonic(), value.ty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_macros::{assert_err, assert_ok};

    #[test]
    fn test_signed_division_traps() {
        let err = assert_err!(binary(BinaryOp::DivS, Value::I32(1), Value::I32(0)));
        assert_eq!(err, Trap::IntegerDivideByZero);
        let err = assert_err!(binary(BinaryOp::DivS, Value::I32(i32::MIN), Value::I32(-1)));
        assert_eq!(err, Trap::IntegerOverflow);
        let value = assert_ok!(binary(BinaryOp::RemS, Value::I32(i32::MIN), Value::I32(-1)));
        assert_eq!(value, Value::I32(0));
    }

    #[test]
    fn test_shift_counts_are_masked() {
        let value = assert_ok!(binary(BinaryOp::Shl, Value::I32(1), Value::I32(33)));
        assert_eq!(value, Value::I32(2));
        let value = assert_ok!(binary(BinaryOp::ShrU, Value::I32(-1), Value::I32(28)));
        assert_eq!(value, Value::I32(15));
    }

    #[test]
    fn test_saturating_truncation() {
        assert_eq!(convert(ConvertOp::I32TruncSatF64S, Value::F64(1e20)), Value::I32(i32::MAX));
        assert_eq!(convert(ConvertOp::I32TruncSatF64U, Value::F64(-3.5)), Value::I32(0));
        assert_eq!(convert(ConvertOp::I32TruncSatF32S, Value::F32(f32::NAN)), Value::I32(0));
    }

    #[test]
    fn test_float_min_orders_zeros() {
        let value = assert_ok!(binary(BinaryOp::Min, Value::F64(0.0), Value::F64(-0.0)));
        assert!(value.bit_eq(&Value::F64(-0.0)));
        assert!(matches!(
            assert_ok!(binary(BinaryOp::Max, Value::F32(f32::NAN), Value::F32(1.0))),
            Value::F32(v) if v.is_nan()
        ));
    }
}
