use std::fmt::{Display, Formatter};

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub fn is_integer(&self) -> bool {
        matches!(self, ValType::I32 | ValType::I64)
    }

    /// The all-zero value of this type, which is also the initial value of every local.
    pub fn zero(&self) -> Value {
        match self {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0.0),
            ValType::F64 => Value::F64(0.0),
        }
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

/// A function signature. Every function returns at most one value.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, result: Option<ValType>) -> Self {
        Self { params, result }
    }
}

impl Display for FuncType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for param in &self.params {
            write!(f, "(param {param}) ")?;
        }
        match self.result {
            Some(result) => write!(f, "(result {result})"),
            None => write!(f, "(result)"),
        }
    }
}

/// The result type of a structured instruction. Blocks never take parameters.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Empty,
    Result(ValType),
}

impl BlockType {
    pub fn result(&self) -> Option<ValType> {
        match self {
            BlockType::Empty => None,
            BlockType::Result(ty) => Some(*ty),
        }
    }
}

/// A runtime value.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    /// Bitwise equality, under which NaN equals itself and positive zero differs from negative
    /// zero.
    pub fn bit_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32.const {v}"),
            Value::I64(v) => write!(f, "i64.const {v}"),
            Value::F32(v) => write!(f, "f32.const {v:?}"),
            Value::F64(v) => write!(f, "f64.const {v:?}"),
        }
    }
}
