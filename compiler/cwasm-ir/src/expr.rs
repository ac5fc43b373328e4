use crate::item::LocalId;
use crate::stmt::IrLocalInit;
use crate::ty::{IrFunctionTy, IrTy};
use cwasm_span::Span;

/// A typed expression.
///
/// Object designators (locals, globals, dereferences and member accesses) are lvalues. Using an
/// lvalue where a value is needed loads it, except for aggregates, whose value is their address.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrExpr {
    pub ty: IrTy,
    pub kind: IrExprKind,
    pub span: Span,
}

impl IrExpr {
    pub fn new(ty: IrTy, kind: IrExprKind, span: Span) -> Self {
        Self { ty, kind, span }
    }

    pub fn int(ty: IrTy, value: i64, span: Span) -> Self {
        Self::new(ty, IrExprKind::IntConst(value), span)
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            IrExprKind::Local(_)
                | IrExprKind::Global(_)
                | IrExprKind::Deref(_)
                | IrExprKind::Member { .. }
                | IrExprKind::CompoundLiteral { .. }
        )
    }

    pub fn as_int_const(&self) -> Option<i64> {
        match self.kind {
            IrExprKind::IntConst(value) => Some(value),
            _ => None,
        }
    }

    /// The null pointer constant: an integer constant zero, possibly cast to a pointer type.
    pub fn is_null_pointer_constant(&self) -> bool {
        match &self.kind {
            IrExprKind::IntConst(0) => self.ty.is_integer() || self.ty.is_pointer(),
            IrExprKind::Cast(inner) => self.ty.is_pointer() && inner.is_null_pointer_constant(),
            _ => false,
        }
    }

    /// Whether evaluating the expression can have side effects.
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            IrExprKind::IntConst(_)
            | IrExprKind::FloatConst(_)
            | IrExprKind::Local(_)
            | IrExprKind::Global(_)
            | IrExprKind::FunctionRef(_)
            | IrExprKind::VaArea
            | IrExprKind::MemorySize => false,
            IrExprKind::Deref(e)
            | IrExprKind::AddressOf(e)
            | IrExprKind::Member { base: e, .. }
            | IrExprKind::Cast(e)
            | IrExprKind::Unary { operand: e, .. } => e.has_side_effects(),
            IrExprKind::Binary { lhs, rhs, .. }
            | IrExprKind::PtrDiff { lhs, rhs, .. }
            | IrExprKind::Logical { lhs, rhs, .. }
            | IrExprKind::Comma { lhs, rhs } => lhs.has_side_effects() || rhs.has_side_effects(),
            IrExprKind::PtrOffset { pointer, index, .. } => {
                pointer.has_side_effects() || index.has_side_effects()
            }
            IrExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.has_side_effects()
                    || then.has_side_effects()
                    || otherwise.has_side_effects()
            }
            _ => true,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl IrBinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            IrBinaryOp::Eq
                | IrBinaryOp::Ne
                | IrBinaryOp::Lt
                | IrBinaryOp::Gt
                | IrBinaryOp::Le
                | IrBinaryOp::Ge
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            IrBinaryOp::Add => "+",
            IrBinaryOp::Sub => "-",
            IrBinaryOp::Mul => "*",
            IrBinaryOp::Div => "/",
            IrBinaryOp::Rem => "%",
            IrBinaryOp::Shl => "<<",
            IrBinaryOp::Shr => ">>",
            IrBinaryOp::BitAnd => "&",
            IrBinaryOp::BitOr => "|",
            IrBinaryOp::BitXor => "^",
            IrBinaryOp::Eq => "==",
            IrBinaryOp::Ne => "!=",
            IrBinaryOp::Lt => "<",
            IrBinaryOp::Gt => ">",
            IrBinaryOp::Le => "<=",
            IrBinaryOp::Ge => ">=",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrUnaryOp {
    Neg,
    BitNot,
    /// Logical negation, producing an `int` 0 or 1.
    Not,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum IrCallee {
    /// A call to a function by its link name.
    Direct(String),
    /// A call through a function pointer value.
    Indirect(Box<IrExpr>),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum IrExprKind {
    /// Integer constant, already wrapped to the expression type.
    IntConst(i64),
    FloatConst(f64),
    Local(LocalId),
    /// A static-duration object by link name.
    Global(String),
    /// A function designator by link name.
    FunctionRef(String),
    /// The object a pointer points to.
    Deref(Box<IrExpr>),
    /// A member of a struct or union object at a byte offset.
    Member { base: Box<IrExpr>, offset: u32 },
    /// Address of an lvalue or function designator. Also expresses array and function decay.
    AddressOf(Box<IrExpr>),
    /// Store into an lvalue. The value has the target's type; the result is the stored value.
    Assign {
        target: Box<IrExpr>,
        value: Box<IrExpr>,
    },
    /// `target op= value`, evaluating the target's address once.
    ///
    /// The target is converted to `operation_ty`, combined with `value` (already of that type,
    /// or pre-scaled by the element size for pointer targets) and converted back.
    CompoundAssign {
        target: Box<IrExpr>,
        op: IrBinaryOp,
        value: Box<IrExpr>,
        operation_ty: IrTy,
    },
    /// `++`/`--` in prefix or postfix position. `step` is the element size for pointers.
    IncDec {
        target: Box<IrExpr>,
        increment: bool,
        prefix: bool,
        step: u32,
    },
    /// Arithmetic or comparison on operands of the same type (shifts aside, whose operands are
    /// promoted separately and then brought to the left type).
    Binary {
        op: IrBinaryOp,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    /// `pointer ± index * scale`, with an `int` index.
    PtrOffset {
        pointer: Box<IrExpr>,
        index: Box<IrExpr>,
        scale: u32,
        subtract: bool,
    },
    /// `(lhs - rhs) / scale` between two pointers.
    PtrDiff {
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
        scale: u32,
    },
    /// Short-circuit `&&` (and = true) or `||` over scalar operands.
    Logical {
        and: bool,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    Unary {
        op: IrUnaryOp,
        operand: Box<IrExpr>,
    },
    /// Conversion from the operand's type to the expression type.
    Cast(Box<IrExpr>),
    Conditional {
        condition: Box<IrExpr>,
        then: Box<IrExpr>,
        otherwise: Box<IrExpr>,
    },
    Comma {
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    Call {
        callee: IrCallee,
        function_ty: IrFunctionTy,
        /// Arguments for the declared parameters, converted to the parameter types.
        arguments: Vec<IrExpr>,
        /// Extra arguments of a variadic call, after default argument promotion.
        variadic_arguments: Vec<IrExpr>,
        /// Frame slot holding the eight-byte argument slots of a variadic call.
        variadic_area: Option<LocalId>,
        /// Frame slot receiving a struct or union result.
        result_slot: Option<LocalId>,
    },
    /// The address of the current function's variadic argument area.
    VaArea,
    /// Read the next variadic argument of the expression type and advance the list.
    VaArg { list: Box<IrExpr> },
    /// An unnamed object, initialized when evaluated. Also used for temporaries that hold
    /// aggregate arguments.
    CompoundLiteral { local: LocalId, init: Box<IrLocalInit> },
    MemorySize,
    MemoryGrow(Box<IrExpr>),
}
