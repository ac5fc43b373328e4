use crate::expr::IrExpr;
use crate::item::LocalId;
use cwasm_span::Span;

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum IrStmt {
    Expr(IrExpr),
    /// Point of declaration of a local, with its initializer.
    Declare {
        local: LocalId,
        init: Option<IrLocalInit>,
    },
    Block(Vec<IrStmt>),
    If {
        condition: IrExpr,
        then: Box<IrStmt>,
        otherwise: Option<Box<IrStmt>>,
    },
    While {
        condition: IrExpr,
        body: Box<IrStmt>,
    },
    DoWhile {
        body: Box<IrStmt>,
        condition: IrExpr,
    },
    For {
        init: Vec<IrStmt>,
        condition: Option<IrExpr>,
        update: Option<IrExpr>,
        body: Box<IrStmt>,
    },
    /// A switch whose body has been partitioned into case sections in source order. Control
    /// falls through from one section into the next.
    Switch {
        value: IrExpr,
        sections: Vec<IrSwitchSection>,
    },
    Break,
    Continue,
    Return(Option<IrExpr>),
    /// A statement prefixed by a label. Labels that are targeted by a `goto` always appear
    /// directly inside a `Block`.
    Labeled { label: String, body: Box<IrStmt> },
    Goto { label: String, span: Span },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrSwitchSection {
    /// The case value, or `None` for the `default` section.
    pub value: Option<i64>,
    pub body: Vec<IrStmt>,
}

/// Initialization of a local object.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum IrLocalInit {
    /// A single value of the object's type.
    Expr(IrExpr),
    /// Zero the object, then store each value at its byte offset. Aggregate values are copied.
    Aggregate(Vec<IrInitStore>),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrInitStore {
    pub offset: u32,
    pub value: IrExpr,
}
