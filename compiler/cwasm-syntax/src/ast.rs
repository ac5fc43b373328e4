//! The abstract syntax tree of a C translation unit.
//!
//! The tree is a faithful representation of the source: types are not resolved, typedef names are
//! kept as names, and declarators are kept in their derived form. Every node records its span.

use crate::{declare_ast_node, declare_ast_variant, IntegerSuffix};
use cwasm_span::Span;

/// The top-level AST node representing a single translation unit (source file).
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AstTranslationUnit {
    pub items: Vec<AstItem>,
}

declare_ast_variant! {
    /// Anything that can appear at file scope.
    pub enum AstItem {
        Function(AstFunctionDefinition),
        Declaration(AstDeclaration),
    }
}

declare_ast_node! {
    pub struct AstIdentifier {
        pub span: Span,
        pub name: String,
    }
}

declare_ast_node! {
    pub struct AstFunctionDefinition {
        pub span: Span,
        pub specifiers: AstDeclarationSpecifiers,
        pub declarator: AstDeclarator,
        pub body: AstCompoundStmt,
    }
}

declare_ast_node! {
    /// A declaration of zero or more names sharing one set of specifiers.
    ///
    /// `struct S { int x; };` is a declaration without declarators.
    pub struct AstDeclaration {
        pub span: Span,
        pub specifiers: AstDeclarationSpecifiers,
        pub declarators: Vec<AstInitDeclarator>,
    }
}

declare_ast_node! {
    pub struct AstInitDeclarator {
        pub span: Span,
        pub declarator: AstDeclarator,
        pub initializer: Option<AstInitializer>,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstStorageClass {
    Typedef,
    Static,
    Extern,
    /// A function provided by the host environment.
    Import,
}

declare_ast_node! {
    pub struct AstDeclarationSpecifiers {
        pub span: Span,
        pub storage: Option<AstStorageClass>,
        pub ty: AstTypeSpecifier,
    }
}

/// The arithmetic and void types nameable by keyword combinations.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstBasicType {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AstTypeSpecifier {
    Basic(Span, AstBasicType),
    Record(AstRecordSpecifier),
    Enum(AstEnumSpecifier),
    TypedefName(AstIdentifier),
}

impl AstTypeSpecifier {
    pub fn span(&self) -> &Span {
        match self {
            AstTypeSpecifier::Basic(span, _) => span,
            AstTypeSpecifier::Record(r) => &r.span,
            AstTypeSpecifier::Enum(e) => &e.span,
            AstTypeSpecifier::TypedefName(n) => &n.span,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstRecordKind {
    Struct,
    Union,
}

declare_ast_node! {
    /// `struct`/`union` specifier. `fields` is `None` for a reference to a tag without a body.
    pub struct AstRecordSpecifier {
        pub span: Span,
        pub kind: AstRecordKind,
        pub name: Option<AstIdentifier>,
        pub fields: Option<Vec<AstFieldDeclaration>>,
    }
}

declare_ast_node! {
    pub struct AstFieldDeclaration {
        pub span: Span,
        pub ty: AstTypeSpecifier,
        pub declarators: Vec<AstDeclarator>,
    }
}

declare_ast_node! {
    pub struct AstEnumSpecifier {
        pub span: Span,
        pub name: Option<AstIdentifier>,
        pub enumerators: Option<Vec<AstEnumerator>>,
    }
}

declare_ast_node! {
    pub struct AstEnumerator {
        pub span: Span,
        pub name: AstIdentifier,
        pub value: Option<AstExpr>,
    }
}

declare_ast_node! {
    /// A declarator, possibly abstract (without a name).
    ///
    /// `derived` lists the type constructors from the one closest to the name outward: the
    /// declared type is built by applying them to the specifier type starting from the last one.
    /// `int *a[3]` has `[Array(3), Pointer]` and `int (*f)(void)` has `[Pointer, Function]`.
    pub struct AstDeclarator {
        pub span: Span,
        pub name: Option<AstIdentifier>,
        pub derived: Vec<AstDerivedType>,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AstDerivedType {
    Pointer,
    Array(Option<Box<AstExpr>>),
    Function(AstParameterList),
}

declare_ast_node! {
    pub struct AstParameterList {
        pub span: Span,
        pub parameters: Vec<AstParameter>,
        pub variadic: bool,
        /// `false` for the old-style empty list `()`, which accepts any arguments.
        pub prototype: bool,
    }
}

declare_ast_node! {
    pub struct AstParameter {
        pub span: Span,
        pub specifiers: AstDeclarationSpecifiers,
        pub declarator: AstDeclarator,
    }
}

declare_ast_node! {
    /// A type name as used in casts, `sizeof`, `__builtin_va_arg` and compound literals.
    pub struct AstTypeName {
        pub span: Span,
        pub ty: AstTypeSpecifier,
        pub declarator: AstDeclarator,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AstInitializer {
    Expr(AstExpr),
    List(AstInitializerList),
}

impl AstInitializer {
    pub fn span(&self) -> &Span {
        match self {
            AstInitializer::Expr(e) => e.span(),
            AstInitializer::List(l) => &l.span,
        }
    }
}

declare_ast_node! {
    pub struct AstInitializerList {
        pub span: Span,
        pub items: Vec<AstInitializerItem>,
    }
}

declare_ast_node! {
    pub struct AstInitializerItem {
        pub span: Span,
        pub designators: Vec<AstDesignator>,
        pub value: AstInitializer,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AstDesignator {
    Field(AstIdentifier),
    Index(AstExpr),
}

declare_ast_variant! {
    pub enum AstStmt {
        Compound(AstCompoundStmt),
        Declaration(AstDeclaration),
        Expr(AstExprStmt),
        If(AstIfStmt),
        While(AstWhileStmt),
        DoWhile(AstDoWhileStmt),
        For(AstForStmt),
        Switch(AstSwitchStmt),
        Case(AstCaseStmt),
        Default(AstDefaultStmt),
        Break(AstBreakStmt),
        Continue(AstContinueStmt),
        Return(AstReturnStmt),
        Goto(AstGotoStmt),
        Labeled(AstLabeledStmt),
    }
}

declare_ast_node! {
    pub struct AstCompoundStmt {
        pub span: Span,
        pub items: Vec<AstStmt>,
    }
}

declare_ast_node! {
    /// An expression statement; the expression is absent for `;`.
    pub struct AstExprStmt {
        pub span: Span,
        pub expr: Option<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstIfStmt {
        pub span: Span,
        pub condition: AstExpr,
        pub happy_path: Box<AstStmt>,
        pub unhappy_path: Option<Box<AstStmt>>,
    }
}

declare_ast_node! {
    pub struct AstWhileStmt {
        pub span: Span,
        pub condition: AstExpr,
        pub body: Box<AstStmt>,
    }
}

declare_ast_node! {
    pub struct AstDoWhileStmt {
        pub span: Span,
        pub body: Box<AstStmt>,
        pub condition: AstExpr,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AstForInitializer {
    Declaration(AstDeclaration),
    Expr(AstExpr),
}

declare_ast_node! {
    pub struct AstForStmt {
        pub span: Span,
        pub initializer: Option<AstForInitializer>,
        pub condition: Option<AstExpr>,
        pub increment: Option<AstExpr>,
        pub body: Box<AstStmt>,
    }
}

declare_ast_node! {
    pub struct AstSwitchStmt {
        pub span: Span,
        pub value: AstExpr,
        pub body: Box<AstStmt>,
    }
}

declare_ast_node! {
    pub struct AstCaseStmt {
        pub span: Span,
        pub value: AstExpr,
        pub body: Box<AstStmt>,
    }
}

declare_ast_node! {
    pub struct AstDefaultStmt {
        pub span: Span,
        pub body: Box<AstStmt>,
    }
}

declare_ast_node! {
    pub struct AstBreakStmt {
        pub span: Span,
    }
}

declare_ast_node! {
    pub struct AstContinueStmt {
        pub span: Span,
    }
}

declare_ast_node! {
    pub struct AstReturnStmt {
        pub span: Span,
        pub value: Option<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstGotoStmt {
        pub span: Span,
        pub label: AstIdentifier,
    }
}

declare_ast_node! {
    pub struct AstLabeledStmt {
        pub span: Span,
        pub label: AstIdentifier,
        pub body: Box<AstStmt>,
    }
}

declare_ast_variant! {
    pub enum AstExpr {
        Identifier(AstIdentifier),
        IntegerLiteral(AstIntegerLiteralExpr),
        FloatLiteral(AstFloatLiteralExpr),
        CharLiteral(AstCharLiteralExpr),
        StringLiteral(AstStringLiteralExpr),
        Assign(AstAssignExpr),
        BinaryOp(AstBinaryOpExpr),
        UnaryOp(AstUnaryOpExpr),
        Conditional(AstConditionalExpr),
        Comma(AstCommaExpr),
        Cast(AstCastExpr),
        SizeofExpr(AstSizeofExprExpr),
        SizeofType(AstSizeofTypeExpr),
        Call(AstCallExpr),
        BracketIndex(AstBracketIndexExpr),
        Member(AstMemberExpr),
        CompoundLiteral(AstCompoundLiteralExpr),
        Builtin(AstBuiltinExpr),
    }
}

declare_ast_node! {
    pub struct AstIntegerLiteralExpr {
        pub span: Span,
        pub value: u64,
        pub suffix: IntegerSuffix,
    }
}

declare_ast_node! {
    pub struct AstFloatLiteralExpr {
        pub span: Span,
        pub value: f64,
        /// `true` for `float` constants written with an `f` suffix.
        pub single: bool,
    }
}

declare_ast_node! {
    pub struct AstCharLiteralExpr {
        pub span: Span,
        pub value: i64,
    }
}

declare_ast_node! {
    /// One or more adjacent string literals, concatenated.
    pub struct AstStringLiteralExpr {
        pub span: Span,
        pub value: Vec<u8>,
    }
}

declare_ast_node! {
    /// Assignment, with `op` set for compound assignments such as `+=`.
    pub struct AstAssignExpr {
        pub span: Span,
        pub op: Option<AstBinaryOp>,
        pub lhs: Box<AstExpr>,
        pub rhs: Box<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstBinaryOpExpr {
        pub span: Span,
        pub lhs: Box<AstExpr>,
        pub rhs: Box<AstExpr>,
        pub op: AstBinaryOp,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstBinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

declare_ast_node! {
    pub struct AstUnaryOpExpr {
        pub span: Span,
        pub operand: Box<AstExpr>,
        pub op: AstUnaryOp,
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstUnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
    Deref,
    AddressOf,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

declare_ast_node! {
    pub struct AstConditionalExpr {
        pub span: Span,
        pub condition: Box<AstExpr>,
        pub happy_path: Box<AstExpr>,
        pub unhappy_path: Box<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstCommaExpr {
        pub span: Span,
        pub lhs: Box<AstExpr>,
        pub rhs: Box<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstCastExpr {
        pub span: Span,
        pub ty: AstTypeName,
        pub operand: Box<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstSizeofExprExpr {
        pub span: Span,
        pub operand: Box<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstSizeofTypeExpr {
        pub span: Span,
        pub ty: AstTypeName,
    }
}

declare_ast_node! {
    pub struct AstCallExpr {
        pub span: Span,
        pub callee: Box<AstExpr>,
        pub arguments: Vec<AstExpr>,
    }
}

declare_ast_node! {
    pub struct AstBracketIndexExpr {
        pub span: Span,
        pub origin: Box<AstExpr>,
        pub index: Box<AstExpr>,
    }
}

declare_ast_node! {
    /// `origin.member`, or `origin->member` when `arrow` is set.
    pub struct AstMemberExpr {
        pub span: Span,
        pub origin: Box<AstExpr>,
        pub member: AstIdentifier,
        pub arrow: bool,
    }
}

declare_ast_node! {
    pub struct AstCompoundLiteralExpr {
        pub span: Span,
        pub ty: AstTypeName,
        pub initializer: AstInitializerList,
    }
}

declare_ast_node! {
    pub struct AstBuiltinExpr {
        pub span: Span,
        pub builtin: AstBuiltin,
    }
}

/// Compiler builtins that look like function calls but are not.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AstBuiltin {
    VaStart(Box<AstExpr>),
    VaArg(Box<AstExpr>, AstTypeName),
    MemorySize,
    MemoryGrow(Box<AstExpr>),
}
