use cwasm_macros::declare_error_type;
use cwasm_span::Span;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("semantic error: {0}")]
    pub enum IrError {
        Type(TypeError),
        Redeclaration(RedeclarationError),
        UndeclaredIdentifier(UndeclaredIdentifierError),
        InvalidLvalue(InvalidLvalueError),
        UnsupportedGoto(UnsupportedGotoError),
        UndeclaredLabel(UndeclaredLabelError),
        DuplicateLabel(DuplicateLabelError),
        InvalidConstant(InvalidConstantError),
        UnknownField(UnknownFieldError),
        IncompleteType(IncompleteTypeError),
        BreakOutsideLoop(BreakOutsideLoopError),
        ContinueOutsideLoop(ContinueOutsideLoopError),
        MisplacedCase(MisplacedCaseError),
        DuplicateCase(DuplicateCaseError),
        InvalidInitializer(InvalidInitializerError),
        ArgumentCount(ArgumentCountError),
        UnknownTag(UnknownTagError),
    }
}

/// Handy type alias for all IR-related errors.
pub type IrResult<T> = Result<T, IrError>;

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::type_error))]
#[error("type error in {context}: expected {expected}, found {actual}")]
pub struct TypeError {
    pub expected: String,
    pub actual: String,
    pub context: String,
    #[label = "this has type {actual}"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(sema::redeclaration),
    help("all declarations of a name must agree on its type and linkage")
)]
#[error("conflicting redeclaration of '{name}'")]
pub struct RedeclarationError {
    pub name: String,
    #[label = "'{name}' redeclared here"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::undeclared_identifier))]
#[error("use of undeclared identifier '{name}'")]
pub struct UndeclaredIdentifierError {
    pub name: String,
    #[label = "no declaration of '{name}' is in scope"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::invalid_lvalue))]
#[error("expression is not assignable")]
pub struct InvalidLvalueError {
    #[label = "this does not designate a modifiable object"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(sema::unsupported_goto),
    help("a goto may only target labels at the top level of an enclosing compound statement")
)]
#[error("unsupported jump to label '{label}'")]
pub struct UnsupportedGotoError {
    pub label: String,
    #[label = "jumps into a nested statement"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::undeclared_label))]
#[error("use of undeclared label '{label}'")]
pub struct UndeclaredLabelError {
    pub label: String,
    #[label = "no label named '{label}' in this function"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::duplicate_label))]
#[error("redefinition of label '{label}'")]
pub struct DuplicateLabelError {
    pub label: String,
    #[label = "label defined again here"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::invalid_constant))]
#[error("expression is not a constant: {reason}")]
pub struct InvalidConstantError {
    pub reason: String,
    #[label = "a constant expression is required here"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::unknown_field))]
#[error("no member named '{name}' in {record}")]
pub struct UnknownFieldError {
    pub name: String,
    pub record: String,
    #[label = "unknown member"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::incomplete_type))]
#[error("incomplete type '{ty}' used where a complete type is required")]
pub struct IncompleteTypeError {
    pub ty: String,
    #[label = "the size of '{ty}' is not known here"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::break_outside_loop))]
#[error("break statement outside of loop or switch")]
pub struct BreakOutsideLoopError {
    #[label = "there is no enclosing loop or switch"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::continue_outside_loop))]
#[error("continue statement outside of loop")]
pub struct ContinueOutsideLoopError {
    #[label = "there is no enclosing loop"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(sema::misplaced_case),
    help("case and default labels must appear at the top level of a switch body")
)]
#[error("misplaced case label")]
pub struct MisplacedCaseError {
    #[label = "not directly inside a switch body"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::duplicate_case))]
#[error("duplicate case value {value}")]
pub struct DuplicateCaseError {
    pub value: String,
    #[label = "this case value is already handled"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::invalid_initializer))]
#[error("invalid initializer: {message}")]
pub struct InvalidInitializerError {
    pub message: String,
    #[label = "here"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::argument_count))]
#[error("function expects {expected} arguments, but {actual} were given")]
pub struct ArgumentCountError {
    pub expected: usize,
    pub actual: usize,
    #[label = "in this call"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(sema::unknown_tag))]
#[error("'{name}' is not a {kind} tag")]
pub struct UnknownTagError {
    pub name: String,
    pub kind: String,
    #[label = "used here"]
    pub span: Span,
}
