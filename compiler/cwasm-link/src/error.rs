use cwasm_macros::declare_error_type;
use cwasm_span::Span;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("link error: {0}")]
    pub enum LinkError {
        UnresolvedSymbol(UnresolvedSymbolError),
        ConflictingDefinition(ConflictingDefinitionError),
    }
}

/// Handy type alias for all linker errors.
pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(link::unresolved_symbol),
    help("define '{name}' in one of the compiled files, or link a library that provides it")
)]
#[error("undefined reference to '{name}'")]
pub struct UnresolvedSymbolError {
    pub name: String,
    /// The unit holding the reference.
    pub unit: String,
    #[label = "'{name}' is declared here but never defined"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(link::conflicting_definition))]
#[error("conflicting definitions of '{name}': {reason}")]
pub struct ConflictingDefinitionError {
    pub name: String,
    pub reason: String,
    /// The unit holding the second declaration.
    pub unit: String,
    #[label = "conflicting declaration of '{name}'"]
    pub span: Span,
}
