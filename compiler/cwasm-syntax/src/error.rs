//! Error types for the parsing frontend.
//!
//! Lexer and parser share one error type. The lexer produces tokens on demand, so lexical errors
//! surface at the moment the parser asks for the offending token.

use crate::Token;
use cwasm_macros::declare_error_type;
use cwasm_span::Span;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("parser error: {0}")]
    pub enum ParseError {
        UnexpectedEndOfFile(UnexpectedEndOfFileError),
        UnfinishedToken(UnfinishedTokenError),
        InvalidIntegerLiteral(InvalidIntegerLiteralError),
        InvalidEscape(InvalidEscapeError),
        UnexpectedCharacter(UnexpectedCharacterError),
        UnexpectedToken(UnexpectedTokenError),
        Syntax(SyntaxError),
    }
}

/// Handy type alias for all parsing-related errors.
pub type ParseResult<T> = Result<T, ParseError>;

/// Signals that the parser has reached the end of the input stream.
///
/// The lexer reports end of input with this error as well, but the parser only propagates it when
/// it actually required another token.
#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(syntax::unexpected_end_of_file),
    help("add more input to form a valid program")
)]
#[error("expected more characters after this")]
pub struct UnexpectedEndOfFileError {
    #[label = "required more input to parse"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug, PartialEq)]
#[diagnostic(
    code(syntax::unfinished_token),
    help("did you forget to add a '{expected}' character here?")
)]
#[error("expected another '{expected}' character here")]
pub struct UnfinishedTokenError {
    pub expected: char,
    #[label = "this alone does not form a valid token"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(syntax::invalid_integer_literal),
    help("integer constants must fit in 64 bits")
)]
#[error("found illegal numeric literal")]
pub struct InvalidIntegerLiteralError {
    pub buf: String,
    #[label("'{buf}' is not a valid numeric constant")]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(syntax::invalid_escape))]
#[error("found unknown escape sequence")]
pub struct InvalidEscapeError {
    pub ch: char,
    #[label("'\\{ch}' is not a valid escape sequence")]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(syntax::unexpected_character))]
#[error("found illegal character during parsing")]
pub struct UnexpectedCharacterError {
    pub ch: char,
    #[label("the character '{ch}' does not parse into any tokens")]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(syntax::unexpected_token))]
#[error("found unexpected token during parsing")]
pub struct UnexpectedTokenError {
    pub token: Token,
    #[label("was not expecting to find '{token}' in this position")]
    pub span: Span,
}

/// Grammatically well-formed input that is still not valid C, such as `long char`.
#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(syntax::syntax_error))]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    #[label("here")]
    pub span: Span,
}

impl ParseError {
    /// The source span the error points at.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedEndOfFile(e) => e.span,
            ParseError::UnfinishedToken(e) => e.span,
            ParseError::InvalidIntegerLiteral(e) => e.span,
            ParseError::InvalidEscape(e) => e.span,
            ParseError::UnexpectedCharacter(e) => e.span,
            ParseError::UnexpectedToken(e) => e.span,
            ParseError::Syntax(e) => e.span,
        }
    }
}
