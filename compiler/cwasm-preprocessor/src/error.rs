//! Error types for the preprocessor.
//!
//! The preprocessor only distinguishes two failure classes: everything that is wrong with a
//! directive or a macro invocation is a [`MacroError`], and a file that cannot be found (or that
//! includes itself without end) is an [`IncludeError`]. Both carry the file and line number of the
//! offending directive, as positions in the preprocessed output do not exist yet.

use cwasm_macros::declare_error_type;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("preprocessor error: {0}")]
    pub enum PreprocessError {
        Macro(MacroError),
        Include(IncludeError),
    }
}

/// Handy type alias for all preprocessing-related errors.
pub type PreprocessResult<T> = Result<T, PreprocessError>;

#[derive(Error, Diagnostic, Debug, PartialEq)]
#[diagnostic(code(preprocessor::macro_error))]
#[error("In file '{file}': {message}")]
pub struct MacroError {
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl MacroError {
    pub fn new(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }
}

#[derive(Error, Diagnostic, Debug, PartialEq)]
#[diagnostic(
    code(preprocessor::include_error),
    help("make sure '{name}' is part of the compiled files or the library headers")
)]
#[error("In file '{file}': cannot include '{name}': {reason}")]
pub struct IncludeError {
    pub file: String,
    pub line: usize,
    pub name: String,
    pub reason: String,
}
