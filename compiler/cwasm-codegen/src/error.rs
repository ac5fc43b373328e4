use cwasm_macros::declare_error_type;
use cwasm_span::Span;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("code generation error: {0}")]
    pub enum CodegenError {
        MemoryLayout(MemoryLayoutError),
        FrameTooLarge(FrameTooLargeError),
        SignatureMismatch(SignatureMismatchError),
    }
}

/// Handy type alias for all code generation errors.
pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(codegen::memory_layout))]
#[error("static data does not fit in the address space: {reason}")]
pub struct MemoryLayoutError {
    pub reason: String,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(codegen::frame_too_large),
    help("large arrays can be moved to static storage with 'static'")
)]
#[error("the locals of '{function}' need {size} bytes, more than the shadow stack holds")]
pub struct FrameTooLargeError {
    pub function: String,
    pub size: u64,
    #[label = "function defined here"]
    pub span: Span,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(codegen::signature_mismatch))]
#[error("call to '{callee}' passes {actual} where the definition expects {expected}")]
pub struct SignatureMismatchError {
    pub callee: String,
    pub expected: String,
    pub actual: String,
    #[label = "call here"]
    pub span: Span,
}
