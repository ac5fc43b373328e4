use crate::pipeline::PipelineError;
use miette::Diagnostic;
use thiserror::Error;

/// A failed compilation, tagged with the file being processed when it failed.
///
/// The message and diagnostic details are those of the stage error. Link and code generation
/// errors concern the whole program and carry no file.
#[derive(Debug, Error, Diagnostic)]
#[error("{kind}")]
#[diagnostic(forward(kind))]
pub struct CompileError {
    pub file: Option<String>,
    pub kind: PipelineError,
}

impl CompileError {
    pub fn in_file(file: &str, kind: PipelineError) -> Self {
        Self {
            file: Some(file.to_owned()),
            kind,
        }
    }
}

impl From<PipelineError> for CompileError {
    fn from(kind: PipelineError) -> Self {
        Self { file: None, kind }
    }
}
