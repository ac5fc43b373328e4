use crate::error::CompileError;
use crate::library::Library;
use crate::operations::emit::{AstEmitOperation, IrEmitOperation, WatEmitOperation};
use crate::operations::generate::GenerateOperation;
use crate::operations::ir_build::IrBuildOperation;
use crate::operations::link::{LinkInput, LinkOperation};
use crate::operations::optimize::OptimizeOperation;
use crate::operations::parse::ParseOperation;
use crate::operations::preprocess::{PreprocessInput, PreprocessOperation};
use cwasm_codegen::error::CodegenError;
use cwasm_ir::error::IrError;
use cwasm_ir::IrTranslationUnit;
use cwasm_link::error::LinkError;
use cwasm_opt::OptimizationFlags;
use cwasm_preprocessor::PreprocessError;
use cwasm_syntax::ParseError;
use cwasm_wasm::WasmModule;
use miette::Diagnostic;
use std::collections::BTreeMap;
use thiserror::Error;

/// Execute the entire compilation pipeline over a set of files.
///
/// Every file that is not a header is a translation unit. Headers are only reachable through
/// `#include`, from the files themselves or from the library.
pub fn execute_compilation_pipeline(
    opts: &PipelineOptions,
    files: &BTreeMap<String, String>,
    library: Option<&Library>,
) -> Result<WasmModule, CompileError> {
    let pipeline = Pipeline::new(opts, files, library);
    let units = files
        .iter()
        .filter(|(name, _)| !is_header(name))
        .map(|(name, source)| build_translation_unit(&pipeline, name, source))
        .collect::<Result<Vec<_>, _>>()?;
    let program = LinkOperation::execute(&pipeline, LinkInput { units: &units })?;
    let module = GenerateOperation::execute(&pipeline, &program)?;
    let module = OptimizeOperation::execute(&pipeline, module)?;
    let module = WatEmitOperation::execute(&pipeline, module)?;
    Ok(module)
}

/// Run the front end over one file, up to and including the IR.
pub fn build_translation_unit(
    pipeline: &Pipeline<'_>,
    name: &str,
    source: &str,
) -> Result<IrTranslationUnit, CompileError> {
    let _span = tracing::debug_span!("unit", file = %name).entered();
    let tag = |e: PipelineError| CompileError::in_file(name, e);
    let text =
        PreprocessOperation::execute(pipeline, PreprocessInput { name, source }).map_err(tag)?;
    let ast = ParseOperation::execute(pipeline, &text).map_err(tag)?;
    let ast = AstEmitOperation::execute(pipeline, ast).map_err(tag)?;
    let unit = IrBuildOperation::execute(pipeline, (name, &ast)).map_err(tag)?;
    IrEmitOperation::execute(pipeline, unit).map_err(tag)
}

pub fn is_header(name: &str) -> bool {
    name.ends_with(".h")
}

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ir(#[from] IrError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Codegen(#[from] CodegenError),
}

/// Options for the compilation pipeline.
///
/// Most of these are derived from the command line arguments.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub emit_ast: bool,
    pub emit_ir: bool,
    pub emit_wat: bool,
    pub flags: OptimizationFlags,
    /// Macros predefined in every translation unit, as `(name, value)`.
    pub defines: Vec<(String, String)>,
    /// Link without any library, rejecting every unresolved reference.
    pub restricted: bool,
}

/// A compilation pipeline for the compiler.
pub struct Pipeline<'c> {
    pub(crate) opts: &'c PipelineOptions,
    pub(crate) files: &'c BTreeMap<String, String>,
    pub(crate) library: Option<&'c Library>,
}

impl<'c> Pipeline<'c> {
    pub fn new(
        opts: &'c PipelineOptions,
        files: &'c BTreeMap<String, String>,
        library: Option<&'c Library>,
    ) -> Self {
        Self {
            opts,
            files,
            library: library.filter(|_| !opts.restricted),
        }
    }
}

pub trait PipelineOperation<'c, I, O> {
    fn execute(pipeline: &Pipeline<'c>, input: I) -> Result<O, PipelineError>;
}
