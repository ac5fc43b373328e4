use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_ir::IrTranslationUnit;
use cwasm_syntax::AstTranslationUnit;

/// Operation for building the IR of one translation unit, named after its file.
pub struct IrBuildOperation;
impl<'c, 'a> PipelineOperation<'c, (&'a str, &'a AstTranslationUnit), IrTranslationUnit>
    for IrBuildOperation
{
    fn execute(
        _: &Pipeline<'c>,
        (name, ast): (&'a str, &'a AstTranslationUnit),
    ) -> Result<IrTranslationUnit, PipelineError> {
        let unit = cwasm_ir::build(name, ast)?;
        Ok(unit)
    }
}
