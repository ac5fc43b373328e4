use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_ir::IrTranslationUnit;
use cwasm_link::{link, link_restricted, LinkedProgram};

pub struct LinkInput<'a> {
    pub units: &'a [IrTranslationUnit],
}

/// Operation for linking the translation units, with the library as fallback.
pub struct LinkOperation;
impl<'c, 'a> PipelineOperation<'c, LinkInput<'a>, LinkedProgram> for LinkOperation {
    fn execute(pipeline: &Pipeline<'c>, input: LinkInput<'a>) -> Result<LinkedProgram, PipelineError> {
        let program = match pipeline.library {
            Some(library) => link(input.units, &[library.ir()])?,
            None => link_restricted(input.units)?,
        };
        Ok(program)
    }
}
