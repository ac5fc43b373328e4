use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_link::LinkedProgram;
use cwasm_wasm::WasmModule;

/// Operation for lowering the linked program to a module description.
pub struct GenerateOperation;
impl<'c, 'a> PipelineOperation<'c, &'a LinkedProgram, WasmModule> for GenerateOperation {
    fn execute(_: &Pipeline<'c>, input: &'a LinkedProgram) -> Result<WasmModule, PipelineError> {
        let module = cwasm_codegen::generate(input)?;
        Ok(module)
    }
}
