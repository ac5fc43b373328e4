use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_wasm::WasmModule;

/// Operation for running the optimizer with the configured flags.
pub struct OptimizeOperation;
impl<'c> PipelineOperation<'c, WasmModule, WasmModule> for OptimizeOperation {
    fn execute(pipeline: &Pipeline<'c>, mut input: WasmModule) -> Result<WasmModule, PipelineError> {
        cwasm_opt::optimize(&mut input, &pipeline.opts.flags);
        Ok(input)
    }
}
