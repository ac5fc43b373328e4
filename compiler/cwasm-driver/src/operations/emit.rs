use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_diagnostics::ice;
use cwasm_ir::debug::IrDebugPass;
use cwasm_ir::IrTranslationUnit;
use cwasm_syntax::AstTranslationUnit;
use cwasm_wasm::{WasmModule, WatPrinter};

/// Operation for emitting the AST.
pub struct AstEmitOperation;
impl<'c> PipelineOperation<'c, AstTranslationUnit, AstTranslationUnit> for AstEmitOperation {
    fn execute(
        pipeline: &Pipeline<'c>,
        input: AstTranslationUnit,
    ) -> Result<AstTranslationUnit, PipelineError> {
        if !pipeline.opts.emit_ast {
            return Ok(input);
        }
        let syntax = ron::ser::to_string_pretty(&input, Default::default())
            .unwrap_or_else(|e| ice!("failed to serialize ast to ron: {e}"));
        println!("{}", syntax);
        Ok(input)
    }
}

/// Operation for emitting the IR of a translation unit.
pub struct IrEmitOperation;
impl<'c> PipelineOperation<'c, IrTranslationUnit, IrTranslationUnit> for IrEmitOperation {
    fn execute(
        pipeline: &Pipeline<'c>,
        input: IrTranslationUnit,
    ) -> Result<IrTranslationUnit, PipelineError> {
        if !pipeline.opts.emit_ir {
            return Ok(input);
        }
        println!("{}", IrDebugPass::format_translation_unit_to_string(&input));
        Ok(input)
    }
}

/// Operation for emitting the optimized module as text.
pub struct WatEmitOperation;
impl<'c> PipelineOperation<'c, WasmModule, WasmModule> for WatEmitOperation {
    fn execute(pipeline: &Pipeline<'c>, input: WasmModule) -> Result<WasmModule, PipelineError> {
        if !pipeline.opts.emit_wat {
            return Ok(input);
        }
        println!("{}", WatPrinter::format_module_to_string(&input));
        Ok(input)
    }
}
