use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_preprocessor::Preprocessor;
use std::collections::BTreeMap;

pub struct PreprocessInput<'a> {
    pub name: &'a str,
    pub source: &'a str,
}

/// Operation for running the preprocessor over one translation unit.
///
/// Includes resolve against the compiled files first and the library headers second.
pub struct PreprocessOperation;
impl<'c, 'a> PipelineOperation<'c, PreprocessInput<'a>, String> for PreprocessOperation {
    fn execute(
        pipeline: &Pipeline<'c>,
        input: PreprocessInput<'a>,
    ) -> Result<String, PipelineError> {
        let no_headers = BTreeMap::new();
        let headers = pipeline
            .library
            .map(|library| library.headers())
            .unwrap_or(&no_headers);
        let resolver = (pipeline.files, headers);
        let mut preprocessor = Preprocessor::new(&resolver);
        for (name, value) in &pipeline.opts.defines {
            preprocessor.define(name, value)?;
        }
        let text = preprocessor.process(input.name, input.source)?;
        Ok(text)
    }
}
