use crate::pipeline::{Pipeline, PipelineError, PipelineOperation};
use cwasm_syntax::{AstTranslationUnit, Lexer, Parser};

/// Operation for parsing preprocessed text into an AST.
pub struct ParseOperation;
impl<'c, T: AsRef<str>> PipelineOperation<'c, T, AstTranslationUnit> for ParseOperation {
    fn execute(_: &Pipeline<'c>, input: T) -> Result<AstTranslationUnit, PipelineError> {
        let mut lexer = Lexer::new(input.as_ref());
        let mut parser = Parser::new(&mut lexer);
        let translation_unit = parser.parse()?;
        Ok(translation_unit)
    }
}
