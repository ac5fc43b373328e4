mod ast;
mod error;
mod lexer;
mod macros;
mod parser;
mod tok;

pub use ast::*;
pub use error::*;
pub use lexer::*;
pub use parser::*;
pub use tok::*;

/// Lex and parse a complete translation unit.
pub fn parse(input: &str) -> ParseResult<AstTranslationUnit> {
    let mut lexer = Lexer::new(input);
    let mut parser = Parser::new(&mut lexer);
    parser.parse()
}
