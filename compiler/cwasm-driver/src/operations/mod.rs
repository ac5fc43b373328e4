pub mod emit;
pub mod generate;
pub mod ir_build;
pub mod link;
pub mod optimize;
pub mod parse;
pub mod preprocess;
