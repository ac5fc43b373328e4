//! The compiler driver.
//!
//! Drives the compilation pipeline from source files to a module description, and bundles the
//! runtime library that programs link against by default.

pub mod compiler;
pub mod error;
pub mod library;
pub mod operations;
pub mod pipeline;

pub use crate::compiler::Compiler;
pub use crate::error::CompileError;
pub use crate::library::Library;
