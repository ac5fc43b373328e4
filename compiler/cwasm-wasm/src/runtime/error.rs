use crate::ty::FuncType;
use cwasm_macros::declare_error_type;
use miette::Diagnostic;
use thiserror::Error;

declare_error_type! {
    #[error("instantiation error: {0}")]
    pub enum InstantiationError {
        MissingImport(MissingImportError),
        ImportMismatch(ImportMismatchError),
        Compile(ModuleCompileError),
        Link(ModuleLinkError),
    }
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(instantiate::missing_import),
    help("provide a host function for every import of the module")
)]
#[error("no host function provided for import '{module}.{name}'")]
pub struct MissingImportError {
    pub module: String,
    pub name: String,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(instantiate::import_mismatch))]
#[error("host function '{module}.{name}' has signature {actual}, but the module expects {expected}")]
pub struct ImportMismatchError {
    pub module: String,
    pub name: String,
    pub expected: FuncType,
    pub actual: FuncType,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(
    code(instantiate::compile),
    help("the encoder produced a module the engine does not accept")
)]
#[error("module failed to compile: {message}")]
pub struct ModuleCompileError {
    pub message: String,
}

#[derive(Error, Diagnostic, Debug)]
#[diagnostic(code(instantiate::link))]
#[error("module failed to instantiate: {message}")]
pub struct ModuleLinkError {
    pub message: String,
}

/// A runtime failure while executing a module.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum Trap {
    #[error("unreachable executed")]
    #[diagnostic(code(trap::unreachable))]
    Unreachable,
    #[error("integer divide by zero")]
    #[diagnostic(code(trap::divide_by_zero))]
    IntegerDivideByZero,
    #[error("integer overflow")]
    #[diagnostic(code(trap::integer_overflow))]
    IntegerOverflow,
    #[error("out of bounds memory access")]
    #[diagnostic(code(trap::memory_out_of_bounds))]
    MemoryOutOfBounds,
    #[error("undefined function table element")]
    #[diagnostic(code(trap::undefined_element))]
    UndefinedElement,
    #[error("indirect call signature mismatch")]
    #[diagnostic(code(trap::indirect_call_mismatch))]
    IndirectCallMismatch,
    #[error("call stack exhausted")]
    #[diagnostic(code(trap::call_stack_exhausted))]
    CallStackExhausted,
    #[error("no exported function named '{0}'")]
    #[diagnostic(code(trap::unknown_export))]
    UnknownExport(String),
    #[error("wrong arguments for '{0}'")]
    #[diagnostic(code(trap::bad_arguments))]
    BadArguments(String),
    #[error("host function failed: {0}")]
    #[diagnostic(code(trap::host))]
    Host(String),
    #[error("{0}")]
    #[diagnostic(code(trap::runtime))]
    Runtime(String),
}
