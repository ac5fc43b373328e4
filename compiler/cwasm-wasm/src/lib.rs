//! WebAssembly module descriptions.
//!
//! A [`WasmModule`] is a plain description of a module: imports, functions with tree-shaped
//! bodies, one memory, one function table, globals and data segments. The code generator builds
//! it, the optimizer rewrites it in place, and this crate turns it into binary or text form. Encoded
//! modules can be instantiated on `wasmer`, which is what the test suites run compiled programs on.

pub mod encode;
pub mod instr;
pub mod module;
pub mod numeric;
pub mod runtime;
pub mod ty;
pub mod wat;

pub use crate::instr::Instr;
pub use crate::module::{WasmData, WasmFunction, WasmGlobal, WasmImport, WasmMemory, WasmModule};
pub use crate::runtime::{instantiate, HostImports, Instance, InstantiationError, Trap};
pub use crate::ty::{BlockType, FuncType, ValType, Value};
pub use crate::wat::WatPrinter;
