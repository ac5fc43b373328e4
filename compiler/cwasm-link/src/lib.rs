//! Cross-unit linking of IR translation units.
//!
//! The linker merges the external symbols of the primary units, resolves every reference that is
//! reachable from the functions the program exports, and pulls missing definitions out of
//! fallback libraries. Only reachable functions and variables end up in the [`LinkedProgram`].

pub mod error;
pub mod library;
mod linker;

use crate::error::LinkResult;
use crate::library::IrLibrary;
use crate::linker::Linker;
use cwasm_ir::item::{IrFunction, IrVariable};
use cwasm_ir::ty::{IrFunctionTy, RecordTable};
use cwasm_ir::IrTranslationUnit;

/// A function provided by the host, imported under the `c2wasm` module.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedImport {
    pub name: String,
    pub ty: IrFunctionTy,
}

/// The complete program after linking.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    /// Reachable function definitions. Primary units come first, in unit order.
    pub functions: Vec<IrFunction>,
    /// Reachable variables, one storage per name.
    pub variables: Vec<IrVariable>,
    pub imports: Vec<LinkedImport>,
    /// Link names of the external functions defined by primary units.
    pub exports: Vec<String>,
    pub records: RecordTable,
}

impl LinkedProgram {
    pub fn function(&self, link_name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.link_name == link_name)
    }

    pub fn variable(&self, link_name: &str) -> Option<&IrVariable> {
        self.variables.iter().find(|v| v.link_name == link_name)
    }

    pub fn import(&self, link_name: &str) -> Option<&LinkedImport> {
        self.imports.iter().find(|i| i.name == link_name)
    }

    pub fn is_exported(&self, link_name: &str) -> bool {
        self.exports.iter().any(|e| e == link_name)
    }
}

/// Link the primary units, falling back to `libraries` in order for undefined names.
pub fn link(primary: &[IrTranslationUnit], libraries: &[&IrLibrary]) -> LinkResult<LinkedProgram> {
    Linker::new(primary, libraries).link()
}

/// Link the primary units on their own. Every reference must resolve within them, or to a host
/// import.
pub fn link_restricted(primary: &[IrTranslationUnit]) -> LinkResult<LinkedProgram> {
    tracing::debug!(units = primary.len(), "linking in restricted mode");
    Linker::new(primary, &[]).link()
}
