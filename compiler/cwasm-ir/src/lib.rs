//! Typed intermediate representation of C translation units, and the builder that produces it
//! from the syntax tree.

pub mod builder;
pub mod context;
pub mod debug;
pub mod error;
pub mod expr;
pub mod item;
pub mod stmt;
pub mod ty;

use crate::builder::IrBuilder;
use crate::error::IrResult;
use crate::item::{IrFunction, IrSymbol, IrVariable};
use crate::ty::RecordTable;
use cwasm_syntax::AstTranslationUnit;
use std::collections::BTreeMap;

/// The IR of one translation unit.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrTranslationUnit {
    pub name: String,
    /// Every file-scope name with linkage, plus the unit's anonymous objects, by link name.
    pub symbols: BTreeMap<String, IrSymbol>,
    pub functions: Vec<IrFunction>,
    /// Variables with storage in this unit, defined or tentative.
    pub variables: Vec<IrVariable>,
    pub records: RecordTable,
}

impl IrTranslationUnit {
    pub fn function(&self, link_name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.link_name == link_name)
    }

    pub fn variable(&self, link_name: &str) -> Option<&IrVariable> {
        self.variables.iter().find(|v| v.link_name == link_name)
    }
}

/// Build the IR of a parsed translation unit. `unit_name` qualifies the link names of internal
/// symbols.
pub fn build(unit_name: &str, unit: &AstTranslationUnit) -> IrResult<IrTranslationUnit> {
    IrBuilder::new(unit_name).build(unit)
}
