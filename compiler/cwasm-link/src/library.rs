//! Prebuilt libraries of IR translation units.
//!
//! A library is never linked as a whole. The linker consults its index only for names the program
//! leaves undefined, and pulls in the defining unit's items on demand.

use crate::error::{ConflictingDefinitionError, LinkResult};
use cwasm_ir::item::{DefinitionState, Linkage};
use cwasm_ir::IrTranslationUnit;
use std::collections::BTreeMap;

/// A set of translation units with an index of their external definitions.
///
/// Libraries are immutable once built, so a single instance can be shared read-only between
/// compilations.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone)]
pub struct IrLibrary {
    name: String,
    units: Vec<IrTranslationUnit>,
    /// External definition name to the index of the defining unit.
    index: BTreeMap<String, usize>,
}

impl IrLibrary {
    /// Index the external definitions of `units`.
    ///
    /// Two units of one library may not both define a function or initialize a variable of the
    /// same name. Tentative variable definitions are indexed at their first occurrence.
    pub fn new(name: impl Into<String>, units: Vec<IrTranslationUnit>) -> LinkResult<Self> {
        let name = name.into();
        let mut index = BTreeMap::<String, usize>::new();
        let mut strong = BTreeMap::<String, usize>::new();
        for (position, unit) in units.iter().enumerate() {
            let functions = unit
                .functions
                .iter()
                .filter(|f| f.linkage == Linkage::External)
                .map(|f| (&f.link_name, DefinitionState::Defined, f.span));
            let variables = unit
                .variables
                .iter()
                .filter(|v| v.linkage == Linkage::External)
                .map(|v| (&v.link_name, v.state, v.span));
            for (symbol, state, span) in functions.chain(variables) {
                if state == DefinitionState::Defined {
                    if let Some(previous) = strong.insert(symbol.clone(), position) {
                        return Err(ConflictingDefinitionError {
                            name: symbol.clone(),
                            reason: format!(
                                "defined by both '{}' and '{}' in library '{name}'",
                                units[previous].name, unit.name
                            ),
                            unit: unit.name.clone(),
                            span,
                        }
                        .into());
                    }
                    index.insert(symbol.clone(), position);
                } else {
                    index.entry(symbol.clone()).or_insert(position);
                }
            }
        }
        tracing::debug!(library = %name, definitions = index.len(), "indexed library");
        Ok(Self { name, units, index })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[IrTranslationUnit] {
        &self.units
    }

    /// The index of the unit defining the external symbol `name`.
    pub fn defining_unit(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Every external name this library defines, in order.
    pub fn definitions(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}
