use crate::error::{ConflictingDefinitionError, LinkError, LinkResult, UnresolvedSymbolError};
use crate::library::IrLibrary;
use crate::{LinkedImport, LinkedProgram};
use cwasm_diagnostics::ice;
use cwasm_ir::item::{DefinitionState, IrSymbol, Linkage, SymbolKind};
use cwasm_ir::ty::{IrFunctionTy, IrTy, RecordTable};
use cwasm_ir::IrTranslationUnit;
use cwasm_span::Span;
use std::collections::{BTreeMap, BTreeSet};

/// Where a translation unit comes from.
///
/// The derived ordering places primary units before library units, which keeps the output in a
/// stable source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum UnitRef {
    Primary(usize),
    Library(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Item {
    Function(usize),
    Variable(usize),
}

/// The merged view of one external name across all loaded units.
#[derive(Debug)]
struct External {
    kind: SymbolKind,
    ty: IrTy,
    import: bool,
    definition: Option<Definition>,
}

#[derive(Debug, Clone, Copy)]
struct Definition {
    unit: UnitRef,
    item: Item,
    state: DefinitionState,
}

pub(crate) struct Linker<'a> {
    primary: &'a [IrTranslationUnit],
    libraries: &'a [&'a IrLibrary],
    records: RecordTable,
    externals: BTreeMap<String, External>,
    loaded: BTreeSet<UnitRef>,
    reachable: BTreeSet<(UnitRef, Item)>,
    worklist: Vec<(UnitRef, Item)>,
    imports: BTreeMap<String, IrFunctionTy>,
}

impl<'a> Linker<'a> {
    pub(crate) fn new(primary: &'a [IrTranslationUnit], libraries: &'a [&'a IrLibrary]) -> Self {
        Self {
            primary,
            libraries,
            records: RecordTable::new(),
            externals: BTreeMap::new(),
            loaded: BTreeSet::new(),
            reachable: BTreeSet::new(),
            worklist: Vec::new(),
            imports: BTreeMap::new(),
        }
    }

    pub(crate) fn link(mut self) -> LinkResult<LinkedProgram> {
        for position in 0..self.primary.len() {
            self.load(UnitRef::Primary(position))?;
        }
        let mut exports = Vec::new();
        for (position, unit) in self.primary.iter().enumerate() {
            for (index, function) in unit.functions.iter().enumerate() {
                if function.linkage == Linkage::External {
                    exports.push(function.link_name.clone());
                    self.mark(UnitRef::Primary(position), Item::Function(index));
                }
            }
        }
        while let Some((origin, item)) = self.worklist.pop() {
            let unit = self.unit(origin);
            let references = match item {
                Item::Function(index) => unit.functions[index]
                    .references
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>(),
                Item::Variable(index) => unit.variables[index].references().collect(),
            };
            for name in references {
                self.resolve(origin, name)?;
            }
        }
        Ok(self.finish(exports))
    }

    fn finish(self, exports: Vec<String>) -> LinkedProgram {
        let mut functions = Vec::new();
        let mut variables = Vec::new();
        for (origin, item) in &self.reachable {
            let unit = self.unit(*origin);
            match item {
                Item::Function(index) => functions.push(unit.functions[*index].clone()),
                Item::Variable(index) => variables.push(unit.variables[*index].clone()),
            }
        }
        let imports = self
            .imports
            .into_iter()
            .map(|(name, ty)| LinkedImport { name, ty })
            .collect::<Vec<_>>();
        tracing::debug!(
            functions = functions.len(),
            variables = variables.len(),
            imports = imports.len(),
            exports = exports.len(),
            "linked program"
        );
        LinkedProgram {
            functions,
            variables,
            imports,
            exports,
            records: self.records,
        }
    }

    fn unit(&self, origin: UnitRef) -> &'a IrTranslationUnit {
        match origin {
            UnitRef::Primary(position) => &self.primary[position],
            UnitRef::Library(library, position) => &self.libraries[library].units()[position],
        }
    }

    fn mark(&mut self, origin: UnitRef, item: Item) {
        if self.reachable.insert((origin, item)) {
            self.worklist.push((origin, item));
        }
    }

    /// Register every external symbol and definition of a unit.
    fn load(&mut self, origin: UnitRef) -> LinkResult<()> {
        if !self.loaded.insert(origin) {
            return Ok(());
        }
        let unit = self.unit(origin);
        tracing::trace!(unit = %unit.name, "loading unit");
        self.records.extend(&unit.records);
        for symbol in unit.symbols.values() {
            if symbol.linkage == Linkage::External {
                self.declare(unit, symbol)?;
            }
        }
        for (index, function) in unit.functions.iter().enumerate() {
            if function.linkage == Linkage::External {
                let definition = Definition {
                    unit: origin,
                    item: Item::Function(index),
                    state: DefinitionState::Defined,
                };
                self.define(unit, &function.link_name, definition, function.span)?;
            }
        }
        for (index, variable) in unit.variables.iter().enumerate() {
            if variable.linkage == Linkage::External {
                let definition = Definition {
                    unit: origin,
                    item: Item::Variable(index),
                    state: variable.state,
                };
                self.define(unit, &variable.link_name, definition, variable.span)?;
            }
        }
        Ok(())
    }

    fn declare(&mut self, unit: &IrTranslationUnit, symbol: &IrSymbol) -> LinkResult<()> {
        let Some(existing) = self.externals.get_mut(&symbol.link_name) else {
            self.externals.insert(
                symbol.link_name.clone(),
                External {
                    kind: symbol.kind,
                    ty: symbol.ty.clone(),
                    import: symbol.import,
                    definition: None,
                },
            );
            return Ok(());
        };
        let reason = if existing.kind != symbol.kind {
            Some("declared as both a function and a variable".to_owned())
        } else if !self.records.compatible(&existing.ty, &symbol.ty) {
            Some(format!("'{}' and '{}' are incompatible types", existing.ty, symbol.ty))
        } else if symbol.import && existing.definition.is_some() && symbol.kind == SymbolKind::Function {
            Some("declared as a host import but defined in the program".to_owned())
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(conflict(&symbol.link_name, reason, unit, symbol.span));
        }
        // A declaration with an array length completes an earlier one without.
        if matches!(existing.ty, IrTy::Array(_, None)) {
            existing.ty = symbol.ty.clone();
        }
        existing.import |= symbol.import;
        Ok(())
    }

    fn define(
        &mut self,
        unit: &IrTranslationUnit,
        name: &str,
        definition: Definition,
        span: Span,
    ) -> LinkResult<()> {
        let Some(external) = self.externals.get_mut(name) else {
            ice!("definition of '{}' has no symbol in unit '{}'", name, unit.name);
        };
        if external.import && external.kind == SymbolKind::Function {
            return Err(conflict(
                name,
                "declared as a host import but defined in the program".to_owned(),
                unit,
                span,
            ));
        }
        let Some(previous) = external.definition else {
            external.definition = Some(definition);
            return Ok(());
        };
        // Library units never replace a definition that is already in place.
        if matches!(definition.unit, UnitRef::Library(..)) {
            tracing::trace!(name, unit = %unit.name, "keeping existing definition over library");
            return Ok(());
        }
        use DefinitionState::{Defined, Tentative};
        match (definition.item, previous.state, definition.state) {
            (Item::Function(_), _, _) => Err(conflict(name, "defined more than once".to_owned(), unit, span)),
            (Item::Variable(_), Defined, Defined) => Err(conflict(
                name,
                "initialized more than once".to_owned(),
                unit,
                span,
            )),
            (Item::Variable(_), Tentative, Defined) => {
                external.definition = Some(definition);
                Ok(())
            }
            (Item::Variable(index), Tentative, Tentative) => {
                // Merged tentative definitions take the largest storage of any of them.
                let size = unit.variables[index].data.bytes.len();
                let previous_size = match previous.item {
                    Item::Variable(previous_index) => {
                        self.unit(previous.unit).variables[previous_index].data.bytes.len()
                    }
                    Item::Function(_) => ice!("variable '{}' was defined as a function", name),
                };
                if size > previous_size {
                    if let Some(external) = self.externals.get_mut(name) {
                        external.definition = Some(definition);
                    }
                }
                Ok(())
            }
            (Item::Variable(_), _, _) => Ok(()),
        }
    }

    fn resolve(&mut self, origin: UnitRef, name: &str) -> LinkResult<()> {
        let unit = self.unit(origin);
        let Some(symbol) = unit.symbols.get(name) else {
            ice!("unit '{}' refers to '{}' without declaring it", unit.name, name);
        };
        if symbol.linkage == Linkage::Internal {
            let function = unit.functions.iter().position(|f| f.link_name == name);
            let variable = unit.variables.iter().position(|v| v.link_name == name);
            return match (function, variable) {
                (Some(index), _) => {
                    self.mark(origin, Item::Function(index));
                    Ok(())
                }
                (None, Some(index)) => {
                    self.mark(origin, Item::Variable(index));
                    Ok(())
                }
                (None, None) => Err(unresolved(name, unit, symbol.span)),
            };
        }
        let pending = match self.externals.get(name) {
            Some(external) => external.definition.is_none() && !external.import,
            None => ice!("external '{}' was never declared", name),
        };
        if pending {
            for (position, library) in self.libraries.iter().enumerate() {
                if let Some(index) = library.defining_unit(name) {
                    tracing::debug!(name, library = library.name(), "resolved from library");
                    self.load(UnitRef::Library(position, index))?;
                    break;
                }
            }
        }
        let Some(external) = self.externals.get(name) else {
            ice!("external '{}' disappeared while linking", name);
        };
        let import = match (&external.ty, external.import) {
            (IrTy::Function(ty), true) => Some((**ty).clone()),
            _ => None,
        };
        match (external.definition, import) {
            (Some(definition), _) => {
                self.mark(definition.unit, definition.item);
                Ok(())
            }
            (None, Some(ty)) => {
                self.imports.insert(name.to_owned(), ty);
                Ok(())
            }
            (None, None) => Err(unresolved(name, unit, symbol.span)),
        }
    }
}

fn conflict(name: &str, reason: String, unit: &IrTranslationUnit, span: Span) -> LinkError {
    ConflictingDefinitionError {
        name: name.to_owned(),
        reason,
        unit: unit.name.clone(),
        span,
    }
    .into()
}

fn unresolved(name: &str, unit: &IrTranslationUnit, span: Span) -> LinkError {
    UnresolvedSymbolError {
        name: name.to_owned(),
        unit: unit.name.clone(),
        span,
    }
    .into()
}
