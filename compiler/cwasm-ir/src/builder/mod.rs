//! Translation of the syntax tree into the typed IR.
//!
//! The builder resolves every type, checks operand types, applies the C conversion rules, folds
//! constant expressions and lays out static data. It works on one translation unit at a time.

mod expr;
mod init;
mod stmt;
mod types;

use crate::context::{Binding, ScopedContext, Tag};
use crate::error::{
    IncompleteTypeError, InvalidInitializerError, IrError, IrResult, RedeclarationError,
    UndeclaredIdentifierError,
};
use crate::item::{
    DefinitionState, IrFunction, IrLocal, IrStaticData, IrSymbol, IrVariable, Linkage, LocalId,
    SymbolKind,
};
use crate::stmt::IrStmt;
use crate::ty::{IrFunctionTy, IrTy, RecordTable};
use crate::IrTranslationUnit;
use cwasm_diagnostics::ice;
use cwasm_span::Span;
use cwasm_syntax::{
    AstDeclaration, AstDerivedType, AstFunctionDefinition, AstItem, AstStorageClass,
    AstTranslationUnit,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Per-function state while building a function body.
struct FunctionState {
    name: String,
    return_type: IrTy,
    variadic: bool,
    locals: Vec<IrLocal>,
    references: BTreeSet<String>,
    /// Every label defined in the function.
    labels: HashSet<String>,
    /// Labels at the top level of each enclosing compound statement, innermost last.
    label_scopes: Vec<HashSet<String>>,
    loops: usize,
    breakables: usize,
    statics: usize,
}

pub struct IrBuilder {
    unit: String,
    records: RecordTable,
    ordinary: ScopedContext<Binding>,
    tags: ScopedContext<Tag>,
    /// File-scope names with linkage, mapped to their link names.
    linked_names: BTreeMap<String, String>,
    symbols: BTreeMap<String, IrSymbol>,
    functions: Vec<IrFunction>,
    variables: BTreeMap<String, IrVariable>,
    strings: usize,
    function: Option<FunctionState>,
}

impl IrBuilder {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_owned(),
            records: RecordTable::new(),
            ordinary: ScopedContext::new(),
            tags: ScopedContext::new(),
            linked_names: BTreeMap::new(),
            symbols: BTreeMap::new(),
            functions: Vec::new(),
            variables: BTreeMap::new(),
            strings: 0,
            function: None,
        }
    }

    /// Build the IR of a whole translation unit.
    pub fn build(mut self, unit: &AstTranslationUnit) -> IrResult<IrTranslationUnit> {
        for item in &unit.items {
            match item {
                AstItem::Function(f) => self.visit_function_definition(f)?,
                AstItem::Declaration(d) => self.visit_file_declaration(d)?,
            }
        }
        Ok(self.finish())
    }

    fn finish(mut self) -> IrTranslationUnit {
        // Tentative definitions are zero-initialized with the final (completed) type. A
        // tentative array without a length gets one element.
        for variable in self.variables.values_mut() {
            if variable.state != DefinitionState::Tentative {
                continue;
            }
            if let IrTy::Array(element, None) = &variable.ty {
                variable.ty = IrTy::Array(element.clone(), Some(1));
            }
            variable.data = IrStaticData::zeroed(variable.ty.size(&self.records));
        }
        for (link_name, variable) in &self.variables {
            if let Some(symbol) = self.symbols.get_mut(link_name) {
                symbol.ty = variable.ty.clone();
            }
        }
        tracing::debug!(
            unit = self.unit,
            functions = self.functions.len(),
            variables = self.variables.len(),
            "built translation unit"
        );
        IrTranslationUnit {
            name: self.unit,
            symbols: self.symbols,
            functions: self.functions,
            variables: self.variables.into_values().collect(),
            records: self.records,
        }
    }

    fn visit_file_declaration(&mut self, node: &AstDeclaration) -> IrResult<()> {
        let base = self.resolve_type_specifier(&node.specifiers.ty)?;
        let storage = node.specifiers.storage;
        for declarator in &node.declarators {
            let ty = self.apply_declarator(base.clone(), &declarator.declarator)?;
            let Some(name) = &declarator.declarator.name else {
                continue;
            };
            if storage == Some(AstStorageClass::Typedef) {
                self.ordinary.add(&name.name, Binding::Typedef(ty));
                continue;
            }
            if ty.is_function() {
                if declarator.initializer.is_some() {
                    return Err(IrError::InvalidInitializer(InvalidInitializerError {
                        message: format!("function '{}' cannot be initialized", name.name),
                        span: declarator.span,
                    }));
                }
                self.declare_global(
                    &name.name,
                    ty,
                    SymbolKind::Function,
                    storage,
                    DefinitionState::Declared,
                    name.span,
                )?;
                continue;
            }
            let state = match (storage, &declarator.initializer) {
                (_, Some(_)) => DefinitionState::Defined,
                (Some(AstStorageClass::Extern), None) => DefinitionState::Declared,
                (_, None) => DefinitionState::Tentative,
            };
            let (link_name, mut ty) = self.declare_global(
                &name.name,
                ty,
                SymbolKind::Variable,
                storage,
                state,
                name.span,
            )?;
            let linkage = self.symbol_linkage(&link_name);
            match &declarator.initializer {
                Some(initializer) => {
                    let data = self.build_static_data(&mut ty, initializer)?;
                    self.update_symbol_type(&link_name, &ty);
                    self.variables.insert(
                        link_name.clone(),
                        IrVariable {
                            link_name,
                            ty,
                            linkage,
                            state: DefinitionState::Defined,
                            data,
                            span: declarator.span,
                        },
                    );
                }
                None if state == DefinitionState::Tentative => {
                    if let Some(existing) = self.variables.get_mut(&link_name) {
                        if existing.state == DefinitionState::Tentative {
                            existing.ty = ty;
                        }
                        continue;
                    }
                    self.variables.insert(
                        link_name.clone(),
                        IrVariable {
                            link_name,
                            ty,
                            linkage,
                            state,
                            data: IrStaticData::default(),
                            span: declarator.span,
                        },
                    );
                }
                None => {}
            }
        }
        Ok(())
    }

    fn visit_function_definition(&mut self, node: &AstFunctionDefinition) -> IrResult<()> {
        let base = self.resolve_type_specifier(&node.specifiers.ty)?;
        let ty = self.apply_declarator(base, &node.declarator)?;
        let (Some(name), Some(function_ty)) = (&node.declarator.name, ty.function().cloned())
        else {
            ice!("function definition without a function declarator");
        };
        let Some(AstDerivedType::Function(parameter_list)) = node.declarator.derived.first() else {
            ice!("function definition without a parameter list");
        };
        if function_ty.return_type.is_record()
            && !function_ty.return_type.is_complete(&self.records)
        {
            return Err(self.incomplete(&function_ty.return_type, node.declarator.span));
        }
        let (link_name, _) = self.declare_global(
            &name.name,
            ty.clone(),
            SymbolKind::Function,
            node.specifiers.storage,
            DefinitionState::Defined,
            name.span,
        )?;
        let linkage = self.symbol_linkage(&link_name);
        tracing::trace!(function = name.name, link_name, "building function");

        let mut labels = HashSet::new();
        stmt::collect_labels(&node.body.items, &mut labels)?;
        self.function = Some(FunctionState {
            name: name.name.clone(),
            return_type: function_ty.return_type.clone(),
            variadic: function_ty.variadic,
            locals: Vec::new(),
            references: BTreeSet::new(),
            labels,
            label_scopes: Vec::new(),
            loops: 0,
            breakables: 0,
            statics: 0,
        });

        self.ordinary.enter_scope();
        self.tags.enter_scope();
        let result = self.build_function_body(node, parameter_list, &function_ty);
        self.tags.leave_scope();
        self.ordinary.leave_scope();
        let (parameters, body) = result?;

        let Some(state) = self.function.take() else {
            ice!("function state disappeared while building a body");
        };
        self.functions.push(IrFunction {
            link_name,
            ty: function_ty,
            linkage,
            parameters,
            locals: state.locals,
            body,
            references: state.references,
            span: node.span,
        });
        Ok(())
    }

    fn build_function_body(
        &mut self,
        node: &AstFunctionDefinition,
        parameter_list: &cwasm_syntax::AstParameterList,
        function_ty: &IrFunctionTy,
    ) -> IrResult<(Vec<LocalId>, Vec<IrStmt>)> {
        let mut parameters = Vec::with_capacity(function_ty.parameters.len());
        for (parameter, ty) in parameter_list.parameters.iter().zip(&function_ty.parameters) {
            if ty.is_record() && !ty.is_complete(&self.records) {
                return Err(self.incomplete(ty, parameter.span));
            }
            let name = parameter
                .declarator
                .name
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_default();
            let local = self.new_local(&name, ty.clone());
            if !name.is_empty() {
                self.bind_unlinked(&name, Binding::Local(local), parameter.span)?;
            }
            parameters.push(local);
        }
        let body = self.build_compound_in_scope(&node.body)?;
        Ok((parameters, body))
    }

    /// Bind a name without linkage. Such a name can be declared only once per scope.
    fn bind_unlinked(&mut self, name: &str, binding: Binding, span: Span) -> IrResult<()> {
        if self.ordinary.find_local(name).is_some() {
            return Err(IrError::Redeclaration(RedeclarationError {
                name: name.to_owned(),
                span,
            }));
        }
        self.ordinary.add(name, binding);
        Ok(())
    }

    /// Declare or redeclare a name with linkage at file scope (also used for block-scope
    /// `extern` declarations), binding it in the current scope.
    ///
    /// Returns the link name and the composite type of all declarations so far.
    fn declare_global(
        &mut self,
        name: &str,
        ty: IrTy,
        kind: SymbolKind,
        storage: Option<AstStorageClass>,
        state: DefinitionState,
        span: Span,
    ) -> IrResult<(String, IrTy)> {
        let redeclaration = || {
            IrError::Redeclaration(RedeclarationError {
                name: name.to_owned(),
                span,
            })
        };
        let previous = self
            .linked_names
            .get(name)
            .and_then(|link_name| self.symbols.get(link_name))
            .cloned();
        let (link_name, symbol) = match previous {
            Some(mut symbol) => {
                if symbol.kind != kind || !self.records.compatible(&symbol.ty, &ty) {
                    return Err(redeclaration());
                }
                let explicit_static = storage == Some(AstStorageClass::Static);
                let implicit_external = storage.is_none() && kind == SymbolKind::Variable;
                match symbol.linkage {
                    Linkage::External if explicit_static => return Err(redeclaration()),
                    Linkage::Internal if implicit_external => return Err(redeclaration()),
                    _ => {}
                }
                if symbol.state == DefinitionState::Defined && state == DefinitionState::Defined {
                    return Err(redeclaration());
                }
                symbol.ty = composite_type(&symbol.ty, &ty);
                symbol.state = symbol.state.max(state);
                symbol.import |= storage == Some(AstStorageClass::Import);
                (symbol.link_name.clone(), symbol)
            }
            None => {
                let linkage = match storage {
                    Some(AstStorageClass::Static) => Linkage::Internal,
                    _ => Linkage::External,
                };
                let link_name = match linkage {
                    Linkage::Internal => format!("{name}@{}", self.unit),
                    Linkage::External => name.to_owned(),
                };
                let symbol = IrSymbol {
                    link_name: link_name.clone(),
                    ty,
                    kind,
                    linkage,
                    state,
                    import: storage == Some(AstStorageClass::Import),
                    span,
                };
                self.linked_names.insert(name.to_owned(), link_name.clone());
                (link_name, symbol)
            }
        };
        if symbol.import && (kind != SymbolKind::Function || symbol.state == DefinitionState::Defined)
        {
            return Err(redeclaration());
        }
        let ty = symbol.ty.clone();
        self.symbols.insert(link_name.clone(), symbol);
        self.ordinary.add(
            name,
            Binding::Global {
                link_name: link_name.clone(),
                ty: ty.clone(),
            },
        );
        Ok((link_name, ty))
    }

    fn symbol_linkage(&self, link_name: &str) -> Linkage {
        self.symbols
            .get(link_name)
            .map_or(Linkage::External, |s| s.linkage)
    }

    fn update_symbol_type(&mut self, link_name: &str, ty: &IrTy) {
        if let Some(symbol) = self.symbols.get_mut(link_name) {
            symbol.ty = ty.clone();
        }
        if let Some(name) = self
            .linked_names
            .iter()
            .find(|(_, l)| l.as_str() == link_name)
            .map(|(n, _)| n.clone())
        {
            if let Some(Binding::Global { link_name, .. }) = self.ordinary.find(&name).cloned() {
                self.ordinary.add(
                    &name,
                    Binding::Global {
                        link_name,
                        ty: ty.clone(),
                    },
                );
            }
        }
    }

    /// Define an internal static object, used for string literals and block-scope statics.
    fn define_internal_variable(
        &mut self,
        link_name: String,
        ty: IrTy,
        data: IrStaticData,
        span: Span,
    ) {
        self.symbols.insert(
            link_name.clone(),
            IrSymbol {
                link_name: link_name.clone(),
                ty: ty.clone(),
                kind: SymbolKind::Variable,
                linkage: Linkage::Internal,
                state: DefinitionState::Defined,
                import: false,
                span,
            },
        );
        self.variables.insert(
            link_name.clone(),
            IrVariable {
                link_name,
                ty,
                linkage: Linkage::Internal,
                state: DefinitionState::Defined,
                data,
                span,
            },
        );
    }

    /// Create an anonymous `char` array holding a string literal and its terminating zero.
    fn intern_string(&mut self, mut bytes: Vec<u8>, span: Span) -> (String, IrTy) {
        bytes.push(0);
        self.intern_bytes(bytes, span)
    }

    /// Create an anonymous `char` array holding exactly `bytes`, returning its link name.
    fn intern_bytes(&mut self, bytes: Vec<u8>, span: Span) -> (String, IrTy) {
        let link_name = format!("str.{}@{}", self.strings, self.unit);
        self.strings += 1;
        let ty = IrTy::Array(Box::new(IrTy::CHAR), Some(bytes.len() as u32));
        let data = IrStaticData {
            bytes,
            relocations: vec![],
        };
        self.define_internal_variable(link_name.clone(), ty.clone(), data, span);
        (link_name, ty)
    }

    fn new_local(&mut self, name: &str, ty: IrTy) -> LocalId {
        let Some(function) = self.function.as_mut() else {
            ice!("local '{}' created outside of a function", name);
        };
        let escapes = ty.is_aggregate();
        let id = LocalId(function.locals.len() as u32);
        function.locals.push(IrLocal {
            name: name.to_owned(),
            ty,
            escapes,
        });
        id
    }

    fn local(&self, id: LocalId) -> &IrLocal {
        match self.function.as_ref() {
            Some(function) => &function.locals[id.0 as usize],
            None => ice!("local {} used outside of a function", id.0),
        }
    }

    fn local_mut(&mut self, id: LocalId) -> &mut IrLocal {
        match self.function.as_mut() {
            Some(function) => &mut function.locals[id.0 as usize],
            None => ice!("local {} used outside of a function", id.0),
        }
    }

    /// Record that the current function refers to a global symbol.
    fn reference(&mut self, link_name: &str) {
        if let Some(function) = self.function.as_mut() {
            function.references.insert(link_name.to_owned());
        }
    }

    fn incomplete(&self, ty: &IrTy, span: Span) -> IrError {
        IrError::IncompleteType(IncompleteTypeError {
            ty: self.describe(ty),
            span,
        })
    }

    fn undeclared(&self, name: &str, span: Span) -> IrError {
        IrError::UndeclaredIdentifier(UndeclaredIdentifierError {
            name: name.to_owned(),
            span,
        })
    }

    /// Render a type for diagnostics, naming records by their tag.
    fn describe(&self, ty: &IrTy) -> String {
        match ty {
            IrTy::Record(id) => match self.records.get(*id) {
                Some(record) => {
                    let keyword = match record.kind {
                        crate::ty::IrRecordKind::Struct => "struct",
                        crate::ty::IrRecordKind::Union => "union",
                    };
                    match &record.name {
                        Some(name) => format!("{keyword} {name}"),
                        None => format!("{keyword} <anonymous>"),
                    }
                }
                None => ty.to_string(),
            },
            IrTy::Pointer(inner) => format!("{} *", self.describe(inner)),
            IrTy::Array(element, Some(n)) => format!("{}[{n}]", self.describe(element)),
            IrTy::Array(element, None) => format!("{}[]", self.describe(element)),
            other => other.to_string(),
        }
    }
}

/// Merge the information of two compatible declarations of the same name.
fn composite_type(previous: &IrTy, current: &IrTy) -> IrTy {
    match (previous, current) {
        (IrTy::Array(element, None), IrTy::Array(_, Some(n))) => {
            IrTy::Array(element.clone(), Some(*n))
        }
        (IrTy::Function(old), IrTy::Function(new)) if !old.prototype && new.prototype => {
            current.clone()
        }
        _ => previous.clone(),
    }
}
