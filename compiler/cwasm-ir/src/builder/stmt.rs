use crate::builder::expr::promote;
use crate::builder::{FunctionState, IrBuilder};
use crate::context::Binding;
use crate::error::{
    BreakOutsideLoopError, ContinueOutsideLoopError, DuplicateCaseError, DuplicateLabelError,
    InvalidInitializerError, IrError, IrResult, MisplacedCaseError, RedeclarationError,
    UndeclaredLabelError, UnsupportedGotoError,
};
use crate::item::{DefinitionState, IrStaticData, SymbolKind};
use crate::stmt::{IrStmt, IrSwitchSection};
use crate::ty::IrTy;
use cwasm_diagnostics::ice;
use cwasm_syntax::{
    AstCompoundStmt, AstDeclaration, AstForInitializer, AstForStmt, AstGotoStmt, AstReturnStmt,
    AstStmt, AstStorageClass, AstSwitchStmt,
};
use std::collections::HashSet;

impl IrBuilder {
    fn state(&mut self) -> &mut FunctionState {
        match self.function.as_mut() {
            Some(state) => state,
            None => ice!("statement built outside of a function"),
        }
    }

    /// Build a compound statement in a new scope.
    pub(super) fn build_compound(&mut self, node: &AstCompoundStmt) -> IrResult<Vec<IrStmt>> {
        self.ordinary.enter_scope();
        self.tags.enter_scope();
        let result = self.build_compound_in_scope(node);
        self.tags.leave_scope();
        self.ordinary.leave_scope();
        result
    }

    /// Build a compound statement in the current scope. A function body shares the scope of
    /// the parameters.
    pub(super) fn build_compound_in_scope(
        &mut self,
        node: &AstCompoundStmt,
    ) -> IrResult<Vec<IrStmt>> {
        let mut labels = HashSet::new();
        top_level_labels(&node.items, &mut labels);
        self.state().label_scopes.push(labels);
        let result = self.build_block_items(&node.items);
        self.state().label_scopes.pop();
        result
    }

    fn build_block_items(&mut self, items: &[AstStmt]) -> IrResult<Vec<IrStmt>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            self.build_block_item(item, &mut out)?;
        }
        Ok(out)
    }

    fn build_block_item(&mut self, node: &AstStmt, out: &mut Vec<IrStmt>) -> IrResult<()> {
        match node {
            AstStmt::Declaration(declaration) => self.visit_local_declaration(declaration, out),
            other => {
                let stmt = self.build_stmt(other)?;
                out.push(stmt);
                Ok(())
            }
        }
    }

    fn build_stmt(&mut self, node: &AstStmt) -> IrResult<IrStmt> {
        match node {
            AstStmt::Compound(c) => Ok(IrStmt::Block(self.build_compound(c)?)),
            AstStmt::Declaration(d) => {
                let mut out = Vec::new();
                self.visit_local_declaration(d, &mut out)?;
                Ok(IrStmt::Block(out))
            }
            AstStmt::Expr(s) => match &s.expr {
                Some(expr) => Ok(IrStmt::Expr(self.build_rvalue(expr)?)),
                None => Ok(IrStmt::Block(vec![])),
            },
            AstStmt::If(s) => {
                let condition = self.build_condition(&s.condition)?;
                let then = Box::new(self.build_stmt(&s.happy_path)?);
                let otherwise = match &s.unhappy_path {
                    Some(stmt) => Some(Box::new(self.build_stmt(stmt)?)),
                    None => None,
                };
                Ok(IrStmt::If {
                    condition,
                    then,
                    otherwise,
                })
            }
            AstStmt::While(s) => {
                let condition = self.build_condition(&s.condition)?;
                let body = Box::new(self.build_loop_body(&s.body)?);
                Ok(IrStmt::While { condition, body })
            }
            AstStmt::DoWhile(s) => {
                let body = Box::new(self.build_loop_body(&s.body)?);
                let condition = self.build_condition(&s.condition)?;
                Ok(IrStmt::DoWhile { body, condition })
            }
            AstStmt::For(s) => {
                self.ordinary.enter_scope();
                self.tags.enter_scope();
                let result = self.visit_for_stmt(s);
                self.tags.leave_scope();
                self.ordinary.leave_scope();
                result
            }
            AstStmt::Switch(s) => self.visit_switch_stmt(s),
            AstStmt::Case(s) => Err(IrError::MisplacedCase(MisplacedCaseError { span: s.span })),
            AstStmt::Default(s) => Err(IrError::MisplacedCase(MisplacedCaseError { span: s.span })),
            AstStmt::Break(s) => match self.state().breakables {
                0 => Err(IrError::BreakOutsideLoop(BreakOutsideLoopError { span: s.span })),
                _ => Ok(IrStmt::Break),
            },
            AstStmt::Continue(s) => match self.state().loops {
                0 => Err(IrError::ContinueOutsideLoop(ContinueOutsideLoopError { span: s.span })),
                _ => Ok(IrStmt::Continue),
            },
            AstStmt::Return(s) => self.visit_return_stmt(s),
            AstStmt::Goto(s) => self.visit_goto_stmt(s),
            AstStmt::Labeled(s) => Ok(IrStmt::Labeled {
                label: s.label.name.clone(),
                body: Box::new(self.build_stmt(&s.body)?),
            }),
        }
    }

    fn build_loop_body(&mut self, node: &AstStmt) -> IrResult<IrStmt> {
        let state = self.state();
        state.loops += 1;
        state.breakables += 1;
        let result = self.build_stmt(node);
        let state = self.state();
        state.loops -= 1;
        state.breakables -= 1;
        result
    }

    fn visit_for_stmt(&mut self, node: &AstForStmt) -> IrResult<IrStmt> {
        let mut init = Vec::new();
        match &node.initializer {
            Some(AstForInitializer::Declaration(d)) => self.visit_local_declaration(d, &mut init)?,
            Some(AstForInitializer::Expr(e)) => init.push(IrStmt::Expr(self.build_rvalue(e)?)),
            None => {}
        }
        let condition = match &node.condition {
            Some(c) => Some(self.build_condition(c)?),
            None => None,
        };
        let update = match &node.increment {
            Some(e) => Some(self.build_rvalue(e)?),
            None => None,
        };
        let body = Box::new(self.build_loop_body(&node.body)?);
        Ok(IrStmt::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn visit_switch_stmt(&mut self, node: &AstSwitchStmt) -> IrResult<IrStmt> {
        let value = self.build_rvalue(&node.value)?;
        if !value.ty.is_integer() {
            return Err(self.type_error("an integer type", &value.ty, "switch", value.span));
        }
        let value = promote(value);
        let items = match node.body.as_ref() {
            AstStmt::Compound(c) => c.items.as_slice(),
            other => std::slice::from_ref(other),
        };
        // Labels inside a switch body are not goto targets: the sections are not blocks.
        self.state().label_scopes.push(HashSet::new());
        self.state().breakables += 1;
        self.ordinary.enter_scope();
        self.tags.enter_scope();
        let sections = self.build_switch_sections(&value.ty, items);
        self.tags.leave_scope();
        self.ordinary.leave_scope();
        self.state().breakables -= 1;
        self.state().label_scopes.pop();
        Ok(IrStmt::Switch {
            value,
            sections: sections?,
        })
    }

    /// Partition a switch body into sections at its top-level case and default labels.
    fn build_switch_sections(
        &mut self,
        ty: &IrTy,
        items: &[AstStmt],
    ) -> IrResult<Vec<IrSwitchSection>> {
        let Some(kind) = ty.integer_kind() else {
            ice!("switch controlling expression is not an integer");
        };
        let mut sections: Vec<IrSwitchSection> = Vec::new();
        let mut values = HashSet::new();
        let mut has_default = false;
        // Statements before the first label are never executed, but their declarations count.
        let mut unreachable = Vec::new();
        for item in items {
            let mut stmt = item;
            loop {
                match stmt {
                    AstStmt::Case(c) => {
                        let value = kind.wrap(self.constant_integer(&c.value)?);
                        if !values.insert(value) {
                            return Err(IrError::DuplicateCase(DuplicateCaseError {
                                value: value.to_string(),
                                span: c.span,
                            }));
                        }
                        sections.push(IrSwitchSection {
                            value: Some(value),
                            body: vec![],
                        });
                        stmt = &c.body;
                    }
                    AstStmt::Default(d) => {
                        if has_default {
                            return Err(IrError::DuplicateCase(DuplicateCaseError {
                                value: "default".to_owned(),
                                span: d.span,
                            }));
                        }
                        has_default = true;
                        sections.push(IrSwitchSection {
                            value: None,
                            body: vec![],
                        });
                        stmt = &d.body;
                    }
                    _ => break,
                }
            }
            match sections.last_mut() {
                Some(section) => self.build_block_item(stmt, &mut section.body)?,
                None => self.build_block_item(stmt, &mut unreachable)?,
            }
        }
        Ok(sections)
    }

    fn visit_return_stmt(&mut self, node: &AstReturnStmt) -> IrResult<IrStmt> {
        let return_type = self.state().return_type.clone();
        let Some(value) = &node.value else {
            if return_type.is_void() {
                return Ok(IrStmt::Return(None));
            }
            return Err(self.type_error(&self.describe(&return_type), &IrTy::Void, "return statement", node.span));
        };
        let value = self.build_rvalue(value)?;
        if return_type.is_void() {
            if value.ty.is_void() {
                return Ok(IrStmt::Block(vec![IrStmt::Expr(value), IrStmt::Return(None)]));
            }
            return Err(self.type_error("void", &value.ty, "return statement", value.span));
        }
        let value = self.convert_for_assignment(value, &return_type, "return statement")?;
        Ok(IrStmt::Return(Some(value)))
    }

    fn visit_goto_stmt(&mut self, node: &AstGotoStmt) -> IrResult<IrStmt> {
        let label = &node.label.name;
        let state = self.state();
        if !state.labels.contains(label) {
            return Err(IrError::UndeclaredLabel(UndeclaredLabelError {
                label: label.clone(),
                span: node.label.span,
            }));
        }
        if !state.label_scopes.iter().any(|scope| scope.contains(label)) {
            return Err(IrError::UnsupportedGoto(UnsupportedGotoError {
                label: label.clone(),
                span: node.span,
            }));
        }
        Ok(IrStmt::Goto {
            label: label.clone(),
            span: node.span,
        })
    }

    /// Declarations inside a function body.
    pub(super) fn visit_local_declaration(
        &mut self,
        node: &AstDeclaration,
        out: &mut Vec<IrStmt>,
    ) -> IrResult<()> {
        let base = self.resolve_type_specifier(&node.specifiers.ty)?;
        let storage = node.specifiers.storage;
        for declarator in &node.declarators {
            let mut ty = self.apply_declarator(base.clone(), &declarator.declarator)?;
            let Some(name) = &declarator.declarator.name else {
                continue;
            };
            let linked = ty.is_function()
                || matches!(storage, Some(AstStorageClass::Extern | AstStorageClass::Import));
            match storage {
                Some(AstStorageClass::Typedef) => {
                    self.bind_unlinked(&name.name, Binding::Typedef(ty), name.span)?;
                }
                _ if linked => {
                    if matches!(self.ordinary.find_local(&name.name), Some(Binding::Local(_))) {
                        return Err(IrError::Redeclaration(RedeclarationError {
                            name: name.name.clone(),
                            span: name.span,
                        }));
                    }
                    if declarator.initializer.is_some() {
                        return Err(IrError::InvalidInitializer(InvalidInitializerError {
                            message: format!("block-scope declaration of '{}' with linkage cannot be initialized", name.name),
                            span: declarator.span,
                        }));
                    }
                    let kind = match ty.is_function() {
                        true => SymbolKind::Function,
                        false => SymbolKind::Variable,
                    };
                    let storage = match storage {
                        Some(AstStorageClass::Import) => storage,
                        _ => Some(AstStorageClass::Extern),
                    };
                    self.declare_global(&name.name, ty, kind, storage, DefinitionState::Declared, name.span)?;
                }
                Some(AstStorageClass::Static) => {
                    let state = self.state();
                    let link_name = format!("{}.{}.{}", state.name, name.name, state.statics);
                    state.statics += 1;
                    let link_name = format!("{link_name}@{}", self.unit);
                    let data = match &declarator.initializer {
                        Some(initializer) => self.build_static_data(&mut ty, initializer)?,
                        None if ty.is_complete(&self.records) => IrStaticData::zeroed(ty.size(&self.records)),
                        None => return Err(self.incomplete(&ty, declarator.span)),
                    };
                    self.define_internal_variable(link_name.clone(), ty.clone(), data, declarator.span);
                    self.bind_unlinked(&name.name, Binding::Global { link_name, ty }, name.span)?;
                }
                _ => {
                    if ty.is_void() {
                        return Err(self.incomplete(&ty, declarator.span));
                    }
                    // The name is in scope in its own initializer.
                    let local = self.new_local(&name.name, ty.clone());
                    self.bind_unlinked(&name.name, Binding::Local(local), name.span)?;
                    let init = match &declarator.initializer {
                        Some(initializer) => {
                            let prepared = self.prepare(initializer)?;
                            Some(self.build_local_init(&mut ty, prepared, declarator.span)?)
                        }
                        None => None,
                    };
                    if !ty.is_complete(&self.records) {
                        return Err(self.incomplete(&ty, declarator.span));
                    }
                    self.local_mut(local).ty = ty;
                    out.push(IrStmt::Declare { local, init });
                }
            }
        }
        Ok(())
    }
}

/// Collect every label of a function body, rejecting duplicates.
pub(super) fn collect_labels(items: &[AstStmt], labels: &mut HashSet<String>) -> IrResult<()> {
    for item in items {
        collect_stmt_labels(item, labels)?;
    }
    Ok(())
}

fn collect_stmt_labels(node: &AstStmt, labels: &mut HashSet<String>) -> IrResult<()> {
    match node {
        AstStmt::Compound(c) => collect_labels(&c.items, labels),
        AstStmt::If(s) => {
            collect_stmt_labels(&s.happy_path, labels)?;
            match &s.unhappy_path {
                Some(stmt) => collect_stmt_labels(stmt, labels),
                None => Ok(()),
            }
        }
        AstStmt::While(s) => collect_stmt_labels(&s.body, labels),
        AstStmt::DoWhile(s) => collect_stmt_labels(&s.body, labels),
        AstStmt::For(s) => collect_stmt_labels(&s.body, labels),
        AstStmt::Switch(s) => collect_stmt_labels(&s.body, labels),
        AstStmt::Case(s) => collect_stmt_labels(&s.body, labels),
        AstStmt::Default(s) => collect_stmt_labels(&s.body, labels),
        AstStmt::Labeled(s) => {
            if !labels.insert(s.label.name.clone()) {
                return Err(IrError::DuplicateLabel(DuplicateLabelError {
                    label: s.label.name.clone(),
                    span: s.label.span,
                }));
            }
            collect_stmt_labels(&s.body, labels)
        }
        _ => Ok(()),
    }
}

/// Labels directly inside a compound statement, including chained ones like `a: b: x;`.
fn top_level_labels(items: &[AstStmt], labels: &mut HashSet<String>) {
    for item in items {
        let mut stmt = item;
        while let AstStmt::Labeled(labeled) = stmt {
            labels.insert(labeled.label.name.clone());
            stmt = &labeled.body;
        }
    }
}
