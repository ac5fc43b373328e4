use crate::abi::{store, val_type};
use crate::error::CodegenResult;
use crate::frame::Storage;
use crate::function::{FunctionGenerator, Label};
use cwasm_diagnostics::ice;
use cwasm_ir::expr::{IrExpr, IrExprKind};
use cwasm_ir::item::LocalId;
use cwasm_ir::stmt::{IrLocalInit, IrStmt, IrSwitchSection};
use cwasm_wasm::instr::{BinaryOp, CompareOp, Instr};
use cwasm_wasm::{BlockType, ValType};
use std::collections::HashSet;

/// Every label named by a `goto` in `body`.
pub(super) fn collect_goto_labels(body: &[IrStmt], labels: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            IrStmt::Goto { label, .. } => {
                labels.insert(label.clone());
            }
            IrStmt::Block(body) => collect_goto_labels(body, labels),
            IrStmt::If {
                then, otherwise, ..
            } => {
                collect_goto_labels(std::slice::from_ref(then), labels);
                if let Some(otherwise) = otherwise {
                    collect_goto_labels(std::slice::from_ref(otherwise), labels);
                }
            }
            IrStmt::While { body, .. }
            | IrStmt::DoWhile { body, .. }
            | IrStmt::Labeled { body, .. } => {
                collect_goto_labels(std::slice::from_ref(body), labels)
            }
            IrStmt::For { init, body, .. } => {
                collect_goto_labels(init, labels);
                collect_goto_labels(std::slice::from_ref(body), labels);
            }
            IrStmt::Switch { sections, .. } => {
                for section in sections {
                    collect_goto_labels(&section.body, labels);
                }
            }
            IrStmt::Expr(_)
            | IrStmt::Declare { .. }
            | IrStmt::Break
            | IrStmt::Continue
            | IrStmt::Return(_) => {}
        }
    }
}

/// The labels of a chain of labeled statements.
fn chain_labels(mut stmt: &IrStmt) -> Vec<&str> {
    let mut labels = Vec::new();
    while let IrStmt::Labeled { label, body } = stmt {
        labels.push(label.as_str());
        stmt = body;
    }
    labels
}

impl FunctionGenerator<'_> {
    fn goto_positions(&self, body: &[IrStmt]) -> Vec<usize> {
        body.iter()
            .enumerate()
            .filter(|(_, stmt)| {
                chain_labels(stmt)
                    .iter()
                    .any(|label| self.goto_labels.contains(*label))
            })
            .map(|(index, _)| index)
            .collect()
    }

    pub(super) fn needs_dispatcher(&self, body: &[IrStmt]) -> bool {
        !self.goto_positions(body).is_empty()
    }

    /// A statement list. When some of its statements are goto targets, the list is cut into
    /// segments at those statements and run inside a dispatch loop: a `br_table` on a selector
    /// local picks the segment to start at, and each segment falls through into the next.
    ///
    /// ```text
    /// loop
    ///   block ;; segment n
    ///     ...
    ///       block ;; segment 0
    ///         local.get $selector
    ///         br_table 0 1 .. n
    ///       end
    ///       segment 0 statements
    ///     ...
    ///   end
    ///   segment n statements
    /// end
    /// ```
    pub(super) fn compound(&mut self, body: &[IrStmt], out: &mut Vec<Instr>) -> CodegenResult<()> {
        let positions = self.goto_positions(body);
        if positions.is_empty() {
            for stmt in body {
                self.stmt(stmt, out)?;
            }
            return Ok(());
        }

        let id = self.dispatchers.len();
        let selector = self.temp(ValType::I32);
        self.dispatchers.push(selector);
        for (segment, position) in positions.iter().enumerate() {
            for label in chain_labels(&body[*position]) {
                self.goto_targets
                    .insert(label.to_owned(), (id, segment as u32 + 1));
            }
        }

        let segment_count = positions.len() + 1;
        let mut bounds = Vec::with_capacity(segment_count + 1);
        bounds.push(0);
        bounds.extend(positions.iter().copied());
        bounds.push(body.len());

        self.labels.push(Label::Dispatcher(id));
        let mut segments = Vec::with_capacity(segment_count);
        for segment in 0..segment_count {
            let outer = segment_count - 1 - segment;
            self.labels.extend(std::iter::repeat_n(Label::Plain, outer));
            let mut code = Vec::new();
            for stmt in &body[bounds[segment]..bounds[segment + 1]] {
                self.stmt(stmt, &mut code)?;
            }
            self.labels.truncate(self.labels.len() - outer);
            segments.push(code);
        }
        self.labels.pop();

        let mut nest = vec![
            Instr::LocalGet(selector),
            Instr::BrTable {
                targets: (0..segment_count as u32).collect(),
                default: segment_count as u32 - 1,
            },
        ];
        for code in segments {
            let mut body = vec![Instr::Block {
                ty: BlockType::Empty,
                body: nest,
            }];
            body.extend(code);
            nest = body;
        }
        out.extend([Instr::I32Const(0), Instr::LocalSet(selector)]);
        out.push(Instr::Loop {
            ty: BlockType::Empty,
            body: nest,
        });
        Ok(())
    }

    pub(super) fn stmt(&mut self, stmt: &IrStmt, out: &mut Vec<Instr>) -> CodegenResult<()> {
        match stmt {
            IrStmt::Expr(e) => self.discard(e, out),
            IrStmt::Declare { local, init } => match init {
                Some(init) => self.initialize(*local, init, out),
                None => Ok(()),
            },
            IrStmt::Block(body) => self.compound(body, out),
            IrStmt::If {
                condition,
                then,
                otherwise,
            } => {
                self.condition(condition, out)?;
                self.labels.push(Label::Plain);
                let mut then_body = Vec::new();
                self.stmt(then, &mut then_body)?;
                let mut otherwise_body = Vec::new();
                if let Some(otherwise) = otherwise {
                    self.stmt(otherwise, &mut otherwise_body)?;
                }
                self.labels.pop();
                out.push(Instr::If {
                    ty: BlockType::Empty,
                    then: then_body,
                    otherwise: otherwise_body,
                });
                Ok(())
            }
            IrStmt::While { condition, body } => {
                self.labels.extend([Label::Break, Label::Continue]);
                let mut code = Vec::new();
                self.exit_unless(Some(condition), 1, &mut code)?;
                self.stmt(body, &mut code)?;
                code.push(Instr::Br(0));
                self.labels.truncate(self.labels.len() - 2);
                out.push(block(vec![Instr::Loop {
                    ty: BlockType::Empty,
                    body: code,
                }]));
                Ok(())
            }
            IrStmt::DoWhile { body, condition } => {
                self.labels
                    .extend([Label::Break, Label::Plain, Label::Continue]);
                let mut code = Vec::new();
                self.stmt(body, &mut code)?;
                self.labels.pop();
                let mut code = vec![block(code)];
                self.condition(condition, &mut code)?;
                code.push(Instr::BrIf(0));
                self.labels.truncate(self.labels.len() - 2);
                out.push(block(vec![Instr::Loop {
                    ty: BlockType::Empty,
                    body: code,
                }]));
                Ok(())
            }
            IrStmt::For {
                init,
                condition,
                update,
                body,
            } => {
                for stmt in init {
                    self.stmt(stmt, out)?;
                }
                self.labels
                    .extend([Label::Break, Label::Plain, Label::Continue]);
                let mut code = Vec::new();
                self.stmt(body, &mut code)?;
                self.labels.pop();
                let mut looped = Vec::new();
                self.exit_unless(condition.as_ref(), 1, &mut looped)?;
                looped.push(block(code));
                if let Some(update) = update {
                    self.discard(update, &mut looped)?;
                }
                looped.push(Instr::Br(0));
                self.labels.truncate(self.labels.len() - 2);
                out.push(block(vec![Instr::Loop {
                    ty: BlockType::Empty,
                    body: looped,
                }]));
                Ok(())
            }
            IrStmt::Switch { value, sections } => self.switch(value, sections, out),
            IrStmt::Break => {
                out.push(Instr::Br(self.depth(Label::Break)));
                Ok(())
            }
            IrStmt::Continue => {
                out.push(Instr::Br(self.depth(Label::Continue)));
                Ok(())
            }
            IrStmt::Return(value) => {
                self.return_value(value.as_ref(), out)?;
                out.push(Instr::Return);
                Ok(())
            }
            IrStmt::Labeled { body, .. } => self.stmt(body, out),
            IrStmt::Goto { label, .. } => {
                let Some((id, segment)) = self.goto_targets.get(label).copied() else {
                    ice!("goto target '{}' is not in an enclosing block", label)
                };
                out.push(Instr::I32Const(segment as i32));
                out.push(Instr::LocalSet(self.dispatchers[id]));
                out.push(Instr::Br(self.depth(Label::Dispatcher(id))));
                Ok(())
            }
        }
    }

    /// Branch to `depth` when `condition` is false. A missing or constant true condition never
    /// branches.
    fn exit_unless(
        &mut self,
        condition: Option<&IrExpr>,
        depth: u32,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        let Some(condition) = condition else {
            return Ok(());
        };
        if matches!(condition.kind, IrExprKind::IntConst(v) if v != 0) {
            return Ok(());
        }
        self.condition(condition, out)?;
        out.push(Instr::Eqz(ValType::I32));
        out.push(Instr::BrIf(depth));
        Ok(())
    }

    /// Sections become nested blocks, the first section innermost. The dispatch code at the
    /// core compares the value against each case in turn, and the body of a section sits right
    /// after its block ends, so control falls through into the next section.
    fn switch(
        &mut self,
        value: &IrExpr,
        sections: &[IrSwitchSection],
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        if sections.is_empty() {
            return self.discard(value, out);
        }
        let count = sections.len() as u32;
        let ty = val_type(&value.ty).unwrap_or(ValType::I32);
        let scrutinee = self.temp(ty);

        let mut dispatch = Vec::new();
        self.expr(value, &mut dispatch)?;
        dispatch.push(Instr::LocalSet(scrutinee));
        for (index, section) in sections.iter().enumerate() {
            let Some(case) = section.value else {
                continue;
            };
            dispatch.push(Instr::LocalGet(scrutinee));
            dispatch.push(match ty {
                ValType::I64 => Instr::I64Const(case),
                _ => Instr::I32Const(case as i32),
            });
            dispatch.push(Instr::Compare(ty, CompareOp::Eq));
            dispatch.push(Instr::BrIf(index as u32));
        }
        let fallback = sections
            .iter()
            .position(|s| s.value.is_none())
            .map(|i| i as u32)
            .unwrap_or(count);
        dispatch.push(Instr::Br(fallback));

        self.labels.push(Label::Break);
        let mut nest = dispatch;
        for (index, section) in sections.iter().enumerate() {
            let outer = count as usize - 1 - index;
            self.labels.extend(std::iter::repeat_n(Label::Plain, outer));
            let mut body = vec![block(nest)];
            for stmt in &section.body {
                self.stmt(stmt, &mut body)?;
            }
            self.labels.truncate(self.labels.len() - outer);
            nest = body;
        }
        self.labels.pop();
        out.push(block(nest));
        Ok(())
    }

    /// Run the initializer of a local at its point of declaration.
    pub(super) fn initialize(
        &mut self,
        local: LocalId,
        init: &IrLocalInit,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        let ty = self.function.local(local).ty.clone();
        match (self.frame.storage(local), init) {
            (Storage::Wasm(index), IrLocalInit::Expr(value)) => {
                self.expr(value, out)?;
                out.push(Instr::LocalSet(index));
            }
            (Storage::Wasm(index), IrLocalInit::Aggregate(stores)) => {
                let zero = val_type(&ty).unwrap_or(ValType::I32).zero();
                out.push(Instr::constant(zero));
                out.push(Instr::LocalSet(index));
                for store in stores {
                    self.expr(&store.value, out)?;
                    out.push(Instr::LocalSet(index));
                }
            }
            (Storage::Frame(_), IrLocalInit::Expr(value)) => {
                self.local_address(local, out);
                self.store_value(&ty, value, out)?;
            }
            (Storage::Frame(_), IrLocalInit::Aggregate(stores)) => {
                self.local_address(local, out);
                out.push(Instr::I32Const(0));
                out.push(Instr::I32Const(self.size_of(&ty) as i32));
                out.push(Instr::MemoryFill);
                for store in stores {
                    self.local_address(local, out);
                    if store.offset != 0 {
                        out.push(Instr::I32Const(store.offset as i32));
                        out.push(Instr::Binary(ValType::I32, BinaryOp::Add));
                    }
                    self.store_value(&store.value.ty, &store.value, out)?;
                }
            }
        }
        Ok(())
    }

    /// With a destination address on the stack, store `value` of type `ty` there. Aggregates
    /// are copied.
    fn store_value(
        &mut self,
        ty: &cwasm_ir::ty::IrTy,
        value: &IrExpr,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        self.expr(value, out)?;
        match ty.is_aggregate() {
            true => {
                out.push(Instr::I32Const(self.size_of(ty) as i32));
                out.push(Instr::MemoryCopy);
            }
            false => {
                let (kind, arg) = store(ty);
                out.push(Instr::Store(kind, arg));
            }
        }
        Ok(())
    }

    /// Leave the return value where the caller expects it: on the stack, or copied through the
    /// hidden destination pointer for a struct or union.
    pub(super) fn return_value(
        &mut self,
        value: Option<&IrExpr>,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        let Some(value) = value else {
            return Ok(());
        };
        match self.frame.result_pointer {
            Some(pointer) => {
                out.push(Instr::LocalGet(pointer));
                self.expr(value, out)?;
                out.push(Instr::I32Const(self.size_of(&value.ty) as i32));
                out.push(Instr::MemoryCopy);
            }
            None => self.expr(value, out)?,
        }
        Ok(())
    }
}

fn block(body: Vec<Instr>) -> Instr {
    Instr::Block {
        ty: BlockType::Empty,
        body,
    }
}
