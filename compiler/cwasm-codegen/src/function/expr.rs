use crate::abi::{integer_kind, load, signature, store, val_type};
use crate::error::{CodegenResult, SignatureMismatchError};
use crate::frame::Storage;
use crate::function::FunctionGenerator;
use cwasm_diagnostics::ice;
use cwasm_ir::expr::{IrBinaryOp, IrCallee, IrExpr, IrExprKind, IrUnaryOp};
use cwasm_ir::item::LocalId;
use cwasm_ir::ty::{IrFloatKind, IrFunctionTy, IrTy};
use cwasm_span::Span;
use cwasm_wasm::instr::{BinaryOp, CompareOp, Instr, MemArg, UnaryOp};
use cwasm_wasm::{BlockType, FuncType, ValType};

/// Where an lvalue lives once its address has been evaluated.
#[derive(Debug, Clone, Copy)]
enum Place {
    Local(u32),
    /// `base + offset` in linear memory.
    Memory { base: Base, offset: u32 },
}

#[derive(Debug, Clone, Copy)]
enum Base {
    Local(u32),
    Const(u32),
}

fn with_offset(arg: MemArg, offset: u32) -> MemArg {
    MemArg::new(arg.offset + offset, arg.align)
}

impl FunctionGenerator<'_> {
    /// Push the value of `e`. Void expressions push nothing, aggregates push their address.
    pub(super) fn expr(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        match &e.kind {
            IrExprKind::IntConst(value) => out.push(match val_type(&e.ty) {
                Some(ValType::I64) => Instr::I64Const(*value),
                _ => Instr::I32Const(*value as i32),
            }),
            IrExprKind::FloatConst(value) => out.push(match e.ty {
                IrTy::Float(IrFloatKind::F32) => Instr::F32Const(*value as f32),
                _ => Instr::F64Const(*value),
            }),
            IrExprKind::Local(_)
            | IrExprKind::Global(_)
            | IrExprKind::Deref(_)
            | IrExprKind::Member { .. } => self.lvalue(e, out)?,
            IrExprKind::FunctionRef(name) => {
                ice!("function designator '{}' used without decay", name)
            }
            IrExprKind::AddressOf(inner) => match &inner.kind {
                IrExprKind::FunctionRef(name) => {
                    out.push(Instr::I32Const(self.cx.table.slot(name) as i32))
                }
                _ => self.address(inner, out)?,
            },
            IrExprKind::Assign { target, value } => self.assign(target, value, true, out)?,
            IrExprKind::CompoundAssign {
                target,
                op,
                value,
                operation_ty,
            } => self.compound_assign(target, *op, value, operation_ty, true, out)?,
            IrExprKind::IncDec {
                target,
                increment,
                prefix,
                step,
            } => self.inc_dec(target, *increment, *prefix, *step, true, out)?,
            IrExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs, out)?;
                self.expr(rhs, out)?;
                out.push(binary(*op, &lhs.ty));
            }
            IrExprKind::PtrOffset {
                pointer,
                index,
                scale,
                subtract,
            } => {
                self.expr(pointer, out)?;
                match index.as_int_const() {
                    Some(index) => {
                        out.push(Instr::I32Const((index as i32).wrapping_mul(*scale as i32)))
                    }
                    None => {
                        self.expr(index, out)?;
                        if *scale != 1 {
                            out.push(Instr::I32Const(*scale as i32));
                            out.push(Instr::Binary(ValType::I32, BinaryOp::Mul));
                        }
                    }
                }
                let op = match subtract {
                    true => BinaryOp::Sub,
                    false => BinaryOp::Add,
                };
                out.push(Instr::Binary(ValType::I32, op));
            }
            IrExprKind::PtrDiff { lhs, rhs, scale } => {
                self.expr(lhs, out)?;
                self.expr(rhs, out)?;
                out.push(Instr::Binary(ValType::I32, BinaryOp::Sub));
                if *scale > 1 {
                    out.push(Instr::I32Const(*scale as i32));
                    out.push(Instr::Binary(ValType::I32, BinaryOp::DivS));
                }
            }
            IrExprKind::Logical { and, lhs, rhs } => {
                self.condition(lhs, out)?;
                let mut right = Vec::new();
                self.boolean(rhs, &mut right)?;
                let (then, otherwise) = match and {
                    true => (right, vec![Instr::I32Const(0)]),
                    false => (vec![Instr::I32Const(1)], right),
                };
                out.push(Instr::If {
                    ty: BlockType::Result(ValType::I32),
                    then,
                    otherwise,
                });
            }
            IrExprKind::Unary { op, operand } => match op {
                IrUnaryOp::Neg => match val_type(&operand.ty) {
                    Some(ty @ (ValType::F32 | ValType::F64)) => {
                        self.expr(operand, out)?;
                        out.push(Instr::Unary(ty, UnaryOp::Neg));
                    }
                    Some(ty) => {
                        out.push(Instr::constant(ty.zero()));
                        self.expr(operand, out)?;
                        out.push(Instr::Binary(ty, BinaryOp::Sub));
                    }
                    None => ice!("negation of a value without a type"),
                },
                IrUnaryOp::BitNot => {
                    self.expr(operand, out)?;
                    out.push(match val_type(&operand.ty) {
                        Some(ValType::I64) => Instr::I64Const(-1),
                        _ => Instr::I32Const(-1),
                    });
                    out.push(Instr::Binary(
                        val_type(&operand.ty).unwrap_or(ValType::I32),
                        BinaryOp::Xor,
                    ));
                }
                IrUnaryOp::Not => {
                    self.condition(operand, out)?;
                    out.push(Instr::Eqz(ValType::I32));
                }
            },
            IrExprKind::Cast(inner) => {
                if e.ty.is_void() {
                    return self.discard(inner, out);
                }
                self.expr(inner, out)?;
                self.convert(&inner.ty, &e.ty, out);
            }
            IrExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.condition(condition, out)?;
                let mut then_body = Vec::new();
                self.expr(then, &mut then_body)?;
                let mut otherwise_body = Vec::new();
                self.expr(otherwise, &mut otherwise_body)?;
                let ty = match val_type(&e.ty) {
                    Some(ty) => BlockType::Result(ty),
                    None => BlockType::Empty,
                };
                out.push(Instr::If {
                    ty,
                    then: then_body,
                    otherwise: otherwise_body,
                });
            }
            IrExprKind::Comma { lhs, rhs } => {
                self.discard(lhs, out)?;
                self.expr(rhs, out)?;
            }
            IrExprKind::Call { .. } => self.call(e, true, out)?,
            IrExprKind::VaArea => match self.frame.variadic_area {
                Some(index) => out.push(Instr::LocalGet(index)),
                None => ice!("'{}' is not variadic", self.function.link_name),
            },
            IrExprKind::VaArg { list } => self.va_arg(&e.ty, list, out)?,
            IrExprKind::CompoundLiteral { local, init } => {
                self.initialize(*local, init, out)?;
                self.local_value(*local, out);
            }
            IrExprKind::MemorySize => out.push(Instr::MemorySize),
            IrExprKind::MemoryGrow(pages) => {
                self.expr(pages, out)?;
                out.push(Instr::MemoryGrow);
            }
        }
        Ok(())
    }

    /// Evaluate `e` for its side effects only.
    pub(super) fn discard(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        match &e.kind {
            IrExprKind::Assign { target, value } => self.assign(target, value, false, out),
            IrExprKind::CompoundAssign {
                target,
                op,
                value,
                operation_ty,
            } => self.compound_assign(target, *op, value, operation_ty, false, out),
            IrExprKind::IncDec {
                target,
                increment,
                prefix,
                step,
            } => self.inc_dec(target, *increment, *prefix, *step, false, out),
            IrExprKind::Call { .. } => self.call(e, false, out),
            IrExprKind::Comma { lhs, rhs } => {
                self.discard(lhs, out)?;
                self.discard(rhs, out)
            }
            IrExprKind::Cast(inner) => self.discard(inner, out),
            IrExprKind::Conditional {
                condition,
                then,
                otherwise,
            } if then.has_side_effects() || otherwise.has_side_effects() => {
                self.condition(condition, out)?;
                let mut then_body = Vec::new();
                self.discard(then, &mut then_body)?;
                let mut otherwise_body = Vec::new();
                self.discard(otherwise, &mut otherwise_body)?;
                out.push(Instr::If {
                    ty: BlockType::Empty,
                    then: then_body,
                    otherwise: otherwise_body,
                });
                Ok(())
            }
            IrExprKind::Logical { and, lhs, rhs } if rhs.has_side_effects() => {
                self.condition(lhs, out)?;
                let mut right = Vec::new();
                self.discard(rhs, &mut right)?;
                let (then, otherwise) = match and {
                    true => (right, vec![]),
                    false => (vec![], right),
                };
                out.push(Instr::If {
                    ty: BlockType::Empty,
                    then,
                    otherwise,
                });
                Ok(())
            }
            _ if !e.has_side_effects() => Ok(()),
            _ => {
                self.expr(e, out)?;
                if val_type(&e.ty).is_some() {
                    out.push(Instr::Drop);
                }
                Ok(())
            }
        }
    }

    /// Push an `i32` that is nonzero exactly when the scalar `e` is nonzero.
    pub(super) fn condition(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        self.expr(e, out)?;
        match val_type(&e.ty) {
            Some(ValType::I32) | None => {}
            Some(ty) => {
                out.push(Instr::constant(ty.zero()));
                out.push(Instr::Compare(ty, CompareOp::Ne));
            }
        }
        Ok(())
    }

    /// Push 1 if the scalar `e` is nonzero and 0 otherwise.
    fn boolean(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        let normalized = match &e.kind {
            IrExprKind::Binary { op, .. } => op.is_comparison(),
            IrExprKind::Logical { .. }
            | IrExprKind::Unary {
                op: IrUnaryOp::Not, ..
            } => true,
            IrExprKind::IntConst(v) => *v == 0 || *v == 1,
            _ => false,
        };
        self.condition(e, out)?;
        if !normalized && val_type(&e.ty) == Some(ValType::I32) {
            out.push(Instr::I32Const(0));
            out.push(Instr::Compare(ValType::I32, CompareOp::Ne));
        }
        Ok(())
    }

    /// The value of an object designator: a load for scalars, the address for aggregates.
    fn lvalue(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        if let IrExprKind::Local(id) = e.kind {
            self.local_value(id, out);
            return Ok(());
        }
        self.address(e, out)?;
        if !e.ty.is_aggregate() {
            let (kind, arg) = load(&e.ty);
            out.push(Instr::Load(kind, arg));
        }
        Ok(())
    }

    fn local_value(&mut self, id: LocalId, out: &mut Vec<Instr>) {
        let ty = &self.function.local(id).ty;
        match self.frame.storage(id) {
            Storage::Wasm(index) => out.push(Instr::LocalGet(index)),
            Storage::Frame(_) => {
                let aggregate = ty.is_aggregate();
                let (kind, arg) = load(ty);
                self.local_address(id, out);
                if !aggregate {
                    out.push(Instr::Load(kind, arg));
                }
            }
        }
    }

    /// Push the address of an object designator, or of an aggregate-valued expression.
    pub(super) fn address(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        match &e.kind {
            IrExprKind::Local(id) => self.local_address(*id, out),
            IrExprKind::Global(name) => out.push(Instr::I32Const(self.cx.layout.address(name) as i32)),
            IrExprKind::Deref(pointer) => self.expr(pointer, out)?,
            IrExprKind::Member { base, offset } => {
                self.address(base, out)?;
                if *offset != 0 {
                    out.push(Instr::I32Const(*offset as i32));
                    out.push(Instr::Binary(ValType::I32, BinaryOp::Add));
                }
            }
            IrExprKind::CompoundLiteral { local, init } => {
                self.initialize(*local, init, out)?;
                self.local_address(*local, out);
            }
            _ if e.ty.is_aggregate() => self.expr(e, out)?,
            _ => ice!("address of a value that is not an object: {:?}", e.kind),
        }
        Ok(())
    }

    /// Evaluate the address part of an lvalue once, so it can be both read and written.
    fn place(&mut self, e: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<Place> {
        let place = match &e.kind {
            IrExprKind::Local(id) => match self.frame.storage(*id) {
                Storage::Wasm(index) => Place::Local(index),
                Storage::Frame(offset) => Place::Memory {
                    base: Base::Local(self.frame_pointer()),
                    offset,
                },
            },
            IrExprKind::Global(name) => Place::Memory {
                base: Base::Const(self.cx.layout.address(name)),
                offset: 0,
            },
            _ => {
                self.address(e, out)?;
                let base = self.temp(ValType::I32);
                out.push(Instr::LocalSet(base));
                Place::Memory {
                    base: Base::Local(base),
                    offset: 0,
                }
            }
        };
        Ok(place)
    }

    /// Push the address operand of a store to `place`, if it needs one.
    fn begin_store(&self, place: Place, out: &mut Vec<Instr>) {
        match place {
            Place::Local(_) => {}
            Place::Memory {
                base: Base::Local(index),
                ..
            } => out.push(Instr::LocalGet(index)),
            Place::Memory {
                base: Base::Const(address),
                ..
            } => out.push(Instr::I32Const(address as i32)),
        }
    }

    fn load_place(&self, place: Place, ty: &IrTy, out: &mut Vec<Instr>) {
        match place {
            Place::Local(index) => out.push(Instr::LocalGet(index)),
            Place::Memory { offset, .. } => {
                self.begin_store(place, out);
                let (kind, arg) = load(ty);
                out.push(Instr::Load(kind, with_offset(arg, offset)));
            }
        }
    }

    fn finish_store(&self, place: Place, ty: &IrTy, out: &mut Vec<Instr>) {
        match place {
            Place::Local(index) => out.push(Instr::LocalSet(index)),
            Place::Memory { offset, .. } => {
                let (kind, arg) = store(ty);
                out.push(Instr::Store(kind, with_offset(arg, offset)));
            }
        }
    }

    fn assign(
        &mut self,
        target: &IrExpr,
        value: &IrExpr,
        keep: bool,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        if target.ty.is_record() {
            self.address(target, out)?;
            let destination = keep.then(|| {
                let temp = self.temp(ValType::I32);
                out.push(Instr::LocalTee(temp));
                temp
            });
            self.expr(value, out)?;
            out.push(Instr::I32Const(self.size_of(&target.ty) as i32));
            out.push(Instr::MemoryCopy);
            if let Some(destination) = destination {
                out.push(Instr::LocalGet(destination));
            }
            return Ok(());
        }

        if let IrExprKind::Local(id) = target.kind {
            if let Storage::Wasm(index) = self.frame.storage(id) {
                self.expr(value, out)?;
                out.push(match keep {
                    true => Instr::LocalTee(index),
                    false => Instr::LocalSet(index),
                });
                return Ok(());
            }
        }
        self.address(target, out)?;
        self.expr(value, out)?;
        let result = self.keep_value(&target.ty, keep, out);
        let (kind, arg) = store(&target.ty);
        out.push(Instr::Store(kind, arg));
        if let Some(result) = result {
            out.push(Instr::LocalGet(result));
        }
        Ok(())
    }

    /// Copy the value on top of the stack into a fresh local when the expression result is
    /// needed after a store consumes it.
    fn keep_value(&mut self, ty: &IrTy, keep: bool, out: &mut Vec<Instr>) -> Option<u32> {
        if !keep {
            return None;
        }
        let temp = self.temp(val_type(ty).unwrap_or(ValType::I32));
        out.push(Instr::LocalTee(temp));
        Some(temp)
    }

    fn compound_assign(
        &mut self,
        target: &IrExpr,
        op: IrBinaryOp,
        value: &IrExpr,
        operation_ty: &IrTy,
        keep: bool,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        let place = self.place(target, out)?;
        self.begin_store(place, out);
        self.load_place(place, &target.ty, out);
        self.convert(&target.ty, operation_ty, out);
        self.expr(value, out)?;
        out.push(binary(op, operation_ty));
        self.convert(operation_ty, &target.ty, out);
        self.finish_update(place, &target.ty, keep, out);
        Ok(())
    }

    /// Store the value on top of the stack into `place`, leaving a copy when `keep` is set.
    fn finish_update(&mut self, place: Place, ty: &IrTy, keep: bool, out: &mut Vec<Instr>) {
        match place {
            Place::Local(index) if keep => out.push(Instr::LocalTee(index)),
            _ => {
                let result = self.keep_value(ty, keep, out);
                self.finish_store(place, ty, out);
                if let Some(result) = result {
                    out.push(Instr::LocalGet(result));
                }
            }
        }
    }

    fn inc_dec(
        &mut self,
        target: &IrExpr,
        increment: bool,
        prefix: bool,
        step: u32,
        keep: bool,
        out: &mut Vec<Instr>,
    ) -> CodegenResult<()> {
        let ty = &target.ty;
        let place = self.place(target, out)?;
        let postfix_result = keep && !prefix;
        if let (Place::Local(index), true) = (place, postfix_result) {
            out.push(Instr::LocalGet(index));
        }
        self.begin_store(place, out);
        self.load_place(place, ty, out);
        let old = match (place, postfix_result) {
            (Place::Memory { .. }, true) => self.keep_value(ty, true, out),
            _ => None,
        };
        self.step(ty, increment, step, out);
        match postfix_result {
            true => {
                self.finish_store(place, ty, out);
                if let Some(old) = old {
                    out.push(Instr::LocalGet(old));
                }
            }
            false => self.finish_update(place, ty, keep, out),
        }
        Ok(())
    }

    /// Add or subtract one step from the scalar on top of the stack, keeping it in range of `ty`.
    fn step(&mut self, ty: &IrTy, increment: bool, step: u32, out: &mut Vec<Instr>) {
        let (vt, constant) = match val_type(ty) {
            Some(ValType::I64) => (ValType::I64, Instr::I64Const(i64::from(step))),
            Some(ValType::F32) => (ValType::F32, Instr::F32Const(1.0)),
            Some(ValType::F64) => (ValType::F64, Instr::F64Const(1.0)),
            _ => (ValType::I32, Instr::I32Const(step as i32)),
        };
        out.push(constant);
        out.push(Instr::Binary(
            vt,
            match increment {
                true => BinaryOp::Add,
                false => BinaryOp::Sub,
            },
        ));
        if let Some(kind) = integer_kind(ty) {
            if kind.size() < 4 {
                self.convert(&IrTy::INT, ty, out);
            }
        }
    }

    fn va_arg(&mut self, ty: &IrTy, list: &IrExpr, out: &mut Vec<Instr>) -> CodegenResult<()> {
        let pointer = IrTy::pointer_to(IrTy::Void);
        let place = self.place(list, out)?;
        self.begin_store(place, out);
        self.load_place(place, &pointer, out);
        let slot = self.temp(ValType::I32);
        out.push(Instr::LocalTee(slot));
        out.push(Instr::I32Const(8));
        out.push(Instr::Binary(ValType::I32, BinaryOp::Add));
        self.finish_store(place, &pointer, out);
        out.push(Instr::LocalGet(slot));
        let (kind, arg) = match ty.is_record() {
            true => load(&pointer),
            false => load(ty),
        };
        out.push(Instr::Load(kind, arg));
        Ok(())
    }

    /// Generate a call. A struct or union result is written to the call's result slot, whose
    /// address is the value of the call.
    fn call(&mut self, e: &IrExpr, keep: bool, out: &mut Vec<Instr>) -> CodegenResult<()> {
        let IrExprKind::Call {
            callee,
            function_ty,
            arguments,
            variadic_arguments,
            variadic_area,
            result_slot,
        } = &e.kind
        else {
            ice!("call generation on {:?}", e.kind)
        };

        // Each lowered parameter is evaluated into its own sequence, so arguments can be
        // matched against the callee's definition before anything is emitted.
        let mut operands: Vec<(Option<ValType>, Vec<Instr>)> = Vec::new();
        if let Some(slot) = result_slot {
            let mut code = Vec::new();
            self.local_address(*slot, &mut code);
            operands.push((Some(ValType::I32), code));
        }
        for argument in arguments {
            let mut code = Vec::new();
            self.expr(argument, &mut code)?;
            operands.push((val_type(&argument.ty), code));
        }
        if function_ty.variadic {
            let mut code = Vec::new();
            match variadic_area {
                Some(area) => {
                    for (index, argument) in variadic_arguments.iter().enumerate() {
                        self.local_address(*area, &mut code);
                        self.expr(argument, &mut code)?;
                        let (kind, arg) = store(&argument.ty);
                        code.push(Instr::Store(kind, with_offset(arg, index as u32 * 8)));
                    }
                    self.local_address(*area, &mut code);
                }
                None => code.push(Instr::I32Const(0)),
            }
            operands.push((Some(ValType::I32), code));
        }

        let lowered = signature(function_ty);
        let (call, expected) = match callee {
            IrCallee::Direct(name) => match self.cx.functions.get(name.as_str()) {
                Some((index, ty)) => (Instr::Call(*index), ty.clone()),
                None => ice!("call to '{}', which has no function index", name),
            },
            IrCallee::Indirect(_) => (Instr::CallIndirect(lowered.clone()), lowered.clone()),
        };
        if expected != lowered {
            self.adapt_operands(callee, function_ty, &expected, &mut operands, e.span)?;
        }
        for (_, code) in operands {
            out.extend(code);
        }
        if let IrCallee::Indirect(pointer) = callee {
            self.expr(pointer, out)?;
        }

        self.enter_call(out);
        out.push(call);
        self.leave_call(out);

        match result_slot {
            Some(slot) if keep => self.local_address(*slot, out),
            Some(_) => {}
            None if !keep && expected.result.is_some() => out.push(Instr::Drop),
            None => {}
        }
        Ok(())
    }

    /// Fit the operands of a call to the definition it resolved to, which differs from the
    /// declaration the call was checked against when that declaration had no prototype. Missing
    /// arguments are passed as zero and extra ones are evaluated and dropped. Arguments of the
    /// wrong type cannot be reconciled.
    fn adapt_operands(
        &self,
        callee: &IrCallee,
        function_ty: &IrFunctionTy,
        expected: &FuncType,
        operands: &mut Vec<(Option<ValType>, Vec<Instr>)>,
        span: Span,
    ) -> CodegenResult<()> {
        let mismatch = |actual: String| SignatureMismatchError {
            callee: match callee {
                IrCallee::Direct(name) => name.clone(),
                IrCallee::Indirect(_) => "function pointer".to_owned(),
            },
            expected: expected.to_string(),
            actual,
            span,
        };
        let lowered = signature(function_ty);
        if lowered.result != expected.result {
            return Err(mismatch(lowered.to_string()).into());
        }
        for (position, (ty, _)) in operands.iter().enumerate() {
            if let (Some(expected), Some(actual)) = (expected.params.get(position), ty) {
                if expected != actual {
                    return Err(mismatch(lowered.to_string()).into());
                }
            }
        }
        let count = expected.params.len();
        if operands.len() > count {
            let extra = operands.split_off(count);
            if let Some((_, last)) = operands.last_mut() {
                for (ty, code) in extra {
                    last.extend(code);
                    if ty.is_some() {
                        last.push(Instr::Drop);
                    }
                }
            } else {
                let mut code = Vec::new();
                for (ty, extra) in extra {
                    code.extend(extra);
                    if ty.is_some() {
                        code.push(Instr::Drop);
                    }
                }
                operands.push((None, code));
            }
        }
        for ty in &expected.params[operands.len().min(count)..] {
            operands.push((Some(*ty), vec![Instr::constant(ty.zero())]));
        }
        Ok(())
    }
}

/// The signed, unsigned or float flavor of an operation.
fn pick<T>(float: bool, signed: bool, s: T, u: T, f: T) -> T {
    match (float, signed) {
        (true, _) => f,
        (false, true) => s,
        (false, false) => u,
    }
}

/// The instruction for `op` applied to two operands of type `ty`.
fn binary(op: IrBinaryOp, ty: &IrTy) -> Instr {
    let vt = val_type(ty).unwrap_or(ValType::I32);
    let signed = integer_kind(ty).is_some_and(|kind| kind.is_signed());
    let float = ty.is_float();
    match op {
        IrBinaryOp::Add => Instr::Binary(vt, BinaryOp::Add),
        IrBinaryOp::Sub => Instr::Binary(vt, BinaryOp::Sub),
        IrBinaryOp::Mul => Instr::Binary(vt, BinaryOp::Mul),
        IrBinaryOp::Div => Instr::Binary(
            vt,
            pick(float, signed, BinaryOp::DivS, BinaryOp::DivU, BinaryOp::Div),
        ),
        IrBinaryOp::Rem => Instr::Binary(
            vt,
            pick(float, signed, BinaryOp::RemS, BinaryOp::RemU, BinaryOp::RemS),
        ),
        IrBinaryOp::Shl => Instr::Binary(vt, BinaryOp::Shl),
        IrBinaryOp::Shr => Instr::Binary(
            vt,
            pick(float, signed, BinaryOp::ShrS, BinaryOp::ShrU, BinaryOp::ShrS),
        ),
        IrBinaryOp::BitAnd => Instr::Binary(vt, BinaryOp::And),
        IrBinaryOp::BitOr => Instr::Binary(vt, BinaryOp::Or),
        IrBinaryOp::BitXor => Instr::Binary(vt, BinaryOp::Xor),
        IrBinaryOp::Eq => Instr::Compare(vt, CompareOp::Eq),
        IrBinaryOp::Ne => Instr::Compare(vt, CompareOp::Ne),
        IrBinaryOp::Lt => Instr::Compare(
            vt,
            pick(float, signed, CompareOp::LtS, CompareOp::LtU, CompareOp::Lt),
        ),
        IrBinaryOp::Gt => Instr::Compare(
            vt,
            pick(float, signed, CompareOp::GtS, CompareOp::GtU, CompareOp::Gt),
        ),
        IrBinaryOp::Le => Instr::Compare(
            vt,
            pick(float, signed, CompareOp::LeS, CompareOp::LeU, CompareOp::Le),
        ),
        IrBinaryOp::Ge => Instr::Compare(
            vt,
            pick(float, signed, CompareOp::GeS, CompareOp::GeU, CompareOp::Ge),
        ),
    }
}
