use crate::builder::IrBuilder;
use crate::context::Binding;
use crate::error::{
    ArgumentCountError, IncompleteTypeError, InvalidConstantError, InvalidLvalueError, IrError,
    IrResult, TypeError, UnknownFieldError,
};
use crate::expr::{IrBinaryOp, IrCallee, IrExpr, IrExprKind, IrUnaryOp};
use crate::stmt::{IrInitStore, IrLocalInit};
use crate::ty::{IrFloatKind, IrFunctionTy, IrIntegerKind, IrTy};
use cwasm_diagnostics::ice;
use cwasm_span::Span;
use cwasm_syntax::{
    AstAssignExpr, AstBinaryOp, AstBinaryOpExpr, AstBracketIndexExpr, AstBuiltin,
    AstBuiltinExpr, AstCallExpr, AstCastExpr, AstCompoundLiteralExpr, AstConditionalExpr, AstExpr,
    AstIdentifier, AstIntegerLiteralExpr, AstMemberExpr, AstUnaryOp, AstUnaryOpExpr,
};

impl IrBuilder {
    /// Build an expression without applying array or function decay.
    pub(super) fn build_expr(&mut self, node: &AstExpr) -> IrResult<IrExpr> {
        match node {
            AstExpr::Identifier(n) => self.visit_identifier_expr(n),
            AstExpr::IntegerLiteral(n) => Ok(visit_integer_literal_expr(n)),
            AstExpr::FloatLiteral(n) => {
                let kind = match n.single {
                    true => IrFloatKind::F32,
                    false => IrFloatKind::F64,
                };
                Ok(float(kind, n.value, n.span))
            }
            AstExpr::CharLiteral(n) => Ok(IrExpr::int(IrTy::INT, n.value, n.span)),
            AstExpr::StringLiteral(n) => {
                let (link_name, ty) = self.intern_string(n.value.clone(), n.span);
                self.reference(&link_name);
                Ok(IrExpr::new(ty, IrExprKind::Global(link_name), n.span))
            }
            AstExpr::Assign(n) => self.visit_assign_expr(n),
            AstExpr::BinaryOp(n) => self.visit_binary_op_expr(n),
            AstExpr::UnaryOp(n) => self.visit_unary_op_expr(n),
            AstExpr::Conditional(n) => self.visit_conditional_expr(n),
            AstExpr::Comma(n) => {
                let lhs = self.build_rvalue(&n.lhs)?;
                let rhs = self.build_rvalue(&n.rhs)?;
                let kind = IrExprKind::Comma {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs.clone()),
                };
                Ok(IrExpr::new(rhs.ty, kind, n.span))
            }
            AstExpr::Cast(n) => self.visit_cast_expr(n),
            AstExpr::SizeofExpr(n) => {
                let operand = self.build_expr(&n.operand)?;
                self.size_of(&operand.ty, n.span)
            }
            AstExpr::SizeofType(n) => {
                let ty = self.resolve_type_name(&n.ty)?;
                self.size_of(&ty, n.span)
            }
            AstExpr::Call(n) => self.visit_call_expr(n),
            AstExpr::BracketIndex(n) => self.visit_bracket_index_expr(n),
            AstExpr::Member(n) => self.visit_member_expr(n),
            AstExpr::CompoundLiteral(n) => self.visit_compound_literal_expr(n),
            AstExpr::Builtin(n) => self.visit_builtin_expr(n),
        }
    }

    /// Build an expression used for its value: arrays and functions decay to pointers.
    pub(super) fn build_rvalue(&mut self, node: &AstExpr) -> IrResult<IrExpr> {
        let expr = self.build_expr(node)?;
        Ok(decay(expr))
    }

    /// Build a controlling expression, which must have scalar type.
    pub(super) fn build_condition(&mut self, node: &AstExpr) -> IrResult<IrExpr> {
        let expr = self.build_rvalue(node)?;
        if !expr.ty.is_scalar() {
            return Err(self.type_error("a scalar type", &expr.ty, "condition", expr.span));
        }
        Ok(expr)
    }

    fn visit_identifier_expr(&mut self, node: &AstIdentifier) -> IrResult<IrExpr> {
        let Some(binding) = self.ordinary.find(&node.name).cloned() else {
            return Err(self.undeclared(&node.name, node.span));
        };
        match binding {
            Binding::Local(id) => {
                let ty = self.local(id).ty.clone();
                Ok(IrExpr::new(ty, IrExprKind::Local(id), node.span))
            }
            Binding::Global { link_name, ty } => {
                self.reference(&link_name);
                let kind = match ty.is_function() {
                    true => IrExprKind::FunctionRef(link_name),
                    false => IrExprKind::Global(link_name),
                };
                Ok(IrExpr::new(ty, kind, node.span))
            }
            Binding::EnumConstant(value) => Ok(IrExpr::int(
                IrTy::INT,
                IrIntegerKind::I32.wrap(value),
                node.span,
            )),
            Binding::Typedef(ty) => Err(self.type_error("an expression", &ty, &node.name, node.span)),
        }
    }

    fn visit_assign_expr(&mut self, node: &AstAssignExpr) -> IrResult<IrExpr> {
        let target = self.build_expr(&node.lhs)?;
        check_modifiable(&target)?;
        let value = self.build_rvalue(&node.rhs)?;
        let ty = target.ty.clone();
        let Some(op) = node.op else {
            let value = self.convert_for_assignment(value, &ty, "assignment")?;
            let kind = IrExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            };
            return Ok(IrExpr::new(ty, kind, node.span));
        };
        let op = binary_op(op);
        let (value, operation_ty) = if ty.is_pointer() && matches!(op, IrBinaryOp::Add | IrBinaryOp::Sub)
        {
            if !value.ty.is_integer() {
                return Err(self.type_error("an integer", &value.ty, "pointer arithmetic", value.span));
            }
            let scale = self.element_size(&ty, node.span)?;
            let index = convert(value, &IrTy::INT);
            let scaled = make_binary(
                IrBinaryOp::Mul,
                index,
                IrExpr::int(IrTy::INT, i64::from(scale), node.span),
                IrTy::INT,
                node.span,
            );
            (scaled, ty.clone())
        } else {
            if !ty.is_arithmetic() || !value.ty.is_arithmetic() {
                let actual = if ty.is_arithmetic() { &value.ty } else { &ty };
                return Err(self.type_error("an arithmetic type", actual, "compound assignment", node.span));
            }
            let operation_ty = match op {
                IrBinaryOp::Shl | IrBinaryOp::Shr => promoted(&ty),
                _ => usual_arithmetic(&ty, &value.ty),
            };
            if requires_integers(op) && !(ty.is_integer() && value.ty.is_integer()) {
                return Err(self.type_error("an integer", &value.ty, op.symbol(), node.span));
            }
            let value = match op {
                IrBinaryOp::Shl | IrBinaryOp::Shr => convert(promote(value), &operation_ty),
                _ => convert(value, &operation_ty),
            };
            (value, operation_ty)
        };
        let kind = IrExprKind::CompoundAssign {
            target: Box::new(target),
            op,
            value: Box::new(value),
            operation_ty,
        };
        Ok(IrExpr::new(ty, kind, node.span))
    }

    fn visit_binary_op_expr(&mut self, node: &AstBinaryOpExpr) -> IrResult<IrExpr> {
        let and = match node.op {
            AstBinaryOp::And => true,
            AstBinaryOp::Or => false,
            op => {
                let lhs = self.build_rvalue(&node.lhs)?;
                let rhs = self.build_rvalue(&node.rhs)?;
                return self.build_binary(binary_op(op), lhs, rhs, node.span);
            }
        };
        let lhs = self.build_condition(&node.lhs)?;
        let rhs = self.build_condition(&node.rhs)?;
        // A constant left operand decides whether the right one is evaluated at all.
        if let Some(value) = lhs.as_int_const() {
            match (and, value != 0) {
                (true, false) => return Ok(IrExpr::int(IrTy::INT, 0, node.span)),
                (false, true) => return Ok(IrExpr::int(IrTy::INT, 1, node.span)),
                _ => {
                    if let Some(value) = rhs.as_int_const() {
                        return Ok(IrExpr::int(IrTy::INT, (value != 0) as i64, node.span));
                    }
                }
            }
        }
        let kind = IrExprKind::Logical {
            and,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        Ok(IrExpr::new(IrTy::INT, kind, node.span))
    }

    /// Apply a binary operator to two values, performing the pointer arithmetic and usual
    /// arithmetic conversions it calls for.
    pub(super) fn build_binary(
        &mut self,
        op: IrBinaryOp,
        lhs: IrExpr,
        rhs: IrExpr,
        span: Span,
    ) -> IrResult<IrExpr> {
        match op {
            IrBinaryOp::Add if lhs.ty.is_pointer() && rhs.ty.is_integer() => {
                return self.pointer_offset(lhs, rhs, false, span)
            }
            IrBinaryOp::Add if lhs.ty.is_integer() && rhs.ty.is_pointer() => {
                return self.pointer_offset(rhs, lhs, false, span)
            }
            IrBinaryOp::Sub if lhs.ty.is_pointer() && rhs.ty.is_integer() => {
                return self.pointer_offset(lhs, rhs, true, span)
            }
            IrBinaryOp::Sub if lhs.ty.is_pointer() && rhs.ty.is_pointer() => {
                if !self.records.compatible(&lhs.ty, &rhs.ty) {
                    return Err(self.type_error(&self.describe(&lhs.ty), &rhs.ty, "pointer difference", span));
                }
                let scale = self.element_size(&lhs.ty, span)?;
                let kind = IrExprKind::PtrDiff {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    scale,
                };
                return Ok(IrExpr::new(IrTy::INT, kind, span));
            }
            op if op.is_comparison() && (lhs.ty.is_pointer() || rhs.ty.is_pointer()) => {
                return self.pointer_comparison(op, lhs, rhs, span)
            }
            _ => {}
        }
        for operand in [&lhs, &rhs] {
            if !operand.ty.is_arithmetic() {
                return Err(self.type_error("an arithmetic type", &operand.ty, op.symbol(), operand.span));
            }
            if requires_integers(op) && !operand.ty.is_integer() {
                return Err(self.type_error("an integer type", &operand.ty, op.symbol(), operand.span));
            }
        }
        if matches!(op, IrBinaryOp::Shl | IrBinaryOp::Shr) {
            let lhs = promote(lhs);
            let ty = lhs.ty.clone();
            let rhs = convert(promote(rhs), &ty);
            return Ok(make_binary(op, lhs, rhs, ty, span));
        }
        let common = usual_arithmetic(&lhs.ty, &rhs.ty);
        let lhs = convert(lhs, &common);
        let rhs = convert(rhs, &common);
        let ty = match op.is_comparison() {
            true => IrTy::INT,
            false => common,
        };
        Ok(make_binary(op, lhs, rhs, ty, span))
    }

    fn pointer_offset(
        &mut self,
        pointer: IrExpr,
        index: IrExpr,
        subtract: bool,
        span: Span,
    ) -> IrResult<IrExpr> {
        let scale = self.element_size(&pointer.ty, span)?;
        let index = convert(index, &IrTy::INT);
        let ty = pointer.ty.clone();
        let kind = IrExprKind::PtrOffset {
            pointer: Box::new(pointer),
            index: Box::new(index),
            scale,
            subtract,
        };
        Ok(IrExpr::new(ty, kind, span))
    }

    fn pointer_comparison(
        &mut self,
        op: IrBinaryOp,
        lhs: IrExpr,
        rhs: IrExpr,
        span: Span,
    ) -> IrResult<IrExpr> {
        let (lhs, rhs) = match (lhs.ty.pointee(), rhs.ty.pointee()) {
            (Some(a), Some(b)) => {
                if !(a.is_void() || b.is_void() || self.records.compatible(a, b)) {
                    return Err(self.type_error(&self.describe(&lhs.ty), &rhs.ty, "pointer comparison", span));
                }
                let ty = lhs.ty.clone();
                (lhs, convert(rhs, &ty))
            }
            (Some(_), None) if rhs.is_null_pointer_constant() => {
                let ty = lhs.ty.clone();
                (lhs, convert(rhs, &ty))
            }
            (None, Some(_)) if lhs.is_null_pointer_constant() => {
                let ty = rhs.ty.clone();
                (convert(lhs, &ty), rhs)
            }
            (Some(_), None) => {
                return Err(self.type_error("a pointer", &rhs.ty, "pointer comparison", rhs.span))
            }
            _ => return Err(self.type_error("a pointer", &lhs.ty, "pointer comparison", lhs.span)),
        };
        Ok(make_binary(op, lhs, rhs, IrTy::INT, span))
    }

    fn visit_unary_op_expr(&mut self, node: &AstUnaryOpExpr) -> IrResult<IrExpr> {
        let span = node.span;
        match node.op {
            AstUnaryOp::AddressOf => {
                let operand = self.build_expr(&node.operand)?;
                self.address_of(operand, span)
            }
            AstUnaryOp::Deref => {
                let operand = self.build_rvalue(&node.operand)?;
                let pointee = match operand.ty.pointee() {
                    Some(pointee) if !pointee.is_void() => pointee.clone(),
                    _ => return Err(self.type_error("a pointer to an object", &operand.ty, "dereference", span)),
                };
                Ok(IrExpr::new(pointee, IrExprKind::Deref(Box::new(operand)), span))
            }
            AstUnaryOp::Plus | AstUnaryOp::Neg | AstUnaryOp::BitNot => {
                let operand = self.build_rvalue(&node.operand)?;
                let integer_only = node.op == AstUnaryOp::BitNot;
                if !operand.ty.is_arithmetic() || (integer_only && !operand.ty.is_integer()) {
                    let expected = if integer_only { "an integer type" } else { "an arithmetic type" };
                    return Err(self.type_error(expected, &operand.ty, "unary operator", span));
                }
                let operand = promote(operand);
                Ok(match node.op {
                    AstUnaryOp::Neg => make_unary(IrUnaryOp::Neg, operand, span),
                    AstUnaryOp::BitNot => make_unary(IrUnaryOp::BitNot, operand, span),
                    _ => operand,
                })
            }
            AstUnaryOp::Not => {
                let operand = self.build_condition(&node.operand)?;
                Ok(make_unary(IrUnaryOp::Not, operand, span))
            }
            AstUnaryOp::PreIncrement
            | AstUnaryOp::PreDecrement
            | AstUnaryOp::PostIncrement
            | AstUnaryOp::PostDecrement => {
                let target = self.build_expr(&node.operand)?;
                check_modifiable(&target)?;
                if !target.ty.is_scalar() {
                    return Err(self.type_error("a scalar type", &target.ty, "increment", span));
                }
                let step = match target.ty.is_pointer() {
                    true => self.element_size(&target.ty, span)?,
                    false => 1,
                };
                let increment = matches!(node.op, AstUnaryOp::PreIncrement | AstUnaryOp::PostIncrement);
                let prefix = matches!(node.op, AstUnaryOp::PreIncrement | AstUnaryOp::PreDecrement);
                let ty = target.ty.clone();
                let kind = IrExprKind::IncDec {
                    target: Box::new(target),
                    increment,
                    prefix,
                    step,
                };
                Ok(IrExpr::new(ty, kind, span))
            }
        }
    }

    fn address_of(&mut self, operand: IrExpr, span: Span) -> IrResult<IrExpr> {
        let IrExpr { ty, kind, span: operand_span } = operand;
        match kind {
            // `&*p` is `p`.
            IrExprKind::Deref(inner) => return Ok(*inner),
            IrExprKind::Local(id) => self.local_mut(id).escapes = true,
            IrExprKind::FunctionRef(_)
            | IrExprKind::Global(_)
            | IrExprKind::Member { .. }
            | IrExprKind::CompoundLiteral { .. } => {}
            _ => return Err(IrError::InvalidLvalue(InvalidLvalueError { span })),
        }
        let pointer = IrTy::pointer_to(ty.clone());
        let operand = IrExpr::new(ty, kind, operand_span);
        Ok(IrExpr::new(pointer, IrExprKind::AddressOf(Box::new(operand)), span))
    }

    fn visit_conditional_expr(&mut self, node: &AstConditionalExpr) -> IrResult<IrExpr> {
        let condition = self.build_condition(&node.condition)?;
        let then = self.build_rvalue(&node.happy_path)?;
        let otherwise = self.build_rvalue(&node.unhappy_path)?;
        let ty = match (&then.ty, &otherwise.ty) {
            (a, b) if a.is_arithmetic() && b.is_arithmetic() => usual_arithmetic(a, b),
            (IrTy::Void, IrTy::Void) => IrTy::Void,
            (IrTy::Pointer(a), IrTy::Pointer(_)) if a.is_void() => then.ty.clone(),
            (IrTy::Pointer(_), IrTy::Pointer(b)) if b.is_void() => otherwise.ty.clone(),
            (a @ IrTy::Pointer(_), b @ IrTy::Pointer(_)) if self.records.compatible(a, b) => a.clone(),
            (IrTy::Pointer(_), _) if otherwise.is_null_pointer_constant() => then.ty.clone(),
            (_, IrTy::Pointer(_)) if then.is_null_pointer_constant() => otherwise.ty.clone(),
            (a @ IrTy::Record(_), b @ IrTy::Record(_)) if self.records.compatible(a, b) => a.clone(),
            (a, _) => {
                return Err(self.type_error(&self.describe(a), &otherwise.ty, "conditional expression", node.span))
            }
        };
        let (then, otherwise) = match ty.is_record() {
            true => (then, otherwise),
            false => (convert(then, &ty), convert(otherwise, &ty)),
        };
        if let Some(value) = condition.as_int_const() {
            return Ok(if value != 0 { then } else { otherwise });
        }
        let kind = IrExprKind::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        };
        Ok(IrExpr::new(ty, kind, node.span))
    }

    fn visit_cast_expr(&mut self, node: &AstCastExpr) -> IrResult<IrExpr> {
        let ty = self.resolve_type_name(&node.ty)?;
        let operand = self.build_rvalue(&node.operand)?;
        if ty.is_void() {
            return Ok(IrExpr::new(ty, IrExprKind::Cast(Box::new(operand)), node.span));
        }
        let allowed = match (&ty, &operand.ty) {
            (to, from) if to.is_arithmetic() && from.is_arithmetic() => true,
            (IrTy::Pointer(_), from) => from.is_pointer() || from.is_integer(),
            (IrTy::Integer(_), IrTy::Pointer(_)) => true,
            _ => false,
        };
        if !allowed {
            return Err(self.type_error(&self.describe(&ty), &operand.ty, "cast", node.span));
        }
        let expr = convert(operand, &ty);
        // The result of a cast is never an lvalue.
        Ok(match expr.is_lvalue() {
            true => IrExpr::new(ty, IrExprKind::Cast(Box::new(expr)), node.span),
            false => expr,
        })
    }

    fn size_of(&self, ty: &IrTy, span: Span) -> IrResult<IrExpr> {
        if !ty.is_complete(&self.records) {
            return Err(self.incomplete(ty, span));
        }
        Ok(IrExpr::int(IrTy::UINT, i64::from(ty.size(&self.records)), span))
    }

    fn visit_call_expr(&mut self, node: &AstCallExpr) -> IrResult<IrExpr> {
        if self.function.is_none() {
            return Err(not_constant("function call", node.span));
        }
        let callee = self.build_expr(&node.callee)?;
        let (callee, function_ty) = match (callee.kind, callee.ty) {
            (IrExprKind::FunctionRef(link_name), IrTy::Function(f)) => {
                (IrCallee::Direct(link_name), *f)
            }
            (kind, ty) => {
                let callee = decay(IrExpr::new(ty, kind, callee.span));
                let function_ty = match callee.ty.pointee() {
                    Some(IrTy::Function(f)) => (**f).clone(),
                    _ => {
                        return Err(self.type_error("a function or function pointer", &callee.ty, "call", callee.span))
                    }
                };
                (IrCallee::Indirect(Box::new(callee)), function_ty)
            }
        };
        let expected = function_ty.parameters.len();
        let actual = node.arguments.len();
        if function_ty.prototype && (actual < expected || (actual > expected && !function_ty.variadic))
        {
            return Err(IrError::ArgumentCount(ArgumentCountError {
                expected,
                actual,
                span: node.span,
            }));
        }

        let mut call_ty = function_ty.clone();
        let mut arguments = Vec::with_capacity(actual);
        let mut variadic_arguments = Vec::new();
        for (index, argument) in node.arguments.iter().enumerate() {
            let value = self.build_rvalue(argument)?;
            if value.ty.is_void() {
                return Err(self.type_error("a value", &value.ty, "argument", value.span));
            }
            match function_ty.parameters.get(index) {
                Some(parameter) if function_ty.prototype => {
                    arguments.push(self.convert_for_assignment(value, parameter, "argument")?);
                }
                _ if function_ty.prototype => {
                    variadic_arguments.push(self.variadic_argument(value));
                }
                _ => {
                    // Without a prototype, arguments are promoted and passed as they are.
                    let value = default_promotion(value);
                    call_ty.parameters.push(value.ty.clone());
                    arguments.push(value);
                }
            }
        }
        if !function_ty.prototype {
            call_ty.prototype = true;
            call_ty.variadic = false;
        }

        let variadic_area = match variadic_arguments.len() {
            0 => None,
            n => {
                let area = IrTy::Array(Box::new(IrTy::Integer(IrIntegerKind::U8)), Some(8 * n as u32));
                Some(self.new_local("", area))
            }
        };
        let return_type = call_ty.return_type.clone();
        let result_slot = match return_type.is_record() {
            true => {
                if !return_type.is_complete(&self.records) {
                    return Err(self.incomplete(&return_type, node.span));
                }
                Some(self.new_local("", return_type.clone()))
            }
            false => None,
        };
        let kind = IrExprKind::Call {
            callee,
            function_ty: call_ty,
            arguments,
            variadic_arguments,
            variadic_area,
            result_slot,
        };
        Ok(IrExpr::new(return_type, kind, node.span))
    }

    /// Prepare an extra argument of a variadic call. Aggregates are copied into a temporary
    /// and passed by address.
    fn variadic_argument(&mut self, value: IrExpr) -> IrExpr {
        if !value.ty.is_record() {
            return default_promotion(value);
        }
        let ty = value.ty.clone();
        let span = value.span;
        let local = self.new_local("", ty.clone());
        let init = IrLocalInit::Aggregate(vec![IrInitStore { offset: 0, value }]);
        let kind = IrExprKind::CompoundLiteral {
            local,
            init: Box::new(init),
        };
        IrExpr::new(ty, kind, span)
    }

    fn visit_bracket_index_expr(&mut self, node: &AstBracketIndexExpr) -> IrResult<IrExpr> {
        let origin = self.build_rvalue(&node.origin)?;
        let index = self.build_rvalue(&node.index)?;
        let (pointer, index) = match (origin.ty.is_pointer(), index.ty.is_pointer()) {
            (true, false) if index.ty.is_integer() => (origin, index),
            (false, true) if origin.ty.is_integer() => (index, origin),
            _ => return Err(self.type_error("a pointer and an integer", &origin.ty, "subscript", node.span)),
        };
        let Some(element) = pointer.ty.pointee().cloned() else {
            ice!("subscripted value lost its pointer type");
        };
        let address = self.pointer_offset(pointer, index, false, node.span)?;
        Ok(IrExpr::new(element, IrExprKind::Deref(Box::new(address)), node.span))
    }

    fn visit_member_expr(&mut self, node: &AstMemberExpr) -> IrResult<IrExpr> {
        let base = match node.arrow {
            true => {
                let pointer = self.build_rvalue(&node.origin)?;
                let Some(pointee @ IrTy::Record(_)) = pointer.ty.pointee().cloned() else {
                    return Err(self.type_error("a pointer to a struct or union", &pointer.ty, "member access", node.span));
                };
                let span = pointer.span;
                IrExpr::new(pointee, IrExprKind::Deref(Box::new(pointer)), span)
            }
            false => self.build_expr(&node.origin)?,
        };
        let IrTy::Record(id) = base.ty else {
            return Err(self.type_error("a struct or union", &base.ty, "member access", node.span));
        };
        let Some(record) = self.records.get(id).filter(|r| r.fields.is_some()) else {
            return Err(self.incomplete(&base.ty, node.span));
        };
        let Some(field) = record.field(&node.member.name).cloned() else {
            return Err(IrError::UnknownField(UnknownFieldError {
                name: node.member.name.clone(),
                record: self.describe(&base.ty),
                span: node.member.span,
            }));
        };
        let kind = IrExprKind::Member {
            base: Box::new(base),
            offset: field.offset,
        };
        Ok(IrExpr::new(field.ty, kind, node.span))
    }

    fn visit_compound_literal_expr(&mut self, node: &AstCompoundLiteralExpr) -> IrResult<IrExpr> {
        if self.function.is_none() {
            return Err(not_constant("compound literal", node.span));
        }
        let mut ty = self.resolve_type_name(&node.ty)?;
        let prepared = self.prepare_list(&node.initializer)?;
        let init = self.build_local_init(&mut ty, prepared, node.span)?;
        let local = self.new_local("", ty.clone());
        self.local_mut(local).escapes = true;
        let kind = IrExprKind::CompoundLiteral {
            local,
            init: Box::new(init),
        };
        Ok(IrExpr::new(ty, kind, node.span))
    }

    fn visit_builtin_expr(&mut self, node: &AstBuiltinExpr) -> IrResult<IrExpr> {
        let span = node.span;
        match &node.builtin {
            AstBuiltin::VaStart(list) => {
                let variadic = self.function.as_ref().is_some_and(|f| f.variadic);
                if !variadic {
                    return Err(IrError::Type(TypeError {
                        expected: "a variadic function".to_owned(),
                        actual: "a function with fixed parameters".to_owned(),
                        context: "va_start".to_owned(),
                        span,
                    }));
                }
                let target = self.va_list(list)?;
                let ty = target.ty.clone();
                let kind = IrExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(IrExpr::new(ty.clone(), IrExprKind::VaArea, span)),
                };
                Ok(IrExpr::new(ty, kind, span))
            }
            AstBuiltin::VaArg(list, type_name) => {
                if self.function.is_none() {
                    return Err(not_constant("va_arg", span));
                }
                let list = self.va_list(list)?;
                let ty = self.resolve_type_name(type_name)?;
                if !ty.is_complete(&self.records) || ty.is_array() {
                    return Err(self.incomplete(&ty, span));
                }
                let kind = IrExprKind::VaArg {
                    list: Box::new(list),
                };
                Ok(IrExpr::new(ty, kind, span))
            }
            AstBuiltin::MemorySize => Ok(IrExpr::new(IrTy::INT, IrExprKind::MemorySize, span)),
            AstBuiltin::MemoryGrow(pages) => {
                let pages = self.build_rvalue(pages)?;
                if !pages.ty.is_integer() {
                    return Err(self.type_error("an integer", &pages.ty, "memory grow", pages.span));
                }
                let pages = convert(pages, &IrTy::INT);
                Ok(IrExpr::new(IrTy::INT, IrExprKind::MemoryGrow(Box::new(pages)), span))
            }
        }
    }

    fn va_list(&mut self, node: &AstExpr) -> IrResult<IrExpr> {
        let list = self.build_expr(node)?;
        check_modifiable(&list)?;
        if !list.ty.is_pointer() {
            return Err(self.type_error("a va_list", &list.ty, "variadic argument access", list.span));
        }
        Ok(list)
    }

    /// Convert a value for assignment to an object of type `to`, rejecting the conversions C
    /// does not perform implicitly.
    pub(super) fn convert_for_assignment(
        &self,
        value: IrExpr,
        to: &IrTy,
        context: &str,
    ) -> IrResult<IrExpr> {
        let allowed = match (to, &value.ty) {
            (to, from) if to.is_arithmetic() && from.is_arithmetic() => true,
            (IrTy::Integer(IrIntegerKind::Bool), IrTy::Pointer(_)) => true,
            (IrTy::Pointer(a), IrTy::Pointer(b)) => {
                a.is_void() || b.is_void() || self.records.compatible(a, b)
            }
            (IrTy::Pointer(_), _) => value.is_null_pointer_constant(),
            (IrTy::Record(_), IrTy::Record(_)) => {
                if self.records.compatible(to, &value.ty) {
                    return Ok(value);
                }
                false
            }
            _ => false,
        };
        if !allowed {
            return Err(self.type_error(&self.describe(to), &value.ty, context, value.span));
        }
        Ok(convert(value, to))
    }

    /// Size of the object a pointer points to, which must be complete.
    fn element_size(&self, pointer: &IrTy, span: Span) -> IrResult<u32> {
        match pointer.pointee() {
            Some(pointee) if pointee.is_complete(&self.records) => Ok(pointee.size(&self.records)),
            Some(pointee) => Err(IrError::IncompleteType(IncompleteTypeError {
                ty: self.describe(pointee),
                span,
            })),
            None => Err(self.type_error("a pointer", pointer, "pointer arithmetic", span)),
        }
    }

    pub(super) fn type_error(&self, expected: &str, actual: &IrTy, context: &str, span: Span) -> IrError {
        IrError::Type(TypeError {
            expected: expected.to_owned(),
            actual: self.describe(actual),
            context: context.to_owned(),
            span,
        })
    }
}

fn not_constant(what: &str, span: Span) -> IrError {
    IrError::InvalidConstant(InvalidConstantError {
        reason: format!("{what} is not allowed in a constant expression"),
        span,
    })
}

fn check_modifiable(target: &IrExpr) -> IrResult<()> {
    if !target.is_lvalue() || target.ty.is_array() || target.ty.is_function() || target.ty.is_void()
    {
        return Err(IrError::InvalidLvalue(InvalidLvalueError { span: target.span }));
    }
    Ok(())
}

/// Array-to-pointer and function-to-pointer conversion.
pub(super) fn decay(expr: IrExpr) -> IrExpr {
    if expr.ty.is_array() {
        let ty = expr.ty.decayed();
        let span = expr.span;
        return IrExpr::new(ty, IrExprKind::AddressOf(Box::new(expr)), span);
    }
    if expr.ty.is_function() {
        let IrExpr { ty, kind, span } = expr;
        return match kind {
            IrExprKind::Deref(pointer) => *pointer,
            kind => {
                let pointer = IrTy::pointer_to(ty.clone());
                IrExpr::new(pointer, IrExprKind::AddressOf(Box::new(IrExpr::new(ty, kind, span))), span)
            }
        };
    }
    expr
}

fn visit_integer_literal_expr(node: &AstIntegerLiteralExpr) -> IrExpr {
    use IrIntegerKind::{I32, I64, U32, U64};
    let suffix = node.suffix;
    // Candidate types in order; `long` has the representation of `int`.
    let candidates: &[IrIntegerKind] = match (suffix.unsigned, suffix.long >= 2, suffix.decimal) {
        (false, false, true) => &[I32, I64],
        (false, false, false) => &[I32, U32, I64, U64],
        (true, false, _) => &[U32, U64],
        (false, true, true) => &[I64],
        (false, true, false) => &[I64, U64],
        (true, true, _) => &[U64],
    };
    let value = node.value;
    let kind = candidates
        .iter()
        .copied()
        .find(|kind| match kind {
            I32 => value <= i32::MAX as u64,
            U32 => value <= u64::from(u32::MAX),
            I64 => value <= i64::MAX as u64,
            _ => true,
        })
        .unwrap_or(U64);
    IrExpr::int(IrTy::Integer(kind), kind.wrap(value as i64), node.span)
}

fn float(kind: IrFloatKind, value: f64, span: Span) -> IrExpr {
    let value = match kind {
        IrFloatKind::F32 => f64::from(value as f32),
        IrFloatKind::F64 => value,
    };
    IrExpr::new(IrTy::Float(kind), IrExprKind::FloatConst(value), span)
}

fn binary_op(op: AstBinaryOp) -> IrBinaryOp {
    match op {
        AstBinaryOp::Mul => IrBinaryOp::Mul,
        AstBinaryOp::Div => IrBinaryOp::Div,
        AstBinaryOp::Rem => IrBinaryOp::Rem,
        AstBinaryOp::Add => IrBinaryOp::Add,
        AstBinaryOp::Sub => IrBinaryOp::Sub,
        AstBinaryOp::Shl => IrBinaryOp::Shl,
        AstBinaryOp::Shr => IrBinaryOp::Shr,
        AstBinaryOp::Lt => IrBinaryOp::Lt,
        AstBinaryOp::Gt => IrBinaryOp::Gt,
        AstBinaryOp::Lte => IrBinaryOp::Le,
        AstBinaryOp::Gte => IrBinaryOp::Ge,
        AstBinaryOp::Eq => IrBinaryOp::Eq,
        AstBinaryOp::Neq => IrBinaryOp::Ne,
        AstBinaryOp::BitAnd => IrBinaryOp::BitAnd,
        AstBinaryOp::BitXor => IrBinaryOp::BitXor,
        AstBinaryOp::BitOr => IrBinaryOp::BitOr,
        AstBinaryOp::And | AstBinaryOp::Or => ice!("logical operator used as an arithmetic operator"),
    }
}

fn requires_integers(op: IrBinaryOp) -> bool {
    matches!(
        op,
        IrBinaryOp::Rem
            | IrBinaryOp::Shl
            | IrBinaryOp::Shr
            | IrBinaryOp::BitAnd
            | IrBinaryOp::BitOr
            | IrBinaryOp::BitXor
    )
}

fn promoted(ty: &IrTy) -> IrTy {
    match ty {
        IrTy::Integer(kind) => IrTy::Integer(kind.promote()),
        other => other.clone(),
    }
}

/// Integer promotion of a value.
pub(super) fn promote(expr: IrExpr) -> IrExpr {
    let ty = promoted(&expr.ty);
    convert(expr, &ty)
}

/// Promotions applied to arguments that have no parameter type.
fn default_promotion(expr: IrExpr) -> IrExpr {
    match expr.ty {
        IrTy::Float(IrFloatKind::F32) => convert(expr, &IrTy::DOUBLE),
        _ => promote(expr),
    }
}

/// The common type of the usual arithmetic conversions.
pub(super) fn usual_arithmetic(a: &IrTy, b: &IrTy) -> IrTy {
    match (a, b) {
        (IrTy::Float(IrFloatKind::F64), _) | (_, IrTy::Float(IrFloatKind::F64)) => IrTy::DOUBLE,
        (IrTy::Float(IrFloatKind::F32), _) | (_, IrTy::Float(IrFloatKind::F32)) => {
            IrTy::Float(IrFloatKind::F32)
        }
        (IrTy::Integer(x), IrTy::Integer(y)) => IrTy::Integer(common_integer(x.promote(), y.promote())),
        _ => a.clone(),
    }
}

fn common_integer(x: IrIntegerKind, y: IrIntegerKind) -> IrIntegerKind {
    if x == y {
        return x;
    }
    if x.is_signed() == y.is_signed() {
        return if x.rank() >= y.rank() { x } else { y };
    }
    let (signed, unsigned) = if x.is_signed() { (x, y) } else { (y, x) };
    if unsigned.rank() >= signed.rank() {
        unsigned
    } else if signed.size() > unsigned.size() {
        signed
    } else {
        signed.to_unsigned()
    }
}

/// Convert a value to another scalar type, folding constants.
pub(super) fn convert(expr: IrExpr, to: &IrTy) -> IrExpr {
    if &expr.ty == to {
        return expr;
    }
    let span = expr.span;
    match (&expr.kind, to) {
        (IrExprKind::IntConst(value), IrTy::Integer(kind)) => IrExpr::int(to.clone(), kind.wrap(*value), span),
        (IrExprKind::IntConst(value), IrTy::Pointer(_)) => {
            IrExpr::int(to.clone(), IrIntegerKind::U32.wrap(*value), span)
        }
        (IrExprKind::IntConst(value), IrTy::Float(kind)) => {
            let value = match expr.ty {
                IrTy::Integer(IrIntegerKind::U64) => *value as u64 as f64,
                _ => *value as f64,
            };
            float(*kind, value, span)
        }
        (IrExprKind::FloatConst(value), IrTy::Integer(kind)) => IrExpr::int(to.clone(), kind.saturate(*value), span),
        (IrExprKind::FloatConst(value), IrTy::Float(kind)) => float(*kind, *value, span),
        _ => IrExpr::new(to.clone(), IrExprKind::Cast(Box::new(expr)), span),
    }
}

fn make_unary(op: IrUnaryOp, operand: IrExpr, span: Span) -> IrExpr {
    let ty = match op {
        IrUnaryOp::Not => IrTy::INT,
        _ => operand.ty.clone(),
    };
    match (&operand.kind, op, &ty) {
        (IrExprKind::IntConst(v), IrUnaryOp::Not, _) => IrExpr::int(ty, (*v == 0) as i64, span),
        (IrExprKind::FloatConst(v), IrUnaryOp::Not, _) => IrExpr::int(ty, (*v == 0.0) as i64, span),
        (IrExprKind::IntConst(v), IrUnaryOp::Neg, IrTy::Integer(kind)) => {
            IrExpr::int(ty.clone(), kind.wrap(v.wrapping_neg()), span)
        }
        (IrExprKind::IntConst(v), IrUnaryOp::BitNot, IrTy::Integer(kind)) => {
            IrExpr::int(ty.clone(), kind.wrap(!v), span)
        }
        (IrExprKind::FloatConst(v), IrUnaryOp::Neg, IrTy::Float(kind)) => float(*kind, -v, span),
        _ => {
            let kind = IrExprKind::Unary {
                op,
                operand: Box::new(operand),
            };
            IrExpr::new(ty, kind, span)
        }
    }
}

/// Build a binary operation on operands already converted to a common type, folding it when
/// both operands are constants.
pub(super) fn make_binary(op: IrBinaryOp, lhs: IrExpr, rhs: IrExpr, ty: IrTy, span: Span) -> IrExpr {
    match (&lhs.kind, &rhs.kind, &lhs.ty) {
        (IrExprKind::IntConst(a), IrExprKind::IntConst(b), operand_ty) => {
            let kind = operand_ty.integer_kind().unwrap_or(IrIntegerKind::U32);
            if let Some(value) = fold_integer(op, kind, *a, *b) {
                let value = ty.integer_kind().map_or(value, |k| k.wrap(value));
                return IrExpr::int(ty, value, span);
            }
        }
        (IrExprKind::FloatConst(a), IrExprKind::FloatConst(b), IrTy::Float(kind)) => {
            if let Some(value) = fold_float(op, *a, *b) {
                return match op.is_comparison() {
                    true => IrExpr::int(ty, value as i64, span),
                    false => float(*kind, value, span),
                };
            }
        }
        _ => {}
    }
    let kind = IrExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    };
    IrExpr::new(ty, kind, span)
}

fn fold_integer(op: IrBinaryOp, kind: IrIntegerKind, a: i64, b: i64) -> Option<i64> {
    let bits = kind.size().max(4) * 8;
    if kind == IrIntegerKind::U64 {
        let (a, b) = (a as u64, b as u64);
        let value = match op {
            IrBinaryOp::Add => a.wrapping_add(b),
            IrBinaryOp::Sub => a.wrapping_sub(b),
            IrBinaryOp::Mul => a.wrapping_mul(b),
            IrBinaryOp::Div => a.checked_div(b)?,
            IrBinaryOp::Rem => a.checked_rem(b)?,
            IrBinaryOp::Shl => a.wrapping_shl(b as u32),
            IrBinaryOp::Shr => a.wrapping_shr(b as u32),
            IrBinaryOp::BitAnd => a & b,
            IrBinaryOp::BitOr => a | b,
            IrBinaryOp::BitXor => a ^ b,
            IrBinaryOp::Eq => (a == b) as u64,
            IrBinaryOp::Ne => (a != b) as u64,
            IrBinaryOp::Lt => (a < b) as u64,
            IrBinaryOp::Gt => (a > b) as u64,
            IrBinaryOp::Le => (a <= b) as u64,
            IrBinaryOp::Ge => (a >= b) as u64,
        };
        return Some(value as i64);
    }
    // Narrower values are held sign- or zero-extended, so i64 arithmetic matches.
    let value = match op {
        IrBinaryOp::Add => a.wrapping_add(b),
        IrBinaryOp::Sub => a.wrapping_sub(b),
        IrBinaryOp::Mul => a.wrapping_mul(b),
        IrBinaryOp::Div if b == 0 => return None,
        IrBinaryOp::Div => a.wrapping_div(b),
        IrBinaryOp::Rem if b == 0 => return None,
        IrBinaryOp::Rem => a.wrapping_rem(b),
        IrBinaryOp::Shl => a.wrapping_shl(b as u32 % bits),
        IrBinaryOp::Shr => a.wrapping_shr(b as u32 % bits),
        IrBinaryOp::BitAnd => a & b,
        IrBinaryOp::BitOr => a | b,
        IrBinaryOp::BitXor => a ^ b,
        IrBinaryOp::Eq => (a == b) as i64,
        IrBinaryOp::Ne => (a != b) as i64,
        IrBinaryOp::Lt => (a < b) as i64,
        IrBinaryOp::Gt => (a > b) as i64,
        IrBinaryOp::Le => (a <= b) as i64,
        IrBinaryOp::Ge => (a >= b) as i64,
    };
    Some(value)
}

fn fold_float(op: IrBinaryOp, a: f64, b: f64) -> Option<f64> {
    let value = match op {
        IrBinaryOp::Add => a + b,
        IrBinaryOp::Sub => a - b,
        IrBinaryOp::Mul => a * b,
        IrBinaryOp::Div => a / b,
        IrBinaryOp::Eq => (a == b) as i64 as f64,
        IrBinaryOp::Ne => (a != b) as i64 as f64,
        IrBinaryOp::Lt => (a < b) as i64 as f64,
        IrBinaryOp::Gt => (a > b) as i64 as f64,
        IrBinaryOp::Le => (a <= b) as i64 as f64,
        IrBinaryOp::Ge => (a >= b) as i64 as f64,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(ty: IrTy, value: i64) -> IrExpr {
        IrExpr::int(ty, value, Span::empty())
    }

    #[test]
    fn test_usual_arithmetic_conversions() {
        use IrIntegerKind::*;
        let ty = |k| IrTy::Integer(k);
        assert_eq!(usual_arithmetic(&ty(I8), &ty(U16)), IrTy::INT);
        assert_eq!(usual_arithmetic(&ty(I32), &ty(U32)), IrTy::UINT);
        assert_eq!(usual_arithmetic(&ty(I64), &ty(U32)), ty(I64));
        assert_eq!(usual_arithmetic(&ty(U64), &ty(I64)), ty(U64));
        assert_eq!(usual_arithmetic(&ty(I32), &IrTy::Float(IrFloatKind::F32)), IrTy::Float(IrFloatKind::F32));
        assert_eq!(usual_arithmetic(&IrTy::Float(IrFloatKind::F32), &IrTy::DOUBLE), IrTy::DOUBLE);
    }

    #[test]
    fn test_constant_conversion_wraps() {
        let folded = convert(int(IrTy::INT, 12345), &IrTy::Integer(IrIntegerKind::U8));
        assert_eq!(folded.as_int_const(), Some(57));
        let folded = convert(int(IrTy::INT, -12345), &IrTy::Integer(IrIntegerKind::U8));
        assert_eq!(folded.as_int_const(), Some(199));
        let folded = convert(int(IrTy::INT, -1), &IrTy::UINT);
        assert_eq!(folded.as_int_const(), Some(0xffff_ffff));
    }

    #[test]
    fn test_unsigned_comparison_folds_unsigned() {
        let lhs = convert(int(IrTy::INT, -1), &IrTy::UINT);
        let rhs = int(IrTy::UINT, 1);
        let folded = make_binary(IrBinaryOp::Lt, lhs, rhs, IrTy::INT, Span::empty());
        assert_eq!(folded.as_int_const(), Some(0));
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let folded = make_binary(IrBinaryOp::Div, int(IrTy::INT, 1), int(IrTy::INT, 0), IrTy::INT, Span::empty());
        assert!(matches!(folded.kind, IrExprKind::Binary { .. }));
    }

    #[test]
    fn test_shift_count_is_masked_to_width() {
        let folded = make_binary(IrBinaryOp::Shl, int(IrTy::INT, 1), int(IrTy::INT, 33), IrTy::INT, Span::empty());
        assert_eq!(folded.as_int_const(), Some(2));
    }

    #[test]
    fn test_float_constant_rounds_to_single() {
        let folded = convert(IrExpr::new(IrTy::DOUBLE, IrExprKind::FloatConst(0.1), Span::empty()), &IrTy::Float(IrFloatKind::F32));
        assert_eq!(folded.kind, IrExprKind::FloatConst(f64::from(0.1f32)));
    }
}
