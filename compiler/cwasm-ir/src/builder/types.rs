use crate::builder::IrBuilder;
use crate::context::{Binding, Tag};
use crate::error::{
    InvalidConstantError, IrError, IrResult, RedeclarationError, TypeError, UnknownTagError,
};
use crate::ty::{IrFloatKind, IrFunctionTy, IrIntegerKind, IrRecord, IrRecordKind, IrTy};
use cwasm_span::Span;
use cwasm_syntax::{
    AstBasicType, AstDeclarator, AstDerivedType, AstEnumSpecifier, AstExpr, AstParameterList,
    AstRecordKind, AstRecordSpecifier, AstTypeName, AstTypeSpecifier,
};
use std::collections::HashSet;

impl IrBuilder {
    pub(super) fn resolve_type_specifier(&mut self, node: &AstTypeSpecifier) -> IrResult<IrTy> {
        match node {
            AstTypeSpecifier::Basic(_, basic) => Ok(basic_type(*basic)),
            AstTypeSpecifier::Record(record) => self.resolve_record(record),
            AstTypeSpecifier::Enum(enumeration) => self.resolve_enum(enumeration),
            AstTypeSpecifier::TypedefName(name) => match self.ordinary.find(&name.name) {
                Some(Binding::Typedef(ty)) => Ok(ty.clone()),
                _ => Err(self.undeclared(&name.name, name.span)),
            },
        }
    }

    pub(super) fn resolve_type_name(&mut self, node: &AstTypeName) -> IrResult<IrTy> {
        let base = self.resolve_type_specifier(&node.ty)?;
        self.apply_declarator(base, &node.declarator)
    }

    /// Apply the derived type constructors of a declarator to the specifier type, outermost
    /// first.
    pub(super) fn apply_declarator(&mut self, base: IrTy, node: &AstDeclarator) -> IrResult<IrTy> {
        let mut ty = base;
        for derived in node.derived.iter().rev() {
            ty = match derived {
                AstDerivedType::Pointer => IrTy::pointer_to(ty),
                AstDerivedType::Array(length) => {
                    if ty.is_function() || !ty.is_complete(&self.records) {
                        return Err(self.incomplete(&ty, node.span));
                    }
                    let length = match length {
                        Some(expr) => Some(self.constant_length(expr)?),
                        None => None,
                    };
                    IrTy::Array(Box::new(ty), length)
                }
                AstDerivedType::Function(parameters) => {
                    if ty.is_array() || ty.is_function() {
                        return Err(IrError::Type(TypeError {
                            expected: "a non-array, non-function return type".to_owned(),
                            actual: self.describe(&ty),
                            context: "function declarator".to_owned(),
                            span: node.span,
                        }));
                    }
                    IrTy::Function(Box::new(self.resolve_parameters(ty, parameters)?))
                }
            };
        }
        Ok(ty)
    }

    fn resolve_parameters(
        &mut self,
        return_type: IrTy,
        node: &AstParameterList,
    ) -> IrResult<IrFunctionTy> {
        let mut parameters = Vec::with_capacity(node.parameters.len());
        for parameter in &node.parameters {
            let base = self.resolve_type_specifier(&parameter.specifiers.ty)?;
            let ty = self.apply_declarator(base, &parameter.declarator)?;
            // Array and function parameters are adjusted to pointers.
            let ty = match ty {
                IrTy::Array(_, _) | IrTy::Function(_) => ty.decayed(),
                IrTy::Void => {
                    return Err(IrError::Type(TypeError {
                        expected: "an object type".to_owned(),
                        actual: "void".to_owned(),
                        context: "parameter declaration".to_owned(),
                        span: parameter.span,
                    }))
                }
                other => other,
            };
            parameters.push(ty);
        }
        Ok(IrFunctionTy {
            return_type,
            parameters,
            variadic: node.variadic,
            prototype: node.prototype,
        })
    }

    fn resolve_record(&mut self, node: &AstRecordSpecifier) -> IrResult<IrTy> {
        let kind = match node.kind {
            AstRecordKind::Struct => IrRecordKind::Struct,
            AstRecordKind::Union => IrRecordKind::Union,
        };
        let tag_name = node.name.as_ref().map(|n| n.name.clone());
        let Some(fields) = &node.fields else {
            let Some(name) = &node.name else {
                return Err(self.undeclared("<anonymous record>", node.span));
            };
            return match self.tags.find(&name.name).copied() {
                Some(Tag::Record(k, id)) if k == kind => Ok(IrTy::Record(id)),
                Some(_) => Err(wrong_tag(&name.name, kind, name.span)),
                None => Ok(IrTy::Record(self.declare_record(kind, tag_name))),
            };
        };

        // A body completes a forward declaration in the same scope, or declares a new record.
        let id = match node.name.as_ref().and_then(|n| self.tags.find_local(&n.name)).copied() {
            Some(Tag::Record(k, id)) if k == kind => {
                if self.records.get(id).is_some_and(|r| r.fields.is_some()) {
                    return Err(IrError::Redeclaration(RedeclarationError {
                        name: tag_name.unwrap_or_default(),
                        span: node.span,
                    }));
                }
                id
            }
            Some(_) => {
                let name = tag_name.unwrap_or_default();
                return Err(wrong_tag(&name, kind, node.span));
            }
            None => self.declare_record(kind, tag_name),
        };

        let mut members = Vec::new();
        let mut names = HashSet::new();
        for (index, field) in fields.iter().enumerate() {
            let base = self.resolve_type_specifier(&field.ty)?;
            if field.declarators.is_empty() {
                // Anonymous struct or union member: its fields become members of this record.
                if base.is_record() {
                    members.push((String::new(), base));
                }
                continue;
            }
            for declarator in &field.declarators {
                let ty = self.apply_declarator(base.clone(), declarator)?;
                let name = declarator
                    .name
                    .as_ref()
                    .map(|n| n.name.clone())
                    .unwrap_or_default();
                let flexible = matches!(ty, IrTy::Array(_, None)) && index + 1 == fields.len();
                if !flexible && !ty.is_complete(&self.records) {
                    return Err(self.incomplete(&ty, declarator.span));
                }
                if !name.is_empty() && !names.insert(name.clone()) {
                    return Err(IrError::Redeclaration(RedeclarationError {
                        name,
                        span: declarator.span,
                    }));
                }
                members.push((name, ty));
            }
        }
        self.records.complete(id, members);
        self.flatten_anonymous_members(id);
        Ok(IrTy::Record(id))
    }

    fn declare_record(&mut self, kind: IrRecordKind, name: Option<String>) -> crate::ty::RecordId {
        let record = IrRecord::incomplete(kind, name.clone());
        let id = record.id;
        self.records.insert(record);
        if let Some(name) = name {
            self.tags.add(&name, Tag::Record(kind, id));
        }
        id
    }

    /// Replace unnamed record members by their fields, offset by the member's position.
    fn flatten_anonymous_members(&mut self, id: crate::ty::RecordId) {
        let Some(fields) = self.records.get(id).and_then(|r| r.fields.clone()) else {
            return;
        };
        if fields.iter().all(|f| !f.name.is_empty()) {
            return;
        }
        let mut flattened = Vec::with_capacity(fields.len());
        for field in fields {
            match (&field.ty, field.name.is_empty()) {
                (IrTy::Record(inner), true) => {
                    let inner_fields = self
                        .records
                        .get(*inner)
                        .and_then(|r| r.fields.clone())
                        .unwrap_or_default();
                    for mut inner_field in inner_fields {
                        inner_field.offset += field.offset;
                        flattened.push(inner_field);
                    }
                }
                _ => flattened.push(field),
            }
        }
        self.records.replace_fields(id, flattened);
    }

    fn resolve_enum(&mut self, node: &AstEnumSpecifier) -> IrResult<IrTy> {
        let Some(enumerators) = &node.enumerators else {
            if let Some(name) = &node.name {
                if let Some(Tag::Record(_, _)) = self.tags.find(&name.name) {
                    return Err(IrError::UnknownTag(UnknownTagError {
                        name: name.name.clone(),
                        kind: "enum".to_owned(),
                        span: name.span,
                    }));
                }
            }
            return Ok(IrTy::INT);
        };
        if let Some(name) = &node.name {
            self.tags.add(&name.name, Tag::Enum);
        }
        let mut value = 0i64;
        for enumerator in enumerators {
            if let Some(expr) = &enumerator.value {
                value = self.constant_integer(expr)?;
            }
            self.bind_unlinked(
                &enumerator.name.name,
                Binding::EnumConstant(value),
                enumerator.name.span,
            )?;
            value = value.wrapping_add(1);
        }
        Ok(IrTy::INT)
    }

    /// Evaluate an integer constant expression.
    pub(super) fn constant_integer(&mut self, node: &AstExpr) -> IrResult<i64> {
        let expr = self.build_rvalue(node)?;
        match expr.as_int_const() {
            Some(value) if expr.ty.is_integer() => Ok(value),
            _ => Err(IrError::InvalidConstant(InvalidConstantError {
                reason: "expected an integer constant expression".to_owned(),
                span: *node.span(),
            })),
        }
    }

    fn constant_length(&mut self, node: &AstExpr) -> IrResult<u32> {
        let value = self.constant_integer(node)?;
        u32::try_from(value).map_err(|_| {
            IrError::InvalidConstant(InvalidConstantError {
                reason: format!("array length {value} is out of range"),
                span: *node.span(),
            })
        })
    }
}

fn wrong_tag(name: &str, kind: IrRecordKind, span: Span) -> IrError {
    let kind = match kind {
        IrRecordKind::Struct => "struct",
        IrRecordKind::Union => "union",
    };
    IrError::UnknownTag(UnknownTagError {
        name: name.to_owned(),
        kind: kind.to_owned(),
        span,
    })
}

fn basic_type(basic: AstBasicType) -> IrTy {
    match basic {
        AstBasicType::Void => IrTy::Void,
        AstBasicType::Bool => IrTy::Integer(IrIntegerKind::Bool),
        AstBasicType::Char | AstBasicType::SignedChar => IrTy::Integer(IrIntegerKind::I8),
        AstBasicType::UnsignedChar => IrTy::Integer(IrIntegerKind::U8),
        AstBasicType::Short => IrTy::Integer(IrIntegerKind::I16),
        AstBasicType::UnsignedShort => IrTy::Integer(IrIntegerKind::U16),
        AstBasicType::Int | AstBasicType::Long => IrTy::Integer(IrIntegerKind::I32),
        AstBasicType::UnsignedInt | AstBasicType::UnsignedLong => {
            IrTy::Integer(IrIntegerKind::U32)
        }
        AstBasicType::LongLong => IrTy::Integer(IrIntegerKind::I64),
        AstBasicType::UnsignedLongLong => IrTy::Integer(IrIntegerKind::U64),
        AstBasicType::Float => IrTy::Float(IrFloatKind::F32),
        AstBasicType::Double => IrTy::Float(IrFloatKind::F64),
    }
}
