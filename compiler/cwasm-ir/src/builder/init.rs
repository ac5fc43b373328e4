//! Initializers for automatic and static objects.
//!
//! An initializer is first prepared (its expressions built once, designators evaluated), then
//! matched against the object type with brace elision, producing a list of stores at byte
//! offsets. Automatic objects run the stores at their declaration; static objects evaluate them
//! into their initial image.

use crate::builder::expr::decay;
use crate::builder::IrBuilder;
use crate::error::{
    InvalidConstantError, InvalidInitializerError, IrError, IrResult, UnknownFieldError,
};
use crate::expr::{IrExpr, IrExprKind};
use crate::item::{IrRelocation, IrStaticData};
use crate::stmt::{IrInitStore, IrLocalInit};
use crate::ty::{IrField, IrFloatKind, IrIntegerKind, IrRecordKind, IrTy};
use cwasm_diagnostics::ice;
use cwasm_span::Span;
use cwasm_syntax::{AstDesignator, AstExpr, AstInitializer, AstInitializerList};
use std::iter::Peekable;
use std::vec::IntoIter;

/// An initializer with its expressions built.
pub(super) enum Prepared {
    Expr(IrExpr),
    /// A string literal, kept as bytes so it can initialize a character array.
    String(Vec<u8>, Span),
    List(Vec<PreparedItem>, Span),
}

pub(super) struct PreparedItem {
    designators: Vec<PreparedDesignator>,
    value: Prepared,
    span: Span,
}

enum PreparedDesignator {
    Field(String, Span),
    Index(i64, Span),
}

struct PendingStore {
    offset: u32,
    value: PendingValue,
}

enum PendingValue {
    Expr(IrExpr),
    /// Bytes of a character array, already padded to the array length.
    Bytes(Vec<u8>),
}

/// The value of a constant initializer element.
enum StaticValue {
    Int(i64),
    Float(f64),
    Address(String, i32),
    Function(String),
}

type Items = Peekable<IntoIter<PreparedItem>>;

impl IrBuilder {
    pub(super) fn prepare(&mut self, node: &AstInitializer) -> IrResult<Prepared> {
        match node {
            AstInitializer::Expr(AstExpr::StringLiteral(s)) => {
                Ok(Prepared::String(s.value.clone(), s.span))
            }
            AstInitializer::Expr(e) => Ok(Prepared::Expr(self.build_rvalue(e)?)),
            AstInitializer::List(list) => self.prepare_list(list),
        }
    }

    pub(super) fn prepare_list(&mut self, node: &AstInitializerList) -> IrResult<Prepared> {
        let mut items = Vec::with_capacity(node.items.len());
        for item in &node.items {
            let mut designators = Vec::with_capacity(item.designators.len());
            for designator in &item.designators {
                designators.push(match designator {
                    AstDesignator::Field(name) => {
                        PreparedDesignator::Field(name.name.clone(), name.span)
                    }
                    AstDesignator::Index(index) => {
                        PreparedDesignator::Index(self.constant_integer(index)?, *index.span())
                    }
                });
            }
            items.push(PreparedItem {
                designators,
                value: self.prepare(&item.value)?,
                span: item.span,
            });
        }
        Ok(Prepared::List(items, node.span))
    }

    /// Build the initialization of an automatic object, fixing the length of an array declared
    /// without one.
    pub(super) fn build_local_init(
        &mut self,
        ty: &mut IrTy,
        prepared: Prepared,
        span: Span,
    ) -> IrResult<IrLocalInit> {
        if let Prepared::Expr(expr) = prepared {
            if !ty.is_array() {
                let value = self.convert_for_assignment(expr, ty, "initializer")?;
                return Ok(IrLocalInit::Expr(value));
            }
            return Err(list_required(expr.span));
        }
        let stores = self.collect_stores(ty, prepared, span)?;
        if ty.is_scalar() {
            if let [PendingStore { value: PendingValue::Expr(value), .. }] = stores.as_slice() {
                return Ok(IrLocalInit::Expr(value.clone()));
            }
        }
        let mut converted = Vec::with_capacity(stores.len());
        for store in stores {
            let value = match store.value {
                PendingValue::Expr(value) => value,
                PendingValue::Bytes(bytes) => {
                    let (link_name, array_ty) = self.intern_bytes(bytes, span);
                    self.reference(&link_name);
                    IrExpr::new(array_ty, IrExprKind::Global(link_name), span)
                }
            };
            converted.push(IrInitStore {
                offset: store.offset,
                value,
            });
        }
        Ok(IrLocalInit::Aggregate(converted))
    }

    /// Evaluate the initializer of a static object into its initial image.
    pub(super) fn build_static_data(
        &mut self,
        ty: &mut IrTy,
        node: &AstInitializer,
    ) -> IrResult<IrStaticData> {
        let span = *node.span();
        let prepared = self.prepare(node)?;
        let stores = self.collect_stores(ty, prepared, span)?;
        let mut data = IrStaticData::zeroed(ty.size(&self.records));
        for store in stores {
            match store.value {
                PendingValue::Bytes(bytes) => data.write(store.offset, &bytes),
                PendingValue::Expr(expr) => write_static(&mut data, store.offset, &expr)?,
            }
        }
        Ok(data)
    }

    fn collect_stores(
        &mut self,
        ty: &mut IrTy,
        prepared: Prepared,
        span: Span,
    ) -> IrResult<Vec<PendingStore>> {
        let unknown_length = match ty {
            IrTy::Array(element, None) => Some((**element).clone()),
            _ => None,
        };
        let mut out = Vec::new();
        match (unknown_length, prepared) {
            (Some(element), Prepared::List(items, list_span)) => {
                let count = self.init_list(ty, 0, items, list_span, &mut out)?;
                *ty = IrTy::Array(Box::new(element), Some(count));
            }
            (Some(element), Prepared::String(bytes, string_span)) if ty.is_char_array() => {
                *ty = IrTy::Array(Box::new(element), Some(bytes.len() as u32 + 1));
                self.init_object(ty, 0, Prepared::String(bytes, string_span), &mut out)?;
            }
            (_, prepared) => self.init_object(ty, 0, prepared, &mut out)?,
        }
        if !ty.is_complete(&self.records) {
            return Err(self.incomplete(ty, span));
        }
        Ok(out)
    }

    fn init_object(
        &mut self,
        ty: &IrTy,
        offset: u32,
        value: Prepared,
        out: &mut Vec<PendingStore>,
    ) -> IrResult<()> {
        match value {
            Prepared::List(items, span) => {
                if ty.is_aggregate() {
                    self.init_list(ty, offset, items, span, out)?;
                    return Ok(());
                }
                // Braces around a scalar initializer.
                let mut items = items.into_iter();
                let Some(first) = items.next() else {
                    return Err(invalid("empty scalar initializer", span));
                };
                if !first.designators.is_empty() || items.next().is_some() {
                    return Err(invalid("excess elements in scalar initializer", span));
                }
                self.init_object(ty, offset, first.value, out)
            }
            Prepared::String(mut bytes, span) => {
                if let (IrTy::Array(_, length), true) = (ty, ty.is_char_array()) {
                    let length = length.map_or(bytes.len() + 1, |n| n as usize);
                    if bytes.len() > length {
                        return Err(invalid("initializer string is longer than the array", span));
                    }
                    bytes.resize(length, 0);
                    out.push(PendingStore {
                        offset,
                        value: PendingValue::Bytes(bytes),
                    });
                    return Ok(());
                }
                let (link_name, array_ty) = self.intern_string(bytes, span);
                self.reference(&link_name);
                let pointer = decay(IrExpr::new(array_ty, IrExprKind::Global(link_name), span));
                self.init_object(ty, offset, Prepared::Expr(pointer), out)
            }
            Prepared::Expr(expr) => {
                if ty.is_array() {
                    return Err(list_required(expr.span));
                }
                let value = self.convert_for_assignment(expr, ty, "initializer")?;
                out.push(PendingStore {
                    offset,
                    value: PendingValue::Expr(value),
                });
                Ok(())
            }
        }
    }

    /// Initialize an aggregate from a braced list, returning the number of members or elements
    /// it covers.
    fn init_list(
        &mut self,
        ty: &IrTy,
        offset: u32,
        items: Vec<PreparedItem>,
        span: Span,
        out: &mut Vec<PendingStore>,
    ) -> IrResult<u32> {
        let mut items = items.into_iter().peekable();
        let count = self.fill_aggregate(ty, offset, &mut items, true, span, out)?;
        if let Some(extra) = items.next() {
            return Err(invalid("excess elements in initializer", extra.span));
        }
        Ok(count)
    }

    /// Fill the members of an aggregate from `items` in order. An unbraced fill (brace elision)
    /// stops at the first designator or when the aggregate is full.
    fn fill_aggregate(
        &mut self,
        ty: &IrTy,
        offset: u32,
        items: &mut Items,
        braced: bool,
        span: Span,
        out: &mut Vec<PendingStore>,
    ) -> IrResult<u32> {
        let union = self.is_union(ty);
        let mut position = 0u32;
        let mut count = 0u32;
        while let Some(next) = items.peek() {
            if !next.designators.is_empty() {
                if !braced {
                    break;
                }
                let Some(item) = items.next() else {
                    break;
                };
                let mut designators = item.designators.into_iter();
                let Some(first) = designators.next() else {
                    ice!("designated initializer without designators");
                };
                position = self.designate(ty, &first)?;
                let (member_ty, member_offset) = self.member_at(ty, position, span)?;
                self.init_designated(
                    &member_ty,
                    offset + member_offset,
                    designators,
                    item.value,
                    out,
                )?;
                position += 1;
                count = count.max(position);
                continue;
            }
            if union && position > 0 {
                break;
            }
            let Some((member_ty, member_offset)) = self.positional_member(ty, position, span)?
            else {
                break;
            };
            let elide = member_ty.is_aggregate()
                && match &next.value {
                    Prepared::List(..) => false,
                    Prepared::String(..) => !member_ty.is_char_array(),
                    Prepared::Expr(e) => {
                        !(member_ty.is_record() && self.records.compatible(&member_ty, &e.ty))
                    }
                };
            if elide {
                self.fill_aggregate(&member_ty, offset + member_offset, items, false, span, out)?;
            } else {
                let Some(item) = items.next() else {
                    break;
                };
                self.init_object(&member_ty, offset + member_offset, item.value, out)?;
            }
            position += 1;
            count = count.max(position);
        }
        Ok(count)
    }

    fn init_designated(
        &mut self,
        ty: &IrTy,
        offset: u32,
        mut designators: IntoIter<PreparedDesignator>,
        value: Prepared,
        out: &mut Vec<PendingStore>,
    ) -> IrResult<()> {
        let Some(designator) = designators.next() else {
            return self.init_object(ty, offset, value, out);
        };
        let span = designator.span();
        let position = self.designate(ty, &designator)?;
        let (member_ty, member_offset) = self.member_at(ty, position, span)?;
        self.init_designated(&member_ty, offset + member_offset, designators, value, out)
    }

    /// The member position a designator selects.
    fn designate(&self, ty: &IrTy, designator: &PreparedDesignator) -> IrResult<u32> {
        match (ty, designator) {
            (IrTy::Array(_, length), PreparedDesignator::Index(index, span)) => {
                let in_bounds = *index >= 0 && length.map_or(true, |n| *index < i64::from(n));
                if !in_bounds {
                    return Err(invalid("array designator index is out of bounds", *span));
                }
                Ok(*index as u32)
            }
            (IrTy::Record(_), PreparedDesignator::Field(name, span)) => {
                let fields = self.record_fields(ty, *span)?;
                match fields.iter().position(|f| &f.name == name) {
                    Some(position) => Ok(position as u32),
                    None => Err(IrError::UnknownField(UnknownFieldError {
                        name: name.clone(),
                        record: self.describe(ty),
                        span: *span,
                    })),
                }
            }
            (_, designator) => Err(invalid(
                "designator does not match the type being initialized",
                designator.span(),
            )),
        }
    }

    fn positional_member(
        &self,
        ty: &IrTy,
        position: u32,
        span: Span,
    ) -> IrResult<Option<(IrTy, u32)>> {
        match ty {
            IrTy::Array(element, length) => {
                if length.is_some_and(|n| position >= n) {
                    return Ok(None);
                }
                let size = element.size(&self.records);
                Ok(Some(((**element).clone(), position * size)))
            }
            IrTy::Record(_) => {
                let fields = self.record_fields(ty, span)?;
                Ok(fields
                    .get(position as usize)
                    .map(|f| (f.ty.clone(), f.offset)))
            }
            _ => ice!("positional initializer for non-aggregate type {}", ty),
        }
    }

    fn member_at(&self, ty: &IrTy, position: u32, span: Span) -> IrResult<(IrTy, u32)> {
        match self.positional_member(ty, position, span)? {
            Some(member) => Ok(member),
            None => Err(invalid("designator is out of bounds", span)),
        }
    }

    fn record_fields(&self, ty: &IrTy, span: Span) -> IrResult<Vec<IrField>> {
        let IrTy::Record(id) = ty else {
            ice!("record fields requested for {}", ty);
        };
        match self.records.get(*id).and_then(|r| r.fields.clone()) {
            Some(fields) => Ok(fields),
            None => Err(self.incomplete(ty, span)),
        }
    }

    fn is_union(&self, ty: &IrTy) -> bool {
        match ty {
            IrTy::Record(id) => self
                .records
                .get(*id)
                .is_some_and(|r| r.kind == IrRecordKind::Union),
            _ => false,
        }
    }
}

impl PreparedDesignator {
    fn span(&self) -> Span {
        match self {
            PreparedDesignator::Field(_, span) | PreparedDesignator::Index(_, span) => *span,
        }
    }
}

fn invalid(message: &str, span: Span) -> IrError {
    IrError::InvalidInitializer(InvalidInitializerError {
        message: message.to_owned(),
        span,
    })
}

fn list_required(span: Span) -> IrError {
    invalid("an array must be initialized with a brace-enclosed list", span)
}

/// Store a constant initializer element into a static image.
fn write_static(data: &mut IrStaticData, offset: u32, expr: &IrExpr) -> IrResult<()> {
    let not_constant = || {
        IrError::InvalidConstant(InvalidConstantError {
            reason: "initializer element is not a compile-time constant".to_owned(),
            span: expr.span,
        })
    };
    let value = static_value(expr).ok_or_else(not_constant)?;
    let address_sized = matches!(
        expr.ty,
        IrTy::Pointer(_) | IrTy::Integer(IrIntegerKind::I32 | IrIntegerKind::U32)
    );
    match (&expr.ty, value) {
        (IrTy::Integer(kind), StaticValue::Int(v)) => {
            data.write(offset, &v.to_le_bytes()[..kind.size() as usize]);
        }
        (IrTy::Pointer(_), StaticValue::Int(v)) => data.write(offset, &(v as u32).to_le_bytes()),
        (IrTy::Float(IrFloatKind::F32), StaticValue::Float(f)) => {
            data.write(offset, &(f as f32).to_le_bytes());
        }
        (IrTy::Float(IrFloatKind::F64), StaticValue::Float(f)) => data.write(offset, &f.to_le_bytes()),
        (_, StaticValue::Address(symbol, addend)) if address_sized => {
            data.relocations
                .push((offset, IrRelocation::Address { symbol, addend }));
        }
        (_, StaticValue::Function(symbol)) if address_sized => {
            data.relocations
                .push((offset, IrRelocation::FunctionIndex { symbol }));
        }
        _ => return Err(not_constant()),
    }
    Ok(())
}

fn static_value(expr: &IrExpr) -> Option<StaticValue> {
    match &expr.kind {
        IrExprKind::IntConst(v) => Some(StaticValue::Int(*v)),
        IrExprKind::FloatConst(f) => Some(StaticValue::Float(*f)),
        IrExprKind::AddressOf(inner) => match &inner.kind {
            IrExprKind::FunctionRef(name) => Some(StaticValue::Function(name.clone())),
            _ => {
                let (symbol, addend) = address_constant(inner)?;
                Some(StaticValue::Address(symbol, addend))
            }
        },
        IrExprKind::Cast(inner) if inner.ty.is_pointer() => static_value(inner),
        IrExprKind::PtrOffset {
            pointer,
            index,
            scale,
            subtract,
        } => {
            let StaticValue::Address(symbol, addend) = static_value(pointer)? else {
                return None;
            };
            let delta = (index.as_int_const()? * i64::from(*scale)) as i32;
            let addend = match subtract {
                true => addend.wrapping_sub(delta),
                false => addend.wrapping_add(delta),
            };
            Some(StaticValue::Address(symbol, addend))
        }
        _ => None,
    }
}

/// The address of a static lvalue as a symbol and offset.
fn address_constant(lvalue: &IrExpr) -> Option<(String, i32)> {
    match &lvalue.kind {
        IrExprKind::Global(name) => Some((name.clone(), 0)),
        IrExprKind::Member { base, offset } => {
            let (symbol, addend) = address_constant(base)?;
            Some((symbol, addend + *offset as i32))
        }
        IrExprKind::Deref(pointer) => match static_value(pointer)? {
            StaticValue::Address(symbol, addend) => Some((symbol, addend)),
            _ => None,
        },
        _ => None,
    }
}
