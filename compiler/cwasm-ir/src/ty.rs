//! Resolved C types and record layouts.
//!
//! The data model is ILP32: `int`, `long` and pointers are four bytes wide, `long long` is eight,
//! and plain `char` is signed.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};

/// Width and signedness of an integer type.
///
/// `int` and `long` share a representation, as do `char` and `signed char`.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrIntegerKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IrIntegerKind {
    pub fn size(&self) -> u32 {
        match self {
            IrIntegerKind::Bool | IrIntegerKind::I8 | IrIntegerKind::U8 => 1,
            IrIntegerKind::I16 | IrIntegerKind::U16 => 2,
            IrIntegerKind::I32 | IrIntegerKind::U32 => 4,
            IrIntegerKind::I64 | IrIntegerKind::U64 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IrIntegerKind::I8 | IrIntegerKind::I16 | IrIntegerKind::I32 | IrIntegerKind::I64
        )
    }

    /// Conversion rank, used by the usual arithmetic conversions.
    pub fn rank(&self) -> u8 {
        match self {
            IrIntegerKind::Bool => 0,
            IrIntegerKind::I8 | IrIntegerKind::U8 => 1,
            IrIntegerKind::I16 | IrIntegerKind::U16 => 2,
            IrIntegerKind::I32 | IrIntegerKind::U32 => 3,
            IrIntegerKind::I64 | IrIntegerKind::U64 => 4,
        }
    }

    /// The type after integer promotion.
    pub fn promote(&self) -> IrIntegerKind {
        match self.rank() {
            0..=2 => IrIntegerKind::I32,
            _ => *self,
        }
    }

    /// The unsigned type of the same rank.
    pub fn to_unsigned(&self) -> IrIntegerKind {
        match self {
            IrIntegerKind::I8 => IrIntegerKind::U8,
            IrIntegerKind::I16 => IrIntegerKind::U16,
            IrIntegerKind::I32 => IrIntegerKind::U32,
            IrIntegerKind::I64 => IrIntegerKind::U64,
            other => *other,
        }
    }

    /// Reduce `value` modulo the width of this type, with two's-complement wraparound.
    ///
    /// The result is sign-extended into the i64 for signed types and zero-extended for unsigned
    /// ones, except for `U64`, which keeps its bit pattern.
    pub fn wrap(&self, value: i64) -> i64 {
        match self {
            IrIntegerKind::Bool => (value != 0) as i64,
            IrIntegerKind::I8 => value as i8 as i64,
            IrIntegerKind::U8 => value as u8 as i64,
            IrIntegerKind::I16 => value as i16 as i64,
            IrIntegerKind::U16 => value as u16 as i64,
            IrIntegerKind::I32 => value as i32 as i64,
            IrIntegerKind::U32 => value as u32 as i64,
            IrIntegerKind::I64 | IrIntegerKind::U64 => value,
        }
    }

    /// Convert a floating point value, truncating toward zero and saturating at the bounds of
    /// the type. NaN converts to zero.
    pub fn saturate(&self, value: f64) -> i64 {
        match self {
            IrIntegerKind::Bool => (value != 0.0) as i64,
            IrIntegerKind::I8 => value as i8 as i64,
            IrIntegerKind::U8 => value as u8 as i64,
            IrIntegerKind::I16 => value as i16 as i64,
            IrIntegerKind::U16 => value as u16 as i64,
            IrIntegerKind::I32 => value as i32 as i64,
            IrIntegerKind::U32 => value as u32 as i64,
            IrIntegerKind::I64 => value as i64,
            IrIntegerKind::U64 => value as u64 as i64,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrFloatKind {
    F32,
    F64,
}

impl IrFloatKind {
    pub fn size(&self) -> u32 {
        match self {
            IrFloatKind::F32 => 4,
            IrFloatKind::F64 => 8,
        }
    }
}

/// Program-unique identifier of a struct or union type.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u32);

static NEXT_RECORD_ID: AtomicU32 = AtomicU32::new(0);

impl RecordId {
    /// Allocate a fresh identifier. Identifiers never repeat within a process, so record tables
    /// of separately built units can be merged without renumbering.
    pub fn fresh() -> Self {
        RecordId(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunctionTy {
    pub return_type: IrTy,
    pub parameters: Vec<IrTy>,
    pub variadic: bool,
    /// Unprototyped declarations (`int f();`) accept any arguments.
    pub prototype: bool,
}

/// A fully resolved C type.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum IrTy {
    Void,
    Integer(IrIntegerKind),
    Float(IrFloatKind),
    Pointer(Box<IrTy>),
    /// Element type and length. The length is unknown for `int a[]` before an initializer fixes
    /// it, and for incomplete array parameters.
    Array(Box<IrTy>, Option<u32>),
    Function(Box<IrFunctionTy>),
    Record(RecordId),
}

impl IrTy {
    pub const INT: IrTy = IrTy::Integer(IrIntegerKind::I32);
    pub const UINT: IrTy = IrTy::Integer(IrIntegerKind::U32);
    pub const CHAR: IrTy = IrTy::Integer(IrIntegerKind::I8);
    pub const DOUBLE: IrTy = IrTy::Float(IrFloatKind::F64);

    pub fn pointer_to(inner: IrTy) -> IrTy {
        IrTy::Pointer(Box::new(inner))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrTy::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, IrTy::Integer(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrTy::Float(_))
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrTy::Pointer(_))
    }

    /// Types that are tested against zero in conditions.
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn is_record(&self) -> bool {
        matches!(self, IrTy::Record(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, IrTy::Array(_, _))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, IrTy::Function(_))
    }

    /// Objects that live in memory and are handled by address.
    pub fn is_aggregate(&self) -> bool {
        self.is_record() || self.is_array()
    }

    pub fn integer_kind(&self) -> Option<IrIntegerKind> {
        match self {
            IrTy::Integer(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&IrTy> {
        match self {
            IrTy::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn function(&self) -> Option<&IrFunctionTy> {
        match self {
            IrTy::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Whether this is a character array type, the only arrays string literals initialize.
    pub fn is_char_array(&self) -> bool {
        match self {
            IrTy::Array(element, _) => matches!(
                **element,
                IrTy::Integer(IrIntegerKind::I8 | IrIntegerKind::U8)
            ),
            _ => false,
        }
    }

    /// The type an array or function designator decays to.
    pub fn decayed(&self) -> IrTy {
        match self {
            IrTy::Array(element, _) => IrTy::pointer_to((**element).clone()),
            IrTy::Function(_) => IrTy::pointer_to(self.clone()),
            other => other.clone(),
        }
    }

    /// The size of the type in bytes. Incomplete types have size zero.
    pub fn size(&self, records: &RecordTable) -> u32 {
        match self {
            IrTy::Void | IrTy::Function(_) => 0,
            IrTy::Integer(kind) => kind.size(),
            IrTy::Float(kind) => kind.size(),
            IrTy::Pointer(_) => 4,
            IrTy::Array(element, length) => element.size(records) * length.unwrap_or(0),
            IrTy::Record(id) => records.get(*id).map_or(0, |r| r.size),
        }
    }

    pub fn align(&self, records: &RecordTable) -> u32 {
        match self {
            IrTy::Void | IrTy::Function(_) => 1,
            IrTy::Integer(kind) => kind.size(),
            IrTy::Float(kind) => kind.size(),
            IrTy::Pointer(_) => 4,
            IrTy::Array(element, _) => element.align(records),
            IrTy::Record(id) => records.get(*id).map_or(1, |r| r.align),
        }
    }

    /// Whether a complete object of this type can be created.
    pub fn is_complete(&self, records: &RecordTable) -> bool {
        match self {
            IrTy::Void | IrTy::Function(_) => false,
            IrTy::Array(element, length) => length.is_some() && element.is_complete(records),
            IrTy::Record(id) => records.get(*id).is_some_and(|r| r.fields.is_some()),
            _ => true,
        }
    }
}

impl Display for IrTy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IrTy::Void => write!(f, "void"),
            IrTy::Integer(kind) => {
                let name = match kind {
                    IrIntegerKind::Bool => "_Bool",
                    IrIntegerKind::I8 => "char",
                    IrIntegerKind::U8 => "unsigned char",
                    IrIntegerKind::I16 => "short",
                    IrIntegerKind::U16 => "unsigned short",
                    IrIntegerKind::I32 => "int",
                    IrIntegerKind::U32 => "unsigned int",
                    IrIntegerKind::I64 => "long long",
                    IrIntegerKind::U64 => "unsigned long long",
                };
                write!(f, "{name}")
            }
            IrTy::Float(IrFloatKind::F32) => write!(f, "float"),
            IrTy::Float(IrFloatKind::F64) => write!(f, "double"),
            IrTy::Pointer(inner) => write!(f, "{inner} *"),
            IrTy::Array(element, Some(length)) => write!(f, "{element}[{length}]"),
            IrTy::Array(element, None) => write!(f, "{element}[]"),
            IrTy::Function(function) => {
                write!(f, "{}(", function.return_type)?;
                for (i, parameter) in function.parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{parameter}")?;
                }
                if function.variadic {
                    if !function.parameters.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
            IrTy::Record(id) => write!(f, "record#{}", id.0),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrRecordKind {
    Struct,
    Union,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrField {
    pub name: String,
    pub ty: IrTy,
    pub offset: u32,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrRecord {
    pub id: RecordId,
    pub kind: IrRecordKind,
    pub name: Option<String>,
    /// `None` while the record is incomplete (declared with a tag but no body).
    pub fields: Option<Vec<IrField>>,
    pub size: u32,
    pub align: u32,
}

impl IrRecord {
    pub fn incomplete(kind: IrRecordKind, name: Option<String>) -> Self {
        Self {
            id: RecordId::fresh(),
            kind,
            name,
            fields: None,
            size: 0,
            align: 1,
        }
    }

    pub fn field(&self, name: &str) -> Option<&IrField> {
        self.fields.as_ref()?.iter().find(|f| f.name == name)
    }
}

/// Layouts of every struct and union known to a unit or program.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    records: BTreeMap<RecordId, IrRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<&IrRecord> {
        self.records.get(&id)
    }

    pub fn insert(&mut self, record: IrRecord) {
        self.records.insert(record.id, record);
    }

    /// Merge another table into this one. Identifiers are program-unique, so nothing collides.
    pub fn extend(&mut self, other: &RecordTable) {
        for (id, record) in &other.records {
            self.records.entry(*id).or_insert_with(|| record.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IrRecord> {
        self.records.values()
    }

    /// Complete `id` with the given members, laid out with natural alignment.
    ///
    /// Struct members are placed in declaration order, each padded to its alignment. Union
    /// members all start at offset zero. The size is rounded up to the largest alignment.
    pub fn complete(&mut self, id: RecordId, members: Vec<(String, IrTy)>) {
        let Some(kind) = self.get(id).map(|r| r.kind) else {
            return;
        };
        let mut fields = Vec::with_capacity(members.len());
        let mut size = 0;
        let mut align = 1;
        for (name, ty) in members {
            let member_align = ty.align(self);
            let member_size = ty.size(self);
            align = align.max(member_align);
            let offset = match kind {
                IrRecordKind::Struct => {
                    let offset = align_to(size, member_align);
                    size = offset + member_size;
                    offset
                }
                IrRecordKind::Union => {
                    size = size.max(member_size);
                    0
                }
            };
            fields.push(IrField { name, ty, offset });
        }
        if let Some(record) = self.records.get_mut(&id) {
            record.fields = Some(fields);
            record.size = align_to(size, align);
            record.align = align;
        }
    }

    /// Replace the field list of a complete record, keeping its size and alignment.
    pub fn replace_fields(&mut self, id: RecordId, fields: Vec<IrField>) {
        if let Some(record) = self.records.get_mut(&id) {
            record.fields = Some(fields);
        }
    }

    /// Structural type compatibility.
    ///
    /// Two records are compatible when they have the same kind and the same fields (names,
    /// compatible types and offsets). Arrays with an unknown length are compatible with any
    /// length, and an unprototyped function type is compatible with any function type that has
    /// the same return type.
    pub fn compatible(&self, a: &IrTy, b: &IrTy) -> bool {
        self.compatible_guarded(a, b, &mut HashSet::new())
    }

    fn compatible_guarded(
        &self,
        a: &IrTy,
        b: &IrTy,
        visiting: &mut HashSet<(RecordId, RecordId)>,
    ) -> bool {
        match (a, b) {
            (IrTy::Void, IrTy::Void) => true,
            (IrTy::Integer(x), IrTy::Integer(y)) => x == y,
            (IrTy::Float(x), IrTy::Float(y)) => x == y,
            (IrTy::Pointer(x), IrTy::Pointer(y)) => self.compatible_guarded(x, y, visiting),
            (IrTy::Array(x, n), IrTy::Array(y, m)) => {
                (n.is_none() || m.is_none() || n == m) && self.compatible_guarded(x, y, visiting)
            }
            (IrTy::Function(x), IrTy::Function(y)) => {
                if !self.compatible_guarded(&x.return_type, &y.return_type, visiting) {
                    return false;
                }
                if !x.prototype || !y.prototype {
                    return true;
                }
                x.variadic == y.variadic
                    && x.parameters.len() == y.parameters.len()
                    && x
                        .parameters
                        .iter()
                        .zip(&y.parameters)
                        .all(|(p, q)| self.compatible_guarded(p, q, visiting))
            }
            (IrTy::Record(x), IrTy::Record(y)) => {
                if x == y || !visiting.insert((*x, *y)) {
                    return true;
                }
                let (Some(r), Some(s)) = (self.get(*x), self.get(*y)) else {
                    return false;
                };
                if r.kind != s.kind {
                    return false;
                }
                match (&r.fields, &s.fields) {
                    (Some(f), Some(g)) => {
                        f.len() == g.len()
                            && f.iter().zip(g).all(|(p, q)| {
                                p.name == q.name
                                    && p.offset == q.offset
                                    && self.compatible_guarded(&p.ty, &q.ty, visiting)
                            })
                    }
                    // An incomplete record is compatible with a record of the same tag.
                    _ => r.name.is_some() && r.name == s.name,
                }
            }
            _ => false,
        }
    }
}

pub fn align_to(value: u32, align: u32) -> u32 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(table: &mut RecordTable, kind: IrRecordKind, members: &[(&str, IrTy)]) -> RecordId {
        let record = IrRecord::incomplete(kind, Some("r".to_owned()));
        let id = record.id;
        table.insert(record);
        table.complete(
            id,
            members
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect(),
        );
        id
    }

    #[test]
    fn test_struct_layout_pads_fields() {
        let mut table = RecordTable::new();
        let id = record(
            &mut table,
            IrRecordKind::Struct,
            &[
                ("c", IrTy::CHAR),
                ("d", IrTy::DOUBLE),
                ("s", IrTy::Integer(IrIntegerKind::I16)),
            ],
        );
        let r = table.get(id).unwrap();
        let offsets = r.fields.as_ref().unwrap().iter().map(|f| f.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(r.size, 24);
        assert_eq!(r.align, 8);
    }

    #[test]
    fn test_union_layout() {
        let mut table = RecordTable::new();
        let id = record(
            &mut table,
            IrRecordKind::Union,
            &[
                ("c", IrTy::Array(Box::new(IrTy::CHAR), Some(5))),
                ("i", IrTy::INT),
            ],
        );
        let r = table.get(id).unwrap();
        assert_eq!(r.size, 8);
        assert!(r.fields.as_ref().unwrap().iter().all(|f| f.offset == 0));
    }

    #[test]
    fn test_structural_record_compatibility() {
        let mut table = RecordTable::new();
        let a = record(&mut table, IrRecordKind::Struct, &[("x", IrTy::INT)]);
        let b = record(&mut table, IrRecordKind::Struct, &[("x", IrTy::INT)]);
        let c = record(&mut table, IrRecordKind::Struct, &[("y", IrTy::INT)]);
        assert!(table.compatible(&IrTy::Record(a), &IrTy::Record(b)));
        assert!(!table.compatible(&IrTy::Record(a), &IrTy::Record(c)));
    }

    #[test]
    fn test_integer_wraparound() {
        assert_eq!(IrIntegerKind::U8.wrap(12345), 57);
        assert_eq!(IrIntegerKind::I8.wrap(12345), 57);
        assert_eq!(IrIntegerKind::U8.wrap(-12345), 199);
        assert_eq!(IrIntegerKind::I8.wrap(200), -56);
        assert_eq!(IrIntegerKind::U32.wrap(-1), 0xffff_ffff);
        assert_eq!(IrIntegerKind::Bool.wrap(-7), 1);
    }

    #[test]
    fn test_float_conversion_saturates() {
        assert_eq!(IrIntegerKind::I8.saturate(1000.0), 127);
        assert_eq!(IrIntegerKind::U8.saturate(-3.5), 0);
        assert_eq!(IrIntegerKind::I32.saturate(-2.9), -2);
        assert_eq!(IrIntegerKind::I32.saturate(f64::NAN), 0);
    }

    #[test]
    fn test_usual_promotions() {
        assert_eq!(IrIntegerKind::U16.promote(), IrIntegerKind::I32);
        assert_eq!(IrIntegerKind::U32.promote(), IrIntegerKind::U32);
        assert_eq!(IrIntegerKind::I64.to_unsigned(), IrIntegerKind::U64);
    }
}
