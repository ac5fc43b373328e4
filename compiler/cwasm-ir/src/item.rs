use crate::stmt::IrStmt;
use crate::ty::{IrFunctionTy, IrTy};
use cwasm_span::Span;
use std::collections::BTreeSet;

/// Index of a local in [`IrFunction::locals`].
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u32);

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrLocal {
    /// Source name, empty for compiler temporaries.
    pub name: String,
    pub ty: IrTy,
    /// Whether the object must live in memory: its address is taken, or it is an aggregate.
    pub escapes: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    External,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DefinitionState {
    Declared,
    /// A file-scope variable declaration without initializer or storage class.
    Tentative,
    Defined,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Variable,
}

/// A file-scope name as seen by the linker.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrSymbol {
    /// The name used to link against. Internal symbols get a name that embeds the unit name and
    /// an `@`, so it can never collide with a C identifier from another unit.
    pub link_name: String,
    pub ty: IrTy,
    pub kind: SymbolKind,
    pub linkage: Linkage,
    pub state: DefinitionState,
    /// A function provided by the host environment.
    pub import: bool,
    pub span: Span,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub link_name: String,
    pub ty: IrFunctionTy,
    pub linkage: Linkage,
    pub parameters: Vec<LocalId>,
    pub locals: Vec<IrLocal>,
    pub body: Vec<IrStmt>,
    /// Link names of every function and variable the body refers to.
    pub references: BTreeSet<String>,
    pub span: Span,
}

impl IrFunction {
    pub fn local(&self, id: LocalId) -> &IrLocal {
        &self.locals[id.0 as usize]
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum IrRelocation {
    /// The address of a static object plus an addend.
    Address { symbol: String, addend: i32 },
    /// The function table index of a function.
    FunctionIndex { symbol: String },
}

impl IrRelocation {
    pub fn symbol(&self) -> &str {
        match self {
            IrRelocation::Address { symbol, .. } | IrRelocation::FunctionIndex { symbol } => symbol,
        }
    }
}

/// The initial image of a static object.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrStaticData {
    pub bytes: Vec<u8>,
    /// Four-byte slots in `bytes` patched once the memory layout is known.
    pub relocations: Vec<(u32, IrRelocation)>,
}

impl IrStaticData {
    pub fn zeroed(size: u32) -> Self {
        Self {
            bytes: vec![0; size as usize],
            relocations: vec![],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.relocations.is_empty() && self.bytes.iter().all(|b| *b == 0)
    }

    pub fn write(&mut self, offset: u32, value: &[u8]) {
        let start = offset as usize;
        let end = (start + value.len()).min(self.bytes.len());
        if start < end {
            self.bytes[start..end].copy_from_slice(&value[..end - start]);
        }
    }
}

/// A static-duration variable with storage in this unit.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrVariable {
    pub link_name: String,
    pub ty: IrTy,
    pub linkage: Linkage,
    /// `Tentative` variables are zero-initialized unless another unit provides an initializer.
    pub state: DefinitionState,
    pub data: IrStaticData,
    pub span: Span,
}

impl IrVariable {
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.data.relocations.iter().map(|(_, r)| r.symbol())
    }
}
