//! Placement of static data and the function table.
//!
//! Linear memory starts with 32 reserved bytes, so no object ever lives at address zero. Static
//! objects follow in program order, each at its natural alignment. The shadow stack begins at the
//! next 1024-byte boundary and spans 1 MiB.

use crate::error::{CodegenResult, MemoryLayoutError};
use cwasm_diagnostics::ice;
use cwasm_ir::expr::{IrCallee, IrExpr, IrExprKind};
use cwasm_ir::item::{IrFunction, IrRelocation, IrVariable};
use cwasm_ir::stmt::{IrLocalInit, IrStmt};
use cwasm_ir::ty::{align_to, RecordTable};
use cwasm_wasm::module::PAGE_SIZE;
use cwasm_wasm::WasmData;
use std::collections::HashMap;

pub const DATA_START: u32 = 32;
pub const STACK_ALIGN: u32 = 1024;
pub const STACK_SIZE: u32 = 1 << 20;

#[derive(Debug)]
pub struct MemoryLayout {
    addresses: HashMap<String, u32>,
    /// Initial value of `__sp`.
    pub stack_base: u32,
    pub stack_end: u32,
}

impl MemoryLayout {
    pub fn new(variables: &[IrVariable], records: &RecordTable) -> CodegenResult<Self> {
        let mut addresses = HashMap::with_capacity(variables.len());
        let mut cursor = u64::from(DATA_START);
        for variable in variables {
            let align = u64::from(variable.ty.align(records).max(1));
            let size = u64::from(variable.ty.size(records)).max(variable.data.bytes.len() as u64);
            cursor = cursor.div_ceil(align) * align;
            addresses.insert(variable.link_name.clone(), cursor as u32);
            tracing::trace!(variable = variable.link_name, address = cursor, size, "placed static");
            cursor += size;
            if cursor > u64::from(u32::MAX) {
                return Err(MemoryLayoutError {
                    reason: format!("'{}' ends past 4 GiB", variable.link_name),
                }
                .into());
            }
        }
        let stack_base = cursor.div_ceil(u64::from(STACK_ALIGN)) * u64::from(STACK_ALIGN);
        let stack_end = stack_base + u64::from(STACK_SIZE);
        if stack_end > u64::from(u32::MAX) {
            return Err(MemoryLayoutError {
                reason: format!("{} bytes of static data leave no room for the stack", cursor),
            }
            .into());
        }
        Ok(Self {
            addresses,
            stack_base: stack_base as u32,
            stack_end: stack_end as u32,
        })
    }

    pub fn address(&self, link_name: &str) -> u32 {
        match self.addresses.get(link_name) {
            Some(address) => *address,
            None => ice!("static object '{}' has no address", link_name),
        }
    }

    /// Pages needed for static data and the whole shadow stack.
    pub fn pages(&self) -> u32 {
        align_to(self.stack_end, PAGE_SIZE) / PAGE_SIZE
    }

    /// The initial images of every variable, with relocations applied and zero runs at either
    /// end dropped.
    pub fn data_segments(&self, variables: &[IrVariable], table: &FunctionTable) -> Vec<WasmData> {
        let mut segments = Vec::new();
        for variable in variables {
            let mut bytes = variable.data.bytes.clone();
            for (offset, relocation) in &variable.data.relocations {
                let value = match relocation {
                    IrRelocation::Address { symbol, addend } => {
                        self.address(symbol).wrapping_add(*addend as u32)
                    }
                    IrRelocation::FunctionIndex { symbol } => table.slot(symbol),
                };
                let start = *offset as usize;
                match bytes.get_mut(start..start + 4) {
                    Some(slot) => slot.copy_from_slice(&value.to_le_bytes()),
                    None => ice!("relocation at {} outside of '{}'", offset, variable.link_name),
                }
            }
            segments.extend(WasmData::trimmed(self.address(&variable.link_name), &bytes));
        }
        segments
    }
}

/// Functions whose address is taken, in order of first use. Slot zero stays empty so that a null
/// function pointer never designates a function.
#[derive(Debug, Default)]
pub struct FunctionTable {
    entries: Vec<String>,
    slots: HashMap<String, u32>,
}

impl FunctionTable {
    pub fn collect(functions: &[IrFunction], variables: &[IrVariable]) -> Self {
        let mut table = Self::default();
        for function in functions {
            for stmt in &function.body {
                visit_stmt(stmt, &mut |name| table.insert(name));
            }
        }
        for variable in variables {
            for (_, relocation) in &variable.data.relocations {
                if let IrRelocation::FunctionIndex { symbol } = relocation {
                    table.insert(symbol);
                }
            }
        }
        table
    }

    fn insert(&mut self, name: &str) {
        if self.slots.contains_key(name) {
            return;
        }
        self.entries.push(name.to_owned());
        self.slots.insert(name.to_owned(), self.entries.len() as u32);
    }

    pub fn slot(&self, name: &str) -> u32 {
        match self.slots.get(name) {
            Some(slot) => *slot,
            None => ice!("function '{}' is not in the table", name),
        }
    }

    /// Link names in slot order, starting at slot one.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn visit_stmt(stmt: &IrStmt, f: &mut impl FnMut(&str)) {
    match stmt {
        IrStmt::Expr(e) => visit_expr(e, f),
        IrStmt::Declare { init, .. } => {
            if let Some(init) = init {
                visit_init(init, f);
            }
        }
        IrStmt::Block(body) => body.iter().for_each(|s| visit_stmt(s, f)),
        IrStmt::If {
            condition,
            then,
            otherwise,
        } => {
            visit_expr(condition, f);
            visit_stmt(then, f);
            if let Some(otherwise) = otherwise {
                visit_stmt(otherwise, f);
            }
        }
        IrStmt::While { condition, body } | IrStmt::DoWhile { body, condition } => {
            visit_expr(condition, f);
            visit_stmt(body, f);
        }
        IrStmt::For {
            init,
            condition,
            update,
            body,
        } => {
            init.iter().for_each(|s| visit_stmt(s, f));
            condition.iter().chain(update).for_each(|e| visit_expr(e, f));
            visit_stmt(body, f);
        }
        IrStmt::Switch { value, sections } => {
            visit_expr(value, f);
            for section in sections {
                section.body.iter().for_each(|s| visit_stmt(s, f));
            }
        }
        IrStmt::Return(Some(e)) => visit_expr(e, f),
        IrStmt::Labeled { body, .. } => visit_stmt(body, f),
        IrStmt::Return(None) | IrStmt::Break | IrStmt::Continue | IrStmt::Goto { .. } => {}
    }
}

fn visit_init(init: &IrLocalInit, f: &mut impl FnMut(&str)) {
    match init {
        IrLocalInit::Expr(e) => visit_expr(e, f),
        IrLocalInit::Aggregate(stores) => stores.iter().for_each(|s| visit_expr(&s.value, f)),
    }
}

/// Report every function designator used as a value.
fn visit_expr(expr: &IrExpr, f: &mut impl FnMut(&str)) {
    match &expr.kind {
        IrExprKind::FunctionRef(name) => f(name),
        IrExprKind::IntConst(_)
        | IrExprKind::FloatConst(_)
        | IrExprKind::Local(_)
        | IrExprKind::Global(_)
        | IrExprKind::VaArea
        | IrExprKind::MemorySize => {}
        IrExprKind::Deref(e)
        | IrExprKind::AddressOf(e)
        | IrExprKind::Member { base: e, .. }
        | IrExprKind::Cast(e)
        | IrExprKind::Unary { operand: e, .. }
        | IrExprKind::IncDec { target: e, .. }
        | IrExprKind::VaArg { list: e }
        | IrExprKind::MemoryGrow(e) => visit_expr(e, f),
        IrExprKind::Assign { target, value }
        | IrExprKind::CompoundAssign { target, value, .. } => {
            visit_expr(target, f);
            visit_expr(value, f);
        }
        IrExprKind::Binary { lhs, rhs, .. }
        | IrExprKind::PtrDiff { lhs, rhs, .. }
        | IrExprKind::Logical { lhs, rhs, .. }
        | IrExprKind::Comma { lhs, rhs } => {
            visit_expr(lhs, f);
            visit_expr(rhs, f);
        }
        IrExprKind::PtrOffset { pointer, index, .. } => {
            visit_expr(pointer, f);
            visit_expr(index, f);
        }
        IrExprKind::Conditional {
            condition,
            then,
            otherwise,
        } => {
            visit_expr(condition, f);
            visit_expr(then, f);
            visit_expr(otherwise, f);
        }
        IrExprKind::Call {
            callee,
            arguments,
            variadic_arguments,
            ..
        } => {
            if let IrCallee::Indirect(callee) = callee {
                visit_expr(callee, f);
            }
            arguments
                .iter()
                .chain(variadic_arguments)
                .for_each(|e| visit_expr(e, f));
        }
        IrExprKind::CompoundLiteral { init, .. } => visit_init(init, f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_ir::item::{DefinitionState, IrStaticData, Linkage};
    use cwasm_ir::ty::{IrIntegerKind, IrTy};
    use cwasm_span::Span;

    fn variable(name: &str, ty: IrTy, bytes: Vec<u8>) -> IrVariable {
        IrVariable {
            link_name: name.to_owned(),
            ty,
            linkage: Linkage::External,
            state: DefinitionState::Defined,
            data: IrStaticData {
                bytes,
                relocations: vec![],
            },
            span: Span::empty(),
        }
    }

    #[test]
    fn test_statics_are_aligned_after_reserved_bytes() {
        let variables = vec![
            variable("c", IrTy::CHAR, vec![1]),
            variable("l", IrTy::Integer(IrIntegerKind::I64), vec![0; 8]),
        ];
        let layout = cwasm_macros::assert_ok!(MemoryLayout::new(&variables, &RecordTable::new()));
        assert_eq!(layout.address("c"), 32);
        assert_eq!(layout.address("l"), 40);
        assert_eq!(layout.stack_base, 1024);
        assert_eq!(layout.pages(), 17);
    }

    #[test]
    fn test_relocations_are_patched() {
        let mut pointer = variable("p", IrTy::pointer_to(IrTy::CHAR), vec![0; 4]);
        pointer.data.relocations = vec![(
            0,
            IrRelocation::Address {
                symbol: "s".to_owned(),
                addend: 2,
            },
        )];
        let variables = vec![variable("s", IrTy::Array(Box::new(IrTy::CHAR), Some(3)), b"hi\0".to_vec()), pointer];
        let layout = cwasm_macros::assert_ok!(MemoryLayout::new(&variables, &RecordTable::new()));
        let segments = layout.data_segments(&variables, &FunctionTable::default());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].offset, 32);
        assert_eq!(segments[0].bytes, b"hi".to_vec());
        assert_eq!(segments[1].offset, 36);
        assert_eq!(segments[1].bytes, 34u32.to_le_bytes()[..1].to_vec());
    }
}
