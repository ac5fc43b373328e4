//! Storage assignment for the locals of one function.

use crate::abi::val_type;
use crate::error::{CodegenResult, FrameTooLargeError};
use crate::layout::STACK_SIZE;
use cwasm_diagnostics::ice;
use cwasm_ir::item::{IrFunction, LocalId};
use cwasm_ir::ty::RecordTable;
use cwasm_wasm::ValType;

/// Frames are kept eight-byte aligned so every slot in them is naturally aligned.
pub const FRAME_ALIGN: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A WebAssembly local or parameter.
    Wasm(u32),
    /// A slot at this offset from the frame base.
    Frame(u32),
}

#[derive(Debug)]
pub struct FrameLayout {
    storage: Vec<Storage>,
    /// Parameters living in the frame, with the WebAssembly parameter they arrive in.
    pub spilled_parameters: Vec<(LocalId, u32)>,
    /// The hidden destination pointer of a function returning a struct or union.
    pub result_pointer: Option<u32>,
    /// The hidden variadic argument area pointer.
    pub variadic_area: Option<u32>,
    pub parameter_count: u32,
    /// Types of the WebAssembly locals declared after the parameters.
    pub locals: Vec<ValType>,
    pub size: u32,
}

impl FrameLayout {
    pub fn new(function: &IrFunction, records: &RecordTable) -> CodegenResult<Self> {
        let mut storage = vec![Storage::Frame(0); function.locals.len()];
        let mut spilled_parameters = Vec::new();
        let mut next = 0;
        let result_pointer = function.ty.return_type.is_record().then(|| {
            next += 1;
            0
        });

        let mut size: u64 = 0;
        let mut place = |id: LocalId| {
            let local = function.local(id);
            let align = u64::from(local.ty.align(records).max(1));
            size = size.div_ceil(align) * align;
            let offset = size;
            size += u64::from(local.ty.size(records));
            Storage::Frame(offset as u32)
        };

        for id in &function.parameters {
            let index = next;
            next += 1;
            storage[id.0 as usize] = match function.local(*id).escapes {
                true => {
                    spilled_parameters.push((*id, index));
                    place(*id)
                }
                false => Storage::Wasm(index),
            };
        }
        let variadic_area = function.ty.variadic.then(|| {
            next += 1;
            next - 1
        });
        let parameter_count = next;

        let mut locals = Vec::new();
        for (index, local) in function.locals.iter().enumerate() {
            let id = LocalId(index as u32);
            if function.parameters.contains(&id) {
                continue;
            }
            storage[index] = match (local.escapes, val_type(&local.ty)) {
                (false, Some(ty)) if !local.ty.is_aggregate() => {
                    locals.push(ty);
                    Storage::Wasm(parameter_count + locals.len() as u32 - 1)
                }
                (false, None) => ice!("local '{}' has no value type", local.name),
                _ => place(id),
            };
        }

        let size = size.div_ceil(u64::from(FRAME_ALIGN)) * u64::from(FRAME_ALIGN);
        if size > u64::from(STACK_SIZE) {
            return Err(FrameTooLargeError {
                function: function.link_name.clone(),
                size,
                span: function.span,
            }
            .into());
        }
        Ok(Self {
            storage,
            spilled_parameters,
            result_pointer,
            variadic_area,
            parameter_count,
            locals,
            size: size as u32,
        })
    }

    pub fn storage(&self, id: LocalId) -> Storage {
        self.storage[id.0 as usize]
    }

    pub fn has_frame(&self) -> bool {
        self.size > 0
    }
}
