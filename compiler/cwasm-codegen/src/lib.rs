//! Code generation from a linked program to a module description.
//!
//! Every C object that cannot live in a WebAssembly local is placed in linear memory: statics in
//! a data area starting at address 32, automatic objects in per-call frames on a shadow stack.
//! The stack grows upward from the first 1024-byte boundary after the statics and is tracked by
//! the mutable global `__sp`, always global 0. Functions whose address is taken are collected
//! into the function table, and function pointers are table slots.

mod abi;
pub mod error;
mod frame;
mod function;
pub mod layout;

use crate::abi::signature;
use crate::error::CodegenResult;
use crate::function::FunctionGenerator;
use crate::layout::{FunctionTable, MemoryLayout};
use cwasm_diagnostics::ice;
use cwasm_link::LinkedProgram;
use cwasm_wasm::instr::walk;
use cwasm_wasm::{FuncType, Instr, Value, WasmGlobal, WasmImport, WasmMemory, WasmModule};
use std::collections::HashMap;

/// Import module name of host functions.
pub const IMPORT_MODULE: &str = "c2wasm";
pub const STACK_POINTER_NAME: &str = "__sp";
pub const MEMORY_NAME: &str = "__mem";

/// Global index of the shadow stack pointer.
pub(crate) const STACK_POINTER: u32 = 0;

/// What function generation needs to know about the whole program.
pub(crate) struct ModuleContext<'p> {
    pub program: &'p LinkedProgram,
    pub layout: &'p MemoryLayout,
    pub table: &'p FunctionTable,
    /// Function-space index and lowered signature of every callable function.
    pub functions: HashMap<&'p str, (u32, FuncType)>,
}

/// Generate the module for a linked program.
pub fn generate(program: &LinkedProgram) -> CodegenResult<WasmModule> {
    let layout = MemoryLayout::new(&program.variables, &program.records)?;
    let table = FunctionTable::collect(&program.functions, &program.variables);

    let mut functions = HashMap::new();
    let mut imports = Vec::with_capacity(program.imports.len());
    for import in &program.imports {
        let ty = signature(&import.ty);
        functions.insert(import.name.as_str(), (imports.len() as u32, ty.clone()));
        imports.push(WasmImport {
            module: IMPORT_MODULE.to_owned(),
            name: import.name.clone(),
            ty,
        });
    }
    for (position, function) in program.functions.iter().enumerate() {
        let index = (imports.len() + position) as u32;
        functions.insert(function.link_name.as_str(), (index, signature(&function.ty)));
    }

    let cx = ModuleContext {
        program,
        layout: &layout,
        table: &table,
        functions,
    };
    let mut uses_stack = false;
    let mut defined = Vec::with_capacity(program.functions.len());
    for function in &program.functions {
        let (function, frame) = FunctionGenerator::new(&cx, function)?.generate()?;
        uses_stack |= frame;
        defined.push(function);
    }

    // The host needs the stack pointer to pass pointers and structs to exported functions.
    let exported_memory_arguments = program.functions.iter().any(|f| {
        program.is_exported(&f.link_name)
            && (f.ty.return_type.is_record()
                || f.ty
                    .parameters
                    .iter()
                    .chain(std::iter::once(&f.ty.return_type))
                    .any(|ty| ty.is_pointer() || ty.is_record()))
    });
    let needs_stack = uses_stack || exported_memory_arguments;
    let touches_memory = defined.iter().any(|f| {
        let mut found = false;
        walk(&f.body, &mut |instr| {
            found |= matches!(
                instr,
                Instr::Load(..)
                    | Instr::Store(..)
                    | Instr::MemorySize
                    | Instr::MemoryGrow
                    | Instr::MemoryCopy
                    | Instr::MemoryFill
            );
        });
        found
    });

    let mut globals = Vec::new();
    if needs_stack {
        globals.push(WasmGlobal {
            name: STACK_POINTER_NAME.to_owned(),
            mutable: true,
            init: Value::I32(layout.stack_base as i32),
            export: Some(STACK_POINTER_NAME.to_owned()),
        });
    }
    let memory = (needs_stack || touches_memory || !program.variables.is_empty()).then(|| {
        WasmMemory {
            pages: layout.pages(),
            export: Some(MEMORY_NAME.to_owned()),
        }
    });

    let table_indices = table
        .entries()
        .iter()
        .map(|name| match cx.functions.get(name.as_str()) {
            Some((index, _)) => *index,
            None => ice!("table entry '{}' is not a function", name),
        })
        .collect::<Vec<_>>();

    let module = WasmModule {
        imports,
        functions: defined,
        table: table_indices,
        memory,
        globals,
        data: layout.data_segments(&program.variables, &table),
    };
    tracing::debug!(
        functions = module.functions.len(),
        imports = module.imports.len(),
        table = module.table.len(),
        segments = module.data.len(),
        stack = needs_stack,
        "generated module"
    );
    Ok(module)
}
