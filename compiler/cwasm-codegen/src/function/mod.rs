//! Lowering of one IR function into an instruction tree.
//!
//! Branch targets are tracked on an explicit label stack that mirrors the structured
//! instructions being built, so a `break`, `continue` or `goto` computes its relative depth from
//! the position of its target on that stack.

mod convert;
mod expr;
mod stmt;

use crate::abi::signature;
use crate::error::CodegenResult;
use crate::frame::{FrameLayout, Storage};
use crate::{ModuleContext, STACK_POINTER};
use cwasm_diagnostics::ice;
use cwasm_ir::item::{IrFunction, LocalId};
use cwasm_ir::stmt::IrStmt;
use cwasm_wasm::instr::{BinaryOp, Instr};
use cwasm_wasm::{ValType, WasmFunction};
use std::collections::{HashMap, HashSet};

/// What a structured instruction on the label stack is a target for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    /// Branching here leaves the innermost loop or switch.
    Break,
    /// Branching here starts the next iteration of the innermost loop.
    Continue,
    /// The dispatch loop of a compound statement with goto targets.
    Dispatcher(usize),
    Plain,
}

pub struct FunctionGenerator<'a> {
    cx: &'a ModuleContext<'a>,
    function: &'a IrFunction,
    frame: FrameLayout,
    /// Local holding the frame base, present when the function has a frame.
    frame_pointer: Option<u32>,
    labels: Vec<Label>,
    /// Labels that some `goto` jumps to.
    goto_labels: HashSet<String>,
    /// Dispatcher and segment index of every goto target whose compound is being generated.
    goto_targets: HashMap<String, (usize, u32)>,
    /// The segment selector local of each dispatcher.
    dispatchers: Vec<u32>,
    uses_stack: bool,
}

impl<'a> FunctionGenerator<'a> {
    pub fn new(cx: &'a ModuleContext<'a>, function: &'a IrFunction) -> CodegenResult<Self> {
        let frame = FrameLayout::new(function, &cx.program.records)?;
        let mut goto_labels = HashSet::new();
        stmt::collect_goto_labels(&function.body, &mut goto_labels);
        let mut generator = Self {
            cx,
            function,
            frame,
            frame_pointer: None,
            labels: Vec::new(),
            goto_labels,
            goto_targets: HashMap::new(),
            dispatchers: Vec::new(),
            uses_stack: false,
        };
        if generator.frame.has_frame() {
            generator.frame_pointer = Some(generator.temp(ValType::I32));
            generator.uses_stack = true;
        }
        Ok(generator)
    }

    /// Generate the function. Also reports whether it touches the stack pointer.
    pub fn generate(mut self) -> CodegenResult<(WasmFunction, bool)> {
        tracing::trace!(function = self.function.link_name, frame = self.frame.size, "generating function");
        let mut body = Vec::new();
        self.prologue(&mut body);
        let function = self.function;
        self.function_body(&function.body, &mut body)?;
        if !self.labels.is_empty() {
            ice!("label stack not empty after generating '{}'", self.function.link_name);
        }
        let export = match self.cx.program.is_exported(&self.function.link_name) {
            true => Some(self.function.link_name.clone()),
            false => None,
        };
        let function = WasmFunction {
            name: self.function.link_name.clone(),
            ty: signature(&self.function.ty),
            locals: self.frame.locals,
            body,
            export,
        };
        Ok((function, self.uses_stack))
    }

    /// Claim the frame, zero it, and move parameters that live in memory into their slots.
    fn prologue(&mut self, out: &mut Vec<Instr>) {
        let Some(fp) = self.frame_pointer else {
            return;
        };
        out.extend([
            Instr::GlobalGet(STACK_POINTER),
            Instr::LocalSet(fp),
            Instr::LocalGet(fp),
            Instr::I32Const(0),
            Instr::I32Const(self.frame.size as i32),
            Instr::MemoryFill,
        ]);
        for (id, index) in self.frame.spilled_parameters.clone() {
            let ty = self.function.local(id).ty.clone();
            self.local_address(id, out);
            out.push(Instr::LocalGet(index));
            match ty.is_record() {
                true => {
                    out.push(Instr::I32Const(self.size_of(&ty) as i32));
                    out.push(Instr::MemoryCopy);
                }
                false => {
                    let (kind, arg) = crate::abi::store(&ty);
                    out.push(Instr::Store(kind, arg));
                }
            }
        }
    }

    /// The top-level statements. A trailing `return` falls off the end instead of branching, and
    /// a value-returning function that can reach its end traps there.
    fn function_body(&mut self, body: &[IrStmt], out: &mut Vec<Instr>) -> CodegenResult<()> {
        let returns_value = !self.function.ty.return_type.is_void();
        if self.needs_dispatcher(body) {
            self.compound(body, out)?;
            if returns_value {
                out.push(Instr::Unreachable);
            }
            return Ok(());
        }
        let (last, init) = match body.split_last() {
            Some((last, init)) => (Some(last), init),
            None => (None, body),
        };
        for stmt in init {
            self.stmt(stmt, out)?;
        }
        match last {
            Some(IrStmt::Return(value)) => self.return_value(value.as_ref(), out),
            Some(stmt) => {
                self.stmt(stmt, out)?;
                if returns_value {
                    out.push(Instr::Unreachable);
                }
                Ok(())
            }
            None if returns_value => {
                out.push(Instr::Unreachable);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// A fresh local of the given type.
    fn temp(&mut self, ty: ValType) -> u32 {
        self.frame.locals.push(ty);
        self.frame.parameter_count + self.frame.locals.len() as u32 - 1
    }

    fn frame_pointer(&self) -> u32 {
        match self.frame_pointer {
            Some(fp) => fp,
            None => ice!("'{}' uses its frame but has none", self.function.link_name),
        }
    }

    /// Push the address of a local that lives in the frame.
    fn local_address(&self, id: LocalId, out: &mut Vec<Instr>) {
        match self.frame.storage(id) {
            Storage::Frame(offset) => {
                out.push(Instr::LocalGet(self.frame_pointer()));
                if offset != 0 {
                    out.push(Instr::I32Const(offset as i32));
                    out.push(Instr::Binary(ValType::I32, BinaryOp::Add));
                }
            }
            Storage::Wasm(_) => ice!(
                "address of local '{}' that is not in memory",
                self.function.local(id).name
            ),
        }
    }

    /// Point `__sp` past this frame before a call, so the callee's frame starts there.
    fn enter_call(&mut self, out: &mut Vec<Instr>) {
        let Some(fp) = self.frame_pointer else {
            return;
        };
        out.extend([
            Instr::LocalGet(fp),
            Instr::I32Const(self.frame.size as i32),
            Instr::Binary(ValType::I32, BinaryOp::Add),
            Instr::GlobalSet(STACK_POINTER),
        ]);
    }

    fn leave_call(&mut self, out: &mut Vec<Instr>) {
        if let Some(fp) = self.frame_pointer {
            out.extend([Instr::LocalGet(fp), Instr::GlobalSet(STACK_POINTER)]);
        }
    }

    fn size_of(&self, ty: &cwasm_ir::ty::IrTy) -> u32 {
        ty.size(&self.cx.program.records)
    }

    /// Relative depth of the innermost label matching `label`.
    fn depth(&self, label: Label) -> u32 {
        match self.labels.iter().rev().position(|l| *l == label) {
            Some(depth) => depth as u32,
            None => ice!("no enclosing {:?} target in '{}'", label, self.function.link_name),
        }
    }
}
