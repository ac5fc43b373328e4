//! Textual rendering of module descriptions.
//!
//! The output follows the WebAssembly text format closely enough to be read side by side with
//! other tools, but it is meant for humans: functions are referred to by their symbolic names and
//! no guarantees are made about round-tripping it through an assembler.

use crate::instr::{Instr, MemArg};
use crate::module::{WasmFunction, WasmModule};
use crate::ty::{BlockType, FuncType};
use cwasm_diagnostics::ice;
use pretty::RcDoc;

pub struct WatPrinter<'m> {
    module: &'m WasmModule,
}

impl<'m> WatPrinter<'m> {
    pub fn new(module: &'m WasmModule) -> Self {
        Self { module }
    }

    pub fn format_module_to_string(module: &WasmModule) -> String {
        let printer = WatPrinter::new(module);
        let mut w = Vec::new();
        printer
            .format_module()
            .render(100, &mut w)
            .unwrap_or_else(|_| ice!("failed to render module text"));
        String::from_utf8(w).unwrap_or_else(|_| ice!("module text is not utf-8"))
    }

    pub fn format_module(&self) -> RcDoc<'m, ()> {
        let mut fields = Vec::new();
        for import in &self.module.imports {
            fields.push(RcDoc::text(format!(
                "(import \"{}\" \"{}\" (func ${}{}))",
                import.module,
                import.name,
                import.name,
                signature(&import.ty)
            )));
        }
        for function in &self.module.functions {
            fields.push(self.format_function(function));
        }
        if !self.module.table.is_empty() {
            fields.push(RcDoc::text(format!(
                "(table {} funcref)",
                self.module.table.len() + 1
            )));
        }
        if let Some(memory) = &self.module.memory {
            let export = match &memory.export {
                Some(name) => format!(" (export \"{name}\")"),
                None => String::new(),
            };
            fields.push(RcDoc::text(format!("(memory{export} {})", memory.pages)));
        }
        for global in &self.module.globals {
            let export = match &global.export {
                Some(name) => format!(" (export \"{name}\")"),
                None => String::new(),
            };
            let ty = match global.mutable {
                true => format!("(mut {})", global.init.ty()),
                false => global.init.ty().to_string(),
            };
            fields.push(RcDoc::text(format!(
                "(global ${}{export} {ty} ({}))",
                global.name, global.init
            )));
        }
        if !self.module.table.is_empty() {
            let names = self
                .module
                .table
                .iter()
                .map(|index| format!("${}", self.function_name(*index)))
                .collect::<Vec<_>>()
                .join(" ");
            fields.push(RcDoc::text(format!("(elem (i32.const 1) func {names})")));
        }
        for segment in &self.module.data {
            fields.push(RcDoc::text(format!(
                "(data (i32.const {}) \"{}\")",
                segment.offset,
                escape(&segment.bytes)
            )));
        }
        RcDoc::text("(module")
            .append(
                RcDoc::concat(fields.into_iter().map(|f| RcDoc::hardline().append(f))).nest(2),
            )
            .append(RcDoc::text(")"))
    }

    pub fn format_function(&self, function: &'m WasmFunction) -> RcDoc<'m, ()> {
        let export = match &function.export {
            Some(name) => format!(" (export \"{name}\")"),
            None => String::new(),
        };
        let mut header = RcDoc::text(format!(
            "(func ${}{export}{}",
            function.name,
            signature(&function.ty)
        ));
        if !function.locals.is_empty() {
            let locals = function
                .locals
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            header = header.append(
                RcDoc::hardline()
                    .append(RcDoc::text(format!("(local {locals})")))
                    .nest(2),
            );
        }
        header
            .append(self.format_sequence(&function.body).nest(2))
            .append(RcDoc::text(")"))
    }

    /// A sequence of instructions, each on its own line preceded by a line break.
    fn format_sequence(&self, body: &'m [Instr]) -> RcDoc<'m, ()> {
        RcDoc::concat(
            body.iter()
                .map(|instr| RcDoc::hardline().append(self.format_instr(instr))),
        )
    }

    fn format_instr(&self, instr: &'m Instr) -> RcDoc<'m, ()> {
        match instr {
            Instr::Block { ty, body } => RcDoc::text(format!("block{}", block_type(*ty)))
                .append(self.format_sequence(body).nest(2))
                .append(RcDoc::hardline())
                .append(RcDoc::text("end")),
            Instr::Loop { ty, body } => RcDoc::text(format!("loop{}", block_type(*ty)))
                .append(self.format_sequence(body).nest(2))
                .append(RcDoc::hardline())
                .append(RcDoc::text("end")),
            Instr::If {
                ty,
                then,
                otherwise,
            } => {
                let mut doc = RcDoc::text(format!("if{}", block_type(*ty)))
                    .append(self.format_sequence(then).nest(2));
                if !otherwise.is_empty() {
                    doc = doc
                        .append(RcDoc::hardline())
                        .append(RcDoc::text("else"))
                        .append(self.format_sequence(otherwise).nest(2));
                }
                doc.append(RcDoc::hardline()).append(RcDoc::text("end"))
            }
            other => RcDoc::text(self.plain_instr(other)),
        }
    }

    fn plain_instr(&self, instr: &Instr) -> String {
        match instr {
            Instr::Unreachable => "unreachable".to_owned(),
            Instr::Nop => "nop".to_owned(),
            Instr::Br(depth) => format!("br {depth}"),
            Instr::BrIf(depth) => format!("br_if {depth}"),
            Instr::BrTable { targets, default } => {
                let targets = targets
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("br_table {targets} {default}")
            }
            Instr::Return => "return".to_owned(),
            Instr::Call(index) => format!("call ${}", self.function_name(*index)),
            Instr::CallIndirect(ty) => format!("call_indirect{}", signature(ty)),
            Instr::Drop => "drop".to_owned(),
            Instr::Select => "select".to_owned(),
            Instr::LocalGet(index) => format!("local.get {index}"),
            Instr::LocalSet(index) => format!("local.set {index}"),
            Instr::LocalTee(index) => format!("local.tee {index}"),
            Instr::GlobalGet(index) => format!("global.get ${}", self.global_name(*index)),
            Instr::GlobalSet(index) => format!("global.set ${}", self.global_name(*index)),
            Instr::Load(kind, arg) => format!("{}{}", kind.mnemonic(), mem_arg(*arg, kind.width())),
            Instr::Store(kind, arg) => {
                format!("{}{}", kind.mnemonic(), mem_arg(*arg, kind.width()))
            }
            Instr::MemorySize => "memory.size".to_owned(),
            Instr::MemoryGrow => "memory.grow".to_owned(),
            Instr::MemoryCopy => "memory.copy".to_owned(),
            Instr::MemoryFill => "memory.fill".to_owned(),
            Instr::I32Const(v) => format!("i32.const {v}"),
            Instr::I64Const(v) => format!("i64.const {v}"),
            Instr::F32Const(v) => format!("f32.const {v:?}"),
            Instr::F64Const(v) => format!("f64.const {v:?}"),
            Instr::Eqz(ty) => format!("{ty}.eqz"),
            Instr::Compare(ty, op) => format!("{ty}.{}", op.name()),
            Instr::Unary(ty, op) => format!("{ty}.{}", op.name()),
            Instr::Binary(ty, op) => format!("{ty}.{}", op.name()),
            Instr::Convert(op) => op.mnemonic().to_owned(),
            Instr::Block { .. } | Instr::Loop { .. } | Instr::If { .. } => {
                ice!("structured instruction formatted as plain")
            }
        }
    }

    fn function_name(&self, index: u32) -> String {
        let imports = self.module.imports.len();
        let name = match (index as usize) < imports {
            true => self.module.imports.get(index as usize).map(|i| i.name.as_str()),
            false => self
                .module
                .functions
                .get(index as usize - imports)
                .map(|f| f.name.as_str()),
        };
        match name {
            Some(name) => name.to_owned(),
            None => index.to_string(),
        }
    }

    fn global_name(&self, index: u32) -> String {
        match self.module.globals.get(index as usize) {
            Some(global) => global.name.clone(),
            None => index.to_string(),
        }
    }
}

fn signature(ty: &FuncType) -> String {
    let mut text = String::new();
    if !ty.params.is_empty() {
        let params = ty
            .params
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        text.push_str(&format!(" (param {params})"));
    }
    if let Some(result) = ty.result {
        text.push_str(&format!(" (result {result})"));
    }
    text
}

fn block_type(ty: BlockType) -> String {
    match ty {
        BlockType::Empty => String::new(),
        BlockType::Result(ty) => format!(" (result {ty})"),
    }
}

/// Immediates are only printed when they differ from the defaults.
fn mem_arg(arg: MemArg, width: u32) -> String {
    let mut text = String::new();
    if arg.offset != 0 {
        text.push_str(&format!(" offset={}", arg.offset));
    }
    let align = 1u32 << arg.align;
    if align != width {
        text.push_str(&format!(" align={align}"));
    }
    text
}

fn escape(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            b' '..=b'~' if *b != b'"' && *b != b'\\' => (*b as char).to_string(),
            _ => format!("\\{b:02x}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{BinaryOp, LoadKind};
    use crate::module::{WasmData, WasmMemory};
    use crate::ty::ValType;

    #[test]
    fn test_format_function_with_nested_blocks() {
        let module = WasmModule {
            functions: vec![WasmFunction {
                name: "f".to_owned(),
                ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
                locals: vec![ValType::I32],
                body: vec![
                    Instr::Block {
                        ty: BlockType::Empty,
                        body: vec![Instr::LocalGet(0), Instr::BrIf(0)],
                    },
                    Instr::LocalGet(0),
                    Instr::Load(LoadKind::I32, MemArg::new(4, 2)),
                    Instr::I32Const(1),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                ],
                export: Some("f".to_owned()),
            }],
            memory: Some(WasmMemory {
                pages: 17,
                export: Some("__mem".to_owned()),
            }),
            data: vec![WasmData {
                offset: 32,
                bytes: b"hi\n".to_vec(),
            }],
            ..WasmModule::default()
        };
        let text = WatPrinter::format_module_to_string(&module);
        assert_eq!(
            text,
            "(module
  (func $f (export \"f\") (param i32) (result i32)
    (local i32)
    block
      local.get 0
      br_if 0
    end
    local.get 0
    i32.load offset=4
    i32.const 1
    i32.add)
  (memory (export \"__mem\") 17)
  (data (i32.const 32) \"hi\\0a\"))"
        );
    }
}
