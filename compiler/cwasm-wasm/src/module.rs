use crate::instr::Instr;
use crate::runtime::{instantiate, HostImports, Instance, InstantiationError};
use crate::ty::{FuncType, ValType, Value};

pub const PAGE_SIZE: u32 = 65536;

/// A function provided by the host.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WasmImport {
    pub module: String,
    pub name: String,
    pub ty: FuncType,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WasmFunction {
    /// Symbolic name, used by textual output and diagnostics.
    pub name: String,
    pub ty: FuncType,
    /// Locals beyond the parameters. Local indices count the parameters first.
    pub locals: Vec<ValType>,
    pub body: Vec<Instr>,
    pub export: Option<String>,
}

impl WasmFunction {
    pub fn local_count(&self) -> u32 {
        (self.ty.params.len() + self.locals.len()) as u32
    }

    pub fn local_type(&self, index: u32) -> Option<ValType> {
        let index = index as usize;
        match index < self.ty.params.len() {
            true => self.ty.params.get(index).copied(),
            false => self.locals.get(index - self.ty.params.len()).copied(),
        }
    }

    /// Append a fresh local and return its index.
    pub fn add_local(&mut self, ty: ValType) -> u32 {
        self.locals.push(ty);
        self.local_count() - 1
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WasmGlobal {
    pub name: String,
    pub mutable: bool,
    pub init: Value,
    pub export: Option<String>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WasmMemory {
    /// Initial size in 64 KiB pages.
    pub pages: u32,
    pub export: Option<String>,
}

/// An active data segment in memory zero.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WasmData {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

impl WasmData {
    /// A segment holding `bytes` at `offset`, with leading and trailing zeros dropped since memory
    /// starts zeroed. Returns `None` when nothing is left.
    pub fn trimmed(offset: u32, bytes: &[u8]) -> Option<WasmData> {
        let start = bytes.iter().position(|b| *b != 0)?;
        let end = bytes.iter().rposition(|b| *b != 0)? + 1;
        Some(WasmData {
            offset: offset + start as u32,
            bytes: bytes[start..end].to_vec(),
        })
    }
}

/// A complete module description.
///
/// The function index space holds the imports first, then the defined functions. The function
/// table is only present when `table` is non-empty; its slot zero stays empty so that a null
/// function pointer never refers to a function.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WasmModule {
    pub imports: Vec<WasmImport>,
    pub functions: Vec<WasmFunction>,
    /// Function indices stored in table slots 1 and up.
    pub table: Vec<u32>,
    pub memory: Option<WasmMemory>,
    pub globals: Vec<WasmGlobal>,
    pub data: Vec<WasmData>,
}

impl WasmModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import_count(&self) -> u32 {
        self.imports.len() as u32
    }

    /// The signature of a function by its index in the function index space.
    pub fn function_type(&self, index: u32) -> Option<&FuncType> {
        let index = index as usize;
        match index < self.imports.len() {
            true => self.imports.get(index).map(|i| &i.ty),
            false => self
                .functions
                .get(index - self.imports.len())
                .map(|f| &f.ty),
        }
    }

    /// The defined function at a function-space index, if it is not an import.
    pub fn defined_function(&self, index: u32) -> Option<&WasmFunction> {
        (index as usize)
            .checked_sub(self.imports.len())
            .and_then(|i| self.functions.get(i))
    }

    /// Look a function up by its symbolic name, returning its function-space index.
    pub fn function_index(&self, name: &str) -> Option<u32> {
        if let Some(i) = self.imports.iter().position(|i| i.name == name) {
            return Some(i as u32);
        }
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| (i + self.imports.len()) as u32)
    }

    pub fn exported_function(&self, export: &str) -> Option<&WasmFunction> {
        self.functions
            .iter()
            .find(|f| f.export.as_deref() == Some(export))
    }

    pub fn global_index(&self, name: &str) -> Option<u32> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| i as u32)
    }

    /// Whether the function is stored in the function table.
    pub fn is_in_table(&self, index: u32) -> bool {
        self.table.contains(&index)
    }

    /// Encode the module into its binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::encode::build(self)
    }

    /// Encode the module and instantiate it on the engine.
    pub fn instantiate(&self, imports: HostImports) -> Result<Instance, InstantiationError> {
        instantiate(self, imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_segments_drop_zero_edges() {
        let data = WasmData::trimmed(32, &[0, 0, 1, 0, 2, 0]);
        assert_eq!(
            data,
            Some(WasmData {
                offset: 34,
                bytes: vec![1, 0, 2]
            })
        );
        assert_eq!(WasmData::trimmed(32, &[0, 0, 0]), None);
    }

    #[test]
    fn test_function_index_space_starts_with_imports() {
        let module = WasmModule {
            imports: vec![WasmImport {
                module: "c2wasm".to_owned(),
                name: "log".to_owned(),
                ty: FuncType::new(vec![ValType::I32], None),
            }],
            functions: vec![WasmFunction {
                name: "main".to_owned(),
                ty: FuncType::new(vec![], Some(ValType::I32)),
                locals: vec![],
                body: vec![Instr::I32Const(0)],
                export: Some("main".to_owned()),
            }],
            ..WasmModule::default()
        };
        assert_eq!(module.function_index("log"), Some(0));
        assert_eq!(module.function_index("main"), Some(1));
        assert_eq!(module.function_type(1).and_then(|t| t.result), Some(ValType::I32));
        assert!(module.defined_function(0).is_none());
    }
}
