//! Running modules on a WebAssembly engine.
//!
//! A module description is encoded with [`crate::encode`] and the resulting bytes are compiled
//! and instantiated by `wasmer`, so whatever runs here is exactly what a host would load. Imports
//! are bound to host functions keyed by import module and name.

pub mod error;

pub use crate::runtime::error::{InstantiationError, Trap};

use crate::module::WasmModule;
use crate::runtime::error::{
    ImportMismatchError, MissingImportError, ModuleCompileError, ModuleLinkError,
};
use crate::ty::{FuncType, ValType, Value};
use std::collections::BTreeMap;
use wasmer::{Function, FunctionType, Imports, Module, RuntimeError, Store, Type};
use wasmer_types::TrapCode;

pub type HostFn = Box<dyn Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync>;

pub struct HostFunction {
    pub ty: FuncType,
    pub func: HostFn,
}

/// Host functions by import module and name.
#[derive(Default)]
pub struct HostImports {
    functions: BTreeMap<(String, String), HostFunction>,
}

impl HostImports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host function, replacing any earlier one with the same module and name.
    pub fn function(
        mut self,
        module: &str,
        name: &str,
        ty: FuncType,
        func: impl Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static,
    ) -> Self {
        self.define(module, name, ty, func);
        self
    }

    pub fn define(
        &mut self,
        module: &str,
        name: &str,
        ty: FuncType,
        func: impl Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static,
    ) {
        self.functions.insert(
            (module.to_owned(), name.to_owned()),
            HostFunction {
                ty,
                func: Box::new(func),
            },
        );
    }
}

/// An instantiated module together with the store that owns its state.
pub struct Instance {
    store: Store,
    instance: wasmer::Instance,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("exports", &self.exports())
            .finish()
    }
}

/// Encode `module` and instantiate it, binding each of its imports to a host function.
pub fn instantiate(
    module: &WasmModule,
    mut imports: HostImports,
) -> Result<Instance, InstantiationError> {
    let mut store = Store::default();
    let mut resolved = Imports::new();
    for import in &module.imports {
        let key = (import.module.clone(), import.name.clone());
        let Some(host) = imports.functions.remove(&key) else {
            return Err(MissingImportError {
                module: import.module.clone(),
                name: import.name.clone(),
            }
            .into());
        };
        if host.ty != import.ty {
            return Err(ImportMismatchError {
                module: import.module.clone(),
                name: import.name.clone(),
                expected: import.ty.clone(),
                actual: host.ty,
            }
            .into());
        }
        let func = host.func;
        let function = Function::new(&mut store, function_type(&import.ty), move |args| {
            let args = args.iter().filter_map(from_engine).collect::<Vec<_>>();
            match func(&args) {
                Ok(result) => Ok(result.into_iter().map(to_engine).collect()),
                Err(trap) => Err(RuntimeError::new(trap.to_string())),
            }
        });
        resolved.define(&import.module, &import.name, function);
    }

    let bytes = module.to_bytes();
    let compiled = Module::new(&store, &bytes).map_err(|e| ModuleCompileError {
        message: e.to_string(),
    })?;
    let instance =
        wasmer::Instance::new(&mut store, &compiled, &resolved).map_err(|e| ModuleLinkError {
            message: e.to_string(),
        })?;
    tracing::debug!(
        bytes = bytes.len(),
        imports = module.imports.len(),
        "instantiated module"
    );
    Ok(Instance { store, instance })
}

impl Instance {
    /// Call an exported function.
    pub fn invoke(&mut self, export: &str, args: &[Value]) -> Result<Option<Value>, Trap> {
        let function = self
            .instance
            .exports
            .get_function(export)
            .map_err(|_| Trap::UnknownExport(export.to_owned()))?;
        let ty = function.ty(&self.store);
        let well_typed = ty.params().len() == args.len()
            && ty
                .params()
                .iter()
                .zip(args)
                .all(|(param, arg)| *param == engine_type(arg.ty()));
        if !well_typed {
            return Err(Trap::BadArguments(export.to_owned()));
        }
        let args = args.iter().copied().map(to_engine).collect::<Vec<_>>();
        let results = function.call(&mut self.store, &args).map_err(trap)?;
        match results.first() {
            None => Ok(None),
            Some(value) => from_engine(value)
                .map(Some)
                .ok_or_else(|| Trap::BadArguments(export.to_owned())),
        }
    }

    /// Call an exported function that takes and returns `int` values.
    pub fn invoke_i32(&mut self, export: &str, args: &[i32]) -> Result<i32, Trap> {
        let args = args.iter().map(|a| Value::I32(*a)).collect::<Vec<_>>();
        match self.invoke(export, &args)? {
            Some(Value::I32(v)) => Ok(v),
            _ => Err(Trap::BadArguments(export.to_owned())),
        }
    }

    /// Names of the exported functions, in export order.
    pub fn exports(&self) -> Vec<String> {
        self.instance
            .exports
            .iter()
            .functions()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// A copy of the exported linear memory, or nothing if the module exports none.
    pub fn memory(&self) -> Vec<u8> {
        let Some((_, memory)) = self.instance.exports.iter().memories().next() else {
            return Vec::new();
        };
        let view = memory.view(&self.store);
        let mut bytes = vec![0; view.data_size() as usize];
        match view.read(0, &mut bytes) {
            Ok(()) => bytes,
            Err(_) => Vec::new(),
        }
    }

    /// The current value of a global by its export name.
    pub fn global(&mut self, export: &str) -> Option<Value> {
        let global = self.instance.exports.get_global(export).ok()?;
        from_engine(&global.get(&mut self.store))
    }
}

fn engine_type(ty: ValType) -> Type {
    match ty {
        ValType::I32 => Type::I32,
        ValType::I64 => Type::I64,
        ValType::F32 => Type::F32,
        ValType::F64 => Type::F64,
    }
}

fn function_type(ty: &FuncType) -> FunctionType {
    let params = ty.params.iter().map(|p| engine_type(*p)).collect::<Vec<_>>();
    let results = ty.result.into_iter().map(engine_type).collect::<Vec<_>>();
    FunctionType::new(params, results)
}

fn to_engine(value: Value) -> wasmer::Value {
    match value {
        Value::I32(v) => wasmer::Value::I32(v),
        Value::I64(v) => wasmer::Value::I64(v),
        Value::F32(v) => wasmer::Value::F32(v),
        Value::F64(v) => wasmer::Value::F64(v),
    }
}

/// Reference and vector values never cross the boundary of a compiled C program.
fn from_engine(value: &wasmer::Value) -> Option<Value> {
    match value {
        wasmer::Value::I32(v) => Some(Value::I32(*v)),
        wasmer::Value::I64(v) => Some(Value::I64(*v)),
        wasmer::Value::F32(v) => Some(Value::F32(*v)),
        wasmer::Value::F64(v) => Some(Value::F64(*v)),
        _ => None,
    }
}

fn trap(error: RuntimeError) -> Trap {
    let message = error.message();
    match error.to_trap() {
        Some(TrapCode::UnreachableCodeReached) => Trap::Unreachable,
        Some(TrapCode::IntegerDivisionByZero) => Trap::IntegerDivideByZero,
        Some(TrapCode::IntegerOverflow | TrapCode::BadConversionToInteger) => {
            Trap::IntegerOverflow
        }
        Some(TrapCode::HeapAccessOutOfBounds) => Trap::MemoryOutOfBounds,
        Some(TrapCode::TableAccessOutOfBounds | TrapCode::IndirectCallToNull) => {
            Trap::UndefinedElement
        }
        Some(TrapCode::BadSignature) => Trap::IndirectCallMismatch,
        Some(TrapCode::StackOverflow) => Trap::CallStackExhausted,
        Some(_) => Trap::Runtime(message),
        None => Trap::Host(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{BinaryOp, Instr};
    use crate::module::{WasmFunction, WasmImport};
    use cwasm_macros::{assert_err, assert_matches, assert_ok};

    fn module_with_import() -> WasmModule {
        WasmModule {
            imports: vec![WasmImport {
                module: "c2wasm".to_owned(),
                name: "twice".to_owned(),
                ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            }],
            functions: vec![WasmFunction {
                name: "run".to_owned(),
                ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
                locals: vec![],
                body: vec![
                    Instr::LocalGet(0),
                    Instr::Call(0),
                    Instr::I32Const(1),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                ],
                export: Some("run".to_owned()),
            }],
            ..WasmModule::default()
        }
    }

    #[test]
    fn test_missing_import_fails_instantiation() {
        let err = assert_err!(instantiate(&module_with_import(), HostImports::new()));
        assert_matches!(err, InstantiationError::MissingImport(_));
    }

    #[test]
    fn test_import_signature_is_checked() {
        let imports = HostImports::new().function(
            "c2wasm",
            "twice",
            FuncType::new(vec![ValType::I64], Some(ValType::I32)),
            |_| Ok(Some(Value::I32(0))),
        );
        let err = assert_err!(instantiate(&module_with_import(), imports));
        assert_matches!(err, InstantiationError::ImportMismatch(_));
    }

    #[test]
    fn test_host_functions_are_called() {
        let imports = HostImports::new().function(
            "c2wasm",
            "twice",
            FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            |args| match args {
                [Value::I32(v)] => Ok(Some(Value::I32(v * 2))),
                _ => Err(Trap::Host("bad arguments".to_owned())),
            },
        );
        let mut instance = assert_ok!(instantiate(&module_with_import(), imports));
        assert_eq!(assert_ok!(instance.invoke_i32("run", &[20])), 41);
        let err = assert_err!(instance.invoke("missing", &[]));
        assert_eq!(err, Trap::UnknownExport("missing".to_owned()));
    }

    #[test]
    fn test_host_failures_surface_as_traps() {
        let imports = HostImports::new().function(
            "c2wasm",
            "twice",
            FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            |_| Err(Trap::Host("refused".to_owned())),
        );
        let mut instance = assert_ok!(instantiate(&module_with_import(), imports));
        let err = assert_err!(instance.invoke_i32("run", &[1]));
        let message = assert_matches!(err, Trap::Host(message) => message);
        assert!(message.contains("refused"));
    }
}
