//! Harness for running compiled programs in end-to-end tests.
//!
//! Programs are encoded and run on `wasmer`. The only host function is `__put_char`, which the
//! bundled runtime library uses for all of its output.

use cwasm_driver::{Compiler, Library};
use cwasm_opt::OptimizationFlags;
use cwasm_wasm::{FuncType, HostImports, Trap, ValType, Value, WasmModule};
use std::sync::{Arc, Mutex};

/// The result of running a program's `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    pub status: i32,
}

/// Host functions that record every character written through `__put_char`.
pub fn recording_imports() -> (HostImports, Arc<Mutex<Vec<u8>>>) {
    let output = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&output);
    let imports = HostImports::new().function(
        "c2wasm",
        "__put_char",
        FuncType::new(vec![ValType::I32], None),
        move |args| match (args, sink.lock()) {
            ([Value::I32(c)], Ok(mut bytes)) => {
                bytes.push(*c as u8);
                Ok(None)
            }
            _ => Err(Trap::Host("__put_char expects one int".to_owned())),
        },
    );
    (imports, output)
}

/// Run the exported `main` of a module.
pub fn execute(module: &WasmModule) -> miette::Result<Execution> {
    let (imports, output) = recording_imports();
    let mut instance = module.instantiate(imports)?;
    let status = instance.invoke_i32("main", &[])?;
    let output = output
        .lock()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|_| miette::miette!("program output was lost"))?;
    Ok(Execution { output, status })
}

/// Compile a single file against the bundled runtime with the given flags, then run it.
pub fn compile_and_execute(source: &str, flags: OptimizationFlags) -> miette::Result<Execution> {
    let mut compiler = Compiler::new();
    compiler.set_flags(flags);
    let module = compiler.compile_source(source, Some(Library::standard()))?;
    execute(&module)
}

/// The expected output of a test program, given in a trailing `/* output:` comment.
pub fn expected_output(source: &str) -> Option<&str> {
    const MARKER: &str = "/* output:\n";
    let start = source.rfind(MARKER)? + MARKER.len();
    let end = start + source[start..].find("*/")?;
    Some(&source[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_macros::{assert_none, assert_some};

    #[test]
    fn test_expected_output_marker() {
        let source = "int main(void) { return 0; }\n/* output:\nhello\n42\n*/\n";
        assert_eq!(assert_some!(expected_output(source)), "hello\n42\n");
        assert_none!(expected_output("int main(void) { return 0; }"));
    }
}
