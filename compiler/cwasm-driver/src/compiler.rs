use crate::error::CompileError;
use crate::library::Library;
use crate::pipeline::{execute_compilation_pipeline, PipelineOptions};
use cwasm_opt::error::FlagResult;
use cwasm_opt::OptimizationFlags;
use cwasm_wasm::WasmModule;
use std::collections::BTreeMap;

/// File name given to the source of single-string compilations.
pub const SOURCE_FILE_NAME: &str = "main.c";

/// Entry point for embedding the compiler.
///
/// A compiler owns its options, including the optimization flags, so compilations through
/// different instances never observe each other's configuration. Every compilation is a single
/// synchronous call.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: PipelineOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Predefine a macro for every translation unit.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.options.defines.push((name.into(), value.into()));
    }

    /// Every optimization flag with its current value.
    pub fn flags(&self) -> BTreeMap<&'static str, bool> {
        self.options.flags.to_map()
    }

    pub fn optimization_flags(&self) -> &OptimizationFlags {
        &self.options.flags
    }

    pub fn set_flags(&mut self, flags: OptimizationFlags) {
        self.options.flags = flags;
    }

    /// Change some flags, leaving the others as they are. If any name is unknown, no flag
    /// changes.
    pub fn merge_flags<'a>(
        &mut self,
        flags: impl IntoIterator<Item = (&'a str, bool)>,
    ) -> FlagResult<()> {
        self.options.flags.merge(flags)
    }

    /// Replace every flag with a named preset.
    pub fn set_flags_preset(&mut self, name: &str) -> FlagResult<()> {
        self.options.flags = OptimizationFlags::preset(name)?;
        Ok(())
    }

    /// Compile a set of files into one module. Header files are only read through `#include`.
    pub fn compile(
        &self,
        files: &BTreeMap<String, String>,
        library: Option<&Library>,
    ) -> Result<WasmModule, CompileError> {
        tracing::debug!(files = files.len(), library = library.is_some(), "compiling");
        execute_compilation_pipeline(&self.options, files, library)
    }

    /// Compile a single source string.
    pub fn compile_source(
        &self,
        source: &str,
        library: Option<&Library>,
    ) -> Result<WasmModule, CompileError> {
        let files = BTreeMap::from([(SOURCE_FILE_NAME.to_owned(), source.to_owned())]);
        self.compile(&files, library)
    }

    /// Compile a single source string on its own. Every referenced symbol must be defined in it.
    pub fn compile_snippet(&self, source: &str) -> Result<WasmModule, CompileError> {
        let options = PipelineOptions {
            restricted: true,
            ..self.options.clone()
        };
        let files = BTreeMap::from([(SOURCE_FILE_NAME.to_owned(), source.to_owned())]);
        execute_compilation_pipeline(&options, &files, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use cwasm_macros::{assert_err, assert_matches, assert_ok};
    use cwasm_opt::error::FlagError;
    use cwasm_wasm::HostImports;

    fn run(module: &WasmModule, export: &str, args: &[i32]) -> i32 {
        let mut instance = assert_ok!(module.instantiate(HostImports::new()));
        assert_ok!(instance.invoke_i32(export, args))
    }

    #[test]
    fn test_flags_are_owned_per_compiler() {
        let mut first = Compiler::new();
        let second = Compiler::new();
        assert_ok!(first.set_flags_preset("none"));
        assert_ok!(first.merge_flags([("inlining", true)]));
        assert!(first.flags()["inlining"]);
        assert!(!first.flags()["copy_propagation"]);
        assert_eq!(second.flags(), OptimizationFlags::default().to_map());
    }

    #[test]
    fn test_default_flags() {
        insta::assert_debug_snapshot!(Compiler::new().flags(), @r#"
        {
            "copy_propagation": true,
            "dead_code_elimination": true,
            "generation_switch_br_table": true,
            "inlining": true,
            "live_range_splitting": true,
            "partial_redundancy_elimination": false,
            "peephole_2nd_pass": true,
            "peephole_add_0": true,
            "peephole_combine_adds": true,
            "peephole_constant_if": true,
            "peephole_constants_add_mul": true,
            "peephole_i32_constants_ops": true,
            "peephole_load_offset": true,
            "peephole_local_tee": true,
            "peephole_unused_blocks": true,
            "reallocate_locals": true,
            "unused_locals": true,
        }
        "#);
    }

    #[test]
    fn test_unknown_flags_change_nothing() {
        let mut compiler = Compiler::new();
        let before = compiler.flags();
        let err = assert_err!(compiler.merge_flags([("inlining", false), ("unroll", true)]));
        assert_matches!(err, FlagError::UnknownFlag(_));
        assert_eq!(compiler.flags(), before);
        let err = assert_err!(compiler.set_flags_preset("O3"));
        assert_matches!(err, FlagError::UnknownPreset(_));
    }

    #[test]
    fn test_compile_multiple_files() {
        let files = BTreeMap::from([
            (
                "main.c".to_owned(),
                "#include \"util.h\"\nint run(int x) { return triple(x) + OFFSET; }".to_owned(),
            ),
            ("util.c".to_owned(), "int triple(int x) { return 3 * x; }".to_owned()),
            (
                "util.h".to_owned(),
                "#define OFFSET 1\nint triple(int x);".to_owned(),
            ),
        ]);
        let module = assert_ok!(Compiler::new().compile(&files, None));
        assert_eq!(run(&module, "run", &[4]), 13);
    }

    #[test]
    fn test_defines_reach_every_unit() {
        let mut compiler = Compiler::new();
        compiler.define("ANSWER", "42");
        let module = assert_ok!(compiler.compile_snippet("int answer(void) { return ANSWER; }"));
        assert_eq!(run(&module, "answer", &[]), 42);
    }

    #[test]
    fn test_snippets_never_link_a_library() {
        let source = "#include <stdlib.h>\nint run(void) { return abs(-3); }";
        let module = assert_ok!(Compiler::new().compile_source(source, Some(Library::standard())));
        assert_eq!(run(&module, "run", &[]), 3);
        let err = assert_err!(Compiler::new().compile_snippet(source));
        assert_matches!(err.kind, PipelineError::Preprocess(_));
        assert_eq!(err.file.as_deref(), Some(SOURCE_FILE_NAME));
        let source = "int abs(int); int run(void) { return abs(-3); }";
        let err = assert_err!(Compiler::new().compile_snippet(source));
        assert_matches!(err.kind, PipelineError::Link(_));
        assert_eq!(err.file, None);
    }
}
