//! Tests for the `cwasmc` command line interface.

use insta_cmd::get_cargo_bin;
use std::path::PathBuf;
use std::process::{Command, Output};

fn scratch(name: &str, source: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("cli_tests");
    std::fs::create_dir_all(&dir).expect("failed to create scratch directory");
    let path = dir.join(name);
    std::fs::write(&path, source).expect("failed to write scratch file");
    path
}

fn cwasmc(args: &[&str]) -> Output {
    Command::new(get_cargo_bin("cwasmc"))
        .args(args)
        .output()
        .expect("failed to run cwasmc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_compile_writes_a_valid_module() {
    let input = scratch("square.c", "int square(int x) { return x * x; }");
    let output = input.with_file_name("square_out.wasm");
    let result = cwasmc(&[
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(result.status.success(), "{}", stderr(&result));
    let bytes = std::fs::read(&output).expect("module should be written");
    assert_eq!(&bytes[..4], b"\0asm");
    wasmparser::Validator::new()
        .validate_all(&bytes)
        .expect("module should validate");
}

#[test]
fn test_output_defaults_to_input_name() {
    let input = scratch("answer.c", "int answer(void) { return 42; }");
    let _ = std::fs::remove_file(input.with_extension("wasm"));
    let result = cwasmc(&[input.to_str().unwrap()]);
    assert!(result.status.success(), "{}", stderr(&result));
    assert!(input.with_extension("wasm").exists());
}

#[test]
fn test_emit_wat_prints_module_text() {
    let input = scratch("emit.c", "int add(int a, int b) { return a + b; }");
    let result = cwasmc(&[input.to_str().unwrap(), "--emit-wat", "--opt", "none"]);
    assert!(result.status.success(), "{}", stderr(&result));
    let text = stdout(&result);
    assert!(text.starts_with("(module"));
    assert!(text.contains("(export \"add\")"));
    assert!(text.contains("i32.add"));
}

#[test]
fn test_emit_ast_and_ir() {
    let input = scratch("emit_ir.c", "#define TWO 2\nint two(void) { return TWO; }");
    let result = cwasmc(&[input.to_str().unwrap(), "--emit-ast", "--emit-ir", "--no-stdlib"]);
    assert!(result.status.success(), "{}", stderr(&result));
    let text = stdout(&result);
    assert!(text.contains("items"));
    assert!(text.contains("two"));
}

#[test]
fn test_defines_from_the_command_line() {
    let input = scratch("define.c", "int value(void) { return VALUE + ENABLED; }");
    let result = cwasmc(&[
        input.to_str().unwrap(),
        "-D",
        "VALUE=40",
        "-D",
        "ENABLED",
        "--emit-wat",
        "--opt",
        "default",
    ]);
    assert!(result.status.success(), "{}", stderr(&result));
    assert!(stdout(&result).contains("i32.const 41"));
}

#[test]
fn test_unknown_flag_is_reported() {
    let input = scratch("flag.c", "int f(void) { return 0; }");
    let result = cwasmc(&[input.to_str().unwrap(), "--flag", "loop_unrolling=true"]);
    assert!(!result.status.success());
    assert!(stderr(&result).contains("unknown optimization flag 'loop_unrolling'"));
}

#[test]
fn test_flags_file_is_loaded() {
    let input = scratch("flags_file.c", "int f(void) { int a = 3; return a; }");
    let flags = scratch("flags.ron", "(inlining: false, peephole_2nd_pass: false)");
    let result = cwasmc(&[
        input.to_str().unwrap(),
        "--flags-file",
        flags.to_str().unwrap(),
        "--emit-wat",
    ]);
    assert!(result.status.success(), "{}", stderr(&result));
    let bad = scratch("bad_flags.ron", "(vectorize: true)");
    let result = cwasmc(&[input.to_str().unwrap(), "--flags-file", bad.to_str().unwrap()]);
    assert!(!result.status.success());
    assert!(stderr(&result).contains("invalid optimization flags file"));
}

#[test]
fn test_syntax_errors_fail_the_compilation() {
    let input = scratch("broken.c", "int f(void) { return 1 }");
    let result = cwasmc(&[input.to_str().unwrap()]);
    assert!(!result.status.success());
    assert!(stderr(&result).contains("broken.c"));
}

#[test]
fn test_no_stdlib_leaves_references_unresolved() {
    let input = scratch(
        "hello.c",
        "#include <stdio.h>\nint main(void) { puts(\"hi\"); return 0; }",
    );
    let output = input.with_file_name("hello_out.wasm");
    let result = cwasmc(&[input.to_str().unwrap(), "-o", output.to_str().unwrap()]);
    assert!(result.status.success(), "{}", stderr(&result));
    let result = cwasmc(&[input.to_str().unwrap(), "--no-stdlib"]);
    assert!(!result.status.success());
}

#[test]
fn test_read_source_from_stdin() {
    let output = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("stdin_out.wasm");
    let mut child = Command::new(get_cargo_bin("cwasmc"))
        .args(["-", "-o", output.to_str().unwrap()])
        .stdin(std::process::Stdio::piped())
        .spawn()
        .expect("failed to run cwasmc");
    {
        use std::io::Write;
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        stdin
            .write_all(b"int one(void) { return 1; }")
            .expect("failed to write stdin");
    }
    let status = child.wait().expect("cwasmc should exit");
    assert!(status.success());
    assert!(output.exists());
}
