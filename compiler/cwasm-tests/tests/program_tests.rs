//! End-to-end tests running every program in `programs` against the bundled runtime.
//!
//! Each program ends with a `/* output:` comment holding what it must print. Every suite runs the
//! whole corpus with a different optimization configuration, so the optimizer has to preserve
//! the behavior of each program.

use cwasm_opt::OptimizationFlags;
use cwasm_tests::{compile_and_execute, expected_output};

macro_rules! program_test_suite {
    ($name:ident, $flags:expr) => {
        #[test]
        fn $name() {
            insta::glob!("programs/*.c", |path| {
                let source = std::fs::read_to_string(path).expect("failed to read test program");
                let expected = expected_output(&source)
                    .unwrap_or_else(|| panic!("{} has no expected output", path.display()));
                let execution = compile_and_execute(&source, $flags)
                    .unwrap_or_else(|e| panic!("{} failed: {e:?}", path.display()));
                assert_eq!(execution.output, expected, "output of {}", path.display());
            });
        }
    };
}

program_test_suite!(no_optimizations, OptimizationFlags::none());
program_test_suite!(default_preset, OptimizationFlags::default());
program_test_suite!(all_optimizations, OptimizationFlags::all(true));

#[test]
fn test_main_status_is_returned() {
    let source = "int main(void) { return 7 * 6; }";
    let execution = compile_and_execute(source, OptimizationFlags::default())
        .expect("program should run");
    assert_eq!(execution.status, 42);
    assert_eq!(execution.output, "");
}

#[test]
fn test_deep_recursion_runs() {
    let source = r#"
        int depth(int n) {
            if (n == 0)
                return 0;
            return 1 + depth(n - 1);
        }
        int main(void) { return depth(2000); }
    "#;
    for flags in [OptimizationFlags::none(), OptimizationFlags::all(true)] {
        let execution = compile_and_execute(source, flags).expect("program should run");
        assert_eq!(execution.status, 2000);
    }
}
