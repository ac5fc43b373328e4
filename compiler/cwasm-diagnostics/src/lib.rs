//! Internal compiler error reporting.
//!
//! User-facing failures are reported through the per-stage error enums. Violated invariants
//! between stages (a malformed module description reaching the module builder, an optimizer pass
//! producing an unbalanced stack) are bugs in the compiler itself and abort with [`ice!`].

/// Abort compilation with an internal compiler error.
#[macro_export]
macro_rules! ice {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        panic!(
            "internal compiler error ({}:{}:{}):\n{}",
            file!(),
            line!(),
            column!(),
            message
        )
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_ice_panics_with_location() {
        ice!("unbalanced stack");
    }

    #[test]
    #[should_panic(expected = "local 3 out of range")]
    fn test_ice_formats_arguments() {
        ice!("local {} out of range", 3);
    }

    #[test]
    #[should_panic(expected = "library failed to build: duplicate symbol")]
    fn test_ice_formats_captured_identifiers() {
        let e = "duplicate symbol";
        ice!("library failed to build: {e}");
    }
}
