//! Shared macros for the compiler crates.
//!
//! The error declaration macro is always available. The assertion macros are meant for tests and
//! are gated behind the `assertion-macros` feature.

mod error;

#[cfg(any(test, feature = "assertion-macros"))]
mod assertions;
