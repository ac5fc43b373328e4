//! Declaration of per-stage compiler error enums.
//!
//! Every pipeline stage exposes one error enum whose variants each wrap a concrete diagnostic
//! struct. [`declare_error_type`] generates that enum with transparent `Display` and
//! `Diagnostic` forwarding plus `From` conversions for every wrapped struct, so stage code can
//! use `?` on the concrete errors directly.

/// Declare a stage error enum that forwards to its wrapped diagnostics.
///
/// ```
/// use cwasm_macros::declare_error_type;
/// use miette::Diagnostic;
/// use thiserror::Error;
///
/// #[derive(Error, Diagnostic, Debug)]
/// #[error("bad input")]
/// pub struct BadInputError;
///
/// declare_error_type! {
///     /// Errors raised by the example stage.
///     #[error("example error: {0}")]
///     pub enum ExampleError {
///         BadInput(BadInputError),
///     }
/// }
///
/// let err: ExampleError = BadInputError.into();
/// assert_eq!(err.to_string(), "bad input");
/// ```
#[macro_export]
macro_rules! declare_error_type {
    {
        $(#[doc = $doc:expr])*
        #[error($msg:expr)]
        $vis:vis enum $type_name:ident {
            $($name:ident($ty:ty),)*
        }
    } => {
        $(#[doc = $doc])*
        #[derive(thiserror::Error, miette::Diagnostic, Debug)]
        #[error($msg)]
        $vis enum $type_name {
            $(
                #[error(transparent)]
                #[diagnostic(transparent)]
                $name(#[from] $ty),
            )*
        }
    }
}

#[cfg(test)]
mod tests {
    use miette::Diagnostic;
    use thiserror::Error;

    #[derive(Error, Diagnostic, Debug)]
    #[diagnostic(code(test::first))]
    #[error("first failure")]
    pub struct FirstError;

    #[derive(Error, Diagnostic, Debug)]
    #[diagnostic(code(test::second))]
    #[error("second failure: {value}")]
    pub struct SecondError {
        value: u32,
    }

    declare_error_type! {
        #[error("stage error: {0}")]
        pub enum StageError {
            First(FirstError),
            Second(SecondError),
        }
    }

    #[test]
    fn test_declared_error_is_transparent() {
        let err = StageError::from(SecondError { value: 7 });
        assert_eq!(err.to_string(), "second failure: 7");
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("test::second"));
        assert!(matches!(StageError::from(FirstError), StageError::First(_)));
    }
}
