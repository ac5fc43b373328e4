//! Assertion macros for tests.
//!
//! Each macro unwraps the interesting variant and hands it back so that tests can keep asserting
//! on the inner value:
//!
//! - [`assert_ok!`] / [`assert_err!`] for `Result`
//! - [`assert_some!`] / [`assert_none!`] for `Option`
//! - [`assert_matches!`] for arbitrary patterns

/// Assert that a `Result` is `Ok`, returning the value inside the `Ok` variant.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {{
        match $expr {
            ::std::result::Result::Ok(val) => val,
            ::std::result::Result::Err(err) => {
                panic!("assertion failed: Err({:?})", err);
            }
        }
    }};
}

/// Assert that a `Result` is `Err`, returning the error inside the `Err` variant.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {{
        match $expr {
            ::std::result::Result::Ok(val) => {
                panic!("assertion failed: Ok({:?})", val);
            }
            ::std::result::Result::Err(err) => err,
        }
    }};
}

/// Assert that an `Option` is `Some`, returning the value inside the `Some` variant.
#[macro_export]
macro_rules! assert_some {
    ($expr:expr) => {{
        match $expr {
            ::std::option::Option::Some(val) => val,
            ::std::option::Option::None => {
                panic!("assertion failed: None");
            }
        }
    }};
}

/// Assert that an `Option` is `None`.
#[macro_export]
macro_rules! assert_none {
    ($expr:expr) => {{
        if let ::std::option::Option::Some(val) = $expr {
            panic!("assertion failed: Some({:?})", val);
        };
    }};
}

/// Assert that a value matches a pattern, evaluating to the expression on the right of `=>`.
///
/// The scrutinee is evaluated exactly once.
#[macro_export]
macro_rules! assert_matches {
    ($expr:expr, $pat:pat_param => $output:expr) => {{
        match $expr {
            $pat => $output,
            other => panic!(
                "assertion failed: expected {:?} to match {}",
                other,
                stringify!($pat)
            ),
        }
    }};
    ($expr:expr, $pat:pat_param) => {
        $crate::assert_matches!($expr, $pat => ())
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_result_assertions() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(assert_ok!(result), 42);
        let result: Result<i32, &str> = Err("error");
        assert_eq!(assert_err!(result), "error");
    }

    #[test]
    fn test_option_assertions() {
        let option: Option<i32> = Some(42);
        assert_eq!(assert_some!(option), 42);
        let option: Option<i32> = None;
        assert_none!(option);
    }

    #[test]
    fn test_matches_returns_binding() {
        let value: Result<(i32, &str), ()> = Ok((3, "x"));
        let n = assert_matches!(value, Ok((n, "x")) => n);
        assert_eq!(n, 3);
        assert_matches!(Some(1), Some(_));
    }

    #[test]
    #[should_panic]
    fn test_assert_ok_on_err() {
        let result: Result<i32, &str> = Err("error");
        assert_ok!(result);
    }

    #[test]
    #[should_panic]
    fn test_assert_matches_mismatch() {
        assert_matches!(Some(2), None);
    }
}
