//!
//! Pattern assertion helpers used across the test suites
//!

use std::fmt;

/// Asserts that an expression matches one of the given patterns, optionally followed by an `if` guard.
/// On failure the value is printed with its `Debug` representation.
///
/// ```
/// use weave_core::assert_match;
///
/// let r: Result<u32, &str> = Ok(3);
/// assert_match!(r, Ok(x) if x > 2);
/// assert_match!(None::<u8>, None, "expected nothing");
/// ```
#[macro_export]
macro_rules! assert_match {
    ($left:expr, $(|)? $( $pattern:pat_param )|+ $( if $guard: expr )? $(,)?) => {
        match $left {
            $( $pattern )|+ $( if $guard )? => {}
            ref left_val => {
                $crate::assert::match_failed(left_val, stringify!($($pattern)|+ $(if $guard)?), ::core::option::Option::None)
            }
        }
    };
    ($left:expr, $(|)? $( $pattern:pat_param )|+ $( if $guard: expr )?, $($arg:tt)+) => {
        match $left {
            $( $pattern )|+ $( if $guard )? => {}
            ref left_val => {
                let pattern = stringify!($($pattern)|+ $(if $guard)?);
                $crate::assert::match_failed(left_val, pattern, ::core::option::Option::Some(format_args!($($arg)+)))
            }
        }
    };
}

#[cold]
#[track_caller]
#[doc(hidden)]
pub fn match_failed<T: fmt::Debug + ?Sized>(value: &T, pattern: &str, message: Option<fmt::Arguments<'_>>) -> ! {
    match message {
        Some(message) => panic!("assertion failed: `{value:?}` does not match `{pattern}`: {message}"),
        None => panic!("assertion failed: `{value:?}` does not match `{pattern}`"),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_match_passes() {
        let value: Result<u64, String> = Ok(5);
        assert_match!(value, Ok(5));
        assert_match!(Some(3), Some(x) if x == 3);
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_assert_match_fails() {
        assert_match!(Some(1), None, "value should be absent");
    }
}
