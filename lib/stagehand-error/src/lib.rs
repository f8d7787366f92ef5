//! Generic error handling shared across the workspace.
#![deny(warnings)]
#![deny(missing_docs)]

use std::fmt::Display;

/// A generic error.
///
/// Used wherever the concrete error type is not interesting to the caller, such as failures reported by user-supplied
/// service behavior.
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaluates to [`GenericError`], and can be constructed from a string literal, a format string
/// (with arguments accepted, in the same order as `std::format!`), or a value which implements `Debug` and `Display`,
/// such as an existing error that implements `std::error::Error`.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

/// Extension methods for attaching context to errors.
///
/// Named differently from `anyhow::Context` so that it can be imported alongside `snafu::ResultExt` without the
/// extension methods overlapping.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wrap the error value with additional context.
    ///
    /// # Errors
    ///
    /// If `self` is an error, it is returned wrapped with the given context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wrap the error value with additional context that is evaluated lazily only once an error does occur.
    ///
    /// # Errors
    ///
    /// If `self` is an error, it is returned wrapped with the context returned by `f`.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, context: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_error_formats_arguments() {
        let name = "listener";
        let error = generic_error!("failed to bind '{}'", name);
        assert_eq!(error.to_string(), "failed to bind 'listener'");
    }

    #[test]
    fn error_context_wraps_source() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("permission denied"));
        let error = result.error_context("Failed to open configuration file.").unwrap_err();

        assert_eq!(error.to_string(), "Failed to open configuration file.");
        assert_eq!(error.root_cause().to_string(), "permission denied");
    }
}
