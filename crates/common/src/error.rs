//! Message-context plumbing shared by the workspace's error types.
//!
//! Each crate defines its own `thiserror` enum; what they share is the need
//! to wrap a lower-level failure with a domain message ("corrupt proposal in
//! chat X: ..."). [`FromMessage`] plus [`impl_context!`] give every such
//! enum a crate-local `Context` trait with `.context()` / `.with_context()`
//! on `Result` and `Option`.

/// Trait for error types that can be constructed from a plain message string.
///
/// Implement this for your crate's error type, then invoke [`impl_context!`]
/// in your error module.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait with `.context()` and
/// `.with_context()` methods on `Result` and `Option`.
///
/// Invoke inside a module that defines `Error: FromMessage` and
/// `type Result<T> = std::result::Result<T, Error>`.
///
/// ```ignore
/// // in crates/store/src/error.rs
/// accord_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        /// Wrap a failure (or absence) with a domain message, producing this
        /// crate's error type.
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let ctx = context.into();
                self.with_context(move || ctx)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let message = format!("{}: {source}", f().into());
                    <Error as $crate::FromMessage>::from_message(message)
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let ctx = context.into();
                self.with_context(move || ctx)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::FromMessage;

    #[derive(Debug, thiserror::Error)]
    enum Error {
        #[error("{message}")]
        Message { message: String },
    }

    impl FromMessage for Error {
        fn from_message(message: String) -> Self {
            Self::Message { message }
        }
    }

    type Result<T> = std::result::Result<T, Error>;

    crate::impl_context!();

    #[test]
    fn result_context_prefixes_the_source() {
        let err = "zero".parse::<i32>().context("bad count").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.starts_with("bad count: "), "{rendered}");
        assert!(rendered.len() > "bad count: ".len());
    }

    #[test]
    fn option_context_names_the_missing_thing() {
        let err = None::<u8>.context("no such chat").unwrap_err();
        assert_eq!(err.to_string(), "no such chat");
    }

    #[test]
    fn with_context_is_lazy_on_success() {
        let mut called = false;
        let value = Ok::<_, std::io::Error>(7)
            .with_context(|| {
                called = true;
                "never rendered"
            })
            .unwrap();
        assert_eq!(value, 7);
        assert!(!called);
    }
}
