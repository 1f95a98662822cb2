//! Shared error-code contract for rmts errors.
//!
//! Each layer owns its own `thiserror` enum (interface registration,
//! command execution, component manager, network proxy, configuration).
//! They all implement [`ErrorCode`] so that callers can branch on a
//! stable machine-readable code instead of matching on display text.
//!
//! # Code prefixes
//!
//! | Layer | Prefix | Example |
//! |-------|--------|---------|
//! | Provided/required interfaces | `INTERFACE_` | `INTERFACE_DUPLICATE_COMMAND` |
//! | Command execution and mailboxes | `EXEC_` | `EXEC_QUEUE_FULL` |
//! | Component manager | `MANAGER_` | `MANAGER_COMPONENT_NOT_FOUND` |
//! | Network proxy | `PROXY_` | `PROXY_STALE_HANDLE` |
//! | Configuration files | `CONFIG_` | `CONFIG_PARSE` |
//!
//! # Example
//!
//! ```
//! use rmts_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum MailboxError {
//!     Full,
//!     Closed,
//! }
//!
//! impl ErrorCode for MailboxError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Full => "EXEC_QUEUE_FULL",
//!             Self::Closed => "EXEC_DISCONNECTED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Full)
//!     }
//! }
//!
//! assert_eq!(MailboxError::Full.code(), "EXEC_QUEUE_FULL");
//! assert!(MailboxError::Full.is_recoverable());
//! assert!(!MailboxError::Closed.is_recoverable());
//! ```

/// Machine-readable classification of an rmts error.
///
/// Codes are `UPPER_SNAKE_CASE`, start with the layer prefix and never
/// change once published: remote peers see them in failure replies.
///
/// An error is *recoverable* when retrying the same operation later may
/// succeed without changing code or configuration. A full mailbox is the
/// canonical recoverable error (the provider drains it on its next
/// quantum); a duplicate command name or a type mismatch is not.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns `true` if a retry may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that `err` carries a well-formed code with the given prefix.
///
/// Intended for unit tests of error enums.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// `UPPER_SNAKE_CASE`.
///
/// # Example
///
/// ```
/// use rmts_types::{assert_error_code, ErrorCode};
///
/// struct Timeout;
///
/// impl ErrorCode for Timeout {
///     fn code(&self) -> &'static str { "PROXY_TIMEOUT" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Timeout, "PROXY_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();
    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Runs [`assert_error_code`] over every error in `errors`.
///
/// # Panics
///
/// Panics on the first malformed code.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
