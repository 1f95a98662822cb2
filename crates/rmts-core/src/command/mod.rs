//! Command abstraction.
//!
//! A [`Command`] turns a bound operation into one polymorphic object in
//! one of six invocation shapes. Whether it runs on the caller's thread
//! or in the provider's mailbox is carried explicitly by [`Dispatch`].
//!
//! # Invocation Shapes
//!
//! | Kind | Method | Returns |
//! |------|--------|---------|
//! | Void | [`Command::execute_void`] | [`Ticket`](crate::Ticket) |
//! | Write | [`Command::execute_write`] | [`Ticket`](crate::Ticket) |
//! | VoidReturn | [`Command::execute_void_return`] | [`Ticket`](crate::Ticket) with result |
//! | WriteReturn | [`Command::execute_write_return`] | [`Ticket`](crate::Ticket) with result |
//! | Read | [`Command::execute_read`] | value |
//! | QualifiedRead | [`Command::execute_qualified_read`] | value |
//!
//! # Filtered Write
//!
//! ```text
//! raw ──► filter (QualifiedRead) ──ok──► target (Write)
//!                 │
//!                 └──rejected──► Err(FilterRejected)
//! ```
//!
//! The composite is a single Write command; when queued, the whole
//! composite is deferred, not the filter alone.

mod callable;
mod command;
mod error;

pub use callable::Callable;
pub use command::{Command, Dispatch, QueueBinding};
pub use error::ExecError;
