//! Provided and required interfaces.
//!
//! ```text
//!  requiring component                     providing component
//! ┌────────────────────┐   bind    ┌──────────────────────────────┐
//! │ RequiredInterface  │──────────►│ ProvidedInterface (clone)    │
//! │   Function ────────┼──────────►│   Command (queued/direct)    │
//! │   handler ◄────────┼───────────│   EventGenerator             │
//! └────────────────────┘  observe  └──────────────────────────────┘
//! ```
//!
//! See [`ProvidedInterface`] for the factory/clone lifecycle and
//! [`RequiredInterface`] for binding.

mod error;
mod function;
mod provided;
mod required;

pub use error::InterfaceError;
pub use function::{Function, Requirement};
pub use provided::ProvidedInterface;
pub use required::RequiredInterface;
