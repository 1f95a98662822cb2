//! Core types for rmts.
//!
//! This crate provides the vocabulary shared by every rmts layer:
//! identifiers, command kinds, queueing policies, argument prototypes and
//! the error-code contract. It contains no runtime code.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Types Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rmts-types  : ids, CommandKind, Prototype, ErrorCode ◄ HERE │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runtime Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rmts-core   : commands, mailboxes, interfaces, components  │
//! │  rmts-proxy  : discovery, remote connect, execute relay     │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Frontend Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rmts-cli    : serve / discover / call                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Design
//!
//! Components and interfaces are arena entries addressed by index
//! ([`ComponentId`], [`InterfaceId`]); they never leave the process.
//! Remote peers get a UUID-based [`ClientId`].
//!
//! # Example
//!
//! ```
//! use rmts_types::{CommandKind, ComponentId, InterfaceId, Prototype};
//!
//! let provider = ComponentId::new(0);
//! let iface = InterfaceId::new(provider, 0);
//! assert_eq!(iface.component(), provider);
//!
//! assert!(CommandKind::Write.is_queueable());
//! assert!(!CommandKind::Read.is_queueable());
//!
//! let goal = Prototype::of::<f64>();
//! assert_eq!(goal.type_name(), "f64");
//! ```

mod error;
mod id;
mod kind;
mod prototype;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{ClientId, ComponentId, InterfaceId};
pub use kind::{CommandKind, CommandQueueing, EventKind, InterfaceQueueing, QueueingDecision};
pub use prototype::Prototype;
