//! Command kinds and queueing policies.
//!
//! # Command kinds
//!
//! | Kind | Arguments | Result | Queueable |
//! |------|-----------|--------|-----------|
//! | `Void` | none | none | yes |
//! | `VoidReturn` | none | one | yes |
//! | `Write` | one | none | yes |
//! | `WriteReturn` | one | one | yes |
//! | `Read` | none | one | no (always on caller's thread) |
//! | `QualifiedRead` | one | one | no (always on caller's thread) |
//!
//! # Queueing resolution
//!
//! An interface declares an [`InterfaceQueueing`] policy; each command may
//! carry an explicit [`CommandQueueing`] request. [`InterfaceQueueing::resolve`]
//! decides the outcome:
//!
//! | Interface | Command request | Result |
//! |-----------|-----------------|--------|
//! | `ComponentPolicy` | `InterfacePolicy` | component default |
//! | `ComponentPolicy` | `Queued` / `NotQueued` | the explicit request |
//! | `Queued` / `NotQueued` | `InterfacePolicy` | interface policy |
//! | `Queued` / `NotQueued` | same as interface | interface policy (redundant) |
//! | `Queued` / `NotQueued` | opposite of interface | interface policy, request rejected |

use serde::{Deserialize, Serialize};
use std::fmt;

/// The six invocation shapes of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    Void,
    VoidReturn,
    Write,
    WriteReturn,
    Read,
    QualifiedRead,
}

impl CommandKind {
    /// All kinds, in registry order.
    pub const ALL: [Self; 6] = [
        Self::Void,
        Self::VoidReturn,
        Self::Write,
        Self::WriteReturn,
        Self::Read,
        Self::QualifiedRead,
    ];

    /// Returns `true` for kinds that may be deferred into a mailbox.
    ///
    /// Read and QualifiedRead always execute on the caller's thread.
    #[must_use]
    pub const fn is_queueable(self) -> bool {
        matches!(
            self,
            Self::Void | Self::VoidReturn | Self::Write | Self::WriteReturn
        )
    }

    /// Returns `true` if the command takes an argument.
    #[must_use]
    pub const fn takes_argument(self) -> bool {
        matches!(self, Self::Write | Self::WriteReturn | Self::QualifiedRead)
    }

    /// Returns `true` if the command produces a result.
    #[must_use]
    pub const fn returns_value(self) -> bool {
        matches!(
            self,
            Self::VoidReturn | Self::WriteReturn | Self::Read | Self::QualifiedRead
        )
    }

    /// Stable lowercase name used in logs and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::VoidReturn => "void_return",
            Self::Write => "write",
            Self::WriteReturn => "write_return",
            Self::Read => "read",
            Self::QualifiedRead => "qualified_read",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload shape of an event generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Void,
    Write,
}

impl EventKind {
    /// Command kind a subscribed handler must have.
    #[must_use]
    pub const fn handler_kind(self) -> CommandKind {
        match self {
            Self::Void => CommandKind::Void,
            Self::Write => CommandKind::Write,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Queueing policy declared by a provided interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterfaceQueueing {
    /// Every queueable command is deferred to the provider's thread.
    Queued,
    /// Every command runs on the caller's thread; no clones are created.
    NotQueued,
    /// Commands follow the owning component's default unless they
    /// request otherwise explicitly.
    #[default]
    ComponentPolicy,
}

/// Outcome of resolving a per-command queueing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueingDecision {
    /// The request agreed with (or deferred to) the policy.
    Accepted { queued: bool },
    /// The request was explicit but matched the fixed interface policy.
    Redundant { queued: bool },
    /// The request conflicted with a fixed interface policy, which prevails.
    Rejected { queued: bool },
}

impl QueueingDecision {
    /// Whether the command ends up queued.
    #[must_use]
    pub const fn queued(self) -> bool {
        match self {
            Self::Accepted { queued } | Self::Redundant { queued } | Self::Rejected { queued } => {
                queued
            }
        }
    }
}

impl InterfaceQueueing {
    /// Resolves a command's queueing request against this policy.
    ///
    /// `component_default` is the owning component's default (tasks queue,
    /// passive devices do not) and only matters for `ComponentPolicy`.
    ///
    /// # Example
    ///
    /// ```
    /// use rmts_types::{CommandQueueing, InterfaceQueueing, QueueingDecision};
    ///
    /// let fixed = InterfaceQueueing::NotQueued;
    /// assert_eq!(
    ///     fixed.resolve(CommandQueueing::Queued, true),
    ///     QueueingDecision::Rejected { queued: false },
    /// );
    ///
    /// let open = InterfaceQueueing::ComponentPolicy;
    /// assert_eq!(
    ///     open.resolve(CommandQueueing::NotQueued, true),
    ///     QueueingDecision::Accepted { queued: false },
    /// );
    /// ```
    #[must_use]
    pub const fn resolve(self, request: CommandQueueing, component_default: bool) -> QueueingDecision {
        match (self, request) {
            (Self::ComponentPolicy, CommandQueueing::InterfacePolicy) => {
                QueueingDecision::Accepted {
                    queued: component_default,
                }
            }
            (Self::ComponentPolicy, CommandQueueing::Queued) => {
                QueueingDecision::Accepted { queued: true }
            }
            (Self::ComponentPolicy, CommandQueueing::NotQueued) => {
                QueueingDecision::Accepted { queued: false }
            }
            (Self::Queued, CommandQueueing::InterfacePolicy) => {
                QueueingDecision::Accepted { queued: true }
            }
            (Self::NotQueued, CommandQueueing::InterfacePolicy) => {
                QueueingDecision::Accepted { queued: false }
            }
            (Self::Queued, CommandQueueing::Queued) => QueueingDecision::Redundant { queued: true },
            (Self::NotQueued, CommandQueueing::NotQueued) => {
                QueueingDecision::Redundant { queued: false }
            }
            (Self::Queued, CommandQueueing::NotQueued) => {
                QueueingDecision::Rejected { queued: true }
            }
            (Self::NotQueued, CommandQueueing::Queued) => {
                QueueingDecision::Rejected { queued: false }
            }
        }
    }
}

/// Per-command queueing request passed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandQueueing {
    /// Defer to the interface policy.
    #[default]
    InterfacePolicy,
    /// Ask for the command to be queued.
    Queued,
    /// Ask for the command to run on the caller's thread.
    NotQueued,
}
