//! Proxy errors.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ProxyError::Io`] | `PROXY_IO` | Yes |
//! | [`ProxyError::UnsupportedVersion`] | `PROXY_UNSUPPORTED_VERSION` | No |
//! | [`ProxyError::UnknownFrameKind`] | `PROXY_UNKNOWN_FRAME_KIND` | No |
//! | [`ProxyError::FrameTooLarge`] | `PROXY_FRAME_TOO_LARGE` | No |
//! | [`ProxyError::MalformedFrame`] | `PROXY_MALFORMED_FRAME` | No |
//! | [`ProxyError::PayloadDecode`] | `PROXY_PAYLOAD_DECODE` | No |
//! | [`ProxyError::StaleHandle`] | `PROXY_STALE_HANDLE` | No |
//! | [`ProxyError::UnknownHandle`] | `PROXY_UNKNOWN_HANDLE` | No |
//! | [`ProxyError::KindMismatch`] | `PROXY_KIND_MISMATCH` | No |
//! | [`ProxyError::NotRegistered`] | `PROXY_NOT_REGISTERED` | No |
//! | [`ProxyError::Timeout`] | `PROXY_TIMEOUT` | Yes |
//! | [`ProxyError::ConnectionClosed`] | `PROXY_CONNECTION_CLOSED` | Yes |
//! | [`ProxyError::UnexpectedReply`] | `PROXY_UNEXPECTED_REPLY` | No |
//! | [`ProxyError::Remote`] | `PROXY_REMOTE` | depends on remote code |
//! | [`ProxyError::Exec`] | `PROXY_EXEC` | as wrapped |
//! | [`ProxyError::Manager`] | `PROXY_MANAGER` | as wrapped |
//! | [`ProxyError::Interface`] | `PROXY_INTERFACE` | No |
//!
//! A failing request is answered with an error reply carrying
//! [`ProxyError::wire_code`]; for wrapped errors that is the inner code,
//! so a remote caller sees `EXEC_QUEUE_FULL` rather than `PROXY_EXEC`.

use rmts_core::{ExecError, InterfaceError, ManagerError};
use rmts_types::{CommandKind, ErrorCode};
use thiserror::Error;

/// Network proxy error.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("unknown frame kind: {0}")]
    UnknownFrameKind(u16),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame body is not a valid message.
    #[error("malformed frame: {message}")]
    MalformedFrame { message: String },

    /// A command payload does not decode as the command's prototype.
    #[error("payload for '{command}' does not decode as '{expected}'")]
    PayloadDecode { command: String, expected: String },

    /// The handle was issued by another connection or session.
    #[error("stale handle {handle:#018x}")]
    StaleHandle { handle: u64 },

    #[error("unknown handle {handle:#018x}")]
    UnknownHandle { handle: u64 },

    #[error("command '{command}' is {actual}, not {expected}")]
    KindMismatch {
        command: String,
        expected: CommandKind,
        actual: CommandKind,
    },

    /// A request arrived before `Hello`.
    #[error("client must send hello first")]
    NotRegistered,

    #[error("no reply after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unexpected reply, wanted {expected}")]
    UnexpectedReply { expected: &'static str },

    /// Error reply from the server.
    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

impl ProxyError {
    /// Shorthand for [`ProxyError::MalformedFrame`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Code sent to the peer in an error reply.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Exec(e) => e.code(),
            Self::Manager(e) => e.code(),
            Self::Interface(e) => e.code(),
            other => other.code(),
        }
    }

    /// Server-side code of a [`ProxyError::Remote`].
    #[must_use]
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl ErrorCode for ProxyError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "PROXY_IO",
            Self::UnsupportedVersion(_) => "PROXY_UNSUPPORTED_VERSION",
            Self::UnknownFrameKind(_) => "PROXY_UNKNOWN_FRAME_KIND",
            Self::FrameTooLarge { .. } => "PROXY_FRAME_TOO_LARGE",
            Self::MalformedFrame { .. } => "PROXY_MALFORMED_FRAME",
            Self::PayloadDecode { .. } => "PROXY_PAYLOAD_DECODE",
            Self::StaleHandle { .. } => "PROXY_STALE_HANDLE",
            Self::UnknownHandle { .. } => "PROXY_UNKNOWN_HANDLE",
            Self::KindMismatch { .. } => "PROXY_KIND_MISMATCH",
            Self::NotRegistered => "PROXY_NOT_REGISTERED",
            Self::Timeout { .. } => "PROXY_TIMEOUT",
            Self::ConnectionClosed => "PROXY_CONNECTION_CLOSED",
            Self::UnexpectedReply { .. } => "PROXY_UNEXPECTED_REPLY",
            Self::Remote { .. } => "PROXY_REMOTE",
            Self::Exec(_) => "PROXY_EXEC",
            Self::Manager(_) => "PROXY_MANAGER",
            Self::Interface(_) => "PROXY_INTERFACE",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout { .. } | Self::ConnectionClosed => true,
            Self::Remote { code, .. } => matches!(
                code.as_str(),
                "EXEC_QUEUE_FULL" | "EXEC_ARGUMENT_QUEUE_FULL" | "EXEC_TIMEOUT" | "PROXY_TIMEOUT"
            ),
            Self::Exec(e) => e.is_recoverable(),
            Self::Manager(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmts_types::assert_error_codes;

    fn all_variants() -> Vec<ProxyError> {
        vec![
            ProxyError::Io(std::io::Error::other("reset")),
            ProxyError::UnsupportedVersion(9),
            ProxyError::UnknownFrameKind(42),
            ProxyError::FrameTooLarge { size: 10, max: 5 },
            ProxyError::malformed("not json"),
            ProxyError::PayloadDecode {
                command: "SetGoal".into(),
                expected: "f64".into(),
            },
            ProxyError::StaleHandle { handle: 1 },
            ProxyError::UnknownHandle { handle: 2 },
            ProxyError::KindMismatch {
                command: "GetPosition".into(),
                expected: CommandKind::Write,
                actual: CommandKind::Read,
            },
            ProxyError::NotRegistered,
            ProxyError::Timeout { after_ms: 10 },
            ProxyError::ConnectionClosed,
            ProxyError::UnexpectedReply { expected: "value" },
            ProxyError::Remote {
                code: "EXEC_QUEUE_FULL".into(),
                message: "full".into(),
            },
            ProxyError::Exec(ExecError::Timeout { after_ms: 5 }),
            ProxyError::Manager(ManagerError::ComponentNotFound { name: "x".into() }),
            ProxyError::Interface(InterfaceError::Sealed {
                interface: "I".into(),
            }),
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "PROXY_");
    }

    #[test]
    fn wire_code_unwraps_inner_errors() {
        let err = ProxyError::Exec(ExecError::QueueFull {
            mailbox: "RobotForplanner".into(),
        });
        assert_eq!(err.code(), "PROXY_EXEC");
        assert_eq!(err.wire_code(), "EXEC_QUEUE_FULL");

        let err = ProxyError::StaleHandle { handle: 7 };
        assert_eq!(err.wire_code(), "PROXY_STALE_HANDLE");
    }

    #[test]
    fn recoverability() {
        assert!(ProxyError::Timeout { after_ms: 1 }.is_recoverable());
        assert!(ProxyError::Exec(ExecError::QueueFull { mailbox: "m".into() }).is_recoverable());
        assert!(!ProxyError::UnknownHandle { handle: 1 }.is_recoverable());
        assert!(ProxyError::Remote {
            code: "EXEC_QUEUE_FULL".into(),
            message: String::new(),
        }
        .is_recoverable());
        assert!(!ProxyError::Remote {
            code: "PROXY_STALE_HANDLE".into(),
            message: String::new(),
        }
        .is_recoverable());
    }

    #[test]
    fn remote_code_accessor() {
        let err = ProxyError::Remote {
            code: "PROXY_UNKNOWN_HANDLE".into(),
            message: "unknown handle".into(),
        };
        assert_eq!(err.remote_code(), Some("PROXY_UNKNOWN_HANDLE"));
        assert_eq!(ProxyError::NotRegistered.remote_code(), None);
    }
}
