//! Wire messages.
//!
//! Every frame body is one of three JSON envelopes:
//!
//! | Frame kind | Envelope | Direction |
//! |------------|----------|-----------|
//! | Request | [`RequestFrame`] | client → server |
//! | Reply | [`ReplyFrame`] | server → client, echoes `request_id` |
//! | Push | [`Push`] | server → client, unsolicited |
//!
//! Command payloads travel as JSON *text* inside the envelope, so that a
//! payload which does not decode fails its own request instead of the
//! whole frame.

use rmts_types::{ClientId, CommandKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub request_id: u64,
    pub request: Request,
}

/// Client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Registers the client; must come first.
    Hello { client_name: String },
    /// Names of the server's components.
    ListComponents,
    /// Discovery of one component's provided interfaces.
    GetProvidedInterfaces { component: String },
    /// Remote connect of a caller stand-in to a provided interface.
    Connect {
        caller_component: String,
        caller_interface: String,
        provider_component: String,
        provider_interface: String,
    },
    /// Tears down a remote connect made on this connection.
    Disconnect {
        caller_component: String,
        caller_interface: String,
    },
    ExecuteVoid { handle: u64 },
    ExecuteWrite { handle: u64, payload: String },
    ExecuteRead { handle: u64 },
    ExecuteQualifiedRead { handle: u64, payload: String },
    ExecuteVoidReturn { handle: u64 },
    ExecuteWriteReturn { handle: u64, payload: String },
}

impl Request {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::ListComponents => "list_components",
            Self::GetProvidedInterfaces { .. } => "get_provided_interfaces",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ExecuteVoid { .. } => "execute_void",
            Self::ExecuteWrite { .. } => "execute_write",
            Self::ExecuteRead { .. } => "execute_read",
            Self::ExecuteQualifiedRead { .. } => "execute_qualified_read",
            Self::ExecuteVoidReturn { .. } => "execute_void_return",
            Self::ExecuteWriteReturn { .. } => "execute_write_return",
        }
    }

    /// Command kind an execute request expects its handle to resolve to.
    #[must_use]
    pub const fn command_kind(&self) -> Option<CommandKind> {
        match self {
            Self::ExecuteVoid { .. } => Some(CommandKind::Void),
            Self::ExecuteWrite { .. } => Some(CommandKind::Write),
            Self::ExecuteRead { .. } => Some(CommandKind::Read),
            Self::ExecuteQualifiedRead { .. } => Some(CommandKind::QualifiedRead),
            Self::ExecuteVoidReturn { .. } => Some(CommandKind::VoidReturn),
            Self::ExecuteWriteReturn { .. } => Some(CommandKind::WriteReturn),
            _ => None,
        }
    }
}

/// Reply envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub request_id: u64,
    pub reply: Reply,
}

/// Server reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Welcome { client_id: ClientId, heartbeat_ms: u64 },
    Components { names: Vec<String> },
    Interfaces { interfaces: Vec<InterfaceDescriptor> },
    Connected { connected: bool, end_user: String },
    Disconnected { abandoned: usize },
    /// Void/Write accepted (executed or queued).
    Done,
    /// Serialized result of a Read/QualifiedRead/VoidReturn/WriteReturn.
    Value { payload: String },
    Error { code: String, message: String },
}

/// Unsolicited server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Push {
    Heartbeat { sequence: u64 },
    Event(EventPush),
}

/// One event firing observed by a remote caller's stand-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPush {
    /// Caller component the stand-in represents.
    pub caller_component: String,
    pub interface: String,
    pub event: String,
    /// Serialized payload of a Write event.
    pub payload: Option<String>,
}

/// Discovery entry for one provided interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDescriptor {
    pub interface_name: String,
    /// The provider runs its own task thread.
    pub for_task: bool,
    pub commands_by_kind: BTreeMap<CommandKind, Vec<CommandDescriptor>>,
    #[serde(default)]
    pub events: Vec<EventDescriptor>,
}

impl InterfaceDescriptor {
    /// Finds a command by kind and name.
    #[must_use]
    pub fn command(&self, kind: CommandKind, name: &str) -> Option<&CommandDescriptor> {
        self.commands_by_kind.get(&kind)?.iter().find(|c| c.name == name)
    }

    /// Finds a command by name across all kinds.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<(CommandKind, &CommandDescriptor)> {
        self.commands_by_kind
            .iter()
            .find_map(|(kind, commands)| commands.iter().find(|c| c.name == name).map(|c| (*kind, c)))
    }
}

/// Discovery entry for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    pub name: String,
    /// Opaque per-connection handle; never interpret it arithmetically.
    pub handle: u64,
    pub argument_type_name: String,
    pub result_type_name: String,
}

/// Discovery entry for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    pub name: String,
    pub argument_type_name: String,
}
