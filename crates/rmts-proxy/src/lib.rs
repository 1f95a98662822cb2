//! rmts network proxy.
//!
//! Extends the command/interface contract of `rmts-core` across a TCP
//! connection. The server never bypasses the local contract: a remote
//! caller is represented by a local stand-in component that connects to
//! the provider like any other component would.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Proxy Layer (THIS CRATE)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  codec   : 8-byte frame header + JSON body                  │
//! │  wire    : Request / Reply / Push messages, discovery types │
//! │  handle  : per-connection generation-stamped handle table   │
//! │  server  : ProxyServer, ServerHandle, ConnectionState       │
//! │  client  : ProxyClient (blocking)                           │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  rmts-core : ComponentManager, interfaces, mailboxes        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Session
//!
//! ```text
//! client                                   server
//! ──────                                   ──────
//! Hello{client_name}              ──────►  Welcome{client_id}
//! GetProvidedInterfaces{robot}    ──────►  Interfaces[{handles...}]
//! Connect{planner,Robot,robot,Robot} ───►  stand-in + manager.connect
//! ExecuteWrite{handle, "3.5"}     ──────►  clone mailbox, Done
//! ExecuteRead{handle}             ──────►  Value{"3.5"}
//!                                 ◄──────  Push::Heartbeat / Push::Event
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod handle;
pub mod server;
pub mod wire;

pub use client::ProxyClient;
pub use error::ProxyError;
pub use server::{ConnectionInfo, ConnectionState, ProxyServer, ServerHandle};
pub use wire::{CommandDescriptor, EventDescriptor, EventPush, InterfaceDescriptor};
