//! Proxy server.
//!
//! Exposes the components of a [`ComponentManager`] to remote peers.
//!
//! # Architecture
//!
//! ```text
//! ProxyServer::spawn(addr)
//!   └─► runtime thread "rmts-proxy"
//!         └─► accept loop ──► one task per connection
//!                               ├─► request loop (reads frames, answers)
//!                               └─► sender task (replies, heartbeats,
//!                                    event pushes via bounded queue)
//! ```
//!
//! # Remote Connect
//!
//! A remote `Connect` manufactures a local device component standing in
//! for the remote caller (named `"{caller}@{connection}.{n}"`), gives it a
//! required interface with one function per provider command and one
//! push handler per provider event, and then runs the ordinary
//! [`ComponentManager::connect`]. The remote caller therefore gets the
//! same private end-user clone and mailbox as any local caller.
//!
//! # Connection State
//!
//! | State | Meaning |
//! |-------|---------|
//! | Created | accepted, sender task not yet running |
//! | Started | requests served, heartbeats and events pushed |
//! | Draining | peer gone or shutdown requested; queued calls get a bounded drain, then stand-ins are torn down |
//! | Closed | sender task joined, all resources released |

use crate::codec::{decode_body, encode_frame, read_frame, FrameKind};
use crate::error::ProxyError;
use crate::handle::{HandleTable, Target};
use crate::wire::{
    CommandDescriptor, EventDescriptor, EventPush, InterfaceDescriptor, Push, Reply, ReplyFrame,
    Request, RequestFrame,
};
use parking_lot::RwLock;
use rmts_core::config::ProxyConfig;
use rmts_core::{
    Command, Component, ComponentManager, ExecError, Mailbox, ManagerError, RequiredInterface,
    Requirement, Ticket,
};
use rmts_types::{ClientId, CommandKind, CommandQueueing, EventKind, Prototype};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Closed connections kept in the stats table.
const CLOSED_HISTORY: usize = 32;

/// Poll interval while a closing connection waits for its queued calls.
const DRAIN_POLL: Duration = Duration::from_millis(2);

/// Lifecycle of one server-side connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Created,
    Started,
    Draining,
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub state: ConnectionState,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    /// Remote connects currently held by this connection.
    pub remote_connects: usize,
}

/// State shared by the accept loop and every connection task.
struct Shared {
    manager: Arc<ComponentManager>,
    config: ProxyConfig,
    next_id: AtomicU64,
    connections: RwLock<BTreeMap<u64, ConnectionInfo>>,
    shutdown: broadcast::Sender<()>,
}

impl Shared {
    fn update(&self, id: u64, f: impl FnOnce(&mut ConnectionInfo)) {
        if let Some(info) = self.connections.write().get_mut(&id) {
            f(info);
        }
    }

    fn set_state(&self, id: u64, state: ConnectionState) {
        self.update(id, |info| info.state = state);
        debug!(connection = id, %state, "Connection state");
    }

    fn register(&self, peer: SocketAddr) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write();
        let closed: Vec<u64> = connections
            .values()
            .filter(|c| c.state == ConnectionState::Closed)
            .map(|c| c.id)
            .collect();
        if closed.len() > CLOSED_HISTORY {
            for old in &closed[..closed.len() - CLOSED_HISTORY] {
                connections.remove(old);
            }
        }
        connections.insert(
            id,
            ConnectionInfo {
                id,
                peer,
                state: ConnectionState::Created,
                client_id: None,
                client_name: None,
                remote_connects: 0,
            },
        );
        id
    }
}

/// Proxy server builder.
///
/// # Example
///
/// ```no_run
/// use rmts_core::ComponentManager;
/// use rmts_proxy::ProxyServer;
/// use std::sync::Arc;
///
/// let manager = Arc::new(ComponentManager::new());
/// let server = ProxyServer::new(Arc::clone(&manager))
///     .spawn("127.0.0.1:0")
///     .expect("bind");
/// println!("listening on {}", server.local_addr());
/// server.shutdown();
/// ```
pub struct ProxyServer {
    manager: Arc<ComponentManager>,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Serves `manager` with its own proxy configuration.
    #[must_use]
    pub fn new(manager: Arc<ComponentManager>) -> Self {
        let config = manager.config().proxy.clone();
        Self { manager, config }
    }

    /// Overrides the proxy configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds `addr` and serves on a dedicated runtime thread.
    ///
    /// Binding happens before this returns, so `"127.0.0.1:0"` yields a
    /// usable [`ServerHandle::local_addr`].
    pub fn spawn(self, addr: &str) -> Result<ServerHandle, ProxyError> {
        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("rmts-proxy")
            .enable_all()
            .build()?;

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            manager: self.manager,
            config: self.config,
            next_id: AtomicU64::new(1),
            connections: RwLock::new(BTreeMap::new()),
            shutdown: shutdown.clone(),
        });

        let loop_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("rmts-proxy-accept".into())
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(std_listener) {
                        Ok(listener) => accept_loop(listener, loop_shared, shutdown_rx).await,
                        Err(e) => error!(error = %e, "Listener registration failed"),
                    }
                });
            })?;

        info!(%local_addr, "Proxy server listening");
        Ok(ServerHandle {
            local_addr,
            shutdown,
            shared,
            thread: Some(thread),
        })
    }
}

/// Running proxy server.
///
/// Dropping the handle shuts the server down.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections seen so far, including recently closed ones.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.shared.connections.read().values().cloned().collect()
    }

    /// Drains every connection and stops the server.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.thread.is_some() {
            info!(local_addr = %self.local_addr, "Proxy server shutting down");
            // No receiver just means the accept loop already ended.
            let _ = self.shutdown.send(());
            self.join();
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Proxy server thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = shared.register(peer);
                    info!(connection = id, %peer, "Connection accepted");
                    let stop = shared.shutdown.subscribe();
                    tasks.spawn(run_connection(Arc::clone(&shared), stream, id, stop));
                }
                Err(e) => warn!(error = %e, "Accept failed"),
            },

            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = done {
                    error!(error = %e, "Connection task failed");
                }
            }
        }
    }
    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            error!(error = %e, "Connection task failed");
        }
    }
    info!("Proxy server stopped");
}

async fn run_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    id: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let max = shared.config.max_frame_bytes;
    let (mut reader, writer) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::channel(shared.config.outbound_queue.max(1));
    let (stop_sender, stop_rx) = oneshot::channel();
    let heartbeat = shared.config.heartbeat().max(Duration::from_millis(1));
    let sender = tokio::spawn(sender_loop(writer, outbound_rx, stop_rx, heartbeat, max, id));
    shared.set_state(id, ConnectionState::Started);

    let mut session = Session::new(id, Arc::clone(&shared), outbound.clone());
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                debug!(connection = id, "Shutdown requested");
                break;
            }

            frame = read_frame(&mut reader, max) => match frame {
                Ok(Some((FrameKind::Request, body))) => {
                    let reply = match decode_body::<RequestFrame>(&body) {
                        Ok(frame) => session.answer(frame).await,
                        Err(e) => {
                            warn!(connection = id, error = %e, "Undecodable request frame");
                            break;
                        }
                    };
                    match encode_frame(FrameKind::Reply, &reply, max) {
                        Ok(bytes) => {
                            if outbound.send(bytes).await.is_err() {
                                debug!(connection = id, "Sender gone");
                                break;
                            }
                        }
                        Err(e) => error!(connection = id, error = %e, "Reply encoding failed"),
                    }
                }
                Ok(Some((kind, _))) => {
                    warn!(connection = id, ?kind, "Client sent a non-request frame");
                    break;
                }
                Ok(None) => {
                    debug!(connection = id, "Peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(connection = id, error = %e, "Frame read failed");
                    break;
                }
            }
        }
    }

    shared.set_state(id, ConnectionState::Draining);
    session.drain_pending().await;
    session.teardown();
    drop(session);
    drop(outbound);
    // The sender may already be gone after a write failure.
    let _ = stop_sender.send(());
    if let Err(e) = sender.await {
        error!(connection = id, error = %e, "Sender task failed");
    }
    shared.set_state(id, ConnectionState::Closed);
    info!(connection = id, "Connection closed");
}

async fn sender_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut stop: oneshot::Receiver<()>,
    heartbeat: Duration,
    max: u32,
    id: u64,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    let mut sequence = 0_u64;
    loop {
        let frame = tokio::select! {
            biased;

            _ = &mut stop => break,

            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },

            _ = ticker.tick() => {
                sequence += 1;
                match encode_frame(FrameKind::Push, &Push::Heartbeat { sequence }, max) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(connection = id, error = %e, "Heartbeat encoding failed");
                        continue;
                    }
                }
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            debug!(connection = id, error = %e, "Write failed");
            return;
        }
    }

    // Flush replies queued before the stop.
    while let Ok(frame) = outbound.try_recv() {
        if writer.write_all(&frame).await.is_err() {
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(connection = id, error = %e, "Shutdown of write half failed");
    }
}

/// A remote connect held by a connection.
struct RemoteLink {
    caller_component: String,
    caller_interface: String,
    provider_component: String,
    provider_interface: String,
    stand_in: String,
    required: Arc<RequiredInterface>,
}

/// Per-connection request state.
struct Session {
    id: u64,
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Vec<u8>>,
    client: Option<ClientId>,
    handles: HandleTable,
    links: Vec<RemoteLink>,
    stand_ins: u64,
}

impl Session {
    fn new(id: u64, shared: Arc<Shared>, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        // Random per-connection generation: handles never match across connections.
        let generation = Uuid::new_v4().as_fields().0;
        Self {
            id,
            shared,
            outbound,
            client: None,
            handles: HandleTable::new(generation),
            links: Vec::new(),
            stand_ins: 0,
        }
    }

    fn manager(&self) -> &ComponentManager {
        &self.shared.manager
    }

    async fn answer(&mut self, frame: RequestFrame) -> ReplyFrame {
        let request_id = frame.request_id;
        let name = frame.request.name();
        let reply = match self.handle(frame.request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(connection = self.id, request = name, code = e.wire_code(), error = %e, "Request failed");
                Reply::Error {
                    code: e.wire_code().to_string(),
                    message: e.to_string(),
                }
            }
        };
        ReplyFrame { request_id, reply }
    }

    async fn handle(&mut self, request: Request) -> Result<Reply, ProxyError> {
        if let Request::Hello { client_name } = &request {
            return Ok(self.hello(client_name));
        }
        if self.client.is_none() {
            return Err(ProxyError::NotRegistered);
        }

        match request {
            Request::Hello { .. } => Err(ProxyError::NotRegistered),
            Request::ListComponents => Ok(Reply::Components {
                names: self.manager().component_names(),
            }),
            Request::GetProvidedInterfaces { component } => Ok(Reply::Interfaces {
                interfaces: self.discover(&component)?,
            }),
            Request::Connect {
                caller_component,
                caller_interface,
                provider_component,
                provider_interface,
            } => self.connect(
                caller_component,
                caller_interface,
                &provider_component,
                &provider_interface,
            ),
            Request::Disconnect {
                caller_component,
                caller_interface,
            } => self.disconnect(&caller_component, &caller_interface),
            Request::ExecuteVoid { handle } => {
                self.resolve(handle, CommandKind::Void)?.execute_void()?;
                Ok(Reply::Done)
            }
            Request::ExecuteWrite { handle, payload } => {
                let command = self.resolve(handle, CommandKind::Write)?;
                command.execute_write(decode_payload(&command, &payload)?)?;
                Ok(Reply::Done)
            }
            Request::ExecuteRead { handle } => {
                let value = self.resolve(handle, CommandKind::Read)?.execute_read()?;
                encode_value(&value)
            }
            Request::ExecuteQualifiedRead { handle, payload } => {
                let command = self.resolve(handle, CommandKind::QualifiedRead)?;
                let value = command.execute_qualified_read(&decode_payload(&command, &payload)?)?;
                encode_value(&value)
            }
            Request::ExecuteVoidReturn { handle } => {
                let ticket = self.resolve(handle, CommandKind::VoidReturn)?.execute_void_return()?;
                encode_value(&self.wait(ticket).await?)
            }
            Request::ExecuteWriteReturn { handle, payload } => {
                let command = self.resolve(handle, CommandKind::WriteReturn)?;
                let ticket = command.execute_write_return(decode_payload(&command, &payload)?)?;
                encode_value(&self.wait(ticket).await?)
            }
        }
    }

    fn hello(&mut self, client_name: &str) -> Reply {
        let client_id = *self.client.get_or_insert_with(ClientId::new);
        let name = client_name.to_string();
        self.shared.update(self.id, |info| {
            info.client_id = Some(client_id);
            info.client_name = Some(name);
        });
        info!(connection = self.id, client = %client_id, client_name, "Client registered");
        Reply::Welcome {
            client_id,
            heartbeat_ms: self.shared.config.heartbeat_ms,
        }
    }

    // === Discovery ===

    fn discover(&mut self, component: &str) -> Result<Vec<InterfaceDescriptor>, ProxyError> {
        let handle = self
            .manager()
            .component(component)
            .ok_or_else(|| ManagerError::ComponentNotFound {
                name: component.to_string(),
            })?;
        let for_task = handle.mode().has_thread();

        let mut interfaces = Vec::with_capacity(handle.provided_interfaces().len());
        for iface in handle.provided_interfaces() {
            let mut commands_by_kind: BTreeMap<CommandKind, Vec<CommandDescriptor>> = BTreeMap::new();
            for command in iface.all_commands() {
                let target = Target {
                    component: component.to_string(),
                    interface: iface.name().to_string(),
                    kind: command.kind(),
                    name: command.name().to_string(),
                };
                commands_by_kind
                    .entry(command.kind())
                    .or_default()
                    .push(CommandDescriptor {
                        name: command.name().to_string(),
                        handle: self.handles.intern(target),
                        argument_type_name: command.argument_prototype().type_name().to_string(),
                        result_type_name: command.result_prototype().type_name().to_string(),
                    });
            }
            let events = iface
                .events()
                .map(|event| EventDescriptor {
                    name: event.name().to_string(),
                    argument_type_name: event.argument_prototype().type_name().to_string(),
                })
                .collect();
            interfaces.push(InterfaceDescriptor {
                interface_name: iface.name().to_string(),
                for_task,
                commands_by_kind,
                events,
            });
        }
        debug!(connection = self.id, component, interfaces = interfaces.len(), "Discovery served");
        Ok(interfaces)
    }

    // === Remote connect ===

    fn connect(
        &mut self,
        caller_component: String,
        caller_interface: String,
        provider_component: &str,
        provider_interface: &str,
    ) -> Result<Reply, ProxyError> {
        if self
            .links
            .iter()
            .any(|l| l.caller_component == caller_component && l.caller_interface == caller_interface)
        {
            return Err(ManagerError::AlreadyConnected {
                client: caller_component,
                required: caller_interface,
            }
            .into());
        }

        let provider = self
            .manager()
            .provided_interface(provider_component, provider_interface)?;

        self.stand_ins += 1;
        let stand_in = format!("{caller_component}@{}.{}", self.id, self.stand_ins);
        let mut component = Component::device(stand_in.clone());
        let required = component.add_required_interface(caller_interface.clone());
        for command in provider.all_commands() {
            required.add_function(command.name(), command.kind(), Requirement::Required)?;
        }
        for event in provider.events() {
            let push = EventPush {
                caller_component: caller_component.clone(),
                interface: provider_interface.to_string(),
                event: event.name().to_string(),
                payload: None,
            };
            let sink = EventSink {
                outbound: self.outbound.clone(),
                max: self.shared.config.max_frame_bytes,
                connection: self.id,
            };
            match event.kind() {
                EventKind::Void => {
                    required.add_event_handler_void(
                        event.name(),
                        move || sink.push(push.clone()),
                        CommandQueueing::NotQueued,
                    )?;
                }
                EventKind::Write => {
                    required.add_event_handler_write::<Value>(
                        event.name(),
                        move |value: Value| {
                            sink.push(EventPush {
                                payload: serde_json::to_string(&value).ok(),
                                ..push.clone()
                            });
                        },
                        CommandQueueing::NotQueued,
                    )?;
                }
            }
        }

        let manager = Arc::clone(&self.shared.manager);
        manager.add_component(component)?;
        let connection = match manager.connect(
            &stand_in,
            &caller_interface,
            provider_component,
            provider_interface,
        ) {
            Ok(connection) => connection,
            Err(e) => {
                if let Err(cleanup) = manager.remove_component(&stand_in) {
                    warn!(%stand_in, error = %cleanup, "Stand-in removal failed");
                }
                return Err(e.into());
            }
        };
        let required = manager
            .component(&stand_in)
            .and_then(|c| c.required_interface(&caller_interface))
            .ok_or_else(|| ManagerError::InterfaceNotFound {
                component: stand_in.clone(),
                interface: caller_interface.clone(),
            })?;

        info!(
            connection = self.id,
            caller = %caller_component,
            %stand_in,
            provider = provider_component,
            end_user = %connection.end_user,
            "Remote connect"
        );
        self.links.push(RemoteLink {
            caller_component,
            caller_interface,
            provider_component: provider_component.to_string(),
            provider_interface: provider_interface.to_string(),
            stand_in,
            required,
        });
        self.publish_link_count();
        Ok(Reply::Connected {
            connected: true,
            end_user: connection.end_user,
        })
    }

    fn disconnect(&mut self, caller_component: &str, caller_interface: &str) -> Result<Reply, ProxyError> {
        let pos = self
            .links
            .iter()
            .position(|l| l.caller_component == caller_component && l.caller_interface == caller_interface)
            .ok_or_else(|| ManagerError::NotConnected {
                client: caller_component.to_string(),
                required: caller_interface.to_string(),
            })?;
        let link = self.links.remove(pos);
        let abandoned = self.release(&link)?;
        self.publish_link_count();
        Ok(Reply::Disconnected { abandoned })
    }

    fn release(&self, link: &RemoteLink) -> Result<usize, ManagerError> {
        let manager = self.manager();
        let abandoned = manager.disconnect(&link.stand_in, &link.caller_interface)?;
        // A later start_all may have activated the stand-in.
        manager.stop_component(&link.stand_in)?;
        manager.remove_component(&link.stand_in)?;
        debug!(connection = self.id, stand_in = %link.stand_in, abandoned, "Stand-in released");
        Ok(abandoned)
    }

    fn publish_link_count(&self) {
        let count = self.links.len();
        self.shared.update(self.id, |info| info.remote_connects = count);
    }

    /// Gives calls already queued by this connection a chance to run.
    ///
    /// Bounded by the request timeout; whatever is still queued afterwards
    /// is abandoned by [`teardown`](Self::teardown).
    async fn drain_pending(&self) {
        let mailboxes: Vec<Arc<Mailbox>> = self
            .links
            .iter()
            .flat_map(|l| l.required.functions().iter())
            .filter_map(|f| f.command()?.mailbox().cloned())
            .collect();
        let deadline = tokio::time::Instant::now() + self.shared.config.request_timeout();
        while mailboxes.iter().any(|m| !m.is_empty()) {
            if tokio::time::Instant::now() >= deadline {
                warn!(connection = self.id, "Queued calls left undrained");
                return;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    /// Releases every stand-in of this connection.
    fn teardown(&mut self) {
        for link in std::mem::take(&mut self.links) {
            if let Err(e) = self.release(&link) {
                warn!(connection = self.id, stand_in = %link.stand_in, error = %e, "Teardown failed");
            }
        }
        self.publish_link_count();
    }

    // === Execute relay ===

    /// Resolves `handle` to a command this connection may execute.
    ///
    /// Commands of a remotely connected interface go through the stand-in's
    /// bound functions (the private clone); anything else is looked up on
    /// the original interface, where only direct commands are reachable.
    fn resolve(&self, handle: u64, expected: CommandKind) -> Result<Arc<Command>, ProxyError> {
        let target = self.handles.resolve(handle)?;
        if target.kind != expected {
            return Err(ProxyError::KindMismatch {
                command: target.name.clone(),
                expected,
                actual: target.kind,
            });
        }

        let bound = self
            .links
            .iter()
            .filter(|l| l.provider_component == target.component && l.provider_interface == target.interface)
            .find_map(|l| l.required.function_of(target.kind, &target.name)?.command());
        if let Some(command) = bound {
            return Ok(command);
        }

        let provider = self
            .manager()
            .provided_interface(&target.component, &target.interface)?;
        Ok(provider.command(target.kind, &target.name)?)
    }

    async fn wait(&self, ticket: Ticket) -> Result<Value, ProxyError> {
        let timeout = self.shared.config.request_timeout();
        tokio::task::spawn_blocking(move || ticket.wait(timeout))
            .await
            .map_err(|e| ProxyError::Io(std::io::Error::other(e.to_string())))?
            .map_err(ProxyError::from)
    }
}

/// Pushes event firings into a connection's outbound queue.
struct EventSink {
    outbound: mpsc::Sender<Vec<u8>>,
    max: u32,
    connection: u64,
}

impl EventSink {
    fn push(&self, event: EventPush) {
        let name = event.event.clone();
        match encode_frame(FrameKind::Push, &Push::Event(event), self.max) {
            Ok(frame) => {
                if let Err(e) = self.outbound.try_send(frame) {
                    warn!(connection = self.connection, event = %name, error = %e, "Event push dropped");
                }
            }
            Err(e) => warn!(connection = self.connection, event = %name, error = %e, "Event encoding failed"),
        }
    }
}

fn decode_payload(command: &Command, payload: &str) -> Result<Value, ProxyError> {
    let prototype: &Prototype = command.argument_prototype();
    prototype.decode(payload).ok_or_else(|| ProxyError::PayloadDecode {
        command: command.name().to_string(),
        expected: prototype.type_name().to_string(),
    })
}

fn encode_value(value: &Value) -> Result<Reply, ProxyError> {
    serde_json::to_string(value)
        .map(|payload| Reply::Value { payload })
        .map_err(|e| {
            ProxyError::Exec(ExecError::ResultEncoding {
                command: String::new(),
                message: e.to_string(),
            })
        })
}
