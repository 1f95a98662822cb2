//! Blocking proxy client.
//!
//! Calls block the caller's thread until the matching reply arrives or the
//! request timeout elapses. The client owns a small tokio runtime: a reader
//! task drains the socket into a bounded channel, so heartbeats and event
//! pushes that arrive between replies are not lost. When the channel is
//! full, pushes are dropped with a warning. Events that reached the client
//! wait in a bounded buffer (oldest dropped first) until
//! [`ProxyClient::take_events`].

use crate::codec::{decode_body, encode_frame, read_frame, FrameKind};
use crate::error::ProxyError;
use crate::wire::{EventPush, InterfaceDescriptor, Push, Reply, ReplyFrame, Request, RequestFrame};
use rmts_core::config::ProxyConfig;
use rmts_types::{ClientId, CommandKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
enum Incoming {
    Reply(ReplyFrame),
    Push(Push),
}

type Inbound = Result<Incoming, ProxyError>;

/// Blocking client of a proxy server.
///
/// Owns its runtime, so it must not be created or dropped inside an async
/// context.
///
/// # Example
///
/// ```no_run
/// use rmts_core::config::ProxyConfig;
/// use rmts_proxy::ProxyClient;
/// use rmts_types::CommandKind;
///
/// let mut client = ProxyClient::connect("127.0.0.1:7420", &ProxyConfig::default())
///     .expect("connect");
/// client.hello("planner").expect("hello");
/// let interfaces = client.discover("robot").expect("discover");
/// let set_goal = interfaces[0]
///     .command(CommandKind::Write, "SetGoal")
///     .expect("SetGoal")
///     .handle;
/// client.remote_connect("planner", "Robot", "robot", "Robot").expect("connect");
/// client.execute_write(set_goal, &3.5).expect("queued");
/// ```
pub struct ProxyClient {
    writer: OwnedWriteHalf,
    incoming: mpsc::Receiver<Inbound>,
    reader: JoinHandle<()>,
    next_request: u64,
    client_id: Option<ClientId>,
    events: VecDeque<EventPush>,
    event_buffer: usize,
    last_heartbeat: Option<u64>,
    timeout: Duration,
    max_frame: u32,
    // Dropped last: the socket halves and the reader task belong to it.
    runtime: Runtime,
}

impl ProxyClient {
    /// Opens a connection; call [`hello`](Self::hello) next.
    pub fn connect(addr: impl ToSocketAddrs, config: &ProxyConfig) -> Result<Self, ProxyError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("rmts-proxy-client")
            .enable_all()
            .build()?;
        let stream = runtime.block_on(TcpStream::connect(addr))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let (read_half, writer) = stream.into_split();

        let event_buffer = config.event_buffer.max(1);
        let (tx, incoming) = mpsc::channel(event_buffer);
        let max_frame = config.max_frame_bytes;
        let reader = runtime.spawn(read_loop(read_half, tx, max_frame));

        debug!(peer = ?peer, "Proxy client connected");
        Ok(Self {
            writer,
            incoming,
            reader,
            next_request: 1,
            client_id: None,
            events: VecDeque::new(),
            event_buffer,
            last_heartbeat: None,
            timeout: config.request_timeout(),
            max_frame,
            runtime,
        })
    }

    /// Overrides how long a call waits for its reply.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Id assigned by the server, once registered.
    #[must_use]
    pub const fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Sequence number of the last heartbeat seen.
    #[must_use]
    pub const fn last_heartbeat(&self) -> Option<u64> {
        self.last_heartbeat
    }

    /// Registers with the server.
    pub fn hello(&mut self, client_name: &str) -> Result<ClientId, ProxyError> {
        match self.call(Request::Hello {
            client_name: client_name.to_string(),
        })? {
            Reply::Welcome { client_id, .. } => {
                self.client_id = Some(client_id);
                Ok(client_id)
            }
            _ => Err(ProxyError::UnexpectedReply { expected: "welcome" }),
        }
    }

    /// Names of the server's components.
    pub fn list_components(&mut self) -> Result<Vec<String>, ProxyError> {
        match self.call(Request::ListComponents)? {
            Reply::Components { names } => Ok(names),
            _ => Err(ProxyError::UnexpectedReply { expected: "components" }),
        }
    }

    /// Provided interfaces of `component`, with handles valid on this
    /// connection only.
    pub fn discover(&mut self, component: &str) -> Result<Vec<InterfaceDescriptor>, ProxyError> {
        match self.call(Request::GetProvidedInterfaces {
            component: component.to_string(),
        })? {
            Reply::Interfaces { interfaces } => Ok(interfaces),
            _ => Err(ProxyError::UnexpectedReply { expected: "interfaces" }),
        }
    }

    /// Connects a server-side stand-in for `caller_component` to a
    /// provided interface. Returns the end-user interface name.
    pub fn remote_connect(
        &mut self,
        caller_component: &str,
        caller_interface: &str,
        provider_component: &str,
        provider_interface: &str,
    ) -> Result<String, ProxyError> {
        match self.call(Request::Connect {
            caller_component: caller_component.to_string(),
            caller_interface: caller_interface.to_string(),
            provider_component: provider_component.to_string(),
            provider_interface: provider_interface.to_string(),
        })? {
            Reply::Connected { end_user, .. } => Ok(end_user),
            _ => Err(ProxyError::UnexpectedReply { expected: "connected" }),
        }
    }

    /// Undoes a [`remote_connect`](Self::remote_connect). Returns the
    /// number of queued calls that were abandoned.
    pub fn remote_disconnect(
        &mut self,
        caller_component: &str,
        caller_interface: &str,
    ) -> Result<usize, ProxyError> {
        match self.call(Request::Disconnect {
            caller_component: caller_component.to_string(),
            caller_interface: caller_interface.to_string(),
        })? {
            Reply::Disconnected { abandoned } => Ok(abandoned),
            _ => Err(ProxyError::UnexpectedReply { expected: "disconnected" }),
        }
    }

    // === Execute ===

    /// Executes a command of `kind` with an already serialized payload.
    ///
    /// `payload` is ignored for kinds without an argument. Returns the
    /// decoded result for kinds that produce one.
    pub fn execute(&mut self, kind: CommandKind, handle: u64, payload: &str) -> Result<Option<Value>, ProxyError> {
        let payload = payload.to_string();
        let request = match kind {
            CommandKind::Void => Request::ExecuteVoid { handle },
            CommandKind::Write => Request::ExecuteWrite { handle, payload },
            CommandKind::Read => Request::ExecuteRead { handle },
            CommandKind::QualifiedRead => Request::ExecuteQualifiedRead { handle, payload },
            CommandKind::VoidReturn => Request::ExecuteVoidReturn { handle },
            CommandKind::WriteReturn => Request::ExecuteWriteReturn { handle, payload },
        };
        match self.call(request)? {
            Reply::Done => Ok(None),
            Reply::Value { payload } => serde_json::from_str(&payload)
                .map(Some)
                .map_err(|e| ProxyError::malformed(e.to_string())),
            _ => Err(ProxyError::UnexpectedReply { expected: "value" }),
        }
    }

    pub fn execute_void(&mut self, handle: u64) -> Result<(), ProxyError> {
        self.execute(CommandKind::Void, handle, "").map(drop)
    }

    pub fn execute_write<T: Serialize>(&mut self, handle: u64, arg: &T) -> Result<(), ProxyError> {
        let payload = encode_arg(arg)?;
        self.execute(CommandKind::Write, handle, &payload).map(drop)
    }

    pub fn execute_read(&mut self, handle: u64) -> Result<Value, ProxyError> {
        self.execute_value(CommandKind::Read, handle, "")
    }

    pub fn execute_qualified_read<T: Serialize>(&mut self, handle: u64, arg: &T) -> Result<Value, ProxyError> {
        let payload = encode_arg(arg)?;
        self.execute_value(CommandKind::QualifiedRead, handle, &payload)
    }

    /// Waits server-side for the queued call to run.
    pub fn execute_void_return(&mut self, handle: u64) -> Result<Value, ProxyError> {
        self.execute_value(CommandKind::VoidReturn, handle, "")
    }

    /// Waits server-side for the queued call to run.
    pub fn execute_write_return<T: Serialize>(&mut self, handle: u64, arg: &T) -> Result<Value, ProxyError> {
        let payload = encode_arg(arg)?;
        self.execute_value(CommandKind::WriteReturn, handle, &payload)
    }

    fn execute_value(&mut self, kind: CommandKind, handle: u64, payload: &str) -> Result<Value, ProxyError> {
        self.execute(kind, handle, payload)?
            .ok_or(ProxyError::UnexpectedReply { expected: "value" })
    }

    // === Events ===

    /// Buffered events, oldest first.
    pub fn take_events(&mut self) -> Vec<EventPush> {
        loop {
            match self.incoming.try_recv() {
                Ok(Ok(Incoming::Push(push))) => self.absorb(push),
                Ok(Ok(Incoming::Reply(frame))) => {
                    debug!(request_id = frame.request_id, "Discarding late reply");
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "Reader stopped");
                    break;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        self.events.drain(..).collect()
    }

    /// Waits up to `timeout` for the next event.
    pub fn wait_event(&mut self, timeout: Duration) -> Result<Option<EventPush>, ProxyError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_within(remaining) {
                Some(Some(Ok(Incoming::Push(push)))) => self.absorb(push),
                Some(Some(Ok(Incoming::Reply(frame)))) => {
                    debug!(request_id = frame.request_id, "Discarding late reply");
                }
                Some(Some(Err(e))) => return Err(e),
                Some(None) => return Err(ProxyError::ConnectionClosed),
                None => return Ok(None),
            }
        }
    }

    // === Plumbing ===

    fn call(&mut self, request: Request) -> Result<Reply, ProxyError> {
        let request_id = self.next_request;
        self.next_request += 1;
        let name = request.name();
        let frame = encode_frame(
            FrameKind::Request,
            &RequestFrame {
                request_id,
                request,
            },
            self.max_frame,
        )?;
        self.runtime.block_on(self.writer.write_all(&frame))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_within(remaining) {
                Some(Some(Ok(Incoming::Reply(frame)))) if frame.request_id == request_id => {
                    return match frame.reply {
                        Reply::Error { code, message } => {
                            debug!(request = name, %code, "Remote error");
                            Err(ProxyError::Remote { code, message })
                        }
                        reply => Ok(reply),
                    };
                }
                Some(Some(Ok(Incoming::Reply(frame)))) => {
                    debug!(request_id = frame.request_id, "Discarding late reply");
                }
                Some(Some(Ok(Incoming::Push(push)))) => self.absorb(push),
                Some(Some(Err(e))) => return Err(e),
                Some(None) => return Err(ProxyError::ConnectionClosed),
                None => {
                    warn!(request = name, request_id, "Request timed out");
                    return Err(ProxyError::Timeout {
                        after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            }
        }
    }

    /// Next inbound message. `None` on timeout, `Some(None)` once the
    /// reader task has stopped.
    fn recv_within(&mut self, timeout: Duration) -> Option<Option<Inbound>> {
        let incoming = &mut self.incoming;
        self.runtime
            .block_on(async move { tokio::time::timeout(timeout, incoming.recv()).await })
            .ok()
    }

    fn absorb(&mut self, push: Push) {
        match push {
            Push::Heartbeat { sequence } => self.last_heartbeat = Some(sequence),
            Push::Event(event) => {
                if self.events.len() >= self.event_buffer {
                    warn!(event = %event.event, "Event buffer full; dropping oldest");
                    self.events.pop_front();
                }
                self.events.push_back(event);
            }
        }
    }
}

impl Drop for ProxyClient {
    fn drop(&mut self) {
        // The write half closes with the struct; the server sees EOF.
        self.reader.abort();
    }
}

fn encode_arg<T: Serialize>(arg: &T) -> Result<String, ProxyError> {
    serde_json::to_string(arg).map_err(|e| ProxyError::malformed(e.to_string()))
}

async fn read_loop(mut stream: OwnedReadHalf, tx: mpsc::Sender<Inbound>, max: u32) {
    loop {
        let incoming = match read_frame(&mut stream, max).await {
            Ok(Some((kind, body))) => match kind {
                FrameKind::Reply => decode_body(&body).map(Incoming::Reply),
                FrameKind::Push => decode_body(&body).map(Incoming::Push),
                FrameKind::Request => Err(ProxyError::malformed("server sent a request frame")),
            },
            Ok(None) => Err(ProxyError::ConnectionClosed),
            Err(e) => Err(e),
        };

        match incoming {
            Ok(Incoming::Push(push)) => match tx.try_send(Ok(Incoming::Push(push))) {
                Ok(()) => {}
                Err(TrySendError::Full(Ok(Incoming::Push(Push::Event(event))))) => {
                    warn!(event = %event.event, "Client inbound buffer full; event dropped");
                }
                Err(TrySendError::Full(_)) => debug!("Client inbound buffer full; heartbeat dropped"),
                Err(TrySendError::Closed(_)) => return,
            },
            other => {
                let failed = other.is_err();
                if tx.send(other).await.is_err() || failed {
                    return;
                }
            }
        }
    }
}
