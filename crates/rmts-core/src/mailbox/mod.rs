//! Bounded per-caller mailboxes.
//!
//! Every end-user clone of a queued provided interface owns exactly one
//! [`Mailbox`]. Callers on any thread enqueue into it; the provider's
//! owning thread drains it.
//!
//! # Entry Lifecycle
//!
//! ```text
//!  caller thread                       provider thread
//!  ─────────────                       ───────────────
//!  enqueue ──► [Enqueued] ─ FIFO ─► execute_next ──► [Executing] ──► [Done]
//!     │                                                     slot recycled
//!     └─ full ──► Err(QueueFull / ArgumentQueueFull), nothing written
//! ```
//!
//! # Capacity
//!
//! | Bound | Set by | Failure |
//! |-------|--------|---------|
//! | Entries | `mailbox.size` | `EXEC_QUEUE_FULL` |
//! | Argument copies per write command | `mailbox.argument_queue_size` | `EXEC_ARGUMENT_QUEUE_FULL` |
//!
//! Enqueue never blocks and is all-or-nothing: a rejected enqueue leaves
//! both the entry queue and the argument ring untouched.
//!
//! # Concurrency
//!
//! The only lock is the mutex around the entry queue and argument rings,
//! held for O(1) work on both sides. Callables run with no lock held, and
//! only one thread (the provider's) ever calls [`Mailbox::execute_next`].

mod argument_queue;
mod ticket;

pub use ticket::{EntryState, Ticket};

pub(crate) use ticket::Backoff;

use crate::command::{Callable, ExecError};
use argument_queue::ArgumentQueue;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Wake-up callable run after every successful enqueue.
pub type PostQueuedHook = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    command: String,
    run: Callable,
    argument: Option<(usize, usize)>,
    ticket: Ticket,
}

struct MailboxState {
    entries: VecDeque<Entry>,
    argument_queues: Vec<ArgumentQueue>,
}

/// Bounded FIFO of pending invocations plus their argument rings.
///
/// # Example
///
/// ```
/// use rmts_core::command::Callable;
/// use rmts_core::Mailbox;
/// use serde_json::Value;
///
/// let mailbox = Mailbox::new("RobotForPlanner", 2);
/// let stop = Callable::void(|| {});
///
/// let ticket = mailbox.enqueue("Stop", stop.clone(), None).expect("room");
/// assert!(!ticket.is_finished());
///
/// assert!(mailbox.execute_next());
/// assert_eq!(ticket.try_result(), Some(Ok(Value::Null)));
/// assert!(!mailbox.execute_next());
/// ```
pub struct Mailbox {
    name: String,
    capacity: usize,
    state: Mutex<MailboxState>,
    closed: AtomicBool,
    hook: Option<PostQueuedHook>,
}

impl Mailbox {
    /// Creates an empty mailbox holding at most `capacity` entries.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            state: Mutex::new(MailboxState {
                entries: VecDeque::with_capacity(capacity.max(1)),
                argument_queues: Vec::new(),
            }),
            closed: AtomicBool::new(false),
            hook: None,
        }
    }

    /// Attaches a post-queued wake-up hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Option<PostQueuedHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Mailbox name (the owning end-user interface name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of pending entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the mailbox was closed by a disconnect.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Allocates an argument ring for one queued write command.
    ///
    /// Returns the ring index to pass to [`Mailbox::enqueue`].
    pub fn register_argument_queue(&self, capacity: usize) -> usize {
        let mut state = self.state.lock();
        state.argument_queues.push(ArgumentQueue::new(capacity));
        state.argument_queues.len() - 1
    }

    /// Pending argument copies in ring `queue`.
    #[must_use]
    pub fn argument_queue_len(&self, queue: usize) -> usize {
        self.state
            .lock()
            .argument_queues
            .get(queue)
            .map_or(0, ArgumentQueue::len)
    }

    /// Appends an invocation of `run`.
    ///
    /// `argument` is `(ring index, value)` for write commands.
    ///
    /// # Errors
    ///
    /// - [`ExecError::Disconnected`] after [`Mailbox::close`]
    /// - [`ExecError::QueueFull`] when `capacity` entries are pending
    /// - [`ExecError::ArgumentQueueFull`] when the command's ring is full
    ///   (or the ring index is unknown)
    pub fn enqueue(
        &self,
        command: &str,
        run: Callable,
        argument: Option<(usize, Value)>,
    ) -> Result<Ticket, ExecError> {
        let ticket = {
            let mut state = self.state.lock();
            if self.is_closed() {
                return Err(ExecError::Disconnected {
                    mailbox: self.name.clone(),
                });
            }
            if state.entries.len() >= self.capacity {
                warn!(mailbox = %self.name, command, capacity = self.capacity, "Mailbox full");
                return Err(ExecError::QueueFull {
                    mailbox: self.name.clone(),
                });
            }

            let slot = match argument {
                Some((queue, value)) => {
                    let ring = state.argument_queues.get_mut(queue).ok_or_else(|| {
                        ExecError::ArgumentQueueFull {
                            mailbox: self.name.clone(),
                            command: command.to_string(),
                        }
                    })?;
                    match ring.push(value) {
                        Ok(slot) => Some((queue, slot)),
                        Err(_) => {
                            warn!(mailbox = %self.name, command, "Argument queue full");
                            return Err(ExecError::ArgumentQueueFull {
                                mailbox: self.name.clone(),
                                command: command.to_string(),
                            });
                        }
                    }
                }
                None => None,
            };

            let ticket = Ticket::pending();
            state.entries.push_back(Entry {
                command: command.to_string(),
                run,
                argument: slot,
                ticket: ticket.clone(),
            });
            trace!(mailbox = %self.name, command, pending = state.entries.len(), "Enqueued");
            ticket
        };

        if let Some(hook) = &self.hook {
            hook();
        }
        Ok(ticket)
    }

    /// Executes the head entry, if any.
    ///
    /// Must only be called from the provider's owning thread. Returns
    /// `false` when the mailbox was empty.
    pub fn execute_next(&self) -> bool {
        let (entry, value) = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.pop_front() else {
                return false;
            };
            let value = entry
                .argument
                .and_then(|(queue, slot)| state.argument_queues.get_mut(queue)?.take(slot))
                .unwrap_or(Value::Null);
            (entry, value)
        };

        entry.ticket.mark_executing();
        let result = entry.run.invoke(&value);
        if let Err(ref e) = result {
            warn!(mailbox = %self.name, command = %entry.command, error = %e, "Queued command failed");
        }
        entry.ticket.complete(result);
        true
    }

    /// Executes entries until the mailbox is empty; returns how many ran.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while self.execute_next() {
            executed += 1;
        }
        if executed > 0 {
            trace!(mailbox = %self.name, executed, "Drained mailbox");
        }
        executed
    }

    /// Refuses further enqueues and abandons everything still pending.
    ///
    /// Returns the number of abandoned entries. Idempotent.
    pub fn close(&self) -> usize {
        let abandoned: Vec<Entry> = {
            let mut state = self.state.lock();
            self.closed.store(true, Ordering::Release);
            state.argument_queues.iter_mut().for_each(ArgumentQueue::clear);
            state.entries.drain(..).collect()
        };

        for entry in &abandoned {
            entry.ticket.abandon(ExecError::Disconnected {
                mailbox: self.name.clone(),
            });
        }
        if !abandoned.is_empty() {
            debug!(mailbox = %self.name, abandoned = abandoned.len(), "Abandoned pending entries");
        }
        abandoned.len()
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
