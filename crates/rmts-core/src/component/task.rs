//! Task modes, user task bodies and the task runner thread.
//!
//! # Task Loop
//!
//! ```text
//! startup ─► Ready ─► Active ─┬─► drain mailboxes ─► run ─► wait ─┐
//!                             │                                    │
//!                             └──────────── until stop ◄───────────┘
//!                         Stopping ─► final drain ─► cleanup ─► Finished
//! ```
//!
//! | Mode | Wait between iterations |
//! |------|-------------------------|
//! | `Periodic(p)` | until the next multiple of `p` (or stop) |
//! | `EventDriven` | until an enqueue wakes it, or `idle_wait` |
//! | `Passive` | no thread; the owner drains explicitly |

use super::state::{ComponentState, StateCell};
use crate::interface::{ProvidedInterface, RequiredInterface};
use crate::mailbox::PostQueuedHook;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// How a component is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// A device: no thread of its own. Commands default to direct execution.
    Passive,
    /// Runs every period. A zero period uses the configured default.
    Periodic(Duration),
    /// Sleeps until a command is queued for it.
    EventDriven,
}

impl TaskMode {
    /// Default queueing for `ComponentPolicy` interfaces of this mode.
    #[must_use]
    pub const fn queues_by_default(self) -> bool {
        !matches!(self, Self::Passive)
    }

    #[must_use]
    pub const fn has_thread(self) -> bool {
        !matches!(self, Self::Passive)
    }
}

/// Error returned from task hooks.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// User behaviour of a component.
///
/// Mailboxes are drained before every `run`, so implementations only
/// hold their own control logic.
///
/// # Example
///
/// ```
/// use rmts_core::{TaskBody, TaskContext, TaskError};
///
/// struct Counter(u32);
///
/// impl TaskBody for Counter {
///     fn run(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
///         self.0 += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait TaskBody: Send {
    /// Runs once on the task thread before the loop starts.
    ///
    /// An error stops the component before it becomes active.
    fn startup(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// Runs once per iteration after the mailboxes are drained.
    fn run(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    /// Runs once after the final drain.
    fn cleanup(&mut self, _ctx: &TaskContext) {}
}

/// Body that only drains mailboxes.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleBody;

impl TaskBody for IdleBody {}

/// What a task body sees of its component.
#[derive(Debug, Clone)]
pub struct TaskContext {
    component: String,
    provided: Vec<Arc<ProvidedInterface>>,
    required: Vec<Arc<RequiredInterface>>,
    stop: Arc<AtomicBool>,
}

impl TaskContext {
    pub(crate) fn new(
        component: String,
        provided: Vec<Arc<ProvidedInterface>>,
        required: Vec<Arc<RequiredInterface>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            component,
            provided,
            required,
            stop,
        }
    }

    #[must_use]
    pub fn component_name(&self) -> &str {
        &self.component
    }

    /// Provided interface by name.
    #[must_use]
    pub fn provided(&self, name: &str) -> Option<&Arc<ProvidedInterface>> {
        self.provided.iter().find(|p| p.name() == name)
    }

    /// Required interface by name.
    #[must_use]
    pub fn required(&self, name: &str) -> Option<&Arc<RequiredInterface>> {
        self.required.iter().find(|r| r.name() == name)
    }

    /// Drains every provided clone mailbox and every handler mailbox.
    pub fn process_mailboxes(&self) -> usize {
        let provided: usize = self.provided.iter().map(|p| p.process_mailboxes()).sum();
        let handlers: usize = self.required.iter().map(|r| r.process_mailbox()).sum();
        provided + handlers
    }

    /// Returns `true` once the manager asked this component to stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Wake-up signal for event-driven tasks.
#[derive(Debug, Default)]
pub(crate) struct Wakeup {
    pending: Mutex<bool>,
    signal: Condvar,
}

impl Wakeup {
    pub(crate) fn notify(&self) {
        *self.pending.lock() = true;
        self.signal.notify_one();
    }

    /// Sleeps until notified or `deadline`; returns `true` if notified.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut pending = self.pending.lock();
        while !*pending {
            if self.signal.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *pending, false)
    }

    pub(crate) fn hook(self: &Arc<Self>) -> PostQueuedHook {
        let wakeup = Arc::clone(self);
        Arc::new(move || wakeup.notify())
    }
}

/// A running task thread.
pub(crate) struct TaskRunner {
    stop: Arc<AtomicBool>,
    wakeup: Arc<Wakeup>,
    join: JoinHandle<()>,
}

/// Settings the loop needs besides the body.
pub(crate) struct LoopSettings {
    pub(crate) mode: TaskMode,
    pub(crate) period: Duration,
    pub(crate) idle_wait: Duration,
}

impl TaskRunner {
    pub(crate) fn spawn(
        ctx: TaskContext,
        mut body: Box<dyn TaskBody>,
        settings: LoopSettings,
        state: Arc<StateCell>,
        wakeup: Arc<Wakeup>,
    ) -> std::io::Result<Self> {
        let stop = Arc::clone(&ctx.stop);
        let thread_wakeup = Arc::clone(&wakeup);
        let join = thread::Builder::new()
            .name(format!("rmts-{}", ctx.component))
            .spawn(move || run_loop(&ctx, body.as_mut(), &settings, &state, &thread_wakeup))?;
        Ok(Self { stop, wakeup, join })
    }

    /// Asks the loop to finish its iteration and shut down.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wakeup.notify();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub(crate) fn join(self) -> bool {
        self.join.join().is_ok()
    }
}

fn run_loop(
    ctx: &TaskContext,
    body: &mut dyn TaskBody,
    settings: &LoopSettings,
    state: &StateCell,
    wakeup: &Wakeup,
) {
    let name = ctx.component_name();
    if let Err(e) = body.startup(ctx) {
        error!(component = name, error = %e, "Task startup failed");
        state.set(ComponentState::Stopping);
        body.cleanup(ctx);
        state.set(ComponentState::Finished);
        return;
    }
    state.set(ComponentState::Ready);
    state.set(ComponentState::Active);
    info!(component = name, mode = ?settings.mode, "Task started");

    let mut next_tick = Instant::now();
    while !ctx.stop_requested() {
        let drained = ctx.process_mailboxes();
        if drained > 0 {
            trace!(component = name, drained, "Mailboxes drained");
        }
        if let Err(e) = body.run(ctx) {
            warn!(component = name, error = %e, "Task iteration failed");
        }

        match settings.mode {
            TaskMode::Periodic(_) => {
                next_tick += settings.period;
                let now = Instant::now();
                if next_tick < now {
                    debug!(component = name, overrun = ?(now - next_tick), "Period overrun");
                    next_tick = now;
                }
                while !ctx.stop_requested() && Instant::now() < next_tick {
                    wakeup.wait_until(next_tick);
                }
            }
            TaskMode::EventDriven => {
                wakeup.wait_until(Instant::now() + settings.idle_wait);
            }
            TaskMode::Passive => break,
        }
    }

    state.set(ComponentState::Stopping);
    let drained = ctx.process_mailboxes();
    debug!(component = name, drained, "Final drain");
    body.cleanup(ctx);
    state.set(ComponentState::Finished);
    info!(component = name, "Task finished");
}
