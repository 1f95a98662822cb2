//! Demo robot hosted by `rmts serve`.
//!
//! One axis that moves toward its goal by a fixed step every period and
//! fires `GoalReached` on arrival.
//!
//! | Command | Kind | Effect |
//! |---------|------|--------|
//! | `SetGoal(f64)` | Write | new goal, starts moving |
//! | `GetPosition` | Read | current position |
//! | `Stop` | Void | goal := position |
//! | `Home` | VoidReturn | goal := 0, returns the position it left |

use parking_lot::Mutex;
use rmts_core::{Component, InterfaceError, TaskBody, TaskContext, TaskError, TaskMode};
use rmts_types::{CommandQueueing, InterfaceQueueing};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const COMPONENT: &str = "robot";
pub const INTERFACE: &str = "Robot";
pub const GOAL_REACHED: &str = "GoalReached";

/// Distance covered per period.
const STEP: f64 = 0.1;

#[derive(Debug, Default)]
struct Axis {
    position: f64,
    goal: f64,
    moving: bool,
}

impl Axis {
    fn head_to(&mut self, goal: f64) {
        self.goal = goal;
        self.moving = (goal - self.position).abs() > f64::EPSILON;
    }

    /// Advances one step. Returns `true` on the step that arrives.
    fn step(&mut self) -> bool {
        if !self.moving {
            return false;
        }
        let remaining = self.goal - self.position;
        if remaining.abs() <= STEP {
            self.position = self.goal;
            self.moving = false;
            true
        } else {
            self.position += STEP.copysign(remaining);
            false
        }
    }
}

struct Motion {
    axis: Arc<Mutex<Axis>>,
}

impl TaskBody for Motion {
    fn run(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let arrived = self.axis.lock().step();
        if arrived {
            let event = ctx
                .provided(INTERFACE)
                .and_then(|iface| iface.event_void(GOAL_REACHED));
            if let Some(event) = event {
                let report = event.fire();
                debug!(delivered = report.delivered, "Goal reached");
            }
        }
        Ok(())
    }
}

/// Builds the demo robot running every `period`.
///
/// # Errors
///
/// Returns [`InterfaceError`] if the interface cannot be registered.
pub fn robot(period: Duration) -> Result<Component, InterfaceError> {
    let axis = Arc::new(Mutex::new(Axis::default()));
    let mut robot = Component::new(COMPONENT, TaskMode::Periodic(period)).with_body(Motion {
        axis: Arc::clone(&axis),
    });
    let iface = robot.add_provided_interface(INTERFACE, InterfaceQueueing::ComponentPolicy);

    let state = Arc::clone(&axis);
    iface.add_command_write(
        "SetGoal",
        move |goal: f64| state.lock().head_to(goal),
        CommandQueueing::InterfacePolicy,
    )?;
    let state = Arc::clone(&axis);
    iface.add_command_read("GetPosition", move || state.lock().position)?;
    let state = Arc::clone(&axis);
    iface.add_command_void(
        "Stop",
        move || {
            let mut axis = state.lock();
            let here = axis.position;
            axis.head_to(here);
        },
        CommandQueueing::InterfacePolicy,
    )?;
    let state = axis;
    iface.add_command_void_return(
        "Home",
        move || {
            let mut axis = state.lock();
            let left = axis.position;
            axis.head_to(0.0);
            left
        },
        CommandQueueing::InterfacePolicy,
    )?;
    iface.add_event_void(GOAL_REACHED)?;
    Ok(robot)
}
