//! Integration tests for command dispatch through connected components.
//!
//! Exercises registration, per-caller clones, mailbox backpressure and
//! event fan-out through the public API only.

use rmts_core::interface::Requirement;
use rmts_core::testing::CallLog;
use rmts_core::{
    Component, ComponentManager, EntryState, ExecError, InterfaceError, ProvidedInterface,
};
use rmts_types::{CommandKind, CommandQueueing, ErrorCode, InterfaceQueueing};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn robot(log: &CallLog, policy: InterfaceQueueing) -> Component {
    let mut robot = Component::device("robot");
    let iface = robot.add_provided_interface("Robot", policy);
    let sink = log.clone();
    iface
        .add_command_write(
            "SetGoal",
            move |x: f64| sink.record(format!("goal {x}")),
            CommandQueueing::InterfacePolicy,
        )
        .expect("SetGoal");
    iface
        .add_command_read("GetPosition", || 3.5_f64)
        .expect("GetPosition");
    iface.add_event_void("GoalReached").expect("GoalReached");
    robot
}

fn planner(name: &str) -> Component {
    let mut planner = Component::device(name);
    let req = planner.add_required_interface("Robot");
    req.add_function("SetGoal", CommandKind::Write, Requirement::Required)
        .expect("SetGoal");
    req.add_function("GetPosition", CommandKind::Read, Requirement::Optional)
        .expect("GetPosition");
    planner
}

// =============================================================================
// Registration
// =============================================================================

mod registration {
    use super::*;

    #[test]
    fn duplicate_name_per_kind_fails_first_survives() {
        let log = CallLog::new();
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::NotQueued);
        let sink = log.clone();
        iface
            .add_command_void("Home", move || sink.record("first"), CommandQueueing::InterfacePolicy)
            .expect("first");
        let sink = log.clone();
        let err = iface
            .add_command_void("Home", move || sink.record("second"), CommandQueueing::InterfacePolicy)
            .expect_err("duplicate");
        assert_eq!(err.code(), "INTERFACE_DUPLICATE_COMMAND");

        iface
            .command_void("Home")
            .expect("lookup")
            .execute_void()
            .expect("runs");
        assert_eq!(log.entries(), vec!["first"]);
    }

    #[test]
    fn interfaces_sealed_by_add_component() {
        let manager = ComponentManager::new();
        manager
            .add_component(robot(&CallLog::new(), InterfaceQueueing::Queued))
            .expect("robot");
        let iface = manager
            .provided_interface("robot", "Robot")
            .expect("interface");
        assert!(iface.is_sealed());
        assert_eq!(iface.names_of_commands(), vec!["SetGoal", "GetPosition"]);
    }

    #[test]
    fn wrong_argument_type_never_executes() {
        let log = CallLog::new();
        let manager = ComponentManager::new();
        manager
            .add_component(robot(&log, InterfaceQueueing::NotQueued))
            .expect("robot");
        manager.add_component(planner("planner")).expect("planner");
        manager
            .connect("planner", "Robot", "robot", "Robot")
            .expect("connect");

        let set = manager
            .component("planner")
            .and_then(|c| c.required_interface("Robot"))
            .and_then(|r| r.function("SetGoal"))
            .expect("SetGoal");
        let err = set.execute_write(json!("north")).expect_err("mismatch");
        assert_eq!(err.code(), "EXEC_ARGUMENT_MISMATCH");
        assert!(log.is_empty());
    }
}

// =============================================================================
// Per-caller clones
// =============================================================================

mod clones {
    use super::*;

    #[test]
    fn fifo_within_each_clone_no_duplicates() {
        let log = CallLog::new();
        let manager = ComponentManager::new();
        manager
            .add_component(robot(&log, InterfaceQueueing::Queued))
            .expect("robot");
        manager.add_component(planner("a")).expect("a");
        manager.add_component(planner("b")).expect("b");
        manager.connect("a", "Robot", "robot", "Robot").expect("a");
        manager.connect("b", "Robot", "robot", "Robot").expect("b");

        let function = |client: &str| {
            manager
                .component(client)
                .and_then(|c| c.required_interface("Robot"))
                .and_then(|r| r.function("SetGoal"))
                .expect("SetGoal")
        };
        let (set_a, set_b) = (function("a"), function("b"));

        let producer_a = thread::spawn(move || {
            for i in 0..20_u32 {
                set_a.execute_write(json!(f64::from(i))).expect("a enqueue");
            }
        });
        let producer_b = thread::spawn(move || {
            for i in 100..110_u32 {
                set_b.execute_write(json!(f64::from(i))).expect("b enqueue");
            }
        });
        producer_a.join().expect("producer a");
        producer_b.join().expect("producer b");

        let robot = manager.component("robot").expect("robot");
        assert_eq!(robot.process_mailboxes(), 30);
        assert_eq!(robot.process_mailboxes(), 0);

        let entries = log.entries();
        assert_eq!(entries.len(), 30);
        let a: Vec<_> = entries
            .iter()
            .filter_map(|e| e.strip_prefix("goal ")?.parse::<u32>().ok())
            .filter(|v| *v < 100)
            .collect();
        let b: Vec<_> = entries
            .iter()
            .filter_map(|e| e.strip_prefix("goal ")?.parse::<u32>().ok())
            .filter(|v| *v >= 100)
            .collect();
        assert_eq!(a, (0..20).collect::<Vec<_>>());
        assert_eq!(b, (100..110).collect::<Vec<_>>());
    }

    #[test]
    fn reads_bypass_the_mailbox() {
        let manager = ComponentManager::new();
        manager
            .add_component(robot(&CallLog::new(), InterfaceQueueing::Queued))
            .expect("robot");
        manager.add_component(planner("planner")).expect("planner");
        manager
            .connect("planner", "Robot", "robot", "Robot")
            .expect("connect");

        let get = manager
            .component("planner")
            .and_then(|c| c.required_interface("Robot"))
            .and_then(|r| r.function("GetPosition"))
            .expect("GetPosition");
        assert_eq!(get.execute_read().expect("read"), json!(3.5));
    }

    #[test]
    fn not_queued_interface_is_shared() {
        let manager = ComponentManager::new();
        manager
            .add_component(robot(&CallLog::new(), InterfaceQueueing::NotQueued))
            .expect("robot");
        manager.add_component(planner("a")).expect("a");
        manager.add_component(planner("b")).expect("b");
        let a = manager.connect("a", "Robot", "robot", "Robot").expect("a");
        let b = manager.connect("b", "Robot", "robot", "Robot").expect("b");
        assert_eq!(a.end_user, "Robot");
        assert_eq!(b.end_user, "Robot");
    }
}

// =============================================================================
// Backpressure
// =============================================================================

mod backpressure {
    use super::*;

    #[test]
    fn full_mailbox_fails_without_partial_write() {
        let log = CallLog::new();
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::Queued);
        let sink = log.clone();
        iface
            .add_command_write(
                "SetGoal",
                move |x: f64| sink.record(format!("goal {x}")),
                CommandQueueing::InterfacePolicy,
            )
            .expect("SetGoal");
        iface.set_mailbox_and_argument_queues_size(3);
        iface.seal();
        let iface = Arc::new(iface);
        let user = iface.get_end_user_interface("planner");
        let set = user.command_write("SetGoal").expect("SetGoal");

        let tickets: Vec<_> = (1..=3_u32)
            .map(|i| set.execute_write(json!(f64::from(i))).expect("fits"))
            .collect();
        let err = set.execute_write(json!(4.0)).expect_err("full");
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            ExecError::QueueFull { .. } | ExecError::ArgumentQueueFull { .. }
        ));
        let mailbox = user.mailbox().expect("clone mailbox");
        assert_eq!(mailbox.len(), 3);

        assert_eq!(iface.process_mailboxes(), 3);
        assert_eq!(log.entries(), vec!["goal 1", "goal 2", "goal 3"]);
        assert!(tickets.iter().all(|t| t.state() == EntryState::Done));

        set.execute_write(json!(5.0)).expect("room again");
    }
}

// =============================================================================
// Events
// =============================================================================

mod events {
    use super::*;

    #[test]
    fn zero_then_k_observers_in_order() {
        let log = CallLog::new();
        let manager = ComponentManager::new();
        manager
            .add_component(robot(&CallLog::new(), InterfaceQueueing::Queued))
            .expect("robot");
        for name in ["first", "second", "third"] {
            let mut c = Component::device(name);
            let sink = log.clone();
            let tag = name.to_string();
            c.add_required_interface("Robot")
                .add_event_handler_void(
                    "GoalReached",
                    move || sink.record(tag.clone()),
                    CommandQueueing::NotQueued,
                )
                .expect("handler");
            manager.add_component(c).expect("client");
        }

        let event = manager
            .provided_interface("robot", "Robot")
            .expect("interface")
            .event_void("GoalReached")
            .expect("event");
        let report = event.fire();
        assert_eq!(report.delivered, 0);
        assert!(report.all_delivered());

        for name in ["first", "second", "third"] {
            manager.connect(name, "Robot", "robot", "Robot").expect("connect");
        }
        assert_eq!(event.fire().delivered, 3);
        assert_eq!(log.entries(), vec!["first", "second", "third"]);
    }

    #[test]
    fn observer_kind_checked() {
        let mut iface = ProvidedInterface::new("Robot", InterfaceQueueing::NotQueued);
        iface.add_event_write::<f64>("Moved").expect("Moved");
        let mut req_component = Component::device("c");
        let handler = req_component
            .add_required_interface("Robot")
            .add_event_handler_void("Moved", || {}, CommandQueueing::NotQueued)
            .expect("handler");
        let err = iface.add_observer("Moved", handler).expect_err("kind");
        assert!(matches!(err, InterfaceError::ObserverKindMismatch { .. }));
    }
}
