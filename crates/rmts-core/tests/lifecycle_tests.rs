//! Integration tests for threaded components, disconnect and shutdown.

use rmts_core::interface::Requirement;
use rmts_core::testing::CallLog;
use rmts_core::{
    Component, ComponentManager, ComponentState, EntryState, ExecError, RuntimeConfig, TaskBody,
    TaskContext, TaskError, TaskMode,
};
use rmts_types::{CommandKind, CommandQueueing, ErrorCode, InterfaceQueueing};
use serde_json::json;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn arm(mode: TaskMode, log: &CallLog) -> Component {
    let mut arm = Component::new("arm", mode);
    let iface = arm.add_provided_interface("Arm", InterfaceQueueing::ComponentPolicy);
    let sink = log.clone();
    iface
        .add_command_write(
            "MoveTo",
            move |x: f64| sink.record(format!("move {x}")),
            CommandQueueing::InterfacePolicy,
        )
        .expect("MoveTo");
    iface
        .add_command_void_return("Home", || 0.0_f64, CommandQueueing::InterfacePolicy)
        .expect("Home");
    arm
}

fn operator() -> Component {
    let mut op = Component::device("operator");
    let req = op.add_required_interface("Arm");
    req.add_function("MoveTo", CommandKind::Write, Requirement::Required)
        .expect("MoveTo");
    req.add_function("Home", CommandKind::VoidReturn, Requirement::Required)
        .expect("Home");
    op
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

// =============================================================================
// Task threads
// =============================================================================

mod tasks {
    use super::*;

    #[test]
    fn periodic_task_drains_queued_writes() {
        let log = CallLog::new();
        let manager = ComponentManager::new();
        manager
            .add_component(arm(TaskMode::Periodic(Duration::from_millis(2)), &log))
            .expect("arm");
        manager.add_component(operator()).expect("operator");
        manager.connect("operator", "Arm", "arm", "Arm").expect("connect");
        manager.start_all().expect("start");
        assert!(manager
            .wait_for_state("arm", ComponentState::Active, WAIT)
            .expect("arm"));

        let move_to = manager
            .component("operator")
            .and_then(|c| c.required_interface("Arm"))
            .and_then(|r| r.function("MoveTo"))
            .expect("MoveTo");
        for x in [1.0, 2.0, 3.0] {
            move_to.execute_write(json!(x)).expect("enqueued");
        }
        assert!(wait_until(|| log.len() == 3));
        assert_eq!(log.entries(), vec!["move 1", "move 2", "move 3"]);

        manager.stop_all().expect("stop");
        assert_eq!(
            manager.component("arm").expect("arm").state(),
            ComponentState::Finished
        );
    }

    #[test]
    fn event_driven_task_wakes_on_enqueue() {
        let log = CallLog::new();
        let mut config = RuntimeConfig::default();
        // Long idle wait: only the post-queued hook can wake it in time.
        config.task.idle_wait_ms = 60_000;
        let manager = ComponentManager::with_config(&config);
        manager
            .add_component(arm(TaskMode::EventDriven, &log))
            .expect("arm");
        manager.add_component(operator()).expect("operator");
        manager.connect("operator", "Arm", "arm", "Arm").expect("connect");
        manager.start_all().expect("start");
        assert!(manager
            .wait_for_state("arm", ComponentState::Active, WAIT)
            .expect("arm"));

        let home = manager
            .component("operator")
            .and_then(|c| c.required_interface("Arm"))
            .and_then(|r| r.function("Home"))
            .expect("Home");
        let ticket = home.execute_void_return().expect("enqueued");
        assert_eq!(ticket.wait(WAIT).expect("result"), json!(0.0));

        manager.stop_all().expect("stop");
    }

    struct FailingStartup;

    impl TaskBody for FailingStartup {
        fn startup(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
            Err("calibration missing".into())
        }
    }

    #[test]
    fn device_startup_failure_is_reported() {
        let manager = ComponentManager::new();
        manager
            .add_component(Component::device("camera").with_body(FailingStartup))
            .expect("camera");
        let err = manager.start_all().expect_err("startup fails");
        assert_eq!(err.code(), "MANAGER_STARTUP");
    }

    #[test]
    fn threaded_startup_failure_finishes() {
        let manager = ComponentManager::new();
        manager
            .add_component(Component::new("camera", TaskMode::EventDriven).with_body(FailingStartup))
            .expect("camera");
        manager.start_all().expect("thread spawned");
        assert!(manager
            .wait_for_state("camera", ComponentState::Finished, WAIT)
            .expect("camera"));
        manager.stop_all().expect("already finished");
    }
}

// =============================================================================
// Disconnect
// =============================================================================

mod disconnect {
    use super::*;

    #[test]
    fn disconnect_abandons_pending_and_refuses_new_calls() {
        let log = CallLog::new();
        let manager = ComponentManager::new();
        manager
            .add_component(arm(TaskMode::Periodic(Duration::from_millis(2)), &log))
            .expect("arm");
        manager.add_component(operator()).expect("operator");
        manager.connect("operator", "Arm", "arm", "Arm").expect("connect");

        // Not started: entries stay queued.
        let required = manager
            .component("operator")
            .and_then(|c| c.required_interface("Arm"))
            .expect("Arm");
        let move_to = required.function("MoveTo").expect("MoveTo");
        let command = move_to.command().expect("bound");
        let pending = move_to.execute_write(json!(1.0)).expect("enqueued");

        assert_eq!(manager.disconnect("operator", "Arm").expect("disconnect"), 1);
        assert_eq!(pending.state(), EntryState::Abandoned);
        assert!(matches!(
            pending.wait(Duration::from_millis(10)),
            Err(ExecError::Disconnected { .. })
        ));

        assert!(!required.is_bound());
        assert!(matches!(
            move_to.execute_write(json!(2.0)),
            Err(ExecError::CallableUnavailable { .. })
        ));
        // A caller that kept the command object sees the closed mailbox.
        assert!(matches!(
            command.execute_write(json!(3.0)),
            Err(ExecError::Disconnected { .. })
        ));

        let provider = manager.provided_interface("arm", "Arm").expect("Arm");
        assert!(provider.end_user_interfaces().is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn reconnect_after_disconnect_gets_fresh_clone() {
        let manager = ComponentManager::new();
        manager
            .add_component(arm(TaskMode::Periodic(Duration::from_millis(2)), &CallLog::new()))
            .expect("arm");
        manager.add_component(operator()).expect("operator");
        manager.connect("operator", "Arm", "arm", "Arm").expect("first");
        manager.disconnect("operator", "Arm").expect("disconnect");
        let again = manager
            .connect("operator", "Arm", "arm", "Arm")
            .expect("second");
        assert_eq!(again.end_user, "ArmForoperator");

        let provider = manager.provided_interface("arm", "Arm").expect("Arm");
        let clones = provider.end_user_interfaces();
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].serial(), Some(2));
    }
}
