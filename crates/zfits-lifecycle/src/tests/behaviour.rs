//! Behaviour-driven tests driving a real writer stand-in.

use camino::Utf8Path;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use zfits_config::Config;
use zfits_supervisor::{
    ConfigValue, ProcessTreeTerminator, SignalGroupTerminator, WriterOptions,
};

use super::support::SCRIPTS;
use crate::controller::{CommandOutcome, Controller};
use crate::machine::LifecycleState;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    controller: Option<Controller>,
    last: Option<CommandOutcome>,
    pgid: Option<u32>,
}

impl TestWorld {
    fn controller(&self) -> &Controller {
        self.controller.as_ref().expect("no controller configured")
    }

    fn record(&mut self, outcome: CommandOutcome) {
        self.last = Some(outcome);
    }
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

fn controller_for(binary: &Utf8Path) -> Controller {
    Controller::from_config(&Config {
        writer_binary: binary.to_owned(),
        readiness_delay_ms: 300,
        shutdown_grace_ms: 1_000,
        ..Config::default()
    })
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a controller for a writer that stays up")]
fn given_steady_writer(world: &mut TestWorld) {
    world.controller = Some(controller_for(&SCRIPTS.steady));
}

#[given("a controller for a writer that exits immediately")]
fn given_crashing_writer(world: &mut TestWorld) {
    world.controller = Some(controller_for(&SCRIPTS.crashing));
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the writer is allocated with output directory /data/out")]
fn when_allocated(world: &mut TestWorld) {
    let options =
        WriterOptions::from([("output_dir".to_owned(), ConfigValue::from("/data/out"))]);
    let outcome = world.controller().allocate(options);
    world.pgid = world.controller().snapshot().worker.map(|worker| worker.pgid);
    world.record(outcome);
}

#[when("a run is started with triggers enabled")]
fn when_run_started(world: &mut TestWorld) {
    let run = world.controller().start_run();
    assert!(run.accepted, "start_run refused: {:?}", run.reason);
    let trigger = world.controller().start_trigger();
    world.record(trigger);
}

#[when("the writer is deallocated")]
fn when_deallocated(world: &mut TestWorld) {
    let outcome = world.controller().deallocate();
    world.record(outcome);
}

#[when("the controller aborts")]
fn when_aborted(world: &mut TestWorld) {
    let outcome = world.controller().abort();
    world.record(outcome);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the controller is in state {state}")]
fn then_state(world: &mut TestWorld, state: LifecycleState) {
    assert_eq!(world.controller().state(), state);
}

#[then("a writer process is live")]
fn then_writer_live(world: &mut TestWorld) {
    let pgid = world.pgid.expect("allocate recorded no writer");
    assert!(world.controller().snapshot().worker.is_some());
    assert!(
        SignalGroupTerminator
            .is_alive(pgid)
            .expect("query writer group"),
        "writer group {pgid} should be alive"
    );
}

#[then("no writer process is live")]
fn then_no_writer(world: &mut TestWorld) {
    assert!(world.controller().snapshot().worker.is_none());
    if let Some(pgid) = world.pgid {
        assert!(
            !SignalGroupTerminator
                .is_alive(pgid)
                .expect("query writer group"),
            "writer group {pgid} outlived its controller state"
        );
    }
}

#[then("the last command was refused")]
fn then_refused(world: &mut TestWorld) {
    let outcome = world.last.as_ref().expect("no command issued");
    assert!(!outcome.accepted, "{} was accepted", outcome.command);
    assert!(outcome.reason.is_some());
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/writer_lifecycle.feature", index = 0)]
fn allocate_and_deallocate(world: TestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/writer_lifecycle.feature", index = 1)]
fn abort_running_writer(world: TestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/writer_lifecycle.feature", index = 2)]
fn writer_crashing_during_start_up(world: TestWorld) {
    let _ = world;
}
