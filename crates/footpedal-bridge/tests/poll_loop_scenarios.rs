//! Poll loop scenarios against in-memory device and keyboard doubles.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use footpedal_bridge::ports::mock::{MockKeySink, MockRead, MockReportSource};
use footpedal_bridge::{BridgeError, LoopState, PollLoop, PollStep, RunSummary, ShutdownSignal};
use footpedal_protocol::{
    EdgeEvent, KEY_LEFTALT, KEY_LEFTCTRL, KEY_LEFTSHIFT, KeyBindingMap, Pedal, PedalState,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const READ_TIMEOUT: Duration = Duration::from_millis(5);

struct Harness {
    poll_loop: PollLoop<MockReportSource, MockKeySink>,
    shutdown: ShutdownSignal,
    emitted: Arc<Mutex<Vec<EdgeEvent>>>,
    reads: Arc<Mutex<usize>>,
    releases: Arc<Mutex<usize>>,
}

impl Harness {
    fn new(steps: Vec<MockRead>) -> Self {
        Self::build(steps, MockKeySink::new(), false)
    }

    fn build(steps: Vec<MockRead>, sink: MockKeySink, failing_release: bool) -> Self {
        let shutdown = ShutdownSignal::new();
        let mut source = MockReportSource::with_script(shutdown.clone(), steps);
        if failing_release {
            source = source.failing_release();
        }
        let emitted = sink.history();
        let reads = source.read_counter();
        let releases = source.release_counter();
        let poll_loop = PollLoop::new(
            source,
            sink,
            KeyBindingMap::default(),
            READ_TIMEOUT,
            shutdown.clone(),
        );
        Self {
            poll_loop,
            shutdown,
            emitted,
            reads,
            releases,
        }
    }

    fn emitted(&self) -> Vec<(Pedal, u16, bool)> {
        self.emitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|edge| (edge.pedal, edge.key, edge.pressed))
            .collect()
    }

    fn reads(&self) -> usize {
        *self.reads.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn releases(&self) -> usize {
        *self.releases.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ═══ Scenario: Read Timeout ═════════════════════════════════════════════════

/// GIVEN a device that produces no data
/// WHEN one iteration runs
/// THEN nothing is decoded or emitted and the loop can go again
#[test]
fn given_read_timeout_when_polled_then_no_decode_and_no_emit() -> TestResult {
    let mut h = Harness::new(vec![MockRead::Timeout, MockRead::Timeout]);

    assert_eq!(h.poll_loop.poll_once()?, PollStep::Idle);
    assert_eq!(h.poll_loop.poll_once()?, PollStep::Idle);

    assert_eq!(h.poll_loop.summary().reports, 0);
    assert_eq!(h.poll_loop.summary().timeouts, 2);
    assert!(h.emitted().is_empty());
    assert_eq!(h.poll_loop.previous(), PedalState::RELEASED);
    assert!(!h.shutdown.is_requested());
    Ok(())
}

// ═══ Scenario: Shutdown During a Blocking Read ══════════════════════════════

/// GIVEN the loop is blocked in a read
/// WHEN shutdown is requested before the read returns
/// THEN the loop stops after that read and releases the device exactly once
#[test]
fn given_shutdown_during_read_when_read_returns_then_released_once() -> TestResult {
    let mut h = Harness::new(vec![
        MockRead::Report(vec![0b000]),
        MockRead::ShutdownDuringRead,
        MockRead::Report(vec![0b001]),
    ]);

    let summary = h.poll_loop.run()?;

    assert_eq!(h.reads(), 2, "no read after the shutdown was observed");
    assert_eq!(h.releases(), 1);
    assert_eq!(h.poll_loop.state(), LoopState::Stopped);
    assert_eq!(summary.reports, 1);
    assert!(h.emitted().is_empty());
    Ok(())
}

/// GIVEN shutdown was requested before the loop started
/// WHEN the loop runs
/// THEN it never reads and still releases once
#[test]
fn given_shutdown_before_start_when_run_then_no_reads() -> TestResult {
    let mut h = Harness::new(vec![MockRead::Report(vec![0b001])]);
    h.shutdown.request();

    let summary = h.poll_loop.run()?;

    assert_eq!(h.reads(), 0);
    assert_eq!(h.releases(), 1);
    assert_eq!(summary, RunSummary::default());
    Ok(())
}

// ═══ Scenario: Edge Forwarding ══════════════════════════════════════════════

/// GIVEN a press, a chord change and a full release
/// WHEN the loop runs to completion
/// THEN the keyboard sees every edge in ascending pedal order
#[test]
fn given_report_sequence_when_run_then_edges_forwarded_in_order() -> TestResult {
    let mut h = Harness::new(vec![
        MockRead::Report(vec![0b010]),
        MockRead::Report(vec![0b101]),
        MockRead::Timeout,
        MockRead::Report(vec![0b000]),
    ]);

    let summary = h.poll_loop.run()?;

    assert_eq!(
        h.emitted(),
        vec![
            (Pedal::MIDDLE, KEY_LEFTCTRL, true),
            (Pedal::LEFT, KEY_LEFTALT, true),
            (Pedal::MIDDLE, KEY_LEFTCTRL, false),
            (Pedal::RIGHT, KEY_LEFTSHIFT, true),
            (Pedal::LEFT, KEY_LEFTALT, false),
            (Pedal::RIGHT, KEY_LEFTSHIFT, false),
        ]
    );
    assert_eq!(summary.reports, 3);
    assert_eq!(summary.edges, 6);
    assert_eq!(summary.timeouts, 2);
    assert_eq!(summary.released_on_stop, 0);
    Ok(())
}

/// GIVEN a report whose extra bytes and unbound bits change
/// WHEN it is decoded
/// THEN only bound pedals produce edges
#[test]
fn given_unbound_bits_when_run_then_ignored() -> TestResult {
    let mut h = Harness::new(vec![
        MockRead::Report(vec![0b1111_1000, 0xff]),
        MockRead::Report(vec![0b0000_1001, 0x00, 0x07]),
    ]);

    h.poll_loop.run()?;

    assert_eq!(
        h.emitted(),
        vec![
            (Pedal::LEFT, KEY_LEFTALT, true),
            (Pedal::LEFT, KEY_LEFTALT, false),
        ]
    );
    Ok(())
}

// ═══ Scenario: Recoverable Failures ═════════════════════════════════════════

/// GIVEN a transport error and an empty report between good reports
/// WHEN the loop runs
/// THEN both are counted and skipped and later edges still arrive
#[test]
fn given_transport_error_when_run_then_loop_continues() -> TestResult {
    let mut h = Harness::new(vec![
        MockRead::TransportError(rusb::Error::Pipe),
        MockRead::Report(Vec::new()),
        MockRead::Report(vec![0b100]),
        MockRead::Report(vec![0b000]),
    ]);

    let summary = h.poll_loop.run()?;

    assert_eq!(summary.transport_errors, 1);
    assert_eq!(summary.invalid_reports, 1);
    assert_eq!(summary.edges, 2);
    assert_eq!(h.releases(), 1);
    Ok(())
}

/// GIVEN a transport error does not change the previous state
/// WHEN the same state is reported again afterwards
/// THEN no duplicate edge is emitted
#[test]
fn given_error_between_equal_reports_when_run_then_no_duplicate_edge() -> TestResult {
    let mut h = Harness::new(vec![
        MockRead::Report(vec![0b001]),
        MockRead::TransportError(rusb::Error::Io),
        MockRead::Report(vec![0b001]),
        MockRead::Report(vec![0b000]),
    ]);

    h.poll_loop.run()?;

    assert_eq!(
        h.emitted(),
        vec![
            (Pedal::LEFT, KEY_LEFTALT, true),
            (Pedal::LEFT, KEY_LEFTALT, false),
        ]
    );
    Ok(())
}

// ═══ Scenario: Fatal Emit Failure ═══════════════════════════════════════════

/// GIVEN a keyboard that fails on its second write
/// WHEN a report with three edges arrives
/// THEN the loop stops with the emit error and releases exactly once
#[test]
fn given_emit_failure_when_run_then_fatal_and_released_once() {
    let mut h = Harness::build(
        vec![
            MockRead::Report(vec![0b111]),
            MockRead::Report(vec![0b000]),
        ],
        MockKeySink::failing_after(1),
        false,
    );

    let result = h.poll_loop.run();

    assert!(matches!(result, Err(BridgeError::Emit(_))));
    assert_eq!(h.reads(), 1);
    assert_eq!(h.releases(), 1);
    assert_eq!(h.poll_loop.state(), LoopState::Stopped);
    assert_eq!(h.emitted(), vec![(Pedal::LEFT, KEY_LEFTALT, true)]);
}

/// GIVEN an emit failure and a device whose release also fails
/// WHEN the loop stops
/// THEN the emit error is what the caller sees
#[test]
fn given_release_failure_when_stopping_then_emit_error_kept() {
    let mut h = Harness::build(
        vec![MockRead::Report(vec![0b001])],
        MockKeySink::failing_after(0),
        true,
    );

    let result = h.poll_loop.run();

    assert!(matches!(result, Err(BridgeError::Emit(_))));
    assert_eq!(h.releases(), 1);
}

/// GIVEN a clean shutdown and a device whose release fails
/// WHEN the loop stops
/// THEN the run still reports success
#[test]
fn given_release_failure_on_clean_shutdown_when_run_then_ok() -> TestResult {
    let mut h = Harness::build(Vec::new(), MockKeySink::new(), true);

    h.poll_loop.run()?;

    assert_eq!(h.releases(), 1);
    Ok(())
}

// ═══ Scenario: Held Pedals at Shutdown ══════════════════════════════════════

/// GIVEN left and right pedals are still down when shutdown arrives
/// WHEN the loop stops
/// THEN key-ups are sent for both before the device is released
#[test]
fn given_held_pedals_when_shutdown_then_keys_lifted() -> TestResult {
    let mut h = Harness::new(vec![MockRead::Report(vec![0b101])]);

    let summary = h.poll_loop.run()?;

    assert_eq!(
        h.emitted(),
        vec![
            (Pedal::LEFT, KEY_LEFTALT, true),
            (Pedal::RIGHT, KEY_LEFTSHIFT, true),
            (Pedal::LEFT, KEY_LEFTALT, false),
            (Pedal::RIGHT, KEY_LEFTSHIFT, false),
        ]
    );
    assert_eq!(summary.released_on_stop, 2);
    assert_eq!(h.poll_loop.previous(), PedalState::RELEASED);
    Ok(())
}

/// GIVEN a pedal already held when the first report arrives
/// WHEN it is decoded against the released start state
/// THEN it is forwarded as a fresh press
#[test]
fn given_pedal_held_at_startup_when_first_report_then_press_emitted() -> TestResult {
    let mut h = Harness::new(vec![MockRead::Report(vec![0b010])]);

    assert_eq!(h.poll_loop.poll_once()?, PollStep::Decoded { edges: 1 });
    assert_eq!(h.emitted(), vec![(Pedal::MIDDLE, KEY_LEFTCTRL, true)]);
    Ok(())
}
