//! Seams between the poll loop and its two collaborators

use crate::{BridgeError, BridgeResult};
use footpedal_protocol::EdgeEvent;
use std::time::Duration;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Report(Vec<u8>),
    /// Nothing arrived within the timeout.
    Timeout,
}

/// Where pedal reports come from.
pub trait ReportSource {
    fn read_report(&mut self, timeout: Duration) -> BridgeResult<ReadOutcome>;

    /// Gives the hardware back. Calls after the first are no-ops.
    fn release(&mut self) -> BridgeResult<()>;
}

/// A report source that must take exclusive ownership of the hardware first.
pub trait ClaimableSource: ReportSource {
    /// Takes the device for this session. Calls after a success are no-ops.
    fn claim(&mut self) -> BridgeResult<()>;
}

/// Where decoded edges go.
pub trait KeySink {
    /// Writes one key event and its sync marker.
    fn emit(&mut self, edge: &EdgeEvent) -> BridgeResult<()>;
}

pub mod mock {
    use super::*;
    use crate::ShutdownSignal;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted step for [`MockReportSource`].
    #[derive(Debug, Clone)]
    pub enum MockRead {
        Report(Vec<u8>),
        Timeout,
        TransportError(rusb::Error),
        /// Requests shutdown while "blocked", then times out.
        ShutdownDuringRead,
    }

    /// Scripted report source. Requests shutdown once the script runs dry.
    pub struct MockReportSource {
        script: Arc<Mutex<VecDeque<MockRead>>>,
        reads: Arc<Mutex<usize>>,
        releases: Arc<Mutex<usize>>,
        claims: Arc<Mutex<usize>>,
        fail_release: bool,
        fail_claim: bool,
        shutdown: ShutdownSignal,
    }

    impl MockReportSource {
        pub fn new(shutdown: ShutdownSignal) -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                reads: Arc::new(Mutex::new(0)),
                releases: Arc::new(Mutex::new(0)),
                claims: Arc::new(Mutex::new(0)),
                fail_release: false,
                fail_claim: false,
                shutdown,
            }
        }

        pub fn with_script(shutdown: ShutdownSignal, steps: impl IntoIterator<Item = MockRead>) -> Self {
            let source = Self::new(shutdown);
            for step in steps {
                source.push(step);
            }
            source
        }

        pub fn push(&self, step: MockRead) {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.push_back(step);
        }

        pub fn failing_release(mut self) -> Self {
            self.fail_release = true;
            self
        }

        pub fn failing_claim(mut self) -> Self {
            self.fail_claim = true;
            self
        }

        pub fn claim_counter(&self) -> Arc<Mutex<usize>> {
            Arc::clone(&self.claims)
        }

        /// Shared counter of `release` calls, readable after the source moved.
        pub fn release_counter(&self) -> Arc<Mutex<usize>> {
            Arc::clone(&self.releases)
        }

        pub fn read_counter(&self) -> Arc<Mutex<usize>> {
            Arc::clone(&self.reads)
        }
    }

    impl ReportSource for MockReportSource {
        fn read_report(&mut self, _timeout: Duration) -> BridgeResult<ReadOutcome> {
            {
                let mut reads = self.reads.lock().unwrap_or_else(|e| e.into_inner());
                *reads = reads.saturating_add(1);
            }

            let step = self
                .script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            match step {
                Some(MockRead::Report(bytes)) => Ok(ReadOutcome::Report(bytes)),
                Some(MockRead::Timeout) => Ok(ReadOutcome::Timeout),
                Some(MockRead::TransportError(err)) => Err(BridgeError::Transport(err)),
                Some(MockRead::ShutdownDuringRead) | None => {
                    self.shutdown.request();
                    Ok(ReadOutcome::Timeout)
                }
            }
        }

        fn release(&mut self) -> BridgeResult<()> {
            let mut releases = self.releases.lock().unwrap_or_else(|e| e.into_inner());
            *releases = releases.saturating_add(1);
            if self.fail_release {
                return Err(BridgeError::Release(rusb::Error::NoDevice));
            }
            Ok(())
        }
    }

    impl ClaimableSource for MockReportSource {
        fn claim(&mut self) -> BridgeResult<()> {
            let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
            *claims = claims.saturating_add(1);
            if self.fail_claim {
                return Err(BridgeError::access("claim interface", rusb::Error::Busy));
            }
            Ok(())
        }
    }

    /// Records every emitted edge; optionally fails after a number of writes.
    pub struct MockKeySink {
        emitted: Arc<Mutex<Vec<EdgeEvent>>>,
        fail_after: Option<usize>,
    }

    impl MockKeySink {
        pub fn new() -> Self {
            Self {
                emitted: Arc::new(Mutex::new(Vec::new())),
                fail_after: None,
            }
        }

        pub fn failing_after(writes: usize) -> Self {
            Self {
                fail_after: Some(writes),
                ..Self::new()
            }
        }

        pub fn history(&self) -> Arc<Mutex<Vec<EdgeEvent>>> {
            Arc::clone(&self.emitted)
        }
    }

    impl Default for MockKeySink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl KeySink for MockKeySink {
        fn emit(&mut self, edge: &EdgeEvent) -> BridgeResult<()> {
            let mut emitted = self.emitted.lock().unwrap_or_else(|e| e.into_inner());
            if self.fail_after.is_some_and(|limit| emitted.len() >= limit) {
                return Err(BridgeError::Emit(std::io::Error::other(
                    "virtual device closed",
                )));
            }
            emitted.push(*edge);
            Ok(())
        }
    }
}
