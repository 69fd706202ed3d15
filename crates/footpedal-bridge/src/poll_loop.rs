//! The read → decode → emit loop
//!
//! [`PollLoop`] owns the report source, the key sink and the previous pedal
//! state. It runs on the calling thread until the [`ShutdownSignal`] is
//! raised or the sink fails; the only place it blocks is the bounded read,
//! so a stop request is honoured within one read timeout.

use crate::ports::{KeySink, ReadOutcome, ReportSource};
use crate::{BridgeResult, ShutdownSignal};
use footpedal_protocol::{KeyBindingMap, PedalState, decode, release_all};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Longest single sleep while backing off, so a stop request is not delayed.
const BACKOFF_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub reports: u64,
    pub edges: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub invalid_reports: u64,
    /// Key-ups sent on the way out for pedals still held.
    pub released_on_stop: u64,
}

/// What a single iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// The read timed out.
    Idle,
    /// A report was decoded and this many edges were emitted.
    Decoded { edges: usize },
    /// A transport error or malformed report was logged and skipped.
    Skipped,
}

pub struct PollLoop<S: ReportSource, K: KeySink> {
    source: S,
    sink: K,
    bindings: KeyBindingMap,
    read_timeout: Duration,
    error_backoff: Duration,
    previous: PedalState,
    state: LoopState,
    shutdown: ShutdownSignal,
    summary: RunSummary,
}

impl<S: ReportSource, K: KeySink> PollLoop<S, K> {
    pub fn new(
        source: S,
        sink: K,
        bindings: KeyBindingMap,
        read_timeout: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            sink,
            bindings,
            read_timeout,
            error_backoff: Duration::ZERO,
            previous: PedalState::RELEASED,
            state: LoopState::Starting,
            shutdown,
            summary: RunSummary::default(),
        }
    }

    /// Pause after a transport error before reading again.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn previous(&self) -> PedalState {
        self.previous
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// One read, and for a report, decode and emit.
    ///
    /// Only sink failures come back as `Err`; transport errors and malformed
    /// reports are logged and reported as [`PollStep::Skipped`].
    pub fn poll_once(&mut self) -> BridgeResult<PollStep> {
        let report = match self.source.read_report(self.read_timeout) {
            Ok(ReadOutcome::Report(report)) => report,
            Ok(ReadOutcome::Timeout) => {
                self.summary.timeouts = self.summary.timeouts.saturating_add(1);
                trace!("Read timed out");
                return Ok(PollStep::Idle);
            }
            Err(e) if e.is_transient() => {
                self.summary.transport_errors = self.summary.transport_errors.saturating_add(1);
                warn!(error = %e, "Read failed, continuing");
                self.back_off();
                return Ok(PollStep::Skipped);
            }
            Err(e) => return Err(e),
        };

        let current = match PedalState::from_report(&report) {
            Ok(state) => state,
            Err(e) => {
                self.summary.invalid_reports = self.summary.invalid_reports.saturating_add(1);
                warn!(error = %e, len = report.len(), "Ignoring malformed report");
                return Ok(PollStep::Skipped);
            }
        };
        self.summary.reports = self.summary.reports.saturating_add(1);

        let edges = decode(self.previous, current, &self.bindings);
        trace!(previous = ?self.previous, current = ?current, edges = edges.len(), "Decoded report");
        self.previous = current;

        for edge in &edges {
            self.sink.emit(edge)?;
            self.summary.edges = self.summary.edges.saturating_add(1);
            debug!(%edge, "Forwarded pedal edge");
        }
        Ok(PollStep::Decoded { edges: edges.len() })
    }

    /// Runs until shutdown is requested or emitting fails, then stops.
    ///
    /// The source is released exactly once on either path. A release failure
    /// is logged and does not replace the error that ended the loop.
    pub fn run(&mut self) -> BridgeResult<RunSummary> {
        if self.state == LoopState::Stopped {
            return Ok(self.summary.clone());
        }

        self.transition(LoopState::Running);
        let outcome = loop {
            if self.shutdown.is_requested() {
                info!("Shutdown requested");
                break Ok(());
            }
            if let Err(e) = self.poll_once() {
                error!(error = %e, "Fatal error in poll loop");
                break Err(e);
            }
        };

        self.stop();
        outcome.map(|()| self.summary.clone())
    }

    /// Lifts held keys and releases the source.
    fn stop(&mut self) {
        self.transition(LoopState::Stopping);

        for edge in release_all(self.previous, &self.bindings) {
            match self.sink.emit(&edge) {
                Ok(()) => {
                    self.summary.released_on_stop = self.summary.released_on_stop.saturating_add(1);
                }
                Err(e) => warn!(%edge, error = %e, "Failed to lift held key"),
            }
        }
        self.previous = PedalState::RELEASED;

        if let Err(e) = self.source.release() {
            warn!(error = %e, "Failed to release pedal device");
        }

        self.transition(LoopState::Stopped);
        info!(
            reports = self.summary.reports,
            edges = self.summary.edges,
            timeouts = self.summary.timeouts,
            transport_errors = self.summary.transport_errors,
            "Poll loop stopped"
        );
    }

    fn back_off(&self) {
        let started = Instant::now();
        while !self.shutdown.is_requested() {
            let remaining = self.error_backoff.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(BACKOFF_SLICE));
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = ?self.state, to = ?next, "Poll loop state change");
        self.state = next;
    }
}
