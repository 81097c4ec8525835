//! Expected-sequence state machine.
//!
//! A [`SequenceWaiter`] starts `Pending` on an ordered list of event types and
//! consumes correlated envelopes in log order:
//!
//! - correlated, type equals the next expected type: recorded in `observed`,
//!   the head is popped, and an empty list means `Matched`;
//! - correlated, type already consumed earlier in the run: a redelivery,
//!   discarded;
//! - correlated, any other type: kept in `skipped` for diagnostics, no
//!   progress;
//! - not correlated: discarded.
//!
//! `run` drives the machine from a reader under a cumulative deadline. The
//! deadline is checked between polls and each poll waits at most the time
//! left, so a run never outlives its deadline by more than one poll.
//! `Matched` and `TimedOut` are terminal.

use std::time::Duration;

use esv_events::EventEnvelope;
use esv_log::LogReader;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::{pull, Pulled};
use crate::{CorrelationKey, WaitStats};

/// Timing for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Longest single poll. Keeps the loop responsive to the deadline.
    pub poll_timeout: Duration,

    /// Overall budget for the whole sequence.
    pub deadline: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            deadline: Duration::from_secs(60),
        }
    }
}

/// Waiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Pending,
    Matched,
    TimedOut,
}

impl WaiterState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WaiterState::Pending)
    }
}

/// What offering one envelope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Consumed the head of the expected sequence.
    Advanced,
    /// Consumed the last expected type.
    Completed,
    /// Correlated redelivery of an already consumed type.
    Duplicate,
    /// Correlated but not the next expected type.
    Skipped,
    /// Belongs to another transaction.
    Uncorrelated,
    /// The waiter had already finished.
    Terminal,
}

/// Terminal outcome of a wait.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationResult {
    Matched {
        observed: Vec<EventEnvelope>,
    },
    TimedOut {
        observed: Vec<EventEnvelope>,
        remaining: Vec<String>,
    },
}

impl VerificationResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, VerificationResult::Matched { .. })
    }

    /// Events that advanced the sequence, in log order.
    pub fn observed(&self) -> &[EventEnvelope] {
        match self {
            VerificationResult::Matched { observed } => observed,
            VerificationResult::TimedOut { observed, .. } => observed,
        }
    }

    /// Expected types never seen. Empty when matched.
    pub fn remaining(&self) -> &[String] {
        match self {
            VerificationResult::Matched { .. } => &[],
            VerificationResult::TimedOut { remaining, .. } => remaining,
        }
    }

    pub fn into_observed(self) -> Vec<EventEnvelope> {
        match self {
            VerificationResult::Matched { observed } => observed,
            VerificationResult::TimedOut { observed, .. } => observed,
        }
    }
}

/// Waits for an ordered list of event types on one transaction.
#[derive(Debug, Clone)]
pub struct SequenceWaiter {
    key: CorrelationKey,
    expected: Vec<String>,
    next: usize,
    observed: Vec<EventEnvelope>,
    skipped: Vec<EventEnvelope>,
    state: WaiterState,
    stats: WaitStats,
}

impl SequenceWaiter {
    pub fn new<I, S>(key: CorrelationKey, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        let state = if expected.is_empty() {
            WaiterState::Matched
        } else {
            WaiterState::Pending
        };

        Self {
            key,
            expected,
            next: 0,
            observed: Vec::new(),
            skipped: Vec::new(),
            state,
            stats: WaitStats::default(),
        }
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    pub fn state(&self) -> WaiterState {
        self.state
    }

    /// Expected types not yet observed, head first.
    pub fn remaining(&self) -> &[String] {
        &self.expected[self.next..]
    }

    pub fn observed(&self) -> &[EventEnvelope] {
        &self.observed
    }

    /// Correlated events that arrived out of turn.
    pub fn skipped(&self) -> &[EventEnvelope] {
        &self.skipped
    }

    pub fn stats(&self) -> &WaitStats {
        &self.stats
    }

    /// Applies one decoded envelope.
    pub fn offer(&mut self, envelope: EventEnvelope) -> Transition {
        if self.state.is_terminal() {
            return Transition::Terminal;
        }

        if !self.key.matches(&envelope) {
            self.stats.uncorrelated += 1;
            return Transition::Uncorrelated;
        }

        if envelope.event_type == self.expected[self.next] {
            debug!(
                event_type = %envelope.event_type,
                step = self.next + 1,
                of = self.expected.len(),
                "Observed expected event"
            );
            self.observed.push(envelope);
            self.next += 1;
            if self.next == self.expected.len() {
                self.state = WaiterState::Matched;
                return Transition::Completed;
            }
            return Transition::Advanced;
        }

        if self.expected[..self.next].contains(&envelope.event_type) {
            debug!(event_type = %envelope.event_type, "Discarding redelivered event");
            return Transition::Duplicate;
        }

        debug!(
            event_type = %envelope.event_type,
            waiting_for = %self.expected[self.next],
            "Correlated event out of turn"
        );
        self.skipped.push(envelope);
        Transition::Skipped
    }

    /// Moves a pending waiter to `TimedOut`.
    pub fn expire(&mut self) {
        if self.state == WaiterState::Pending {
            self.state = WaiterState::TimedOut;
        }
    }

    /// The terminal result, once there is one.
    pub fn result(&self) -> Option<VerificationResult> {
        match self.state {
            WaiterState::Pending => None,
            WaiterState::Matched => Some(VerificationResult::Matched {
                observed: self.observed.clone(),
            }),
            WaiterState::TimedOut => Some(VerificationResult::TimedOut {
                observed: self.observed.clone(),
                remaining: self.remaining().to_vec(),
            }),
        }
    }

    /// Polls `reader` until the sequence is matched or the deadline passes.
    #[instrument(skip_all, fields(key = %self.key, expected = ?self.expected))]
    pub async fn run<R>(&mut self, reader: &mut R, options: &WaitOptions) -> VerificationResult
    where
        R: LogReader + ?Sized,
    {
        let deadline = Instant::now() + options.deadline;

        loop {
            if let Some(result) = self.result() {
                match &result {
                    VerificationResult::Matched { observed } => info!(
                        observed = observed.len(),
                        polls = self.stats.polls,
                        "Expected event sequence observed"
                    ),
                    VerificationResult::TimedOut {
                        observed,
                        remaining,
                    } => warn!(
                        observed = observed.len(),
                        remaining = ?remaining,
                        skipped = self.skipped.len(),
                        "Timed out waiting for event sequence"
                    ),
                }
                return result;
            }

            let now = Instant::now();
            if now >= deadline {
                self.expire();
                continue;
            }

            let wait = options.poll_timeout.min(deadline - now);
            if let Pulled::Event(envelope) = pull(reader, wait, &mut self.stats).await {
                self.offer(envelope);
            }
        }
    }
}
