//! Hysteresis state machine turning probe observations into status transitions
//!
//! ```text
//! current  | alive                          | not alive
//! ---------+--------------------------------+------------------------------------------
//! unknown  | → UP, counter = 0, INFO        | → DOWN, counter + 1, CRITICAL
//! UP       | stays UP, counter = 0          | counter + 1; at threshold → DOWN, CRITICAL
//! DOWN     | → UP, counter = 0, INFO        | stays DOWN, counter + 1
//! ```
//!
//! An unknown host has no prior signal to debounce against, so it flips on the
//! first observation. Recovery from DOWN is immediate.

use std::collections::{HashMap, HashSet};

use crate::{HostStatus, Severity};

pub const HOST_UP_MESSAGE: &str = "Host is UP";
pub const HOST_RECOVERED_MESSAGE: &str = "Host recovered (UP)";
pub const HOST_DOWN_MESSAGE: &str = "Host is DOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvaluation {
    /// unknown → UP
    FirstSeenUp,
    /// unknown → DOWN
    FirstSeenDown,
    /// UP and answering
    StaysUp,
    /// UP, failing, but below the threshold
    Failing,
    /// UP → DOWN once the threshold is reached
    GoesDown,
    /// Already DOWN and still failing
    StaysDown,
    /// DOWN → UP
    Recovered,
}

impl StatusEvaluation {
    /// Evaluate one observation given the current status and the failure
    /// count accumulated *before* this observation.
    pub fn evaluate(
        current: HostStatus,
        alive: bool,
        failures: u32,
        threshold: u32,
    ) -> StatusEvaluation {
        match (current, alive) {
            (HostStatus::Unknown, true) => StatusEvaluation::FirstSeenUp,
            (HostStatus::Unknown, false) => StatusEvaluation::FirstSeenDown,
            (HostStatus::Up, true) => StatusEvaluation::StaysUp,
            (HostStatus::Up, false) => {
                if failures.saturating_add(1) >= threshold {
                    StatusEvaluation::GoesDown
                } else {
                    StatusEvaluation::Failing
                }
            }
            (HostStatus::Down, true) => StatusEvaluation::Recovered,
            (HostStatus::Down, false) => StatusEvaluation::StaysDown,
        }
    }

    pub fn next_status(&self) -> HostStatus {
        match self {
            StatusEvaluation::FirstSeenUp
            | StatusEvaluation::StaysUp
            | StatusEvaluation::Failing
            | StatusEvaluation::Recovered => HostStatus::Up,
            StatusEvaluation::FirstSeenDown
            | StatusEvaluation::GoesDown
            | StatusEvaluation::StaysDown => HostStatus::Down,
        }
    }

    /// Failure count after applying this evaluation
    pub fn next_failures(&self, failures: u32) -> u32 {
        match self {
            StatusEvaluation::FirstSeenUp
            | StatusEvaluation::StaysUp
            | StatusEvaluation::Recovered => 0,
            StatusEvaluation::FirstSeenDown
            | StatusEvaluation::Failing
            | StatusEvaluation::GoesDown
            | StatusEvaluation::StaysDown => failures.saturating_add(1),
        }
    }

    /// The alert this evaluation emits, if any
    pub fn alert(&self) -> Option<(Severity, &'static str)> {
        match self {
            StatusEvaluation::FirstSeenUp => Some((Severity::Info, HOST_UP_MESSAGE)),
            StatusEvaluation::Recovered => Some((Severity::Info, HOST_RECOVERED_MESSAGE)),
            StatusEvaluation::FirstSeenDown | StatusEvaluation::GoesDown => {
                Some((Severity::Critical, HOST_DOWN_MESSAGE))
            }
            StatusEvaluation::StaysUp | StatusEvaluation::Failing | StatusEvaluation::StaysDown => {
                None
            }
        }
    }

    pub fn is_transition(&self) -> bool {
        self.alert().is_some()
    }

    /// Whether the probe answered; a successful probe refreshes `last_seen`
    pub fn observed_alive(&self) -> bool {
        matches!(
            self,
            StatusEvaluation::FirstSeenUp | StatusEvaluation::StaysUp | StatusEvaluation::Recovered
        )
    }
}

/// Consecutive-failure counters, keyed by host id
///
/// Lives only as long as the monitor that owns it; a restart starts every host
/// from zero.
#[derive(Debug, Default)]
pub struct FailureCounters {
    counts: HashMap<i64, u32>,
}

impl FailureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host_id: i64) -> u32 {
        self.counts.get(&host_id).copied().unwrap_or_default()
    }

    /// Apply one observation for a host and return the evaluation
    pub fn observe(
        &mut self,
        host_id: i64,
        current: HostStatus,
        alive: bool,
        threshold: u32,
    ) -> StatusEvaluation {
        let failures = self.get(host_id);
        let evaluation = StatusEvaluation::evaluate(current, alive, failures, threshold);
        self.counts.insert(host_id, evaluation.next_failures(failures));
        evaluation
    }

    /// Drop counters for hosts that are no longer in the inventory
    pub fn retain_hosts(&mut self, known: &HashSet<i64>) {
        self.counts.retain(|id, _| known.contains(id));
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
