//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Reports**: Plain data returned over oneshot channels

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{HostStatus, Severity};

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a polling cycle immediately (bypassing the interval timer)
    ///
    /// Used for testing and manual refresh operations.
    PollNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<anyhow::Result<CycleReport>>,
    },

    /// Update the polling interval
    ///
    /// The new interval takes effect after the current cycle completes.
    UpdateInterval {
        /// New interval in seconds
        interval_secs: u64,
    },

    /// Query the consecutive-failure counter of a host
    GetFailureCount {
        host_id: i64,
        respond_to: oneshot::Sender<u32>,
    },

    /// Gracefully shut down the monitor
    ///
    /// The actor finishes any in-flight cycle and then exits.
    Shutdown,
}

/// A status change applied during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub host_id: i64,
    pub from: HostStatus,
    pub to: HostStatus,
    pub severity: Severity,
    pub message: &'static str,
}

/// Summary of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Hosts probed this cycle
    pub probed: usize,

    /// Hosts that answered
    pub alive: usize,

    /// Transitions committed, in inventory order
    pub transitions: Vec<StatusTransition>,

    /// Status writes that failed (host deleted concurrently, store errors)
    pub store_errors: usize,
}
