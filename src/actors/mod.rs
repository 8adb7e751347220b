//! Actor-based monitoring loop
//!
//! The monitor runs as an independent async task controlled over a Tokio
//! channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │  MonitorActor    │ ◄── MonitorHandle (PollNow, UpdateInterval, ...)
//!                 └────────┬─────────┘
//!                          │ per cycle
//!            ┌─────────────┼──────────────┐
//!            │             │              │
//!     ┌──────▼─────┐ ┌─────▼──────┐ ┌─────▼───────┐
//!     │   Prober   │ │  Counters  │ │  Inventory  │
//!     └────────────┘ └─────┬──────┘ └─────────────┘
//!                          │ transitions
//!                   ┌──────▼───────┐
//!                   │ AlertEmitter │ ──► store, hub, publisher
//!                   └──────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod monitor;

pub use messages::{CycleReport, MonitorCommand, StatusTransition};
pub use monitor::{HostMonitor, MonitorActor, MonitorHandle};
