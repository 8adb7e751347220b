//! Reachability probing and the per-host status state machine

pub mod probe;
pub mod status;
