pub mod actors;
pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod hub;
pub mod monitors;
pub mod mqtt;
pub mod storage;
pub mod util;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored network endpoint as held by the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    /// IP address or resolvable host name
    pub address: String,
    pub status: HostStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Debounced reachability status of a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    /// Never observed since the host was created
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Unknown => "unknown",
            HostStatus::Up => "UP",
            HostStatus::Down => "DOWN",
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostStatus {
    type Err = std::convert::Infallible;

    /// Anything that is not a recognised status is treated as never observed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "UP" => HostStatus::Up,
            "DOWN" => HostStatus::Down,
            _ => HostStatus::Unknown,
        })
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(anyhow::anyhow!("unknown severity '{other}'")),
        }
    }
}
