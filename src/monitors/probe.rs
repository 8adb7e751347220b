//! Reachability probing
//!
//! A [`Prober`] walks an ordered list of [`ProbeTactic`]s and stops at the first
//! one that confirms the address is alive. The standard list is:
//!
//! 1. [`LoopbackCheck`] - loopback addresses are alive if a local socket can be bound
//! 2. [`IcmpEcho`] - a single echo request through the system `ping` utility
//! 3. [`TcpConnect`] - connect attempts to well-known ports (80, then 443)
//!
//! Tactics never return errors: an unavailable tactic (no `ping` binary,
//! missing privileges) is simply a negative answer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{instrument, trace};

/// A single way of checking whether an address is alive
#[async_trait]
pub trait ProbeTactic: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Returns `true` only when this tactic positively confirms liveness.
    async fn attempt(&self, address: &str, timeout: Duration) -> bool;
}

/// Ordered list of tactics evaluated until one succeeds
#[derive(Clone)]
pub struct Prober {
    tactics: Vec<Arc<dyn ProbeTactic>>,
}

impl Prober {
    pub fn new(tactics: Vec<Arc<dyn ProbeTactic>>) -> Self {
        Self { tactics }
    }

    /// Loopback check, ICMP echo, then TCP connect on `tcp_ports`
    pub fn standard(tcp_ports: Vec<u16>) -> Self {
        Self::new(vec![
            Arc::new(LoopbackCheck),
            Arc::new(IcmpEcho),
            Arc::new(TcpConnect::new(tcp_ports)),
        ])
    }

    pub fn tactic_names(&self) -> Vec<&'static str> {
        self.tactics.iter().map(|tactic| tactic.name()).collect()
    }

    /// Probe `address`, giving each tactic at most `timeout`
    #[instrument(skip(self, timeout))]
    pub async fn probe(&self, address: &str, timeout: Duration) -> bool {
        for tactic in &self.tactics {
            if tactic.attempt(address, timeout).await {
                trace!("{address} alive via {}", tactic.name());
                return true;
            }
            trace!("{address}: {} gave no answer", tactic.name());
        }

        false
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("tactics", &self.tactic_names())
            .finish()
    }
}

/// Resolve `address` to a loopback IP if it names the local machine
pub fn loopback_ip(address: &str) -> Option<IpAddr> {
    if address.eq_ignore_ascii_case("localhost") {
        return Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    address
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()
        .filter(IpAddr::is_loopback)
}

/// Treats loopback addresses as alive when a socket can be bound on them
///
/// Does not depend on any port being open locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackCheck;

#[async_trait]
impl ProbeTactic for LoopbackCheck {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn attempt(&self, address: &str, _timeout: Duration) -> bool {
        let Some(ip) = loopback_ip(address) else {
            return false;
        };

        UdpSocket::bind(SocketAddr::new(ip, 0)).await.is_ok()
    }
}

/// One ICMP echo request through the system `ping` utility
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpEcho;

impl IcmpEcho {
    fn command(address: &str, timeout: Duration) -> Command {
        let mut command = Command::new("ping");

        #[cfg(target_os = "windows")]
        command.args(["-n", "1", "-w", &timeout.as_millis().max(1).to_string()]);

        #[cfg(target_os = "macos")]
        command.args(["-c", "1", "-W", &timeout.as_millis().max(1).to_string()]);

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        command.args(["-c", "1", "-W", &timeout.as_secs().max(1).to_string()]);

        command
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        command
    }
}

#[async_trait]
impl ProbeTactic for IcmpEcho {
    fn name(&self) -> &'static str {
        "icmp"
    }

    async fn attempt(&self, address: &str, limit: Duration) -> bool {
        let mut command = Self::command(address, limit);

        // The utility rounds its own wait up to whole seconds on some
        // platforms; `kill_on_drop` stops it at `limit` regardless.
        match timeout(limit, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                trace!("icmp echo unavailable: {e}");
                false
            }
            Err(_) => false,
        }
    }
}

/// Connect attempts to a list of TCP ports, in order
#[derive(Debug, Clone)]
pub struct TcpConnect {
    ports: Vec<u16>,
}

impl TcpConnect {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }

    /// Share of `limit` given to each of `ports` connect attempts
    pub fn port_budget(limit: Duration, ports: usize) -> Duration {
        limit / u32::try_from(ports.max(1)).unwrap_or(u32::MAX)
    }

    /// Run `connect` on each port in order, each bounded by an equal share of
    /// `limit`, and return the first port that answered
    pub async fn first_reachable<F, Fut, T>(
        ports: &[u16],
        limit: Duration,
        mut connect: F,
    ) -> Option<u16>
    where
        F: FnMut(u16) -> Fut,
        Fut: Future<Output = std::io::Result<T>>,
    {
        let budget = Self::port_budget(limit, ports.len());

        for &port in ports {
            match timeout(budget, connect(port)).await {
                Ok(Ok(_)) => return Some(port),
                Ok(Err(e)) => trace!("connect to port {port} failed: {e}"),
                Err(_) => trace!("connect to port {port} timed out after {budget:?}"),
            }
        }

        None
    }
}

#[async_trait]
impl ProbeTactic for TcpConnect {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn attempt(&self, address: &str, limit: Duration) -> bool {
        let host = address.trim_start_matches('[').trim_end_matches(']');

        Self::first_reachable(&self.ports, limit, |port| TcpStream::connect((host, port)))
            .await
            .inspect(|port| trace!("{host}:{port} accepted a connection"))
            .is_some()
    }
}
