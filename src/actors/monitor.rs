//! MonitorActor - Polls the host inventory for reachability
//!
//! One actor runs for the lifetime of the process. Each cycle:
//!
//! ```text
//! list hosts → probe all (concurrent, bounded) → state machine per host → commit status → emit alerts
//!     ↑
//!     └─── Timer tick / Commands (PollNow, UpdateInterval, GetFailureCount, Shutdown)
//! ```
//!
//! ## Failure handling
//!
//! - A probe exceeding its bound counts as a failed observation.
//! - A status write that fails (the host was deleted meanwhile, store errors)
//!   is logged and skipped; its alert is not emitted and the next cycle
//!   re-evaluates from the stored status.
//! - Failing to list hosts aborts only the current cycle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, timeout};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::AlertEmitter;
use crate::config::MonitorConfig;
use crate::monitors::probe::Prober;
use crate::monitors::status::FailureCounters;
use crate::storage::{HostInventory, StorageError};
use crate::Host;

use super::messages::{CycleReport, MonitorCommand, StatusTransition};

/// One polling cycle over the full inventory, plus the hysteresis state
pub struct HostMonitor {
    inventory: Arc<dyn HostInventory>,
    prober: Prober,
    emitter: AlertEmitter,
    counters: FailureCounters,
    failure_threshold: u32,
    max_concurrent_probes: usize,
    probe_timeout: Duration,
    attempt_timeout: Duration,
}

impl HostMonitor {
    pub fn new(
        config: &MonitorConfig,
        inventory: Arc<dyn HostInventory>,
        prober: Prober,
        emitter: AlertEmitter,
    ) -> Self {
        Self {
            inventory,
            prober,
            emitter,
            counters: FailureCounters::new(),
            failure_threshold: config.failure_threshold.max(1),
            max_concurrent_probes: config.max_concurrent_probes.max(1),
            probe_timeout: config.probe_timeout_duration(),
            attempt_timeout: config.attempt_timeout_duration(),
        }
    }

    /// Override the overall per-host bound (and the per-tactic budget with it)
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self.attempt_timeout = probe_timeout;
        self
    }

    pub fn failure_count(&self, host_id: i64) -> u32 {
        self.counters.get(host_id)
    }

    /// Probe every host once and apply the results
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let hosts = self
            .inventory
            .list_hosts()
            .await
            .context("failed to list hosts")?;

        trace!("probing {} hosts", hosts.len());

        let observations = self.probe_all(&hosts).await;

        let mut report = CycleReport::default();
        for (host, alive) in hosts.iter().zip(observations) {
            report.probed += 1;
            if alive {
                report.alive += 1;
            }
            self.apply(host, alive, &mut report).await;
        }

        let known: HashSet<i64> = hosts.iter().map(|host| host.id).collect();
        self.counters.retain_hosts(&known);

        debug!(
            "cycle complete: {}/{} alive, {} transition(s)",
            report.alive,
            report.probed,
            report.transitions.len()
        );

        Ok(report)
    }

    /// Probe hosts concurrently; results come back in inventory order
    async fn probe_all(&self, hosts: &[Host]) -> Vec<bool> {
        let probe_timeout = self.probe_timeout;
        let attempt_timeout = self.attempt_timeout;

        // Futures own their inputs; the cycle future must stay `Send`
        let probes: Vec<_> = hosts
            .iter()
            .map(|host| {
                let prober = self.prober.clone();
                let address = host.address.clone();
                async move {
                    match timeout(probe_timeout, prober.probe(&address, attempt_timeout)).await {
                        Ok(alive) => alive,
                        Err(_) => {
                            trace!("probe of {address} exceeded {probe_timeout:?}");
                            false
                        }
                    }
                }
            })
            .collect();

        stream::iter(probes)
            .buffered(self.max_concurrent_probes)
            .collect()
            .await
    }

    /// Feed one observation through the state machine and commit the result
    async fn apply(&mut self, host: &Host, alive: bool, report: &mut CycleReport) {
        let evaluation = self
            .counters
            .observe(host.id, host.status, alive, self.failure_threshold);
        let next_status = evaluation.next_status();

        trace!(
            "{} ({}): {} alive={alive} failures={} → {evaluation:?}",
            host.name,
            host.address,
            host.status,
            self.counters.get(host.id)
        );

        let last_seen = evaluation.observed_alive().then(Utc::now);

        // Failing-but-unchanged observations have nothing to persist
        if last_seen.is_none() && !evaluation.is_transition() {
            return;
        }

        if let Err(e) = self
            .inventory
            .update_host_status(host.id, next_status, last_seen)
            .await
        {
            report.store_errors += 1;
            match e {
                StorageError::HostNotFound(id) => {
                    debug!("host {id} disappeared during the cycle, skipping")
                }
                other => error!("failed to update status of {}: {other}", host.name),
            }
            return;
        }

        let Some((severity, message)) = evaluation.alert() else {
            return;
        };

        info!(
            "{} ({}): {} → {next_status}",
            host.name, host.address, host.status
        );

        let updated = Host {
            status: next_status,
            last_seen: last_seen.or(host.last_seen),
            ..host.clone()
        };
        self.emitter.emit(&updated, severity, message).await;

        report.transitions.push(StatusTransition {
            host_id: host.id,
            from: host.status,
            to: next_status,
            severity,
            message,
        });
    }
}

/// Actor driving a [`HostMonitor`] on a fixed interval
pub struct MonitorActor {
    monitor: HostMonitor,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<MonitorCommand>,

    /// Current polling interval
    interval_duration: Duration,
}

impl MonitorActor {
    pub fn new(
        monitor: HostMonitor,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<MonitorCommand>,
    ) -> Self {
        Self {
            monitor,
            command_rx,
            interval_duration,
        }
    }

    /// Ticker whose first tick fires immediately
    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Ticker whose first tick fires one full period from now
    fn deferred_ticker(period: Duration) -> tokio::time::Interval {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting monitor actor (interval {:?})",
            self.interval_duration
        );

        let mut ticker = Self::ticker(self.interval_duration);

        loop {
            tokio::select! {
                // Timer tick - run a cycle
                _ = ticker.tick() => {
                    if let Err(e) = self.monitor.run_cycle().await {
                        error!("polling cycle failed: {:#}", e);
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.monitor.run_cycle().await;
                            let _ = respond_to.send(result);
                        }

                        MonitorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = Self::deferred_ticker(self.interval_duration);
                        }

                        MonitorCommand::GetFailureCount { host_id, respond_to } => {
                            let _ = respond_to.send(self.monitor.failure_count(host_id));
                        }

                        MonitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("monitor actor stopped");
    }
}

/// Handle for controlling the MonitorActor
///
/// It can be cloned and shared across tasks.
#[derive(Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    /// Spawn the monitor actor as a tokio task
    pub fn spawn(monitor: HostMonitor, interval_duration: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = MonitorActor::new(monitor, interval_duration, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a cycle immediately and return its report
    pub async fn poll_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(MonitorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn failure_count(&self, host_id: i64) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::GetFailureCount {
                host_id,
                respond_to: tx,
            })
            .await
            .context("failed to send GetFailureCount command")?;

        rx.await.context("failed to receive response")
    }

    /// Gracefully shut down the monitor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MonitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
