use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use host_monitoring::{
    actors::{HostMonitor, MonitorHandle},
    alerts::AlertEmitter,
    config::{Config, MqttConfig, read_config_file},
    hub::BroadcastHub,
    monitors::probe::Prober,
    mqtt::{AlertIngestor, MqttPublisher},
    storage::{self, Storage},
    util,
};
use tracing::{debug, info, instrument, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults apply when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let level = util::get_log_level();
    let filter = filter::Targets::new().with_targets(vec![
        ("host_monitoring", level),
        ("host_monitor", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    config.validate()?;

    let storage = storage::open(&config.storage())
        .await
        .context("failed to open storage")?;

    seed_hosts(&config, &storage).await?;

    let hub = Arc::new(BroadcastHub::new());

    let publish_topic = config
        .mqtt
        .as_ref()
        .map(|mqtt| mqtt.publish_topic.clone())
        .unwrap_or_else(|| MqttConfig::default().publish_topic);
    let publisher = Arc::new(MqttPublisher::new(publish_topic));

    let ingestor = match &config.mqtt {
        Some(mqtt) => {
            publisher.connect(mqtt).await;
            let ingestor = Arc::new(AlertIngestor::new(
                storage.inventory.clone(),
                storage.alerts.clone(),
            ));
            Some(ingestor.spawn(mqtt))
        }
        None => {
            warn!("no mqtt section configured, bus delivery disabled");
            None
        }
    };

    let emitter = AlertEmitter::new(storage.alerts.clone(), hub.clone(), publisher.clone());
    let prober = Prober::standard(config.monitor.tcp_ports.clone());
    debug!("probe tactics: {:?}", prober.tactic_names());

    let monitor = HostMonitor::new(
        &config.monitor,
        storage.inventory.clone(),
        prober,
        emitter,
    );
    let handle = MonitorHandle::spawn(monitor, config.monitor.interval_duration());

    #[cfg(feature = "api")]
    {
        use host_monitoring::api::{ApiState, spawn_api_server};

        let state = ApiState::new(hub.clone(), storage.clone());
        spawn_api_server(&config.api, state).await?;
    }

    info!(
        "monitoring started (interval {}s, threshold {})",
        config.monitor.interval, config.monitor.failure_threshold
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");

    if let Err(e) = handle.shutdown().await {
        warn!("monitor already stopped: {e:#}");
    }
    publisher.disconnect().await;
    if let Some(ingestor) = ingestor {
        ingestor.shutdown().await;
    }
    storage.alerts.close().await?;

    Ok(())
}

/// Register configured hosts whose address is not yet in the inventory
#[instrument(skip_all)]
async fn seed_hosts(config: &Config, storage: &Storage) -> anyhow::Result<()> {
    let Some(seeds) = &config.hosts else {
        return Ok(());
    };

    let mut existing: HashSet<String> = storage
        .inventory
        .list_hosts()
        .await?
        .into_iter()
        .map(|host| host.address)
        .collect();

    for seed in seeds {
        if existing.contains(&seed.address) {
            trace!("{} ({}) already registered", seed.name, seed.address);
            continue;
        }

        let host = storage
            .inventory
            .register_host(&seed.name, &seed.address)
            .await
            .with_context(|| format!("failed to register {}", seed.address))?;
        info!("registered host {} ({}) as {}", host.name, host.address, host.id);
        existing.insert(host.address);
    }

    Ok(())
}
