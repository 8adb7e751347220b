//! Synthetic external sensor
//!
//! Publishes a [`SensorEvent`] on the inbound topic at a fixed period, the way
//! a third-party probe outside this process would.

use std::time::Duration;

use clap::Parser;
use host_monitoring::{config::MqttConfig, mqtt::SensorEvent, util};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Host id the events refer to
    #[arg(long)]
    host_id: i64,

    /// Reported status ("UP" or "DOWN")
    #[arg(long, default_value = "DOWN")]
    status: String,

    /// Free-text message
    #[arg(long, default_value = "sensor report")]
    message: String,

    /// Seconds between events
    #[arg(long, default_value_t = 10)]
    period: u64,

    /// Number of events to send (0 = forever)
    #[arg(long, default_value_t = 0)]
    count: u64,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("host_monitoring", util::get_log_level()),
        ("host_sensor", util::get_log_level()),
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

    let mut config = MqttConfig::default();
    if let Some(host) = util::get_mqtt_broker() {
        config.host = host;
    }
    if let Some(port) = util::get_mqtt_port() {
        config.port = port;
    }

    let mut options = MqttOptions::new(
        format!("{}-sensor-{}", config.client_id, args.host_id),
        config.host.as_str(),
        config.port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive));
    let (client, mut event_loop) = AsyncClient::new(options, 16);

    tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("connected to broker"),
                Ok(_) => {}
                Err(e) => {
                    warn!("broker error: {e}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let event = SensorEvent {
        host_id: args.host_id,
        status: Some(args.status.clone()),
        message: args.message.clone(),
    };
    let payload = serde_json::to_vec(&event)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.period.max(1)));
    let mut sent = 0;
    while args.count == 0 || sent < args.count {
        ticker.tick().await;
        match client
            .publish(
                config.subscribe_topic.as_str(),
                QoS::AtLeastOnce,
                false,
                payload.clone(),
            )
            .await
        {
            Ok(()) => {
                sent += 1;
                debug!("sent event {sent} on {}", config.subscribe_topic);
            }
            Err(e) => error!("failed to queue event: {e}"),
        }
    }

    // Give the event loop a moment to flush the last publish
    tokio::time::sleep(Duration::from_secs(1)).await;
    client.disconnect().await?;
    Ok(())
}
