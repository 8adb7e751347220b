use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

const MONITOR_DB_PATH: &str = "MONITOR_DB_PATH";

pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(MONITOR_DB_PATH).ok().map(PathBuf::from)
}

const MQTT_BROKER: &str = "MQTT_BROKER";

pub fn get_mqtt_broker() -> Option<String> {
    std::env::var(MQTT_BROKER).ok().filter(|host| !host.is_empty())
}

const MQTT_PORT: &str = "MQTT_PORT";

pub fn get_mqtt_port() -> Option<u16> {
    std::env::var(MQTT_PORT).ok().and_then(|res| res.parse().ok())
}

const MONITOR_API_ADDR: &str = "MONITOR_API_ADDR";

pub fn get_api_addr() -> Option<SocketAddr> {
    std::env::var(MONITOR_API_ADDR)
        .ok()
        .and_then(|res| res.parse().ok())
}

const MONITOR_LOG_LEVEL: &str = "MONITOR_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::DEBUG;

pub fn get_log_level() -> LevelFilter {
    let level_from_env = std::env::var(MONITOR_LOG_LEVEL);
    level_from_env.map_or(DEFAULT_LOG_LEVEL, |res| {
        res.parse().unwrap_or(DEFAULT_LOG_LEVEL)
    })
}
