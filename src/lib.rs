use std::path::PathBuf;

use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct RoombookConfig {
    pub server: Server,
    pub storage: Storage,
    pub booking: Booking,
    pub logger: Logger,
}

impl RoombookConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("roombook")
    }

    /// 設定ファイル(任意)と`ROOMBOOK__`環境変数から設定を読み込む
    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080_i64)?
            .set_default("storage.path", "reservations.jsonl")?
            .set_default("booking.open_hour", 8_i64)?
            .set_default("booking.close_hour", 23_i64)?
            .set_default("booking.rooms", vec!["A101", "A102", "B201"])?
            .set_default("logger.level", "INFO")?
            .add_source(config::File::with_name(name).required(false))
            .add_source(
                config::Environment::with_prefix("ROOMBOOK")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("booking.rooms")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<RoombookConfig>()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub tls: Option<Tls>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tls {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Booking {
    pub open_hour: u32,
    pub close_hour: u32,
    pub rooms: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let config = RoombookConfig::load_from("does-not-exist").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.tls.is_none());
        assert_eq!(config.booking.open_hour, 8);
        assert_eq!(config.booking.close_hour, 23);
        assert_eq!(config.booking.rooms, vec!["A101", "A102", "B201"]);
        assert_eq!(tracing::Level::from(&config.logger.level), tracing::Level::INFO);
    }
}
