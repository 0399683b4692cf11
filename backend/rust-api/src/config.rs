use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    pub tracker: TrackerSettings,
    pub ingestion: IngestionSettings,
    pub object_storage: Option<ObjectStorageSettings>,
}

/// Debounce gate tuning used by tracker clients built from this config
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub debounce_ms: u64,
    pub max_wait_ms: Option<u64>,
}

impl TrackerSettings {
    pub fn to_tracker_config(&self) -> crate::tracker::TrackerConfig {
        crate::tracker::TrackerConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            max_wait: self.max_wait_ms.map(Duration::from_millis),
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            max_wait_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub max_upload_bytes: usize,
    /// Imports allowed per shop within one window
    pub rate_limit: u32,
    pub rate_window_seconds: u64,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            rate_limit: 20,
            rate_window_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub uploads_prefix: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml, overridden by APP__SECTION__KEY variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| {
                eprintln!("WARNING: MONGO_URI not set, using local MongoDB");
                "mongodb://localhost:27017".to_string()
            });

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "shopops".to_string());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let tracker = settings
            .get::<TrackerSettings>("tracker")
            .unwrap_or_default();

        let ingestion = settings
            .get::<IngestionSettings>("ingestion")
            .unwrap_or_default();

        // Object storage is optional: uploads are simply not archived without it
        let object_storage = match settings.get::<ObjectStorageSettings>("object_storage") {
            Ok(storage) => Some(storage),
            Err(config::ConfigError::NotFound(_)) => None,
            Err(err) => {
                if env == "prod" {
                    return Err(err);
                }
                eprintln!("WARNING: ignoring invalid object_storage section: {}", err);
                None
            }
        };

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            bind_addr,
            tracker,
            ingestion,
            object_storage,
        })
    }

    /// Settings for tests and local tooling, no files or environment involved.
    pub fn local() -> Self {
        Config {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "shopops_test".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            tracker: TrackerSettings::default(),
            ingestion: IngestionSettings::default(),
            object_storage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn nested_sections_from_environment() {
        std::env::set_var("SKIP_ROOT_ENV", "1");
        std::env::set_var("APP__TRACKER__DEBOUNCE_MS", "250");
        std::env::set_var("APP__TRACKER__MAX_WAIT_MS", "5000");
        std::env::set_var("APP__DATABASE__MONGO_DATABASE", "shopops_ci");

        let config = Config::load().unwrap();
        let tracker = config.tracker.to_tracker_config();

        assert_eq!(tracker.debounce, Duration::from_millis(250));
        assert_eq!(tracker.max_wait, Some(Duration::from_secs(5)));
        assert_eq!(config.mongo_database, "shopops_ci");
        assert!(config.object_storage.is_none());

        std::env::remove_var("APP__TRACKER__DEBOUNCE_MS");
        std::env::remove_var("APP__TRACKER__MAX_WAIT_MS");
        std::env::remove_var("APP__DATABASE__MONGO_DATABASE");
        std::env::remove_var("SKIP_ROOT_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn defaults_without_any_source() {
        std::env::set_var("SKIP_ROOT_ENV", "1");
        let config = Config::load().unwrap();

        assert_eq!(config.tracker.debounce_ms, 1000);
        assert_eq!(config.tracker.max_wait_ms, None);
        assert_eq!(config.ingestion.max_upload_bytes, 10 * 1024 * 1024);

        std::env::remove_var("SKIP_ROOT_ENV");
    }
}
