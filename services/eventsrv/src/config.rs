//! Service configuration
//!
//! Loaded once at startup: defaults, then YAML, then `EVENTSRV_*` variables,
//! then the legacy resource-name variables.

use common::config_loader::{env_override, ConfigLoader};
use common::logging::LogConfig;
use errors::{PulseError, PulseResult};
use pulse_store::{is_valid_identifier, TableNames};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "EVENTSRV_";
pub const DEFAULT_PORT: u16 = 6010;

/// Config files tried in order when `--config` is not given
pub const SEARCH_PATHS: [&str; 2] = ["config/eventsrv.yaml", "eventsrv.yaml"];

/// Legacy environment names for the injected resource identifiers
pub const ENV_RULES_TABLE: &str = "RULES_TABLE";
pub const ENV_ALERTS_TABLE: &str = "ALERTS_TABLE";
pub const ENV_EVENTS_TABLE: &str = "EVENTS_TABLE";
pub const ENV_EVENTS_QUEUE: &str = "EVENTS_QUEUE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub name: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "eventsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub host: String,
    pub port: u16,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub database_path: String,
    pub rules_table: String,
    pub alerts_table: String,
    pub events_table: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        let tables = TableNames::default();
        Self {
            backend: StorageBackend::Sqlite,
            database_path: "data/eventsrv.db".to_string(),
            rules_table: tables.rules,
            alerts_table: tables.alerts,
            events_table: tables.events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub name: String,
    /// Messages handed to the consumer per poll
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    /// Deliveries before a failing message is dead-lettered
    pub max_receive_count: u32,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            name: TableNames::default().queue,
            batch_size: 10,
            poll_interval_ms: 1000,
            max_receive_count: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSection {
    /// Force failures for the reserved test device
    pub failure_injection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub dir: String,
    pub file: bool,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: false,
            json: false,
        }
    }
}

/// eventsrv configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsrvConfig {
    pub service: ServiceSection,
    pub api: ApiSection,
    pub storage: StorageSection,
    pub queue: QueueSection,
    pub consumer: ConsumerSection,
    pub logging: LoggingSection,
}

impl EventsrvConfig {
    /// Load, apply legacy overrides and validate
    pub fn load(config_file: Option<&Path>) -> PulseResult<Self> {
        let mut loader = ConfigLoader::new(ENV_PREFIX).with_file(config_file);
        for path in SEARCH_PATHS {
            loader = loader.search(path);
        }
        let mut config: Self = loader.load()?;
        config.apply_overrides(env_override);
        config.validate()?;
        Ok(config)
    }

    /// Apply the legacy resource-name variables through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_RULES_TABLE) {
            self.storage.rules_table = v;
        }
        if let Some(v) = lookup(ENV_ALERTS_TABLE) {
            self.storage.alerts_table = v;
        }
        if let Some(v) = lookup(ENV_EVENTS_TABLE) {
            self.storage.events_table = v;
        }
        if let Some(v) = lookup(ENV_EVENTS_QUEUE) {
            self.queue.name = v;
        }
    }

    pub fn validate(&self) -> PulseResult<()> {
        let invalid = |field: &str, reason: &str| PulseError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.api.port == 0 {
            return Err(invalid("api.port", "Port cannot be 0"));
        }
        if self.api.host.trim().is_empty() {
            return Err(invalid("api.host", "Host cannot be empty"));
        }
        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.database_path.trim().is_empty()
        {
            return Err(invalid("storage.database_path", "Path cannot be empty"));
        }
        if self.queue.batch_size == 0 {
            return Err(invalid("queue.batch_size", "Must be at least 1"));
        }
        if self.queue.max_receive_count == 0 {
            return Err(invalid("queue.max_receive_count", "Must be at least 1"));
        }
        for (field, name) in [
            ("storage.rules_table", &self.storage.rules_table),
            ("storage.alerts_table", &self.storage.alerts_table),
            ("storage.events_table", &self.storage.events_table),
            ("queue.name", &self.queue.name),
        ] {
            if !is_valid_identifier(name) {
                return Err(invalid(field, "Must match [A-Za-z0-9_]+"));
            }
        }
        Ok(())
    }

    pub fn table_names(&self) -> TableNames {
        TableNames {
            rules: self.storage.rules_table.clone(),
            alerts: self.storage.alerts_table.clone(),
            events: self.storage.events_table.clone(),
            queue: self.queue.name.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            service_name: self.service.name.clone(),
            level: self.logging.level.clone(),
            log_dir: PathBuf::from(&self.logging.dir),
            enable_file: self.logging.file,
            enable_json: self.logging.json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EventsrvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.port, DEFAULT_PORT);
        assert!(!config.consumer.failure_injection);
        assert_eq!(config.table_names(), TableNames::default());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "api:\n  port: 7100\nstorage:\n  backend: memory\nqueue:\n  batch_size: 25\nconsumer:\n  failure_injection: true\n"
        )
        .unwrap();

        let config = EventsrvConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.api.port, 7100);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.queue.batch_size, 25);
        assert!(config.consumer.failure_injection);
    }

    #[test]
    fn test_legacy_overrides() {
        let env: HashMap<&str, &str> = [
            ("RULES_TABLE", "prod_rules"),
            ("EVENTS_QUEUE", "prod_queue"),
        ]
        .into_iter()
        .collect();

        let mut config = EventsrvConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.storage.rules_table, "prod_rules");
        assert_eq!(config.storage.alerts_table, "alerts");
        assert_eq!(config.table_names().queue, "prod_queue");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        fn port(c: &mut EventsrvConfig) {
            c.api.port = 0;
        }
        fn batch(c: &mut EventsrvConfig) {
            c.queue.batch_size = 0;
        }
        fn receives(c: &mut EventsrvConfig) {
            c.queue.max_receive_count = 0;
        }
        fn path(c: &mut EventsrvConfig) {
            c.storage.database_path = " ".into();
        }
        fn events_table(c: &mut EventsrvConfig) {
            c.storage.events_table = "ev-ents".into();
        }
        fn queue_name(c: &mut EventsrvConfig) {
            c.queue.name = String::new();
        }

        let cases: [(&str, fn(&mut EventsrvConfig)); 6] = [
            ("api.port", port),
            ("queue.batch_size", batch),
            ("queue.max_receive_count", receives),
            ("storage.database_path", path),
            ("storage.events_table", events_table),
            ("queue.name", queue_name),
        ];
        for (expected, mutate) in cases {
            let mut config = EventsrvConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(PulseError::InvalidConfig { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {} to be rejected, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_memory_backend_needs_no_path() {
        let mut config = EventsrvConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.database_path = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serializes_to_yaml() {
        let yaml = serde_yaml::to_string(&EventsrvConfig::default()).unwrap();
        assert!(yaml.contains("backend: sqlite"));
        assert!(yaml.contains("max_receive_count: 3"));
    }
}
