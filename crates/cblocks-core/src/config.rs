//! Shared configuration defaults and environment helpers.
//!
//! Keeps the defaults used by the stores, the write protocol and the
//! binary in one place.

/// Default number of output records returned when no limit is given.
pub const DEFAULT_RECORD_LIMIT: usize = 50;

/// MQTT broker defaults.
pub mod mqtt {
    pub const DEFAULT_BROKER: &str = "localhost";
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_CLIENT_ID: &str = "cblocks";
    pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
}

/// Storage defaults.
pub mod storage {
    pub const DEFAULT_DATA_DIR: &str = "data";
    pub const REGISTRY_FILE: &str = "registry.redb";
    pub const MAPPINGS_FILE: &str = "mappings.redb";
}

/// Resource write defaults.
pub mod write {
    /// How long a write waits for a device confirmation.
    pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
}

/// Environment variable names.
pub mod env_vars {
    pub const MQTT_BROKER: &str = "CBLOCKS_MQTT_BROKER";
    pub const MQTT_PORT: &str = "CBLOCKS_MQTT_PORT";
    pub const DATA_DIR: &str = "CBLOCKS_DATA_DIR";
    pub const WRITE_TIMEOUT_MS: &str = "CBLOCKS_WRITE_TIMEOUT_MS";
    pub const LOG_JSON: &str = "CBLOCKS_LOG_JSON";

    /// Whether logs should be emitted as JSON lines.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}
