//! Construction-time configuration
//!
//! Everything is supplied by the caller; nothing is read from the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Driver service (local executable) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding the executable. `None` searches `PATH`.
    pub binaries_dir: Option<PathBuf>,
    pub executable_name: String,
    pub host: String,
    /// Fixed port. `None` allocates a free port starting at the vendor default.
    pub port: Option<u16>,
    /// Extra launch arguments, appended after `--port=<port>`.
    pub args: Vec<String>,
    /// Where to fetch the executable from when it is missing.
    pub download_url: Option<String>,
    #[serde(with = "duration_ms")]
    pub startup_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
}

impl ServiceConfig {
    pub fn new(executable_name: impl Into<String>) -> Self {
        Self {
            executable_name: executable_name.into(),
            ..Default::default()
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            binaries_dir: None,
            executable_name: String::new(),
            host: "127.0.0.1".to_string(),
            port: None,
            args: Vec::new(),
            download_url: None,
            startup_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// HTTP command executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(with = "duration_ms")]
    pub command_timeout: Duration,
    /// Default content type for request bodies.
    pub content_type: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(60),
            content_type: "application/json;charset=utf-8".to_string(),
        }
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_roundtrip_uses_millis() {
        let config = ServiceConfig::new("chromedriver");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["startup_timeout"], 20_000);
        assert_eq!(json["poll_interval"], 250);

        let back: ServiceConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.executable_name, "chromedriver");
        assert_eq!(back.poll_interval, Duration::from_millis(250));
    }
}
