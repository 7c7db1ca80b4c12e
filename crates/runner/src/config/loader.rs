use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::types::{IdentityConfig, UserStreamConfigFile};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Identity {0} is configured more than once")]
    DuplicateIdentity(i64),
    #[error("No credential for @{0}")]
    MissingCredential(String),
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<UserStreamConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<UserStreamConfigFile, ConfigError> {
    let config: UserStreamConfigFile = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<UserStreamConfigFile, ConfigError> {
    let default_config = include_str!("userstream_config.json");
    load_config_from_str(default_config)
}

impl UserStreamConfigFile {
    /// Identities that should hold a stream connection
    pub fn enabled_identities(&self) -> Vec<&IdentityConfig> {
        self.identities.iter().filter(|i| i.streaming_enabled).collect()
    }

    pub fn get_identity(&self, id: i64) -> Option<&IdentityConfig> {
        self.identities.iter().find(|i| i.id == id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.url is empty".into()));
        }
        if self.stream.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("stream.read_timeout_secs must be positive".into()));
        }
        if self.stream.channel_capacity == 0 || self.stream.event_capacity == 0 {
            return Err(ConfigError::Invalid("stream capacities must be positive".into()));
        }

        let b = &self.backoff;
        if b.network_step_ms == 0 || b.network_cap_ms < b.network_step_ms {
            return Err(ConfigError::Invalid(
                "backoff.network_cap_ms must be at least one positive step".into(),
            ));
        }
        if b.protocol_initial_ms == 0 || b.protocol_cap_ms < b.protocol_initial_ms {
            return Err(ConfigError::Invalid(
                "backoff.protocol_cap_ms must be at least the positive initial wait".into(),
            ));
        }
        if b.hard_error_limit == 0 {
            return Err(ConfigError::Invalid("backoff.hard_error_limit must be positive".into()));
        }

        let mut seen = HashSet::new();
        for identity in &self.identities {
            if !seen.insert(identity.id) {
                return Err(ConfigError::DuplicateIdentity(identity.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryMode;
    use std::time::Duration;
    use userstream_gateway::{DmDeleteUserIdSource, LineDelivery};

    #[test]
    fn test_load_default_config() {
        let config = load_default_config().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_identities().len(), 1);

        let runtime = config.connection_config();
        assert_eq!(runtime.read_timeout, Duration::from_secs(90));
        assert_eq!(runtime.delivery, LineDelivery::Ordered { capacity: 1024 });
        assert_eq!(runtime.backoff.protocol_cap, Duration::from_millis(320_000));
        assert_eq!(runtime.reconnect_coalesce, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = load_config_from_str(
            r#"{"identities":[{"id":7,"screen_name":"bob","token":"t"}],"parser":{"dm_delete_user_id":"status"}}"#,
        )
        .unwrap();

        assert_eq!(config.stream.delivery, DeliveryMode::Ordered);
        assert_eq!(config.backoff.network_step_ms, 250);
        assert_eq!(config.parser.dm_delete_user_id, DmDeleteUserIdSource::Status);

        let bob = config.get_identity(7).unwrap();
        assert!(bob.streaming_enabled);
        assert_eq!(bob.credential().unwrap().expose(), "t");
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        let mut config = load_default_config().unwrap();
        config.backoff.network_cap_ms = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = load_default_config().unwrap();
        let duplicate = config.identities[0].clone();
        config.identities.push(duplicate);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateIdentity(1))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            load_config_from_str("{"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
