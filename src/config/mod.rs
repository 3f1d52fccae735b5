//! Broker configuration, loaded from a TOML file.

mod general;
mod listener;
mod log;

use serde::Deserialize;

pub use general::GeneralConfig;
pub use listener::{ListenerConfig, Protocol};
pub use log::{LogConfig, LogLevel};

use crate::error::Error;

/// Top-level broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "ListenerConfig::default_listeners")]
    listeners: Vec<ListenerConfig>,

    #[serde(default)]
    general: GeneralConfig,

    #[serde(default)]
    log: LogConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listeners: ListenerConfig::default_listeners(),
            general: GeneralConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Parses a `BrokerConfig` from TOML source text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn listeners(&self) -> &[ListenerConfig] {
        &self.listeners
    }

    #[must_use]
    pub const fn general(&self) -> &GeneralConfig {
        &self.general
    }

    #[must_use]
    pub const fn log(&self) -> &LogConfig {
        &self.log
    }

    /// Validates every section. Does not attempt to bind any listener
    /// address; that happens at startup.
    pub fn validate(&self) -> Result<(), Error> {
        for listener in &self.listeners {
            listener.validate()?;
        }
        self.general.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_every_default() {
        let config = BrokerConfig::from_toml("").unwrap();
        assert_eq!(config.listeners().len(), 1);
        assert_eq!(config.general().keep_alive(), 60);
        assert_eq!(config.general().publish_queue_limit(), 32);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = BrokerConfig::from_toml(
            r#"
            [general]
            keep_alive = 30
            in_flight_limit = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.general().keep_alive(), 30);
        assert_eq!(config.general().in_flight_limit(), 10);
        assert_eq!(config.general().publish_queue_limit(), 32);
    }
}
