use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

/// Binding protocol for a listener.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Raw MQTT over TCP.
    #[serde(alias = "mqtt")]
    Mqtt,

    /// MQTT over TCP with TLS.
    #[serde(alias = "mqtts")]
    Mqtts,
}

/// A single bound address and the protocol spoken on it.
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    /// Address to bind to, e.g. `0.0.0.0:1883`.
    #[serde(default = "ListenerConfig::default_address")]
    address: String,

    #[serde(default = "ListenerConfig::default_protocol")]
    protocol: Protocol,

    /// Path to the TLS certificate chain. Required when `protocol` is
    /// `Mqtts`.
    #[serde(default)]
    cert_file: Option<PathBuf>,

    /// Path to the TLS private key. Required when `protocol` is `Mqtts`.
    #[serde(default)]
    key_file: Option<PathBuf>,
}

impl ListenerConfig {
    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub fn default_address() -> String {
        "0.0.0.0:1883".to_string()
    }

    #[must_use]
    pub const fn default_protocol() -> Protocol {
        Protocol::Mqtt
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    /// Validates the address syntax and, for `Mqtts`, that both TLS file
    /// paths are present. Does not attempt to bind; that happens when the
    /// listener actually starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed, or if `Mqtts` is
    /// configured without both a cert and key file.
    pub fn validate(&self) -> Result<(), Error> {
        self.address.to_socket_addrs().map_err(|err| {
            Error::new(
                ErrorKind::ConfigError,
                format!("invalid socket address {}: {err}", &self.address),
            )
        })?;

        if self.protocol == Protocol::Mqtts && (self.cert_file.is_none() || self.key_file.is_none())
        {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "mqtts listener requires both cert_file and key_file",
            ));
        }
        Ok(())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            protocol: Self::default_protocol(),
            cert_file: None,
            key_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listener_is_plain_mqtt() {
        let listener = ListenerConfig::default();
        assert_eq!(listener.protocol(), Protocol::Mqtt);
        assert!(listener.validate().is_ok());
    }

    #[test]
    fn mqtts_without_cert_and_key_fails_validation() {
        let mut listener = ListenerConfig::default();
        listener.protocol = Protocol::Mqtts;
        assert!(listener.validate().is_err());
    }

    #[test]
    fn garbage_address_fails_validation() {
        let mut listener = ListenerConfig::default();
        listener.address = "not-an-address".to_string();
        assert!(listener.validate().is_err());
    }
}
