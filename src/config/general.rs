use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Error;

/// Broker-wide tunables. Every field is a runtime value threaded through
/// sessions and the router rather than a compile-time constant, so tests
/// can vary them freely.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Keep-alive window advertised to clients that send `keep_alive = 0`,
    /// in seconds.
    #[serde(default = "GeneralConfig::default_keep_alive")]
    keep_alive: u16,

    /// Seconds to wait for a CONNECT after a socket is accepted.
    #[serde(default = "GeneralConfig::default_connect_timeout")]
    connect_timeout: u16,

    /// Whether an empty client id is accepted (and assigned a generated
    /// one) rather than rejected with `IdentifierRejected`.
    #[serde(default = "GeneralConfig::default_allow_empty_client_id")]
    allow_empty_client_id: bool,

    /// Per-session cap on queued-but-unsent QoS>0 publishes before the
    /// oldest are dropped.
    #[serde(default = "GeneralConfig::default_publish_queue_limit")]
    publish_queue_limit: u16,

    /// Per-session cap on unacknowledged QoS>0 publishes in flight.
    #[serde(default = "GeneralConfig::default_in_flight_limit")]
    in_flight_limit: u16,

    /// Path to a `username:$6$salt$hash` file. When set, CONNECT
    /// credentials are checked against it instead of being permitted
    /// unconditionally.
    #[serde(default)]
    passwd_file: Option<PathBuf>,
}

impl GeneralConfig {
    #[must_use]
    pub const fn default_keep_alive() -> u16 {
        60
    }

    #[must_use]
    pub const fn default_connect_timeout() -> u16 {
        60
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        true
    }

    #[must_use]
    pub const fn default_publish_queue_limit() -> u16 {
        32
    }

    #[must_use]
    pub const fn default_in_flight_limit() -> u16 {
        32
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u16 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn publish_queue_limit(&self) -> u16 {
        self.publish_queue_limit
    }

    #[must_use]
    pub const fn in_flight_limit(&self) -> u16 {
        self.in_flight_limit
    }

    #[must_use]
    pub fn passwd_file(&self) -> Option<&std::path::Path> {
        self.passwd_file.as_deref()
    }

    /// Validates that the limits are usable as array/queue capacities.
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is configured as zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.publish_queue_limit == 0 || self.in_flight_limit == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "publish_queue_limit and in_flight_limit must be non-zero",
            ));
        }
        Ok(())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            keep_alive: Self::default_keep_alive(),
            connect_timeout: Self::default_connect_timeout(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
            publish_queue_limit: Self::default_publish_queue_limit(),
            in_flight_limit: Self::default_in_flight_limit(),
            passwd_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_zero_limit() {
        let mut config = GeneralConfig::default();
        config.publish_queue_limit = 0;
        assert!(config.validate().is_err());
    }
}
