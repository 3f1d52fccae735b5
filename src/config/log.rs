use std::fs::{self, File};
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Minimum level emitted to both the console appender and the file
    /// appender, if any.
    ///
    /// Default is "info".
    #[serde(default = "LogConfig::default_level")]
    level: LogLevel,

    /// Path to a rolling log file. When unset, only the console appender
    /// is configured.
    #[serde(default)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(alias = "off")]
    Off,

    #[serde(alias = "error")]
    Error,

    #[serde(alias = "warn")]
    Warn,

    #[serde(alias = "info")]
    Info,

    #[serde(alias = "debug")]
    Debug,

    #[serde(alias = "trace")]
    Trace,
}

impl LogLevel {
    #[must_use]
    pub const fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub const fn default_level() -> LogLevel {
        LogLevel::Info
    }

    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub fn log_file(&self) -> Option<&std::path::Path> {
        self.log_file.as_deref()
    }

    /// Validates that the log file (and its parent directory) can be
    /// created.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the file itself
    /// cannot be created.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(log_file) = &self.log_file {
            if let Some(parent) = log_file.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|err| {
                        Error::new(
                            ErrorKind::ConfigError,
                            format!(
                                "failed to create parent directory for log file {}: {err}",
                                log_file.display()
                            ),
                        )
                    })?;
                }
            }
            File::options()
                .create(true)
                .append(true)
                .open(log_file)
                .map_err(|err| {
                    Error::new(
                        ErrorKind::ConfigError,
                        format!("failed to open log file {}: {err}", log_file.display()),
                    )
                })?;
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_log_file() {
        let config = LogConfig::default();
        assert_eq!(config.level(), LogLevel::Info);
        assert!(config.log_file().is_none());
        assert!(config.validate().is_ok());
    }
}
