//! log4rs pipeline setup: always a console appender, plus a rolling file
//! appender when `LogConfig::log_file` is set.

use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::LogConfig;
use crate::error::{Error, ErrorKind};

const LOG_FILE_SIZE: u64 = 16 * 1024 * 1024;
const ROLLER_PATTERN: &str = ".{}.gz";
const ROLLER_COUNT: u32 = 10;
const PATTERN: &str = "{d} {h({l})} - {m}{n}";

const STDOUT_NAME: &str = "stdout";
const ROLLER_NAME: &str = "roller";

/// Initializes the global `log` logger from a `LogConfig`. Idempotent
/// across test runs is not guaranteed; call once per process.
///
/// # Errors
///
/// Returns an error if the log file's roller cannot be built or if
/// log4rs rejects the assembled config.
pub fn init_log(log_conf: &LogConfig) -> Result<(), Error> {
    let stdout = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let level = log_conf.level().to_level_filter();

    let mut appenders = vec![Appender::builder().build(STDOUT_NAME, Box::new(stdout))];
    let mut root_appenders = vec![STDOUT_NAME];

    if let Some(log_file) = log_conf.log_file() {
        let base_path = log_file.to_str().ok_or_else(|| {
            Error::new(
                ErrorKind::ConfigError,
                format!("log file path is not valid UTF-8: {}", log_file.display()),
            )
        })?;
        let roller_pattern = format!("{base_path}{ROLLER_PATTERN}");
        let roller = FixedWindowRoller::builder()
            .build(&roller_pattern, ROLLER_COUNT)
            .map_err(|err| {
                Error::new(ErrorKind::ConfigError, format!("failed to build log roller: {err}"))
            })?;
        let policy = Box::new(CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
            Box::new(roller),
        ));
        let rolling = RollingFileAppender::builder()
            .build(log_file, policy)
            .map_err(|err| {
                Error::new(
                    ErrorKind::ConfigError,
                    format!("failed to build rolling file appender: {err}"),
                )
            })?;
        appenders.push(Appender::builder().build(ROLLER_NAME, Box::new(rolling)));
        root_appenders.push(ROLLER_NAME);
    }

    let mut builder = Config::builder();
    for appender in appenders {
        builder = builder.appender(appender);
    }
    let config = builder
        .build(Root::builder().appenders(root_appenders).build(level))
        .map_err(|err| {
            Error::new(ErrorKind::ConfigError, format!("failed to build log4rs config: {err}"))
        })?;

    log4rs::init_config(config)
        .map_err(|err| Error::new(ErrorKind::ConfigError, format!("failed to init log4rs: {err}")))?;
    Ok(())
}
