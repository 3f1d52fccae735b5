//! Broker entry point: loads config, starts logging, binds every
//! configured listener, and runs until interrupted.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use squatt_broker::config::{BrokerConfig, Protocol};
use squatt_broker::listener::load_tls_config;
use squatt_broker::{log as broker_log, Broker, Error};

#[derive(Parser)]
#[command(name = "squatt-broker")]
#[command(about = "MQTT 3.1.1 broker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the broker's TOML configuration file.
    #[arg(short = 'c', long, default_value = "/etc/squatt-broker/broker.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("squatt-broker: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &Path) -> Result<(), Error> {
    let config = load_config(config_path)?;
    broker_log::init_log(config.log())?;

    let broker = Arc::new(Broker::new(&config)?);

    tokio::spawn({
        let broker = broker.clone();
        async move { broker.route().await }
    });

    for listener in config.listeners() {
        let broker = broker.clone();
        let address = listener.address().to_string();
        match listener.protocol() {
            Protocol::Mqtt => {
                tokio::spawn(async move {
                    if let Err(err) = broker.listen_and_serve(&address).await {
                        log::error!("listener {address} stopped: {err}");
                    }
                });
            }
            Protocol::Mqtts => {
                let tls_config = Arc::new(load_tls_config(
                    listener
                        .cert_file()
                        .expect("validated: mqtts listener carries a cert_file"),
                    listener
                        .key_file()
                        .expect("validated: mqtts listener carries a key_file"),
                )?);
                tokio::spawn(async move {
                    if let Err(err) = broker.listen_and_serve_tls(&address, tls_config).await {
                        log::error!("listener {address} stopped: {err}");
                    }
                });
            }
        }
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| Error::new(squatt_broker::ErrorKind::IoError, format!("{err}")))?;
    log::info!("shutdown signal received");
    Ok(())
}

fn load_config(path: &Path) -> Result<BrokerConfig, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::new(
            squatt_broker::ErrorKind::ConfigError,
            format!("reading config file {}: {err}", path.display()),
        )
    })?;
    BrokerConfig::from_toml(&text)
}
