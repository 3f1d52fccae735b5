//! Accept loop and top-level broker handle: binds listeners, runs router
//! workers, and spawns a connection task per accepted socket.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};

use codec::PublishPacket;
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::{rustls, TlsAcceptor};

use crate::auth::{FileAuth, NoAuth, Plugin};
use crate::config::BrokerConfig;
use crate::connection::{self, Shared};
use crate::error::{Error, ErrorKind};
use crate::retained::RetainedStore;
use crate::router::Router;
use crate::session::SessionLimits;
use crate::session_store::SessionStore;
use crate::subscription::SubscriptionTable;
use crate::topic::TopicRegistry;

/// Loads a TLS server config from a PEM certificate chain and private key.
///
/// # Errors
///
/// Returns an error if either file cannot be read or parsed, or if rustls
/// rejects the resulting cert/key pair.
pub fn load_tls_config(cert_file: &Path, key_file: &Path) -> Result<rustls::ServerConfig, Error> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(File::open(cert_file)?))
            .collect::<Result<_, _>>()
            .map_err(|err| {
                Error::new(
                    ErrorKind::ConfigError,
                    format!("reading cert file {}: {err}", cert_file.display()),
                )
            })?;
    let key: PrivateKeyDer<'static> =
        rustls_pemfile::private_key(&mut BufReader::new(File::open(key_file)?))
            .map_err(|err| {
                Error::new(
                    ErrorKind::ConfigError,
                    format!("reading key file {}: {err}", key_file.display()),
                )
            })?
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ConfigError,
                    format!("no private key found in {}", key_file.display()),
                )
            })?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::new(ErrorKind::ConfigError, format!("building tls config: {err}")))
}

/// Top-level broker handle: shared protocol state plus the listener and
/// router wiring around it. Construct one per process.
pub struct Broker {
    shared: Arc<Shared>,
    router: Arc<Router>,
    publish_rx: Mutex<Option<tokio::sync::mpsc::Receiver<PublishPacket>>>,
}

impl Broker {
    /// Builds a broker from a loaded configuration: topic registry, session
    /// store, subscription table, retained store, and the auth plugin
    /// (file-backed if `general.passwd_file` is set, otherwise permit-all).
    ///
    /// # Errors
    ///
    /// Returns an error if the configured passwd file cannot be loaded.
    pub fn new(config: &BrokerConfig) -> Result<Self, Error> {
        let topics = Arc::new(TopicRegistry::new());
        let limits = SessionLimits {
            publish_queue_limit: usize::from(config.general().publish_queue_limit()),
            in_flight_limit: usize::from(config.general().in_flight_limit()),
        };
        let sessions = Arc::new(SessionStore::new(limits));
        let subscriptions = Arc::new(SubscriptionTable::new());
        let retained = Arc::new(RetainedStore::new());

        let auth: Arc<dyn Plugin> = match config.general().passwd_file() {
            Some(path) => Arc::new(FileAuth::load(path)?),
            None => Arc::new(NoAuth),
        };

        let (publish_tx, publish_rx) = Router::channel();
        let router = Arc::new(Router::new(topics.clone(), subscriptions.clone(), retained.clone()));

        let shared = Arc::new(Shared {
            topics,
            sessions,
            subscriptions,
            retained,
            auth,
            publish_tx,
            allow_empty_client_id: config.general().allow_empty_client_id(),
        });

        Ok(Self {
            shared,
            router,
            publish_rx: Mutex::new(Some(publish_rx)),
        })
    }

    /// Returns the send half of the publish channel. Cloneable; every
    /// connection handler holds a copy to feed its session's own publishes
    /// into the router.
    #[must_use]
    pub fn publish(&self) -> tokio::sync::mpsc::Sender<PublishPacket> {
        self.shared.publish_tx.clone()
    }

    /// Runs a router worker until the publish channel's senders are all
    /// dropped. Only the first call actually drains the channel; later
    /// calls (intended to add worker concurrency) return immediately once
    /// the receiver has already been taken by a sibling call awaited
    /// elsewhere, since a channel has exactly one receiver.
    pub async fn route(&self) {
        let rx = self.publish_rx.lock().unwrap().take();
        if let Some(rx) = rx {
            self.router.run(rx).await;
        }
    }

    /// Accepts plaintext MQTT connections from an already-bound listener
    /// until it errors.
    ///
    /// # Errors
    ///
    /// Returns an error if `accept` fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Error> {
        loop {
            let (stream, addr) = listener.accept().await?;
            let shared = self.shared.clone();
            tokio::spawn(connection::handle(stream, shared, addr.to_string()));
        }
    }

    /// Binds `addr` and serves plaintext MQTT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn listen_and_serve(&self, addr: &str) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Binds `addr` and serves MQTT over TLS using `tls_config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn listen_and_serve_tls(
        &self,
        addr: &str,
        tls_config: Arc<rustls::ServerConfig>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await?;
        let acceptor = TlsAcceptor::from(tls_config);
        loop {
            let (stream, addr) = listener.accept().await?;
            let acceptor = acceptor.clone();
            let shared = self.shared.clone();
            let peer = addr.to_string();
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => connection::handle(tls_stream, shared, peer).await,
                    Err(err) => log::warn!("tls handshake with {peer} failed: {err}"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_broker() {
        let config = BrokerConfig::default();
        let broker = Broker::new(&config);
        assert!(broker.is_ok());
    }
}
