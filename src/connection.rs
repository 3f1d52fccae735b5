//! Per-connection protocol handler: owns the socket, the session handle
//! once CONNECT succeeds, and the keep-alive watchdog. Mirrors the Go
//! client's send/receive-goroutine-plus-context-cancellation shape, with
//! the send side as a spawned task and the receive side run inline on the
//! task the listener already spawned for this connection.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use bytes::BytesMut;
use codec::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, EncodePacket, Packet, PingResponsePacket,
    PublishPacket, SubscribeAck, SubscribeAckPacket, UnsubscribeAckPacket,
};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};

use crate::auth::Plugin;
use crate::error::{Error, ErrorKind};
use crate::retained::RetainedStore;
use crate::session::{Outgoing, Session, SessionLimits};
use crate::session_store::SessionStore;
use crate::subscription::SubscriptionTable;
use crate::topic::{validate_topic, TopicRegistry};
use crate::watchdog::Watchdog;

const READ_CHUNK: usize = 4096;
const WIRE_CHANNEL_CAPACITY: usize = 64;
const SESSION_OUTBOUND_CAPACITY: usize = 64;

/// State every connection handler shares with the rest of the broker.
pub struct Shared {
    pub topics: Arc<TopicRegistry>,
    pub sessions: Arc<SessionStore>,
    pub subscriptions: Arc<SubscriptionTable>,
    pub retained: Arc<RetainedStore>,
    pub auth: Arc<dyn Plugin>,
    pub publish_tx: mpsc::Sender<PublishPacket>,
    pub allow_empty_client_id: bool,
}

fn generate_client_id() -> String {
    static PREFIX: OnceLock<u64> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let prefix = *PREFIX.get_or_init(|| rand::rng().random());
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("auto-{prefix:016x}-{n:08x}")
}

fn encode_packet(packet: &Packet, buf: &mut Vec<u8>) -> Result<usize, codec::EncodeError> {
    match packet {
        Packet::Connect(p) => p.encode(buf),
        Packet::ConnectAck(p) => p.encode(buf),
        Packet::Publish(p) => p.encode(buf),
        Packet::PublishAck(p) => p.encode(buf),
        Packet::PublishReceived(p) => p.encode(buf),
        Packet::PublishRelease(p) => p.encode(buf),
        Packet::PublishComplete(p) => p.encode(buf),
        Packet::Subscribe(p) => p.encode(buf),
        Packet::SubscribeAck(p) => p.encode(buf),
        Packet::Unsubscribe(p) => p.encode(buf),
        Packet::UnsubscribeAck(p) => p.encode(buf),
        Packet::PingRequest(p) => p.encode(buf),
        Packet::PingResponse(p) => p.encode(buf),
        Packet::Disconnect(p) => p.encode(buf),
    }
}

/// First-error-wins cancellation signal shared between the receive loop,
/// the send task, and the keep-alive watchdog.
struct ConnState {
    first_error: Mutex<Option<Error>>,
    stopped: AtomicBool,
    notify: Notify,
}

impl ConnState {
    fn new() -> Self {
        Self {
            first_error: Mutex::new(None),
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn set_error(&self, err: Error) {
        let mut guard = self.first_error.lock().unwrap();
        if guard.is_none() {
            *guard = Some(err);
        }
        drop(guard);
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    fn take_error(&self) -> Option<Error> {
        self.first_error.lock().unwrap().take()
    }

    async fn stopped_signal(&self) {
        self.notify.notified().await;
    }
}

/// Per-connection mutable state. Lives entirely on the task that owns the
/// receive loop; nothing here is shared across tasks except through `Arc`
/// fields, so every method is plain synchronous code that can run inside
/// `catch_unwind`.
struct Connection {
    shared: Arc<Shared>,
    state: Arc<ConnState>,
    peer: String,
    wire_tx: mpsc::Sender<Vec<u8>>,
    session: Option<Arc<Session>>,
    client_id: Option<String>,
    watchdog: Option<Watchdog>,
}

impl Connection {
    fn send_frame(&self, packet: &Packet) {
        let mut bytes = Vec::new();
        if encode_packet(packet, &mut bytes).is_err() {
            return;
        }
        if self.wire_tx.try_send(bytes).is_err() {
            log::warn!("peer {}: dropped outbound frame, socket backed up", self.peer);
        }
    }

    fn send_connack(&self, code: ConnectReturnCode, session_present: bool) {
        self.send_frame(&Packet::ConnectAck(ConnectAckPacket::new(code, session_present)));
    }

    fn require_session(&self) -> Result<&Arc<Session>, Error> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::protocol_violation("packet received before CONNECT"))
    }

    fn dispatch(&mut self, packet: Packet) -> Result<(), Error> {
        match packet {
            Packet::Connect(packet) => self.handle_connect(packet),
            Packet::Publish(packet) => self.handle_publish(packet),
            Packet::PublishAck(packet) => {
                self.require_session()?.receive_puback(packet.packet_id());
                Ok(())
            }
            Packet::PublishReceived(packet) => {
                self.require_session()?.receive_pubrec(packet.packet_id());
                Ok(())
            }
            Packet::PublishRelease(packet) => {
                self.require_session()?.receive_pubrel(packet.packet_id());
                Ok(())
            }
            Packet::PublishComplete(packet) => {
                self.require_session()?.receive_pubcomp(packet.packet_id());
                Ok(())
            }
            Packet::Subscribe(packet) => self.handle_subscribe(packet),
            Packet::Unsubscribe(packet) => self.handle_unsubscribe(packet),
            Packet::PingRequest(_) => {
                self.require_session()?;
                self.send_frame(&Packet::PingResponse(PingResponsePacket));
                Ok(())
            }
            Packet::Disconnect(_) => {
                let session = self.require_session()?;
                session.clear_will();
                session.disconnect();
                Ok(())
            }
            Packet::ConnectAck(_)
            | Packet::SubscribeAck(_)
            | Packet::UnsubscribeAck(_)
            | Packet::PingResponse(_) => {
                Err(Error::protocol_violation("server-only packet sent by client"))
            }
        }
    }

    fn handle_connect(&mut self, mut packet: ConnectPacket) -> Result<(), Error> {
        if self.session.is_some() {
            return Err(Error::protocol_violation("duplicate CONNECT"));
        }

        if let Err(code) = packet.validate() {
            self.send_connack(code, false);
            return Err(Error::protocol_violation(format!(
                "CONNECT rejected with {code:?}"
            )));
        }

        if packet.client_id().is_empty() {
            if !self.shared.allow_empty_client_id {
                self.send_connack(ConnectReturnCode::IdentifierRejected, false);
                return Err(Error::protocol_violation("empty client id not allowed"));
            }
            packet.set_client_id(generate_client_id());
        }
        let client_id = packet.client_id().to_string();

        let capability = self.shared.auth.authenticate(
            &client_id,
            packet.username(),
            packet.password().map(|password| password.as_ref()),
        );
        if !capability.can_connect() {
            self.send_connack(ConnectReturnCode::NotAuthorized, false);
            return Err(Error::new(
                ErrorKind::AuthFailed,
                format!("client {client_id} refused by auth plugin"),
            ));
        }

        let (session, session_present) = if packet.clean_session() {
            (self.shared.sessions.new_session(&client_id), false)
        } else {
            let (session, existed) = self.shared.sessions.get_or_new(&client_id);
            let present = existed && session.persistent();
            if existed {
                session.disconnect();
            }
            session.set_persistent();
            (session, present)
        };

        session.set_auth(capability);

        let disconnect_session = Arc::downgrade(&session);
        let sessions_for_cb = self.shared.sessions.clone();
        let client_id_for_cb = client_id.clone();
        session.set_on_disconnect(move || {
            if let Some(session) = disconnect_session.upgrade() {
                if !session.persistent() {
                    sessions_for_cb.delete(&client_id_for_cb);
                }
            }
        });

        let delete_session = Arc::downgrade(&session);
        let subscriptions_for_cb = self.shared.subscriptions.clone();
        session.set_on_delete(move || {
            if let Some(session) = delete_session.upgrade() {
                subscriptions_for_cb.unsubscribe(&session, &[]);
            }
        });

        if let Some(will) = packet.will() {
            session.set_will(&will.topic, will.message.clone(), will.qos, will.retain);
        }

        if packet.keep_alive() != 0 {
            let expire = Duration::from_secs_f64(f64::from(packet.keep_alive()) * 1.5);
            let state = self.state.clone();
            self.watchdog = Some(Watchdog::new(expire, move || {
                state.set_error(Error::keep_alive_timeout());
            }));
        }

        session.deliver_to(self.shared.publish_tx.clone());
        self.send_connack(ConnectReturnCode::Accepted, session_present);

        let (out_tx, mut out_rx) = mpsc::channel::<Outgoing>(SESSION_OUTBOUND_CAPACITY);
        let wire_tx = self.wire_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let packet: Packet = msg.into();
                let mut bytes = Vec::new();
                if encode_packet(&packet, &mut bytes).is_ok() {
                    let _ = wire_tx.try_send(bytes);
                }
            }
        });

        session.connect(out_tx);
        session.resend_pending();

        self.client_id = Some(client_id);
        self.session = Some(session);
        Ok(())
    }

    fn handle_publish(&self, packet: PublishPacket) -> Result<(), Error> {
        let session = self.require_session()?;
        validate_topic(packet.topic(), false).map_err(|err| {
            Error::protocol_violation(format!("invalid publish topic: {err}"))
        })?;
        session.receive_publish(&packet);
        Ok(())
    }

    fn handle_subscribe(&self, packet: codec::SubscribePacket) -> Result<(), Error> {
        let session = self.require_session()?;
        let mut codes = Vec::with_capacity(packet.topics().len());
        for entry in packet.topics() {
            validate_topic(&entry.topic, true).map_err(|err| {
                Error::protocol_violation(format!("invalid subscribe filter: {err}"))
            })?;

            if session.can_subscribe_to(&entry.topic) {
                self.shared
                    .subscriptions
                    .subscribe(session.clone(), self.shared.topics.get(&entry.topic), entry.qos);
                self.deliver_retained_on_subscribe(session, &entry.topic, entry.qos);
                codes.push(SubscribeAck::QoS(entry.qos));
            } else {
                codes.push(SubscribeAck::Failed);
            }
        }
        self.send_frame(&Packet::SubscribeAck(SubscribeAckPacket::new(
            packet.packet_id(),
            codes,
        )));
        Ok(())
    }

    /// Delivers every retained message matching a freshly granted filter,
    /// downgraded to the granted QoS, the way a live publish would be.
    fn deliver_retained_on_subscribe(&self, session: &Arc<Session>, filter: &str, qos: codec::QoS) {
        let matched = self.shared.topics.matches(filter);
        for mut msg in self.shared.retained.retained(&matched) {
            let downgraded = std::cmp::min(msg.qos(), qos);
            msg.set_qos(downgraded);
            session.send_publish(msg);
        }
    }

    fn handle_unsubscribe(&self, packet: codec::UnsubscribePacket) -> Result<(), Error> {
        let session = self.require_session()?;
        let handles: Vec<_> = packet
            .topics()
            .iter()
            .map(|topic| self.shared.topics.get(topic))
            .collect();
        self.shared.subscriptions.unsubscribe(session, &handles);
        self.send_frame(&Packet::UnsubscribeAck(UnsubscribeAckPacket::new(
            packet.packet_id(),
        )));
        Ok(())
    }
}

/// Runs a single connection to completion, logging (rather than
/// propagating) its final error: one bad client must never take down the
/// listener task that accepted it.
pub async fn handle<S>(stream: S, shared: Arc<Shared>, peer: String)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    if let Err(err) = run(stream, shared, peer.clone()).await {
        log::warn!("connection {peer} closed: {err}");
    }
}

async fn run<S>(stream: S, shared: Arc<Shared>, peer: String) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (wire_tx, mut wire_rx) = mpsc::channel::<Vec<u8>>(WIRE_CHANNEL_CAPACITY);
    let state = Arc::new(ConnState::new());

    let send_state = state.clone();
    let send_task = tokio::spawn(async move {
        while let Some(bytes) = wire_rx.recv().await {
            if let Err(err) = writer.write_all(&bytes).await {
                send_state.set_error(Error::from(err));
                break;
            }
        }
    });

    let mut conn = Connection {
        shared,
        state: state.clone(),
        peer,
        wire_tx,
        session: None,
        client_id: None,
        watchdog: None,
    };

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    'outer: loop {
        tokio::select! {
            result = reader.read_buf(&mut buf) => {
                match result {
                    Ok(0) => break 'outer,
                    Ok(_) => {}
                    Err(err) => {
                        state.set_error(err.into());
                        break 'outer;
                    }
                }
            }
            () = state.stopped_signal() => break 'outer,
        }

        loop {
            match codec::read_packet(&buf) {
                Ok(Some((packet, consumed))) => {
                    let _ = buf.split_to(consumed);
                    if let Some(watchdog) = &conn.watchdog {
                        watchdog.kick();
                    }
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| conn.dispatch(packet)));
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            state.set_error(err);
                            break 'outer;
                        }
                        Err(_panic) => {
                            state.set_error(Error::new(ErrorKind::Internal, "packet handler panicked"));
                            break 'outer;
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    state.set_error(err.into());
                    break 'outer;
                }
            }
        }
    }

    if let Some(watchdog) = conn.watchdog.take() {
        watchdog.stop();
    }
    if let Some(session) = &conn.session {
        session.disconnect();
    }
    drop(conn.wire_tx);
    let _ = send_task.await;

    match state.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retained::RetainedStore;
    use crate::session_store::SessionStore;
    use crate::subscription::SubscriptionTable;
    use crate::topic::TopicRegistry;
    use codec::{ConnectPacket, DisconnectPacket, PingRequestPacket};
    use tokio::io::duplex;

    fn shared() -> Arc<Shared> {
        let (publish_tx, _publish_rx) = mpsc::channel(64);
        Arc::new(Shared {
            topics: Arc::new(TopicRegistry::new()),
            sessions: Arc::new(SessionStore::new(SessionLimits::default())),
            subscriptions: Arc::new(SubscriptionTable::new()),
            retained: Arc::new(RetainedStore::new()),
            auth: Arc::new(crate::auth::NoAuth),
            publish_tx,
            session_limits: SessionLimits::default(),
            allow_empty_client_id: true,
        })
    }

    #[tokio::test]
    async fn connect_then_disconnect_closes_cleanly() {
        let (client, server) = duplex(4096);
        let handle = tokio::spawn(run(server, shared(), "test-peer".to_string()));

        let mut client = client;
        let mut buf = Vec::new();
        ConnectPacket::new("client-1", 0).encode(&mut buf).unwrap();
        DisconnectPacket.encode(&mut buf).unwrap();
        client.write_all(&buf).await.unwrap();

        let mut response = [0u8; 4];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[0] >> 4, 2); // CONNACK
        assert_eq!(response[3], 0); // accepted

        drop(client);
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn pingreq_before_connect_is_a_protocol_violation() {
        let (client, server) = duplex(4096);
        let handle = tokio::spawn(run(server, shared(), "test-peer".to_string()));

        let mut client = client;
        let mut buf = Vec::new();
        PingRequestPacket.encode(&mut buf).unwrap();
        client.write_all(&buf).await.unwrap();
        drop(client);

        let result = handle.await.unwrap();
        assert!(result.is_err());
    }
}
