//! Per-client session state: QoS pipelines, will, and the channel that
//! carries outbound packets back to a connection handler.
//!
//! Mutable state is split across two locks, matching the two access
//! patterns: `inner` guards the will and the outbound channel (touched on
//! connect/disconnect and on every send), `pending` guards the five
//! packet-identifier-keyed queues (touched on every QoS>0 publish and ack).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use codec::{
    PacketId, PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, QoS,
};
use tokio::sync::mpsc;

use crate::auth::{Capability, NoAuth, Plugin};
use crate::pending::PendingQueue;

/// Packet kinds a session originates on its own outbound channel. A
/// connection handler drains these into the wire alongside its own
/// directly-issued replies (CONNACK, SUBACK, ...).
#[derive(Debug, Clone)]
pub enum Outgoing {
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
}

impl From<Outgoing> for codec::Packet {
    fn from(msg: Outgoing) -> Self {
        match msg {
            Outgoing::Publish(p) => Self::Publish(p),
            Outgoing::PublishAck(p) => Self::PublishAck(p),
            Outgoing::PublishReceived(p) => Self::PublishReceived(p),
            Outgoing::PublishRelease(p) => Self::PublishRelease(p),
            Outgoing::PublishComplete(p) => Self::PublishComplete(p),
        }
    }
}

pub type OutgoingSender = mpsc::Sender<Outgoing>;
pub type OutgoingReceiver = mpsc::Receiver<Outgoing>;

fn publish_key(msg: &PublishPacket) -> PacketId {
    msg.packet_id().expect("queued publish always carries an id")
}

fn pubrec_key(msg: &PublishReceivedPacket) -> PacketId {
    msg.packet_id()
}

fn pubrel_key(msg: &PublishReleasePacket) -> PacketId {
    msg.packet_id()
}

struct Inner {
    will: Option<PublishPacket>,
    out_tx: Option<OutgoingSender>,
}

#[derive(Default)]
struct Pending {
    pending_pub: PendingQueue<PublishPacket>,
    pending_ack: PendingQueue<PublishPacket>,
    pending_rec: PendingQueue<PublishPacket>,
    pending_rel: PendingQueue<PublishReceivedPacket>,
    pending_comp: PendingQueue<PublishReleasePacket>,
}

/// Tunable limits mirrored from a session's owning broker configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub publish_queue_limit: usize,
    pub in_flight_limit: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            publish_queue_limit: 32,
            in_flight_limit: 32,
        }
    }
}

pub struct Session {
    name: String,
    limits: SessionLimits,
    persistent: AtomicBool,
    pub_counter: AtomicU64,

    capability: Mutex<Arc<dyn Capability>>,
    on_disconnect: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    on_delete: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    delivery_tx: Mutex<Option<mpsc::Sender<PublishPacket>>>,

    inner: Mutex<Inner>,
    pending: Mutex<Pending>,
}

impl Session {
    #[must_use]
    pub fn new(name: impl Into<String>, limits: SessionLimits) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            limits,
            persistent: AtomicBool::new(false),
            pub_counter: AtomicU64::new(0),
            capability: Mutex::new(NoAuth.authenticate("", None, None)),
            on_disconnect: Mutex::new(None),
            on_delete: Mutex::new(None),
            delivery_tx: Mutex::new(None),
            inner: Mutex::new(Inner {
                will: None,
                out_tx: None,
            }),
            pending: Mutex::new(Pending::default()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_auth(&self, capability: Arc<dyn Capability>) {
        *self.capability.lock().unwrap() = capability;
    }

    #[must_use]
    pub fn can_publish_to(&self, topic: &str) -> bool {
        self.capability.lock().unwrap().can_publish_to(topic)
    }

    #[must_use]
    pub fn can_subscribe_to(&self, topic: &str) -> bool {
        self.capability.lock().unwrap().can_subscribe_to(topic)
    }

    pub fn set_on_disconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_disconnect.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn set_on_delete(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_delete.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn set_persistent(&self) {
        self.persistent.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn persistent(&self) -> bool {
        self.persistent.load(Ordering::SeqCst)
    }

    /// Sets the channel the router delivers this session's own publishes
    /// (including its will) to.
    pub fn deliver_to(&self, tx: mpsc::Sender<PublishPacket>) {
        *self.delivery_tx.lock().unwrap() = Some(tx);
    }

    pub fn set_will(&self, topic: &str, payload: bytes::Bytes, qos: QoS, retain: bool) {
        if !self.can_publish_to(topic) {
            return;
        }
        let mut will = PublishPacket::new(topic, qos, payload);
        will.set_retain(retain);
        self.inner.lock().unwrap().will = Some(will);
    }

    pub fn clear_will(&self) {
        self.inner.lock().unwrap().will = None;
    }

    fn deliver(&self, msg: PublishPacket) -> bool {
        match self.delivery_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.try_send(msg).is_ok(),
            None => false,
        }
    }

    fn publish_will(inner: &mut Inner, delivery_tx: &Mutex<Option<mpsc::Sender<PublishPacket>>>) {
        if let Some(will) = inner.will.take() {
            if let Some(tx) = delivery_tx.lock().unwrap().as_ref() {
                let _ = tx.try_send(will);
            }
        }
    }

    /// Attaches `out_tx` as this session's outbound channel. If a channel
    /// was already attached, the old one is dropped (closing it), the will
    /// is published, and `on_disconnect` fires for the prior owner — all
    /// without holding `inner`'s lock during the callback.
    pub fn connect(&self, out_tx: OutgoingSender) {
        let fire_disconnect = {
            let mut inner = self.inner.lock().unwrap();
            let had_prior = inner.out_tx.is_some();
            inner.out_tx = Some(out_tx);
            if had_prior {
                Self::publish_will(&mut inner, &self.delivery_tx);
            }
            had_prior
        };
        if fire_disconnect {
            self.fire_on_disconnect();
        }
    }

    pub fn disconnect(&self) {
        let had_channel = {
            let mut inner = self.inner.lock().unwrap();
            let had = inner.out_tx.take().is_some();
            if had {
                Self::publish_will(&mut inner, &self.delivery_tx);
            }
            had
        };
        if had_channel {
            self.fire_on_disconnect();
        }
    }

    pub fn delete(&self) {
        self.disconnect();
        self.fire_on_delete();
    }

    fn fire_on_disconnect(&self) {
        if let Some(cb) = self.on_disconnect.lock().unwrap().clone() {
            cb();
        }
    }

    fn fire_on_delete(&self) {
        if let Some(cb) = self.on_delete.lock().unwrap().clone() {
            cb();
        }
    }

    fn send(&self, msg: Outgoing) -> bool {
        match self.inner.lock().unwrap().out_tx.as_ref() {
            Some(tx) => tx.try_send(msg).is_ok(),
            None => false,
        }
    }

    fn next_packet_id(&self) -> PacketId {
        let id = self.pub_counter.fetch_add(1, Ordering::Relaxed);
        (id as u16).wrapping_add(1)
    }

    fn in_flight(&self, pending: &Pending) -> usize {
        pending.pending_ack.len() + pending.pending_rec.len() + pending.pending_rel.len() + pending.pending_comp.len()
    }

    /// Sends `msg` to this session's client, queuing it for QoS>0
    /// redelivery. Mirrors the server-originated half of the PUBLISH flow.
    pub fn send_publish(&self, mut msg: PublishPacket) {
        if msg.qos() != QoS::AtMostOnce {
            let id = self.next_packet_id();
            msg.set_packet_id(id);
            let mut pending = self.pending.lock().unwrap();
            pending.pending_pub.insert(msg.clone(), publish_key);
            pending.pending_pub.truncate_front(self.limits.publish_queue_limit);
        }

        let can_subscribe = self.can_subscribe_to(msg.topic());
        let under_limit = {
            let pending = self.pending.lock().unwrap();
            self.in_flight(&pending) < self.limits.in_flight_limit
        };
        if can_subscribe && under_limit && self.send(Outgoing::Publish(msg.clone())) {
            match msg.qos() {
                QoS::AtLeastOnce => {
                    let mut pending = self.pending.lock().unwrap();
                    pending.pending_pub.remove(publish_key(&msg), publish_key);
                    pending.pending_ack.insert(msg, publish_key);
                }
                QoS::ExactlyOnce => {
                    let mut pending = self.pending.lock().unwrap();
                    pending.pending_pub.remove(publish_key(&msg), publish_key);
                    pending.pending_rec.insert(msg, publish_key);
                }
                QoS::AtMostOnce => {}
            }
        }
    }

    /// Receives `msg` from this session's client. Returns `true` if it was
    /// handed to the router (not a duplicate, and authorized).
    pub fn receive_publish(&self, msg: &PublishPacket) -> bool {
        let is_dup = msg.qos() == QoS::ExactlyOnce
            && msg
                .packet_id()
                .is_some_and(|id| self.pending.lock().unwrap().pending_rel.index(id, pubrec_key).is_some());

        let delivered = if !is_dup && self.can_publish_to(msg.topic()) {
            self.deliver(msg.clone())
        } else {
            false
        };

        if let Some(id) = msg.packet_id() {
            match msg.qos() {
                QoS::AtMostOnce => {}
                QoS::AtLeastOnce => self.send_puback(id),
                QoS::ExactlyOnce => self.send_pubrec(id),
            }
        }
        delivered
    }

    pub fn send_puback(&self, id: PacketId) {
        self.send(Outgoing::PublishAck(PublishAckPacket::new(id)));
    }

    pub fn receive_puback(&self, id: PacketId) {
        self.pending.lock().unwrap().pending_ack.remove(id, publish_key);
    }

    pub fn send_pubrec(&self, id: PacketId) {
        let pubrec = PublishReceivedPacket::new(id);
        self.pending.lock().unwrap().pending_rel.insert(pubrec, pubrec_key);
        self.send(Outgoing::PublishReceived(pubrec));
    }

    pub fn receive_pubrec(&self, id: PacketId) {
        self.pending.lock().unwrap().pending_rec.remove(id, publish_key);
        self.send_pubrel(id);
    }

    pub fn send_pubrel(&self, id: PacketId) {
        let pubrel = PublishReleasePacket::new(id);
        self.pending.lock().unwrap().pending_comp.insert(pubrel, pubrel_key);
        self.send(Outgoing::PublishRelease(pubrel));
    }

    pub fn receive_pubrel(&self, id: PacketId) {
        self.pending.lock().unwrap().pending_rel.remove(id, pubrec_key);
        self.send_pubcomp(id);
    }

    pub fn send_pubcomp(&self, id: PacketId) {
        self.send(Outgoing::PublishComplete(PublishCompletePacket::new(id)));
    }

    pub fn receive_pubcomp(&self, id: PacketId) {
        self.pending.lock().unwrap().pending_comp.remove(id, pubrel_key);
    }

    /// Re-sends everything still outstanding, in the order required by
    /// MQTT-4.4.0-1: PUBRELs, then PUBLISHes awaiting PUBREC, then
    /// PUBLISHes awaiting PUBACK, then PUBLISHes never sent at all.
    pub fn resend_pending(&self) {
        let pending = self.pending.lock().unwrap();
        for mut msg in pending.pending_comp.iter().cloned().collect::<Vec<_>>() {
            msg.set_dup(true);
            self.send(Outgoing::PublishRelease(msg));
        }
        for mut msg in pending.pending_rec.iter().cloned().collect::<Vec<_>>() {
            msg.set_dup(true);
            self.send(Outgoing::Publish(msg));
        }
        for mut msg in pending.pending_ack.iter().cloned().collect::<Vec<_>>() {
            msg.set_dup(true);
            self.send(Outgoing::Publish(msg));
        }
        for msg in pending.pending_pub.iter().cloned().collect::<Vec<_>>() {
            self.send(Outgoing::Publish(msg));
        }
    }
}

/// A session handle compared and hashed by pointer identity rather than by
/// name: a subscription table must distinguish two distinct `Session`
/// instances that happen to share a client id after a clean-session replace.
#[derive(Clone)]
pub struct SessionHandle(pub Arc<Session>);

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SessionHandle {}

impl std::hash::Hash for SessionHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionHandle").field(&self.0.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        Session::new("client-1", SessionLimits::default())
    }

    #[tokio::test]
    async fn qos0_publish_is_sent_without_packet_id() {
        let s = session();
        let (tx, mut rx) = mpsc::channel(8);
        s.connect(tx);
        s.send_publish(PublishPacket::new("a/b", QoS::AtMostOnce, bytes::Bytes::from_static(b"hi")));
        match rx.recv().await.unwrap() {
            Outgoing::Publish(p) => assert!(p.packet_id().is_none()),
            _ => panic!("expected publish"),
        }
    }

    #[tokio::test]
    async fn qos1_publish_moves_from_pending_pub_to_pending_ack() {
        let s = session();
        let (tx, mut rx) = mpsc::channel(8);
        s.connect(tx);
        s.send_publish(PublishPacket::new("a/b", QoS::AtLeastOnce, bytes::Bytes::from_static(b"hi")));
        let id = match rx.recv().await.unwrap() {
            Outgoing::Publish(p) => p.packet_id().unwrap(),
            _ => panic!("expected publish"),
        };
        assert_eq!(s.pending.lock().unwrap().pending_pub.len(), 0);
        assert_eq!(s.pending.lock().unwrap().pending_ack.len(), 1);
        s.receive_puback(id);
        assert_eq!(s.pending.lock().unwrap().pending_ack.len(), 0);
    }

    #[tokio::test]
    async fn qos2_round_trip_drains_all_queues() {
        let s = session();
        let (tx, mut rx) = mpsc::channel(8);
        s.connect(tx);
        s.send_publish(PublishPacket::new("a/b", QoS::ExactlyOnce, bytes::Bytes::from_static(b"hi")));
        let id = match rx.recv().await.unwrap() {
            Outgoing::Publish(p) => p.packet_id().unwrap(),
            _ => panic!("expected publish"),
        };
        s.receive_pubrec(id);
        assert!(matches!(rx.recv().await.unwrap(), Outgoing::PublishRelease(_)));
        s.receive_pubcomp(id);
        assert_eq!(s.pending.lock().unwrap().pending_comp.len(), 0);
    }

    #[tokio::test]
    async fn resend_pending_emits_comp_then_rec_then_ack_then_pub() {
        let s = session();
        let (tx, mut rx) = mpsc::channel(16);
        s.connect(tx);
        s.send_publish(PublishPacket::new("a", QoS::AtLeastOnce, bytes::Bytes::from_static(b"1")));
        rx.recv().await.unwrap();
        s.send_publish(PublishPacket::new("b", QoS::ExactlyOnce, bytes::Bytes::from_static(b"2")));
        rx.recv().await.unwrap();

        s.resend_pending();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, Outgoing::Publish(p) if p.topic() == "b" && p.dup()));
        assert!(matches!(second, Outgoing::Publish(p) if p.topic() == "a" && p.dup()));
    }

    #[tokio::test]
    async fn disconnect_publishes_will_and_fires_on_disconnect() {
        let s = session();
        let (tx, _rx) = mpsc::channel(8);
        s.connect(tx);
        s.set_will("a/will", bytes::Bytes::from_static(b"bye"), QoS::AtMostOnce, false);
        let (delivery_tx, mut delivery_rx) = mpsc::channel(8);
        s.deliver_to(delivery_tx);

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        s.set_on_disconnect(move || fired_clone.store(true, Ordering::SeqCst));

        s.disconnect();
        assert!(fired.load(Ordering::SeqCst));
        let will = delivery_rx.recv().await.unwrap();
        assert_eq!(will.topic(), "a/will");
    }
}
