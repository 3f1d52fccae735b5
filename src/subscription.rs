//! Subscription table: the dual session↔topic index, and per-subscription
//! fan-out delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use codec::{PublishPacket, QoS};

use crate::session::{Session, SessionHandle};
use crate::topic::TopicHandle;

fn qos_to_u8(qos: QoS) -> u8 {
    qos.into()
}

fn qos_from_u8(byte: u8) -> QoS {
    QoS::from_u8(byte).unwrap_or(QoS::AtMostOnce)
}

/// A session's subscription to a single topic handle, at a given QoS.
/// The QoS is mutated in place when a client re-subscribes to the same
/// filter, without disturbing either index.
pub struct Subscription {
    session: SessionHandle,
    topic: TopicHandle,
    qos: AtomicU8,
}

impl Subscription {
    fn new(session: SessionHandle, topic: TopicHandle, qos: QoS) -> Self {
        Self {
            session,
            topic,
            qos: AtomicU8::new(qos_to_u8(qos)),
        }
    }

    #[must_use]
    pub fn qos(&self) -> QoS {
        qos_from_u8(self.qos.load(Ordering::SeqCst))
    }

    fn set_qos(&self, qos: QoS) {
        self.qos.store(qos_to_u8(qos), Ordering::SeqCst);
    }

    /// Delivers a copy of `msg` to this subscription's session, downgrading
    /// QoS to the minimum of the publish's QoS and the subscription's grant.
    pub fn deliver(&self, msg: &PublishPacket) {
        let qos = std::cmp::min(msg.qos(), self.qos());
        let mut copy = PublishPacket::new(msg.topic(), qos, msg.payload().clone());
        copy.set_retain(msg.retain());
        self.session.0.send_publish(copy);
    }
}

#[derive(Default)]
struct Inner {
    by_session: HashMap<SessionHandle, HashMap<TopicHandle, Arc<Subscription>>>,
    by_topic: HashMap<TopicHandle, HashMap<SessionHandle, Arc<Subscription>>>,
}

/// Tracks every session's subscriptions, indexed both by session and by
/// topic, kept mutually consistent under a single reader/writer lock.
#[derive(Default)]
pub struct SubscriptionTable {
    inner: RwLock<Inner>,
}

impl SubscriptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `session` to `topic` at `qos`. If the pair already
    /// exists, updates its QoS grant in place and returns it unchanged.
    pub fn subscribe(
        &self,
        session: Arc<Session>,
        topic: TopicHandle,
        qos: QoS,
    ) -> Arc<Subscription> {
        let handle = SessionHandle(session);
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner
            .by_session
            .get(&handle)
            .and_then(|topics| topics.get(&topic))
        {
            existing.set_qos(qos);
            return existing.clone();
        }

        let subscription = Arc::new(Subscription::new(handle.clone(), topic.clone(), qos));
        inner
            .by_session
            .entry(handle.clone())
            .or_default()
            .insert(topic.clone(), subscription.clone());
        inner
            .by_topic
            .entry(topic)
            .or_default()
            .insert(handle, subscription.clone());
        subscription
    }

    /// Unsubscribes `session` from `topics`, or from everything it holds
    /// if `topics` is empty.
    pub fn unsubscribe(&self, session: &Arc<Session>, topics: &[TopicHandle]) {
        let handle = SessionHandle(session.clone());
        let mut inner = self.inner.write().unwrap();

        let targets: Vec<TopicHandle> = if topics.is_empty() {
            inner
                .by_session
                .get(&handle)
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default()
        } else {
            topics.to_vec()
        };

        for topic in targets {
            let mut drop_session_row = false;
            if let Some(session_row) = inner.by_session.get_mut(&handle) {
                session_row.remove(&topic);
                drop_session_row = session_row.is_empty();
            }
            if drop_session_row {
                inner.by_session.remove(&handle);
            }

            let mut drop_topic_row = false;
            if let Some(topic_row) = inner.by_topic.get_mut(&topic) {
                topic_row.remove(&handle);
                drop_topic_row = topic_row.is_empty();
            }
            if drop_topic_row {
                inner.by_topic.remove(&topic);
            }
        }
    }

    #[must_use]
    pub fn session_subscriptions(&self, session: &Arc<Session>) -> Vec<Arc<Subscription>> {
        let handle = SessionHandle(session.clone());
        self.inner
            .read()
            .unwrap()
            .by_session
            .get(&handle)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the union of every subscription across `topics`.
    #[must_use]
    pub fn topic_subscriptions(&self, topics: &[TopicHandle]) -> Vec<Arc<Subscription>> {
        let inner = self.inner.read().unwrap();
        topics
            .iter()
            .filter_map(|topic| inner.by_topic.get(topic))
            .flat_map(|m| m.values().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionLimits;
    use crate::topic::TopicRegistry;

    #[test]
    fn subscribe_twice_updates_qos_in_place() {
        let registry = TopicRegistry::new();
        let table = SubscriptionTable::new();
        let session = Session::new("client-1", SessionLimits::default());
        let topic = registry.get("a/b");

        table.subscribe(session.clone(), topic.clone(), QoS::AtMostOnce);
        let sub = table.subscribe(session.clone(), topic.clone(), QoS::ExactlyOnce);
        assert_eq!(sub.qos(), QoS::ExactlyOnce);
        assert_eq!(table.session_subscriptions(&session).len(), 1);
    }

    #[test]
    fn unsubscribe_drops_empty_rows_from_both_indices() {
        let registry = TopicRegistry::new();
        let table = SubscriptionTable::new();
        let session = Session::new("client-1", SessionLimits::default());
        let topic = registry.get("a/b");

        table.subscribe(session.clone(), topic.clone(), QoS::AtMostOnce);
        table.unsubscribe(&session, &[topic.clone()]);
        assert!(table.session_subscriptions(&session).is_empty());
        assert!(table.topic_subscriptions(&[topic]).is_empty());
    }

    #[test]
    fn unsubscribe_with_empty_list_clears_everything() {
        let registry = TopicRegistry::new();
        let table = SubscriptionTable::new();
        let session = Session::new("client-1", SessionLimits::default());
        let a = registry.get("a");
        let b = registry.get("b");

        table.subscribe(session.clone(), a, QoS::AtMostOnce);
        table.subscribe(session.clone(), b, QoS::AtMostOnce);
        table.unsubscribe(&session, &[]);
        assert!(table.session_subscriptions(&session).is_empty());
    }
}
