//! Retained-message store: topic handle → last PUBLISH with RETAIN set.

use std::collections::HashMap;
use std::sync::RwLock;

use codec::PublishPacket;

use crate::topic::TopicHandle;

#[derive(Default)]
pub struct RetainedStore {
    messages: RwLock<HashMap<TopicHandle, PublishPacket>>,
}

impl RetainedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `msg` under `topic` if its payload is non-empty, otherwise
    /// clears any existing entry. No-op unless `msg.retain()` is set;
    /// callers are expected to check that before calling.
    pub fn retain(&self, topic: TopicHandle, msg: PublishPacket) {
        let mut messages = self.messages.write().unwrap();
        if msg.payload().is_empty() {
            messages.remove(&topic);
        } else {
            messages.insert(topic, msg);
        }
    }

    /// Returns the retained message for each of `topics` that has one, in
    /// input order, skipping topics with no entry.
    #[must_use]
    pub fn retained(&self, topics: &[TopicHandle]) -> Vec<PublishPacket> {
        let messages = self.messages.read().unwrap();
        topics
            .iter()
            .filter_map(|topic| messages.get(topic).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::TopicRegistry;
    use codec::QoS;

    #[test]
    fn retain_then_clear_round_trips() {
        let registry = TopicRegistry::new();
        let store = RetainedStore::new();
        let topic = registry.get("t");

        let mut msg = PublishPacket::new("t", QoS::AtMostOnce, bytes::Bytes::from_static(b"x"));
        msg.set_retain(true);
        store.retain(topic.clone(), msg);
        assert_eq!(store.retained(&[topic.clone()]).len(), 1);

        let mut clear = PublishPacket::new("t", QoS::AtMostOnce, bytes::Bytes::new());
        clear.set_retain(true);
        store.retain(topic.clone(), clear);
        assert!(store.retained(&[topic]).is_empty());
    }

    #[test]
    fn retained_skips_topics_with_no_entry() {
        let registry = TopicRegistry::new();
        let store = RetainedStore::new();
        let a = registry.get("a");
        let b = registry.get("b");

        let mut msg = PublishPacket::new("a", QoS::AtMostOnce, bytes::Bytes::from_static(b"x"));
        msg.set_retain(true);
        store.retain(a.clone(), msg);

        assert_eq!(store.retained(&[a, b]).len(), 1);
    }
}
