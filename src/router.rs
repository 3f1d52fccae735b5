//! Publish router: consumes the process-wide publish channel, retains and
//! matches each message, and fans it out to every matched subscription.

use std::sync::Arc;

use codec::PublishPacket;
use tokio::sync::mpsc;

use crate::retained::RetainedStore;
use crate::subscription::SubscriptionTable;
use crate::topic::TopicRegistry;

/// Default capacity of the publish channel. Producers never block on a
/// full channel; a lagging router drops the message and the per-session
/// `PublishQueueLimit`/`InFlightLimit` protect slow subscribers instead.
pub const PUBLISH_CHANNEL_CAPACITY: usize = 512;

pub struct Router {
    topics: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionTable>,
    retained: Arc<RetainedStore>,
}

impl Router {
    #[must_use]
    pub fn new(
        topics: Arc<TopicRegistry>,
        subscriptions: Arc<SubscriptionTable>,
        retained: Arc<RetainedStore>,
    ) -> Self {
        Self {
            topics,
            subscriptions,
            retained,
        }
    }

    /// Creates the bounded publish channel feeding this router.
    #[must_use]
    pub fn channel() -> (mpsc::Sender<PublishPacket>, mpsc::Receiver<PublishPacket>) {
        mpsc::channel(PUBLISH_CHANNEL_CAPACITY)
    }

    /// Routes a single message: retains it if needed, matches subscribers,
    /// and delivers a copy to each. Multiple workers may call this
    /// concurrently off the same channel; per-worker dispatch order to its
    /// own matched subscriptions is preserved, but no ordering is promised
    /// between workers.
    pub fn route_one(&self, msg: PublishPacket) {
        let matched_topics = self.topics.matches(msg.topic());
        if msg.retain() {
            let topic = self.topics.get(msg.topic());
            self.retained.retain(topic, msg.clone());
        }
        let subscriptions = self.subscriptions.topic_subscriptions(&matched_topics);
        log::info!(
            "publish topic={} matching_topics={} matching_subscriptions={}",
            msg.topic(),
            matched_topics.len(),
            subscriptions.len(),
        );
        for subscription in subscriptions {
            subscription.deliver(&msg);
        }
    }

    /// Drains `rx` until the last sender is dropped. Intended to run on its
    /// own task; run several concurrently to parallelize routing.
    pub async fn run(&self, mut rx: mpsc::Receiver<PublishPacket>) {
        while let Some(msg) = rx.recv().await {
            self.route_one(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionLimits};
    use codec::QoS;

    #[tokio::test]
    async fn route_one_delivers_to_matching_subscribers() {
        let topics = Arc::new(TopicRegistry::new());
        let subscriptions = Arc::new(SubscriptionTable::new());
        let retained = Arc::new(RetainedStore::new());
        let router = Router::new(topics.clone(), subscriptions.clone(), retained.clone());

        let session = Session::new("client-1", SessionLimits::default());
        let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(8);
        session.connect(out_tx);
        let topic = topics.get("a/b");
        subscriptions.subscribe(session.clone(), topic, QoS::AtMostOnce);

        router.route_one(PublishPacket::new("a/b", QoS::AtMostOnce, bytes::Bytes::from_static(b"hi")));

        let delivered = out_rx.recv().await.unwrap();
        assert!(matches!(delivered, crate::session::Outgoing::Publish(p) if p.topic() == "a/b"));
    }

    #[tokio::test]
    async fn route_one_retains_when_flagged() {
        let topics = Arc::new(TopicRegistry::new());
        let subscriptions = Arc::new(SubscriptionTable::new());
        let retained = Arc::new(RetainedStore::new());
        let router = Router::new(topics.clone(), subscriptions.clone(), retained.clone());

        let mut msg = PublishPacket::new("t", QoS::AtMostOnce, bytes::Bytes::from_static(b"x"));
        msg.set_retain(true);
        router.route_one(msg);

        let topic = topics.get("t");
        assert_eq!(retained.retained(&[topic]).len(), 1);
    }
}
