//! Ordered, packet-identifier-keyed queues used by a session's five QoS
//! pipelines.

use codec::PacketId;

/// A sequence sorted by packet-identifier, with no two entries sharing an id.
#[derive(Debug, Default)]
pub struct PendingQueue<T> {
    entries: Vec<T>,
}

impl<T> PendingQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Position of the entry with the given id, if present.
    pub fn index(&self, id: PacketId, key: impl Fn(&T) -> PacketId) -> Option<usize> {
        self.entries
            .binary_search_by_key(&id, key)
            .ok()
    }

    /// Inserts `msg`, keeping the queue sorted by id. An existing entry with
    /// the same id is replaced in place rather than duplicated.
    pub fn insert(&mut self, msg: T, key: impl Fn(&T) -> PacketId) {
        let id = key(&msg);
        match self.entries.binary_search_by_key(&id, &key) {
            Ok(pos) => self.entries[pos] = msg,
            Err(pos) => self.entries.insert(pos, msg),
        }
    }

    /// Removes and returns the entry with the given id, if present.
    pub fn remove(&mut self, id: PacketId, key: impl Fn(&T) -> PacketId) -> Option<T> {
        match self.entries.binary_search_by_key(&id, key) {
            Ok(pos) => Some(self.entries.remove(pos)),
            Err(_) => None,
        }
    }

    /// Drops the oldest entries until at most `limit` remain.
    pub fn truncate_front(&mut self, limit: usize) {
        if self.entries.len() > limit {
            let drop_count = self.entries.len() - limit;
            self.entries.drain(0..drop_count);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.entries.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Msg(PacketId);

    fn key(m: &Msg) -> PacketId {
        m.0
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut q: PendingQueue<Msg> = PendingQueue::new();
        q.insert(Msg(5), key);
        q.insert(Msg(1), key);
        q.insert(Msg(3), key);
        let ids: Vec<PacketId> = q.iter().map(|m| m.0).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn insert_of_existing_id_replaces_in_place() {
        let mut q: PendingQueue<Msg> = PendingQueue::new();
        q.insert(Msg(1), key);
        q.insert(Msg(1), key);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_missing_id_is_none() {
        let mut q: PendingQueue<Msg> = PendingQueue::new();
        q.insert(Msg(1), key);
        assert!(q.remove(2, key).is_none());
        assert_eq!(q.remove(1, key), Some(Msg(1)));
        assert!(q.is_empty());
    }

    #[test]
    fn truncate_front_drops_oldest() {
        let mut q: PendingQueue<Msg> = PendingQueue::new();
        for id in 1..=5u16 {
            q.insert(Msg(id), key);
        }
        q.truncate_front(3);
        let ids: Vec<PacketId> = q.iter().map(|m| m.0).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }
}
