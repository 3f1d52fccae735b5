//! Concurrent map from client id to [`Session`], with atomic
//! get-or-insert semantics for the clean-session=false reconnect path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::session::{Session, SessionLimits};

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    limits: SessionLimits,
}

impl SessionStore {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Creates a fresh session under `name`, deleting (and disconnecting)
    /// any prior session that held the name. Used for `clean_session=true`.
    pub fn new_session(&self, name: &str) -> Arc<Session> {
        let session = Session::new(name, self.limits);
        let old = self
            .sessions
            .lock()
            .unwrap()
            .insert(name.to_string(), session.clone());
        if let Some(old) = old {
            old.delete();
        }
        session
    }

    /// Returns the existing session under `name`, or inserts and returns a
    /// fresh one. The bool is `true` if a session already existed.
    pub fn get_or_new(&self, name: &str) -> (Arc<Session>, bool) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(existing) = sessions.get(name) {
            return (existing.clone(), true);
        }
        let session = Session::new(name, self.limits);
        sessions.insert(name.to_string(), session.clone());
        (session, false)
    }

    /// Removes and deletes the session under `name`, if any.
    pub fn delete(&self, name: &str) {
        let removed = self.sessions.lock().unwrap().remove(name);
        if let Some(session) = removed {
            session.delete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_replaces_and_deletes_the_old_one() {
        let store = SessionStore::new(SessionLimits::default());
        let first = store.new_session("client-1");
        first.set_persistent();
        let second = store.new_session("client-1");
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.persistent());
    }

    #[test]
    fn get_or_new_reports_whether_a_session_already_existed() {
        let store = SessionStore::new(SessionLimits::default());
        let (first, existed) = store.get_or_new("client-1");
        assert!(!existed);
        let (second, existed) = store.get_or_new("client-1");
        assert!(existed);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn delete_removes_the_session() {
        let store = SessionStore::new(SessionLimits::default());
        store.new_session("client-1");
        store.delete("client-1");
        let (_session, existed) = store.get_or_new("client-1");
        assert!(!existed);
    }
}
