//! Authorization interface. The broker calls `Plugin::authenticate` once per
//! CONNECT; the returned [`Capability`] gates every subsequent publish and
//! subscribe on that session.

mod file_auth;
mod pwd;

use std::sync::Arc;

pub use file_auth::FileAuth;
pub use pwd::Password;

/// Per-client authorization capability, returned by a [`Plugin`].
pub trait Capability: Send + Sync {
    fn username(&self) -> &str;
    fn can_connect(&self) -> bool;
    fn can_publish_to(&self, topic: &str) -> bool;
    fn can_subscribe_to(&self, filter: &str) -> bool;
}

/// Authenticates a CONNECT and returns the resulting capability.
pub trait Plugin: Send + Sync {
    fn authenticate(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> Arc<dyn Capability>;
}

struct PermitAll {
    username: String,
}

impl Capability for PermitAll {
    fn username(&self) -> &str {
        &self.username
    }

    fn can_connect(&self) -> bool {
        true
    }

    fn can_publish_to(&self, _topic: &str) -> bool {
        true
    }

    fn can_subscribe_to(&self, _filter: &str) -> bool {
        true
    }
}

/// The default authorization plugin: permits every client, every topic.
pub struct NoAuth;

impl Plugin for NoAuth {
    fn authenticate(
        &self,
        _client_id: &str,
        username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> Arc<dyn Capability> {
        Arc::new(PermitAll {
            username: username.unwrap_or_default().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_auth_permits_everything() {
        let plugin = NoAuth;
        let cap = plugin.authenticate("client-1", Some("alice"), None);
        assert!(cap.can_connect());
        assert!(cap.can_publish_to("any/topic"));
        assert!(cap.can_subscribe_to("any/+/filter"));
        assert_eq!(cap.username(), "alice");
    }
}
