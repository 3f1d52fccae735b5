//! Password-file backed [`Plugin`]. Loads a `username:$6$salt$hash` file at
//! startup and checks CONNECT credentials against it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::pwd::Password;
use super::{Capability, Plugin};
use crate::error::{Error, ErrorKind};

struct FileCapability {
    username: String,
    granted: bool,
}

impl Capability for FileCapability {
    fn username(&self) -> &str {
        &self.username
    }

    fn can_connect(&self) -> bool {
        self.granted
    }

    fn can_publish_to(&self, _topic: &str) -> bool {
        self.granted
    }

    fn can_subscribe_to(&self, _filter: &str) -> bool {
        self.granted
    }
}

/// Authenticates CONNECT `username`/`password` against entries loaded from a
/// passwd file. A client whose username is absent from the file, or whose
/// password does not match, is refused `can_connect`.
pub struct FileAuth {
    users: HashMap<String, Password>,
}

impl FileAuth {
    /// Loads and parses every entry in `path`, skipping blank and `#`
    /// comment lines.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|err| {
            Error::new(
                ErrorKind::ConfigError,
                format!("reading passwd file {:?}: {err}", path.as_ref()),
            )
        })?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, Error> {
        let mut users = HashMap::new();
        for line in contents.lines() {
            if let Some((username, password)) = Password::parse_line(line)? {
                users.insert(username, password);
            }
        }
        Ok(Self { users })
    }
}

impl Plugin for FileAuth {
    fn authenticate(
        &self,
        _client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> Arc<dyn Capability> {
        let username = username.unwrap_or_default();
        let granted = match (self.users.get(username), password) {
            (Some(entry), Some(password)) => entry.is_match(password).unwrap_or(false),
            _ => false,
        };
        Arc::new(FileCapability {
            username: username.to_string(),
            granted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> String {
        let entry = Password::generate(b"hunter2").unwrap();
        format!("# comment\n\n{}\n", entry.dump("alice"))
    }

    #[test]
    fn known_user_with_correct_password_is_granted() {
        let auth = FileAuth::parse(&sample_file()).unwrap();
        let cap = auth.authenticate("client-1", Some("alice"), Some(b"hunter2"));
        assert!(cap.can_connect());
    }

    #[test]
    fn wrong_password_is_refused() {
        let auth = FileAuth::parse(&sample_file()).unwrap();
        let cap = auth.authenticate("client-1", Some("alice"), Some(b"wrong"));
        assert!(!cap.can_connect());
    }

    #[test]
    fn unknown_user_is_refused() {
        let auth = FileAuth::parse(&sample_file()).unwrap();
        let cap = auth.authenticate("client-1", Some("bob"), Some(b"hunter2"));
        assert!(!cap.can_connect());
    }
}
