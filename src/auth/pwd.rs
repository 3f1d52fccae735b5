// Salted-hash password entries, format `username:$6$<b64 salt>$<b64 hash>`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use openssl::hash::{Hasher, MessageDigest};
use rand::Rng;

use crate::error::{Error, ErrorKind};

const SALT_LEN: usize = 12;
const HASH_LEN: usize = 64;
const PW_SHA512: u32 = 6;

/// A salted SHA-512 password hash, parsed from or dumped to a passwd-file
/// line of the form `username:$6$<base64 salt>$<base64 hash>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Password {
    salt: [u8; SALT_LEN],
    hash: [u8; HASH_LEN],
}

impl Password {
    /// Hashes `password` against a freshly generated random salt.
    pub fn generate(password: &[u8]) -> Result<Self, Error> {
        let salt: [u8; SALT_LEN] = rand::rng().random();
        let hash = Self::compute_hash(password, &salt)?;
        Ok(Self { salt, hash })
    }

    fn compute_hash(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<[u8; HASH_LEN], Error> {
        let mut hasher = Hasher::new(MessageDigest::sha512())
            .map_err(|err| Error::new(ErrorKind::Internal, format!("openssl: {err}")))?;
        hasher
            .update(password)
            .and_then(|()| hasher.update(salt))
            .map_err(|err| Error::new(ErrorKind::Internal, format!("openssl: {err}")))?;
        let digest = hasher
            .finish()
            .map_err(|err| Error::new(ErrorKind::Internal, format!("openssl: {err}")))?;
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(digest.as_ref());
        Ok(hash)
    }

    /// Parses a single `username:$6$salt$hash` line. Returns `None` for
    /// blank lines and `#`-prefixed comments.
    pub fn parse_line(line: &str) -> Result<Option<(String, Self)>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (username, rest) = line
            .split_once(':')
            .ok_or_else(|| Error::new(ErrorKind::ConfigError, format!("malformed entry: {line:?}")))?;
        if username.is_empty() {
            return Err(Error::new(
                ErrorKind::ConfigError,
                format!("empty username in entry: {line:?}"),
            ));
        }
        let parts: Vec<&str> = rest.split('$').collect();
        if parts.len() != 4 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                format!("malformed password field: {rest:?}"),
            ));
        }
        let scheme: u32 = parts[1]
            .parse()
            .map_err(|_err| Error::new(ErrorKind::ConfigError, "unknown hash scheme"))?;
        if scheme != PW_SHA512 {
            return Err(Error::new(ErrorKind::ConfigError, "unsupported hash scheme"));
        }
        let salt_bytes = BASE64
            .decode(parts[2])
            .map_err(|err| Error::new(ErrorKind::ConfigError, format!("bad salt: {err}")))?;
        let hash_bytes = BASE64
            .decode(parts[3])
            .map_err(|err| Error::new(ErrorKind::ConfigError, format!("bad hash: {err}")))?;
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&salt_bytes);
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&hash_bytes);
        Ok(Some((username.to_string(), Self { salt, hash })))
    }

    /// Renders this entry back to its passwd-file line form.
    #[must_use]
    pub fn dump(&self, username: &str) -> String {
        format!(
            "{username}:${PW_SHA512}${}${}",
            BASE64.encode(self.salt),
            BASE64.encode(self.hash),
        )
    }

    pub fn is_match(&self, password: &[u8]) -> Result<bool, Error> {
        let candidate = Self::compute_hash(password, &self.salt)?;
        Ok(candidate == self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_and_reparse_round_trips() {
        let entry = Password::generate(b"hunter2").unwrap();
        let line = entry.dump("alice");
        let (username, reparsed) = Password::parse_line(&line).unwrap().unwrap();
        assert_eq!(username, "alice");
        assert_eq!(reparsed, entry);
    }

    #[test]
    fn is_match_checks_the_password() {
        let entry = Password::generate(b"hunter2").unwrap();
        assert!(entry.is_match(b"hunter2").unwrap());
        assert!(!entry.is_match(b"wrong").unwrap());
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        assert!(Password::parse_line("").unwrap().is_none());
        assert!(Password::parse_line("# comment").unwrap().is_none());
    }
}
