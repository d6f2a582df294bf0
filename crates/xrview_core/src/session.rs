//! Reviewer session identity.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::seed::Seed;

/// Identifier for one reviewer session.
///
/// Persisted feedback is keyed by session id
/// (`feedback/feedback_<session_id>.json`), so ids from different
/// sessions never collide at the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id from a caller-supplied string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSessionId`] if the id is empty or
    /// contains characters outside `[A-Za-z0-9_-]` (the id is embedded
    /// in a storage key).
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidSessionId {
                got: id,
                reason: "empty".to_string(),
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::InvalidSessionId {
                got: id,
                reason: "only [A-Za-z0-9_-] allowed".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Generate a session id from a seed.
    ///
    /// The same seed always yields the same id, which keeps test
    /// fixtures and replayed sessions stable.
    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let mut rng = seed.derive("session-id").to_rng();
        let id: String = (0..16)
            .map(|_| {
                let n: u8 = rng.gen_range(0..16);
                char::from_digit(u32::from(n), 16).unwrap_or('0')
            })
            .collect();
        Self(id)
    }

    /// Generate a fresh session id from system entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::from_seed(Seed::from_entropy())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_accepts_safe_chars() {
        assert!(SessionId::new("abc-123_XYZ").is_ok());
    }

    #[test]
    fn test_session_id_rejects_empty() {
        assert!(SessionId::new("").is_err());
    }

    #[test]
    fn test_session_id_rejects_path_chars() {
        assert!(SessionId::new("a/b").is_err());
        assert!(SessionId::new("a b").is_err());
    }

    #[test]
    fn test_session_id_from_seed_is_stable() {
        let a = SessionId::from_seed(Seed::new(7));
        let b = SessionId::from_seed(Seed::new(7));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_session_id_serde_transparent() {
        let id = SessionId::from_seed(Seed::new(1));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));
    }
}
