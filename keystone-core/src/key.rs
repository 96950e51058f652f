use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of the prefix used as a `KeyStore` lookup index.
///
/// `spec.md` §9 flags the source's prefix length as an open question ("whether
/// this is sufficient for key-namespace collision rates is not specified by
/// this layer"); resolved in `DESIGN.md` by pinning the figure the spec itself
/// quotes.
pub const KEY_LOOKUP_PREFIX_LEN: usize = 12;

/// An API key. Identity is `id`; `hash` is the bcrypt-family hash of the raw
/// secret, never the secret itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub user_id: String,
    pub hash: String,
    /// First `KEY_LOOKUP_PREFIX_LEN` characters of the raw key, used as a
    /// `KeyStore::get` index so verification never scans every key on disk.
    pub prefix: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Service-account keys that skip quota accounting entirely (stage 8).
    #[serde(default)]
    pub quota_bypass: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Key {
    /// A `Key` with `revoked_at` set or `expires_at <= now` is never valid
    /// (`spec.md` §3 invariants).
    pub fn is_valid(&self, now: DateTime<Utc>) -> Result<(), KeyValidityError> {
        if self.revoked_at.is_some() {
            return Err(KeyValidityError::Revoked);
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(KeyValidityError::Expired);
            }
        }
        Ok(())
    }

    /// Verify a presented raw key against this record's hash using a
    /// constant-time bcrypt verifier (`spec.md` §4.2 stage 5).
    pub fn verify(&self, raw_key: &str) -> bool {
        bcrypt::verify(raw_key, &self.hash).unwrap_or(false)
    }
}

/// Reason a `Key` failed validity, mapped to the stage-6 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyValidityError {
    Revoked,
    Expired,
}

/// Extract the lookup prefix from a raw key. Returns `None` if the key is
/// shorter than the configured prefix length (stage 3: key-format validation).
pub fn lookup_prefix(raw_key: &str) -> Option<&str> {
    if raw_key.len() < KEY_LOOKUP_PREFIX_LEN {
        None
    } else {
        Some(&raw_key[..KEY_LOOKUP_PREFIX_LEN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_key() -> Key {
        Key {
            id: "key_1".into(),
            user_id: "user_1".into(),
            hash: bcrypt::hash("ak_secret", 4).unwrap(),
            prefix: "ak_secret123".into(),
            expires_at: None,
            revoked_at: None,
            scopes: vec![],
            quota_bypass: false,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    #[test]
    fn revoked_key_is_never_valid() {
        let mut key = base_key();
        key.revoked_at = Some(Utc::now());
        assert_eq!(key.is_valid(Utc::now()), Err(KeyValidityError::Revoked));
    }

    #[test]
    fn expired_key_at_or_before_now_is_invalid() {
        let now = Utc::now();
        let mut key = base_key();
        key.expires_at = Some(now - chrono::Duration::hours(1));
        assert_eq!(key.is_valid(now), Err(KeyValidityError::Expired));

        key.expires_at = Some(now);
        assert_eq!(key.is_valid(now), Err(KeyValidityError::Expired));
    }

    #[test]
    fn non_expired_non_revoked_key_is_valid() {
        let now = Utc::now();
        let mut key = base_key();
        key.expires_at = Some(now + chrono::Duration::hours(1));
        assert_eq!(key.is_valid(now), Ok(()));
    }

    #[test]
    fn verify_accepts_matching_raw_key_and_rejects_others() {
        let key = base_key();
        assert!(key.verify("ak_secret"));
        assert!(!key.verify("wrong"));
    }

    #[test]
    fn lookup_prefix_requires_minimum_length() {
        assert_eq!(lookup_prefix("short"), None);
        let full = "ak_0123456789abcdef";
        let prefix = lookup_prefix(full).unwrap();
        assert_eq!(prefix.len(), KEY_LOOKUP_PREFIX_LEN);
        assert_eq!(prefix, &full[..KEY_LOOKUP_PREFIX_LEN]);
    }
}

impl std::fmt::Display for KeyValidityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValidityError::Revoked => write!(f, "revoked"),
            KeyValidityError::Expired => write!(f, "expired"),
        }
    }
}
