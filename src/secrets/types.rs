//! Redacting wrapper for store tokens.
//!
//! Vault tokens travel through configuration, login responses and the
//! credential manager. Wrapping them keeps them out of `Debug`, `Display` and
//! serialized output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A token or other credential string that never prints itself.
///
/// - `Debug` shows `SecretString([REDACTED])`, `Display` shows `[REDACTED]`
/// - serializing writes `"[REDACTED]"`; deserializing reads the real value so
///   tokens can come from a config file
/// - the buffer is zeroed on drop
///
/// ```rust,ignore
/// use vault_inventory::secrets::SecretString;
///
/// let token = SecretString::new("hvs.CAESI...");
/// assert_eq!(format!("{}", token), "[REDACTED]");
/// let header_value = token.expose_secret();
/// ```
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the raw value, e.g. to put it in an `X-Vault-Token` header.
    /// Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_redacted_everywhere() {
        let token = SecretString::new("hvs.super-secret");

        assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
        assert_eq!(format!("{}", token), "[REDACTED]");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"[REDACTED]\"");
        assert_eq!(token.expose_secret(), "hvs.super-secret");
    }

    #[test]
    fn test_deserialize_keeps_value() {
        let token: SecretString = serde_json::from_str("\"s.from-config\"").unwrap();
        assert_eq!(token.expose_secret(), "s.from-config");
        assert_eq!(token.len(), 13);
        assert!(!token.is_empty());
    }

    #[test]
    fn test_redacted_inside_structs() {
        #[derive(Debug, Serialize)]
        struct Login {
            token: SecretString,
            ttl: u64,
        }

        let login = Login { token: SecretString::from("s.abc"), ttl: 3600 };
        let debug = format!("{:?}", login);
        assert!(!debug.contains("s.abc"));

        let json = serde_json::to_string(&login).unwrap();
        assert!(!json.contains("s.abc"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_is_empty() {
        assert!(SecretString::default().is_empty());
        assert_eq!(SecretString::from("a".to_string()), SecretString::new("a"));
    }
}
