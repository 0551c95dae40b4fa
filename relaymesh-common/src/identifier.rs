//! Envelope identifiers and delivery tokens
//!
//! `Mail.identifier` is externally supplied or generated; when we generate
//! one ourselves we emit a short, URL-safe base64 encoding of a UUIDv4's raw
//! bytes rather than the 36-character hyphenated form. Delivery tokens are
//! purely internal (never observed outside the cache) and are minted as
//! plain UUIDs, matching the reference implementation's `uuid.uuid4()` use.

use base64::Engine as _;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MailId(String);

impl MailId {
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(uuid.as_bytes()))
    }

    /// Accept an externally-supplied identifier verbatim.
    #[must_use]
    pub fn from_external(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for MailId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for MailId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

/// A one-time delivery token minted by the router to guard against
/// duplicate or superseded delivery tasks (§4.6, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryToken(uuid::Uuid);

impl DeliveryToken {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeliveryToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_and_unique() {
        let a = MailId::generate();
        let b = MailId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().len() <= 22);
    }

    #[test]
    fn external_ids_preserved_verbatim() {
        let id = MailId::from_external("upstream-provided-id-123");
        assert_eq!(id.as_str(), "upstream-provided-id-123");
    }

    #[test]
    fn tokens_roundtrip_through_display_and_parse() {
        let token = DeliveryToken::generate();
        let parsed: DeliveryToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn distinct_tokens_compare_unequal() {
        assert_ne!(DeliveryToken::generate(), DeliveryToken::generate());
    }
}
