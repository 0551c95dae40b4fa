//! Destination-domain newtype
//!
//! A cheap, `Arc`-backed wrapper around the recipient domain extracted from
//! a `To` header. Always stored lowercased so it can be used directly as a
//! cache-key component and as a map key without re-normalizing at every
//! call site.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Domain(Arc<str>);

impl Domain {
    #[must_use]
    pub fn new(domain: impl AsRef<str>) -> Self {
        Self(Arc::from(domain.as_ref().trim().to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Arc<str> {
        self.0
    }

    /// Extract the domain portion of an RFC 5322 address, stripping any
    /// display name and angle brackets.
    ///
    /// # Errors
    /// Returns an error if the address has no `@`.
    pub fn from_address(address: &str) -> Result<Self, InvalidAddress> {
        let trimmed = address.trim().trim_start_matches('<').trim_end_matches('>');
        let trimmed = trimmed.trim();
        match trimmed.rsplit_once('@') {
            Some((_, domain)) => Ok(Self::new(domain)),
            None => Err(InvalidAddress(address.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("address {0:?} has no domain part")]
pub struct InvalidAddress(String);

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Domain {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Domain {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Domain> for Arc<str> {
    fn from(value: Domain) -> Self {
        value.0
    }
}

impl serde::Serialize for Domain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Domain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_on_construction() {
        assert_eq!(Domain::new("Example.COM").as_str(), "example.com");
    }

    #[test]
    fn extracts_from_bare_address() {
        assert_eq!(
            Domain::from_address("user@example.com").unwrap().as_str(),
            "example.com"
        );
    }

    #[test]
    fn extracts_from_angle_bracket_address() {
        assert_eq!(
            Domain::from_address("  <User@Example.COM>  ")
                .unwrap()
                .as_str(),
            "example.com"
        );
    }

    #[test]
    fn rejects_address_without_at() {
        assert!(Domain::from_address("not-an-address").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let domain = Domain::new("example.com");
        let json = serde_json::to_string(&domain).unwrap();
        let back: Domain = serde_json::from_str(&json).unwrap();
        assert_eq!(domain, back);
    }
}
