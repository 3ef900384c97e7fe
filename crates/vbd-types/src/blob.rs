use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::temporal::ObservedAt;

/// Opaque content address assigned by the external blob store.
///
/// A `BlobId` is never computed locally: the external store hands it out when
/// bytes are stored, and identical bytes always map to the same id. The only
/// local validation is that the id is non-empty and contains no whitespace,
/// which keeps it safe to embed in URLs and JSON commands.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Validate and wrap an id reported by the blob store.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::Empty { field: "blob id" });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidIdentifier {
                field: "blob id",
                value: id,
                reason: "must not contain whitespace".into(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short representation (first 8 characters) for logs and CLI output.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl TryFrom<String> for BlobId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

impl FromStr for BlobId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for BlobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for BlobId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BlobId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.short())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A blob id together with the time it was observed locally.
///
/// Deserialization also accepts the legacy form where an identifier was
/// written as a bare id string; such identifiers load with an unknown
/// observation time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BlobIdentifierRepr")]
pub struct BlobIdentifier {
    pub id: BlobId,
    pub observed_at: ObservedAt,
}

impl BlobIdentifier {
    pub fn new(id: BlobId, observed_at: ObservedAt) -> Self {
        Self { id, observed_at }
    }

    /// Identifier observed right now.
    pub fn observed_now(id: BlobId) -> Self {
        Self::new(id, ObservedAt::now())
    }

    /// Returns `true` if both identifiers address the same bytes.
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for BlobIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.observed_at)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlobIdentifierRepr {
    Bare(BlobId),
    Full {
        id: BlobId,
        #[serde(default)]
        observed_at: ObservedAt,
    },
}

impl From<BlobIdentifierRepr> for BlobIdentifier {
    fn from(repr: BlobIdentifierRepr) -> Self {
        match repr {
            BlobIdentifierRepr::Bare(id) => Self::new(id, ObservedAt::unknown()),
            BlobIdentifierRepr::Full { id, observed_at } => Self::new(id, observed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert_eq!(BlobId::new(""), Err(TypeError::Empty { field: "blob id" }));
        assert!(BlobId::new("has space").is_err());
        assert!(BlobId::new("tab\tid").is_err());
        assert!(BlobId::new("M4hsZGQ1oCktdzegB6HnI6Mi28S2nqOPHxK-W7_4BUk").is_ok());
    }

    #[test]
    fn short_truncates_to_eight_chars() {
        let id = BlobId::new("abcdefghijkl").unwrap();
        assert_eq!(id.short(), "abcdefgh");
        let short = BlobId::new("abc").unwrap();
        assert_eq!(short.short(), "abc");
    }

    #[test]
    fn compares_with_str() {
        let id = BlobId::new("b0").unwrap();
        assert_eq!(id, "b0");
        assert_eq!(id.to_string(), "b0");
    }

    #[test]
    fn serializes_as_string() {
        let id = BlobId::new("b1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"b1\"");
        assert!(serde_json::from_str::<BlobId>("\"\"").is_err());
    }

    #[test]
    fn identifier_serializes_as_object() {
        let ident = BlobIdentifier::new(BlobId::new("b1").unwrap(), ObservedAt::from_millis(7));
        let json = serde_json::to_value(&ident).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "b1", "observed_at": 7 }));
        let parsed: BlobIdentifier = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, ident);
    }

    #[test]
    fn identifier_accepts_legacy_bare_string() {
        let parsed: BlobIdentifier = serde_json::from_str("\"b0\"").unwrap();
        assert_eq!(parsed.id, "b0");
        assert!(parsed.observed_at.is_unknown());
    }

    #[test]
    fn identifier_without_timestamp_defaults_to_unknown() {
        let parsed: BlobIdentifier = serde_json::from_str(r#"{"id":"b2"}"#).unwrap();
        assert!(parsed.observed_at.is_unknown());
    }

    #[test]
    fn same_content_ignores_observation_time() {
        let id = BlobId::new("b3").unwrap();
        let a = BlobIdentifier::new(id.clone(), ObservedAt::from_millis(1));
        let b = BlobIdentifier::new(id, ObservedAt::from_millis(2));
        assert!(a.same_content(&b));
        assert_ne!(a, b);
    }
}
