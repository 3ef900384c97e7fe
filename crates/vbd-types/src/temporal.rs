use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock stamp recorded when a blob identifier is first observed locally.
///
/// The stamp is metadata only: it never participates in content addressing
/// and two identifiers with the same id denote the same bytes no matter when
/// they were observed. Serialized as a bare integer of milliseconds since the
/// UNIX epoch.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObservedAt(u64);

impl ObservedAt {
    /// Create a stamp from explicit milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Stamp for the current wall-clock time.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    /// The unknown stamp. Legacy documents that never recorded an
    /// observation time load with this value.
    pub const fn unknown() -> Self {
        Self(0)
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == 0
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ObservedAt {
    fn from(ms: u64) -> Self {
        Self(ms)
    }
}

impl fmt::Debug for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObservedAt({}ms)", self.0)
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_millis() {
        assert!(ObservedAt::from_millis(10) < ObservedAt::from_millis(20));
        assert_eq!(ObservedAt::from_millis(5), ObservedAt::from(5));
    }

    #[test]
    fn now_produces_reasonable_timestamp() {
        // Should be after 2020-01-01 (1577836800000 ms)
        assert!(ObservedAt::now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn unknown_is_smallest() {
        assert!(ObservedAt::unknown().is_unknown());
        assert!(ObservedAt::unknown() < ObservedAt::from_millis(1));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&ObservedAt::from_millis(1234)).unwrap();
        assert_eq!(json, "1234");
        let parsed: ObservedAt = serde_json::from_str("1234").unwrap();
        assert_eq!(parsed.as_millis(), 1234);
    }

    #[test]
    fn display_format() {
        assert_eq!(ObservedAt::from_millis(42).to_string(), "42ms");
    }
}
