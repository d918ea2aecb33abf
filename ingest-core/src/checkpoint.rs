//! Opaque source checkpoints
//!
//! A checkpoint captures the state of a source as of its last successful
//! poll. Drivers store and hand it back verbatim; only the source that
//! produced it interprets it. Composite checkpoints join freshness markers
//! with [`CHECKPOINT_DELIMITER`], primary marker first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between markers of a composite checkpoint
pub const CHECKPOINT_DELIMITER: char = ';';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(String);

impl Checkpoint {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Join whichever markers are present. A single marker is used alone,
    /// without a trailing delimiter; no markers yields `None`.
    pub fn from_markers(primary: Option<&str>, secondary: Option<&str>) -> Option<Self> {
        let markers: Vec<&str> = [primary, secondary]
            .into_iter()
            .flatten()
            .filter(|m| !m.is_empty())
            .collect();

        if markers.is_empty() {
            None
        } else {
            Some(Self(markers.join(&CHECKPOINT_DELIMITER.to_string())))
        }
    }

    /// Split into `(primary, secondary)` markers.
    ///
    /// A lone marker that looks like an entity tag (`"..."` or `W/"..."`) is
    /// reported as secondary; any other lone marker is primary.
    pub fn markers(&self) -> (Option<&str>, Option<&str>) {
        let token = self.0.as_str();
        if token.is_empty() {
            return (None, None);
        }
        if looks_like_etag(token) {
            return (None, Some(token));
        }
        match token.split_once(CHECKPOINT_DELIMITER) {
            Some((primary, secondary)) => (non_empty(primary), non_empty(secondary)),
            None => (Some(token), None),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn looks_like_etag(marker: &str) -> bool {
    marker.starts_with('"') || marker.starts_with("W/\"")
}

fn non_empty(marker: &str) -> Option<&str> {
    if marker.is_empty() {
        None
    } else {
        Some(marker)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Checkpoint {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Checkpoint {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_markers() {
        assert_eq!(
            Checkpoint::from_markers(Some("test"), Some("\"test\"")).unwrap().as_str(),
            "test;\"test\""
        );
        assert_eq!(
            Checkpoint::from_markers(Some("test"), None).unwrap().as_str(),
            "test"
        );
        assert_eq!(
            Checkpoint::from_markers(None, Some("\"abc\"")).unwrap().as_str(),
            "\"abc\""
        );
        assert!(Checkpoint::from_markers(None, None).is_none());
        assert!(Checkpoint::from_markers(Some(""), None).is_none());
    }

    #[test]
    fn test_markers() {
        let both = Checkpoint::new("Wed, 21 Oct 2015 07:28:00 GMT;\"33a64df5\"");
        assert_eq!(
            both.markers(),
            (Some("Wed, 21 Oct 2015 07:28:00 GMT"), Some("\"33a64df5\""))
        );
        assert_eq!(Checkpoint::new("test").markers(), (Some("test"), None));
        assert_eq!(Checkpoint::new("W/\"a;b\"").markers(), (None, Some("W/\"a;b\"")));
        assert_eq!(Checkpoint::new("").markers(), (None, None));
    }

    #[test]
    fn test_serde_transparent() {
        let checkpoint = Checkpoint::new("test;\"test\"");
        let json = serde_json::to_string(&checkpoint).unwrap();
        assert_eq!(json, "\"test;\\\"test\\\"\"");
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }
}
