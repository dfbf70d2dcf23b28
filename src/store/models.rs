use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::Type;
use std::fmt;

/// Separator between an owner account and its embedded memo annotation.
///
/// The separator is not escaped. Splitting at the first occurrence keeps a
/// '|' inside the memo payload intact, but the encoding stays lossy if the
/// account segment ever contained one. Kept for compatibility with records
/// written by earlier deployments.
pub const ANNOTATION_SEPARATOR: char = '|';

/// Target ledger network - selects the client and signing credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "network_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Production,
    Test,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Production => "production",
            Network::Test => "test",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered escrow release awaiting a finish attempt.
///
/// The natural key is (base identity, sequence, network); `due_at` and
/// `network` are immutable once stored. Records are only ever deleted, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReleaseRecord {
    /// Owner account, optionally carrying a serialized memo appended with
    /// [`ANNOTATION_SEPARATOR`]
    pub identity: String,
    /// Sequence of the escrow under `identity` being finished
    pub sequence: i64,
    /// Point in time after which finalization is permitted
    pub due_at: DateTime<Utc>,
    pub network: Network,
}

impl ReleaseRecord {
    /// Owner account with any memo annotation stripped
    pub fn base_identity(&self) -> &str {
        split_annotation(&self.identity).0
    }

    pub fn annotation(&self) -> Option<&str> {
        split_annotation(&self.identity).1
    }
}

/// Split an identity into (owner account, optional memo annotation)
pub fn split_annotation(identity: &str) -> (&str, Option<&str>) {
    match identity.split_once(ANNOTATION_SEPARATOR) {
        Some((account, memo)) => (account, Some(memo)),
        None => (identity, None),
    }
}

/// Append a serialized memo to an owner account
pub fn attach_annotation(account: &str, memo_json: &str) -> String {
    format!("{}{}{}", account, ANNOTATION_SEPARATOR, memo_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_without_annotation() {
        assert_eq!(split_annotation("rAlice"), ("rAlice", None));
    }

    #[test]
    fn split_with_annotation() {
        let identity = attach_annotation("rAlice", r#"[{"Memo":{}}]"#);
        assert_eq!(
            split_annotation(&identity),
            ("rAlice", Some(r#"[{"Memo":{}}]"#))
        );
    }

    #[test]
    fn split_keeps_separator_inside_annotation() {
        // Everything after the first separator belongs to the memo payload.
        let identity = attach_annotation("rAlice", "a|b");
        assert_eq!(split_annotation(&identity), ("rAlice", Some("a|b")));
    }

    #[test]
    fn record_accessors_strip_annotation() {
        let record = ReleaseRecord {
            identity: attach_annotation("rBob", "{}"),
            sequence: 3,
            due_at: chrono::Utc::now(),
            network: Network::Test,
        };
        assert_eq!(record.base_identity(), "rBob");
        assert_eq!(record.annotation(), Some("{}"));
    }
}
