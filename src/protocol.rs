//! Shared wire model and protocol constants for the driftsync channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Port the daemon listens on unless overridden
pub const DEFAULT_PORT: u16 = 12100;

/// Interval between automatic SYNC rounds on an idle client
pub const SYNC_INTERVAL: Duration = Duration::from_secs(60);

// Maximum encoded envelope size (64MB) - prevents DoS via memory exhaustion
// while leaving room for a large file payload inside a STORE
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024 * 1024;

/// Message kinds exchanged between client and server.
///
/// SYNC carries the sender's full inventory and triggers per-entry
/// reconciliation on the receiving side; LIST requests (empty payload) or
/// answers (inventory, no content) a listing; GETFILE names a file the
/// recipient must answer with a STORE; STORE carries one file with content
/// and timestamp; DELETE names a file the recipient removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Kind {
    Sync,
    List,
    Getfile,
    Store,
    Delete,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Kind::Sync => "SYNC",
            Kind::List => "LIST",
            Kind::Getfile => "GETFILE",
            Kind::Store => "STORE",
            Kind::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One file as known to a store: name, size and modification time.
///
/// `content` is populated only when the descriptor is the payload of a
/// GETFILE answer or a STORE; inventory entries never carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl FileDescriptor {
    /// Descriptor naming a file with no metadata, for GETFILE/DELETE targets
    pub fn named(name: impl Into<String>) -> Self {
        FileDescriptor {
            name: name.into(),
            size: 0,
            modified: DateTime::UNIX_EPOCH,
            content: None,
        }
    }
}

/// One protocol message. Depending on `kind` either `inventory` or `target`
/// carries the payload; client-issued DELETE/STORE commands additionally
/// attach the local inventory, which the receiver ignores for those kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inventory: Vec<FileDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<FileDescriptor>,
    pub sender: String,
    pub sent_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: Kind, sender: impl Into<String>) -> Self {
        Envelope {
            kind,
            inventory: Vec::new(),
            target: None,
            sender: sender.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn with_inventory(mut self, inventory: Vec<FileDescriptor>) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_target(mut self, target: FileDescriptor) -> Self {
        self.target = Some(target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_uses_wire_names() {
        let json = serde_json::to_string(&Kind::Getfile).unwrap();
        assert_eq!(json, "\"GETFILE\"");
        let back: Kind = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(back, Kind::Delete);
    }

    #[test]
    fn inventory_entries_omit_content() {
        let env = Envelope::new(Kind::List, "peer").with_inventory(vec![FileDescriptor {
            name: "a.txt".into(),
            size: 3,
            modified: DateTime::UNIX_EPOCH,
            content: None,
        }]);
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("content"));
        assert!(!json.contains("target"));
    }
}
