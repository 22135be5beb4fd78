//! Reconciliation decisions.
//!
//! Pure functions mapping (local state, one advertised descriptor, a
//! watermark) to an action. No I/O here: callers snapshot their store and
//! watermark, decide one advertised entry at a time, then act on the
//! channel. Timestamp equality is always a no-op - content is never
//! compared, so identical names with identical mtimes count as in sync even
//! if the bytes differ.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::protocol::FileDescriptor;

/// What to do about one advertised file.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Ask the advertiser to upload its copy
    Fetch(String),
    /// Send our copy to the advertiser; the descriptor is the local entry,
    /// content gets attached from the store when the STORE is built
    Push(FileDescriptor),
    /// Instruct the advertiser to remove the file
    Delete(String),
    NoOp,
}

/// Decide one entry of a peer-advertised inventory against local state.
///
/// `local` is the store's descriptor for the same name if it exists,
/// `watermark` the last reconciliation time recorded for this peer. A
/// missing local file is new (Fetch) when the peer relationship has never
/// been reconciled, or was reconciled before the advertised timestamp;
/// otherwise the file was already seen and has since been removed here, so
/// the advertiser is told to Delete.
pub fn reconcile_advertised(
    local: Option<&FileDescriptor>,
    remote: &FileDescriptor,
    watermark: Option<DateTime<Utc>>,
) -> Action {
    match local {
        Some(ours) => match ours.modified.cmp(&remote.modified) {
            Ordering::Greater => Action::Push(ours.clone()),
            Ordering::Less => Action::Fetch(remote.name.clone()),
            Ordering::Equal => Action::NoOp,
        },
        None => match watermark {
            Some(mark) if mark >= remote.modified => Action::Delete(remote.name.clone()),
            _ => Action::Fetch(remote.name.clone()),
        },
    }
}

/// Decide one entry of a server counter-sync on the client.
///
/// Only locally-absent names are considered: present files were already
/// handled when the server reconciled our advertised inventory. A file
/// newer than our last sync is new on the server (Fetch); anything older
/// must have been deleted here after we previously saw it, so the deletion
/// propagates (Delete). Files present locally but absent from the
/// counter-sync are deliberately not scanned - a local create+delete
/// between two sync rounds never propagates.
pub fn reconcile_counter_sync(
    locally_present: bool,
    remote: &FileDescriptor,
    last_sync: DateTime<Utc>,
) -> Action {
    if locally_present {
        return Action::NoOp;
    }
    if last_sync < remote.modified {
        Action::Fetch(remote.name.clone())
    } else {
        Action::Delete(remote.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn entry(name: &str, modified: DateTime<Utc>) -> FileDescriptor {
        FileDescriptor {
            name: name.to_string(),
            size: 1,
            modified,
            content: None,
        }
    }

    #[test]
    fn local_newer_pushes() {
        let ours = entry("a.txt", ts(200));
        let theirs = entry("a.txt", ts(100));
        assert_eq!(
            reconcile_advertised(Some(&ours), &theirs, None),
            Action::Push(ours.clone())
        );
    }

    #[test]
    fn local_older_fetches() {
        let ours = entry("a.txt", ts(100));
        let theirs = entry("a.txt", ts(200));
        assert_eq!(
            reconcile_advertised(Some(&ours), &theirs, None),
            Action::Fetch("a.txt".into())
        );
    }

    #[test]
    fn equal_timestamps_are_a_noop() {
        let ours = entry("a.txt", ts(100));
        let theirs = entry("a.txt", ts(100));
        assert_eq!(reconcile_advertised(Some(&ours), &theirs, None), Action::NoOp);
    }

    #[test]
    fn absent_with_no_watermark_fetches() {
        let theirs = entry("new.txt", ts(100));
        assert_eq!(
            reconcile_advertised(None, &theirs, None),
            Action::Fetch("new.txt".into())
        );
    }

    #[test]
    fn absent_with_stale_watermark_fetches() {
        let theirs = entry("new.txt", ts(200));
        assert_eq!(
            reconcile_advertised(None, &theirs, Some(ts(100))),
            Action::Fetch("new.txt".into())
        );
    }

    #[test]
    fn absent_but_already_seen_deletes() {
        let theirs = entry("gone.txt", ts(100));
        assert_eq!(
            reconcile_advertised(None, &theirs, Some(ts(200))),
            Action::Delete("gone.txt".into())
        );
        // watermark exactly at the advertised timestamp also deletes
        assert_eq!(
            reconcile_advertised(None, &theirs, Some(ts(100))),
            Action::Delete("gone.txt".into())
        );
    }

    #[test]
    fn reconciling_a_fetched_copy_again_is_a_noop() {
        // After acting on a Fetch the local entry equals the advertised one,
        // so a second pass over the same inventory decides nothing.
        let theirs = entry("a.txt", ts(100));
        assert_eq!(
            reconcile_advertised(None, &theirs, None),
            Action::Fetch("a.txt".into())
        );
        let ours = theirs.clone();
        assert_eq!(reconcile_advertised(Some(&ours), &theirs, None), Action::NoOp);
    }

    #[test]
    fn counter_sync_fetches_files_newer_than_last_sync() {
        let theirs = entry("b.txt", ts(300));
        assert_eq!(
            reconcile_counter_sync(false, &theirs, ts(200)),
            Action::Fetch("b.txt".into())
        );
    }

    #[test]
    fn counter_sync_deletes_files_older_than_last_sync() {
        let theirs = entry("b.txt", ts(100));
        assert_eq!(
            reconcile_counter_sync(false, &theirs, ts(200)),
            Action::Delete("b.txt".into())
        );
    }

    #[test]
    fn counter_sync_leaves_present_files_alone() {
        let theirs = entry("b.txt", ts(300));
        assert_eq!(reconcile_counter_sync(true, &theirs, ts(200)), Action::NoOp);
    }
}
