//! Process-wide roster cache with swap-on-write publication.
//!
//! Recognition reads happen per request; roster mutations are rare. Instead
//! of locking a mutable container, every mutation rebuilds the full snapshot
//! from SQLite and swaps an `Arc` pointer, so a reader holds either the
//! entirely-old or entirely-new set, never a partially-rebuilt one.

use crate::db::{RollcallDb, StoreError};
use rollcall_core::{encoding, RosterEntry};
use std::sync::{Arc, RwLock};

/// An immutable, fully-built view of the enrolled roster, ordered by serial.
#[derive(Debug, Default)]
pub struct RosterSnapshot {
    pub entries: Vec<RosterEntry>,
}

impl RosterSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a fresh snapshot from storage.
///
/// A row whose stored encoding fails to parse is skipped with a warning —
/// one corrupt row must not take down the whole reload. Rows whose
/// dimensionality disagrees with the first accepted row are treated the
/// same way; the upstream model emits a fixed width, so drift means the row
/// was written by something else.
pub fn load_snapshot(db: &RollcallDb) -> Result<RosterSnapshot, StoreError> {
    let rows = db.face_rows()?;
    let mut entries: Vec<RosterEntry> = Vec::with_capacity(rows.len());
    let mut expected_dim: Option<usize> = None;

    for (serial, name, text) in rows {
        let embedding = match encoding::decode(&text) {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(serial = %serial, name = %name, error = %err, "skipping malformed stored embedding");
                continue;
            }
        };

        match expected_dim {
            None => expected_dim = Some(embedding.dim()),
            Some(dim) if embedding.dim() != dim => {
                tracing::warn!(
                    serial = %serial,
                    name = %name,
                    got = embedding.dim(),
                    expected = dim,
                    "skipping embedding with mismatched dimensionality"
                );
                continue;
            }
            Some(_) => {}
        }

        entries.push(RosterEntry::new(serial, name, embedding));
    }

    tracing::debug!(loaded = entries.len(), "roster snapshot built");
    Ok(RosterSnapshot { entries })
}

/// Shared handle to the current roster snapshot.
pub struct Roster {
    current: RwLock<Arc<RosterSnapshot>>,
}

impl Roster {
    /// Start with an empty snapshot; call [`reload`](Self::reload) to populate.
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(Arc::new(RosterSnapshot::default())),
        }
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<RosterSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Rebuild the snapshot from storage and publish it atomically.
    /// Returns the number of enrolled faces.
    pub fn reload(&self, db: &RollcallDb) -> Result<usize, StoreError> {
        let fresh = Arc::new(load_snapshot(db)?);
        let count = fresh.len();
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = fresh;
        tracing::info!(enrolled = count, "roster snapshot published");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewStudent;
    use rollcall_core::Embedding;

    fn enroll(db: &RollcallDb, serial: &str, name: &str, values: Vec<f32>) {
        db.add_student(&NewStudent {
            serial: serial.to_string(),
            name: name.to_string(),
            email: format!("{name}@example.edu"),
            phone: "5550001234".to_string(),
            embedding: Some(Embedding::new(values)),
        })
        .unwrap();
    }

    #[test]
    fn test_snapshot_ordered_by_serial() {
        let db = RollcallDb::open_in_memory().unwrap();
        enroll(&db, "02", "Bob", vec![1.0, 1.0]);
        enroll(&db, "01", "Alice", vec![0.0, 0.0]);

        let snap = load_snapshot(&db).unwrap();
        let labels: Vec<String> = snap.entries.iter().map(|e| e.label()).collect();
        assert_eq!(labels, vec!["01_Alice", "02_Bob"]);
    }

    #[test]
    fn test_malformed_row_is_skipped_not_fatal() {
        let db = RollcallDb::open_in_memory().unwrap();
        enroll(&db, "01", "Alice", vec![0.0, 0.0]);
        enroll(&db, "03", "Cara", vec![1.0, 1.0]);
        // Corrupt one row behind the codec's back.
        db.raw()
            .execute(
                "UPDATE students SET face_encoding = 'not a vector'
                 WHERE serial_number = '03'",
                [],
            )
            .unwrap();

        let snap = load_snapshot(&db).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.entries[0].serial, "01");
    }

    #[test]
    fn test_dimension_drift_is_skipped() {
        let db = RollcallDb::open_in_memory().unwrap();
        enroll(&db, "01", "Alice", vec![0.0, 0.0, 0.0]);
        enroll(&db, "02", "Bob", vec![1.0]); // wrong width

        let snap = load_snapshot(&db).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.entries[0].serial, "01");
    }

    #[test]
    fn test_reload_publishes_wholesale() {
        let db = RollcallDb::open_in_memory().unwrap();
        let roster = Roster::empty();
        assert!(roster.snapshot().is_empty());

        enroll(&db, "01", "Alice", vec![0.0, 0.0]);
        let held = roster.snapshot(); // old view, taken before the reload

        assert_eq!(roster.reload(&db).unwrap(), 1);

        // The held Arc still sees the old, complete set.
        assert!(held.is_empty());
        // A fresh read sees the new, complete set.
        assert_eq!(roster.snapshot().len(), 1);
    }
}
