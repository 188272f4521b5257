//! rollcall-core — embedding matching for face-recognition attendance.
//!
//! Pure logic only: Euclidean distance over an enrolled roster, best-match
//! selection under a caller-supplied threshold, the duplicate-rejection
//! policy, and the strict text codec for stored embeddings. No I/O lives
//! here; persistence and capture are collaborators of the service layer.

pub mod encoding;
pub mod matcher;
pub mod types;

pub use matcher::{
    distance_sweep, find_duplicate, recognize, ClosestMiss, DistanceSweep, DuplicateHit,
    Recognition,
};
pub use types::{Embedding, RosterEntry};
