//! Distance sweep over the enrolled roster and the two policies on top of it:
//! recognition (loose threshold, attendance capture) and duplicate rejection
//! (strict threshold, registration time).
//!
//! The roster is small, so every comparison is a plain linear scan. Thresholds
//! are always caller-supplied; the two call sites must never share an implicit
//! module constant.

use crate::types::{Embedding, RosterEntry};
use serde::Serialize;

/// Distances from a probe to every roster entry, plus the indices that
/// cleared the threshold.
#[derive(Debug, Clone)]
pub struct DistanceSweep {
    /// One distance per roster entry, in roster order.
    pub distances: Vec<f32>,
    /// Indices whose distance is strictly below the threshold.
    pub hits: Vec<usize>,
}

impl DistanceSweep {
    /// Index of the best hit: minimum distance among `hits`, first occurrence
    /// winning ties. `None` if nothing cleared the threshold.
    pub fn best_hit(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for &i in &self.hits {
            // Strict `<` in roster order fixes the tie-break to the first
            // minimal entry.
            match best {
                Some(b) if self.distances[i] < self.distances[b] => best = Some(i),
                None => best = Some(i),
                _ => {}
            }
        }
        best
    }

    /// Index of the globally closest entry, threshold ignored. First
    /// occurrence wins ties. `None` on an empty roster.
    pub fn closest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &d) in self.distances.iter().enumerate() {
            match best {
                Some(b) if d < self.distances[b] => best = Some(i),
                None => best = Some(i),
                _ => {}
            }
        }
        best
    }
}

/// Compare a probe embedding against every roster entry.
///
/// Returns exactly one distance per entry, in roster order, and the subset of
/// indices strictly under `threshold`.
pub fn distance_sweep(roster: &[RosterEntry], probe: &Embedding, threshold: f32) -> DistanceSweep {
    let distances: Vec<f32> = roster
        .iter()
        .map(|entry| entry.embedding.distance(probe))
        .collect();

    let hits = distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d < threshold)
        .map(|(i, _)| i)
        .collect();

    DistanceSweep { distances, hits }
}

/// The globally closest entry when nothing cleared the threshold.
///
/// Surfaced deliberately so callers can report how near the best miss was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosestMiss {
    pub label: String,
    pub distance: f32,
}

/// Outcome of a recognition attempt against the roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Recognition {
    /// No identities enrolled; nothing to compare against. A distinct empty
    /// state, not an error.
    EmptyRoster,
    /// Best entry under the threshold.
    Match {
        serial: String,
        label: String,
        distance: f32,
    },
    /// Comparisons ran, none under threshold. Carries the closest miss
    /// for diagnostics.
    NoMatch { closest: Option<ClosestMiss> },
}

/// Recognize a probe against the roster under the loose attendance threshold.
pub fn recognize(roster: &[RosterEntry], probe: &Embedding, threshold: f32) -> Recognition {
    if roster.is_empty() {
        return Recognition::EmptyRoster;
    }

    let sweep = distance_sweep(roster, probe, threshold);
    tracing::debug!(
        entries = roster.len(),
        hits = sweep.hits.len(),
        threshold,
        "recognition sweep"
    );

    match sweep.best_hit() {
        Some(i) => Recognition::Match {
            serial: roster[i].serial.clone(),
            label: roster[i].label(),
            distance: sweep.distances[i],
        },
        None => Recognition::NoMatch {
            closest: sweep.closest().map(|i| ClosestMiss {
                label: roster[i].label(),
                distance: sweep.distances[i],
            }),
        },
    }
}

/// An already-enrolled identity that collides with a registration candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateHit {
    pub label: String,
    pub distance: f32,
}

/// Check a registration candidate against the current roster under the strict
/// duplicate threshold.
///
/// The roster must not yet contain the candidate, or it would trivially
/// self-match. Returns the single closest conflicting entry, or `None`
/// (vacuously `None` on an empty roster).
pub fn find_duplicate(
    roster: &[RosterEntry],
    candidate: &Embedding,
    threshold: f32,
) -> Option<DuplicateHit> {
    let sweep = distance_sweep(roster, candidate, threshold);
    sweep.best_hit().map(|i| DuplicateHit {
        label: roster[i].label(),
        distance: sweep.distances[i],
    })
}
