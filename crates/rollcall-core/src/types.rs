use serde::{Deserialize, Serialize};

/// Face embedding vector (128-dimensional for Facenet).
///
/// Produced once per face by the upstream embedding model at enrollment
/// time; the dimensionality is whatever that model emits and is not
/// enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding. Non-negative; smaller means
    /// more similar. No normalization or calibration is applied.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled identity: serial number, display name, stored embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub serial: String,
    pub name: String,
    pub embedding: Embedding,
}

impl RosterEntry {
    pub fn new(serial: impl Into<String>, name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            serial: serial.into(),
            name: name.into(),
            embedding,
        }
    }

    /// Composite display label, `"{serial}_{name}"`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.serial, self.name)
    }
}
