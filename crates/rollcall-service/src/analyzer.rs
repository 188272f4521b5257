//! Seam for the external face-analysis capability.
//!
//! The contract is the one the matcher needs and nothing more: given an
//! image, return zero or more face embeddings. Detection, cropping, and the
//! embedding model itself live behind this trait.

use rollcall_core::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("face analysis backend: {0}")]
    Backend(String),
    #[error("submitted image could not be decoded: {0}")]
    BadImage(String),
}

/// Everything the analysis backend found in one submitted image.
#[derive(Debug, Clone)]
pub struct FaceScan {
    /// One embedding per detected face.
    pub embeddings: Vec<Embedding>,
}

impl FaceScan {
    pub fn face_count(&self) -> usize {
        self.embeddings.len()
    }
}

/// A face-analysis backend. `&mut self` because real backends hold an
/// inference session.
pub trait FaceAnalyzer: Send {
    fn scan(&mut self, image: &[u8]) -> Result<FaceScan, AnalyzerError>;
}
