//! rollcall-service — the serving layer of the attendance system.
//!
//! Wires the pure matcher (`rollcall-core`) to persistence
//! (`rollcall-store`) behind an engine thread. Face detection and embedding
//! extraction are an external capability, reached through the
//! [`FaceAnalyzer`] seam; this crate never touches pixels.

pub mod analyzer;
pub mod config;
pub mod engine;

pub use analyzer::{AnalyzerError, FaceAnalyzer, FaceScan};
pub use config::{Config, ConfigError, Thresholds};
pub use engine::{
    spawn_engine, EngineError, EngineHandle, RecognizeOutcome, RegisterOutcome, StudentForm,
};
