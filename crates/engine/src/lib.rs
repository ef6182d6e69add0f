//! External decoding engine boundary
//!
//! This crate wraps the stateful streaming decoder consumed by the server:
//! - `SpeechDecoder`: the trait seam the request orchestrator calls through
//! - `W2lStream`: the dynamic-library binding to the real engine
//! - vocabulary (token list) loading

pub mod vocab;
pub mod w2l;

pub use vocab::load_tokens;
pub use w2l::W2lStream;

use thiserror::Error;

/// A stream handle identifying one decoding context inside the engine.
///
/// Handles are small reusable integers issued by the server's handle pool;
/// the engine treats a handle it has not seen before as a fresh, empty
/// decoding context.
pub type StreamHandle = u32;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to load engine library: {0}")]
    Library(#[from] libloading::Error),

    #[error("model file not found: {0}")]
    ModelNotFound(String),

    #[error("engine initialization failed: {0}")]
    Init(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] std::ffi::NulError),
}

/// Stateful streaming decoder.
///
/// One call decodes one chunk of audio for one stream handle and returns the
/// incremental transcript (possibly empty — silence or insufficient audio
/// produces no tokens).
///
/// Calls for the *same* handle must be serialized by the caller; the engine
/// keeps per-handle decoding state across calls and concurrent same-handle
/// calls corrupt it. Calls for different handles may run in parallel.
pub trait SpeechDecoder: Send + Sync {
    /// Decode one chunk of 16 kHz mono samples for `handle`.
    fn decode(&self, handle: StreamHandle, samples: &[f32]) -> Result<String, EngineError>;
}
