//! Decode request orchestration
//!
//! Validates incoming decode requests, resolves the client's session,
//! invokes the engine for that session's handle and assembles the response.

use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use w2lserve_engine::SpeechDecoder;

use crate::session::SessionRegistry;

/// Maximum samples per request: 30 seconds at 16 kHz
pub const MAX_SAMPLES: usize = 480_000;

/// Maximum `cfg` blob size in bytes, measured on the base64 text before
/// decoding
pub const MAX_CFG_BYTES: usize = 0x100_0000;

/// Decode request body
#[derive(Debug, Clone, Deserialize)]
pub struct DecodeRequest {
    /// Optional base64 decoding-grammar blob
    #[serde(default)]
    pub cfg: Option<String>,

    /// Client-chosen stream id
    #[serde(default)]
    pub uuid: String,

    /// 16 kHz mono audio samples
    #[serde(default)]
    pub samples: Vec<f32>,
}

/// Decode response body
#[derive(Debug, Clone, Serialize)]
pub struct DecodeResponse {
    /// Tokens emitted for this chunk
    pub emit: Vec<String>,

    /// Reserved for a second-pass decode; always empty
    pub decode: Vec<String>,

    /// Wall-clock milliseconds spent in the engine call
    pub emit_ms: f64,

    /// Reserved alongside `decode`; always zero
    pub decode_ms: f64,
}

/// Decode request errors. The display form is the wire error code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing_identifier")]
    MissingIdentifier,

    #[error("config_too_large")]
    ConfigTooLarge,

    #[error("config_invalid")]
    ConfigInvalid,

    #[error("insufficient_samples")]
    InsufficientSamples,

    #[error("too_many_samples")]
    TooManySamples,

    #[error("decode_failed")]
    DecodeFailed,
}

/// Decode orchestrator
///
/// Owns the seam between the stateless HTTP surface and the stateful
/// engine: every request is validated, mapped to exactly one session, and
/// serialized per handle through the session's decode lock.
pub struct DecodeService {
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn SpeechDecoder>,
}

impl DecodeService {
    /// Create the orchestrator over a registry and an engine
    pub fn new(registry: Arc<SessionRegistry>, engine: Arc<dyn SpeechDecoder>) -> Self {
        Self { registry, engine }
    }

    /// Run one decode request end to end.
    pub async fn decode(&self, request: DecodeRequest) -> Result<DecodeResponse, DecodeError> {
        // Validation happens before any registry interaction; a rejected
        // request must not create or touch a session.
        let _cfg = validate(&request)?;

        let DecodeRequest { uuid, samples, .. } = request;

        // Resolve the session and acquire its decode lock. The reaper may
        // evict a session between resolution and lock acquisition; the
        // cleared active flag tells us the handle is gone and we start over
        // with a fresh session.
        let (session, _decode_guard) = loop {
            let session = self.registry.get_or_create(&uuid);
            let guard = session.begin_decode().await;
            if session.is_active() {
                break (session, guard);
            }
        };

        let engine = Arc::clone(&self.engine);
        let handle = session.handle;
        let sample_count = samples.len();

        // The engine call is blocking and CPU-bound; keep it off the
        // async workers. The decode lock is held across the await, so at
        // most one call per handle is ever in flight.
        let start = Instant::now();
        let result =
            tokio::task::spawn_blocking(move || engine.decode(handle, &samples)).await;
        let emit_ms = start.elapsed().as_secs_f64() * 1000.0;

        // Activity counts even when the decode fails; the client and its
        // handle are still alive.
        session.touch();

        let text = match result {
            Ok(Ok(text)) => text,
            Ok(Err(error)) => {
                tracing::error!(handle, sample_count, %error, "engine call failed");
                return Err(DecodeError::DecodeFailed);
            }
            Err(join_error) => {
                tracing::error!(handle, sample_count, %join_error, "engine call panicked");
                return Err(DecodeError::DecodeFailed);
            }
        };

        tracing::debug!(handle, sample_count, emit_ms, "decoded chunk");

        // An empty transcript is "nothing emitted this chunk", not an error.
        let emit: Vec<String> = text.split_whitespace().map(str::to_string).collect();

        Ok(DecodeResponse {
            emit,
            decode: Vec::new(),
            emit_ms,
            decode_ms: 0.0,
        })
    }
}

/// Check a request before it touches any session state.
///
/// Returns the decoded `cfg` blob. It is size-checked and decoded here but
/// the engine entry point does not consume a grammar payload.
fn validate(request: &DecodeRequest) -> Result<Option<Vec<u8>>, DecodeError> {
    if request.uuid.is_empty() {
        return Err(DecodeError::MissingIdentifier);
    }

    let cfg = match request.cfg.as_deref() {
        Some(text) if !text.is_empty() => {
            if text.len() > MAX_CFG_BYTES {
                return Err(DecodeError::ConfigTooLarge);
            }
            Some(BASE64.decode(text).map_err(|_| DecodeError::ConfigInvalid)?)
        }
        _ => None,
    };

    if request.samples.is_empty() {
        return Err(DecodeError::InsufficientSamples);
    }
    if request.samples.len() > MAX_SAMPLES {
        return Err(DecodeError::TooManySamples);
    }

    Ok(cfg)
}
