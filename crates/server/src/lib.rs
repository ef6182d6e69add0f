//! Streaming decode server
//!
//! Turns a stream of stateless HTTP requests, each tagged with a
//! client-chosen stream id, into a correctly ordered, resource-bounded
//! sequence of calls into a per-client decoding context:
//! - handle pool: issues and recycles engine stream handles
//! - session registry: one live session per stream id, idle sessions reaped
//!   by a background task
//! - decode orchestrator: validation, per-handle call serialization,
//!   response assembly

pub mod decode;
pub mod http;
pub mod pool;
pub mod session;
pub mod state;

pub use decode::{DecodeError, DecodeRequest, DecodeResponse, DecodeService};
pub use http::create_router;
pub use pool::HandlePool;
pub use session::{Session, SessionRegistry};
pub use state::AppState;
