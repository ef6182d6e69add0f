//! Binding to the `w2lstream` shared library
//!
//! The engine is distributed as a C shared library and loaded at runtime.
//! One engine context is created at startup and shared by every stream; the
//! per-handle decoding state lives inside the library.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;

use libloading::{Library, Symbol};
use w2lserve_config::EngineConfig;

use crate::{EngineError, SpeechDecoder, StreamHandle};

type W2lNewFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, c_int) -> *mut c_void;
type W2lRunFn = unsafe extern "C" fn(*mut c_void, c_int, *const f32, c_int) -> *mut c_char;
type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Platform name of the engine shared library
fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "libw2lstream.dll"
    } else if cfg!(target_os = "macos") {
        "libw2lstream.dylib"
    } else {
        "libw2lstream.so"
    }
}

/// The real streaming decoder.
///
/// Holds the loaded library, the engine context pointer and the resolved
/// entry points. The context is created once and lives for the process
/// lifetime, matching the engine's expectation of a single long-lived
/// context shared by all stream handles.
pub struct W2lStream {
    ctx: *mut c_void,
    run: W2lRunFn,
    free: FreeFn,
    // Keeps the library mapped; `run`/`free` point into it.
    _lib: Library,
}

// SAFETY: the engine context is documented thread-safe across distinct
// stream handles; same-handle calls are serialized by the caller per the
// `SpeechDecoder` contract.
unsafe impl Send for W2lStream {}
unsafe impl Sync for W2lStream {}

impl W2lStream {
    /// Load the engine library, verify the model files and create the
    /// engine context.
    ///
    /// A missing library or model file is a startup error; the server must
    /// not begin listening without a working engine.
    pub fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        let missing: Vec<&str> = [
            config.feature_extractor.as_str(),
            config.acoustic_model.as_str(),
            config.tokens.as_str(),
        ]
        .into_iter()
        .filter(|path| !Path::new(path).exists())
        .collect();
        if !missing.is_empty() {
            return Err(EngineError::ModelNotFound(missing.join(", ")));
        }

        let library_path = if config.library.is_empty() {
            default_library_name()
        } else {
            config.library.as_str()
        };

        // SAFETY: loading a foreign library is inherently unsafe; the
        // library is trusted by deployment.
        let lib = unsafe { Library::new(library_path) }?;

        // SAFETY: symbol types match the w2lstream.h ABI. The fn pointers
        // are copied out of the `Symbol` guards and stay valid because the
        // `Library` is stored alongside them.
        let (new_fn, run, free) = unsafe {
            let new_fn: Symbol<W2lNewFn> = lib.get(b"w2lstream_new\0")?;
            let run: Symbol<W2lRunFn> = lib.get(b"w2lstream_run\0")?;
            let free: Symbol<FreeFn> = lib.get(b"free\0")?;
            (*new_fn, *run, *free)
        };

        let feature_extractor = CString::new(config.feature_extractor.as_str())?;
        let acoustic_model = CString::new(config.acoustic_model.as_str())?;
        let tokens = CString::new(config.tokens.as_str())?;
        let chunk_samples = config.chunk_samples() as c_int;

        // SAFETY: paths are valid NUL-terminated strings and the model files
        // were checked above.
        let ctx = unsafe {
            new_fn(
                feature_extractor.as_ptr(),
                acoustic_model.as_ptr(),
                tokens.as_ptr(),
                chunk_samples,
            )
        };
        if ctx.is_null() {
            return Err(EngineError::Init(format!(
                "w2lstream_new returned null (library: {})",
                library_path
            )));
        }

        tracing::info!(
            library = library_path,
            chunk_samples = config.chunk_samples(),
            "engine context created"
        );

        Ok(Self {
            ctx,
            run,
            free,
            _lib: lib,
        })
    }
}

impl SpeechDecoder for W2lStream {
    fn decode(&self, handle: StreamHandle, samples: &[f32]) -> Result<String, EngineError> {
        // SAFETY: `samples` is a live slice for the duration of the call and
        // the caller serializes calls per handle.
        let text_ptr =
            unsafe { (self.run)(self.ctx, handle as c_int, samples.as_ptr(), samples.len() as c_int) };

        if text_ptr.is_null() {
            return Ok(String::new());
        }

        // The engine transfers ownership of the buffer; copy the contents
        // then release it exactly once.
        // SAFETY: non-null pointer from the engine is a NUL-terminated
        // string we now own.
        let text = unsafe { CStr::from_ptr(text_ptr) }
            .to_string_lossy()
            .into_owned();
        // SAFETY: pointer was returned by the engine's allocator and is
        // freed once, here.
        unsafe { (self.free)(text_ptr as *mut c_void) };

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_library_name() {
        let name = default_library_name();
        assert!(name.contains("w2lstream"));
    }

    #[test]
    fn test_load_rejects_missing_models() {
        let config = EngineConfig {
            feature_extractor: "definitely/not/here.bin".to_string(),
            ..EngineConfig::default()
        };
        match W2lStream::load(&config) {
            Err(EngineError::ModelNotFound(missing)) => {
                assert!(missing.contains("definitely/not/here.bin"));
            }
            other => panic!("expected ModelNotFound, got {:?}", other.map(|_| ())),
        }
    }
}
