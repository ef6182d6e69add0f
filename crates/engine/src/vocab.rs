//! Vocabulary (token list) loading
//!
//! The engine ships a text token list, one token per line. It is loaded once
//! at startup and served verbatim by the `/tokens` endpoint.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::EngineError;

/// Load the token list from a text file, one token per line.
pub fn load_tokens<P: AsRef<Path>>(path: P) -> Result<Vec<String>, EngineError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| EngineError::Io(format!("failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    let tokens: Vec<String> = reader
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Io(format!("failed to read {}: {}", path.display(), e)))?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_tokens() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "|").unwrap();
        writeln!(file, "a").unwrap();
        writeln!(file, "b").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "'").unwrap();

        let tokens = load_tokens(file.path()).unwrap();
        assert_eq!(tokens, vec!["|", "a", "b", "'"]);
    }

    #[test]
    fn test_load_tokens_missing_file() {
        let result = load_tokens("does/not/exist.txt");
        assert!(matches!(result, Err(EngineError::Io(_))));
    }
}
