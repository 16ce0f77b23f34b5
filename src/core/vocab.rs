//! Vocabulary loading for the plain-text format BERT-family checkpoints
//! ship: one piece per line, id equal to the line's position.
//!
//! # Example Format
//!
//! ```text
//! [PAD]
//! [UNK]
//! the
//! ##ing
//! ```
//!
//! Continuation pieces carry the suffix indicator (`##` by convention) in
//! the file; the config builder strips it when assembling the runtime
//! tables. Blank lines are skipped, so a trailing newline does not mint an
//! empty piece.

use thiserror::Error;

/// Errors that can occur when loading vocabulary files.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("vocabulary contains no pieces")]
    Empty,
    #[error("invalid UTF-8 in vocabulary data")]
    InvalidUtf8,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Load a vocabulary from raw bytes, one piece per line.
pub fn load_vocab(data: &[u8]) -> Result<Vec<String>, VocabError> {
    let text = std::str::from_utf8(data).map_err(|_| VocabError::InvalidUtf8)?;
    let pieces: Vec<String> = text
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    if pieces.is_empty() {
        return Err(VocabError::Empty);
    }
    Ok(pieces)
}

/// Load a vocabulary from a file path.
pub fn load_vocab_file(path: &str) -> Result<Vec<String>, VocabError> {
    let data = std::fs::read(path)?;
    load_vocab(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_vocab() {
        let data = b"[UNK]\nhello\n##ing\n";
        let pieces = load_vocab(data).unwrap();
        assert_eq!(pieces, vec!["[UNK]", "hello", "##ing"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let data = b"[UNK]\r\nhello\r\n";
        let pieces = load_vocab(data).unwrap();
        assert_eq!(pieces, vec!["[UNK]", "hello"]);
    }

    #[test]
    fn test_empty_vocab_rejected() {
        assert!(matches!(load_vocab(b""), Err(VocabError::Empty)));
        assert!(matches!(load_vocab(b"\n\n"), Err(VocabError::Empty)));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(
            load_vocab(&[0xFF, 0xFE, b'\n']),
            Err(VocabError::InvalidUtf8)
        ));
    }
}
