//! Wordcleave - linear-time WordPiece tokenization
//!
//! A fast WordPiece subword tokenizer built on a failure-link augmented
//! vocabulary trie:
//!
//! - Single-pass, never-backtracking segmentation (O(n) on any input)
//! - End-to-end mode: word splitting and piece matching in one forward scan
//! - Byte offsets into the original text for every emitted piece
//! - Detokenization back to whitespace-joined words
//! - Rayon parallelism for batch operations
//!
//! ```
//! use wordcleave::{ConfigBuilder, WordpieceTokenizer};
//!
//! let vocab = vec!["[UNK]".into(), "un".into(), "##affable".into()];
//! let config = ConfigBuilder::new(vocab, "[UNK]").build().unwrap();
//! let tokenizer = WordpieceTokenizer::new(&config).unwrap();
//!
//! let mut ids = Vec::new();
//! tokenizer.tokenize_ids("unaffable", &mut ids, 0);
//! assert_eq!(ids, vec![1, 2]);
//! ```

pub mod core;

pub use core::{
    load_vocab, load_vocab_file, BuilderError, ConfigBuilder, TokenizerConfig, TokenizerError,
    TrieError, VocabError, WordpieceTokenizer,
};
