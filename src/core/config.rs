//! The immutable tokenizer config: everything the runtime needs, produced
//! once by [`crate::core::builder::ConfigBuilder`] and borrowed for the
//! lifetime of every tokenizer constructed from it.
//!
//! The runtime treats this as a read-only table provider: the double-array
//! unit buffer, the per-node failure structure, the shared failure-pops
//! pool, the vocabulary arrays (present only when detokenization is
//! enabled), and a handful of constants.

/// Per-node failure structure: where to resume matching when the trie
/// cannot consume the next byte, and which tokens to emit on the way.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FailureStruct {
    /// Node id to resume from, or [`crate::core::codec::NULL_NODE`].
    pub failure_link: u32,
    /// Packed (offset, length) window into the failure-pops pool.
    pub failure_pops: u32,
}

/// Immutable configuration blob for a WordPiece tokenizer.
///
/// Built by [`crate::ConfigBuilder`]; shared freely across threads. A
/// [`crate::WordpieceTokenizer`] borrows it and adds no mutable state.
pub struct TokenizerConfig {
    /// Piece text per id, suffix indicator stripped. Empty unless
    /// `support_detokenization` is set.
    pub(crate) vocab: Vec<String>,
    /// Continuation-piece flag per id. Parallel to `vocab`.
    pub(crate) vocab_is_suffix: Vec<bool>,
    pub(crate) suffix_indicator: String,
    pub(crate) unk_token: String,
    pub(crate) unk_token_id: u32,
    pub(crate) max_bytes_per_token: usize,
    pub(crate) end_to_end: bool,
    pub(crate) support_detokenization: bool,
    /// Trie node reached by consuming exactly the suffix indicator.
    pub(crate) trie_suffix_root: u32,
    /// Dead node that single-scalar boundary tokens fail over to in
    /// end-to-end mode; `NULL_NODE` otherwise.
    pub(crate) trie_punct_failure_link_node: u32,
    /// Failure structure per trie node id.
    pub(crate) failure_structs: Vec<FailureStruct>,
    /// Encoded token values referenced by packed pops ranges.
    pub(crate) failure_pops_pool: Vec<u32>,
    /// Encoded token result for an input word equal to the suffix
    /// indicator itself.
    pub(crate) precomputed_result_for_suffix_indicator: Vec<u32>,
    /// Flat double-array unit buffer.
    pub(crate) trie_units: Vec<u32>,
}

impl TokenizerConfig {
    /// The continuation-piece marker, e.g. `"##"`.
    pub fn suffix_indicator(&self) -> &str {
        &self.suffix_indicator
    }

    /// The unknown-token piece, e.g. `"[UNK]"`.
    pub fn unk_token(&self) -> &str {
        &self.unk_token
    }

    /// Id of the unknown-token piece.
    pub fn unk_token_id(&self) -> u32 {
        self.unk_token_id
    }

    /// Upper bound on a single word's byte length; longer words map to one
    /// unknown token.
    pub fn max_bytes_per_token(&self) -> usize {
        self.max_bytes_per_token
    }

    /// Whether tokenize operations scan raw text (splitting words on the
    /// fly) rather than a single pre-split word.
    pub fn end_to_end(&self) -> bool {
        self.end_to_end
    }

    /// Whether the vocabulary arrays were retained for detokenization.
    pub fn supports_detokenization(&self) -> bool {
        self.support_detokenization
    }

    /// Number of pieces in the retained vocabulary. Zero when
    /// detokenization is disabled.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    #[inline]
    pub(crate) fn failure_struct(&self, node: u32) -> FailureStruct {
        self.failure_structs[node as usize]
    }
}
