//! The tokenization runtime: single-pass WordPiece over the failure-link
//! augmented trie, plus detokenization.
//!
//! Classic WordPiece matches longest-first and rescans after every match,
//! which is quadratic on adversarial input. Here the input cursor never
//! moves backwards: when the trie cannot consume the next byte, the tokens
//! that longest-match-first would have produced are already recorded on the
//! current node as failure pops, and the failure link lands on the node
//! representing the unmatched remainder as a continuation. Every byte is
//! therefore either consumed once or triggers failure transitions bounded
//! by the bytes consumed before it, so the whole pass is linear.
//!
//! With vocabulary `{a, abcd, ##b, ##bc, ##z}` and input `abcz`:
//!
//! ```text
//!  step | byte | node transition | output
//!     1 |  a   | root -> a       | []
//!     2 |  b   | a -> ab         | []
//!     3 |  c   | ab -> abc       | []
//!     4 |  z   | fail: abc->##bc | [a]
//!       |  z   | fail: ##bc-> ## | [a, ##bc]
//!       |  z   | ## -> ##z       | [a, ##bc]
//! flush |      | fail: ##z -> ## | [a, ##bc, ##z]
//! ```
//!
//! In end-to-end mode the same cursor also does word splitting: a word ends
//! where the trie stalls on a whitespace or punctuation/CJK scalar (or the
//! scalar after punctuation), and the scanner only ever moves forward.

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use super::codec::{is_suffix_token, token_id, token_length, unpack_pops_range, NULL_NODE};
use super::config::TokenizerConfig;
use super::trie::{Trie, TrieCursor, TrieError, ROOT_NODE_ID};
use super::unicode::{is_punct_or_cjk, is_whitespace};

/// Errors surfaced by construction and detokenization. Tokenize operations
/// never fail: unmatchable input degrades to unknown-token emissions.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("invalid tokenizer config: {0}")]
    InvalidConfig(#[from] TrieError),
    #[error("config has {records} failure records for {nodes} trie nodes")]
    MismatchedFailureTable { records: usize, nodes: usize },
    #[error("detokenization is disabled; rebuild the config with support_detokenization")]
    DetokenizationDisabled,
    #[error("token id {id} is out of range for a vocabulary of {vocab_size} pieces")]
    TokenIdOutOfRange { id: u32, vocab_size: usize },
}

/// Output vectors requested by the caller. Absent vectors cost nothing;
/// present vectors all receive the same number of records per call.
struct OutputSink<'o> {
    pieces: Option<&'o mut Vec<String>>,
    ids: Option<&'o mut Vec<u32>>,
    starts: Option<&'o mut Vec<usize>>,
    ends: Option<&'o mut Vec<usize>>,
}

impl OutputSink<'_> {
    fn len(&self) -> usize {
        match (&self.ids, &self.pieces) {
            (Some(ids), _) => ids.len(),
            (None, Some(pieces)) => pieces.len(),
            (None, None) => 0,
        }
    }

    fn truncate(&mut self, len: usize) {
        if let Some(pieces) = self.pieces.as_deref_mut() {
            pieces.truncate(len);
        }
        if let Some(ids) = self.ids.as_deref_mut() {
            ids.truncate(len);
        }
        if let Some(starts) = self.starts.as_deref_mut() {
            starts.truncate(len);
        }
        if let Some(ends) = self.ends.as_deref_mut() {
            ends.truncate(len);
        }
    }
}

/// WordPiece tokenizer over a borrowed [`TokenizerConfig`].
///
/// Construction wraps the config's trie buffer and validates it; the
/// tokenizer itself holds no mutable state, so one instance can serve any
/// number of threads as long as each call owns its output vectors.
pub struct WordpieceTokenizer<'a> {
    config: &'a TokenizerConfig,
    trie: Trie<'a>,
}

impl<'a> WordpieceTokenizer<'a> {
    /// Wrap a config. Fails if the embedded trie buffer is malformed or
    /// the failure table does not cover the trie's node space.
    pub fn new(config: &'a TokenizerConfig) -> Result<Self, TokenizerError> {
        let trie = Trie::new(&config.trie_units)?;
        if config.failure_structs.len() != trie.num_slots() {
            return Err(TokenizerError::MismatchedFailureTable {
                records: config.failure_structs.len(),
                nodes: trie.num_slots(),
            });
        }
        debug!(
            end_to_end = config.end_to_end,
            trie_slots = trie.num_slots(),
            "wordpiece tokenizer initialized"
        );
        Ok(Self { config, trie })
    }

    /// Tokenize into pieces, ids, and byte offsets.
    ///
    /// `word_offset` is the byte offset of `text` inside an enclosing
    /// string and is added to every emitted offset; in end-to-end mode the
    /// input is the full text, offsets are already absolute, and
    /// `word_offset` is ignored.
    pub fn tokenize(
        &self,
        text: &str,
        pieces: &mut Vec<String>,
        ids: &mut Vec<u32>,
        starts: &mut Vec<usize>,
        ends: &mut Vec<usize>,
        word_offset: usize,
    ) {
        let mut out = OutputSink {
            pieces: Some(pieces),
            ids: Some(ids),
            starts: Some(starts),
            ends: Some(ends),
        };
        self.dispatch(text, word_offset, &mut out);
    }

    /// Tokenize into ids and byte offsets. See [`Self::tokenize`] for the
    /// `word_offset` contract.
    pub fn tokenize_with_offsets(
        &self,
        text: &str,
        ids: &mut Vec<u32>,
        starts: &mut Vec<usize>,
        ends: &mut Vec<usize>,
        word_offset: usize,
    ) {
        let mut out = OutputSink {
            pieces: None,
            ids: Some(ids),
            starts: Some(starts),
            ends: Some(ends),
        };
        self.dispatch(text, word_offset, &mut out);
    }

    /// Tokenize into ids only. See [`Self::tokenize`] for the
    /// `word_offset` contract.
    pub fn tokenize_ids(&self, text: &str, ids: &mut Vec<u32>, word_offset: usize) {
        let mut out = OutputSink {
            pieces: None,
            ids: Some(ids),
            starts: None,
            ends: None,
        };
        self.dispatch(text, word_offset, &mut out);
    }

    /// Tokenize many texts in parallel, ids only.
    pub fn tokenize_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts
            .par_iter()
            .map(|text| {
                let mut ids = Vec::new();
                self.tokenize_ids(text, &mut ids, 0);
                ids
            })
            .collect()
    }

    /// Reassemble words from an id sequence: continuation pieces glue onto
    /// the piece before them, everything else starts a new word.
    ///
    /// Requires a config built with `support_detokenization`; ids past the
    /// vocabulary are rejected.
    pub fn detokenize_to_tokens(&self, ids: &[u32]) -> Result<Vec<String>, TokenizerError> {
        if !self.config.support_detokenization {
            return Err(TokenizerError::DetokenizationDisabled);
        }
        let mut tokens = Vec::new();
        let mut subwords = String::new();
        for &id in ids {
            let piece = self.config.vocab.get(id as usize).ok_or_else(|| {
                TokenizerError::TokenIdOutOfRange {
                    id,
                    vocab_size: self.config.vocab.len(),
                }
            })?;
            let is_suffix = self.config.vocab_is_suffix[id as usize];
            if !subwords.is_empty() && !is_suffix {
                tokens.push(std::mem::take(&mut subwords));
            }
            if subwords.is_empty() && is_suffix {
                // An orphan continuation piece at the start of a word keeps
                // its visible indicator.
                subwords.push_str(&self.config.suffix_indicator);
            }
            subwords.push_str(piece);
        }
        if !subwords.is_empty() {
            tokens.push(subwords);
        }
        Ok(tokens)
    }

    /// [`Self::detokenize_to_tokens`], joined with single spaces.
    pub fn detokenize(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        Ok(self.detokenize_to_tokens(ids)?.join(" "))
    }

    /// Detokenize many id sequences in parallel.
    pub fn detokenize_batch(&self, id_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        id_lists.par_iter().map(|ids| self.detokenize(ids)).collect()
    }

    fn dispatch(&self, text: &str, word_offset: usize, out: &mut OutputSink) {
        if self.config.end_to_end {
            self.tokenize_text(text, out);
        } else {
            self.tokenize_single_word(text, word_offset, out);
        }
    }

    /// Segment one pre-split word. Words above the byte cap, and words the
    /// vocabulary cannot cover, roll back to a single unknown token.
    fn tokenize_single_word(&self, word: &str, word_offset: usize, out: &mut OutputSink) {
        if word.is_empty() {
            return;
        }
        let mut original_num_tokens = out.len();
        if word.len() > self.config.max_bytes_per_token {
            self.rollback_to_unknown(word_offset, word.len(), &mut original_num_tokens, out);
            return;
        }

        let mut cur_offset = 0usize;
        let mut cursor = self.trie.root_cursor();
        for &byte in word.as_bytes() {
            while !self.trie.try_step(&mut cursor, byte) {
                if !self.try_follow_failure_link(word, word_offset, &mut cur_offset, &mut cursor, out)
                {
                    // No failure link: no piece covers the matched prefix,
                    // so the whole word is unknown.
                    self.rollback_to_unknown(
                        word_offset,
                        word.len(),
                        &mut original_num_tokens,
                        out,
                    );
                    return;
                }
            }
        }
        self.flush_trailing_path(
            word,
            word_offset,
            &mut cursor,
            &mut original_num_tokens,
            &mut cur_offset,
            out,
        );
    }

    /// Scan raw text, splitting words and matching pieces in one forward
    /// pass on the shared cursor.
    fn tokenize_text(&self, text: &str, out: &mut OutputSink) {
        if text.is_empty() {
            return;
        }
        let bytes = text.as_bytes();
        let input_size = text.len();
        let mut cur_pos = 0usize;
        let mut original_num_tokens = out.len();
        let mut prev_scalar = '\0';
        let mut cur_scalar = '\0';

        while cur_pos < input_size {
            let word_start = cur_pos;
            let mut cur_offset = 0usize;
            let mut cursor = self.trie.root_cursor();
            let mut word_bytes_so_far = 0usize;
            let mut next_pos = cur_pos;

            // Match scalar by scalar until the input ends, the word hits
            // the byte cap, or the trie stalls with no failure link left.
            'word: while cur_pos < input_size {
                prev_scalar = cur_scalar;
                let Some(scalar) = text[cur_pos..].chars().next() else {
                    break 'word;
                };
                cur_scalar = scalar;
                next_pos = cur_pos + scalar.len_utf8();
                if word_bytes_so_far + (next_pos - cur_pos) > self.config.max_bytes_per_token {
                    break 'word;
                }
                while !self.trie.try_step_bytes(&mut cursor, &bytes[cur_pos..next_pos]) {
                    if !self.try_follow_failure_link(
                        &text[word_start..],
                        word_start,
                        &mut cur_offset,
                        &mut cursor,
                        out,
                    ) {
                        break 'word;
                    }
                }
                word_bytes_so_far += next_pos - cur_pos;
                cur_pos = next_pos;
            }

            if cur_pos >= input_size {
                self.flush_trailing_path(
                    &text[word_start..],
                    word_start,
                    &mut cursor,
                    &mut original_num_tokens,
                    &mut cur_offset,
                    out,
                );
                break;
            }

            let on_whitespace = is_whitespace(cur_scalar);
            if on_whitespace
                || is_punct_or_cjk(cur_scalar)
                || (cur_pos != 0 && is_punct_or_cjk(prev_scalar))
            {
                // Word boundary: flush what the trie is still holding, then
                // skip whitespace. Punctuation is not skipped; it starts
                // the next word.
                self.flush_trailing_path(
                    &text[word_start..cur_pos],
                    word_start,
                    &mut cursor,
                    &mut original_num_tokens,
                    &mut cur_offset,
                    out,
                );
                if on_whitespace {
                    cur_pos = next_pos;
                }
                continue;
            }

            // Mid-word stall on an ordinary scalar: the whole word is
            // unknown. The stalled scalar was already classified, so start
            // the skip after it.
            cur_pos = next_pos;
            let end_of_word = self.skip_rest_of_word(text, &mut cur_pos);
            self.rollback_to_unknown(
                word_start,
                end_of_word - word_start,
                &mut original_num_tokens,
                out,
            );
        }
    }

    /// Advance past the rest of a degenerate word and one trailing
    /// whitespace scalar; returns the exclusive end of the word itself.
    fn skip_rest_of_word(&self, text: &str, cur_pos: &mut usize) -> usize {
        let mut end_of_word = *cur_pos;
        while *cur_pos < text.len() {
            let Some(scalar) = text[*cur_pos..].chars().next() else {
                break;
            };
            let next_pos = *cur_pos + scalar.len_utf8();
            if is_whitespace(scalar) {
                *cur_pos = next_pos;
                break;
            }
            if is_punct_or_cjk(scalar) {
                break;
            }
            end_of_word = next_pos;
            *cur_pos = next_pos;
        }
        end_of_word
    }

    /// One failure transition: emit the tokens covering the popped prefix,
    /// then resume at the failure link. Returns false when the node has no
    /// failure link, meaning the word cannot be segmented.
    fn try_follow_failure_link(
        &self,
        word: &str,
        word_offset: usize,
        cur_offset: &mut usize,
        cursor: &mut TrieCursor,
        out: &mut OutputSink,
    ) -> bool {
        if let Some(encoded) = self.trie.try_read_data(cursor) {
            // Terminal shortcut: the node's own piece is its only pop.
            self.append_token(word, word_offset, cur_offset, encoded, out);
            let link = self.config.failure_struct(cursor.node()).failure_link;
            self.trie.set(cursor, link);
            return true;
        }

        let aux = self.config.failure_struct(cursor.node());
        if aux.failure_link == NULL_NODE {
            return false;
        }
        let (offset, len) = unpack_pops_range(aux.failure_pops);
        for &encoded in &self.config.failure_pops_pool[offset..offset + len] {
            self.append_token(word, word_offset, cur_offset, encoded, out);
        }
        self.trie.set(cursor, aux.failure_link);
        true
    }

    /// After the last byte of a word, the cursor may rest mid-path with
    /// pieces still unemitted. Keep failing over until the cursor reaches a
    /// resting state, or roll the word back to unknown.
    fn flush_trailing_path(
        &self,
        word: &str,
        word_offset: usize,
        cursor: &mut TrieCursor,
        original_num_tokens: &mut usize,
        cur_offset: &mut usize,
        out: &mut OutputSink,
    ) {
        if cursor.node() == ROOT_NODE_ID {
            return;
        }
        if self.try_emit_suffix_indicator_word(
            word,
            word_offset,
            cursor,
            cur_offset,
            *original_num_tokens,
            out,
        ) {
            *original_num_tokens = out.len();
            return;
        }
        while cursor.node() != self.config.trie_suffix_root
            && cursor.node() != self.config.trie_punct_failure_link_node
        {
            if !self.try_follow_failure_link(word, word_offset, cur_offset, cursor, out) {
                self.rollback_to_unknown(word_offset, word.len(), original_num_tokens, out);
                return;
            }
        }
        *original_num_tokens = out.len();
    }

    /// A word that ends exactly on the suffix root without emitting
    /// anything is the suffix indicator itself; replay the precomputed
    /// result for it.
    fn try_emit_suffix_indicator_word(
        &self,
        word: &str,
        word_offset: usize,
        cursor: &TrieCursor,
        cur_offset: &mut usize,
        original_num_tokens: usize,
        out: &mut OutputSink,
    ) -> bool {
        if cursor.node() != self.config.trie_suffix_root || out.len() != original_num_tokens {
            return false;
        }
        let precomputed = &self.config.precomputed_result_for_suffix_indicator;
        if precomputed.len() == 1 && token_id(precomputed[0]) == self.config.unk_token_id {
            let mut baseline = original_num_tokens;
            self.rollback_to_unknown(word_offset, word.len(), &mut baseline, out);
            return true;
        }
        for &encoded in precomputed {
            self.append_token(word, word_offset, cur_offset, encoded, out);
        }
        true
    }

    /// Emit one token: id, piece text synthesized from the input bytes,
    /// and offsets relative to the outer text.
    fn append_token(
        &self,
        word: &str,
        word_offset: usize,
        cur_offset: &mut usize,
        encoded: u32,
        out: &mut OutputSink,
    ) {
        let id = token_id(encoded);
        if let Some(ids) = out.ids.as_deref_mut() {
            ids.push(id);
        }
        let mut piece_len = token_length(encoded);
        if *cur_offset == 0 && is_suffix_token(encoded) {
            // The word literally starts with the suffix indicator; the
            // first emission covers the indicator bytes too.
            piece_len += self.config.suffix_indicator.len();
        }
        if let Some(pieces) = out.pieces.as_deref_mut() {
            let piece = if id == self.config.unk_token_id {
                // Dummy entries for out-of-vocabulary punctuation carry the
                // unknown id; the emitted piece is the unknown token.
                self.config.unk_token.clone()
            } else {
                let bytes = &word.as_bytes()[*cur_offset..*cur_offset + piece_len];
                let text = String::from_utf8_lossy(bytes);
                if *cur_offset > 0 {
                    format!("{}{}", self.config.suffix_indicator, text)
                } else {
                    text.into_owned()
                }
            };
            pieces.push(piece);
        }
        if let Some(starts) = out.starts.as_deref_mut() {
            starts.push(word_offset + *cur_offset);
        }
        if let Some(ends) = out.ends.as_deref_mut() {
            ends.push(word_offset + *cur_offset + piece_len);
        }
        *cur_offset += piece_len;
    }

    /// Discard this word's tentative emissions and record one unknown
    /// token spanning the whole word.
    fn rollback_to_unknown(
        &self,
        word_offset: usize,
        word_len: usize,
        original_num_tokens: &mut usize,
        out: &mut OutputSink,
    ) {
        out.truncate(*original_num_tokens);
        if let Some(pieces) = out.pieces.as_deref_mut() {
            pieces.push(self.config.unk_token.clone());
        }
        if let Some(ids) = out.ids.as_deref_mut() {
            ids.push(self.config.unk_token_id);
        }
        if let Some(starts) = out.starts.as_deref_mut() {
            starts.push(word_offset);
        }
        if let Some(ends) = out.ends.as_deref_mut() {
            ends.push(word_offset + word_len);
        }
        *original_num_tokens += 1;
    }
}
