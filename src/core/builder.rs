//! Offline assembly of a [`TokenizerConfig`] from a vocabulary.
//!
//! The runtime never looks a piece up by string: it walks a byte trie of
//! the vocabulary and, when a byte cannot be consumed, follows a
//! precomputed failure link after emitting the tokens recorded as that
//! node's failure pops. This module computes all of it:
//!
//! - the double-array trie over the piece strings,
//! - per-node failure links and failure pops,
//! - the precomputed result for an input word equal to the suffix
//!   indicator itself,
//! - in end-to-end mode, dummy terminal entries (encoded with the
//!   unknown-token id) for every punctuation/CJK scalar missing from the
//!   vocabulary, plus the dead node their failure links point to.
//!
//! # Failure links and pops
//!
//! Let `str(v)` be the bytes on the path from the root to node `v`. The
//! failure link `f(v)` is the node representing the longest tokenizable
//! remainder of `str(v)` as a continuation (a `##`-rooted path), and the
//! failure pops `F(v)` are the pieces covering the prefix that was popped
//! to get there. With vocabulary `{a, abcd, ##b, ##bc, ##z}`:
//!
//! ```text
//!      v |   ""    #   ##    a    ab   abc    abcd    ##b    ##bc   ##z
//!   F(v) |   []   []   []  [a]   [a]   [a]  [abcd]  [##b]  [##bc] [##z]
//!   f(v) |    -    -    -   ##   ##b  ##bc      ##     ##      ##    ##
//! ```
//!
//! A terminal node pops its own piece and fails over to the suffix root.
//! A non-terminal node chains through its parent's failure state,
//! accumulating pops, until the chain either consumes the node's edge byte
//! or runs out. The computation processes nodes in order of the length of
//! the word remainder they represent (path length, minus the indicator for
//! continuation paths), so every chain value it consults is already final.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use super::codec::{
    encode_token, pack_pops_range, MAX_PIECE_BYTES, MAX_POPS_LENGTH, MAX_POPS_OFFSET, MAX_TOKEN_ID,
    NULL_NODE,
};
use super::config::{FailureStruct, TokenizerConfig};
use super::trie::TrieBuilder;
use super::unicode::{is_punct_or_cjk, is_whitespace};

/// Errors raised while assembling a config.
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("vocabulary contains no pieces")]
    EmptyVocab,
    #[error("suffix indicator must be non-empty")]
    EmptySuffixIndicator,
    #[error("max_bytes_per_token must be positive")]
    ZeroMaxBytesPerToken,
    #[error("unknown token {0:?} is not in the vocabulary")]
    MissingUnkToken(String),
    #[error("vocabulary piece at id {0} is empty")]
    EmptyPiece(usize),
    #[error("duplicate vocabulary piece {0:?}")]
    DuplicatePiece(String),
    #[error("piece {0:?} is longer than {MAX_PIECE_BYTES} bytes after removing the suffix indicator")]
    PieceTooLong(String),
    #[error("vocabulary has {0} pieces; at most {max} are addressable", max = MAX_TOKEN_ID as u64 + 1)]
    VocabTooLarge(usize),
    #[error("a trie node accumulated more than {MAX_POPS_LENGTH} failure pops")]
    FailurePopsOverflow,
    #[error("failure pops pool grew past {MAX_POPS_OFFSET} entries")]
    FailurePopsPoolOverflow,
}

/// Builder for [`TokenizerConfig`].
///
/// ```no_run
/// use wordcleave::ConfigBuilder;
///
/// let vocab = vec!["[UNK]".into(), "a".into(), "##b".into()];
/// let config = ConfigBuilder::new(vocab, "[UNK]")
///     .suffix_indicator("##")
///     .max_bytes_per_token(100)
///     .end_to_end(true)
///     .support_detokenization(true)
///     .build()
///     .unwrap();
/// ```
pub struct ConfigBuilder {
    vocab: Vec<String>,
    suffix_indicator: String,
    unk_token: String,
    max_bytes_per_token: usize,
    end_to_end: bool,
    support_detokenization: bool,
}

/// How the failure chain of a node resolves.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Link {
    /// No failure link; matching fails here and the word maps to unknown.
    None,
    /// Resume at a builder node.
    Node(usize),
    /// Resume at the dead punctuation sink (end-to-end mode only).
    PunctSink,
}

impl ConfigBuilder {
    /// Start a builder over `vocab`, where the piece at index `i` has id
    /// `i`. `unk_token` must name one of the pieces.
    pub fn new(vocab: Vec<String>, unk_token: &str) -> Self {
        Self {
            vocab,
            suffix_indicator: "##".to_string(),
            unk_token: unk_token.to_string(),
            max_bytes_per_token: 100,
            end_to_end: false,
            support_detokenization: false,
        }
    }

    /// Continuation-piece marker. Defaults to `"##"`.
    pub fn suffix_indicator(mut self, indicator: &str) -> Self {
        self.suffix_indicator = indicator.to_string();
        self
    }

    /// Byte-length cap per word; longer words map to one unknown token.
    /// Defaults to 100.
    pub fn max_bytes_per_token(mut self, max: usize) -> Self {
        self.max_bytes_per_token = max;
        self
    }

    /// Build for raw-text scanning (word splitting included) instead of
    /// pre-split single words. Defaults to false.
    pub fn end_to_end(mut self, end_to_end: bool) -> Self {
        self.end_to_end = end_to_end;
        self
    }

    /// Retain the vocabulary arrays so ids can be detokenized back to
    /// text. Defaults to false.
    pub fn support_detokenization(mut self, support: bool) -> Self {
        self.support_detokenization = support;
        self
    }

    /// Assemble the config.
    pub fn build(self) -> Result<TokenizerConfig, BuilderError> {
        if self.vocab.is_empty() {
            return Err(BuilderError::EmptyVocab);
        }
        if self.suffix_indicator.is_empty() {
            return Err(BuilderError::EmptySuffixIndicator);
        }
        if self.max_bytes_per_token == 0 {
            return Err(BuilderError::ZeroMaxBytesPerToken);
        }
        if self.vocab.len() > MAX_TOKEN_ID as usize + 1 {
            return Err(BuilderError::VocabTooLarge(self.vocab.len()));
        }
        let unk_token_id = self
            .vocab
            .iter()
            .position(|piece| *piece == self.unk_token)
            .ok_or_else(|| BuilderError::MissingUnkToken(self.unk_token.clone()))?
            as u32;

        let indicator = self.suffix_indicator.as_str();

        // Classify pieces, reject malformed vocabularies, and collect the
        // trie entries. The piece equal to the indicator itself gets no
        // trie data; words matching it are answered from the precomputed
        // result instead.
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut full_map: FxHashMap<&str, u32> = FxHashMap::default();
        let mut trie_entries: Vec<(&str, u32, bool)> = Vec::new();
        let mut vocab_out: Vec<String> = Vec::new();
        let mut vocab_is_suffix: Vec<bool> = Vec::new();
        let mut skipped = 0usize;

        for (id, piece) in self.vocab.iter().enumerate() {
            if piece.is_empty() {
                return Err(BuilderError::EmptyPiece(id));
            }
            if !seen.insert(piece.as_str()) {
                return Err(BuilderError::DuplicatePiece(piece.clone()));
            }

            if piece.as_str() == indicator {
                full_map.insert(piece.as_str(), encode_token(id as u32, piece.len(), false));
                if self.support_detokenization {
                    vocab_out.push(String::new());
                    vocab_is_suffix.push(true);
                }
                continue;
            }

            let (matchable, is_suffix) = match piece.strip_prefix(indicator) {
                Some(body) => (body, true),
                None => (piece.as_str(), false),
            };
            if matchable.len() > MAX_PIECE_BYTES {
                return Err(BuilderError::PieceTooLong(piece.clone()));
            }
            if self.support_detokenization {
                vocab_out.push(matchable.to_string());
                vocab_is_suffix.push(is_suffix);
            }

            let encoded = encode_token(id as u32, matchable.len(), is_suffix);
            let single_boundary = single_boundary_scalar(matchable);
            if self.end_to_end && !representable_end_to_end(matchable, is_suffix, single_boundary)
            {
                // Unmatchable under the boundary rule (e.g. "[UNK]"): keep
                // the id for detokenization, leave the trie without it.
                skipped += 1;
                continue;
            }
            full_map.insert(piece.as_str(), encoded);
            trie_entries.push((piece.as_str(), encoded, single_boundary && !is_suffix));
        }

        // Trie assembly: vocabulary entries, the suffix-indicator path, and
        // (end-to-end) dummy entries for out-of-vocabulary boundary scalars.
        let mut trie = TrieBuilder::new();
        let mut punct_terminals: FxHashSet<usize> = FxHashSet::default();
        for &(key, encoded, single_boundary) in &trie_entries {
            let node = trie.insert(key.as_bytes(), Some(encoded));
            if self.end_to_end && single_boundary {
                punct_terminals.insert(node);
            }
        }
        let suffix_root = trie.insert(indicator.as_bytes(), None);
        if self.end_to_end {
            let mut scalar_buf = [0u8; 4];
            for cp in (0u32..=0x10FFFF).filter_map(char::from_u32) {
                if !is_punct_or_cjk(cp) {
                    continue;
                }
                let key: &str = cp.encode_utf8(&mut scalar_buf);
                if seen.contains(key) || key == indicator {
                    continue;
                }
                let encoded = encode_token(unk_token_id, key.len(), false);
                let node = trie.insert(key.as_bytes(), Some(encoded));
                punct_terminals.insert(node);
            }
        }

        let (link, pops) =
            compute_failure_structure(&trie, suffix_root, indicator, &punct_terminals)?;

        // Freeze the trie and rewrite the failure structure in the
        // double-array id space, interning pops lists into one pool.
        let frozen = trie.freeze(self.end_to_end);
        let punct_sink = frozen.dead_node.unwrap_or(NULL_NODE);
        let num_slots = frozen.units.len() / 2;
        let mut failure_structs = vec![
            FailureStruct {
                failure_link: NULL_NODE,
                failure_pops: 0,
            };
            num_slots
        ];
        let mut pool: Vec<u32> = Vec::new();
        let mut interned: FxHashMap<Vec<u32>, u32> = FxHashMap::default();
        for v in 1..trie.num_nodes() {
            let failure_link = match link[v] {
                Link::None => NULL_NODE,
                Link::Node(t) => frozen.node_ids[t],
                Link::PunctSink => punct_sink,
            };
            // Terminal nodes never read their pops range: the runtime
            // shortcut emits the node's own data instead.
            let failure_pops = if trie.value(v).is_some() || pops[v].is_empty() {
                0
            } else {
                intern_pops(&mut pool, &mut interned, &pops[v])?
            };
            failure_structs[frozen.node_ids[v] as usize] = FailureStruct {
                failure_link,
                failure_pops,
            };
        }

        let precomputed = precompute_suffix_indicator_result(indicator, &full_map, unk_token_id);

        if skipped > 0 {
            debug!(
                skipped,
                "pieces not representable under the end-to-end boundary rule were left out of the trie"
            );
        }
        debug!(
            vocab_size = self.vocab.len(),
            trie_nodes = trie.num_nodes(),
            trie_slots = num_slots,
            pops_pool = pool.len(),
            end_to_end = self.end_to_end,
            "wordpiece config built"
        );

        Ok(TokenizerConfig {
            vocab: vocab_out,
            vocab_is_suffix,
            suffix_indicator: self.suffix_indicator,
            unk_token: self.unk_token,
            unk_token_id,
            max_bytes_per_token: self.max_bytes_per_token,
            end_to_end: self.end_to_end,
            support_detokenization: self.support_detokenization,
            trie_suffix_root: frozen.node_ids[suffix_root],
            trie_punct_failure_link_node: punct_sink,
            failure_structs,
            failure_pops_pool: pool,
            precomputed_result_for_suffix_indicator: precomputed,
            trie_units: frozen.units,
        })
    }
}

/// Whether `text` is exactly one punctuation/CJK scalar.
fn single_boundary_scalar(text: &str) -> bool {
    let mut scalars = text.chars();
    match (scalars.next(), scalars.next()) {
        (Some(c), None) => is_punct_or_cjk(c),
        _ => false,
    }
}

/// Whether a piece can ever match under the end-to-end boundary rule: no
/// whitespace anywhere, and punctuation/CJK only as a single-scalar
/// word-initial piece.
fn representable_end_to_end(matchable: &str, is_suffix: bool, single_boundary: bool) -> bool {
    if matchable.chars().any(is_whitespace) {
        return false;
    }
    if single_boundary {
        return !is_suffix;
    }
    !matchable.chars().any(is_punct_or_cjk)
}

/// Compute failure links and pops for every builder node.
fn compute_failure_structure(
    trie: &TrieBuilder,
    suffix_root: usize,
    indicator: &str,
    punct_terminals: &FxHashSet<usize>,
) -> Result<(Vec<Link>, Vec<Vec<u32>>), BuilderError> {
    let n = trie.num_nodes();

    // Nodes along the indicator path (suffix root included) anchor the
    // continuation state machine; they represent a zero-length remainder.
    let mut indicator_path: FxHashSet<usize> = FxHashSet::default();
    let mut node = 0usize;
    for &b in indicator.as_bytes() {
        let Some(next) = trie.child(node, b) else { break };
        indicator_path.insert(next);
        node = next;
    }

    // Group nodes by remainder length so failure chains only ever consult
    // finished nodes.
    let bfs = trie.bfs_order();
    let mut remainder_len = vec![0u32; n];
    for &v in bfs.iter().skip(1) {
        remainder_len[v] = if indicator_path.contains(&v) {
            0
        } else {
            remainder_len[trie.parent(v)] + 1
        };
    }
    let max_len = remainder_len.iter().copied().max().unwrap_or(0) as usize;
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); max_len + 1];
    for &v in bfs.iter().skip(1) {
        groups[remainder_len[v] as usize].push(v);
    }

    let mut link = vec![Link::None; n];
    let mut pops: Vec<Vec<u32>> = vec![Vec::new(); n];

    for group in &groups {
        for &v in group {
            if v == suffix_root {
                continue;
            }
            if let Some(data) = trie.value(v) {
                pops[v] = vec![data];
                link[v] = if punct_terminals.contains(&v) {
                    Link::PunctSink
                } else {
                    Link::Node(suffix_root)
                };
                continue;
            }
            if indicator_path.contains(&v) {
                continue;
            }

            let parent = trie.parent(v);
            let label = trie.label(v);
            let mut acc = pops[parent].clone();
            let mut z = link[parent];
            loop {
                let Link::Node(zn) = z else {
                    link[v] = Link::None;
                    acc.clear();
                    break;
                };
                if let Some(target) = trie.child(zn, label) {
                    link[v] = Link::Node(target);
                    break;
                }
                acc.extend_from_slice(&pops[zn]);
                z = link[zn];
            }
            if matches!(link[v], Link::Node(_)) {
                if acc.len() > MAX_POPS_LENGTH {
                    return Err(BuilderError::FailurePopsOverflow);
                }
                pops[v] = acc;
            }
        }
    }

    Ok((link, pops))
}

/// Intern a pops list into the shared pool, reusing identical lists.
fn intern_pops(
    pool: &mut Vec<u32>,
    interned: &mut FxHashMap<Vec<u32>, u32>,
    list: &[u32],
) -> Result<u32, BuilderError> {
    if let Some(&packed) = interned.get(list) {
        return Ok(packed);
    }
    let offset = pool.len();
    if offset > MAX_POPS_OFFSET {
        return Err(BuilderError::FailurePopsPoolOverflow);
    }
    pool.extend_from_slice(list);
    let packed = pack_pops_range(offset, list.len());
    interned.insert(list.to_vec(), packed);
    Ok(packed)
}

/// Greedy longest-match segmentation of the suffix indicator itself,
/// falling back to a single unknown token. The runtime replays this result
/// whenever an input word is exactly the indicator.
fn precompute_suffix_indicator_result(
    indicator: &str,
    full_map: &FxHashMap<&str, u32>,
    unk_token_id: u32,
) -> Vec<u32> {
    let unknown = vec![encode_token(unk_token_id, indicator.len(), false)];
    let mut result = Vec::new();
    let mut pos = 0usize;
    while pos < indicator.len() {
        let ends: Vec<usize> = indicator[pos..]
            .char_indices()
            .map(|(i, c)| pos + i + c.len_utf8())
            .collect();
        let mut matched = None;
        for &end in ends.iter().rev() {
            let encoded = if pos == 0 {
                full_map.get(&indicator[..end]).copied()
            } else {
                let candidate = format!("{}{}", indicator, &indicator[pos..end]);
                full_map.get(candidate.as_str()).copied()
            };
            if let Some(e) = encoded {
                matched = Some((e, end));
                break;
            }
        }
        let Some((encoded, end)) = matched else {
            return unknown;
        };
        result.push(encoded);
        pos = end;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{is_suffix_token, token_id, token_length};

    fn vocab(pieces: &[&str]) -> Vec<String> {
        pieces.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_unk_token() {
        let err = ConfigBuilder::new(vocab(&["a", "b"]), "[UNK]").build();
        assert!(matches!(err, Err(BuilderError::MissingUnkToken(_))));
    }

    #[test]
    fn test_empty_vocab() {
        let err = ConfigBuilder::new(vec![], "[UNK]").build();
        assert!(matches!(err, Err(BuilderError::EmptyVocab)));
    }

    #[test]
    fn test_duplicate_piece() {
        let err = ConfigBuilder::new(vocab(&["[UNK]", "a", "a"]), "[UNK]").build();
        assert!(matches!(err, Err(BuilderError::DuplicatePiece(_))));
    }

    #[test]
    fn test_empty_piece() {
        let err = ConfigBuilder::new(vocab(&["[UNK]", ""]), "[UNK]").build();
        assert!(matches!(err, Err(BuilderError::EmptyPiece(1))));
    }

    #[test]
    fn test_empty_suffix_indicator() {
        let err = ConfigBuilder::new(vocab(&["[UNK]"]), "[UNK]")
            .suffix_indicator("")
            .build();
        assert!(matches!(err, Err(BuilderError::EmptySuffixIndicator)));
    }

    #[test]
    fn test_piece_too_long() {
        let long = "x".repeat(MAX_PIECE_BYTES + 1);
        let err = ConfigBuilder::new(vocab(&["[UNK]", &long]), "[UNK]").build();
        assert!(matches!(err, Err(BuilderError::PieceTooLong(_))));
    }

    #[test]
    fn test_build_minimal_config() {
        let config = ConfigBuilder::new(vocab(&["[UNK]", "a", "##b"]), "[UNK]")
            .build()
            .unwrap();
        assert_eq!(config.unk_token_id(), 0);
        assert_eq!(config.suffix_indicator(), "##");
        assert!(!config.end_to_end());
        assert!(!config.supports_detokenization());
        assert_eq!(config.vocab_size(), 0); // arrays dropped without detok
    }

    #[test]
    fn test_detok_arrays_strip_indicator() {
        let config = ConfigBuilder::new(vocab(&["[UNK]", "ab", "##cd", "##"]), "[UNK]")
            .support_detokenization(true)
            .build()
            .unwrap();
        assert_eq!(config.vocab, vec!["[UNK]", "ab", "cd", ""]);
        assert_eq!(config.vocab_is_suffix, vec![false, false, true, true]);
    }

    #[test]
    fn test_precomputed_result_when_indicator_in_vocab() {
        let config = ConfigBuilder::new(vocab(&["[UNK]", "##", "a"]), "[UNK]")
            .build()
            .unwrap();
        let result = &config.precomputed_result_for_suffix_indicator;
        assert_eq!(result.len(), 1);
        assert_eq!(token_id(result[0]), 1);
        assert_eq!(token_length(result[0]), 2);
        assert!(!is_suffix_token(result[0]));
    }

    #[test]
    fn test_precomputed_result_falls_back_to_unknown() {
        let config = ConfigBuilder::new(vocab(&["[UNK]", "a"]), "[UNK]")
            .build()
            .unwrap();
        let result = &config.precomputed_result_for_suffix_indicator;
        assert_eq!(result.len(), 1);
        assert_eq!(token_id(result[0]), config.unk_token_id());
        assert_eq!(token_length(result[0]), 2);
    }

    #[test]
    fn test_precomputed_result_segments_indicator() {
        // "##" = "#" + "###"(suffix "#"), when "##" itself is absent.
        let config = ConfigBuilder::new(vocab(&["[UNK]", "#", "###"]), "[UNK]")
            .build()
            .unwrap();
        let result = &config.precomputed_result_for_suffix_indicator;
        assert_eq!(result.len(), 2);
        assert_eq!(token_id(result[0]), 1);
        assert!(!is_suffix_token(result[0]));
        assert_eq!(token_id(result[1]), 2);
        assert!(is_suffix_token(result[1]));
        assert_eq!(token_length(result[1]), 1);
    }

    #[test]
    fn test_end_to_end_reserves_punct_sink() {
        let e2e = ConfigBuilder::new(vocab(&["[UNK]", "a"]), "[UNK]")
            .end_to_end(true)
            .build()
            .unwrap();
        assert_ne!(e2e.trie_punct_failure_link_node, NULL_NODE);

        let single = ConfigBuilder::new(vocab(&["[UNK]", "a"]), "[UNK]")
            .build()
            .unwrap();
        assert_eq!(single.trie_punct_failure_link_node, NULL_NODE);
    }

    #[test]
    fn test_end_to_end_trie_is_larger_by_dummy_entries() {
        let single = ConfigBuilder::new(vocab(&["[UNK]", "a"]), "[UNK]")
            .build()
            .unwrap();
        let e2e = ConfigBuilder::new(vocab(&["[UNK]", "a"]), "[UNK]")
            .end_to_end(true)
            .build()
            .unwrap();
        assert!(e2e.trie_units.len() > single.trie_units.len());
    }
}
