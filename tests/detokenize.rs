//! Integration tests for detokenization and tokenize/detokenize round
//! trips.

use wordcleave::{ConfigBuilder, TokenizerError, WordpieceTokenizer};

fn make_config(pieces: &[&str], end_to_end: bool) -> wordcleave::TokenizerConfig {
    let mut vocab = vec!["[UNK]".to_string()];
    vocab.extend(pieces.iter().map(|s| s.to_string()));
    ConfigBuilder::new(vocab, "[UNK]")
        .end_to_end(end_to_end)
        .support_detokenization(true)
        .build()
        .unwrap()
}

#[test]
fn test_continuation_pieces_glue_to_previous_word() {
    let config = make_config(&["hello", "##world", "un", "##aff", "##able"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let tokens = tokenizer.detokenize_to_tokens(&[1, 2]).unwrap();
    assert_eq!(tokens, vec!["helloworld"]);

    let tokens = tokenizer.detokenize_to_tokens(&[3, 4, 5, 1]).unwrap();
    assert_eq!(tokens, vec!["unaffable", "hello"]);
}

#[test]
fn test_detokenize_joins_with_spaces() {
    let config = make_config(&["hello", "##world", "un", "##aff", "##able"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let text = tokenizer.detokenize(&[1, 1, 2, 3, 4, 5]).unwrap();
    assert_eq!(text, "hello helloworld unaffable");
}

#[test]
fn test_leading_orphan_suffix_keeps_indicator() {
    let config = make_config(&["hello", "##world"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let tokens = tokenizer.detokenize_to_tokens(&[2]).unwrap();
    assert_eq!(tokens, vec!["##world"]);

    let tokens = tokenizer.detokenize_to_tokens(&[2, 1]).unwrap();
    assert_eq!(tokens, vec!["##world", "hello"]);
}

#[test]
fn test_unknown_token_detokenizes_as_itself() {
    let config = make_config(&["hello"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let text = tokenizer.detokenize(&[0, 1]).unwrap();
    assert_eq!(text, "[UNK] hello");
}

#[test]
fn test_empty_id_sequence() {
    let config = make_config(&["hello"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    assert!(tokenizer.detokenize_to_tokens(&[]).unwrap().is_empty());
    assert_eq!(tokenizer.detokenize(&[]).unwrap(), "");
}

#[test]
fn test_round_trip_through_end_to_end_tokenization() {
    let config = make_config(&["hello", "##world", "un", "##aff", "##able"], true);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let text = "hello helloworld unaffable";
    let mut ids = Vec::new();
    tokenizer.tokenize_ids(text, &mut ids, 0);
    assert_eq!(tokenizer.detokenize(&ids).unwrap(), text);
}

#[test]
fn test_round_trip_through_single_word_tokenization() {
    let config = make_config(&["play", "##ing", "##s"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let mut ids = Vec::new();
    for word in ["playing", "plays", "play"] {
        tokenizer.tokenize_ids(word, &mut ids, 0);
    }
    assert_eq!(tokenizer.detokenize(&ids).unwrap(), "playing plays play");
}

#[test]
fn test_detokenize_disabled_without_support() {
    let config = ConfigBuilder::new(vec!["[UNK]".into(), "a".into()], "[UNK]")
        .build()
        .unwrap();
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    assert!(matches!(
        tokenizer.detokenize_to_tokens(&[1]),
        Err(TokenizerError::DetokenizationDisabled)
    ));
    assert!(matches!(
        tokenizer.detokenize(&[1]),
        Err(TokenizerError::DetokenizationDisabled)
    ));
}

#[test]
fn test_out_of_range_id_is_rejected() {
    let config = make_config(&["hello"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let err = tokenizer.detokenize(&[1, 2]).unwrap_err();
    assert!(matches!(
        err,
        TokenizerError::TokenIdOutOfRange { id: 2, vocab_size: 2 }
    ));
}

#[test]
fn test_detokenize_batch_matches_individual() {
    let config = make_config(&["hello", "##world"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let lists = vec![vec![1, 2], vec![1, 1], vec![2]];
    let batch = tokenizer.detokenize_batch(&lists).unwrap();
    assert_eq!(batch, vec!["helloworld", "hello hello", "##world"]);
}

#[test]
fn test_detokenize_batch_surfaces_errors() {
    let config = make_config(&["hello"], false);
    let tokenizer = WordpieceTokenizer::new(&config).unwrap();

    let lists = vec![vec![1], vec![99]];
    assert!(tokenizer.detokenize_batch(&lists).is_err());
}
