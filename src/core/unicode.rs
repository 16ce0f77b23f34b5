//! Scalar classification used for word boundaries.
//!
//! Word splitting needs exactly two predicates: is a scalar whitespace, and
//! is it a punctuation or CJK-ideograph scalar (each of which forms a
//! one-scalar word of its own). The same predicates drive both the config
//! builder (which inserts dummy trie entries for boundary scalars) and the
//! end-to-end scanner, so the two can never disagree on what a word is.
//!
//! Punctuation coverage is the ASCII punctuation ranges plus the common
//! Unicode punctuation blocks rather than the full general-category-P
//! table; CJK coverage is the standard ideograph ranges (URO, extensions
//! A-E, and the compatibility blocks).

/// Whether the scalar has the Unicode `White_Space` property.
#[inline]
pub fn is_whitespace(c: char) -> bool {
    // char::is_whitespace is defined on exactly the White_Space property.
    c.is_whitespace()
}

/// Whether the scalar is punctuation or a CJK ideograph, i.e. a scalar that
/// always forms a single-scalar word.
///
/// Whitespace is never classified as punctuation, even where a punctuation
/// block contains spacing scalars (e.g. U+2000..U+200A).
pub fn is_punct_or_cjk(c: char) -> bool {
    if c.is_whitespace() {
        return false;
    }
    let cp = c as u32;
    if cp < 0x80 {
        return (0x21..=0x2F).contains(&cp)
            || (0x3A..=0x40).contains(&cp)
            || (0x5B..=0x60).contains(&cp)
            || (0x7B..=0x7E).contains(&cp);
    }
    is_non_ascii_punct(cp) || is_cjk_char(cp)
}

/// Common non-ASCII punctuation blocks.
fn is_non_ascii_punct(cp: u32) -> bool {
    matches!(cp, 0xA1 | 0xA7 | 0xAB | 0xB6 | 0xB7 | 0xBB | 0xBF)
        || (0x2000..=0x206F).contains(&cp) // General Punctuation
        || (0x2E00..=0x2E7F).contains(&cp) // Supplemental Punctuation
        || (0x3000..=0x303F).contains(&cp) // CJK Symbols and Punctuation
        || (0xFE30..=0xFE4F).contains(&cp) // CJK Compatibility Forms
        || (0xFE50..=0xFE6F).contains(&cp) // Small Form Variants
        || (0xFF01..=0xFF0F).contains(&cp) // Fullwidth forms
        || (0xFF1A..=0xFF20).contains(&cp)
        || (0xFF3B..=0xFF40).contains(&cp)
        || (0xFF5B..=0xFF65).contains(&cp)
}

/// CJK ideograph ranges: the unified block, extensions A through E, and the
/// compatibility ideograph blocks.
fn is_cjk_char(cp: u32) -> bool {
    (0x4E00..=0x9FFF).contains(&cp)
        || (0x3400..=0x4DBF).contains(&cp)
        || (0x20000..=0x2A6DF).contains(&cp)
        || (0x2A700..=0x2B73F).contains(&cp)
        || (0x2B740..=0x2B81F).contains(&cp)
        || (0x2B820..=0x2CEAF).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0x2F800..=0x2FA1F).contains(&cp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace() {
        assert!(is_whitespace(' '));
        assert!(is_whitespace('\t'));
        assert!(is_whitespace('\n'));
        assert!(is_whitespace('\u{2003}')); // em space
        assert!(is_whitespace('\u{3000}')); // ideographic space
        assert!(!is_whitespace('a'));
        assert!(!is_whitespace('!'));
    }

    #[test]
    fn test_ascii_punctuation() {
        for c in ['!', ',', '.', '?', ';', ':', '[', ']', '~', '@', '`'] {
            assert!(is_punct_or_cjk(c), "{c:?} should be punctuation");
        }
        assert!(!is_punct_or_cjk('a'));
        assert!(!is_punct_or_cjk('Z'));
        assert!(!is_punct_or_cjk('7'));
        assert!(!is_punct_or_cjk(' '));
    }

    #[test]
    fn test_unicode_punctuation() {
        assert!(is_punct_or_cjk('\u{2014}')); // em dash
        assert!(is_punct_or_cjk('\u{00BF}')); // inverted question mark
        assert!(is_punct_or_cjk('\u{3001}')); // ideographic comma
        assert!(is_punct_or_cjk('\u{FF01}')); // fullwidth exclamation
    }

    #[test]
    fn test_cjk_ideographs() {
        assert!(is_punct_or_cjk('世'));
        assert!(is_punct_or_cjk('界'));
        assert!(is_punct_or_cjk('\u{3400}'));
        assert!(is_punct_or_cjk('\u{20000}'));
        assert!(!is_punct_or_cjk('か')); // hiragana is not a boundary
        assert!(!is_punct_or_cjk('한')); // hangul is not a boundary
    }

    #[test]
    fn test_spacing_scalars_in_punct_blocks_stay_whitespace() {
        // U+2003 sits inside the General Punctuation block but carries the
        // White_Space property; the two predicates must stay disjoint.
        assert!(is_whitespace('\u{2003}'));
        assert!(!is_punct_or_cjk('\u{2003}'));
        assert!(!is_punct_or_cjk('\u{3000}'));
    }
}
