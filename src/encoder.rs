//! 64-bit name fingerprints used for fast candidate rejection.
//!
//! A fingerprint records which characters occur in a name: one bit per
//! distinct character, chosen by a multiplicative hash. If a pattern's bits
//! are not all present in a candidate's bits, the pattern cannot be a
//! substring of the candidate, so the searcher skips the string comparison.
//! The scheme is pinned: fingerprints are persisted in the warm-start
//! snapshot and must match across process restarts.

const BIT_MIX: u32 = 2654435761;

/// Fingerprint of `name`, case-insensitive.
pub fn encode(name: &str) -> u64 {
    let mut bits: u64 = 0;
    for c in name.chars() {
        for lc in c.to_lowercase() {
            bits |= 1u64 << ((lc as u32).wrapping_mul(BIT_MIX) % 64);
        }
    }
    bits
}

/// True when every bit of `pattern` is set in `candidate`. A false result
/// proves the pattern is not a substring; a true result proves nothing.
#[inline]
pub fn contains_all(pattern: u64, candidate: u64) -> bool {
    pattern & candidate == pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        assert_eq!(encode("ReadMe"), encode("readme"));
        assert_eq!(encode("A"), encode("a"));
    }

    #[test]
    fn subset_law_for_substrings() {
        let pairs = [
            ("md", "README.md"),
            ("main", "domain_name"),
            ("ap", "grape"),
            ("", "anything"),
            ("문서", "공증 문서 스캔"),
        ];
        for (needle, hay) in pairs {
            assert!(
                contains_all(encode(needle), encode(hay)),
                "{needle:?} in {hay:?}"
            );
        }
    }

    #[test]
    fn rejects_missing_characters() {
        // "z" never occurs in "readme", so its bit cannot be covered
        assert!(!contains_all(encode("z"), encode("readme")));
    }

    #[test]
    fn scheme_is_pinned() {
        // These values are persisted in snapshots; changing them invalidates
        // every warm-start cache on disk.
        assert_eq!(encode("a"), 1 << 17);
        assert_eq!(encode("0"), 1 << 48);
    }
}
