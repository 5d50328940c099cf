//! Byte-level placeholder scanner.
//!
//! Every placeholder token starts with a shared prefix (e.g. `$sw`). The
//! scanner looks for the prefix and then matches all candidate tokens in
//! lockstep, dropping a candidate on its first mismatching byte. The first
//! candidate to reach its full length wins, so when one token is a prefix of
//! another the shorter one is chosen.
//!
//! Scanning is pure: no I/O, no state kept between calls. Continuation across
//! chunk boundaries is expressed through the returned carry-over, which the
//! caller prepends to the next chunk.

use bytes::Bytes;
use edge_core::WorkerConfig;

/// Errors raised while building a [`PlaceholderSet`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScanError {
    /// The shared prefix is empty.
    #[error("placeholder prefix is empty")]
    EmptyPrefix,

    /// A token does not start with the shared prefix.
    #[error("placeholder '{token}' does not start with prefix '{prefix}'")]
    MissingPrefix { token: String, prefix: String },

    /// A token consists of the prefix only.
    #[error("placeholder '{0}' has nothing after the prefix")]
    PrefixOnly(String),
}

/// A complete token match inside a scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Index of the matched token in the set.
    pub index: usize,
    /// Offset of the first token byte.
    pub start: usize,
    /// Offset one past the last token byte.
    pub end: usize,
}

/// Result of scanning one buffer.
///
/// With a match, `before` and `after` surround the token. Without one,
/// `before` holds the bytes that are safe to emit and `after` is empty.
/// `carry_over` holds trailing bytes that may start a token continued in
/// the next chunk; it is always empty on the final chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub matched: Option<Match>,
    pub before: Bytes,
    pub after: Bytes,
    pub carry_over: Bytes,
}

impl ScanOutcome {
    fn pass_through(buffer: &Bytes) -> Self {
        Self {
            matched: None,
            before: buffer.clone(),
            after: Bytes::new(),
            carry_over: Bytes::new(),
        }
    }
}

/// What happened when matching at one prefix position.
enum Attempt {
    /// Token `index` matched completely with the given length.
    Complete { index: usize, len: usize },
    /// The buffer ended while at least one candidate was still viable.
    Partial,
    /// Every candidate was eliminated.
    Mismatch,
}

/// The configured placeholder tokens plus their shared prefix.
#[derive(Debug, Clone)]
pub struct PlaceholderSet {
    prefix: Vec<u8>,
    tokens: Vec<Vec<u8>>,
    max_len: usize,
}

impl PlaceholderSet {
    /// Build a set, checking every token against the prefix convention.
    pub fn new<I, T>(prefix: impl AsRef<[u8]>, tokens: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let prefix = prefix.as_ref().to_vec();
        if prefix.is_empty() {
            return Err(ScanError::EmptyPrefix);
        }

        let mut checked = Vec::new();
        for token in tokens {
            let token = token.as_ref();
            if !token.starts_with(&prefix) {
                return Err(ScanError::MissingPrefix {
                    token: String::from_utf8_lossy(token).into_owned(),
                    prefix: String::from_utf8_lossy(&prefix).into_owned(),
                });
            }
            if token.len() == prefix.len() {
                return Err(ScanError::PrefixOnly(
                    String::from_utf8_lossy(token).into_owned(),
                ));
            }
            checked.push(token.to_vec());
        }

        let max_len = checked.iter().map(Vec::len).max().unwrap_or(0);
        Ok(Self {
            prefix,
            tokens: checked,
            max_len,
        })
    }

    /// Build the set of the configured fragments, in configuration order.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, ScanError> {
        Self::new(
            config.placeholder_prefix.as_bytes(),
            config.cached_parts.iter().map(|p| p.token_bytes()),
        )
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the set has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token bytes by index.
    pub fn token(&self, index: usize) -> Option<&[u8]> {
        self.tokens.get(index).map(Vec::as_slice)
    }

    /// Length of the longest token.
    pub fn max_token_len(&self) -> usize {
        self.max_len
    }

    /// Indices `(shorter, longer)` of a token that is a prefix of another.
    pub fn ambiguous_pair(&self) -> Option<(usize, usize)> {
        for (i, a) in self.tokens.iter().enumerate() {
            for (j, b) in self.tokens.iter().enumerate() {
                if i != j && b.starts_with(a) {
                    return Some((i, j));
                }
            }
        }
        None
    }

    /// Scan `buffer` for the first complete token.
    pub fn scan(&self, buffer: &Bytes, is_final: bool) -> ScanOutcome {
        if self.tokens.is_empty() {
            return ScanOutcome::pass_through(buffer);
        }

        let first = self.prefix[0];
        let mut viable = vec![false; self.tokens.len()];
        let mut pos = 0;

        while let Some(offset) = buffer[pos..].iter().position(|&b| b == first) {
            let start = pos + offset;
            match self.attempt(&buffer[start..], &mut viable) {
                Attempt::Complete { index, len } => {
                    tracing::trace!(index, start, "placeholder matched");
                    return ScanOutcome {
                        matched: Some(Match {
                            index,
                            start,
                            end: start + len,
                        }),
                        before: buffer.slice(..start),
                        after: buffer.slice(start + len..),
                        carry_over: Bytes::new(),
                    };
                }
                Attempt::Partial if !is_final => {
                    return ScanOutcome {
                        matched: None,
                        before: buffer.slice(..start),
                        after: Bytes::new(),
                        carry_over: buffer.slice(start..),
                    };
                }
                Attempt::Partial | Attempt::Mismatch => pos = start + 1,
            }
        }

        ScanOutcome::pass_through(buffer)
    }

    /// Match every candidate against `rest`, which starts at a prefix byte.
    fn attempt(&self, rest: &[u8], viable: &mut [bool]) -> Attempt {
        let prefix_len = self.prefix.len();
        if rest.len() < prefix_len {
            return if self.prefix.starts_with(rest) {
                Attempt::Partial
            } else {
                Attempt::Mismatch
            };
        }
        if !rest.starts_with(&self.prefix) {
            return Attempt::Mismatch;
        }

        viable.fill(true);
        let mut k = prefix_len;
        loop {
            // Shortest surviving candidate completes first.
            if let Some(index) = (0..self.tokens.len())
                .find(|&i| viable[i] && self.tokens[i].len() == k)
            {
                return Attempt::Complete { index, len: k };
            }

            if k == rest.len() {
                return if viable.iter().any(|&v| v) {
                    Attempt::Partial
                } else {
                    Attempt::Mismatch
                };
            }

            let byte = rest[k];
            let mut any = false;
            for (i, token) in self.tokens.iter().enumerate() {
                if viable[i] {
                    if token[k] == byte {
                        any = true;
                    } else {
                        viable[i] = false;
                    }
                }
            }
            if !any {
                return Attempt::Mismatch;
            }
            k += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> PlaceholderSet {
        PlaceholderSet::new("$sw", ["$swheader$", "$swfooter$"]).unwrap()
    }

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    /// Feed `chunks` the way the rewriter does and collect (token, offset) pairs
    /// plus the emitted pass-through bytes.
    fn feed(set: &PlaceholderSet, chunks: &[&str]) -> (Vec<usize>, Vec<u8>) {
        let mut matches = Vec::new();
        let mut emitted = Vec::new();
        let mut carry = Bytes::new();

        for (n, chunk) in chunks.iter().enumerate() {
            let is_final = n + 1 == chunks.len();
            let mut buffer: Bytes = [carry.as_ref(), chunk.as_bytes()].concat().into();
            loop {
                let outcome = set.scan(&buffer, is_final);
                emitted.extend_from_slice(&outcome.before);
                carry = outcome.carry_over;
                match outcome.matched {
                    Some(m) => {
                        matches.push(m.index);
                        emitted.extend_from_slice(b"<>");
                        buffer = outcome.after;
                    }
                    None => break,
                }
            }
        }

        assert!(carry.is_empty());
        (matches, emitted)
    }

    // === Construction Tests ===

    #[test]
    fn test_rejects_token_without_prefix() {
        let err = PlaceholderSet::new("$sw", ["$swheader$", "{{footer}}"]).unwrap_err();
        assert_eq!(
            err,
            ScanError::MissingPrefix {
                token: "{{footer}}".to_string(),
                prefix: "$sw".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_prefix_only_token() {
        assert_eq!(
            PlaceholderSet::new("$sw", ["$sw"]).unwrap_err(),
            ScanError::PrefixOnly("$sw".to_string())
        );
    }

    #[test]
    fn test_rejects_empty_prefix() {
        assert_eq!(
            PlaceholderSet::new("", ["$x$"]).unwrap_err(),
            ScanError::EmptyPrefix
        );
    }

    #[test]
    fn test_ambiguous_pair() {
        assert!(set().ambiguous_pair().is_none());
        let set = PlaceholderSet::new("$sw", ["$swhead$x", "$swhead$"]).unwrap();
        assert_eq!(set.ambiguous_pair(), Some((1, 0)));
    }

    // === Single Buffer Tests ===

    #[test]
    fn test_finds_first_token() {
        let buffer = b("<html>$swheader$body$swfooter$</html>");
        let outcome = set().scan(&buffer, true);

        let m = outcome.matched.unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(&buffer[m.start..m.end], b"$swheader$");
        assert_eq!(outcome.before, b("<html>"));
        assert_eq!(outcome.after, b("body$swfooter$</html>"));
        assert!(outcome.carry_over.is_empty());
    }

    #[test]
    fn test_match_reconstructs_buffer() {
        let inputs = [
            "$swfooter$",
            "x$swheader$",
            "$swheader$y",
            "$$swfooter$$",
            "$sw$swheader$",
            "<p>$swfoo $swfooter$</p>",
        ];
        for input in inputs {
            let buffer = b(input);
            let outcome = set().scan(&buffer, true);
            let m = outcome.matched.expect(input);
            let rebuilt = [
                outcome.before.as_ref(),
                &buffer[m.start..m.end],
                outcome.after.as_ref(),
            ]
            .concat();
            assert_eq!(rebuilt, input.as_bytes(), "input {:?}", input);
        }
    }

    #[test]
    fn test_no_token_passes_through() {
        let buffer = b("<html>$ nothing $s here $swoop</html>");
        let outcome = set().scan(&buffer, false);
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.before, buffer);
        assert!(outcome.carry_over.is_empty());
    }

    #[test]
    fn test_empty_buffer() {
        let outcome = set().scan(&Bytes::new(), false);
        assert!(outcome.matched.is_none());
        assert!(outcome.before.is_empty());
        assert!(outcome.carry_over.is_empty());
    }

    #[test]
    fn test_empty_set_passes_through() {
        let set = PlaceholderSet::new("$sw", Vec::<&str>::new()).unwrap();
        let buffer = b("$swheader$");
        assert_eq!(set.scan(&buffer, false), ScanOutcome::pass_through(&buffer));
    }

    #[test]
    fn test_shortest_complete_token_wins() {
        let set = PlaceholderSet::new("$sw", ["$swhead$more", "$swhead$"]).unwrap();
        let outcome = set.scan(&b("a$swhead$more"), true);
        let m = outcome.matched.unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(outcome.after, b("more"));
    }

    // === Carry-over Tests ===

    #[test]
    fn test_partial_token_is_carried() {
        let outcome = set().scan(&b("<html>$swhea"), false);
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.before, b("<html>"));
        assert_eq!(outcome.carry_over, b("$swhea"));
    }

    #[test]
    fn test_partial_prefix_is_carried() {
        let outcome = set().scan(&b("<html>$s"), false);
        assert_eq!(outcome.carry_over, b("$s"));
        let outcome = set().scan(&b("<html>$"), false);
        assert_eq!(outcome.carry_over, b("$"));
    }

    #[test]
    fn test_final_chunk_has_no_carry() {
        let outcome = set().scan(&b("<html>$swhea"), true);
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.before, b("<html>$swhea"));
        assert!(outcome.carry_over.is_empty());
    }

    #[test]
    fn test_final_chunk_skips_dead_partial_and_keeps_scanning() {
        let set = PlaceholderSet::new("$sw", ["$swa$swb$swc", "$swb$"]).unwrap();
        let buffer = b("$swa$swb$");

        // More input could still complete the long token at offset 0.
        let outcome = set.scan(&buffer, false);
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.carry_over, buffer);

        // On the final chunk it cannot, so the short token at offset 4 wins.
        let outcome = set.scan(&buffer, true);
        let m = outcome.matched.unwrap();
        assert_eq!((m.index, m.start, m.end), (1, 4, 9));
        assert_eq!(outcome.before, b("$swa"));
    }

    #[test]
    fn test_carry_never_exceeds_longest_token() {
        let set = set();
        let body = "<html>$swheader$body$swfooter$</html>";
        for end in 0..=body.len() {
            let outcome = set.scan(&b(&body[..end]), false);
            assert!(outcome.carry_over.len() <= set.max_token_len());
        }
    }

    // === Split Tests ===

    #[test]
    fn test_any_split_point_matches_whole_buffer() {
        let set = set();
        let body = "<html>$swheader$body$swfooter$</html>";
        let whole = feed(&set, &[body]);
        assert_eq!(whole.0, vec![0, 1]);
        assert_eq!(whole.1, b"<html><>body<></html>");

        for split in 0..=body.len() {
            let (left, right) = body.split_at(split);
            assert_eq!(feed(&set, &[left, right]), whole, "split at {}", split);
        }
    }

    #[test]
    fn test_token_split_across_many_chunks() {
        let set = set();
        let chunks = ["<a>$", "s", "wfo", "oter", "$</a>"];
        let (matches, emitted) = feed(&set, &chunks);
        assert_eq!(matches, vec![1]);
        assert_eq!(emitted, b"<a><></a>");
    }

    #[test]
    fn test_overlapping_partial_then_complete() {
        // "$sw" could start a token at offset 0 until the second '$' arrives.
        let set = set();
        let (matches, emitted) = feed(&set, &["x$sw", "$swheader$y"]);
        assert_eq!(matches, vec![0]);
        assert_eq!(emitted, b"x$sw<>y");
    }
}
