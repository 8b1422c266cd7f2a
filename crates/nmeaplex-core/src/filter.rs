//! Sentence predicates applied around the queues.
//!
//! Input filters and checksum checks run before a sentence is queued;
//! output filters run before it is transmitted. A rejection is a routine
//! drop, never an error.

use std::sync::Arc;

use nmeaplex_frame::SentenceBlock;

/// A side-effect-free accept/reject decision on a sentence.
pub trait SentenceFilter: Send + Sync {
    /// Returns true if the sentence should pass.
    fn accept(&self, sentence: &SentenceBlock) -> bool;
}

impl<F> SentenceFilter for F
where
    F: Fn(&SentenceBlock) -> bool + Send + Sync,
{
    fn accept(&self, sentence: &SentenceBlock) -> bool {
        self(sentence)
    }
}

/// Shared handle to a filter, cloned into both halves of a pair.
pub type FilterHandle = Arc<dyn SentenceFilter>;

/// Passes every sentence.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SentenceFilter for AcceptAll {
    fn accept(&self, _sentence: &SentenceBlock) -> bool {
        true
    }
}

/// Passes sentences whose NMEA 0183 checksum is present and correct.
#[derive(Debug, Clone, Copy, Default)]
pub struct NmeaChecksum;

impl SentenceFilter for NmeaChecksum {
    fn accept(&self, sentence: &SentenceBlock) -> bool {
        checksum_ok(sentence)
    }
}

/// XOR of every byte in `data`.
pub fn nmea_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Validate a `$...*hh` or `!...*hh` sentence checksum.
pub fn checksum_ok(sentence: &SentenceBlock) -> bool {
    let body = sentence.body();
    let Some((&lead, rest)) = body.split_first() else {
        return false;
    };
    if lead != b'$' && lead != b'!' {
        return false;
    }
    let Some(star) = rest.iter().rposition(|&b| b == b'*') else {
        return false;
    };
    let (payload, digits) = (&rest[..star], &rest[star + 1..]);
    if digits.len() != 2 {
        return false;
    }
    match (hex_value(digits[0]), hex_value(digits[1])) {
        (Some(hi), Some(lo)) => ((hi << 4) | lo) == nmea_checksum(payload),
        _ => false,
    }
}

/// Apply an optional filter; no filter means accept.
pub(crate) fn passes(filter: Option<&FilterHandle>, sentence: &SentenceBlock) -> bool {
    filter.is_none_or(|f| f.accept(sentence))
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
