//! Dictionary-backed mora counter
//!
//! Splits text into words (dictionary entries or single kana syllables), counts
//! the morae of each and checks whether word boundaries divide the text into
//! the requested line lengths.

use super::dictionary::ReadingDictionary;
use super::MatchPredicate;
use tracing::debug;

/// Kana that merge with the preceding syllable
const SMALL_KANA: &str = "ゃゅょぁぃぅぇぉゎャュョァィゥェォヮ";

/// Characters that separate words without adding morae
const SEPARATORS: &str = "、。，．,.!?！？「」『』（）()・…〜~：:；;\"'　";

/// A counted word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub surface: String,
    pub morae: usize,
}

/// Mora-counting predicate
#[derive(Debug, Clone)]
pub struct MoraCounter {
    dictionary: ReadingDictionary,
}

impl Default for MoraCounter {
    fn default() -> Self {
        Self::new(ReadingDictionary::builtin())
    }
}

impl MoraCounter {
    pub fn new(dictionary: ReadingDictionary) -> Self {
        Self { dictionary }
    }

    /// Split text into counted words
    ///
    /// Returns `None` when a character has no known reading.
    pub fn words(&self, text: &str) -> Option<Vec<Word>> {
        let chars: Vec<char> = text.chars().collect();
        let mut words = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() || SEPARATORS.contains(c) {
                i += 1;
                continue;
            }

            if let Some((len, reading)) = self.dictionary.longest_match(&chars, i) {
                words.push(Word {
                    surface: chars[i..i + len].iter().collect(),
                    morae: count_morae(reading)?,
                });
                i += len;
                continue;
            }

            if !is_kana(c) {
                debug!(character = %c, "No reading for character");
                return None;
            }

            // One syllable: a kana plus any small kana that follow it
            let start = i;
            i += 1;
            while i < chars.len() && SMALL_KANA.contains(chars[i]) {
                i += 1;
            }
            let surface: String = chars[start..i].iter().collect();
            words.push(Word {
                morae: count_morae(&surface)?,
                surface,
            });
        }

        Some(words)
    }
}

impl MatchPredicate for MoraCounter {
    fn matches(&self, text: &str, segments: &[usize]) -> bool {
        let Some(words) = self.words(text) else {
            return false;
        };
        let matched = fits_segments(&words, segments);
        debug!(
            text = text,
            segments = ?segments,
            words = ?words.iter().map(|w| (w.surface.as_str(), w.morae)).collect::<Vec<_>>(),
            matched = matched,
            "Mora check"
        );
        matched
    }
}

/// Whether the words fill every segment exactly, breaking only between words
pub fn fits_segments(words: &[Word], segments: &[usize]) -> bool {
    if segments.is_empty() {
        return false;
    }

    let mut segment = 0;
    let mut filled = 0;
    for word in words {
        if word.morae == 0 {
            continue;
        }
        if segment >= segments.len() {
            return false;
        }
        filled += word.morae;
        if filled > segments[segment] {
            return false;
        }
        if filled == segments[segment] {
            segment += 1;
            filled = 0;
        }
    }

    segment == segments.len() && filled == 0
}

/// Morae in a kana string, `None` if it contains anything else
pub fn count_morae(reading: &str) -> Option<usize> {
    let mut morae = 0;
    for c in reading.chars() {
        if SMALL_KANA.contains(c) {
            continue;
        }
        if !is_kana(c) {
            return None;
        }
        morae += 1;
    }
    Some(morae)
}

fn is_kana(c: char) -> bool {
    matches!(c, 'ぁ'..='ゖ' | 'ァ'..='ヺ' | 'ー')
}
