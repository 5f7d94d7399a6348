//! Match predicate
//!
//! Decides whether normalized text fits a pattern of line lengths. The pipeline
//! only depends on [`MatchPredicate`]; [`MoraCounter`] is the implementation the
//! binary ships with.

mod dictionary;
mod mora;

pub use dictionary::ReadingDictionary;
pub use mora::{count_morae, fits_segments, MoraCounter, Word};

/// Boolean test of text against a list of segment lengths
pub trait MatchPredicate: Send + Sync {
    fn matches(&self, text: &str, segments: &[usize]) -> bool;
}

impl<F> MatchPredicate for F
where
    F: Fn(&str, &[usize]) -> bool + Send + Sync,
{
    fn matches(&self, text: &str, segments: &[usize]) -> bool {
        self(text, segments)
    }
}
