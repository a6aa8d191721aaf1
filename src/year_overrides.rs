//! Hand-curated original release years for albums the catalog gets wrong.

use std::collections::HashMap;

use crate::config::YearOverrideConfig;

const BUILTIN_YEAR_OVERRIDES: &[(&str, &str, i32)] = &[
    ("Led Zeppelin", "Untitled", 1971),
    ("Black Sabbath", "Master Of Reality", 1971),
    ("Pink Floyd", "Meddle", 1971),
    ("Pink Floyd", "The Dark Side Of The Moon", 1973),
    ("Pink Floyd", "The Wall", 1979),
    ("Pink Floyd", "Wish You Were Here", 1975),
    ("Pink Floyd", "Animals", 1977),
];

/// Read-only `"{artist}|{title}"` -> year lookup, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct YearOverrideTable {
    entries: HashMap<String, i32>,
}

impl YearOverrideTable {
    pub fn builtin() -> Self {
        let entries = BUILTIN_YEAR_OVERRIDES
            .iter()
            .map(|(artist, title, year)| (Self::key(artist, title), *year))
            .collect();
        Self { entries }
    }

    /// Built-in entries with configured ones layered on top.
    pub fn with_configured(configured: &[YearOverrideConfig]) -> Self {
        let mut table = Self::builtin();
        for entry in configured {
            table
                .entries
                .insert(Self::key(&entry.artist, &entry.title), entry.year);
        }
        table
    }

    fn key(artist: &str, title: &str) -> String {
        format!("{artist}|{title}")
    }

    /// Exact-match lookup; no case folding or trimming.
    pub fn lookup(&self, artist: &str, title: &str) -> Option<i32> {
        self.entries.get(&Self::key(artist, title)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
