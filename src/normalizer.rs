//! Derives canonical fields from heterogeneous collection columns. Pure, no I/O.

use std::collections::{BTreeMap, BTreeSet};

use crate::records::{FormatType, NormalizedRecord, RawRecord, YearSource, UNKNOWN};
use crate::year_overrides::YearOverrideTable;

/// Checked in order; the first substring hit wins.
const FORMAT_RULES: [(&str, FormatType); 4] = [
    ("LP", FormatType::Lp),
    ("Single", FormatType::Single),
    ("12\"", FormatType::TwelveInch),
    ("7\"", FormatType::SevenInch),
];

pub struct FieldNormalizer<'a> {
    overrides: &'a YearOverrideTable,
}

impl<'a> FieldNormalizer<'a> {
    pub fn new(overrides: &'a YearOverrideTable) -> Self {
        Self { overrides }
    }

    pub fn normalize(&self, raw: &RawRecord) -> NormalizedRecord {
        let artist = clean_text(raw.artist.as_deref());
        let title = clean_text(raw.title.as_deref());
        let (year, year_source) = self.resolve_year(&artist, &title, raw);
        NormalizedRecord {
            raw: raw.clone(),
            format_clean: clean_text(raw.format.as_deref()),
            format_type: classify_format(raw.format.as_deref()),
            genre_clean: clean_text(raw.genre.as_deref()),
            style_clean: clean_text(raw.style.as_deref()),
            media_condition_clean: clean_text(raw.media_condition.as_deref()),
            decade: decade_label(year),
            year,
            year_source,
            artist,
            title,
        }
    }

    pub fn normalize_all(&self, records: &[RawRecord]) -> Vec<NormalizedRecord> {
        records.iter().map(|record| self.normalize(record)).collect()
    }

    fn resolve_year(&self, artist: &str, title: &str, raw: &RawRecord) -> (Option<i32>, YearSource) {
        if let Some(year) = self.overrides.lookup(artist, title) {
            return (Some(year), YearSource::Override);
        }
        if let Some(year) = raw
            .enrichment
            .original_release_year
            .filter(|year| is_four_digit_year(*year))
        {
            return (Some(year), YearSource::OriginalRelease);
        }
        match raw.released.as_deref().and_then(extract_year) {
            Some(year) => (Some(year), YearSource::Released),
            None => (None, YearSource::Unknown),
        }
    }
}

/// Strips embedded quotes and surrounding whitespace; absent or blank input becomes `Unknown`.
pub fn clean_text(value: Option<&str>) -> String {
    let cleaned = value.unwrap_or_default().replace('"', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Matches against the trimmed format with quotes kept, so the inch rules stay reachable.
pub fn classify_format(format: Option<&str>) -> FormatType {
    let Some(format) = format.map(str::trim) else {
        return FormatType::Other;
    };
    FORMAT_RULES
        .iter()
        .find(|(needle, _)| format.contains(needle))
        .map(|(_, format_type)| *format_type)
        .unwrap_or(FormatType::Other)
}

/// First four consecutive ASCII digits anywhere in `value`; a longer run such as
/// `19730301` yields its leading four.
pub fn extract_year(value: &str) -> Option<i32> {
    let bytes = value.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if !bytes[index].is_ascii_digit() {
            index += 1;
            continue;
        }
        let start = index;
        while index < bytes.len() && bytes[index].is_ascii_digit() {
            index += 1;
        }
        if index - start >= 4 {
            return value[start..start + 4].parse().ok();
        }
    }
    None
}

fn is_four_digit_year(year: i32) -> bool {
    (1000..=9999).contains(&year)
}

pub fn decade_label(year: Option<i32>) -> String {
    match year.filter(|year| is_four_digit_year(*year)) {
        Some(year) => format!("{}0s", &year.to_string()[..3]),
        None => UNKNOWN.to_string(),
    }
}

/// One-line tally of a normalized collection for debug logging.
pub fn collection_breakdown(records: &[NormalizedRecord]) -> String {
    let mut decades = BTreeMap::<&str, usize>::new();
    let mut formats = BTreeMap::<&str, usize>::new();
    let mut format_texts = BTreeSet::<&str>::new();
    let mut sources = [0usize; 4];
    let mut graded = 0usize;
    for record in records {
        *decades.entry(record.decade.as_str()).or_default() += 1;
        *formats.entry(record.format_type.label()).or_default() += 1;
        format_texts.insert(record.format_clean.as_str());
        let slot = match record.year_source {
            YearSource::Override => 0,
            YearSource::OriginalRelease => 1,
            YearSource::Released => 2,
            YearSource::Unknown => 3,
        };
        sources[slot] += 1;
        if record.media_condition_clean != UNKNOWN {
            graded += 1;
        }
    }

    let tally = |counts: &BTreeMap<&str, usize>| {
        counts
            .iter()
            .map(|(label, count)| format!("{label}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        "decades[{}] formats[{}] distinct_formats={} years[override={} original={} released={} unknown={}] graded={}",
        tally(&decades),
        tally(&formats),
        format_texts.len(),
        sources[0],
        sources[1],
        sources[2],
        sources[3],
        graded
    )
}
