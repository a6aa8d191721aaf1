//! Collection record model shared by the loader, normalizer, enrichment, and summary stages.

use std::fmt;

/// Sentinel used for any absent or blank text field after cleaning.
pub const UNKNOWN: &str = "Unknown";

pub const COLUMN_ARTIST: &str = "Artist";
pub const COLUMN_TITLE: &str = "Title";
pub const COLUMN_LABEL: &str = "Label";
pub const COLUMN_GENRE: &str = "Genre";
pub const COLUMN_STYLE: &str = "Style";
pub const COLUMN_RELEASED: &str = "Released";
pub const COLUMN_FORMAT: &str = "Format";
pub const COLUMN_RATING: &str = "Rating";
pub const COLUMN_MEDIA_CONDITION: &str = "Collection Media Condition";
pub const COLUMN_SLEEVE_CONDITION: &str = "Collection Sleeve Condition";
pub const COLUMN_RELEASE_ID: &str = "release_id";
pub const COLUMN_ORIGINAL_RELEASE_YEAR: &str = "original_release_year";
pub const COLUMN_COMMUNITY_RATING: &str = "community_rating";
pub const COLUMN_TRACKLIST: &str = "tracklist";
pub const COLUMN_IMAGE_URL: &str = "image_url";

/// Column order used when writing collection files.
pub const COLLECTION_COLUMNS: [&str; 15] = [
    COLUMN_ARTIST,
    COLUMN_TITLE,
    COLUMN_LABEL,
    COLUMN_GENRE,
    COLUMN_STYLE,
    COLUMN_RELEASED,
    COLUMN_FORMAT,
    COLUMN_RATING,
    COLUMN_MEDIA_CONDITION,
    COLUMN_SLEEVE_CONDITION,
    COLUMN_RELEASE_ID,
    COLUMN_ORIGINAL_RELEASE_YEAR,
    COLUMN_COMMUNITY_RATING,
    COLUMN_TRACKLIST,
    COLUMN_IMAGE_URL,
];

/// Catalog-derived fields attached to a record by its release id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedFields {
    /// Master (first pressing) year, distinct from the possibly reissued `released` year.
    pub original_release_year: Option<i32>,
    pub community_rating: Option<f64>,
    /// First five tracks plus a count of the remainder.
    pub tracklist_summary: Option<String>,
    pub image_url: Option<String>,
}

impl EnrichedFields {
    pub fn is_empty(&self) -> bool {
        self.original_release_year.is_none()
            && self.community_rating.is_none()
            && self.tracklist_summary.is_none()
            && self.image_url.is_none()
    }
}

/// One row of a collection file. Every column is optional; blank cells load as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub label: Option<String>,
    pub genre: Option<String>,
    pub style: Option<String>,
    pub released: Option<String>,
    pub format: Option<String>,
    pub rating: Option<String>,
    pub media_condition: Option<String>,
    pub sleeve_condition: Option<String>,
    pub release_id: Option<String>,
    pub enrichment: EnrichedFields,
}

impl RawRecord {
    /// Parses the catalog release id. Accepts `123` and the float form `123.0`
    /// that spreadsheet round-trips tend to produce.
    pub fn catalog_release_id(&self) -> Option<u64> {
        let raw = self.release_id.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<u64>() {
            return (id > 0).then_some(id);
        }
        let (whole, fraction) = raw.split_once('.')?;
        if !fraction.chars().all(|ch| ch == '0') {
            return None;
        }
        whole.parse::<u64>().ok().filter(|id| *id > 0)
    }

    /// Returns the user rating when it parses as a positive number.
    /// A zero rating is how the catalog marks "not rated".
    pub fn numeric_rating(&self) -> Option<f64> {
        self.rating
            .as_deref()
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
    }
}

/// Coarse physical format category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    Lp,
    Single,
    TwelveInch,
    SevenInch,
    Other,
}

impl FormatType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Lp => "LP",
            Self::Single => "Single",
            Self::TwelveInch => "12\"",
            Self::SevenInch => "7\"",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which input decided a record's year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSource {
    Override,
    OriginalRelease,
    Released,
    Unknown,
}

/// A record with every derived field resolved. Built only by `FieldNormalizer`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub raw: RawRecord,
    pub artist: String,
    pub title: String,
    pub format_clean: String,
    pub format_type: FormatType,
    pub genre_clean: String,
    pub style_clean: String,
    pub media_condition_clean: String,
    /// `None` is the unknown-year sentinel.
    pub year: Option<i32>,
    pub year_source: YearSource,
    /// `"1970s"` form, or `"Unknown"`.
    pub decade: String,
}

impl NormalizedRecord {
    pub fn year_label(&self) -> String {
        self.year
            .map(|year| year.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn has_genre(&self) -> bool {
        self.genre_clean != UNKNOWN
    }

    pub fn has_style(&self) -> bool {
        self.style_clean != UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use super::{EnrichedFields, FormatType, RawRecord};

    fn record_with_release_id(value: &str) -> RawRecord {
        RawRecord {
            release_id: Some(value.to_string()),
            ..RawRecord::default()
        }
    }

    #[test]
    fn test_catalog_release_id_accepts_integer_and_float_forms() {
        assert_eq!(record_with_release_id("249504").catalog_release_id(), Some(249504));
        assert_eq!(record_with_release_id(" 249504.0 ").catalog_release_id(), Some(249504));
    }

    #[test]
    fn test_catalog_release_id_rejects_garbage_and_zero() {
        assert_eq!(record_with_release_id("abc").catalog_release_id(), None);
        assert_eq!(record_with_release_id("12.5").catalog_release_id(), None);
        assert_eq!(record_with_release_id("0").catalog_release_id(), None);
        assert_eq!(record_with_release_id("").catalog_release_id(), None);
        assert_eq!(RawRecord::default().catalog_release_id(), None);
    }

    #[test]
    fn test_numeric_rating_treats_zero_as_unrated() {
        let mut record = RawRecord {
            rating: Some("0".to_string()),
            ..RawRecord::default()
        };
        assert_eq!(record.numeric_rating(), None);
        record.rating = Some("4".to_string());
        assert_eq!(record.numeric_rating(), Some(4.0));
        record.rating = Some("great".to_string());
        assert_eq!(record.numeric_rating(), None);
    }

    #[test]
    fn test_enriched_fields_is_empty_only_when_all_fields_absent() {
        assert!(EnrichedFields::default().is_empty());
        let fields = EnrichedFields {
            image_url: Some("https://img.example/cover.jpg".to_string()),
            ..EnrichedFields::default()
        };
        assert!(!fields.is_empty());
    }

    #[test]
    fn test_format_type_labels() {
        assert_eq!(FormatType::TwelveInch.to_string(), "12\"");
        assert_eq!(FormatType::Lp.label(), "LP");
        assert_eq!(FormatType::Other.label(), "Other");
    }
}
