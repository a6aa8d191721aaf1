//! Collection files on disk: which file to use, and CSV read/write.

use std::fs;
use std::path::{Path, PathBuf};

use csv::ByteRecord;
use log::{debug, info};

use crate::config::StorageConfig;
use crate::records::{
    EnrichedFields, RawRecord, COLLECTION_COLUMNS, COLUMN_ARTIST, COLUMN_COMMUNITY_RATING,
    COLUMN_FORMAT, COLUMN_GENRE, COLUMN_IMAGE_URL, COLUMN_LABEL, COLUMN_MEDIA_CONDITION,
    COLUMN_ORIGINAL_RELEASE_YEAR, COLUMN_RATING, COLUMN_RELEASED, COLUMN_RELEASE_ID,
    COLUMN_SLEEVE_CONDITION, COLUMN_STYLE, COLUMN_TITLE, COLUMN_TRACKLIST,
};

const ENRICHED_MARKER: &str = "enriched";
const CSV_EXTENSION: &str = "csv";

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("collection file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no collection file available in {}", .0.display())]
    NoCollectionAvailable(PathBuf),
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid collection file {}: {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

/// File-name convention: anything containing `enriched` holds enrichment columns.
pub fn is_enriched_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(ENRICHED_MARKER))
}

/// `x.csv` -> `x_enriched.csv`; enriched paths map to themselves.
pub fn enriched_variant(path: &Path) -> PathBuf {
    if is_enriched_path(path) {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("collection");
    path.with_file_name(format!("{stem}_{ENRICHED_MARKER}.{CSV_EXTENSION}"))
}

fn is_csv_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(CSV_EXTENSION))
}

/// Resolves and persists collection files under one data directory.
#[derive(Debug, Clone)]
pub struct CollectionLoader {
    data_dir: PathBuf,
    collection_file: String,
    enriched_file: String,
}

impl CollectionLoader {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            data_dir: storage.data_dir.clone(),
            collection_file: storage.collection_file.clone(),
            enriched_file: storage.enriched_file.clone(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn default_collection_path(&self) -> PathBuf {
        self.data_dir.join(&self.collection_file)
    }

    pub fn default_enriched_path(&self) -> PathBuf {
        self.data_dir.join(&self.enriched_file)
    }

    pub fn user_collection_path(&self, username: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_collection.{CSV_EXTENSION}", sanitize_file_stem(username)))
    }

    /// Picks the file a request should read. An explicit path must exist; its
    /// enriched sibling wins when present. Without one, the default enriched file,
    /// then the default collection, then the first CSV in the data directory.
    pub fn resolve_collection_path(
        &self,
        explicit: Option<&Path>,
    ) -> Result<PathBuf, CollectionError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(CollectionError::NotFound(path.to_path_buf()));
            }
            return Ok(Self::prefer_enriched(path));
        }

        let default_enriched = self.default_enriched_path();
        if default_enriched.is_file() {
            return Ok(default_enriched);
        }
        let default_collection = self.default_collection_path();
        if default_collection.is_file() {
            return Ok(Self::prefer_enriched(&default_collection));
        }
        self.first_csv_in_data_dir()?
            .map(|path| Self::prefer_enriched(&path))
            .ok_or_else(|| CollectionError::NoCollectionAvailable(self.data_dir.clone()))
    }

    fn prefer_enriched(path: &Path) -> PathBuf {
        let enriched = enriched_variant(path);
        if enriched != path && enriched.is_file() {
            debug!(
                "CollectionLoader: using enriched variant {}",
                enriched.display()
            );
            return enriched;
        }
        path.to_path_buf()
    }

    /// Where enriching `input` writes to, unless the caller names a target.
    pub fn enriched_output_path(&self, input: &Path) -> PathBuf {
        if input == self.default_collection_path() {
            return self.default_enriched_path();
        }
        enriched_variant(input)
    }

    /// An already-downloaded collection for `username`, enriched file first.
    pub fn existing_user_collection(&self, username: &str) -> Option<PathBuf> {
        let raw = self.user_collection_path(username);
        [enriched_variant(&raw), raw]
            .into_iter()
            .find(|path| path.is_file())
    }

    fn csv_files_in_data_dir(&self) -> Result<Vec<PathBuf>, CollectionError> {
        if !self.data_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.data_dir).map_err(|source| CollectionError::Io {
            path: self.data_dir.clone(),
            source,
        })?;
        let mut files = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_csv_file(path))
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }

    fn first_csv_in_data_dir(&self) -> Result<Option<PathBuf>, CollectionError> {
        Ok(self.csv_files_in_data_dir()?.into_iter().next())
    }

    /// Deletes every CSV in the data directory and returns how many were removed.
    pub fn clear_collections(&self) -> Result<usize, CollectionError> {
        let files = self.csv_files_in_data_dir()?;
        for path in &files {
            fs::remove_file(path).map_err(|source| CollectionError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("CollectionLoader: removed {}", path.display());
        }
        info!(
            "CollectionLoader: cleared {} collection files from {}",
            files.len(),
            self.data_dir.display()
        );
        Ok(files.len())
    }
}

fn sanitize_file_stem(username: &str) -> String {
    username
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Header positions of the recognized columns; unrecognized columns are ignored.
struct ColumnIndex {
    artist: Option<usize>,
    title: Option<usize>,
    label: Option<usize>,
    genre: Option<usize>,
    style: Option<usize>,
    released: Option<usize>,
    format: Option<usize>,
    rating: Option<usize>,
    media_condition: Option<usize>,
    sleeve_condition: Option<usize>,
    release_id: Option<usize>,
    original_release_year: Option<usize>,
    community_rating: Option<usize>,
    tracklist: Option<usize>,
    image_url: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &ByteRecord) -> Self {
        let position = |name: &str| {
            headers.iter().position(|header| {
                String::from_utf8_lossy(header)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .eq_ignore_ascii_case(name)
            })
        };
        Self {
            artist: position(COLUMN_ARTIST),
            title: position(COLUMN_TITLE),
            label: position(COLUMN_LABEL),
            genre: position(COLUMN_GENRE),
            style: position(COLUMN_STYLE),
            released: position(COLUMN_RELEASED),
            format: position(COLUMN_FORMAT),
            rating: position(COLUMN_RATING),
            media_condition: position(COLUMN_MEDIA_CONDITION),
            sleeve_condition: position(COLUMN_SLEEVE_CONDITION),
            release_id: position(COLUMN_RELEASE_ID),
            original_release_year: position(COLUMN_ORIGINAL_RELEASE_YEAR),
            community_rating: position(COLUMN_COMMUNITY_RATING),
            tracklist: position(COLUMN_TRACKLIST),
            image_url: position(COLUMN_IMAGE_URL),
        }
    }

    /// Cells that are not valid UTF-8 are decoded lossily rather than rejected.
    fn record(&self, row: &ByteRecord) -> RawRecord {
        let cell = |index: Option<usize>| {
            index
                .and_then(|index| row.get(index))
                .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let number = |index: Option<usize>| {
            cell(index)
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| value.is_finite())
        };
        RawRecord {
            artist: cell(self.artist),
            title: cell(self.title),
            label: cell(self.label),
            genre: cell(self.genre),
            style: cell(self.style),
            released: cell(self.released),
            format: cell(self.format),
            rating: cell(self.rating),
            media_condition: cell(self.media_condition),
            sleeve_condition: cell(self.sleeve_condition),
            release_id: cell(self.release_id),
            enrichment: EnrichedFields {
                original_release_year: number(self.original_release_year)
                    .filter(|year| year.fract() == 0.0 && *year > 0.0 && *year < 10_000.0)
                    .map(|year| year as i32),
                community_rating: number(self.community_rating),
                tracklist_summary: cell(self.tracklist),
                image_url: cell(self.image_url),
            },
        }
    }
}

/// Reads a collection file. Short rows and missing columns load as absent fields;
/// malformed numbers in enrichment columns load as absent, and bytes that are not
/// UTF-8 become replacement characters.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, CollectionError> {
    let csv_error = |source| CollectionError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if !path.is_file() {
        return Err(CollectionError::NotFound(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    let columns = ColumnIndex::from_headers(reader.byte_headers().map_err(csv_error)?);

    let mut records = Vec::new();
    for row in reader.byte_records() {
        records.push(columns.record(&row.map_err(csv_error)?));
    }
    info!(
        "CollectionLoader: loaded {} records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

fn optional_text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Writes all recognized columns, enrichment columns included, in a fixed order.
pub fn save_records(path: &Path, records: &[RawRecord]) -> Result<(), CollectionError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CollectionError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_error = |source| CollectionError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer.write_record(COLLECTION_COLUMNS).map_err(csv_error)?;
    for record in records {
        let enrichment = &record.enrichment;
        writer
            .write_record([
                optional_text(&record.artist),
                optional_text(&record.title),
                optional_text(&record.label),
                optional_text(&record.genre),
                optional_text(&record.style),
                optional_text(&record.released),
                optional_text(&record.format),
                optional_text(&record.rating),
                optional_text(&record.media_condition),
                optional_text(&record.sleeve_condition),
                optional_text(&record.release_id),
                enrichment
                    .original_release_year
                    .map(|year| year.to_string())
                    .unwrap_or_default(),
                enrichment
                    .community_rating
                    .map(|rating| rating.to_string())
                    .unwrap_or_default(),
                optional_text(&enrichment.tracklist_summary),
                optional_text(&enrichment.image_url),
            ])
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|source| CollectionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        "CollectionLoader: saved {} records to {}",
        records.len(),
        path.display()
    );
    Ok(())
}
