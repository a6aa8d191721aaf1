//! Discogs catalog adapter: paginated collection fetch, release/master lookups,
//! and normalization of catalog payloads into collection records.

use std::io::Read;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, info, warn};
use serde_json::Value;

use crate::catalog::{CatalogError, CatalogToken, CatalogTransport, RequestPacing};
use crate::config::CatalogConfig;
use crate::records::{EnrichedFields, RawRecord, UNKNOWN};

const TRACKLIST_PREVIEW_LEN: usize = 5;
const MAX_CONSECUTIVE_PAGE_ERRORS: u32 = 2;
const RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);
const NOTE_FIELD_MEDIA_CONDITION: u64 = 1;
const NOTE_FIELD_SLEEVE_CONDITION: u64 = 2;

/// Catalog transport backed by `ureq`.
pub struct UreqCatalogTransport {
    http_client: ureq::Agent,
    base_url: String,
    user_agent: String,
}

impl UreqCatalogTransport {
    pub fn new(config: &CatalogConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(config.request_timeout())
            .build();
        Self {
            http_client,
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    fn classify_ureq_failure(error: ureq::Error) -> CatalogError {
        match error {
            ureq::Error::Status(code, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_default()
                    .chars()
                    .take(200)
                    .collect::<String>();
                match code {
                    404 => CatalogError::NotFound(message),
                    429 => CatalogError::RateLimited(message),
                    401 | 403 => CatalogError::Unauthorized(message),
                    408 | 500 | 502 | 503 | 504 => {
                        CatalogError::Transient(format!("status {code}: {message}"))
                    }
                    status => CatalogError::Http { status, message },
                }
            }
            ureq::Error::Transport(transport) => {
                CatalogError::Transient(format!("Request failed: {transport}"))
            }
        }
    }
}

impl CatalogTransport for UreqCatalogTransport {
    fn get_json(&self, path: &str, token: &CatalogToken) -> Result<Value, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .set("Authorization", &format!("Discogs token={}", token.as_str()))
            .call()
            .map_err(Self::classify_ureq_failure)?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| CatalogError::Transient(format!("Failed to read response: {error}")))?;
        serde_json::from_str(&body)
            .map_err(|error| CatalogError::InvalidResponse(format!("{error}; path={path}")))
    }
}

/// Rate-limited catalog client. Every request waits for a limiter slot; failures
/// never escape as panics.
pub struct CatalogClient<T> {
    transport: T,
    pacing: RequestPacing,
    page_size: u32,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl<T: CatalogTransport> CatalogClient<T> {
    pub fn new(transport: T, pacing: RequestPacing, page_size: u32) -> Self {
        let limiter = Quota::with_period(pacing.request_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            transport,
            pacing,
            page_size: page_size.max(1),
            limiter,
        }
    }

    fn wait_for_request_slot(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        while limiter.check().is_err() {
            std::thread::sleep(RATE_LIMIT_POLL_INTERVAL);
        }
    }

    fn pause(duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn retry_backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(MAX_RETRY_BACKOFF)
            .min(MAX_RETRY_BACKOFF)
    }

    fn get_with_retry(
        &self,
        path: &str,
        token: &CatalogToken,
        label: &str,
    ) -> Result<Value, CatalogError> {
        let mut attempt = 1u32;
        loop {
            self.wait_for_request_slot();
            match self.transport.get_json(path, token) {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.pacing.max_attempts => {
                    let backoff = Self::retry_backoff_delay(self.pacing.error_backoff, attempt);
                    info!(
                        "Catalog[{}]: attempt {} failed ({}), retrying in {:?}",
                        label, attempt, error, backoff
                    );
                    Self::pause(backoff);
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Walks every collection page of `username`. Ends on an empty page, a missing
    /// page past the first, the last advertised page, or two consecutive failures;
    /// whatever was gathered so far is returned.
    pub fn fetch_user_collection(
        &self,
        token: &CatalogToken,
        username: &str,
    ) -> Result<Vec<RawRecord>, CatalogError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CatalogError::NotFound("empty username".to_string()));
        }
        let encoded_username = urlencoding::encode(username);
        let mut records = Vec::new();
        let mut page = 1u32;
        let mut consecutive_errors = 0u32;
        let mut last_error = None;

        info!("Catalog[user:{}]: fetching collection", username);
        while consecutive_errors < MAX_CONSECUTIVE_PAGE_ERRORS {
            let path = format!(
                "/users/{encoded_username}/collection/folders/0/releases?page={page}&per_page={}",
                self.page_size
            );
            self.wait_for_request_slot();
            match self.transport.get_json(&path, token) {
                Ok(payload) => {
                    consecutive_errors = 0;
                    let items = payload
                        .get("releases")
                        .and_then(Value::as_array)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    if items.is_empty() {
                        info!("Catalog[user:{}]: page {} is empty, done", username, page);
                        break;
                    }
                    let before = records.len();
                    records.extend(items.iter().filter_map(Self::parse_collection_item));
                    info!(
                        "Catalog[user:{}]: page {} yielded {} of {} items",
                        username,
                        page,
                        records.len() - before,
                        items.len()
                    );
                    let total_pages = payload
                        .pointer("/pagination/pages")
                        .and_then(Value::as_u64);
                    if total_pages.is_some_and(|pages| u64::from(page) >= pages) {
                        break;
                    }
                    Self::pause(self.pacing.page_interval);
                    page = page.saturating_add(1);
                }
                Err(CatalogError::NotFound(message)) if page > 1 => {
                    info!(
                        "Catalog[user:{}]: page {} past the end ({})",
                        username, page, message
                    );
                    break;
                }
                Err(error @ (CatalogError::NotFound(_) | CatalogError::Unauthorized(_))) => {
                    return Err(error);
                }
                Err(error) => {
                    consecutive_errors += 1;
                    warn!(
                        "Catalog[user:{}]: page {} failed ({}), consecutive_errors={}",
                        username, page, error, consecutive_errors
                    );
                    last_error = Some(error);
                    Self::pause(self.pacing.error_backoff);
                }
            }
        }

        match last_error {
            Some(error) if records.is_empty() => Err(error),
            _ => {
                info!(
                    "Catalog[user:{}]: collected {} records",
                    username,
                    records.len()
                );
                Ok(records)
            }
        }
    }

    /// Looks up one release and, when it points at a master, the master's year.
    /// A release with nothing usable yields all-`None` fields rather than an error.
    pub fn fetch_release_details(
        &self,
        token: &CatalogToken,
        release_id: u64,
    ) -> Result<EnrichedFields, CatalogError> {
        let label = format!("release:{release_id}");
        let release = self.get_with_retry(&format!("/releases/{release_id}"), token, &label)?;
        let release_year = catalog_year(release.get("year"));
        let master_id = release
            .get("master_id")
            .and_then(Value::as_u64)
            .filter(|id| *id > 0);

        let original_release_year = match master_id {
            Some(master_id) => match self.fetch_master_year(token, master_id, &label) {
                Ok(Some(year)) => {
                    debug!("Catalog[{}]: original year {} from master {}", label, year, master_id);
                    Some(year)
                }
                Ok(None) => release_year,
                Err(error) => {
                    warn!(
                        "Catalog[{}]: master {} lookup failed ({}), using release year",
                        label, master_id, error
                    );
                    release_year
                }
            },
            None => release_year,
        };

        Ok(enriched_fields_from_release(&release, original_release_year))
    }

    fn fetch_master_year(
        &self,
        token: &CatalogToken,
        master_id: u64,
        label: &str,
    ) -> Result<Option<i32>, CatalogError> {
        let master = self.get_with_retry(&format!("/masters/{master_id}"), token, label)?;
        Ok(catalog_year(master.get("year")))
    }

    fn parse_collection_item(item: &Value) -> Option<RawRecord> {
        let Some(info) = item.get("basic_information") else {
            warn!("Catalog: collection item without basic_information skipped");
            return None;
        };
        let release_id = info
            .get("id")
            .or_else(|| item.get("id"))
            .and_then(Value::as_u64);
        let rating = item
            .get("rating")
            .and_then(Value::as_i64)
            .filter(|rating| *rating > 0)
            .map(|rating| rating.to_string());

        Some(RawRecord {
            artist: Some(
                first_name(info.get("artists"))
                    .map(|name| strip_name_disambiguation(&name))
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            ),
            title: text_field(info.get("title")),
            label: first_name(info.get("labels")),
            genre: joined_strings(info.get("genres")),
            style: joined_strings(info.get("styles")),
            released: catalog_year(info.get("year")).map(|year| year.to_string()),
            format: format_text(info.get("formats")),
            rating,
            media_condition: note_value(item, NOTE_FIELD_MEDIA_CONDITION),
            sleeve_condition: note_value(item, NOTE_FIELD_SLEEVE_CONDITION),
            release_id: release_id.map(|id| id.to_string()),
            enrichment: EnrichedFields::default(),
        })
    }
}

/// Builds the four enrichment fields from a release payload.
pub fn enriched_fields_from_release(
    release: &Value,
    original_release_year: Option<i32>,
) -> EnrichedFields {
    let rating_count = release
        .pointer("/community/rating/count")
        .and_then(Value::as_u64);
    let community_rating = release
        .pointer("/community/rating/average")
        .and_then(Value::as_f64)
        .filter(|_| rating_count != Some(0));
    let tracklist_summary = release
        .get("tracklist")
        .and_then(Value::as_array)
        .and_then(|tracks| summarize_tracklist(tracks));
    let image_url = release
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| {
            images.iter().find(|image| {
                matches!(
                    image.get("type").and_then(Value::as_str),
                    Some("primary" | "secondary")
                )
            })
        })
        .and_then(|image| text_field(image.get("uri")));

    EnrichedFields {
        original_release_year,
        community_rating,
        tracklist_summary,
        image_url,
    }
}

fn summarize_tracklist(tracks: &[Value]) -> Option<String> {
    if tracks.is_empty() {
        return None;
    }
    let preview = tracks
        .iter()
        .take(TRACKLIST_PREVIEW_LEN)
        .map(|track| {
            let title = track
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();
            match track
                .get("position")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|position| !position.is_empty())
            {
                Some(position) => format!("{position}. {title}"),
                None => title.to_string(),
            }
        })
        .collect::<Vec<_>>();
    let mut summary = preview.join("; ");
    if tracks.len() > TRACKLIST_PREVIEW_LEN {
        summary.push_str(&format!(
            "; ... (+{} more)",
            tracks.len() - TRACKLIST_PREVIEW_LEN
        ));
    }
    Some(summary)
}

/// Catalog years are integers where 0 means unknown; some payloads carry strings.
fn catalog_year(value: Option<&Value>) -> Option<i32> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
        .filter(|year| (1000..=9999).contains(year))
        .and_then(|year| i32::try_from(year).ok())
}

fn text_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn first_name(entries: Option<&Value>) -> Option<String> {
    entries
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .and_then(|entry| text_field(entry.get("name")))
}

fn joined_strings(values: Option<&Value>) -> Option<String> {
    let joined = values
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

/// `Vinyl` + `["LP", "Album"]` becomes `Vinyl, LP, Album`.
fn format_text(formats: Option<&Value>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for format in formats.and_then(Value::as_array).into_iter().flatten() {
        if let Some(name) = text_field(format.get("name")) {
            parts.push(name);
        }
        if let Some(descriptions) = joined_strings(format.get("descriptions")) {
            parts.push(descriptions);
        }
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn note_value(item: &Value, field_id: u64) -> Option<String> {
    item.get("notes")
        .and_then(Value::as_array)?
        .iter()
        .find(|note| note.get("field_id").and_then(Value::as_u64) == Some(field_id))
        .and_then(|note| text_field(note.get("value")))
}

/// The catalog suffixes duplicate artist names with ` (2)`, ` (3)`, ...
fn strip_name_disambiguation(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(open) = trimmed.rfind(" (") {
        let inner = &trimmed[open + 2..];
        if let Some(number) = inner.strip_suffix(')') {
            if !number.is_empty() && number.chars().all(|ch| ch.is_ascii_digit()) {
                return trimmed[..open].to_string();
            }
        }
    }
    trimmed.to_string()
}
