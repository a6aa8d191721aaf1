//! Sequential batch enrichment of collection records from the catalog.

use log::{debug, info, warn};

use crate::catalog::discogs::CatalogClient;
use crate::catalog::{CatalogError, CatalogToken, CatalogTransport};
use crate::records::RawRecord;

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("a catalog token is required for enrichment")]
    MissingCredential,
    #[error("catalog rejected the token, enrichment aborted: {0}")]
    Unauthorized(String),
}

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentProgress {
    pub processed: usize,
    pub total: usize,
    pub enriched: usize,
}

/// Result of one run. `records` has the same length and order as the input.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentReport {
    pub records: Vec<RawRecord>,
    pub total: usize,
    pub enriched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl EnrichmentReport {
    pub fn is_partial(&self) -> bool {
        self.skipped > 0 || self.failed > 0
    }

    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "Enriched {} of {} records ({} without a release id, {} failed)",
            self.enriched, self.total, self.skipped, self.failed
        );
        if self.failed > 0 {
            line.push_str("; some items could not be enriched");
        }
        line
    }
}

type ProgressCallback<'a> = Box<dyn FnMut(EnrichmentProgress) + 'a>;

pub struct EnrichmentEngine<'a, T> {
    client: &'a CatalogClient<T>,
    progress_interval: usize,
    on_progress: Option<ProgressCallback<'a>>,
}

impl<'a, T: CatalogTransport> EnrichmentEngine<'a, T> {
    pub fn new(client: &'a CatalogClient<T>, progress_interval: usize) -> Self {
        Self {
            client,
            progress_interval: progress_interval.max(1),
            on_progress: None,
        }
    }

    pub fn with_progress_callback(
        mut self,
        callback: impl FnMut(EnrichmentProgress) + 'a,
    ) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Annotates each record in place, one catalog lookup at a time. Records
    /// without a usable release id, or whose lookup fails, pass through unchanged.
    /// Only a rejected token stops the run.
    pub fn enrich(
        &mut self,
        token: Option<&CatalogToken>,
        mut records: Vec<RawRecord>,
    ) -> Result<EnrichmentReport, EnrichmentError> {
        let token = token.ok_or(EnrichmentError::MissingCredential)?;
        let total = records.len();
        let mut enriched = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        info!("Enrichment: starting run total={}", total);
        for (index, record) in records.iter_mut().enumerate() {
            if index % self.progress_interval == 0 {
                info!("Enrichment: processing {}/{}", index + 1, total);
                if let Some(callback) = self.on_progress.as_mut() {
                    callback(EnrichmentProgress {
                        processed: index,
                        total,
                        enriched,
                    });
                }
            }

            let Some(release_id) = record.catalog_release_id() else {
                debug!(
                    "Enrichment[row:{}]: no valid release id ({:?}), skipping",
                    index + 1,
                    record.release_id
                );
                skipped += 1;
                continue;
            };

            match self.client.fetch_release_details(token, release_id) {
                Ok(fields) => {
                    if fields.is_empty() {
                        debug!(
                            "Enrichment[release:{}]: catalog returned no usable fields",
                            release_id
                        );
                    }
                    record.enrichment = fields;
                    enriched += 1;
                }
                Err(CatalogError::Unauthorized(message)) => {
                    return Err(EnrichmentError::Unauthorized(message));
                }
                Err(CatalogError::MissingCredential) => {
                    return Err(EnrichmentError::MissingCredential);
                }
                Err(error) => {
                    warn!(
                        "Enrichment[release:{}]: lookup failed, leaving record as-is: {}",
                        release_id, error
                    );
                    failed += 1;
                }
            }
        }

        let report = EnrichmentReport {
            records,
            total,
            enriched,
            skipped,
            failed,
        };
        if let Some(callback) = self.on_progress.as_mut() {
            callback(EnrichmentProgress {
                processed: total,
                total,
                enriched,
            });
        }
        info!("Enrichment: {}", report.summary_line());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::{EnrichmentEngine, EnrichmentError};
    use crate::catalog::discogs::CatalogClient;
    use crate::catalog::test_support::ScriptedTransport;
    use crate::catalog::{CatalogError, CatalogToken, RequestPacing};
    use crate::records::{EnrichedFields, RawRecord};

    fn record(title: &str, release_id: &str) -> RawRecord {
        RawRecord {
            artist: Some("Can".to_string()),
            title: Some(title.to_string()),
            release_id: Some(release_id.to_string()),
            ..RawRecord::default()
        }
    }

    fn scripted_release(transport: &ScriptedTransport, id: u64, year: i64) {
        transport.push_ok(
            &format!("/releases/{id}"),
            json!({
                "year": year,
                "community": {"rating": {"average": 4.2, "count": 10}},
                "tracklist": [{"position": "A1", "title": "Opener"}]
            }),
        );
    }

    fn token() -> CatalogToken {
        CatalogToken::new("secret").expect("token")
    }

    #[test]
    fn test_invalid_release_id_leaves_item_untouched_and_keeps_order() {
        let transport = ScriptedTransport::default();
        for id in [1, 2, 4, 5] {
            scripted_release(&transport, id, 1970 + id as i64);
        }
        let client = CatalogClient::new(transport, RequestPacing::immediate(), 100);
        let input = vec![
            record("One", "1"),
            record("Two", "2"),
            record("Three", "not-an-id"),
            record("Four", "4"),
            record("Five", "5"),
        ];

        let report = EnrichmentEngine::new(&client, 10)
            .enrich(Some(&token()), input.clone())
            .expect("enrichment");

        assert_eq!(report.records.len(), 5);
        assert_eq!(report.records[2], input[2]);
        for index in [0, 1, 3, 4] {
            assert_eq!(report.records[index].title, input[index].title);
            assert!(report.records[index].enrichment.original_release_year.is_some());
        }
        assert_eq!(report.enriched, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(report.is_partial());
    }

    #[test]
    fn test_failed_lookup_is_counted_and_batch_continues() {
        let transport = ScriptedTransport::default();
        scripted_release(&transport, 1, 1971);
        transport.push_err("/releases/2", CatalogError::NotFound("gone".to_string()));
        scripted_release(&transport, 3, 1973);
        let client = CatalogClient::new(transport, RequestPacing::immediate(), 100);

        let report = EnrichmentEngine::new(&client, 10)
            .enrich(
                Some(&token()),
                vec![record("A", "1"), record("B", "2"), record("C", "3")],
            )
            .expect("enrichment");
        assert_eq!(report.enriched, 2);
        assert_eq!(report.failed, 1);
        assert!(report.records[1].enrichment.is_empty());
        assert!(report.summary_line().contains("some items could not be enriched"));
    }

    #[test]
    fn test_rejected_token_aborts_run() {
        let transport = ScriptedTransport::default();
        transport.push_err("/releases/1", CatalogError::Unauthorized("401".to_string()));
        let client = CatalogClient::new(transport, RequestPacing::immediate(), 100);

        let result =
            EnrichmentEngine::new(&client, 10).enrich(Some(&token()), vec![record("A", "1")]);
        assert!(matches!(result, Err(EnrichmentError::Unauthorized(_))));
    }

    #[test]
    fn test_missing_token_fails_before_any_request() {
        let client =
            CatalogClient::new(ScriptedTransport::default(), RequestPacing::immediate(), 100);
        let result = EnrichmentEngine::new(&client, 10).enrich(None, vec![record("A", "1")]);
        assert!(matches!(result, Err(EnrichmentError::MissingCredential)));
    }

    #[test]
    fn test_re_enrichment_overwrites_previous_fields() {
        let transport = ScriptedTransport::default();
        transport.push_ok("/releases/1", json!({"year": 1971}));
        let client = CatalogClient::new(transport, RequestPacing::immediate(), 100);
        let mut stale = record("Tago Mago", "1");
        stale.enrichment = EnrichedFields {
            original_release_year: Some(2004),
            community_rating: Some(3.0),
            tracklist_summary: Some("old".to_string()),
            image_url: Some("https://img.example/old.jpg".to_string()),
        };

        let report = EnrichmentEngine::new(&client, 10)
            .enrich(Some(&token()), vec![stale])
            .expect("enrichment");
        assert_eq!(
            report.records[0].enrichment,
            EnrichedFields {
                original_release_year: Some(1971),
                ..EnrichedFields::default()
            }
        );
    }

    #[test]
    fn test_progress_reported_at_fixed_cadence() {
        let transport = ScriptedTransport::default();
        let client = CatalogClient::new(transport, RequestPacing::immediate(), 100);
        let seen = RefCell::new(Vec::new());
        let records = (0..25).map(|_| record("No id", "")).collect::<Vec<_>>();

        let report = EnrichmentEngine::new(&client, 10)
            .with_progress_callback(|progress| seen.borrow_mut().push(progress.processed))
            .enrich(Some(&token()), records)
            .expect("enrichment");
        assert_eq!(report.skipped, 25);
        assert_eq!(seen.into_inner(), vec![0, 10, 20, 25]);
    }
}
