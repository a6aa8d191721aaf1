//! Top-level orchestration of collection, enrichment, and recommendation commands.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::catalog::discogs::{CatalogClient, UreqCatalogTransport};
use crate::catalog::{CatalogError, CatalogToken, CatalogTransport, RequestPacing};
use crate::collection_store::{
    enriched_variant, is_enriched_path, load_records, save_records, CollectionError,
    CollectionLoader,
};
use crate::config::{Config, ConfigError};
use crate::credentials::{resolve_credential, store_credential, CredentialError, CredentialKind};
use crate::enrichment::{EnrichmentEngine, EnrichmentError, EnrichmentReport};
use crate::normalizer::{collection_breakdown, FieldNormalizer};
use crate::recommendation::{ChatCompletionGenerator, GenerationKey, RecommendationService};
use crate::records::NormalizedRecord;
use crate::summary::SummaryBuilder;
use crate::year_overrides::YearOverrideTable;

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("failed to seed the summary sampler: {0}")]
    Entropy(#[from] getrandom::Error),
}

/// Outcome of fetching a user's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchOutcome {
    pub path: PathBuf,
    pub records: usize,
    pub reused: bool,
}

/// Request-scoped runtime: every command reads collection files fresh from disk.
pub(crate) struct AppRuntime {
    config: Config,
    overrides: YearOverrideTable,
    loader: CollectionLoader,
}

impl AppRuntime {
    pub(crate) fn new(config: Config) -> Self {
        let overrides = YearOverrideTable::with_configured(&config.year_overrides);
        let loader = CollectionLoader::from_config(&config.storage);
        info!(
            "AppRuntime: data_dir={} year_overrides={}",
            loader.data_dir().display(),
            overrides.len()
        );
        Self {
            config,
            overrides,
            loader,
        }
    }

    fn catalog_client(&self) -> CatalogClient<UreqCatalogTransport> {
        CatalogClient::new(
            UreqCatalogTransport::new(&self.config.catalog),
            RequestPacing::from_config(&self.config.catalog),
            self.config.catalog.page_size,
        )
    }

    fn catalog_token(explicit: Option<String>) -> Result<CatalogToken, CatalogError> {
        CatalogToken::from_optional(resolve_credential(CredentialKind::Catalog, explicit))
    }

    fn run_enrichment<T: CatalogTransport>(
        &self,
        client: &CatalogClient<T>,
        token: &CatalogToken,
        input: &Path,
        output: &Path,
    ) -> Result<EnrichmentReport, AppError> {
        let records = load_records(input)?;
        let report = EnrichmentEngine::new(client, self.config.enrichment.progress_interval)
            .with_progress_callback(|progress| {
                debug!(
                    "AppRuntime: enrichment progress {}/{} enriched={}",
                    progress.processed, progress.total, progress.enriched
                );
            })
            .enrich(Some(token), records)?;
        save_records(output, &report.records)?;
        if report.is_partial() {
            warn!("AppRuntime: {}", report.summary_line());
        }
        Ok(report)
    }

    /// Downloads `username`'s collection unless a local copy already exists,
    /// optionally enriching it right away. A reused raw copy is enriched too
    /// when `enrich` is set.
    pub(crate) fn fetch_collection(
        &self,
        username: &str,
        token_override: Option<String>,
        refresh: bool,
        enrich: bool,
    ) -> Result<FetchOutcome, AppError> {
        self.fetch_collection_with(
            &self.catalog_client(),
            || Self::catalog_token(token_override),
            username,
            refresh,
            enrich,
        )
    }

    fn fetch_collection_with<T: CatalogTransport>(
        &self,
        client: &CatalogClient<T>,
        resolve_token: impl FnOnce() -> Result<CatalogToken, CatalogError>,
        username: &str,
        refresh: bool,
        enrich: bool,
    ) -> Result<FetchOutcome, AppError> {
        if !refresh {
            if let Some(path) = self.loader.existing_user_collection(username) {
                if !enrich || is_enriched_path(&path) {
                    let records = load_records(&path)?.len();
                    info!(
                        "AppRuntime[user:{}]: reusing {} ({} records)",
                        username,
                        path.display(),
                        records
                    );
                    return Ok(FetchOutcome {
                        path,
                        records,
                        reused: true,
                    });
                }

                info!(
                    "AppRuntime[user:{}]: reusing {} and enriching it",
                    username,
                    path.display()
                );
                let token = resolve_token().map_err(|_| EnrichmentError::MissingCredential)?;
                let enriched_path = enriched_variant(&path);
                let report = self.run_enrichment(client, &token, &path, &enriched_path)?;
                return Ok(FetchOutcome {
                    path: enriched_path,
                    records: report.total,
                    reused: true,
                });
            }
        }

        let token = resolve_token()?;
        let records = client.fetch_user_collection(&token, username)?;
        let path = self.loader.user_collection_path(username);
        save_records(&path, &records)?;
        if !enrich {
            return Ok(FetchOutcome {
                path,
                records: records.len(),
                reused: false,
            });
        }

        let enriched_path = enriched_variant(&path);
        let report = self.run_enrichment(client, &token, &path, &enriched_path)?;
        Ok(FetchOutcome {
            path: enriched_path,
            records: report.total,
            reused: false,
        })
    }

    /// Enriches a collection file and writes the result next to it (or to `output`).
    pub(crate) fn enrich_file(
        &self,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        token_override: Option<String>,
    ) -> Result<(PathBuf, EnrichmentReport), AppError> {
        let token = Self::catalog_token(token_override)
            .map_err(|_| EnrichmentError::MissingCredential)?;
        let input = match input {
            Some(path) if path.is_file() => path,
            Some(path) => return Err(CollectionError::NotFound(path).into()),
            None => self.loader.resolve_collection_path(None)?,
        };
        let output = output.unwrap_or_else(|| self.loader.enriched_output_path(&input));
        info!(
            "AppRuntime: enriching {} -> {}",
            input.display(),
            output.display()
        );
        let client = self.catalog_client();
        let report = self.run_enrichment(&client, &token, &input, &output)?;
        Ok((output, report))
    }

    fn load_normalized(
        &self,
        collection: Option<&Path>,
    ) -> Result<Vec<NormalizedRecord>, AppError> {
        let path = self.loader.resolve_collection_path(collection)?;
        let records = FieldNormalizer::new(&self.overrides).normalize_all(&load_records(&path)?);
        debug!(
            "AppRuntime: loaded {} ({})",
            path.display(),
            collection_breakdown(&records)
        );
        Ok(records)
    }

    /// The collection text that would be sent to the generation service.
    pub(crate) fn summary(
        &self,
        collection: Option<&Path>,
        max_items: Option<usize>,
    ) -> Result<String, AppError> {
        let records = self.load_normalized(collection)?;
        let mut summary_config = self.config.summary.clone();
        if let Some(max_items) = max_items {
            summary_config.max_items = max_items;
        }
        Ok(SummaryBuilder::from_config(&summary_config)?.build_summary(&records))
    }

    /// Always produces text: the recommendation, or a readable error message.
    pub(crate) fn recommend(
        &self,
        collection: Option<&Path>,
        mood: &str,
        interests: &str,
        api_key_override: Option<String>,
    ) -> String {
        info!(
            "AppRuntime: recommendation requested mood={:?} interests={:?}",
            mood, interests
        );
        let summary = match self.summary(collection, None) {
            Ok(summary) => summary,
            Err(err) => {
                warn!("AppRuntime: cannot prepare collection summary: {}", err);
                return format!("Error preparing your collection: {err}");
            }
        };
        let api_key = resolve_credential(CredentialKind::Generation, api_key_override)
            .and_then(GenerationKey::new);
        RecommendationService::new(ChatCompletionGenerator::new(&self.config.generation))
            .recommend_or_message(&summary, mood, interests, api_key.as_ref())
    }

    pub(crate) fn clear_data(&self) -> Result<usize, AppError> {
        Ok(self.loader.clear_collections()?)
    }

    pub(crate) fn store_credential(
        &self,
        kind: CredentialKind,
        secret: &str,
    ) -> Result<(), AppError> {
        store_credential(kind, secret)?;
        info!("AppRuntime: stored {:?} credential in the keyring", kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::{AppError, AppRuntime};
    use crate::catalog::discogs::CatalogClient;
    use crate::catalog::test_support::ScriptedTransport;
    use crate::catalog::{CatalogError, CatalogToken, RequestPacing};
    use crate::collection_store::{load_records, CollectionError};
    use crate::config::{Config, StorageConfig};
    use crate::enrichment::EnrichmentError;

    fn runtime(data_dir: &std::path::Path, seed: u64, max_items: usize) -> AppRuntime {
        let mut config = Config {
            storage: StorageConfig {
                data_dir: data_dir.to_path_buf(),
                ..StorageConfig::default()
            },
            ..Config::default()
        };
        config.summary.seed = Some(seed);
        config.summary.max_items = max_items;
        AppRuntime::new(config)
    }

    #[test]
    fn test_summary_prefers_enriched_original_year() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("vinyl_collection.csv"),
            "Artist,Title,Released,Genre\nCan,Tago Mago,2004,Rock\n",
        )
        .expect("write");
        fs::write(
            dir.path().join("vinyl_collection_enriched.csv"),
            "Artist,Title,Released,Genre,original_release_year\nCan,Tago Mago,2004,Rock,1971\n",
        )
        .expect("write");

        let summary = runtime(dir.path(), 1, 10).summary(None, None).expect("summary");
        assert_eq!(summary, "Can - Tago Mago (1971) | Rock");
    }

    #[test]
    fn test_summary_applies_max_items_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut content = String::from("Artist,Title\n");
        for index in 0..6 {
            content.push_str(&format!("Artist {index},Album {index}\n"));
        }
        fs::write(dir.path().join("vinyl_collection.csv"), content).expect("write");

        let summary = runtime(dir.path(), 5, 150)
            .summary(None, Some(2))
            .expect("summary");
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.starts_with("Your full collection has 6 records."));
    }

    #[test]
    fn test_recommend_reports_missing_collection_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let message = runtime(dir.path(), 1, 10).recommend(None, "calm", "", None);
        assert!(message.starts_with("Error preparing your collection:"));
    }

    #[test]
    fn test_missing_explicit_collection_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = runtime(dir.path(), 1, 10).summary(Some(dir.path().join("nope.csv").as_path()), None);
        assert!(matches!(
            result,
            Err(AppError::Collection(CollectionError::NotFound(_)))
        ));
    }

    #[test]
    fn test_fetch_reuses_existing_user_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("digger_collection.csv"),
            "Artist,Title\nCan,Future Days\n",
        )
        .expect("write");

        let outcome = runtime(dir.path(), 1, 10)
            .fetch_collection("digger", None, false, false)
            .expect("fetch");
        assert!(outcome.reused);
        assert_eq!(outcome.records, 1);
        assert_eq!(outcome.path, dir.path().join("digger_collection.csv"));
    }

    #[test]
    fn test_fetch_with_enrich_enriches_reused_raw_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("digger_collection.csv"),
            "Artist,Title,Released,release_id\nCan,Tago Mago,2004,7\nNeu!,Neu!,1972,\n",
        )
        .expect("write");
        let transport = ScriptedTransport::default();
        transport.push_ok("/releases/7", json!({"year": 1971}));
        let client = CatalogClient::new(transport, RequestPacing::immediate(), 100);

        let outcome = runtime(dir.path(), 1, 10)
            .fetch_collection_with(&client, || CatalogToken::new("secret"), "digger", false, true)
            .expect("fetch");
        let enriched_path = dir.path().join("digger_collection_enriched.csv");
        assert!(outcome.reused);
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.path, enriched_path);

        let records = load_records(&enriched_path).expect("load");
        assert_eq!(records[0].enrichment.original_release_year, Some(1971));
        assert_eq!(records[1].enrichment.original_release_year, None);
    }

    #[test]
    fn test_fetch_with_enrich_reuses_enriched_collection_as_is() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("digger_collection_enriched.csv"),
            "Artist,Title,release_id,original_release_year\nCan,Tago Mago,7,1971\n",
        )
        .expect("write");
        let client =
            CatalogClient::new(ScriptedTransport::default(), RequestPacing::immediate(), 100);

        let outcome = runtime(dir.path(), 1, 10)
            .fetch_collection_with(
                &client,
                || Err(CatalogError::MissingCredential),
                "digger",
                false,
                true,
            )
            .expect("fetch");
        assert!(outcome.reused);
        assert_eq!(outcome.path, dir.path().join("digger_collection_enriched.csv"));
    }

    #[test]
    fn test_fetch_with_enrich_on_reused_collection_requires_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("digger_collection.csv"),
            "Artist,Title,release_id\nCan,Tago Mago,7\n",
        )
        .expect("write");
        let client =
            CatalogClient::new(ScriptedTransport::default(), RequestPacing::immediate(), 100);

        let result = runtime(dir.path(), 1, 10).fetch_collection_with(
            &client,
            || Err(CatalogError::MissingCredential),
            "digger",
            false,
            true,
        );
        assert!(matches!(
            result,
            Err(AppError::Enrichment(EnrichmentError::MissingCredential))
        ));
        assert!(!dir.path().join("digger_collection_enriched.csv").exists());
    }

    #[test]
    fn test_clear_data_counts_removed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.csv"), "Artist\n").expect("write");
        assert_eq!(runtime(dir.path(), 1, 10).clear_data().expect("clear"), 1);
    }
}
