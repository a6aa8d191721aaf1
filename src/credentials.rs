//! Credential lookup for the catalog and generation services.
//!
//! Resolution order is explicit override, then environment, then the OS keyring.
//! Nothing here is cached; callers pass the resolved value into each request.

use keyring::Entry;
use log::{debug, warn};

const CATALOG_SERVICE_NAME: &str = "vinyl_recommender.discogs";
const GENERATION_SERVICE_NAME: &str = "vinyl_recommender.openai";
const KEYRING_USER: &str = "default";

/// Which remote service a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CredentialKind {
    Catalog,
    Generation,
}

impl CredentialKind {
    fn service_name(self) -> &'static str {
        match self {
            Self::Catalog => CATALOG_SERVICE_NAME,
            Self::Generation => GENERATION_SERVICE_NAME,
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Self::Catalog => "DISCOGS_TOKEN",
            Self::Generation => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential value is empty")]
    Empty,
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

fn keyring_entry(kind: CredentialKind) -> Result<Entry, keyring::Error> {
    Entry::new(kind.service_name(), KEYRING_USER)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Saves a credential into the OS keyring.
pub fn store_credential(kind: CredentialKind, secret: &str) -> Result<(), CredentialError> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(CredentialError::Empty);
    }
    keyring_entry(kind)?.set_password(secret)?;
    Ok(())
}

fn keyring_credential(kind: CredentialKind) -> Option<String> {
    let entry = match keyring_entry(kind) {
        Ok(entry) => entry,
        Err(err) => {
            warn!("Credentials[{:?}]: keyring unavailable: {}", kind, err);
            return None;
        }
    };
    match entry.get_password() {
        Ok(secret) => non_blank(Some(secret)),
        Err(keyring::Error::NoEntry) => None,
        Err(err) => {
            warn!("Credentials[{:?}]: failed to read keyring: {}", kind, err);
            None
        }
    }
}

/// First non-blank value from `explicit`, then `environment`, then `keyring`.
fn resolve_with(
    kind: CredentialKind,
    explicit: Option<String>,
    environment: impl FnOnce() -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Option<String> {
    if let Some(value) = non_blank(explicit) {
        debug!("Credentials[{:?}]: using explicit value", kind);
        return Some(value);
    }
    if let Some(value) = non_blank(environment()) {
        debug!("Credentials[{:?}]: using {}", kind, kind.env_var());
        return Some(value);
    }
    let value = keyring();
    if value.is_some() {
        debug!("Credentials[{:?}]: using keyring entry", kind);
    }
    value
}

pub fn resolve_credential(kind: CredentialKind, explicit: Option<String>) -> Option<String> {
    resolve_with(
        kind,
        explicit,
        || std::env::var(kind.env_var()).ok(),
        || keyring_credential(kind),
    )
}

#[cfg(test)]
mod tests {
    use super::{non_blank, resolve_with, CredentialKind};

    #[test]
    fn test_explicit_value_wins_over_environment_and_keyring() {
        let resolved = resolve_with(
            CredentialKind::Catalog,
            Some(" cli-token ".to_string()),
            || panic!("environment should not be consulted"),
            || panic!("keyring should not be consulted"),
        );
        assert_eq!(resolved.as_deref(), Some("cli-token"));
    }

    #[test]
    fn test_blank_values_fall_through_in_order() {
        let resolved = resolve_with(
            CredentialKind::Generation,
            Some("   ".to_string()),
            || Some(String::new()),
            || Some("from-keyring".to_string()),
        );
        assert_eq!(resolved.as_deref(), Some("from-keyring"));

        let resolved = resolve_with(
            CredentialKind::Generation,
            None,
            || Some("from-env".to_string()),
            || None,
        );
        assert_eq!(resolved.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_nothing_configured_resolves_to_none() {
        assert_eq!(
            resolve_with(CredentialKind::Catalog, None, || None, || None),
            None
        );
        assert_eq!(non_blank(Some("\t".to_string())), None);
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(CredentialKind::Catalog.env_var(), "DISCOGS_TOKEN");
        assert_eq!(CredentialKind::Generation.env_var(), "OPENAI_API_KEY");
    }
}
