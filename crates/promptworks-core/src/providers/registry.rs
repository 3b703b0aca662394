//! Static defaults for well-known providers.
//!
//! Catalog rows may omit `base_url`; for the common providers we fall back to
//! the published endpoint keyed by `provider_key`.

use crate::error::ExecutionError;
use crate::storage::rows::ProviderRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub key: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
}

const COMMON_PROVIDERS: &[ProviderDefaults] = &[
    ProviderDefaults {
        key: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
    },
    ProviderDefaults {
        key: "anthropic",
        name: "Anthropic",
        base_url: "https://api.anthropic.com",
    },
    ProviderDefaults {
        key: "azure-openai",
        name: "Azure OpenAI",
        // Template: callers must store a concrete resource URL on the row.
        base_url: "https://{resource-name}.openai.azure.com",
    },
    ProviderDefaults {
        key: "google",
        name: "Google",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
    },
];

/// Look up defaults for a well-known provider key (case-insensitive).
pub fn provider_defaults(key: &str) -> Option<&'static ProviderDefaults> {
    let key = key.trim().to_ascii_lowercase();
    COMMON_PROVIDERS.iter().find(|p| p.key == key)
}

pub fn common_providers() -> &'static [ProviderDefaults] {
    COMMON_PROVIDERS
}

/// Resolve the effective base URL for a catalog row: explicit override first,
/// then the static default table, else a terminal configuration error.
pub fn resolve_base_url(provider: &ProviderRow) -> Result<String, ExecutionError> {
    let from_defaults = provider
        .provider_key
        .as_deref()
        .and_then(provider_defaults)
        .map(|d| d.base_url);

    provider
        .base_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .or(from_defaults)
        .map(|url| url.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            ExecutionError::Configuration(format!(
                "provider '{}' has no base URL configured",
                provider.provider_name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: Option<&str>, base_url: Option<&str>) -> ProviderRow {
        ProviderRow {
            id: 1,
            provider_name: "Test".into(),
            provider_key: key.map(String::from),
            api_key: "k".into(),
            base_url: base_url.map(String::from),
        }
    }

    #[test]
    fn defaults_lookup_is_case_insensitive() {
        assert!(provider_defaults("OpenAI").is_some());
        assert!(provider_defaults(" openai ").is_some());
        assert!(provider_defaults("nonexistent").is_none());
    }

    #[test]
    fn explicit_base_url_wins_over_defaults() {
        let url = resolve_base_url(&row(Some("openai"), Some("https://proxy.local/v1/"))).unwrap();
        assert_eq!(url, "https://proxy.local/v1");
    }

    #[test]
    fn falls_back_to_default_table() {
        let url = resolve_base_url(&row(Some("openai"), None)).unwrap();
        assert_eq!(url, "https://api.openai.com/v1");
    }

    #[test]
    fn missing_base_url_is_a_configuration_error() {
        let err = resolve_base_url(&row(None, None)).unwrap_err();
        assert!(matches!(err, ExecutionError::Configuration(_)));
    }
}
