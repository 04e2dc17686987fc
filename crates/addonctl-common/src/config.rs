//! Configuration document for addon management
//!
//! The document is read once per run. Only `enabled` and `depends_on` are
//! interpreted by the resolver; every other key under an addon is kept as an
//! opaque setting and read by that addon's collaborator through the typed
//! accessors on [`AddonSettings`].
//!
//! ```yaml
//! required_binaries: [helm, kubectl]
//! helm:
//!   repos:
//!     jetstack: https://charts.jetstack.io
//! addons:
//!   cert_manager:
//!     version: v1.14.4
//!   nginx_ingress:
//!     depends_on: [cert_manager]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigIssue;
use crate::{Error, Result};

/// Normalize an addon identifier to its canonical kebab-case form.
///
/// Config files historically mix `cert_manager` and `cert-manager`; both
/// name the same catalog entry.
pub fn normalize_addon_id(id: &str) -> String {
    id.trim().replace('_', "-").to_lowercase()
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Binaries that must be on `PATH` before anything runs
    #[serde(default)]
    pub required_binaries: Vec<String>,
    /// Helm repository configuration
    #[serde(default)]
    pub helm: HelmConfig,
    /// Per-addon configuration keyed by addon id
    #[serde(default)]
    pub addons: BTreeMap<String, AddonConfig>,
}

/// Helm settings shared by every chart-based addon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmConfig {
    /// Repository name to URL
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
}

/// Configuration for a single addon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddonConfig {
    /// Whether the addon is part of the run
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Addon ids that must be installed first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Addon-specific settings, untouched by the resolver
    #[serde(flatten)]
    pub settings: AddonSettings,
}

fn default_enabled() -> bool {
    true
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            depends_on: Vec::new(),
            settings: AddonSettings::default(),
        }
    }
}

/// Opaque addon settings with typed, validated access
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AddonSettings(BTreeMap<String, serde_yaml::Value>);

impl AddonSettings {
    /// Build settings from key/value pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_yaml::Value)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Raw access to a setting
    pub fn raw(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.0.get(key)
    }

    /// Read a required setting, failing with a validation error naming the addon
    pub fn required<T: DeserializeOwned>(&self, addon: &str, key: &str) -> Result<T> {
        self.optional(addon, key)?.ok_or_else(|| {
            Error::validation(addon, format!("missing required setting '{}'", key))
        })
    }

    /// Read an optional setting; present-but-malformed is still an error
    pub fn optional<T: DeserializeOwned>(&self, addon: &str, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone()).map(Some).map_err(|e| {
                Error::validation(addon, format!("invalid setting '{}': {}", key, e))
            }),
        }
    }

    /// Read an optional setting, falling back to a default
    pub fn optional_or<T: DeserializeOwned>(&self, addon: &str, key: &str, default: T) -> Result<T> {
        Ok(self.optional(addon, key)?.unwrap_or(default))
    }
}

impl ManagerConfig {
    /// Parse a configuration document from YAML text.
    ///
    /// Addon keys and dependency ids are normalized; two keys that normalize
    /// to the same id are rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: ManagerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::invalid_config(format!("failed to parse config: {}", e)))?;
        raw.normalized()
    }

    /// Load a configuration document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Configuration for an addon, or the default (enabled, no deps) if absent
    pub fn addon(&self, id: &str) -> AddonConfig {
        self.addons
            .get(&normalize_addon_id(id))
            .cloned()
            .unwrap_or_default()
    }

    fn normalized(self) -> Result<Self> {
        let mut addons = BTreeMap::new();
        for (key, mut config) in self.addons {
            let id = normalize_addon_id(&key);
            config.depends_on = dedup_preserving_order(
                config.depends_on.iter().map(|d| normalize_addon_id(d)),
            );
            if addons.insert(id.clone(), config).is_some() {
                return Err(Error::config(
                    ConfigIssue::DuplicateAddon,
                    format!("addon '{}' is configured more than once", id),
                    [id],
                ));
            }
        }
        Ok(Self { addons, ..self })
    }
}

fn dedup_preserving_order(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    const SAMPLE: &str = r#"
required_binaries: [helm, kubectl]
helm:
  repos:
    jetstack: https://charts.jetstack.io
addons:
  cert_manager:
    version: v1.14.4
  nginx_ingress:
    depends_on: [cert_manager, external-dns, cert-manager]
    endpoints: [public, private]
  redis:
    enabled: false
"#;

    #[rstest]
    #[case("cert_manager", "cert-manager")]
    #[case("cert-manager", "cert-manager")]
    #[case(" Nginx_Ingress ", "nginx-ingress")]
    fn normalizes_ids(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_addon_id(raw), expected);
    }

    #[test]
    fn parses_document_and_normalizes_keys() {
        let config = ManagerConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.required_binaries, vec!["helm", "kubectl"]);
        assert_eq!(
            config.helm.repos.get("jetstack").map(String::as_str),
            Some("https://charts.jetstack.io")
        );
        assert!(config.addons.contains_key("cert-manager"));

        let nginx = config.addon("nginx_ingress");
        assert!(nginx.enabled);
        assert_eq!(nginx.depends_on, vec!["cert-manager", "external-dns"]);
        assert!(nginx.settings.contains("endpoints"));
        assert!(!nginx.settings.contains("depends_on"));

        assert!(!config.addon("redis").enabled);
    }

    #[test]
    fn missing_addon_defaults_to_enabled_without_deps() {
        let config = ManagerConfig::from_yaml(SAMPLE).unwrap();
        let dashboard = config.addon("dashboard");
        assert!(dashboard.enabled);
        assert!(dashboard.depends_on.is_empty());
    }

    #[test]
    fn duplicate_keys_after_normalization_are_rejected() {
        let yaml = "addons:\n  cert_manager: {}\n  cert-manager: {}\n";
        let err = ManagerConfig::from_yaml(yaml).unwrap_err();
        assert_eq!(err.config_issue(), Some(ConfigIssue::DuplicateAddon));
    }

    #[test]
    fn malformed_yaml_is_invalid_config() {
        let err = ManagerConfig::from_yaml("addons: [").unwrap_err();
        assert_eq!(err.config_issue(), Some(ConfigIssue::Invalid));
    }

    #[test]
    fn typed_settings_access() {
        let config = ManagerConfig::from_yaml(SAMPLE).unwrap();
        let nginx = config.addon("nginx-ingress");

        let endpoints: Vec<String> = nginx.settings.required("nginx-ingress", "endpoints").unwrap();
        assert_eq!(endpoints, vec!["public", "private"]);

        let issuer: String = nginx
            .settings
            .optional_or("nginx-ingress", "issuer", "letsencrypt".to_string())
            .unwrap();
        assert_eq!(issuer, "letsencrypt");

        let err = nginx
            .settings
            .required::<Vec<String>>("nginx-ingress", "zones")
            .unwrap_err();
        assert!(err.to_string().contains("missing required setting 'zones'"));

        let err = nginx
            .settings
            .required::<u32>("nginx-ingress", "endpoints")
            .unwrap_err();
        assert!(err.to_string().contains("invalid setting 'endpoints'"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ManagerConfig::load(file.path()).unwrap();
        assert_eq!(config.addons.len(), 3);
    }

    #[test]
    fn missing_file_is_invalid_config() {
        let err = ManagerConfig::load(Path::new("/nonexistent/addonctl.yaml")).unwrap_err();
        assert_eq!(err.config_issue(), Some(ConfigIssue::Invalid));
    }
}
