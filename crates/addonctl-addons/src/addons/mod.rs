//! Addon handle implementations
//!
//! Each module turns an addon's settings into helm releases and manifests
//! once, at construction, so a malformed config fails before anything in
//! the cluster is touched.

pub mod cert_manager;
pub mod chart;
pub mod cluster_autoscaler;
pub mod external_dns;
pub mod nginx_ingress;

use std::time::Duration;

use serde_yaml::{Mapping, Value};

use addonctl_common::{AddonSettings, Error, Result};

use crate::helm::merge_values;

/// Setting key holding user chart values merged over the generated ones
pub const VALUES_KEY: &str = "values";

/// Convert generated JSON values into the YAML tree helm receives
pub(crate) fn to_yaml(values: serde_json::Value) -> Result<Value> {
    Ok(serde_yaml::to_value(values)?)
}

/// Merge the `values` setting (if any) over `base`
pub(crate) fn with_user_values(addon: &str, settings: &AddonSettings, mut base: Value) -> Result<Value> {
    if let Some(overlay) = settings.optional::<Value>(addon, VALUES_KEY)? {
        if !overlay.is_mapping() {
            return Err(Error::validation(addon, "setting 'values' must be a mapping"));
        }
        merge_values(&mut base, overlay);
    }
    Ok(base)
}

/// An empty values tree
pub(crate) fn empty_values() -> Value {
    Value::Mapping(Mapping::new())
}

/// Read a credential from the environment variable named by `var`
pub(crate) fn env_credential(addon: &str, var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::validation(
            addon,
            format!("environment variable {} is not set", var),
        )),
    }
}

/// Opaque secret carrying plain-text data
pub(crate) fn secret_manifest(name: &str, namespace: &str, data: &[(&str, &str)]) -> serde_json::Value {
    let data: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": {"name": name, "namespace": namespace},
        "stringData": data,
    })
}

/// Read a seconds setting as a duration
pub(crate) fn seconds_setting(
    addon: &str,
    settings: &AddonSettings,
    key: &str,
    default: u64,
) -> Result<Duration> {
    Ok(Duration::from_secs(settings.optional_or(addon, key, default)?))
}
