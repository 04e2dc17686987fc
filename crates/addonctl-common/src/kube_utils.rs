//! Shared Kubernetes utilities using kube-rs
//!
//! Provides the kubectl-equivalent operations addon collaborators need:
//! namespace lifecycle, server-side apply of arbitrary manifests, deletion
//! that treats "already gone" as success, and condition polling.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::{debug, trace};

use crate::{Error, Result, FIELD_MANAGER};

/// The "True" status value for conditions
pub const STATUS_TRUE: &str = "True";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::invalid_config(format!("failed to read kubeconfig: {}", e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::invalid_config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::invalid_config(format!("failed to infer kube config: {}", e)))?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(Client::try_from(config)?)
}

/// Ensure a namespace exists (idempotent).
///
/// Uses server-side apply so it never fails on "already exists".
pub async fn ensure_namespace(client: &Client, name: &str) -> std::result::Result<(), kube::Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
        .await?;
    Ok(())
}

/// Delete a namespace (idempotent): a missing namespace is success.
pub async fn delete_namespace(client: &Client, name: &str) -> std::result::Result<(), kube::Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!(namespace = %name, "namespace already absent");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Parsed manifest metadata for applying to Kubernetes
#[derive(Debug, Clone)]
pub struct ManifestMetadata {
    /// The manifest as JSON
    pub value: serde_json::Value,
    /// Resource name
    pub name: String,
    /// Optional namespace
    pub namespace: Option<String>,
    /// API resource definition
    pub api_resource: ApiResource,
}

/// Extract the identifying metadata of a manifest
pub fn parse_manifest(value: &serde_json::Value) -> Result<ManifestMetadata> {
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::serialization("manifest missing apiVersion"))?;
    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::serialization("manifest missing kind"))?;
    let name = value
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::serialization("manifest missing metadata.name"))?
        .to_string();
    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(ManifestMetadata {
        value: value.clone(),
        name,
        namespace,
        api_resource: build_api_resource(api_version, kind),
    })
}

/// Parse apiVersion into (group, version)
///
/// ```
/// use addonctl_common::kube_utils::parse_api_version;
///
/// assert_eq!(parse_api_version("cert-manager.io/v1"), ("cert-manager.io".to_string(), "v1".to_string()));
/// assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build an ApiResource from an apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Lowercase plural of a kind, as used in REST paths
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

fn dynamic_api(client: &Client, metadata: &ManifestMetadata) -> Api<DynamicObject> {
    match &metadata.namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &metadata.api_resource),
        None => Api::all_with(client.clone(), &metadata.api_resource),
    }
}

/// Apply a manifest using server-side apply
pub async fn apply_manifest(client: &Client, manifest: &serde_json::Value) -> Result<()> {
    let metadata = parse_manifest(manifest)?;
    let api = dynamic_api(client, &metadata);
    api.patch(
        &metadata.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&metadata.value),
    )
    .await?;
    debug!(kind = %metadata.api_resource.kind, name = %metadata.name, "applied manifest");
    Ok(())
}

/// Delete the object a manifest describes; a missing object is success
pub async fn delete_manifest(client: &Client, manifest: &serde_json::Value) -> Result<()> {
    let metadata = parse_manifest(manifest)?;
    let api = dynamic_api(client, &metadata);
    match api.delete(&metadata.name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!(kind = %metadata.api_resource.kind, name = %metadata.name, "already deleted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Read the status of a named condition on a dynamic object.
///
/// Returns `Ok(None)` when the object or the condition does not exist yet.
pub async fn get_condition_status(
    client: &Client,
    ar: &ApiResource,
    namespace: Option<&str>,
    name: &str,
    condition_type: &str,
) -> Result<Option<String>> {
    let api: Api<DynamicObject> = match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, ar),
        None => Api::all_with(client.clone(), ar),
    };
    match api.get(name).await {
        Ok(obj) => Ok(condition_status(&obj.data, condition_type)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pull `status.conditions[type == condition_type].status` out of an object
pub fn condition_status(data: &serde_json::Value, condition_type: &str) -> Option<String> {
    data.pointer("/status/conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some(condition_type))
        .and_then(|c| c.get("status"))
        .and_then(|s| s.as_str())
        .map(str::to_string)
}

/// Poll until a condition is met or the attempt budget is spent
///
/// `check_fn` returns `Ok(true)` when done, `Ok(false)` to keep polling, or
/// `Err` to abort immediately. The condition is always checked at least once.
pub async fn poll_until<F, Fut>(
    attempts: u32,
    interval: Duration,
    what: impl Into<String>,
    mut check_fn: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let what = what.into();
    let start = Instant::now();
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        if check_fn().await? {
            return Ok(());
        }
        trace!(%what, attempt, "condition not met yet");
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::timeout(what, start.elapsed()))
}
