//! Plain Kubernetes resources addons manage next to their charts
//! (cluster issuers, certificates, secrets).

use async_trait::async_trait;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use addonctl_common::kube_utils::{self, STATUS_TRUE};
use addonctl_common::Result;

/// Identifies a single object for status lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// `group/version`, or `version` for the core group
    pub api_version: String,
    /// Object kind
    pub kind: String,
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectRef {
    /// Reference a namespaced object
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

/// Applies, deletes and inspects arbitrary manifests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    /// Server-side apply the manifest
    async fn apply(&self, manifest: &serde_json::Value) -> Result<()>;

    /// Delete the object the manifest describes; absent objects are fine
    async fn delete(&self, manifest: &serde_json::Value) -> Result<()>;

    /// Status of a condition on an object, `None` while either is missing
    async fn condition_status(&self, object: &ObjectRef, condition: &str)
        -> Result<Option<String>>;
}

/// Resource applier backed by the Kubernetes API
pub struct KubeApplier {
    client: Client,
}

impl KubeApplier {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceApplier for KubeApplier {
    async fn apply(&self, manifest: &serde_json::Value) -> Result<()> {
        kube_utils::apply_manifest(&self.client, manifest).await
    }

    async fn delete(&self, manifest: &serde_json::Value) -> Result<()> {
        kube_utils::delete_manifest(&self.client, manifest).await
    }

    async fn condition_status(
        &self,
        object: &ObjectRef,
        condition: &str,
    ) -> Result<Option<String>> {
        let ar = kube_utils::build_api_resource(&object.api_version, &object.kind);
        kube_utils::get_condition_status(
            &self.client,
            &ar,
            object.namespace.as_deref(),
            &object.name,
            condition,
        )
        .await
    }
}

/// Applier that only logs; every condition reads as satisfied
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunApplier;

#[async_trait]
impl ResourceApplier for DryRunApplier {
    async fn apply(&self, manifest: &serde_json::Value) -> Result<()> {
        let meta = kube_utils::parse_manifest(manifest)?;
        info!(
            kind = %meta.api_resource.kind,
            name = %meta.name,
            namespace = meta.namespace.as_deref().unwrap_or(""),
            "Would apply manifest"
        );
        Ok(())
    }

    async fn delete(&self, manifest: &serde_json::Value) -> Result<()> {
        let meta = kube_utils::parse_manifest(manifest)?;
        info!(
            kind = %meta.api_resource.kind,
            name = %meta.name,
            namespace = meta.namespace.as_deref().unwrap_or(""),
            "Would delete manifest"
        );
        Ok(())
    }

    async fn condition_status(
        &self,
        object: &ObjectRef,
        condition: &str,
    ) -> Result<Option<String>> {
        info!(kind = %object.kind, name = %object.name, condition = %condition, "Would wait for condition");
        Ok(Some(STATUS_TRUE.to_string()))
    }
}
