//! Namespace provisioning around addon operations

use async_trait::async_trait;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use addonctl_common::kube_utils;
use addonctl_common::Result;

/// Creates and removes the namespace an addon lives in.
///
/// Both operations are idempotent: creating an existing namespace and
/// deleting an absent one succeed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceProvisioner: Send + Sync {
    /// Create the namespace if it does not exist
    async fn create_namespace(&self, name: &str) -> Result<()>;

    /// Delete the namespace if it exists
    async fn delete_namespace(&self, name: &str) -> Result<()>;
}

/// Namespace provisioner backed by the Kubernetes API
pub struct KubeNamespaces {
    client: Client,
}

impl KubeNamespaces {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceProvisioner for KubeNamespaces {
    async fn create_namespace(&self, name: &str) -> Result<()> {
        kube_utils::ensure_namespace(&self.client, name).await?;
        info!(namespace = %name, "Namespace ready");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        kube_utils::delete_namespace(&self.client, name).await?;
        info!(namespace = %name, "Namespace deleted");
        Ok(())
    }
}

/// Provisioner that only logs; used for dry runs
#[derive(Debug, Default)]
pub struct NoopNamespaces;

#[async_trait]
impl NamespaceProvisioner for NoopNamespaces {
    async fn create_namespace(&self, name: &str) -> Result<()> {
        info!(namespace = %name, "Would create namespace");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        info!(namespace = %name, "Would delete namespace");
        Ok(())
    }
}
