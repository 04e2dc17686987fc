//! Run-wide inputs shared by every addon handle

use std::fmt;
use std::sync::Arc;

use serde_yaml::{Mapping, Value};

use addonctl_common::ADDON_NODEGROUP;

use crate::applier::ResourceApplier;
use crate::helm::ChartInstaller;

/// Cloud the target cluster runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Amazon EKS
    Aws {
        /// Cluster name
        cluster: String,
        /// AWS region
        region: String,
        /// Deployment environment (`default`, `dev`, `prod`)
        environment: String,
    },
    /// Google GKE
    Gcp {
        /// Cluster name
        cluster: String,
        /// GCP project id
        project: String,
        /// GCP region
        region: String,
    },
}

impl Provider {
    /// Name of the target cluster
    pub fn cluster(&self) -> &str {
        match self {
            Provider::Aws { cluster, .. } | Provider::Gcp { cluster, .. } => cluster,
        }
    }

    /// Region of the target cluster
    pub fn region(&self) -> &str {
        match self {
            Provider::Aws { region, .. } | Provider::Gcp { region, .. } => region,
        }
    }

    /// Whether this is a GKE cluster
    pub fn is_gcp(&self) -> bool {
        matches!(self, Provider::Gcp { .. })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Aws { .. } => write!(f, "aws"),
            Provider::Gcp { .. } => write!(f, "gcp"),
        }
    }
}

/// Everything a handle needs besides its own settings
#[derive(Clone)]
pub struct AddonContext {
    /// Target cluster
    pub provider: Provider,
    /// Helm access
    pub charts: Arc<dyn ChartInstaller>,
    /// Kubernetes resource access
    pub applier: Arc<dyn ResourceApplier>,
}

impl AddonContext {
    /// Bundle the provider with its collaborators
    pub fn new(
        provider: Provider,
        charts: Arc<dyn ChartInstaller>,
        applier: Arc<dyn ResourceApplier>,
    ) -> Self {
        Self {
            provider,
            charts,
            applier,
        }
    }

    /// Pin workloads to the addon node group on GKE unless the values
    /// already choose a node selector.
    pub fn place_on_addon_nodes(&self, values: &mut Value) {
        if !self.provider.is_gcp() {
            return;
        }
        if let Value::Mapping(map) = values {
            if !map.contains_key("nodeSelector") {
                let mut selector = Mapping::new();
                selector.insert("nodegroup".into(), ADDON_NODEGROUP.into());
                map.insert("nodeSelector".into(), Value::Mapping(selector));
            }
        }
    }
}

impl fmt::Debug for AddonContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonContext")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::DryRunApplier;
    use crate::helm::DryRunCharts;

    fn context(provider: Provider) -> AddonContext {
        AddonContext::new(provider, Arc::new(DryRunCharts), Arc::new(DryRunApplier))
    }

    fn gcp() -> Provider {
        Provider::Gcp {
            cluster: "ops".into(),
            project: "acme-ops".into(),
            region: "us-central1".into(),
        }
    }

    #[test]
    fn provider_accessors() {
        let aws = Provider::Aws {
            cluster: "prod".into(),
            region: "us-west-2".into(),
            environment: "prod".into(),
        };
        assert_eq!(aws.cluster(), "prod");
        assert_eq!(aws.region(), "us-west-2");
        assert_eq!(aws.to_string(), "aws");
        assert!(!aws.is_gcp());
        assert_eq!(gcp().to_string(), "gcp");
        assert!(gcp().is_gcp());
    }

    #[test]
    fn gcp_gets_addon_node_selector() {
        let mut values: Value = serde_yaml::from_str("replicaCount: 1").unwrap();
        context(gcp()).place_on_addon_nodes(&mut values);
        assert_eq!(values["nodeSelector"]["nodegroup"], Value::from("addons"));
    }

    #[test]
    fn explicit_node_selector_wins() {
        let mut values: Value = serde_yaml::from_str("nodeSelector: {pool: system}").unwrap();
        context(gcp()).place_on_addon_nodes(&mut values);
        assert_eq!(values["nodeSelector"]["pool"], Value::from("system"));
        assert!(values["nodeSelector"].get("nodegroup").is_none());
    }

    #[test]
    fn aws_values_are_untouched() {
        let aws = Provider::Aws {
            cluster: "prod".into(),
            region: "us-west-2".into(),
            environment: "default".into(),
        };
        let mut values: Value = serde_yaml::from_str("replicaCount: 1").unwrap();
        context(aws).place_on_addon_nodes(&mut values);
        assert!(values.get("nodeSelector").is_none());
    }
}
