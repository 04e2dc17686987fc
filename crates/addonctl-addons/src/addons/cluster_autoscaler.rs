//! Cluster autoscaler for EKS node groups
//!
//! GKE autoscales node pools natively, so on GCP the handle does nothing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use addonctl_common::{AddonSettings, Result};
use addonctl_core::{AddonDescriptor, AddonHandle};

use super::{to_yaml, with_user_values};
use crate::context::{AddonContext, Provider};
use crate::helm::{ChartInstaller, ChartRelease};

const CHART: &str = "autoscaler/cluster-autoscaler";
const SERVICE_ACCOUNT: &str = "cluster-autoscaler";

/// cluster-autoscaler handle; `release` is `None` off AWS
pub struct ClusterAutoscaler {
    release: Option<ChartRelease>,
    charts: Arc<dyn ChartInstaller>,
}

/// Catalog constructor
pub fn build(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    Ok(Box::new(ClusterAutoscaler::from_settings(ctx, addon, settings)?))
}

impl ClusterAutoscaler {
    /// Render the release for AWS clusters
    pub fn from_settings(
        ctx: &AddonContext,
        addon: &AddonDescriptor,
        settings: &AddonSettings,
    ) -> Result<Self> {
        let id = addon.id.as_str();
        let release = match &ctx.provider {
            Provider::Aws {
                cluster, region, ..
            } => {
                let role_arn: Option<String> = settings.optional(id, "role_arn")?;
                // Without a role the service account is expected to exist already
                let mut service_account = json!({
                    "create": role_arn.is_some(),
                    "name": SERVICE_ACCOUNT,
                });
                if let Some(arn) = &role_arn {
                    service_account["annotations"] = json!({"eks.amazonaws.com/role-arn": arn});
                }
                let values = json!({
                    "autoDiscovery": {"clusterName": cluster},
                    "cloudProvider": "aws",
                    "awsRegion": region,
                    "replicaCount": 3,
                    "rbac": {"serviceAccount": service_account},
                    "resources": {
                        "limits": {"cpu": "1000m", "memory": "3Gi"},
                        "requests": {"cpu": "125m", "memory": "375Mi"},
                    },
                });
                Some(
                    ChartRelease::new("cluster-autoscaler", CHART, addon.namespace())
                        .with_version(settings.optional(id, "version")?)
                        .with_values(with_user_values(id, settings, to_yaml(values)?)?),
                )
            }
            Provider::Gcp { .. } => None,
        };

        Ok(Self {
            release,
            charts: ctx.charts.clone(),
        })
    }

    async fn apply(&self) -> Result<()> {
        match &self.release {
            Some(release) => self.charts.upgrade_install(release).await,
            None => {
                info!("cluster-autoscaler only runs on AWS, skipping");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AddonHandle for ClusterAutoscaler {
    async fn install(&self) -> Result<()> {
        self.apply().await
    }

    async fn upgrade(&self) -> Result<()> {
        self.apply().await
    }

    async fn delete(&self) -> Result<()> {
        match &self.release {
            Some(release) => {
                self.charts
                    .uninstall(&release.release, &release.namespace)
                    .await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::test_support::{aws, context, dry_context, gcp, settings};
    use crate::applier::DryRunApplier;
    use crate::helm::MockChartInstaller;
    use serde_yaml::Value;

    fn descriptor() -> AddonDescriptor {
        AddonDescriptor::new("cluster-autoscaler")
    }

    #[test]
    fn aws_release_discovers_the_cluster() {
        let ca = ClusterAutoscaler::from_settings(&dry_context(aws()), &descriptor(), &settings("{}"))
            .unwrap();
        let release = ca.release.unwrap();
        assert_eq!(release.chart, "autoscaler/cluster-autoscaler");
        assert_eq!(release.values["autoDiscovery"]["clusterName"], Value::from("prod"));
        assert_eq!(release.values["awsRegion"], Value::from("us-west-2"));
        assert_eq!(
            release.values["rbac"]["serviceAccount"]["create"],
            Value::from(false)
        );
    }

    #[test]
    fn role_arn_creates_annotated_service_account() {
        let yaml = "role_arn: arn:aws:iam::123456789012:role/prod-cluster-autoscaler\n";
        let ca = ClusterAutoscaler::from_settings(&dry_context(aws()), &descriptor(), &settings(yaml))
            .unwrap();
        let release = ca.release.unwrap();
        let sa = &release.values["rbac"]["serviceAccount"];
        assert_eq!(sa["create"], Value::from(true));
        assert_eq!(
            sa["annotations"]["eks.amazonaws.com/role-arn"],
            Value::from("arn:aws:iam::123456789012:role/prod-cluster-autoscaler")
        );
    }

    #[tokio::test]
    async fn gcp_is_a_no_op() {
        let mut charts = MockChartInstaller::new();
        charts.expect_upgrade_install().never();
        charts.expect_uninstall().never();

        let ca = ClusterAutoscaler::from_settings(&context(gcp(), charts, DryRunApplier), &descriptor(), &settings("{}"))
            .unwrap();
        ca.install().await.unwrap();
        ca.upgrade().await.unwrap();
        ca.delete().await.unwrap();
    }
}
