//! ingress-nginx controllers behind a wildcard certificate
//!
//! Install requests a wildcard `Certificate` for the cluster, waits for it to
//! become Ready (bounded), then installs one controller release per
//! endpoint. Each controller serves the wildcard secret by default.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use addonctl_common::kube_utils::{poll_until, STATUS_TRUE};
use addonctl_common::{AddonSettings, Error, Result};
use addonctl_core::{AddonDescriptor, AddonHandle};

use super::{seconds_setting, to_yaml, with_user_values};
use crate::applier::{ObjectRef, ResourceApplier};
use crate::context::{AddonContext, Provider};
use crate::helm::{ChartInstaller, ChartRelease};

const CHART: &str = "ingress_nginx/ingress-nginx";
const WILDCARD_SECRET: &str = "nginx-ingress-wildcard";
const BACKEND_CONFIG: &str = "nginx-ingress-backendconfig";
const CERTIFICATE_API: &str = "cert-manager.io/v1";

/// Which side of the network a controller serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Internet-facing, records proxied through Cloudflare
    Public,
    /// Internal load balancer, DNS-only records
    Private,
}

impl Endpoint {
    fn dns_record(self) -> &'static str {
        match self {
            Endpoint::Public => "proxied",
            Endpoint::Private => "passthrough",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Public => write!(f, "public"),
            Endpoint::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AdditionalPorts {
    #[serde(default)]
    tcp: BTreeMap<String, String>,
}

/// nginx-ingress handle
pub struct NginxIngress {
    certificate: serde_json::Value,
    certificate_ref: ObjectRef,
    backend_config: Option<serde_json::Value>,
    releases: Vec<ChartRelease>,
    poll_attempts: u32,
    poll_interval: Duration,
    charts: Arc<dyn ChartInstaller>,
    applier: Arc<dyn ResourceApplier>,
}

/// Catalog constructor
pub fn build(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    Ok(Box::new(NginxIngress::from_settings(ctx, addon, settings)?))
}

impl NginxIngress {
    /// Render the certificate and controller releases from settings
    pub fn from_settings(
        ctx: &AddonContext,
        addon: &AddonDescriptor,
        settings: &AddonSettings,
    ) -> Result<Self> {
        let id = addon.id.as_str();
        let namespace = addon.namespace();
        let cluster = ctx.provider.cluster();

        let zones: Vec<String> = settings.required(id, "zones")?;
        let Some(primary_zone) = zones.first() else {
            return Err(Error::validation(id, "setting 'zones' must not be empty"));
        };
        let endpoints: Vec<Endpoint> =
            settings.optional_or(id, "endpoints", vec![Endpoint::Public, Endpoint::Private])?;
        let issuer: String = settings.optional_or(id, "issuer", "letsencrypt".to_string())?;

        let dns_names: Vec<String> = zones
            .iter()
            .flat_map(|zone| [format!("*.{}", zone), format!("*.{}.{}", cluster, zone)])
            .collect();
        let certificate_name = format!("wildcard.{}", cluster);
        let certificate = json!({
            "apiVersion": CERTIFICATE_API,
            "kind": "Certificate",
            "metadata": {"name": certificate_name, "namespace": namespace},
            "spec": {
                "secretName": WILDCARD_SECRET,
                "commonName": format!("*.{}", primary_zone),
                "issuerRef": {"name": issuer, "kind": "ClusterIssuer", "group": "cert-manager.io"},
                "dnsNames": dns_names,
            },
        });

        let backend_config = ctx.provider.is_gcp().then(|| {
            json!({
                "apiVersion": "cloud.google.com/v1",
                "kind": "BackendConfig",
                "metadata": {"name": BACKEND_CONFIG, "namespace": namespace},
                "spec": {"timeoutSec": 600},
            })
        });

        let source_ranges: Vec<String> = settings.optional_or(id, "cloudflare_ips", Vec::new())?;
        let additional_dns: Vec<String> = settings.optional_or(id, "additional_dns", Vec::new())?;
        let additional_ports: AdditionalPorts =
            settings.optional_or(id, "additional_ports", AdditionalPorts::default())?;
        let version: Option<String> = settings.optional(id, "version")?;

        let mut releases = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let mut hostnames = vec![format!("nginx-{}.{}.{}", endpoint, cluster, primary_zone)];
            if endpoint == Endpoint::Private {
                hostnames.extend(
                    additional_dns
                        .iter()
                        .map(|host| format!("{}.{}.{}", host, cluster, primary_zone)),
                );
            }

            let mut annotations = json!({
                "external-dns.alpha.kubernetes.io/hostname": hostnames.join(","),
            });
            annotations[format!("external-dns/{}-record", endpoint.dns_record())] = json!("true");
            load_balancer_annotations(&ctx.provider, endpoint, &mut annotations);

            let class = format!("nginx-{}", endpoint);
            let mut values = json!({
                "controller": {
                    "name": class,
                    "rbac": {"create": true},
                    "ingressClass": class,
                    "ingressClassResource": {
                        "name": class,
                        "enabled": true,
                        "default": false,
                        "controllerValue": "k8s.io/ingress-nginx",
                    },
                    "extraArgs": {
                        "default-ssl-certificate": format!("{}/{}", namespace, WILDCARD_SECRET),
                    },
                    "resources": {
                        "limits": {"cpu": "1000m", "memory": "2048Mi"},
                        "requests": {"cpu": "100m", "memory": "204Mi"},
                    },
                    "autoscaling": {
                        "enabled": true,
                        "minReplicas": 1,
                        "maxReplicas": 12,
                        "targetCPUUtilizationPercentage": 65,
                        "targetMemoryUtilizationPercentage": 65,
                    },
                    "service": {
                        "annotations": annotations,
                        "externalTrafficPolicy": "Local",
                    },
                    "metrics": {
                        "enabled": true,
                        "service": {
                            "annotations": {
                                "prometheus.io/port": "10254",
                                "prometheus.io/scrape": "true",
                            },
                        },
                    },
                },
            });
            match endpoint {
                Endpoint::Public if !source_ranges.is_empty() => {
                    values["controller"]["service"]["loadBalancerSourceRanges"] =
                        json!(source_ranges);
                }
                Endpoint::Private if !additional_ports.tcp.is_empty() => {
                    values["tcp"] = json!(additional_ports.tcp);
                }
                _ => {}
            }

            let mut values = with_user_values(id, settings, to_yaml(values)?)?;
            ctx.place_on_addon_nodes(&mut values);
            releases.push(
                ChartRelease::new(format!("nginx-ingress-{}", endpoint), CHART, namespace)
                    .with_version(version.clone())
                    .with_values(values),
            );
        }

        Ok(Self {
            certificate,
            certificate_ref: ObjectRef::namespaced(
                CERTIFICATE_API,
                "Certificate",
                namespace,
                certificate_name,
            ),
            backend_config,
            releases,
            poll_attempts: settings.optional_or(id, "certificate_poll_attempts", 20)?,
            poll_interval: seconds_setting(id, settings, "certificate_poll_interval_seconds", 45)?,
            charts: ctx.charts.clone(),
            applier: ctx.applier.clone(),
        })
    }

    async fn apply_resources(&self) -> Result<()> {
        if let Some(backend_config) = &self.backend_config {
            self.applier.apply(backend_config).await?;
        }
        self.applier.apply(&self.certificate).await
    }

    async fn install_controllers(&self) -> Result<()> {
        for release in &self.releases {
            self.charts.upgrade_install(release).await?;
        }
        Ok(())
    }

    /// Block until cert-manager reports the wildcard certificate Ready
    async fn wait_for_certificate(&self) -> Result<()> {
        let applier = &self.applier;
        let object = &self.certificate_ref;
        poll_until(
            self.poll_attempts,
            self.poll_interval,
            format!("certificate {}", object.name),
            || async move {
                let status = applier.condition_status(object, "Ready").await?;
                info!(
                    certificate = %object.name,
                    status = status.as_deref().unwrap_or("Unknown"),
                    "Certificate status"
                );
                Ok(status.as_deref() == Some(STATUS_TRUE))
            },
        )
        .await
    }
}

/// Provider-specific load balancer annotations for a controller service
fn load_balancer_annotations(
    provider: &Provider,
    endpoint: Endpoint,
    annotations: &mut serde_json::Value,
) {
    match provider {
        Provider::Aws { .. } => {
            annotations["service.beta.kubernetes.io/aws-load-balancer-type"] = json!("nlb-ip");
            annotations["service.beta.kubernetes.io/aws-load-balancer-backend-protocol"] =
                json!("tcp");
            annotations
                ["service.beta.kubernetes.io/aws-load-balancer-cross-zone-load-balancing-enabled"] =
                json!("true");
            annotations["service.beta.kubernetes.io/aws-load-balancer-connection-idle-timeout"] =
                json!("3600");
            annotations
                ["service.beta.kubernetes.io/aws-load-balancer-connection-draining-timeout"] =
                json!("60");
            if endpoint == Endpoint::Private {
                annotations["service.beta.kubernetes.io/aws-load-balancer-scheme"] =
                    json!("internal");
            }
        }
        Provider::Gcp { .. } => {
            annotations["cloud.google.com/backend-config"] =
                json!(format!("{{\"ports\": {{\"80\":\"{}\"}}}}", BACKEND_CONFIG));
            if endpoint == Endpoint::Private {
                annotations["networking.gke.io/load-balancer-type"] = json!("Internal");
            }
        }
    }
}

#[async_trait]
impl AddonHandle for NginxIngress {
    async fn install(&self) -> Result<()> {
        self.apply_resources().await?;
        self.wait_for_certificate().await?;
        self.install_controllers().await
    }

    async fn upgrade(&self) -> Result<()> {
        self.apply_resources().await?;
        self.install_controllers().await
    }

    async fn delete(&self) -> Result<()> {
        for release in self.releases.iter().rev() {
            self.charts
                .uninstall(&release.release, &release.namespace)
                .await?;
        }
        self.applier.delete(&self.certificate).await?;
        if let Some(backend_config) = &self.backend_config {
            self.applier.delete(backend_config).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::test_support::{aws, context, dry_context, gcp, settings};
    use crate::applier::MockResourceApplier;
    use crate::helm::{DryRunCharts, MockChartInstaller};
    use serde_yaml::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    const BASIC: &str = "
zones: [example.com, example.net]
certificate_poll_interval_seconds: 0
additional_dns: [grafana]
additional_ports:
  tcp:
    \"5432\": postgres/postgres:5432
";

    fn descriptor() -> AddonDescriptor {
        AddonDescriptor::new("nginx_ingress")
    }

    fn annotation<'a>(release: &'a ChartRelease, key: &str) -> Option<&'a Value> {
        release.values["controller"]["service"]["annotations"].get(key)
    }

    #[test]
    fn wildcard_certificate_covers_every_zone() {
        let nginx = NginxIngress::from_settings(&dry_context(aws()), &descriptor(), &settings(BASIC))
            .unwrap();
        let spec = &nginx.certificate["spec"];
        assert_eq!(nginx.certificate["metadata"]["name"], "wildcard.prod");
        assert_eq!(nginx.certificate["metadata"]["namespace"], "nginx-ingress");
        assert_eq!(spec["commonName"], "*.example.com");
        assert_eq!(spec["issuerRef"]["name"], "letsencrypt");
        assert_eq!(
            spec["dnsNames"],
            json!(["*.example.com", "*.prod.example.com", "*.example.net", "*.prod.example.net"])
        );
    }

    #[test]
    fn one_release_per_endpoint() {
        let nginx = NginxIngress::from_settings(&dry_context(aws()), &descriptor(), &settings(BASIC))
            .unwrap();
        let names: Vec<&str> = nginx.releases.iter().map(|r| r.release.as_str()).collect();
        assert_eq!(names, vec!["nginx-ingress-public", "nginx-ingress-private"]);

        let private = &nginx.releases[1];
        assert_eq!(
            annotation(private, "external-dns.alpha.kubernetes.io/hostname"),
            Some(&Value::from("nginx-private.prod.example.com,grafana.prod.example.com"))
        );
        assert_eq!(
            annotation(private, "external-dns/passthrough-record"),
            Some(&Value::from("true"))
        );
        assert_eq!(private.values["tcp"]["5432"], Value::from("postgres/postgres:5432"));
        assert!(nginx.releases[0].values.get("tcp").is_none());
    }

    #[test]
    fn aws_private_endpoint_is_internal() {
        let nginx = NginxIngress::from_settings(&dry_context(aws()), &descriptor(), &settings(BASIC))
            .unwrap();
        let key = "service.beta.kubernetes.io/aws-load-balancer-scheme";
        assert_eq!(annotation(&nginx.releases[1], key), Some(&Value::from("internal")));
        assert_eq!(annotation(&nginx.releases[0], key), None);
        assert!(nginx.backend_config.is_none());
    }

    #[test]
    fn gcp_gets_backend_config_and_internal_lb() {
        let nginx = NginxIngress::from_settings(&dry_context(gcp()), &descriptor(), &settings(BASIC))
            .unwrap();
        assert!(nginx.backend_config.is_some());
        assert_eq!(
            annotation(&nginx.releases[1], "networking.gke.io/load-balancer-type"),
            Some(&Value::from("Internal"))
        );
        assert_eq!(
            nginx.releases[0].values["nodeSelector"]["nodegroup"],
            Value::from("addons")
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let yaml = "zones: [example.com]\nendpoints: [public, dmz]\n";
        let err = NginxIngress::from_settings(&dry_context(aws()), &descriptor(), &settings(yaml))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn zones_are_required() {
        assert!(NginxIngress::from_settings(&dry_context(aws()), &descriptor(), &settings("{}")).is_err());
        assert!(
            NginxIngress::from_settings(&dry_context(aws()), &descriptor(), &settings("zones: []"))
                .is_err()
        );
    }

    #[tokio::test]
    async fn install_waits_for_ready_certificate() {
        let polls = Arc::new(AtomicU32::new(0));
        let mut applier = MockResourceApplier::new();
        applier.expect_apply().returning(|_| Ok(()));
        let counter = polls.clone();
        applier
            .expect_condition_status()
            .withf(|object, condition| object.name == "wildcard.prod" && condition == "Ready")
            .returning(move |_, _| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(if n < 2 { Some("False".to_string()) } else { Some(STATUS_TRUE.to_string()) })
            });
        let mut charts = MockChartInstaller::new();
        charts.expect_upgrade_install().times(2).returning(|_| Ok(()));

        let nginx = NginxIngress::from_settings(&context(aws(), charts, applier), &descriptor(), &settings(BASIC))
            .unwrap();
        nginx.install().await.unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn certificate_never_ready_times_out_before_controllers() {
        let mut applier = MockResourceApplier::new();
        applier.expect_apply().returning(|_| Ok(()));
        applier
            .expect_condition_status()
            .times(4)
            .returning(|_, _| Ok(None));
        let mut charts = MockChartInstaller::new();
        charts.expect_upgrade_install().never();

        let yaml = format!("{}certificate_poll_attempts: 4\n", BASIC);
        let nginx = NginxIngress::from_settings(&context(aws(), charts, applier), &descriptor(), &settings(&yaml))
            .unwrap();
        let err = nginx.install().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn zero_poll_attempts_still_checks_the_certificate() {
        let mut applier = MockResourceApplier::new();
        applier.expect_apply().returning(|_| Ok(()));
        applier
            .expect_condition_status()
            .times(1)
            .returning(|_, _| Ok(Some(STATUS_TRUE.to_string())));
        let mut charts = MockChartInstaller::new();
        charts.expect_upgrade_install().times(2).returning(|_| Ok(()));

        let yaml = format!("{}certificate_poll_attempts: 0\n", BASIC);
        let nginx = NginxIngress::from_settings(&context(aws(), charts, applier), &descriptor(), &settings(&yaml))
            .unwrap();
        nginx.install().await.unwrap();
    }

    #[tokio::test]
    async fn upgrade_skips_the_certificate_wait() {
        let mut applier = MockResourceApplier::new();
        applier.expect_apply().times(1).returning(|_| Ok(()));
        applier.expect_condition_status().never();

        let nginx = NginxIngress::from_settings(&context(aws(), DryRunCharts, applier), &descriptor(), &settings(BASIC))
            .unwrap();
        nginx.upgrade().await.unwrap();
    }
}
