//! external-dns against Cloudflare
//!
//! Two releases share the addon namespace: one publishes records behind the
//! Cloudflare proxy, the other publishes them DNS-only. Services opt in with
//! the `external-dns/<zone type>-record=true` annotation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use addonctl_common::{AddonSettings, Error, Result};
use addonctl_core::{AddonDescriptor, AddonHandle};

use super::{env_credential, secret_manifest, to_yaml, with_user_values};
use crate::applier::ResourceApplier;
use crate::context::AddonContext;
use crate::helm::{ChartInstaller, ChartRelease};

const CHART: &str = "bitnami/external-dns";
const TOKEN_SECRET: &str = "external-dns-cloudflare";
const ZONE_TYPES: [&str; 2] = ["proxied", "passthrough"];

/// external-dns handle
pub struct ExternalDns {
    secret: serde_json::Value,
    releases: Vec<ChartRelease>,
    charts: Arc<dyn ChartInstaller>,
    applier: Arc<dyn ResourceApplier>,
}

/// Catalog constructor
pub fn build(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    Ok(Box::new(ExternalDns::from_settings(ctx, addon, settings)?))
}

impl ExternalDns {
    /// Render both releases and the token secret
    pub fn from_settings(
        ctx: &AddonContext,
        addon: &AddonDescriptor,
        settings: &AddonSettings,
    ) -> Result<Self> {
        let id = addon.id.as_str();
        let zones: Vec<String> = settings.required(id, "zones")?;
        if zones.is_empty() {
            return Err(Error::validation(id, "setting 'zones' must not be empty"));
        }
        let email: Option<String> = settings.optional(id, "cloudflare_email")?;
        let version: Option<String> = settings.optional(id, "version")?;
        let token_var: String =
            settings.optional_or(id, "cloudflare_token_env", "CF_API_KEY".to_string())?;
        let token = env_credential(id, &token_var)?;

        let mut releases = Vec::with_capacity(ZONE_TYPES.len());
        for zone_type in ZONE_TYPES {
            let mut cloudflare = json!({
                "secretName": TOKEN_SECRET,
                "proxied": zone_type == "proxied",
            });
            if let Some(email) = &email {
                cloudflare["email"] = json!(email);
            }
            let values = json!({
                "domainFilters": zones,
                "provider": "cloudflare",
                "annotationFilter": format!("external-dns/{}-record=true", zone_type),
                "policy": "sync",
                "registry": "txt",
                "txtOwnerId": format!("{}-{}", ctx.provider.cluster(), zone_type),
                "interval": "3m",
                "cloudflare": cloudflare,
            });
            let mut values = with_user_values(id, settings, to_yaml(values)?)?;
            ctx.place_on_addon_nodes(&mut values);
            releases.push(
                ChartRelease::new(
                    format!("external-dns-{}-zones", zone_type),
                    CHART,
                    addon.namespace(),
                )
                .with_version(version.clone())
                .with_values(values),
            );
        }

        Ok(Self {
            secret: secret_manifest(
                TOKEN_SECRET,
                addon.namespace(),
                &[("cloudflare_api_token", token.as_str())],
            ),
            releases,
            charts: ctx.charts.clone(),
            applier: ctx.applier.clone(),
        })
    }

    async fn apply_all(&self) -> Result<()> {
        self.applier.apply(&self.secret).await?;
        for release in &self.releases {
            self.charts.upgrade_install(release).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AddonHandle for ExternalDns {
    async fn install(&self) -> Result<()> {
        self.apply_all().await
    }

    async fn upgrade(&self) -> Result<()> {
        self.apply_all().await
    }

    async fn delete(&self) -> Result<()> {
        for release in self.releases.iter().rev() {
            self.charts
                .uninstall(&release.release, &release.namespace)
                .await?;
        }
        self.applier.delete(&self.secret).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::test_support::{aws, context, dry_context, settings};
    use crate::applier::DryRunApplier;
    use crate::helm::MockChartInstaller;
    use mockall::Sequence;
    use serde_yaml::Value;

    fn build_with_token(yaml: &str) -> Result<ExternalDns> {
        std::env::set_var("ADDONCTL_TEST_DNS_TOKEN", "dns-token");
        ExternalDns::from_settings(
            &dry_context(aws()),
            &AddonDescriptor::new("external_dns"),
            &settings(&format!("cloudflare_token_env: ADDONCTL_TEST_DNS_TOKEN\n{}", yaml)),
        )
    }

    #[test]
    fn renders_proxied_and_passthrough_releases() {
        let dns = build_with_token("zones: [example.com]\ncloudflare_email: ops@example.com\n")
            .unwrap();

        let names: Vec<&str> = dns.releases.iter().map(|r| r.release.as_str()).collect();
        assert_eq!(
            names,
            vec!["external-dns-proxied-zones", "external-dns-passthrough-zones"]
        );

        let proxied = &dns.releases[0].values;
        assert_eq!(proxied["cloudflare"]["proxied"], Value::from(true));
        assert_eq!(proxied["txtOwnerId"], Value::from("prod-proxied"));
        assert_eq!(
            proxied["annotationFilter"],
            Value::from("external-dns/proxied-record=true")
        );

        let passthrough = &dns.releases[1].values;
        assert_eq!(passthrough["cloudflare"]["proxied"], Value::from(false));
        assert_eq!(passthrough["txtOwnerId"], Value::from("prod-passthrough"));
        assert_eq!(dns.releases[1].namespace, "external-dns");
    }

    #[test]
    fn token_goes_to_a_secret_not_the_values() {
        let dns = build_with_token("zones: [example.com]\n").unwrap();
        assert_eq!(dns.secret["stringData"]["cloudflare_api_token"], "dns-token");
        let rendered = serde_yaml::to_string(&dns.releases[0].values).unwrap();
        assert!(!rendered.contains("dns-token"));
    }

    #[test]
    fn zones_are_required() {
        assert!(matches!(
            build_with_token(""),
            Err(Error::Validation { .. })
        ));
        assert!(build_with_token("zones: []\n").is_err());
    }

    #[tokio::test]
    async fn delete_uninstalls_in_reverse() {
        std::env::set_var("ADDONCTL_TEST_DNS_TOKEN", "dns-token");
        let mut seq = Sequence::new();
        let mut charts = MockChartInstaller::new();
        for release in ["external-dns-passthrough-zones", "external-dns-proxied-zones"] {
            charts
                .expect_uninstall()
                .withf(move |r, ns| r == release && ns == "external-dns")
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
        }

        let dns = ExternalDns::from_settings(
            &context(aws(), charts, DryRunApplier),
            &AddonDescriptor::new("external-dns"),
            &settings("cloudflare_token_env: ADDONCTL_TEST_DNS_TOKEN\nzones: [example.com]\n"),
        )
        .unwrap();
        dns.delete().await.unwrap();
    }
}
