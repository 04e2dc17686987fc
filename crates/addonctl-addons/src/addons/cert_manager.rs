//! cert-manager and its cluster issuers
//!
//! The chart is installed first, then the credentials issuers reference,
//! then one `ClusterIssuer` per configured issuer. Issuer applies are retried
//! while the cert-manager webhook comes up. Delete runs the other way round.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use addonctl_common::kube_utils::poll_until;
use addonctl_common::{AddonSettings, Result};
use addonctl_core::{AddonDescriptor, AddonHandle};

use super::{env_credential, seconds_setting, secret_manifest, to_yaml, with_user_values};
use crate::applier::ResourceApplier;
use crate::context::AddonContext;
use crate::helm::{ChartInstaller, ChartRelease};

const CHART: &str = "jetstack/cert-manager";
const CLOUDFLARE_SECRET: &str = "cloudflare-api-key-secret";
const CLOUDFLARE_SECRET_KEY: &str = "api-key";
const VAULT_APPROLE_SECRET: &str = "cert-manager-vault-approle";
const VAULT_APPROLE_SECRET_KEY: &str = "secretId";

#[derive(Debug, Clone, Default, Deserialize)]
struct ClusterIssuerSettings {
    #[serde(default)]
    issuers: Vec<IssuerSettings>,
}

#[derive(Debug, Clone, Deserialize)]
struct IssuerSettings {
    name: String,
    #[serde(flatten)]
    kind: IssuerKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum IssuerKind {
    /// ACME with Cloudflare DNS01 solving
    Acme {
        email: String,
        server: String,
        #[serde(default)]
        zones: Vec<String>,
    },
    /// Vault PKI through AppRole auth
    Vault { server: String, role: String },
    /// CA keypair held in a pre-existing secret
    Private { secret: String },
}

/// cert-manager handle
pub struct CertManager {
    release: ChartRelease,
    secrets: Vec<serde_json::Value>,
    issuers: Vec<serde_json::Value>,
    apply_attempts: u32,
    apply_interval: Duration,
    charts: Arc<dyn ChartInstaller>,
    applier: Arc<dyn ResourceApplier>,
}

/// Catalog constructor
pub fn build(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    Ok(Box::new(CertManager::from_settings(ctx, addon, settings)?))
}

impl CertManager {
    /// Render the release, secrets and issuers from settings
    pub fn from_settings(
        ctx: &AddonContext,
        addon: &AddonDescriptor,
        settings: &AddonSettings,
    ) -> Result<Self> {
        let id = addon.id.as_str();
        let namespace = addon.namespace();
        let issuers: ClusterIssuerSettings =
            settings.optional_or(id, "cluster_issuer", ClusterIssuerSettings::default())?;
        let default_issuer: Option<String> = settings.optional(id, "default_issuer")?;
        let has_acme = issuers
            .issuers
            .iter()
            .any(|i| matches!(i.kind, IssuerKind::Acme { .. }));
        let has_vault = issuers
            .issuers
            .iter()
            .any(|i| matches!(i.kind, IssuerKind::Vault { .. }));

        let mut values = json!({
            "installCRDs": true,
            "serviceAccount": {"create": true, "name": "cert-manager"},
            "securityContext": {"fsGroup": 1000},
        });
        if let Some(issuer) = &default_issuer {
            values["ingressShim"] = json!({
                "defaultIssuerName": issuer,
                "defaultIssuerKind": "ClusterIssuer",
                "defaultIssuerGroup": "cert-manager.io",
            });
        }
        if has_acme {
            values["extraArgs"] = json!([
                "--dns01-recursive-nameservers-only",
                "--dns01-recursive-nameservers=8.8.8.8:53",
            ]);
        }
        let mut values = with_user_values(id, settings, to_yaml(values)?)?;
        ctx.place_on_addon_nodes(&mut values);
        let release = ChartRelease::new("cert-manager", CHART, namespace)
            .with_version(settings.optional(id, "version")?)
            .with_values(values);

        let mut secrets = Vec::new();
        if has_acme {
            let var: String = settings.optional_or(id, "cloudflare_token_env", "CF_API_KEY".to_string())?;
            let token = env_credential(id, &var)?;
            secrets.push(secret_manifest(
                CLOUDFLARE_SECRET,
                namespace,
                &[(CLOUDFLARE_SECRET_KEY, token.as_str())],
            ));
        }
        let mut role_id = None;
        if has_vault {
            let role_var: String =
                settings.optional_or(id, "vault_role_id_env", "VAULT_APPROLE_ROLE_ID".to_string())?;
            let secret_var: String = settings.optional_or(
                id,
                "vault_secret_id_env",
                "VAULT_APPROLE_SECRET_ID".to_string(),
            )?;
            role_id = Some(env_credential(id, &role_var)?);
            let secret_id = env_credential(id, &secret_var)?;
            secrets.push(secret_manifest(
                VAULT_APPROLE_SECRET,
                namespace,
                &[(VAULT_APPROLE_SECRET_KEY, secret_id.as_str())],
            ));
        }

        let issuers = issuers
            .issuers
            .iter()
            .map(|issuer| cluster_issuer(issuer, role_id.as_deref()))
            .collect();

        Ok(Self {
            release,
            secrets,
            issuers,
            apply_attempts: settings.optional_or(id, "issuer_apply_attempts", 10)?,
            apply_interval: seconds_setting(id, settings, "issuer_apply_interval_seconds", 15)?,
            charts: ctx.charts.clone(),
            applier: ctx.applier.clone(),
        })
    }

    async fn apply_all(&self) -> Result<()> {
        self.charts.upgrade_install(&self.release).await?;
        for secret in &self.secrets {
            self.applier.apply(secret).await?;
        }
        for issuer in &self.issuers {
            self.apply_issuer(issuer).await?;
        }
        Ok(())
    }

    /// The webhook rejects issuers until its pods are serving
    async fn apply_issuer(&self, issuer: &serde_json::Value) -> Result<()> {
        let name = issuer
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let applier = &self.applier;
        poll_until(
            self.apply_attempts,
            self.apply_interval,
            format!("ClusterIssuer {}", name),
            || async move {
                match applier.apply(issuer).await {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        warn!(issuer = %name, error = %e, "ClusterIssuer not accepted yet");
                        Ok(false)
                    }
                }
            },
        )
        .await?;
        info!(issuer = %name, "ClusterIssuer applied");
        Ok(())
    }
}

fn cluster_issuer(issuer: &IssuerSettings, role_id: Option<&str>) -> serde_json::Value {
    let spec = match &issuer.kind {
        IssuerKind::Acme {
            email,
            server,
            zones,
        } => json!({
            "acme": {
                "email": email,
                "server": server,
                "preferredChain": "ISRG Root X1",
                "privateKeySecretRef": {"name": format!("{}-account-key", issuer.name)},
                "solvers": [{
                    "selector": {"dnsZones": zones},
                    "dns01": {
                        "cloudflare": {
                            "email": email,
                            "apiTokenSecretRef": {
                                "name": CLOUDFLARE_SECRET,
                                "key": CLOUDFLARE_SECRET_KEY,
                            },
                        },
                    },
                }],
            }
        }),
        IssuerKind::Vault { server, role } => json!({
            "vault": {
                "path": format!("pki/sign/{}", role),
                "server": server,
                "auth": {
                    "appRole": {
                        "path": "approle",
                        "roleId": role_id.unwrap_or_default(),
                        "secretRef": {
                            "name": VAULT_APPROLE_SECRET,
                            "key": VAULT_APPROLE_SECRET_KEY,
                        },
                    },
                },
            }
        }),
        IssuerKind::Private { secret } => json!({"ca": {"secretName": secret}}),
    };
    json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "ClusterIssuer",
        "metadata": {"name": issuer.name},
        "spec": spec,
    })
}

#[async_trait]
impl AddonHandle for CertManager {
    async fn install(&self) -> Result<()> {
        self.apply_all().await
    }

    async fn upgrade(&self) -> Result<()> {
        self.apply_all().await
    }

    async fn delete(&self) -> Result<()> {
        for issuer in &self.issuers {
            self.applier.delete(issuer).await?;
        }
        for secret in &self.secrets {
            self.applier.delete(secret).await?;
        }
        self.charts
            .uninstall(&self.release.release, &self.release.namespace)
            .await
    }
}
