//! Addons that are nothing more than one or more helm releases

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::info;

use addonctl_common::{AddonSettings, Error, Result};
use addonctl_core::{AddonDescriptor, AddonHandle};

use super::{empty_values, with_user_values};
use crate::context::AddonContext;
use crate::helm::{ChartInstaller, ChartRelease};

/// Settings keys that describe a single release
const SINGLE_RELEASE_KEYS: [&str; 4] = ["release", "chart", "version", "values"];

/// Explicit release list entry under the `releases` setting
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReleaseSettings {
    release: String,
    chart: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    values: Option<Value>,
}

/// Handle installing a fixed list of releases into the addon namespace
pub struct ChartAddon {
    id: String,
    releases: Vec<ChartRelease>,
    charts: Arc<dyn ChartInstaller>,
}

impl std::fmt::Debug for ChartAddon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartAddon")
            .field("id", &self.id)
            .field("releases", &self.releases)
            .finish_non_exhaustive()
    }
}

impl ChartAddon {
    /// Build the release list from settings.
    ///
    /// `defaults` holds `(release, chart)` pairs used when the settings do
    /// not carry a `releases` list. For a single default release the
    /// top-level `release`, `chart`, `version` and `values` keys override it.
    pub fn from_settings(
        ctx: &AddonContext,
        addon: &AddonDescriptor,
        settings: &AddonSettings,
        defaults: &[(&str, &str)],
    ) -> Result<Self> {
        let id = addon.id.as_str();
        let specs = match settings.optional::<Vec<ReleaseSettings>>(id, "releases")? {
            Some(list) if list.is_empty() => {
                return Err(Error::validation(id, "setting 'releases' must not be empty"));
            }
            Some(list) => list,
            None => match defaults {
                [(release, chart)] => vec![ReleaseSettings {
                    release: settings.optional_or(id, "release", release.to_string())?,
                    chart: settings.optional_or(id, "chart", chart.to_string())?,
                    version: settings.optional(id, "version")?,
                    values: None,
                }],
                _ => {
                    if let Some(key) = SINGLE_RELEASE_KEYS.iter().find(|k| settings.contains(k)) {
                        return Err(Error::validation(
                            id,
                            format!(
                                "setting '{}' is ambiguous for an addon with several releases, use 'releases'",
                                key
                            ),
                        ));
                    }
                    defaults
                        .iter()
                        .map(|(release, chart)| ReleaseSettings {
                            release: release.to_string(),
                            chart: chart.to_string(),
                            version: None,
                            values: None,
                        })
                        .collect()
                }
            },
        };

        let single = specs.len() == 1 && !settings.contains("releases");
        let mut releases = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut values = match spec.values {
                Some(values) if values.is_mapping() => values,
                Some(_) => {
                    return Err(Error::validation(
                        id,
                        format!("values of release '{}' must be a mapping", spec.release),
                    ));
                }
                None => empty_values(),
            };
            if single {
                values = with_user_values(id, settings, values)?;
            }
            ctx.place_on_addon_nodes(&mut values);
            releases.push(
                ChartRelease::new(spec.release, spec.chart, addon.namespace())
                    .with_version(spec.version)
                    .with_values(values),
            );
        }

        Ok(Self {
            id: addon.id.clone(),
            releases,
            charts: ctx.charts.clone(),
        })
    }

    /// Releases in install order
    pub fn releases(&self) -> &[ChartRelease] {
        &self.releases
    }

    async fn install_releases(&self) -> Result<()> {
        for release in &self.releases {
            self.charts.upgrade_install(release).await?;
        }
        info!(addon = %self.id, releases = self.releases.len(), "Helm releases applied");
        Ok(())
    }
}

#[async_trait]
impl AddonHandle for ChartAddon {
    async fn install(&self) -> Result<()> {
        self.install_releases().await
    }

    async fn upgrade(&self) -> Result<()> {
        self.install_releases().await
    }

    async fn delete(&self) -> Result<()> {
        for release in self.releases.iter().rev() {
            self.charts
                .uninstall(&release.release, &release.namespace)
                .await?;
        }
        Ok(())
    }
}

// =============================================================================
// Catalog entries
// =============================================================================

fn boxed(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
    defaults: &[(&str, &str)],
) -> Result<Box<dyn AddonHandle>> {
    Ok(Box::new(ChartAddon::from_settings(ctx, addon, settings, defaults)?))
}

/// Kubernetes dashboard
pub fn dashboard(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(
        ctx,
        addon,
        settings,
        &[("dashboard", "kubernetes_dashboard/kubernetes-dashboard")],
    )
}

/// Pull-through proxy for ECR
pub fn ecr_proxy(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(ctx, addon, settings, &[("kube", "evryfs/ecr-proxy")])
}

/// 1Password Connect and its secrets injector
pub fn onepassword(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(
        ctx,
        addon,
        settings,
        &[
            ("onepassword-connect", "onepassword/connect"),
            ("secrets-injector", "onepassword/secrets-injector"),
        ],
    )
}

/// OpenUnison operator, orchestra and login portal
pub fn openunison(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(
        ctx,
        addon,
        settings,
        &[
            ("openunison", "tremolo/openunison-operator"),
            ("orchestra", "tremolo/orchestra"),
            ("orchestra-login-portal", "tremolo/orchestra-login-portal"),
            ("orchestra-login-googlews", "tremolo/orchestra-login-googlews"),
        ],
    )
}

/// pgAdmin
pub fn pgadmin(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(ctx, addon, settings, &[("pgadmin", "runix/pgadmin4")])
}

/// Fairwinds rbac-manager
pub fn rbac_manager(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(
        ctx,
        addon,
        settings,
        &[("rbac-manager", "fairwinds-stable/rbac-manager")],
    )
}

/// Redis
pub fn redis(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(ctx, addon, settings, &[("redis", "bitnami/redis")])
}

/// Sumo Logic collection
pub fn sumologic(
    ctx: &AddonContext,
    addon: &AddonDescriptor,
    settings: &AddonSettings,
) -> Result<Box<dyn AddonHandle>> {
    boxed(ctx, addon, settings, &[("sumologic", "sumologic/sumologic")])
}
