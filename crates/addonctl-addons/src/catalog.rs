//! Static addon registration table
//!
//! Order matters: it is the resolver's tie-breaker, so two runs with the same
//! configuration always visit addons in the same order.

use addonctl_common::{AddonSettings, Error, ManagerConfig, Result};
use addonctl_core::{AddonDescriptor, AddonHandle, AddonRegistry, HandleFactory};
use tracing::debug;

use crate::addons::{cert_manager, chart, cluster_autoscaler, external_dns, nginx_ingress};
use crate::context::{AddonContext, Provider};

/// Builds the handle for one catalog entry
pub type Constructor =
    fn(&AddonContext, &AddonDescriptor, &AddonSettings) -> Result<Box<dyn AddonHandle>>;

/// Every addon this binary can manage, in catalog order
pub const CATALOG: &[(&str, Constructor)] = &[
    ("cert-manager", cert_manager::build),
    ("cluster-autoscaler", cluster_autoscaler::build),
    ("dashboard", chart::dashboard),
    ("ecr-proxy", chart::ecr_proxy),
    ("external-dns", external_dns::build),
    ("nginx-ingress", nginx_ingress::build),
    ("onepassword", chart::onepassword),
    ("openunison", chart::openunison),
    ("pgadmin", chart::pgadmin),
    ("rbac-manager", chart::rbac_manager),
    ("redis", chart::redis),
    ("sumologic", chart::sumologic),
];

/// Catalog ids in registration order
pub fn catalog_ids() -> Vec<&'static str> {
    CATALOG.iter().map(|(id, _)| *id).collect()
}

/// Addons the provider needs regardless of their `enabled` flag
pub fn forced_addons(provider: &Provider) -> Vec<&'static str> {
    match provider {
        Provider::Aws { .. } => vec!["cluster-autoscaler"],
        Provider::Gcp { .. } => Vec::new(),
    }
}

/// Build the registry for a configuration document against this catalog
pub fn registry(config: &ManagerConfig) -> Result<AddonRegistry> {
    AddonRegistry::from_config(&catalog_ids(), config)
}

/// Handle factory dispatching to the catalog constructors
pub struct CatalogFactory {
    context: AddonContext,
    config: ManagerConfig,
}

impl CatalogFactory {
    /// Factory over a run context and configuration document
    pub fn new(context: AddonContext, config: ManagerConfig) -> Self {
        Self { context, config }
    }
}

impl HandleFactory for CatalogFactory {
    fn create(&self, addon: &AddonDescriptor) -> Result<Box<dyn AddonHandle>> {
        let constructor = CATALOG
            .iter()
            .find(|(id, _)| *id == addon.id)
            .map(|(_, constructor)| constructor)
            .ok_or_else(|| Error::construction(&addon.id, "no constructor registered"))?;
        debug!(addon = %addon.id, provider = %self.context.provider, "constructing addon handle");
        let settings = self.config.addon(&addon.id).settings;
        constructor(&self.context, addon, &settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::test_support::{aws, dry_context, gcp};
    use addonctl_common::ConfigIssue;
    use addonctl_core::resolve;

    #[test]
    fn catalog_ids_are_unique_and_canonical() {
        let ids = catalog_ids();
        let registry = AddonRegistry::new(ids.iter().map(AddonDescriptor::new)).unwrap();
        assert_eq!(registry.len(), CATALOG.len());
        for id in ids {
            assert_eq!(id, addonctl_common::normalize_addon_id(id));
        }
    }

    #[test]
    fn aws_forces_cluster_autoscaler() {
        assert_eq!(forced_addons(&aws()), vec!["cluster-autoscaler"]);
        assert!(forced_addons(&gcp()).is_empty());
    }

    #[test]
    fn forced_autoscaler_overrides_disabled_flag() {
        let config = ManagerConfig::from_yaml(
            "
addons:
  cluster_autoscaler: {enabled: false}
  cert_manager: {enabled: false}
  dashboard: {enabled: false}
  ecr_proxy: {enabled: false}
  external_dns: {enabled: false}
  nginx_ingress: {enabled: false}
  onepassword: {enabled: false}
  openunison: {enabled: false}
  pgadmin: {enabled: false}
  rbac_manager: {enabled: false}
  redis: {enabled: false}
  sumologic: {enabled: false}
",
        )
        .unwrap();
        let registry = registry(&config).unwrap();
        assert_eq!(
            resolve(&registry, &forced_addons(&aws())).unwrap(),
            vec!["cluster-autoscaler"]
        );
        assert!(resolve(&registry, &forced_addons(&gcp())).unwrap().is_empty());
    }

    #[test]
    fn config_for_unknown_addon_is_rejected() {
        let config = ManagerConfig::from_yaml("addons:\n  traefik: {enabled: true}\n").unwrap();
        let err = registry(&config).unwrap_err();
        assert_eq!(err.config_issue(), Some(ConfigIssue::UnknownAddon));
    }

    #[test]
    fn factory_builds_configured_addon() {
        let config = ManagerConfig::from_yaml("addons:\n  redis:\n    version: 18.1.0\n").unwrap();
        let factory = CatalogFactory::new(dry_context(gcp()), config);
        assert!(factory.create(&AddonDescriptor::new("redis")).is_ok());
    }

    #[test]
    fn factory_surfaces_setting_errors() {
        let config = ManagerConfig::from_yaml("addons:\n  nginx_ingress:\n    endpoints: [public]\n").unwrap();
        let factory = CatalogFactory::new(dry_context(aws()), config);
        let err = factory.create(&AddonDescriptor::new("nginx-ingress")).err().unwrap();
        assert!(err.to_string().contains("zones"));
    }

    #[test]
    fn factory_rejects_ids_without_constructor() {
        let factory = CatalogFactory::new(dry_context(aws()), ManagerConfig::default());
        assert!(factory.create(&AddonDescriptor::new("traefik")).is_err());
    }
}
