//! Run an addon lifecycle action against a cluster
//!
//! Sequence:
//! 1. Load and validate the configuration document
//! 2. Verify required binaries are on PATH
//! 3. Refresh the kubeconfig for the target cluster
//! 4. Register helm repositories
//! 5. Build the orchestrator over the catalog
//! 6. Run the action
//!
//! A dry run skips steps 2 and 3, prints the plan and drives the same
//! traversal against collaborators that only log.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use addonctl_addons::{
    catalog, forced_addons, AddonContext, CatalogFactory, ChartInstaller, DryRunApplier,
    DryRunCharts, HelmCli, KubeApplier, ResourceApplier,
};
use addonctl_common::{kube_utils, ManagerConfig};
use addonctl_core::{
    resolve, KubeNamespaces, NamespaceProvisioner, NoopNamespaces, Orchestrator,
};

use super::kubeconfig::{check_required_binaries, refresh_kubeconfig};
use super::Invocation;
use crate::{Error, Result};

/// Options shared by every provider subcommand
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    /// Configuration document to load
    pub config_file: &'a Path,
    /// Print the plan and log instead of touching the cluster
    pub dry_run: bool,
}

/// Load the configuration document, rejecting a missing file up front
pub fn load_config(path: &Path) -> Result<ManagerConfig> {
    if !path.exists() {
        return Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(ManagerConfig::load(path)?)
}

/// Run one action for one provider invocation
pub async fn execute(options: RunOptions<'_>, invocation: Invocation) -> Result<()> {
    let config = load_config(options.config_file)?;
    // Resolve before touching anything external so a bad graph fails fast
    let registry = catalog::registry(&config)?;
    let forced = forced_addons(&invocation.provider);
    resolve(&registry, &forced)?;

    info!(
        provider = %invocation.provider,
        cluster = %invocation.provider.cluster(),
        action = %invocation.action,
        target = %invocation.target,
        dry_run = options.dry_run,
        "Starting addon run"
    );

    let (charts, applier, namespaces) = if options.dry_run {
        dry_run_collaborators()
    } else {
        check_required_binaries(&config.required_binaries).await?;
        refresh_kubeconfig(&invocation.provider).await?;
        live_collaborators().await?
    };

    register_repos(charts.as_ref(), &config).await?;

    let context = AddonContext::new(invocation.provider.clone(), charts, applier);
    let factory = CatalogFactory::new(context, config);
    let orchestrator = Orchestrator::new(&registry, &forced, &factory, namespaces)?;

    if options.dry_run {
        let plan = orchestrator.plan(invocation.action, &invocation.target)?;
        println!(
            "Plan for {} on {} ({}):",
            invocation.action,
            invocation.provider.cluster(),
            invocation.provider
        );
        for (step, id) in plan.iter().enumerate() {
            println!("  {}. {}", step + 1, id);
        }
    }

    orchestrator
        .run(invocation.action, &invocation.target)
        .await?;
    info!(action = %invocation.action, target = %invocation.target, "Addon run complete");
    Ok(())
}

type Collaborators = (
    Arc<dyn ChartInstaller>,
    Arc<dyn ResourceApplier>,
    Arc<dyn NamespaceProvisioner>,
);

fn dry_run_collaborators() -> Collaborators {
    (
        Arc::new(DryRunCharts),
        Arc::new(DryRunApplier),
        Arc::new(NoopNamespaces),
    )
}

async fn live_collaborators() -> Result<Collaborators> {
    let client = kube_utils::create_client(None).await?;
    let collaborators: Collaborators = (
        Arc::new(HelmCli::default()),
        Arc::new(KubeApplier::new(client.clone())),
        Arc::new(KubeNamespaces::new(client)),
    );
    Ok(collaborators)
}

/// Register every configured helm repository, then refresh the index once
pub async fn register_repos(charts: &dyn ChartInstaller, config: &ManagerConfig) -> Result<()> {
    if config.helm.repos.is_empty() {
        return Ok(());
    }
    for (name, url) in &config.helm.repos {
        charts.add_repo(name, url).await?;
    }
    charts.update_repos().await?;
    Ok(())
}
