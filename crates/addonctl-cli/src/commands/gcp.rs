//! `addonctl gcp` - manage addons on a GKE cluster

use clap::Args;

use addonctl_addons::Provider;
use addonctl_common::LifecycleAction;
use addonctl_core::Target;

use super::Invocation;

/// Options for Google hosted clusters
#[derive(Args, Debug)]
pub struct GcpArgs {
    /// Action to run: create, upgrade or delete
    #[arg(short = 'a', long, env = "ACTION")]
    pub action: LifecycleAction,

    /// The GKE cluster to manage addons for
    #[arg(short = 'c', long, env = "CLUSTER")]
    pub cluster: String,

    /// Addon to work on, or `all`
    #[arg(short = 'n', long, env = "NAME", default_value = "all")]
    pub name: Target,

    /// GCP project of the cluster
    #[arg(short = 'p', long, env = "PROJECT")]
    pub project: String,

    /// Region of the cluster
    #[arg(short = 'r', long, env = "REGION", default_value = "us-central1")]
    pub region: String,
}

impl GcpArgs {
    pub fn invocation(self) -> Invocation {
        Invocation {
            provider: Provider::Gcp {
                cluster: self.cluster,
                project: self.project,
                region: self.region,
            },
            action: self.action,
            target: self.name,
        }
    }
}
