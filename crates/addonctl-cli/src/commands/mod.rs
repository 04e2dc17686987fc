//! CLI commands

use addonctl_addons::Provider;
use addonctl_common::LifecycleAction;
use addonctl_core::Target;

pub mod aws;
pub mod gcp;
pub mod kubeconfig;
pub mod run;

/// What a provider subcommand asks for, independent of the provider flags
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Cluster the addons are managed on
    pub provider: Provider,
    /// Lifecycle action to run
    pub action: LifecycleAction,
    /// Addon selection
    pub target: Target,
}
