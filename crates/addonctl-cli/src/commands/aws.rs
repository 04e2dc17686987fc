//! `addonctl aws` - manage addons on an EKS cluster

use clap::{Args, ValueEnum};

use addonctl_addons::Provider;
use addonctl_common::LifecycleAction;
use addonctl_core::Target;

use super::Invocation;

/// AWS account profile the cluster lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Default,
    Dev,
    Prod,
}

impl Environment {
    /// Profile name in ~/.aws/credentials
    pub fn profile(&self) -> &'static str {
        match self {
            Environment::Default => "default",
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

/// Options for AWS hosted clusters
#[derive(Args, Debug)]
pub struct AwsArgs {
    /// Action to run: create, upgrade or delete
    #[arg(short = 'a', long, env = "ACTION")]
    pub action: LifecycleAction,

    /// The EKS cluster to manage addons for
    #[arg(short = 'c', long, env = "CLUSTER")]
    pub cluster: String,

    /// AWS account, maps to a profile in ~/.aws/credentials
    #[arg(short = 'e', long, env = "ENVIRONMENT", value_enum, default_value_t = Environment::Default)]
    pub environment: Environment,

    /// Addon to work on, or `all`
    #[arg(short = 'n', long, env = "NAME", default_value = "all")]
    pub name: Target,

    /// Region of the cluster
    #[arg(short = 'r', long, env = "REGION", default_value = "us-west-2")]
    pub region: String,
}

impl AwsArgs {
    pub fn invocation(self) -> Invocation {
        Invocation {
            provider: Provider::Aws {
                cluster: self.cluster,
                region: self.region,
                environment: self.environment.profile().to_string(),
            },
            action: self.action,
            target: self.name,
        }
    }
}
