//! Prerequisite checks and kubeconfig refresh before any addon work

use addonctl_addons::Provider;
use addonctl_common::command::{binary_available, run_command};
use tracing::{error, info};

use crate::{Error, Result};

/// Fail if any of `binaries` is missing from `PATH`, naming every missing one
pub async fn check_required_binaries(binaries: &[String]) -> Result<()> {
    let mut missing = Vec::new();
    for binary in binaries {
        if !binary_available(binary).await {
            error!(binary = %binary, "Required binary not found on PATH");
            missing.push(binary.clone());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingBinaries { binaries: missing })
    }
}

/// Commands that point the local kubeconfig at the target cluster
pub fn refresh_commands(provider: &Provider) -> Vec<(&'static str, Vec<String>)> {
    let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match provider {
        Provider::Aws {
            cluster,
            region,
            environment,
        } => vec![(
            "aws",
            args(&[
                "eks",
                "update-kubeconfig",
                "--region",
                region.as_str(),
                "--name",
                cluster.as_str(),
                "--profile",
                environment.as_str(),
            ]),
        )],
        Provider::Gcp {
            cluster,
            project,
            region,
        } => vec![
            ("gcloud", args(&["config", "set", "project", project.as_str()])),
            (
                "gcloud",
                args(&[
                    "container",
                    "clusters",
                    "get-credentials",
                    cluster.as_str(),
                    "--region",
                    region.as_str(),
                ]),
            ),
        ],
    }
}

/// Run the kubeconfig refresh for the provider
pub async fn refresh_kubeconfig(provider: &Provider) -> Result<()> {
    run_refresh(provider.cluster(), &refresh_commands(provider)).await?;
    info!(cluster = %provider.cluster(), provider = %provider, "Kubeconfig updated");
    Ok(())
}

async fn run_refresh(cluster: &str, commands: &[(&str, Vec<String>)]) -> Result<()> {
    for (program, args) in commands {
        run_command(program, args, None).await.map_err(|e| {
            Error::command_failed(format!(
                "could not fetch credentials for cluster {}: {}",
                cluster, e
            ))
        })?;
    }
    Ok(())
}
