//! Helm chart installation
//!
//! Every chart-backed addon goes through [`ChartInstaller`]. The production
//! implementation shells out to `helm`; values are rendered to YAML and fed
//! on stdin so nothing is written to the working directory.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use addonctl_common::command::run_command;
use addonctl_common::{Error, Result};

/// One helm release of an addon
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRelease {
    /// Release name
    pub release: String,
    /// Chart reference, `<repo>/<chart>`
    pub chart: String,
    /// Namespace the release is installed into
    pub namespace: String,
    /// Pinned chart version, latest when unset
    pub version: Option<String>,
    /// Chart values
    pub values: Value,
}

impl ChartRelease {
    /// A release with empty values and no pinned version
    pub fn new(
        release: impl Into<String>,
        chart: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            release: release.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            version: None,
            values: Value::Mapping(Mapping::new()),
        }
    }

    /// Pin the chart version
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Replace the chart values
    pub fn with_values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    /// Arguments for `helm upgrade --install`, reading values from stdin
    pub fn upgrade_install_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "upgrade",
            "--install",
            self.release.as_str(),
            self.chart.as_str(),
            "--namespace",
            self.namespace.as_str(),
            "--values",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if let Some(version) = &self.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        args
    }
}

/// Deep-merge `overlay` into `base`.
///
/// Mappings merge key by key; any other value in `overlay` replaces the one
/// in `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Helm operations addons need
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Register a chart repository (re-registering updates the URL)
    async fn add_repo(&self, name: &str, url: &str) -> Result<()>;

    /// Refresh the local index of every registered repository
    async fn update_repos(&self) -> Result<()>;

    /// Install the release, or upgrade it when it already exists
    async fn upgrade_install(&self, release: &ChartRelease) -> Result<()>;

    /// Uninstall a release; a missing release is success
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()>;
}

/// Chart installer backed by the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self {
            binary: "helm".to_string(),
        }
    }
}

impl HelmCli {
    /// Use a specific helm binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn helm(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        run_command(&self.binary, &args, None).await
    }
}

/// Whether a helm failure only says the release is already gone
fn is_release_not_found(err: &Error) -> bool {
    matches!(err, Error::Command { message, .. } if message.contains("not found"))
}

#[async_trait]
impl ChartInstaller for HelmCli {
    async fn add_repo(&self, name: &str, url: &str) -> Result<()> {
        self.helm(&["repo", "add", name, url, "--force-update"])
            .await?;
        info!(repo = %name, url = %url, "Helm repo registered");
        Ok(())
    }

    async fn update_repos(&self) -> Result<()> {
        self.helm(&["repo", "update"]).await?;
        Ok(())
    }

    async fn upgrade_install(&self, release: &ChartRelease) -> Result<()> {
        let values = serde_yaml::to_string(&release.values)?;
        info!(
            release = %release.release,
            chart = %release.chart,
            namespace = %release.namespace,
            "Installing helm release"
        );
        debug!("Values for helm chart are:\n{}", values);
        run_command(
            &self.binary,
            &release.upgrade_install_args(),
            Some(values.as_str()),
        )
        .await?;
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        match self
            .helm(&["uninstall", release, "--namespace", namespace])
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_release_not_found(&e) => {
                info!(release = %release, namespace = %namespace, "Release already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Chart installer that only logs what it would do
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunCharts;

#[async_trait]
impl ChartInstaller for DryRunCharts {
    async fn add_repo(&self, name: &str, url: &str) -> Result<()> {
        info!(repo = %name, url = %url, "Would add helm repo");
        Ok(())
    }

    async fn update_repos(&self) -> Result<()> {
        info!("Would update helm repos");
        Ok(())
    }

    async fn upgrade_install(&self, release: &ChartRelease) -> Result<()> {
        let values = serde_yaml::to_string(&release.values)?;
        info!(
            release = %release.release,
            chart = %release.chart,
            namespace = %release.namespace,
            version = release.version.as_deref().unwrap_or("latest"),
            "Would upgrade --install with values:\n{}",
            values
        );
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        info!(release = %release, namespace = %namespace, "Would uninstall release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn upgrade_install_args_read_values_from_stdin() {
        let release = ChartRelease::new("redis", "bitnami/redis", "redis");
        assert_eq!(
            release.upgrade_install_args(),
            vec![
                "upgrade",
                "--install",
                "redis",
                "bitnami/redis",
                "--namespace",
                "redis",
                "--values",
                "-"
            ]
        );
    }

    #[test]
    fn upgrade_install_args_pin_version() {
        let release = ChartRelease::new("cert-manager", "jetstack/cert-manager", "cert-manager")
            .with_version(Some("v1.14.4".to_string()));
        let args = release.upgrade_install_args();
        assert_eq!(&args[args.len() - 2..], &["--version", "v1.14.4"]);
    }

    #[test]
    fn merge_overlays_nested_mappings() {
        let mut base = yaml("controller:\n  name: nginx-public\n  rbac:\n    create: true\n");
        merge_values(
            &mut base,
            yaml("controller:\n  rbac:\n    create: false\n  replicaCount: 2\n"),
        );
        assert_eq!(
            base,
            yaml("controller:\n  name: nginx-public\n  rbac:\n    create: false\n  replicaCount: 2\n")
        );
    }

    #[test]
    fn merge_replaces_non_mapping_values() {
        let mut base = yaml("domainFilters: [a.com, b.com]\ninterval: 3m\n");
        merge_values(&mut base, yaml("domainFilters: [c.com]\n"));
        assert_eq!(base, yaml("domainFilters: [c.com]\ninterval: 3m\n"));
    }

    #[rstest]
    #[case("exit status 1: Error: uninstall: Release not loaded: redis: release: not found", true)]
    #[case("exit status 1: Error: release: not found", true)]
    #[case("exit status 1: Error: Kubernetes cluster unreachable: connection refused", false)]
    fn missing_release_is_recognised(#[case] stderr: &str, #[case] expected: bool) {
        let err = Error::command("helm uninstall redis --namespace redis", stderr);
        assert_eq!(is_release_not_found(&err), expected);
    }

    #[test]
    fn only_command_errors_count_as_missing_release() {
        assert!(!is_release_not_found(&Error::serialization("not found")));
    }

    #[tokio::test]
    async fn helm_failure_surfaces_command_error() {
        let helm = HelmCli::with_binary("false");
        let err = helm.update_repos().await.unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }

    #[tokio::test]
    async fn dry_run_accepts_everything() {
        let charts = DryRunCharts;
        let release = ChartRelease::new("redis", "bitnami/redis", "redis")
            .with_values(yaml("architecture: standalone\n"));
        assert!(charts.add_repo("bitnami", "https://charts.bitnami.com/bitnami").await.is_ok());
        assert!(charts.update_repos().await.is_ok());
        assert!(charts.upgrade_install(&release).await.is_ok());
        assert!(charts.uninstall("redis", "redis").await.is_ok());
    }
}
