//! Common types for addonctl: errors, configuration, and Kubernetes utilities

#![deny(missing_docs)]

pub mod command;
pub mod config;
pub mod error;
pub mod kube_utils;

pub use config::{normalize_addon_id, AddonConfig, AddonSettings, HelmConfig, ManagerConfig};
pub use error::{ConfigIssue, Error, LifecycleAction};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every server-side apply
pub const FIELD_MANAGER: &str = "addonctl";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Node selector applied to addon workloads on GCP clusters
pub const ADDON_NODEGROUP: &str = "addons";
