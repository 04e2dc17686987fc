//! Addon implementations and the collaborators they drive
//!
//! This crate provides:
//! - ChartInstaller, with a helm-backed and a dry-run implementation
//! - ResourceApplier, with a kube-rs backed and a dry-run implementation
//! - The static addon catalog and a HandleFactory over it
//! - Handle implementations for every catalog entry

pub mod addons;
pub mod applier;
pub mod catalog;
pub mod context;
pub mod helm;

// Re-export collaborator types
pub use applier::{DryRunApplier, KubeApplier, ObjectRef, ResourceApplier};
pub use helm::{merge_values, ChartInstaller, ChartRelease, DryRunCharts, HelmCli};

#[cfg(test)]
pub use applier::MockResourceApplier;
#[cfg(test)]
pub use helm::MockChartInstaller;

// Re-export catalog types
pub use catalog::{catalog_ids, forced_addons, registry, CatalogFactory, Constructor, CATALOG};
pub use context::{AddonContext, Provider};
