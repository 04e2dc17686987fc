//! Addon resolution and lifecycle orchestration
//!
//! This crate provides:
//! - AddonRegistry, the ordered catalog of addons with their enabled flags and dependencies
//! - A deterministic resolver producing the install order of enabled addons
//! - Orchestrator, which drives install, upgrade and delete across that order
//! - The AddonHandle, NamespaceProvisioner and LifecycleObserver seams it calls through

pub mod handle;
pub mod lifecycle;
pub mod namespace;
pub mod orchestrator;
pub mod registry;
pub mod resolver;

// Re-export handle types
pub use handle::{AddonHandle, HandleFactory};

#[cfg(test)]
pub use handle::MockAddonHandle;

pub use lifecycle::{AddonState, LifecycleObserver, TracingObserver};

// Re-export namespace types
pub use namespace::{KubeNamespaces, NamespaceProvisioner, NoopNamespaces};

#[cfg(test)]
pub use namespace::MockNamespaceProvisioner;

pub use orchestrator::{Orchestrator, Target};
pub use registry::{AddonDescriptor, AddonRegistry};
pub use resolver::resolve;
