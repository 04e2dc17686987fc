//! Per-addon lifecycle states and the observer that receives transitions
//!
//! States are conceptual and never persisted:
//!
//! ```text
//! Resolved -> Installing -> Installed | Failed
//! Installed -> Upgrading -> Installed | Failed
//! Installed | Failed -> Deleting -> Deleted | Failed
//! ```
//!
//! There is no automatic way out of `Failed`; the operator re-runs.

use std::fmt;

use tracing::{error, info};

/// Lifecycle state of an addon within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonState {
    /// Part of the resolved order, not yet touched
    Resolved,
    /// Install in progress
    Installing,
    /// Install or upgrade finished
    Installed,
    /// Upgrade in progress
    Upgrading,
    /// Delete in progress
    Deleting,
    /// Delete finished
    Deleted,
    /// The last operation failed
    Failed,
}

impl AddonState {
    /// Whether the state ends an operation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AddonState::Installed | AddonState::Deleted | AddonState::Failed
        )
    }
}

impl fmt::Display for AddonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AddonState::Resolved => "Resolved",
            AddonState::Installing => "Installing",
            AddonState::Installed => "Installed",
            AddonState::Upgrading => "Upgrading",
            AddonState::Deleting => "Deleting",
            AddonState::Deleted => "Deleted",
            AddonState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Receives every lifecycle transition the orchestrator drives.
///
/// Injected into the orchestrator instead of relying on process-wide logging
/// configuration inside the core.
pub trait LifecycleObserver: Send + Sync {
    /// Called when `addon` enters `state`; `reason` is set for failures
    fn transition(&self, addon: &str, state: AddonState, reason: Option<&str>);
}

/// Observer that emits structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn transition(&self, addon: &str, state: AddonState, reason: Option<&str>) {
        if state == AddonState::Failed {
            error!(
                addon = %addon,
                reason = reason.unwrap_or("unknown"),
                "Addon operation failed"
            );
        } else if state.is_terminal() {
            info!(addon = %addon, state = %state, "Addon operation complete");
        } else {
            info!(addon = %addon, state = %state, "Addon operation started");
        }
    }
}
