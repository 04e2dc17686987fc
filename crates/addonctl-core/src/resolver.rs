//! Dependency resolution
//!
//! Computes the install order for the enabled part of the catalog with a
//! fixed-point relaxation: each pass looks at an immutable snapshot of what
//! earlier passes decided and enables every addon whose dependencies are all
//! already enabled. An addon is only appended once its dependencies are
//! present, so append order is a topological order.
//!
//! Forced-enable addons whose dependencies are met within the forced set
//! itself seed the order, in the order they were given. Within a pass,
//! addons are visited in catalog order, which makes the result a pure
//! function of the catalog and the forced-enable list.

use std::collections::{BTreeSet, HashSet};

use addonctl_common::{normalize_addon_id, ConfigIssue, Error, Result};
use tracing::debug;

use crate::registry::{AddonDescriptor, AddonRegistry};

/// Working set for one resolution call. Never outlives `resolve`.
#[derive(Debug, Clone)]
struct ResolutionState {
    /// Enabled ids in append order
    resolved: Vec<String>,
    /// Ids determined disabled
    excluded: BTreeSet<String>,
    /// Ids not yet classified, in catalog order
    pending: Vec<String>,
}

impl ResolutionState {
    /// Initial state: forced ids with satisfied dependencies first, the rest pending.
    fn seeded(registry: &AddonRegistry, forced: &[String]) -> ResolutionState {
        let mut resolved: Vec<String> = Vec::new();
        loop {
            let before = resolved.len();
            for id in forced {
                if resolved.contains(id) {
                    continue;
                }
                let Some(addon) = registry.get(id) else {
                    continue;
                };
                if addon.depends_on.iter().all(|dep| resolved.contains(dep)) {
                    resolved.push(id.clone());
                }
            }
            if resolved.len() == before {
                break;
            }
        }

        let pending = registry
            .iter()
            .map(|a| a.id.clone())
            .filter(|id| !resolved.contains(id))
            .collect();
        ResolutionState {
            resolved,
            excluded: BTreeSet::new(),
            pending,
        }
    }

    fn is_classified(&self, id: &str) -> bool {
        self.excluded.contains(id) || self.resolved.iter().any(|r| r == id)
    }

    /// Produce the next state from this snapshot without mutating it.
    fn relax(&self, registry: &AddonRegistry, forced: &HashSet<String>) -> ResolutionState {
        let enabled: HashSet<&str> = self.resolved.iter().map(String::as_str).collect();
        let mut next = ResolutionState {
            resolved: self.resolved.clone(),
            excluded: self.excluded.clone(),
            pending: Vec::new(),
        };

        for id in &self.pending {
            let Some(addon) = registry.get(id) else {
                continue;
            };
            if !is_enabled(addon, forced) {
                next.excluded.insert(id.clone());
            } else if addon
                .depends_on
                .iter()
                .all(|dep| enabled.contains(dep.as_str()))
            {
                next.resolved.push(id.clone());
            } else {
                next.pending.push(id.clone());
            }
        }

        next
    }

    fn classified(&self) -> usize {
        self.resolved.len() + self.excluded.len()
    }
}

fn is_enabled(addon: &AddonDescriptor, forced: &HashSet<String>) -> bool {
    addon.enabled || forced.contains(&addon.id)
}

/// Resolve the install order of the enabled addons.
///
/// `forced` names addons that are enabled regardless of their configured
/// flag (e.g. provider-specific requirements). They lead the order unless
/// they depend on something outside the forced list. Fails with a configuration
/// error when a dependency or forced id is outside the catalog, when an
/// enabled addon depends on a disabled one, or when the enabled graph has a
/// cycle.
pub fn resolve<S: AsRef<str>>(registry: &AddonRegistry, forced: &[S]) -> Result<Vec<String>> {
    let mut seed_order: Vec<String> = Vec::with_capacity(forced.len());
    for id in forced.iter().map(|f| normalize_addon_id(f.as_ref())) {
        if !seed_order.contains(&id) {
            seed_order.push(id);
        }
    }
    let forced: HashSet<String> = seed_order.iter().cloned().collect();
    validate_references(registry, &forced)?;

    let mut state = ResolutionState::seeded(registry, &seed_order);

    let mut pass = 0;
    while !state.pending.is_empty() {
        pass += 1;
        let next = state.relax(registry, &forced);
        if next.classified() == state.classified() {
            return Err(deadlock_error(registry, &next));
        }
        debug!(
            pass,
            resolved = next.resolved.len(),
            excluded = next.excluded.len(),
            pending = next.pending.len(),
            "dependency resolution pass"
        );
        state = next;
    }

    Ok(state.resolved)
}

/// Dangling references are reported up front, distinct from cycles.
fn validate_references(registry: &AddonRegistry, forced: &HashSet<String>) -> Result<()> {
    let mut unknown_forced: Vec<&String> = forced.iter().filter(|f| !registry.contains(f)).collect();
    if !unknown_forced.is_empty() {
        unknown_forced.sort();
        return Err(Error::config(
            ConfigIssue::UnknownAddon,
            format!(
                "forced-enable names addons outside the catalog: {}",
                join(unknown_forced.iter().map(|s| s.as_str()))
            ),
            unknown_forced.into_iter().cloned(),
        ));
    }

    for addon in registry.iter() {
        if let Some(dep) = addon.depends_on.iter().find(|d| !registry.contains(d)) {
            return Err(Error::config(
                ConfigIssue::UnknownDependency,
                format!("addon '{}' depends on unknown addon '{}'", addon.id, dep),
                [addon.id.clone(), dep.clone()],
            ));
        }
    }

    Ok(())
}

fn deadlock_error(registry: &AddonRegistry, state: &ResolutionState) -> Error {
    for id in &state.pending {
        let Some(addon) = registry.get(id) else {
            continue;
        };
        if let Some(dep) = addon
            .depends_on
            .iter()
            .find(|d| state.excluded.contains(d.as_str()))
        {
            return Error::config(
                ConfigIssue::DisabledDependency,
                format!("addon '{}' depends on disabled addon '{}'", addon.id, dep),
                [addon.id.clone(), dep.clone()],
            );
        }
    }

    // Anything still pending either sits on a cycle or waits on one.
    let remaining: Vec<&String> = state
        .pending
        .iter()
        .filter(|id| !state.is_classified(id))
        .collect();
    Error::config(
        ConfigIssue::Cycle,
        format!(
            "unresolvable dependency set: {}",
            join(remaining.iter().map(|s| s.as_str()))
        ),
        remaining.into_iter().cloned(),
    )
}

fn join<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    ids.collect::<Vec<_>>().join(", ")
}
