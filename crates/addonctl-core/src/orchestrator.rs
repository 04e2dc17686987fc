//! Lifecycle orchestration over the resolved addon order
//!
//! The orchestrator owns one handle per resolved addon, kept in dependency
//! order. Install and upgrade walk that order forward; delete walks it in
//! reverse so nothing is removed while an addon depending on it remains.
//! Every step is awaited before the next starts, and the first failure stops
//! the walk: later addons are left untouched and earlier ones stay as they
//! were left. Nothing is rolled back.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use addonctl_common::{normalize_addon_id, Error, LifecycleAction, Result};
use tracing::{debug, info};

use crate::handle::{AddonHandle, HandleFactory};
use crate::lifecycle::{AddonState, LifecycleObserver, TracingObserver};
use crate::namespace::NamespaceProvisioner;
use crate::registry::AddonRegistry;
use crate::resolver;

/// What an action applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every resolved addon
    All,
    /// A single addon by id
    Addon(String),
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let id = normalize_addon_id(s);
        match id.as_str() {
            "" => Err("addon name must not be empty".to_string()),
            "all" => Ok(Target::All),
            _ => Ok(Target::Addon(id)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => write!(f, "all"),
            Target::Addon(id) => write!(f, "{}", id),
        }
    }
}

/// One entry of the ordered addon set
struct ResolvedAddon {
    id: String,
    namespace: String,
    handle: Box<dyn AddonHandle>,
}

/// Drives addons through install, upgrade and delete in dependency order
pub struct Orchestrator {
    addons: Vec<ResolvedAddon>,
    namespaces: Arc<dyn NamespaceProvisioner>,
    observer: Arc<dyn LifecycleObserver>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("order", &self.order())
            .finish()
    }
}

impl Orchestrator {
    /// Resolve the catalog and build a handle for every enabled addon.
    ///
    /// Fails with a configuration error if resolution fails, or a
    /// construction error if the factory fails for any resolved addon. No
    /// partially built orchestrator is ever returned.
    pub fn new<S, F>(
        registry: &AddonRegistry,
        forced: &[S],
        factory: &F,
        namespaces: Arc<dyn NamespaceProvisioner>,
    ) -> Result<Self>
    where
        S: AsRef<str>,
        F: HandleFactory + ?Sized,
    {
        Self::with_observer(
            registry,
            forced,
            factory,
            namespaces,
            Arc::new(TracingObserver),
        )
    }

    /// Same as [`Orchestrator::new`] with an explicit lifecycle observer
    pub fn with_observer<S, F>(
        registry: &AddonRegistry,
        forced: &[S],
        factory: &F,
        namespaces: Arc<dyn NamespaceProvisioner>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<Self>
    where
        S: AsRef<str>,
        F: HandleFactory + ?Sized,
    {
        let order = resolver::resolve(registry, forced)?;
        info!(order = ?order, "Resolved addon order");

        let mut addons = Vec::with_capacity(order.len());
        for id in order {
            let descriptor = registry
                .get(&id)
                .ok_or_else(|| Error::construction(&id, "resolved addon missing from catalog"))?;
            let handle = factory.create(descriptor).map_err(|e| match e {
                Error::Construction { .. } => e,
                other => Error::construction(&id, other.to_string()),
            })?;
            addons.push(ResolvedAddon {
                namespace: descriptor.namespace().to_string(),
                id,
                handle,
            });
        }

        for addon in &addons {
            observer.transition(&addon.id, AddonState::Resolved, None);
        }

        Ok(Self {
            addons,
            namespaces,
            observer,
        })
    }

    /// Resolved addon ids in forward (install) order
    pub fn order(&self) -> Vec<&str> {
        self.addons.iter().map(|a| a.id.as_str()).collect()
    }

    /// Ids `run` would visit for this action and target, in visit order.
    ///
    /// Touches no collaborator.
    pub fn plan(&self, action: LifecycleAction, target: &Target) -> Result<Vec<&str>> {
        match target {
            Target::All => {
                let mut order = self.order();
                if action == LifecycleAction::Delete {
                    order.reverse();
                }
                Ok(order)
            }
            Target::Addon(id) => Ok(vec![self.find(id)?.id.as_str()]),
        }
    }

    /// Dispatch an action to one addon or to all of them
    pub async fn run(&self, action: LifecycleAction, target: &Target) -> Result<()> {
        info!(action = %action, target = %target, "Running addon action");
        match (action, target) {
            (LifecycleAction::Install, Target::All) => self.install_all().await,
            (LifecycleAction::Install, Target::Addon(id)) => self.install_one(id).await,
            (LifecycleAction::Upgrade, Target::All) => self.upgrade_all().await,
            (LifecycleAction::Upgrade, Target::Addon(id)) => self.upgrade_one(id).await,
            (LifecycleAction::Delete, Target::All) => self.delete_all().await,
            (LifecycleAction::Delete, Target::Addon(id)) => self.delete_one(id).await,
        }
    }

    /// Install every addon in dependency order, stopping at the first failure
    pub async fn install_all(&self) -> Result<()> {
        for addon in &self.addons {
            self.install(addon).await?;
        }
        Ok(())
    }

    /// Install a single addon without touching its dependencies
    pub async fn install_one(&self, id: &str) -> Result<()> {
        self.install(self.find(id)?).await
    }

    /// Upgrade every addon in dependency order, stopping at the first failure
    pub async fn upgrade_all(&self) -> Result<()> {
        for addon in &self.addons {
            self.upgrade(addon).await?;
        }
        Ok(())
    }

    /// Upgrade a single addon
    pub async fn upgrade_one(&self, id: &str) -> Result<()> {
        self.upgrade(self.find(id)?).await
    }

    /// Delete every addon in reverse dependency order, stopping at the first failure
    pub async fn delete_all(&self) -> Result<()> {
        for addon in self.addons.iter().rev() {
            self.delete(addon).await?;
        }
        Ok(())
    }

    /// Delete a single addon without cascading to its dependents
    pub async fn delete_one(&self, id: &str) -> Result<()> {
        self.delete(self.find(id)?).await
    }

    fn find(&self, id: &str) -> Result<&ResolvedAddon> {
        let id = normalize_addon_id(id);
        self.addons
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found(id))
    }

    async fn install(&self, addon: &ResolvedAddon) -> Result<()> {
        self.observer
            .transition(&addon.id, AddonState::Installing, None);
        let result = async {
            self.namespaces
                .create_namespace(&addon.namespace)
                .await
                .map_err(|e| Error::namespace(&addon.id, &addon.namespace, e.to_string()))?;
            addon
                .handle
                .install()
                .await
                .map_err(|e| Error::operation(&addon.id, LifecycleAction::Install, e.to_string()))
        }
        .await;
        self.settle(addon, result, AddonState::Installed)
    }

    async fn upgrade(&self, addon: &ResolvedAddon) -> Result<()> {
        self.observer
            .transition(&addon.id, AddonState::Upgrading, None);
        let result = addon
            .handle
            .upgrade()
            .await
            .map_err(|e| Error::operation(&addon.id, LifecycleAction::Upgrade, e.to_string()));
        self.settle(addon, result, AddonState::Installed)
    }

    async fn delete(&self, addon: &ResolvedAddon) -> Result<()> {
        self.observer
            .transition(&addon.id, AddonState::Deleting, None);
        let result = async {
            addon
                .handle
                .delete()
                .await
                .map_err(|e| Error::operation(&addon.id, LifecycleAction::Delete, e.to_string()))?;
            self.namespaces
                .delete_namespace(&addon.namespace)
                .await
                .map_err(|e| Error::namespace(&addon.id, &addon.namespace, e.to_string()))
        }
        .await;
        self.settle(addon, result, AddonState::Deleted)
    }

    fn settle(&self, addon: &ResolvedAddon, result: Result<()>, success: AddonState) -> Result<()> {
        match result {
            Ok(()) => {
                self.observer.transition(&addon.id, success, None);
                Ok(())
            }
            Err(e) => {
                debug!(addon = %addon.id, error = %e, "stopping traversal");
                let reason = e.to_string();
                self.observer
                    .transition(&addon.id, AddonState::Failed, Some(reason.as_str()));
                Err(e)
            }
        }
    }
}
