//! Addon lifecycle capability
//!
//! The orchestrator only ever calls `install`, `upgrade` and `delete`. What
//! those do (helm releases, manifests, readiness waits) lives behind this
//! seam in the collaborator crate.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use addonctl_common::Result;

use crate::registry::AddonDescriptor;

/// Lifecycle operations for one addon instance.
///
/// Implementations are expected to be idempotent: `install` on an existing
/// installation behaves like `upgrade`, and `delete` of an absent addon
/// succeeds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AddonHandle: Send + Sync {
    /// Install the addon, or re-apply it if already present
    async fn install(&self) -> Result<()>;

    /// Upgrade an existing installation
    async fn upgrade(&self) -> Result<()>;

    /// Remove the addon
    async fn delete(&self) -> Result<()>;
}

/// Builds handles for resolved addons.
///
/// Called once per resolved addon while the orchestrator is constructed.
pub trait HandleFactory {
    /// Create the handle for one resolved addon
    fn create(&self, addon: &AddonDescriptor) -> Result<Box<dyn AddonHandle>>;
}

impl<F> HandleFactory for F
where
    F: Fn(&AddonDescriptor) -> Result<Box<dyn AddonHandle>>,
{
    fn create(&self, addon: &AddonDescriptor) -> Result<Box<dyn AddonHandle>> {
        self(addon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addonctl_common::Error;

    #[tokio::test]
    async fn mock_handle_can_be_used() {
        let mut handle = MockAddonHandle::new();
        handle.expect_install().times(1).returning(|| Ok(()));

        assert!(handle.install().await.is_ok());
    }

    #[tokio::test]
    async fn mock_handle_propagates_errors() {
        let mut handle = MockAddonHandle::new();
        handle
            .expect_delete()
            .returning(|| Err(Error::command("helm uninstall redis", "release: not found")));

        let err = handle.delete().await.unwrap_err();
        assert!(err.to_string().contains("helm uninstall redis"));
    }

    #[test]
    fn closures_are_factories() {
        let factory = |addon: &AddonDescriptor| -> Result<Box<dyn AddonHandle>> {
            if addon.id == "broken" {
                return Err(Error::construction(&addon.id, "no settings"));
            }
            Ok(Box::new(MockAddonHandle::new()))
        };

        assert!(factory.create(&AddonDescriptor::new("redis")).is_ok());
        assert!(factory.create(&AddonDescriptor::new("broken")).is_err());
    }
}
