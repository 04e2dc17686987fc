//! Addon catalog
//!
//! The registry is the ordered set of addons this binary knows how to
//! manage, each paired with the `enabled` flag and dependency list from the
//! configuration document. Catalog order is the resolver's tie-breaker, so it
//! is kept exactly as registered.

use std::collections::HashMap;

use addonctl_common::{normalize_addon_id, ConfigIssue, Error, ManagerConfig, Result};

/// Identity and ordering metadata of one catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonDescriptor {
    /// Canonical kebab-case id, also the addon's namespace
    pub id: String,
    /// Whether the addon takes part in the run
    pub enabled: bool,
    /// Ids that must be installed before this addon
    pub depends_on: Vec<String>,
}

impl AddonDescriptor {
    /// An enabled addon with no dependencies
    pub fn new(id: impl AsRef<str>) -> Self {
        Self {
            id: normalize_addon_id(id.as_ref()),
            enabled: true,
            depends_on: Vec::new(),
        }
    }

    /// Add dependencies (normalized, duplicates dropped)
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for dep in deps {
            let dep = normalize_addon_id(dep.as_ref());
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    /// Set the enabled flag
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Namespace the addon's resources live in
    pub fn namespace(&self) -> &str {
        &self.id
    }
}

/// Ordered catalog of addon descriptors
#[derive(Debug, Clone, Default)]
pub struct AddonRegistry {
    entries: Vec<AddonDescriptor>,
    index: HashMap<String, usize>,
}

impl AddonRegistry {
    /// Build a registry from descriptors, rejecting duplicate ids
    pub fn new(entries: impl IntoIterator<Item = AddonDescriptor>) -> Result<Self> {
        let mut registry = Self::default();
        for entry in entries {
            if registry.index.contains_key(&entry.id) {
                return Err(Error::config(
                    ConfigIssue::DuplicateAddon,
                    format!("addon '{}' is registered more than once", entry.id),
                    [entry.id],
                ));
            }
            registry
                .index
                .insert(entry.id.clone(), registry.entries.len());
            registry.entries.push(entry);
        }
        Ok(registry)
    }

    /// Build a registry from the static catalog ids and the config document.
    ///
    /// Addons absent from the config default to enabled with no dependencies.
    /// Config entries for ids outside the catalog are rejected so typos do
    /// not silently disappear.
    pub fn from_config<S: AsRef<str>>(catalog: &[S], config: &ManagerConfig) -> Result<Self> {
        let registry = Self::new(catalog.iter().map(|id| {
            let addon = config.addon(id.as_ref());
            AddonDescriptor::new(id)
                .enabled(addon.enabled)
                .depends_on(&addon.depends_on)
        }))?;

        let unknown: Vec<&String> = config
            .addons
            .keys()
            .filter(|id| !registry.contains(id))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::config(
                ConfigIssue::UnknownAddon,
                format!(
                    "config references addons outside the catalog: {}",
                    unknown
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                unknown.into_iter().cloned(),
            ));
        }

        Ok(registry)
    }

    /// Look up a descriptor by id (normalized)
    pub fn get(&self, id: &str) -> Option<&AddonDescriptor> {
        self.index
            .get(&normalize_addon_id(id))
            .map(|&i| &self.entries[i])
    }

    /// Whether an id is in the catalog
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Descriptors in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &AddonDescriptor> {
        self.entries.iter()
    }

    /// Number of catalog entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
