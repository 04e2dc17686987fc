//! Error types for addon management
//!
//! Errors carry the addon they concern wherever one is known, so that a
//! failure deep inside a helm invocation still reports which catalog entry
//! was being processed when it surfaced at the top of a run.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Kind of configuration problem detected while building the addon catalog
/// or resolving its dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssue {
    /// The dependency graph among enabled addons contains a cycle
    Cycle,
    /// An addon depends on an id that is not in the catalog
    UnknownDependency,
    /// An enabled addon depends on a disabled addon
    DisabledDependency,
    /// The configuration or forced-enable set names an addon outside the catalog
    UnknownAddon,
    /// The same addon id was registered twice
    DuplicateAddon,
    /// The configuration document could not be read or parsed
    Invalid,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::Cycle => write!(f, "dependency cycle"),
            ConfigIssue::UnknownDependency => write!(f, "unknown dependency"),
            ConfigIssue::DisabledDependency => write!(f, "disabled dependency"),
            ConfigIssue::UnknownAddon => write!(f, "unknown addon"),
            ConfigIssue::DuplicateAddon => write!(f, "duplicate addon"),
            ConfigIssue::Invalid => write!(f, "invalid configuration"),
        }
    }
}

/// Lifecycle operation performed on an addon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    /// Create (or re-apply) the addon
    Install,
    /// Re-apply the addon on top of an existing installation
    Upgrade,
    /// Remove the addon
    Delete,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::Install => write!(f, "install"),
            LifecycleAction::Upgrade => write!(f, "upgrade"),
            LifecycleAction::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for LifecycleAction {
    type Err = String;

    /// Accepts `create` as an alias of `install`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "install" | "create" => Ok(LifecycleAction::Install),
            "upgrade" => Ok(LifecycleAction::Upgrade),
            "delete" => Ok(LifecycleAction::Delete),
            other => Err(format!(
                "invalid action '{}', must be one of create, upgrade, delete",
                other
            )),
        }
    }
}

/// Main error type for addon operations
#[derive(Debug, Error)]
pub enum Error {
    /// The addon catalog or its dependency graph cannot be resolved
    #[error("configuration error ({issue}): {message}")]
    Config {
        /// Category of the problem
        issue: ConfigIssue,
        /// Human readable description
        message: String,
        /// Addon ids implicated in the problem
        addons: Vec<String>,
    },

    /// A handle could not be built for a resolved addon
    #[error("failed to construct addon {addon}: {message}")]
    Construction {
        /// Addon whose handle failed to build
        addon: String,
        /// Description of what failed
        message: String,
    },

    /// A targeted operation named an addon outside the resolved set
    #[error("addon not found: {addon}")]
    NotFound {
        /// The requested addon id
        addon: String,
    },

    /// An addon lifecycle operation failed
    #[error("{action} of addon {addon} failed: {message}")]
    Operation {
        /// Addon that failed
        addon: String,
        /// Operation that was running
        action: LifecycleAction,
        /// Reason reported by the addon
        message: String,
    },

    /// Namespace provisioning around an addon operation failed
    #[error("namespace {namespace} for addon {addon}: {message}")]
    Namespace {
        /// Addon whose namespace was being managed
        addon: String,
        /// The namespace name
        namespace: String,
        /// Description of what failed
        message: String,
    },

    /// An external command exited unsuccessfully or could not be spawned
    #[error("command failed: {command}: {message}")]
    Command {
        /// The command line that was run
        command: String,
        /// stderr or spawn error
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Addon settings are missing or malformed
    #[error("validation error for {addon}: {message}")]
    Validation {
        /// Addon whose settings are invalid
        addon: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// A bounded wait gave up
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: String,
        /// How long the wait ran
        elapsed: Duration,
    },
}

impl Error {
    /// Create a configuration error implicating the given addons
    pub fn config<I, S>(issue: ConfigIssue, msg: impl Into<String>, addons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Config {
            issue,
            message: msg.into(),
            addons: addons.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a configuration error for an unreadable or malformed document
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::Config {
            issue: ConfigIssue::Invalid,
            message: msg.into(),
            addons: Vec::new(),
        }
    }

    /// Create a construction error for an addon
    pub fn construction(addon: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Construction {
            addon: addon.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for an addon id
    pub fn not_found(addon: impl Into<String>) -> Self {
        Self::NotFound {
            addon: addon.into(),
        }
    }

    /// Create an operation error for an addon
    pub fn operation(
        addon: impl Into<String>,
        action: LifecycleAction,
        msg: impl Into<String>,
    ) -> Self {
        Self::Operation {
            addon: addon.into(),
            action,
            message: msg.into(),
        }
    }

    /// Create a namespace provisioning error
    pub fn namespace(
        addon: impl Into<String>,
        namespace: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Namespace {
            addon: addon.into(),
            namespace: namespace.into(),
            message: msg.into(),
        }
    }

    /// Create a command error
    pub fn command(command: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for an addon's settings
    pub fn validation(addon: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            addon: addon.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    /// Whether this error was raised while building the orchestrator
    ///
    /// Configuration and construction errors are fatal before any addon
    /// has been touched; everything else happens mid-run.
    pub fn is_fatal_at_construction(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::Construction { .. })
    }

    /// Get the primary addon this error is associated with
    pub fn addon(&self) -> Option<&str> {
        match self {
            Error::Config { addons, .. } => addons.first().map(String::as_str),
            Error::Construction { addon, .. }
            | Error::NotFound { addon }
            | Error::Operation { addon, .. }
            | Error::Namespace { addon, .. }
            | Error::Validation { addon, .. } => Some(addon),
            Error::Command { .. }
            | Error::Kube { .. }
            | Error::Serialization { .. }
            | Error::Timeout { .. } => None,
        }
    }

    /// Get the configuration issue if this is a configuration error
    pub fn config_issue(&self) -> Option<ConfigIssue> {
        match self {
            Error::Config { issue, .. } => Some(*issue),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
