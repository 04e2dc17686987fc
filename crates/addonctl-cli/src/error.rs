//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Addon(#[from] addonctl_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("missing required binaries: {}", binaries.join(", "))]
    MissingBinaries { binaries: Vec<String> },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addonctl_common::LifecycleAction;

    #[test]
    fn addon_errors_keep_their_message() {
        let err: Error =
            addonctl_common::Error::operation("redis", LifecycleAction::Install, "boom").into();
        assert_eq!(err.to_string(), "install of addon redis failed: boom");
    }

    #[test]
    fn missing_binaries_are_listed() {
        let err = Error::MissingBinaries {
            binaries: vec!["helm".to_string(), "aws".to_string()],
        };
        assert_eq!(err.to_string(), "missing required binaries: helm, aws");
    }
}
