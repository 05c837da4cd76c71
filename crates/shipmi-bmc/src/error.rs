//! Error types for virtual BMC operations
//!
//! Configuration errors surface when a provider is resolved. Execution
//! errors surface per operation and are handed to the protocol layer,
//! which translates them with [`BmcError::completion_code`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::CompletionCode;

/// Error type for provider resolution and command execution
#[derive(Debug, Error)]
pub enum BmcError {
    /// A required section is absent from the merged provider files
    #[error("provider {name}: missing section [{section}]")]
    ProviderMissingSection { name: String, section: String },

    /// A required action is absent from a section
    #[error("provider {name}: missing option '{option}' in section [{section}]")]
    ProviderMissingOption {
        name: String,
        section: String,
        option: String,
    },

    /// None of the given provider files could be read
    #[error("no readable provider files among {paths:?}")]
    ProviderNoReadableFiles { paths: Vec<PathBuf> },

    /// No provider with this name was discovered
    #[error("provider not found: {name}")]
    ProviderNotFound { name: String },

    /// Provider file is not valid INI
    #[error("{}:{line}: {message}", .path.display())]
    ProviderParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A provider directory could not be scanned, or a provider file decoded
    #[error("cannot read {}: {source}", .path.display())]
    ProviderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The command exited with a nonzero status
    #[error("command '{command}' failed with exit code {exitcode}")]
    CommandFailed {
        command: String,
        exitcode: i32,
        stderr: String,
    },

    /// The command did not finish in time and was killed
    #[error("command '{command}' timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The shell could not be started
    #[error("cannot spawn command '{command}': {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A template references a placeholder the operation does not supply
    #[error("template '{template}' references unknown placeholder '{key}'")]
    UnknownPlaceholder { template: String, key: String },

    /// A template contains a '%' sequence that is not a placeholder
    #[error("malformed template '{template}': {message}")]
    MalformedTemplate { template: String, message: String },

    /// A thread panicked while holding the provider registry lock
    #[error("provider registry lock poisoned: {0}")]
    RegistryPoisoned(String),

    /// Invalid settings value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BmcError {
    /// Completion code the protocol layer should answer with
    pub fn completion_code(&self) -> CompletionCode {
        match self {
            BmcError::CommandTimeout { .. } => CompletionCode::NodeBusy,
            _ => CompletionCode::Unspecified,
        }
    }

    /// True for errors raised while loading or resolving a provider
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BmcError::ProviderMissingSection { .. }
                | BmcError::ProviderMissingOption { .. }
                | BmcError::ProviderNoReadableFiles { .. }
                | BmcError::ProviderNotFound { .. }
                | BmcError::ProviderParse { .. }
                | BmcError::ProviderIo { .. }
                | BmcError::InvalidConfig(_)
        )
    }
}

/// Result type for BMC operations
pub type Result<T> = std::result::Result<T, BmcError>;
