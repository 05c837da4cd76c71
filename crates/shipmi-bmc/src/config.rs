//! Runtime settings
//!
//! Settings come from the environment and can be overridden with the
//! builder methods. They control where providers are discovered and how
//! provider commands are executed.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BmcError, Result};

/// Environment variable naming the provider override directory
pub const PROVIDERS_DIR_ENV: &str = "SHIPMI_PROVIDERS";

/// Environment variable with the command timeout in seconds (0 disables)
pub const COMMAND_TIMEOUT_ENV: &str = "SHIPMI_COMMAND_TIMEOUT";

/// Environment variable with the per-stream output cap in bytes
pub const MAX_OUTPUT_ENV: &str = "SHIPMI_MAX_OUTPUT";

/// System-wide provider directory
pub const SYSTEM_PROVIDERS_DIR: &str = "/etc/shipmi/providers";

/// Extension of provider configuration files
pub const PROVIDER_FILE_EXTENSION: &str = ".conf";

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory searched before the user and system directories
    pub providers_dir: Option<PathBuf>,

    /// Upper bound on a single provider command
    /// None waits forever
    pub command_timeout: Option<Duration>,

    /// Bytes kept from each of stdout and stderr; the rest is discarded
    pub max_output_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            providers_dir: None,
            command_timeout: Some(Duration::from_secs(30)),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl Settings {
    /// Build settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        settings.providers_dir = Self::providers_dir_from_lookup(&lookup);

        if let Some(raw) = lookup(COMMAND_TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                BmcError::InvalidConfig(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    COMMAND_TIMEOUT_ENV, raw
                ))
            })?;
            settings.command_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(raw) = lookup(MAX_OUTPUT_ENV) {
            settings.max_output_bytes = raw.trim().parse().map_err(|_| {
                BmcError::InvalidConfig(format!(
                    "{} must be a byte count, got '{}'",
                    MAX_OUTPUT_ENV, raw
                ))
            })?;
        }

        Ok(settings)
    }

    /// Provider override directory from a variable source; empty means unset
    pub fn providers_dir_from_lookup<F>(lookup: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(PROVIDERS_DIR_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Set the provider override directory
    pub fn with_providers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.providers_dir = Some(dir.into());
        self
    }

    /// Set or clear the command timeout
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the output cap
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Per-user provider directory (`~/.shipmi/providers`)
    pub fn user_providers_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".shipmi").join("providers"))
    }

    /// Provider directories in priority order
    pub fn provider_dirs(&self) -> Vec<PathBuf> {
        Self::dirs_with_override(self.providers_dir.clone())
    }

    /// Override, user and system directories, in that order
    pub fn dirs_with_override(providers_dir: Option<PathBuf>) -> Vec<PathBuf> {
        providers_dir
            .into_iter()
            .chain(Self::user_providers_dir())
            .chain(std::iter::once(PathBuf::from(SYSTEM_PROVIDERS_DIR)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();

        assert_eq!(settings.providers_dir, None);
        assert_eq!(settings.command_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.max_output_bytes, 65536);
    }

    #[test]
    fn test_settings_from_lookup() {
        let settings = Settings::from_lookup(lookup_from(&[
            (PROVIDERS_DIR_ENV, "/srv/providers"),
            (COMMAND_TIMEOUT_ENV, "5"),
            (MAX_OUTPUT_ENV, "1024"),
        ]))
        .unwrap();

        assert_eq!(settings.providers_dir, Some(PathBuf::from("/srv/providers")));
        assert_eq!(settings.command_timeout, Some(Duration::from_secs(5)));
        assert_eq!(settings.max_output_bytes, 1024);
    }

    #[test]
    fn test_settings_empty_override_is_unset() {
        let settings = Settings::from_lookup(lookup_from(&[(PROVIDERS_DIR_ENV, "")])).unwrap();
        assert_eq!(settings.providers_dir, None);
    }

    #[test]
    fn test_override_dir_survives_bad_timeout() {
        let lookup = lookup_from(&[
            (PROVIDERS_DIR_ENV, "/srv/override"),
            (COMMAND_TIMEOUT_ENV, "soon"),
        ]);

        assert!(Settings::from_lookup(&lookup).is_err());
        assert_eq!(
            Settings::providers_dir_from_lookup(&lookup),
            Some(PathBuf::from("/srv/override"))
        );
    }

    #[test]
    fn test_settings_zero_timeout_disables() {
        let settings = Settings::from_lookup(lookup_from(&[(COMMAND_TIMEOUT_ENV, "0")])).unwrap();
        assert_eq!(settings.command_timeout, None);
    }

    #[test]
    fn test_settings_invalid_values() {
        let err = Settings::from_lookup(lookup_from(&[(COMMAND_TIMEOUT_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, BmcError::InvalidConfig(_)));

        let err = Settings::from_lookup(lookup_from(&[(MAX_OUTPUT_ENV, "-1")])).unwrap_err();
        assert!(matches!(err, BmcError::InvalidConfig(_)));
    }

    #[test]
    fn test_provider_dirs_order() {
        let settings = Settings::default().with_providers_dir("/tmp/override");
        let dirs = settings.provider_dirs();

        assert_eq!(dirs.first(), Some(&PathBuf::from("/tmp/override")));
        assert_eq!(dirs.last(), Some(&PathBuf::from(SYSTEM_PROVIDERS_DIR)));

        let without_override = Settings::default().provider_dirs();
        assert_eq!(without_override.len(), dirs.len() - 1);
    }
}
