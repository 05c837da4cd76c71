//! Provider configuration
//!
//! A provider is a named set of shell command templates, one per
//! management operation, loaded from one or more INI files. Construction
//! validates that every required section and action is present, so a
//! [`ProviderConfig`] that exists can serve every [`Operation`].

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{BmcError, Result};
use crate::ini::Ini;

/// Section holding boot device commands
pub const BOOT_SECTION: &str = "BOOT";

/// Section holding power commands
pub const POWER_SECTION: &str = "POWER";

/// Substitution key for the virtual machine name
pub const NAME_KEY: &str = "name";

/// Substitution key for the requested boot device
pub const BOOT_DEVICE_KEY: &str = "boot_device";

/// A management operation and the provider command that implements it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `BOOT.get`
    BootGet,
    /// `BOOT.set`
    BootSet,
    /// `POWER.status`
    PowerStatus,
    /// `POWER.on`
    PowerOn,
    /// `POWER.off`
    PowerOff,
    /// `POWER.diag`
    PowerDiag,
    /// `POWER.reset`
    PowerReset,
    /// `POWER.shutdown`
    PowerShutdown,
}

impl Operation {
    /// Every operation, in validation order
    pub const ALL: [Operation; 8] = [
        Operation::BootGet,
        Operation::BootSet,
        Operation::PowerStatus,
        Operation::PowerOn,
        Operation::PowerOff,
        Operation::PowerDiag,
        Operation::PowerReset,
        Operation::PowerShutdown,
    ];

    /// Provider section holding the command
    pub fn section(self) -> &'static str {
        match self {
            Operation::BootGet | Operation::BootSet => BOOT_SECTION,
            _ => POWER_SECTION,
        }
    }

    /// Option name of the command within its section
    pub fn action(self) -> &'static str {
        match self {
            Operation::BootGet => "get",
            Operation::BootSet => "set",
            Operation::PowerStatus => "status",
            Operation::PowerOn => "on",
            Operation::PowerOff => "off",
            Operation::PowerDiag => "diag",
            Operation::PowerReset => "reset",
            Operation::PowerShutdown => "shutdown",
        }
    }

    /// Placeholders a template for this operation may reference
    pub fn allowed_placeholders(self) -> &'static [&'static str] {
        match self {
            Operation::BootSet => &[NAME_KEY, BOOT_DEVICE_KEY],
            _ => &[NAME_KEY],
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section(), self.action())
    }
}

/// One provider's validated command templates
///
/// Immutable once built. The registry hands out shared references.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    name: String,
    sources: Vec<PathBuf>,
    ini: Ini,
}

impl ProviderConfig {
    /// Load and merge provider files in order, later files overriding
    ///
    /// Files that cannot be opened are skipped; a file that opens but is not
    /// valid UTF-8 is an error. The provider is named after
    /// the first file that was read, with its extension stripped. That name
    /// depends on which files happen to be readable, so it is a convention
    /// rather than a stable identifier when several files are merged.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut ini = Ini::new();
        let mut sources = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Provider file {} does not exist, skipping", path.display());
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(BmcError::ProviderIo {
                        path: path.to_path_buf(),
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Cannot read provider file {}: {}", path.display(), e);
                    continue;
                }
            };
            ini.merge_str(path, &text)?;
            sources.push(path.to_path_buf());
        }

        let Some(first) = sources.first() else {
            return Err(BmcError::ProviderNoReadableFiles {
                paths: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            });
        };

        let name = first
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let provider = Self { name, sources, ini };
        provider.validate()?;

        debug!(
            "Loaded provider {} from {} file(s)",
            provider.name,
            provider.sources.len()
        );
        Ok(provider)
    }

    /// Build a provider from in-memory INI text
    pub fn from_ini_str(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let mut ini = Ini::new();
        ini.merge_str(Path::new(&name), text)?;

        let provider = Self {
            name,
            sources: Vec::new(),
            ini,
        };
        provider.validate()?;
        Ok(provider)
    }

    fn validate(&self) -> Result<()> {
        for op in Operation::ALL {
            if !self.ini.has_section(op.section()) {
                return Err(BmcError::ProviderMissingSection {
                    name: self.name.clone(),
                    section: op.section().to_string(),
                });
            }
            if self.ini.get(op.section(), op.action()).is_none() {
                return Err(BmcError::ProviderMissingOption {
                    name: self.name.clone(),
                    section: op.section().to_string(),
                    option: op.action().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Files merged into this provider, in merge order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Command template for a section and action, if defined
    pub fn get(&self, section: &str, action: &str) -> Option<&str> {
        self.ini.get(section, action)
    }

    /// Command template by dotted key, e.g. `POWER.on`
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let (section, action) = key.split_once('.')?;
        self.get(section, action)
    }

    /// Command template for an operation
    ///
    /// Always present after validation.
    pub fn template(&self, op: Operation) -> Option<&str> {
        self.get(op.section(), op.action())
    }

    /// Section names, sorted
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.ini.sections()
    }

    /// Actions and templates of a section, sorted by action
    pub fn actions(&self, section: &str) -> Vec<(&str, &str)> {
        self.ini.options(section)
    }
}

/// Sample provider used across the crate's tests
#[cfg(test)]
pub(crate) const TEST_PROVIDER: &str = "\
[BOOT]
get = echo optical
set = echo %(boot_device)s > /dev/null

[POWER]
status = echo 1
on = true
off = true
diag = true
reset = true
shutdown = true
";
