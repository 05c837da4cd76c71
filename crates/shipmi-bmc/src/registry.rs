//! Provider discovery and lookup
//!
//! The registry scans a fixed, ordered list of directories for `.conf`
//! files. Every directory that contains at least one such file becomes one
//! provider, merged from all of its files and named after the first of
//! them. Discovery runs lazily on the first lookup and again only while the
//! cache is still empty.
//!
//! [`ProviderRegistry::global`] is process-wide mutable state. Prefer
//! constructing a registry and passing it to the endpoints that need it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::config::{Settings, PROVIDER_FILE_EXTENSION};
use crate::error::{BmcError, Result};
use crate::provider::ProviderConfig;

static GLOBAL_REGISTRY: Lazy<ProviderRegistry> =
    Lazy::new(|| ProviderRegistry::from_lookup(|key| std::env::var(key).ok()));

fn poisoned<T>(e: PoisonError<T>) -> BmcError {
    BmcError::RegistryPoisoned(e.to_string())
}

/// True if the identifier names a provider file rather than a provider
pub fn is_provider_file(identifier: &str) -> bool {
    identifier.ends_with(PROVIDER_FILE_EXTENSION)
}

/// Cache of discovered providers, keyed by name
#[derive(Debug)]
pub struct ProviderRegistry {
    /// Directories scanned in priority order
    dirs: Vec<PathBuf>,
    providers: RwLock<HashMap<String, Arc<ProviderConfig>>>,
}

impl ProviderRegistry {
    /// Create a registry that scans the given directories
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry over the override, user and system directories
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.provider_dirs())
    }

    /// Create a registry from `SHIPMI_PROVIDERS` in an arbitrary variable source
    ///
    /// Only the override directory is read, so a bad value in an unrelated
    /// setting never changes where providers are discovered.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(Settings::dirs_with_override(
            Settings::providers_dir_from_lookup(lookup),
        ))
    }

    /// Process-wide registry configured from the environment
    ///
    /// Created on first use; its cache lives for the rest of the process.
    pub fn global() -> &'static ProviderRegistry {
        &GLOBAL_REGISTRY
    }

    /// Directories scanned, in priority order
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Populate the cache if it is empty
    ///
    /// Concurrent first-time callers serialize on the write lock; whoever
    /// comes second finds the cache filled and returns. The cache is only
    /// replaced once every directory has loaded, so a failure leaves it
    /// empty and the next call retries and reports the same error.
    pub fn discover(&self) -> Result<()> {
        if !self.providers.read().map_err(poisoned)?.is_empty() {
            return Ok(());
        }

        let mut providers = self.providers.write().map_err(poisoned)?;
        if !providers.is_empty() {
            return Ok(());
        }

        let mut discovered: HashMap<String, Arc<ProviderConfig>> = HashMap::new();
        for dir in &self.dirs {
            let files = provider_files(dir)?;
            if files.is_empty() {
                continue;
            }

            let provider = ProviderConfig::load(&files)?;
            info!(
                "Discovered provider {} in {} ({} file(s))",
                provider.name(),
                dir.display(),
                files.len()
            );

            if let Some(previous) =
                discovered.insert(provider.name().to_string(), Arc::new(provider))
            {
                warn!(
                    "Provider {} from {} replaced by the one in {}",
                    previous.name(),
                    previous
                        .sources()
                        .first()
                        .and_then(|p| p.parent())
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    dir.display()
                );
            }
        }

        *providers = discovered;
        Ok(())
    }

    /// Resolve a provider name or provider file
    ///
    /// An identifier ending in `.conf` is loaded as a file relative to the
    /// working directory, bypassing and not touching the cache. Anything
    /// else is looked up after discovery.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<ProviderConfig>> {
        if is_provider_file(identifier) {
            let path = Path::new(".").join(identifier);
            debug!("Loading provider file {}", path.display());
            return ProviderConfig::load(&[path]).map(Arc::new);
        }

        self.discover()?;

        let providers = self.providers.read().map_err(poisoned)?;
        providers
            .get(identifier)
            .cloned()
            .ok_or_else(|| BmcError::ProviderNotFound {
                name: identifier.to_string(),
            })
    }

    /// Names of all discovered providers, sorted
    pub fn names(&self) -> Result<Vec<String>> {
        self.discover()?;

        let providers = self.providers.read().map_err(poisoned)?;
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Register a provider directly, replacing one with the same name
    pub fn insert(&self, provider: ProviderConfig) -> Result<()> {
        let mut providers = self.providers.write().map_err(poisoned)?;
        providers.insert(provider.name().to_string(), Arc::new(provider));
        Ok(())
    }
}

/// Provider files directly inside `dir`, sorted by name
///
/// A directory that does not exist has no files.
fn provider_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!("Provider directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|source| BmcError::ProviderIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BmcError::ProviderIo {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_conf = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(PROVIDER_FILE_EXTENSION))
            .unwrap_or(false);
        if is_conf {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TEST_PROVIDER;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_is_provider_file() {
        assert!(is_provider_file("libvirt.conf"));
        assert!(is_provider_file("./providers/libvirt.conf"));
        assert!(!is_provider_file("libvirt"));
        assert!(!is_provider_file("libvirt.conf.bak"));
    }

    #[test]
    fn test_resolve_discovered_provider() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();
        fs::write(dir.path().join("README"), "not a provider").unwrap();

        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);
        let provider = registry.resolve("libvirt").unwrap();

        assert_eq!(provider.name(), "libvirt");
        assert_eq!(registry.names().unwrap(), vec!["libvirt".to_string()]);
    }

    #[test]
    fn test_resolve_returns_shared_instance() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();

        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);
        let first = registry.resolve("libvirt").unwrap();
        let second = registry.resolve("libvirt").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_resolve_not_found() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();

        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);
        let err = registry.resolve("vbox").unwrap_err();

        assert!(matches!(err, BmcError::ProviderNotFound { ref name } if name == "vbox"));
    }

    #[test]
    fn test_not_found_when_no_directories_exist() {
        let dir = tempdir().unwrap();
        let registry = ProviderRegistry::new(vec![dir.path().join("nope")]);

        assert!(registry.names().unwrap().is_empty());
        assert!(matches!(
            registry.resolve("libvirt").unwrap_err(),
            BmcError::ProviderNotFound { .. }
        ));
    }

    #[test]
    fn test_directory_files_merge_into_one_provider() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a-base.conf"), TEST_PROVIDER).unwrap();
        fs::write(dir.path().join("b-site.conf"), "[POWER]\non = echo site\n").unwrap();

        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);

        assert_eq!(registry.names().unwrap(), vec!["a-base".to_string()]);
        let provider = registry.resolve("a-base").unwrap();
        assert_eq!(provider.get("POWER", "on"), Some("echo site"));
    }

    #[test]
    fn test_every_directory_contributes() {
        let override_dir = tempdir().unwrap();
        let system_dir = tempdir().unwrap();
        fs::write(override_dir.path().join("kvm.conf"), TEST_PROVIDER).unwrap();
        fs::write(system_dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();

        let registry = ProviderRegistry::new(vec![
            override_dir.path().to_path_buf(),
            system_dir.path().to_path_buf(),
        ]);

        assert_eq!(
            registry.names().unwrap(),
            vec!["kvm".to_string(), "libvirt".to_string()]
        );
    }

    #[test]
    fn test_name_collision_later_directory_overwrites() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(first.path().join("kvm.conf"), TEST_PROVIDER).unwrap();
        fs::write(
            second.path().join("kvm.conf"),
            TEST_PROVIDER.replace("status = echo 1", "status = echo 0"),
        )
        .unwrap();

        let registry = ProviderRegistry::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);

        let provider = registry.resolve("kvm").unwrap();
        assert_eq!(provider.get("POWER", "status"), Some("echo 0"));
    }

    #[test]
    fn test_discovery_runs_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();

        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);
        registry.discover().unwrap();

        // files added after population are not picked up
        fs::write(dir.path().join("kvm.conf"), TEST_PROVIDER).unwrap();
        fs::remove_file(dir.path().join("libvirt.conf")).unwrap();

        assert_eq!(registry.names().unwrap(), vec!["libvirt".to_string()]);
    }

    #[test]
    fn test_empty_cache_retries_discovery() {
        let dir = tempdir().unwrap();
        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);

        assert!(registry.names().unwrap().is_empty());

        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();
        assert_eq!(registry.names().unwrap(), vec!["libvirt".to_string()]);
    }

    #[test]
    fn test_invalid_provider_fails_discovery() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.conf"), "[BOOT]\nget = true\n").unwrap();

        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);
        let err = registry.resolve("broken").unwrap_err();

        assert!(matches!(err, BmcError::ProviderMissingOption { .. }));
    }

    #[test]
    fn test_failed_discovery_is_not_cached() {
        let good = tempdir().unwrap();
        let bad = tempdir().unwrap();
        fs::write(good.path().join("kvm.conf"), TEST_PROVIDER).unwrap();
        fs::write(bad.path().join("broken.conf"), "[BOOT]\nget = true\n").unwrap();

        let registry = ProviderRegistry::new(vec![
            good.path().to_path_buf(),
            bad.path().to_path_buf(),
        ]);

        for _ in 0..2 {
            assert!(matches!(
                registry.resolve("kvm").unwrap_err(),
                BmcError::ProviderMissingOption { .. }
            ));
            assert!(registry.names().is_err());
        }

        fs::remove_file(bad.path().join("broken.conf")).unwrap();
        assert_eq!(registry.resolve("kvm").unwrap().name(), "kvm");
    }

    #[test]
    fn test_concurrent_first_resolve_shares_instance() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();
        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);

        let resolved: Vec<Arc<ProviderConfig>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.resolve("libvirt").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for provider in &resolved[1..] {
            assert!(Arc::ptr_eq(&resolved[0], provider));
        }
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("libvirt.conf"), TEST_PROVIDER).unwrap();
        let registry = ProviderRegistry::new(vec![dir.path().to_path_buf()]);

        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = registry.providers.write().unwrap();
                    panic!("writer died");
                })
                .join()
        });

        let err = registry.resolve("libvirt").unwrap_err();
        assert!(matches!(err, BmcError::RegistryPoisoned(_)));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_from_lookup_keeps_override_with_bad_settings() {
        let registry = ProviderRegistry::from_lookup(|key| match key {
            "SHIPMI_PROVIDERS" => Some("/srv/override".to_string()),
            "SHIPMI_COMMAND_TIMEOUT" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(registry.dirs().first(), Some(&PathBuf::from("/srv/override")));
        assert_eq!(
            registry.dirs().last(),
            Some(&PathBuf::from(crate::config::SYSTEM_PROVIDERS_DIR))
        );
    }

    #[test]
    fn test_resolve_direct_file_bypasses_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("standalone.conf");
        fs::write(&path, TEST_PROVIDER).unwrap();

        let registry = ProviderRegistry::new(Vec::new());
        // absolute paths stay absolute when joined onto "."
        let provider = registry.resolve(path.to_str().unwrap()).unwrap();

        assert_eq!(provider.name(), "standalone");
        assert!(registry.names().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_missing_direct_file() {
        let registry = ProviderRegistry::new(Vec::new());
        let err = registry
            .resolve("/nonexistent/shipmi/missing.conf")
            .unwrap_err();

        assert!(matches!(err, BmcError::ProviderNoReadableFiles { .. }));
    }

    #[test]
    fn test_global_is_shared() {
        let first = ProviderRegistry::global();
        let second = ProviderRegistry::global();

        assert!(std::ptr::eq(first, second));
        assert_eq!(
            first.dirs().last(),
            Some(&PathBuf::from(crate::config::SYSTEM_PROVIDERS_DIR))
        );
    }

    #[test]
    fn test_insert() {
        let registry = ProviderRegistry::new(Vec::new());
        registry
            .insert(ProviderConfig::from_ini_str("inline", TEST_PROVIDER).unwrap())
            .unwrap();

        assert!(registry.resolve("inline").is_ok());
    }
}
