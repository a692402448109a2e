//! Policy registry and plugin specifier handling.
//!
//! Factories are registered under policy names; audit configuration builds
//! rules through them. Plugins register additional factories: specifiers
//! are resolved to `file://` URLs (or kept as bare package names) with a
//! closed scheme set, and the actual code loading is delegated to a host
//! port since plugins are trusted local code.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use url::Url;

use crate::{
    config::{LoadedConfig, NamedEntryConfig, PluginConfig},
    errors::{DtifxError, Result},
    policy::{PolicyRule, builtin},
};

/// Factory: one audit config entry to a set of constructed rules.
pub type PolicyFactory = Arc<
    dyn Fn(&NamedEntryConfig, &LoadedConfig) -> Result<Vec<Arc<dyn PolicyRule>>> + Send + Sync,
>;

/// Where a plugin specifier points after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginLocation {
    /// A `file://` URL to local module code.
    File(Url),
    /// A bare package name, resolved by the host's module system.
    Bare(String),
}

/// Host port that maps a resolved plugin location to registration calls.
#[async_trait]
pub trait PolicyPluginLoader: Send + Sync {
    /// Load the module at `location` and let it register factories. The
    /// entry carries the optional register-function name and options.
    async fn register(
        &self,
        location: &PluginLocation,
        entry: &PluginConfig,
        config: &LoadedConfig,
        registry: &mut PolicyRegistry,
    ) -> Result<()>;
}

/// Name → factory map. Read-only during a run.
pub struct PolicyRegistry {
    factories: std::collections::BTreeMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: std::collections::BTreeMap::new(),
        }
    }

    /// Registry with the built-in governance policies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtin::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PolicyFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(DtifxError::Duplicate {
                kind: "policy",
                name,
            });
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the rules for one audit config entry.
    pub fn build(
        &self,
        entry: &NamedEntryConfig,
        config: &LoadedConfig,
    ) -> Result<Vec<Arc<dyn PolicyRule>>> {
        let factory = self
            .factories
            .get(&entry.name)
            .ok_or_else(|| DtifxError::UnknownName {
                kind: "policy",
                name: entry.name.clone(),
            })?;
        factory(entry, config)
    }

    /// Resolve and load every configured plugin.
    ///
    /// All specifiers are validated before any plugin loads, so a rejected
    /// specifier leaves the registry untouched.
    pub async fn load_plugins(
        &mut self,
        config: &LoadedConfig,
        loader: &dyn PolicyPluginLoader,
    ) -> Result<()> {
        let plugins = config
            .config
            .audit
            .as_ref()
            .map(|audit| audit.plugins.clone())
            .unwrap_or_default();

        let mut resolved = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            resolved.push(resolve_plugin_specifier(plugin.module(), &config.directory)?);
        }

        for (plugin, location) in plugins.iter().zip(resolved.iter()) {
            loader
                .register(location, plugin, config, self)
                .await
                .map_err(|err| DtifxError::PluginLoad {
                    specifier: plugin.module().to_string(),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Resolve a plugin module specifier.
///
/// - `file://` URLs pass through.
/// - Relative paths (`./x`, `../x`) resolve against the configuration
///   directory into `file://` URLs.
/// - Absolute filesystem paths convert to `file://` URLs.
/// - Bare names pass through for the host module system.
/// - Any other URL scheme is rejected.
pub fn resolve_plugin_specifier(specifier: &str, config_directory: &Path) -> Result<PluginLocation> {
    if let Ok(url) = Url::parse(specifier) {
        return if url.scheme() == "file" {
            Ok(PluginLocation::File(url))
        } else {
            Err(DtifxError::UnsupportedSpecifierScheme {
                specifier: specifier.to_string(),
                scheme: url.scheme().to_string(),
            })
        };
    }

    if specifier.starts_with("./") || specifier.starts_with("../") {
        let joined = config_directory.join(specifier);
        return Url::from_file_path(&joined)
            .map(PluginLocation::File)
            .map_err(|_| DtifxError::InvalidSpecifier(specifier.to_string()));
    }

    if specifier.starts_with('/') {
        return Url::from_file_path(specifier)
            .map(PluginLocation::File)
            .map_err(|_| DtifxError::InvalidSpecifier(specifier.to_string()));
    }

    if specifier.is_empty() {
        return Err(DtifxError::InvalidSpecifier(specifier.to_string()));
    }

    Ok(PluginLocation::Bare(specifier.to_string()))
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use async_trait::async_trait;
    use serde_json::json;

    use super::{PluginLocation, PolicyPluginLoader, PolicyRegistry, resolve_plugin_specifier};
    use crate::{
        config::{LoadedConfig, PluginConfig},
        errors::DtifxError,
    };

    /// file URLs pass through; relative and absolute paths become file
    /// URLs; bare names stay bare.
    #[test]
    fn specifier_resolution_forms() {
        let dir = Path::new("/etc/dtifx");

        let file = resolve_plugin_specifier("file:///opt/rules.js", dir).unwrap();
        assert_eq!(
            file,
            PluginLocation::File(url::Url::parse("file:///opt/rules.js").unwrap())
        );

        let relative = resolve_plugin_specifier("./policies/extra.js", dir).unwrap();
        match relative {
            PluginLocation::File(url) => {
                assert_eq!(url.path(), "/etc/dtifx/policies/extra.js");
            }
            other => panic!("expected file URL, got {other:?}"),
        }

        let absolute = resolve_plugin_specifier("/opt/shared/rules.js", dir).unwrap();
        assert!(matches!(absolute, PluginLocation::File(_)));

        let bare = resolve_plugin_specifier("company-rules", dir).unwrap();
        assert_eq!(bare, PluginLocation::Bare("company-rules".into()));
    }

    /// Every non-file scheme is rejected.
    #[test]
    fn foreign_schemes_rejected() {
        let dir = Path::new("/etc/dtifx");
        for specifier in ["node:fs", "data:text/plain,hi", "http://evil.example/x.js"] {
            let err = resolve_plugin_specifier(specifier, dir).unwrap_err();
            assert!(
                matches!(err, DtifxError::UnsupportedSpecifierScheme { .. }),
                "{specifier} should be rejected"
            );
        }
    }

    struct RecordingLoader;

    #[async_trait]
    impl PolicyPluginLoader for RecordingLoader {
        async fn register(
            &self,
            _location: &PluginLocation,
            _entry: &PluginConfig,
            _config: &LoadedConfig,
            registry: &mut PolicyRegistry,
        ) -> crate::errors::Result<()> {
            registry.register(
                "plugin.example",
                Arc::new(|_, _| Ok(Vec::new())),
            )
        }
    }

    fn config_with_plugins(plugins: serde_json::Value) -> LoadedConfig {
        LoadedConfig::from_value(
            json!({
                "layers": [],
                "sources": [],
                "audit": {"policies": [], "plugins": plugins}
            }),
            "/etc/dtifx",
        )
        .unwrap()
    }

    /// A rejected specifier leaves the registry untouched, even when other
    /// valid plugins precede it.
    #[tokio::test]
    async fn rejected_specifier_keeps_registry_unchanged() {
        let mut registry = PolicyRegistry::empty();
        let config = config_with_plugins(json!(["./fine.js", "node:fs"]));
        let err = registry
            .load_plugins(&config, &RecordingLoader)
            .await
            .unwrap_err();
        assert!(matches!(err, DtifxError::UnsupportedSpecifierScheme { .. }));
        assert!(registry.is_empty());
    }

    /// Valid plugins register through the loader port.
    #[tokio::test]
    async fn valid_plugins_register() {
        let mut registry = PolicyRegistry::empty();
        let config = config_with_plugins(json!(["./fine.js"]));
        registry
            .load_plugins(&config, &RecordingLoader)
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.names().any(|name| name == "plugin.example"));
    }
}
