//! Build configuration model.
//!
//! A configuration document declares layers, token sources, transform and
//! formatter selections, audit policies and dependency-tracking options.
//! Documents are UTF-8 JSON; `from_value` accepts any already-parsed
//! `serde_json::Value` so other front-ends can hand over configuration they
//! produced themselves.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{DtifxError, Result},
    pointer::TokenPointer,
};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub layers: Vec<LayerConfig>,
    pub sources: Vec<SourceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<TransformsConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formatters: Vec<FormatterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependenciesConfig>,
}

/// A named ordering bucket; index is declaration order in `layers`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

/// A declaration of where tokens come from.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceConfig {
    /// Glob-expanded files under a root directory.
    #[serde(rename_all = "camelCase")]
    File {
        id: String,
        layer: String,
        root_dir: PathBuf,
        patterns: Vec<String>,
        #[serde(default)]
        ignore: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pointer_prefix: Option<TokenPointer>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        context: BTreeMap<String, serde_json::Value>,
    },
    /// An inline document; programmatic producers wrap richer generators.
    #[serde(rename_all = "camelCase")]
    Virtual {
        id: String,
        layer: String,
        document: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pointer_prefix: Option<TokenPointer>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        context: BTreeMap<String, serde_json::Value>,
    },
}

impl SourceConfig {
    pub fn id(&self) -> &str {
        match self {
            SourceConfig::File { id, .. } | SourceConfig::Virtual { id, .. } => id,
        }
    }

    pub fn layer(&self) -> &str {
        match self {
            SourceConfig::File { layer, .. } | SourceConfig::Virtual { layer, .. } => layer,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransformsConfig {
    #[serde(default)]
    pub entries: Vec<NamedEntryConfig>,
}

/// A `{name, options?}` selection entry shared by transforms and policies.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NamedEntryConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FormatterConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<FormatterOutputConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FormatterOutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    #[serde(default)]
    pub policies: Vec<NamedEntryConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginConfig>,
}

/// A plugin entry: a bare module specifier, or a specifier with a register
/// function name and options.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum PluginConfig {
    Specifier(String),
    #[serde(rename_all = "camelCase")]
    Detailed {
        module: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        register: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<serde_json::Value>,
    },
}

impl PluginConfig {
    pub fn module(&self) -> &str {
        match self {
            PluginConfig::Specifier(module) => module,
            PluginConfig::Detailed { module, .. } => module,
        }
    }

    pub fn register(&self) -> Option<&str> {
        match self {
            PluginConfig::Specifier(_) => None,
            PluginConfig::Detailed { register, .. } => register.as_deref(),
        }
    }

    pub fn options(&self) -> Option<&serde_json::Value> {
        match self {
            PluginConfig::Specifier(_) => None,
            PluginConfig::Detailed { options, .. } => options.as_ref(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DependenciesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

/// A configuration plus the directory it was loaded from.
///
/// The directory anchors relative source roots, plugin specifiers and
/// pointer-typed policy options, and decides where `.dtifx-cache/` lives.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BuildConfig,
    pub directory: PathBuf,
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Wrap an already-parsed configuration value.
    pub fn from_value(value: serde_json::Value, directory: impl Into<PathBuf>) -> Result<Self> {
        let config: BuildConfig = serde_json::from_value(value)?;
        Ok(Self {
            config,
            directory: directory.into(),
            path: None,
        })
    }

    /// Read and parse a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let config: BuildConfig = serde_json::from_str(&text)?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                DtifxError::CustomError(format!(
                    "Configuration path `{}` has no parent directory",
                    path.display()
                ))
            })?;
        Ok(Self {
            config,
            directory,
            path: Some(path.to_path_buf()),
        })
    }

    /// Root of the persisted cache tree for this configuration.
    pub fn cache_dir(&self) -> PathBuf {
        self.directory.join(".dtifx-cache")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LoadedConfig, PluginConfig, SourceConfig};

    fn sample_config() -> serde_json::Value {
        json!({
            "layers": [
                {"name": "base"},
                {"name": "theme", "context": {"theme": "dark"}}
            ],
            "sources": [
                {
                    "kind": "file",
                    "id": "core",
                    "layer": "base",
                    "rootDir": "tokens",
                    "patterns": ["**/*.json"],
                    "ignore": ["**/draft-*.json"]
                },
                {
                    "kind": "virtual",
                    "id": "inline",
                    "layer": "theme",
                    "document": {"$version": "1.0.0", "color": {}},
                    "pointerPrefix": "#/inline"
                }
            ],
            "transforms": {"entries": [{"name": "css.color"}]},
            "formatters": [
                {"name": "css.variables", "output": {"outDir": "dist", "path": "tokens.css"}}
            ],
            "audit": {
                "policies": [{"name": "governance.requireOwner"}],
                "plugins": ["./policies/extra.js", {"module": "company-rules", "register": "registerPolicies"}]
            }
        })
    }

    /// The sample configuration parses with camelCase keys.
    #[test]
    fn parses_sample_config() {
        let loaded = LoadedConfig::from_value(sample_config(), "/tmp/project").unwrap();
        assert_eq!(loaded.config.layers.len(), 2);
        assert_eq!(loaded.config.sources.len(), 2);
        match &loaded.config.sources[0] {
            SourceConfig::File { patterns, ignore, .. } => {
                assert_eq!(patterns, &["**/*.json"]);
                assert_eq!(ignore, &["**/draft-*.json"]);
            }
            other => panic!("expected file source, got {other:?}"),
        }
        assert_eq!(loaded.cache_dir(), std::path::Path::new("/tmp/project/.dtifx-cache"));
    }

    /// Plugin entries accept both the bare and the detailed form.
    #[test]
    fn plugin_entry_forms() {
        let loaded = LoadedConfig::from_value(sample_config(), ".").unwrap();
        let audit = loaded.config.audit.unwrap();
        assert_eq!(audit.plugins.len(), 2);
        assert_eq!(audit.plugins[0].module(), "./policies/extra.js");
        match &audit.plugins[1] {
            PluginConfig::Detailed { register, .. } => {
                assert_eq!(register.as_deref(), Some("registerPolicies"));
            }
            other => panic!("expected detailed plugin, got {other:?}"),
        }
    }

    /// Virtual sources carry their inline document.
    #[test]
    fn virtual_source_document() {
        let loaded = LoadedConfig::from_value(sample_config(), ".").unwrap();
        match &loaded.config.sources[1] {
            SourceConfig::Virtual { document, pointer_prefix, .. } => {
                assert_eq!(document["$version"], "1.0.0");
                assert_eq!(pointer_prefix.as_ref().unwrap().as_str(), "#/inline");
            }
            other => panic!("expected virtual source, got {other:?}"),
        }
    }
}
