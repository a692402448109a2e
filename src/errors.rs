//! Error types for the DTIFX engine.
//!
//! This module defines a unified error enumeration used across source
//! planning, document resolution, dependency tracking, transform and
//! formatter execution, policy evaluation, and token diffing. It integrates
//! with `thiserror` to provide rich `Display` implementations and error
//! source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Configuration errors are fatal before the pipeline starts; stage errors
//!   are fatal mid-pipeline and end the current telemetry span with error
//!   status before propagating.

use thiserror::Error;

use crate::pipeline::planner::SourceFailure;

#[derive(Error, Debug)]
/// Unified error enumeration for the DTIFX engine.
///
/// - Used across planning, resolution, transformation, formatting, policy
///   evaluation and diffing.
/// - Implements `std::error::Error` via `thiserror`.
pub enum DtifxError {
    /// A source references a layer that was never declared.
    #[error("Source `{source_id}` references unknown layer `{layer}`.")]
    UnknownLayer { source_id: String, layer: String },

    /// Aggregated planner failures collected across all sources.
    #[error("Source planning failed for {} source(s).", failures.len())]
    SourcePlanner { failures: Vec<SourceFailure> },

    /// Duplicate identifier in a registry or configuration block.
    #[error("Duplicate {kind} `{name}`.")]
    Duplicate { kind: &'static str, name: String },

    /// Lookup of a named transform, formatter or policy failed.
    #[error("Unknown {kind} `{name}`.")]
    UnknownName { kind: &'static str, name: String },

    /// A configuration block carries option keys outside its declared schema.
    #[error("Invalid options for `{owner}`: unknown key `{key}`.")]
    UnknownOption { owner: String, key: String },

    /// An option value failed validation.
    #[error("Invalid options for `{owner}`: {message}")]
    InvalidOption { owner: String, message: String },

    /// Plugin specifier uses an unsupported URL scheme.
    #[error("Unsupported plugin specifier scheme `{scheme}` in `{specifier}`.")]
    UnsupportedSpecifierScheme { specifier: String, scheme: String },

    /// Plugin specifier could not be resolved to a loadable location.
    #[error("Cannot resolve plugin specifier `{0}`.")]
    InvalidSpecifier(String),

    /// Plugin module failed to load or register.
    #[error("Plugin `{specifier}` failed: {message}")]
    PluginLoad { specifier: String, message: String },

    /// A DTIF document failed structural validation.
    #[error("Document `{uri}` is not a valid DTIF document: {message}")]
    InvalidDocument { uri: String, message: String },

    /// An alias reference points at a pointer that does not exist.
    #[error("Alias target `{target}` referenced from `{pointer}` does not exist.")]
    MissingAliasTarget { pointer: String, target: String },

    /// The alias graph contains a reference cycle.
    #[error("Alias cycle detected: {}", path.join(" -> "))]
    AliasCycle { path: Vec<String> },

    /// Resolver aborted on an error-severity parser diagnostic.
    #[error("Resolution failed for `{uri}`: {message}")]
    Resolution { uri: String, message: String },

    /// Two sources produced the same global pointer.
    #[error("Duplicate pointer `{pointer}` produced by `{first}` and `{second}`.")]
    DuplicatePointer {
        pointer: String,
        first: String,
        second: String,
    },

    /// A transform failed while computing output for a pointer.
    #[error("Transform `{transform}` failed for `{pointer}`: {message}")]
    Transform {
        transform: String,
        pointer: String,
        message: String,
    },

    /// A formatter failed while producing artifacts.
    #[error("Formatter `{formatter}` failed: {message}")]
    Formatter { formatter: String, message: String },

    /// Writing an artifact to the output tree failed.
    #[error("Cannot write artifact `{path}`: {message}")]
    ArtifactWrite { path: String, message: String },

    /// Committing the dependency snapshot failed.
    #[error("Dependency snapshot commit failed: {0}")]
    DependencyCommit(String),

    /// A diff rename/impact/summary strategy module failed.
    #[error("Diff strategy `{strategy}` failed: {message}")]
    DiffStrategy { strategy: String, message: String },

    /// The run was cancelled via the orchestrator cancellation token.
    #[error("Build cancelled during stage `{0}`.")]
    Cancelled(String),

    /// The environment was disposed twice or used after disposal.
    #[error("Build environment already disposed.")]
    EnvironmentDisposed,

    /// I/O error from an underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    /// JSON serialisation or deserialisation error.
    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    CustomError(String),
}

/// Convenient result alias used across the engine.
pub type Result<T> = std::result::Result<T, DtifxError>;
