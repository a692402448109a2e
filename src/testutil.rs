//! Shared fixtures for unit tests.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    model::{Provenance, ResolutionInfo, Token, TokenMetadata, TokenSnapshot, TokenType},
    pointer::TokenPointer,
};

/// Surface engine `debug!`/`warn!` output (cache misses, layer overrides,
/// swallowed subscriber panics) while a test runs. The first caller
/// installs the subscriber; later calls are no-ops.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A resolved, non-alias snapshot of type `color` with the given value.
pub(crate) fn sample_snapshot(pointer: &str, value: Value) -> TokenSnapshot {
    snapshot_with_type(pointer, TokenType::color(), value)
}

/// A resolved, non-alias snapshot with an explicit type.
pub(crate) fn snapshot_with_type(pointer: &str, token_type: TokenType, value: Value) -> TokenSnapshot {
    TokenSnapshot {
        pointer: TokenPointer::new(pointer),
        source_pointer: TokenPointer::new(pointer),
        token: Token {
            token_type,
            value: value.clone(),
            raw: value.clone(),
        },
        resolution: ResolutionInfo {
            value,
            references: Vec::new(),
            resolution_path: vec![TokenPointer::new(pointer)],
            applied_aliases: vec![TokenPointer::new(pointer)],
        },
        provenance: Provenance {
            source_id: "core".into(),
            layer: "base".into(),
            layer_index: 0,
            uri: "file:///tokens/core.json".into(),
            pointer_prefix: TokenPointer::root(),
        },
        context: BTreeMap::new(),
        metadata: None,
    }
}

/// Attach metadata to a snapshot fixture.
pub(crate) fn with_metadata(mut snapshot: TokenSnapshot, metadata: TokenMetadata) -> TokenSnapshot {
    snapshot.metadata = Some(metadata);
    snapshot
}
