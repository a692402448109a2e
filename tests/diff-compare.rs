//! Integration tests for the diff engine: rename detection across strategy
//! configurations, bump recommendations, and report payload shape.

use serde_json::{Value, json};
use std::sync::Arc;

use dtifx::{
    config::LoadedConfig,
    diff::{
        DiffOptions, StructuralRenameStrategy, VersionBump, diff_token_sets,
        report::{ReportOptions, build_report},
        token_set_from,
    },
    environment::BuildEnvironment,
    errors::DtifxError,
    model::TokenSnapshot,
    pipeline::{
        CancellationToken,
        orchestrator::{BuildOptions, PipelineOrchestrator},
    },
};

/// Resolve a virtual document through the real pipeline and key the
/// snapshots by pointer.
async fn resolve_tokens(document: Value) -> Result<Vec<TokenSnapshot>, DtifxError> {
    let dir = tempfile::tempdir().unwrap();
    let config = LoadedConfig::from_value(
        json!({
            "layers": [{"name": "base"}],
            "sources": [{
                "kind": "virtual",
                "id": "compare",
                "layer": "base",
                "document": document
            }]
        }),
        dir.path(),
    )?;
    let env = Arc::new(BuildEnvironment::ephemeral(config, dir.path()));
    let result = PipelineOrchestrator::new(env)
        .run(
            BuildOptions {
                include_transforms: false,
                include_formatters: false,
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await?;
    Ok(result.snapshots)
}

/// With the default structural strategy, two tokens sharing a value but
/// differing in `$extensions` stay added/removed; relaxing
/// `includeExtensions` pairs them as a rename.
#[tokio::test]
async fn rename_detection_respects_extensions() -> Result<(), DtifxError> {
    let previous = token_set_from(
        resolve_tokens(json!({
            "color": {
                "$type": "color",
                "primary": {
                    "$value": "#336699",
                    "$extensions": {"com.example.figma": {"styleId": "S:1"}}
                }
            }
        }))
        .await?,
    );
    let next = token_set_from(
        resolve_tokens(json!({
            "color": {
                "$type": "color",
                "flagship": {
                    "$value": "#336699",
                    "$extensions": {"com.example.figma": {"styleId": "S:2"}}
                }
            }
        }))
        .await?,
    );

    // Default strategy keys extensions into the equivalence check.
    let strict = diff_token_sets(&previous, &next, &DiffOptions::default());
    assert!(strict.renamed.is_empty());
    assert_eq!(strict.added.len(), 1);
    assert_eq!(strict.removed.len(), 1);

    // includeExtensions: false pairs the two entries.
    let relaxed_options = DiffOptions {
        rename_strategies: vec![Arc::new(StructuralRenameStrategy {
            include_extensions: false,
            ..Default::default()
        })],
        ..Default::default()
    };
    let relaxed = diff_token_sets(&previous, &next, &relaxed_options);
    assert_eq!(relaxed.renamed.len(), 1);
    assert!(relaxed.added.is_empty());
    assert!(relaxed.removed.is_empty());
    assert_eq!(relaxed.renamed[0].previous_pointer.as_str(), "#/color/primary");
    assert_eq!(relaxed.renamed[0].next_pointer.as_str(), "#/color/flagship");

    // The payload carries previousId/nextId for renames.
    let payload = build_report(&relaxed, previous.len(), next.len(), &ReportOptions::default());
    let change = &payload["changes"].as_array().unwrap()[0];
    assert_eq!(change["kind"], "renamed");
    assert_eq!(change["previousId"], "#/color/primary");
    assert_eq!(change["nextId"], "#/color/flagship");
    Ok(())
}

/// The four bump scenarios: value change ⇒ major, pure addition ⇒ minor,
/// description-only ⇒ patch, no change ⇒ none.
#[tokio::test]
async fn bump_recommendations() -> Result<(), DtifxError> {
    let options = DiffOptions::default();

    let black = token_set_from(
        resolve_tokens(json!({
            "color": {"primary": {"$type": "color", "$value": "#000000"}}
        }))
        .await?,
    );
    let grey = token_set_from(
        resolve_tokens(json!({
            "color": {"primary": {"$type": "color", "$value": "#111111"}}
        }))
        .await?,
    );
    assert_eq!(
        diff_token_sets(&black, &grey, &options).recommended_bump,
        VersionBump::Major
    );

    let empty = token_set_from([]);
    let sized = token_set_from(
        resolve_tokens(json!({
            "size": {"medium": {"$type": "dimension", "$value": "16px"}}
        }))
        .await?,
    );
    assert_eq!(
        diff_token_sets(&empty, &sized, &options).recommended_bump,
        VersionBump::Minor
    );

    let described = token_set_from(
        resolve_tokens(json!({
            "color": {"primary": {
                "$type": "color",
                "$value": "#000000",
                "$description": "Primary surface"
            }}
        }))
        .await?,
    );
    assert_eq!(
        diff_token_sets(&black, &described, &options).recommended_bump,
        VersionBump::Patch
    );

    assert_eq!(
        diff_token_sets(&black, &black.clone(), &options).recommended_bump,
        VersionBump::None
    );
    Ok(())
}

/// Alias rewiring shows up as a resolutionPath change and is breaking even
/// when the resolved value is unchanged.
#[tokio::test]
async fn alias_rewire_is_breaking() -> Result<(), DtifxError> {
    let previous = token_set_from(
        resolve_tokens(json!({
            "color": {
                "$type": "color",
                "base": {"$value": "#123456"},
                "mirror": {"$value": "#123456"},
                "brand": {"$ref": "#/color/base"}
            }
        }))
        .await?,
    );
    let next = token_set_from(
        resolve_tokens(json!({
            "color": {
                "$type": "color",
                "base": {"$value": "#123456"},
                "mirror": {"$value": "#123456"},
                "brand": {"$ref": "#/color/mirror"}
            }
        }))
        .await?,
    );
    let diff = diff_token_sets(&previous, &next, &DiffOptions::default());
    assert_eq!(diff.changed.len(), 1);
    assert_eq!(diff.changed[0].pointer.as_str(), "#/color/brand");
    assert_eq!(diff.recommended_bump, VersionBump::Major);
    Ok(())
}
