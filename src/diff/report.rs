//! Structured diff report payloads.
//!
//! The JSON payload is schema version 3: summary, insights and a change
//! list with kind-specific fields. Human-oriented renderers consume this
//! payload; they are not part of the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use similar::{Algorithm, ChangeTag, TextDiff};

use crate::diff::{ChangeKind, Impact, TokenDiff};

/// Current JSON report schema version.
pub const REPORT_SCHEMA_VERSION: u32 = 3;

/// How much of the change list the payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Summary and insights only.
    Summary,
    /// Change list without token payloads.
    Condensed,
    /// Change list with token snapshots.
    Full,
    /// Full, plus per-field value hunks for modifications.
    Detailed,
}

/// Optional run metadata echoed into the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Report construction options.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub mode: ReportMode,
    /// How many top risks the insights carry.
    pub top_risks: usize,
    /// Context lines around detailed value hunks.
    pub diff_context: usize,
    pub run: Option<RunInfo>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            mode: ReportMode::Full,
            top_risks: 5,
            diff_context: 2,
            run: None,
        }
    }
}

/// Build the versioned JSON payload for a diff.
pub fn build_report(
    diff: &TokenDiff,
    previous_count: usize,
    next_count: usize,
    options: &ReportOptions,
) -> Value {
    let mut payload = json!({
        "reportSchemaVersion": REPORT_SCHEMA_VERSION,
        "generatedAt": Utc::now(),
        "summary": diff.summary,
        "recommendedBump": diff.recommended_bump,
        "insights": build_insights(diff, previous_count, next_count, options.top_risks),
    });
    if let Some(run) = &options.run {
        payload["run"] = serde_json::to_value(run).unwrap_or(Value::Null);
    }
    if options.mode != ReportMode::Summary {
        payload["changes"] = Value::Array(build_changes(diff, options));
    }
    payload
}

fn build_insights(
    diff: &TokenDiff,
    previous_count: usize,
    next_count: usize,
    top_risks: usize,
) -> Value {
    let summary = &diff.summary;
    let common = next_count.saturating_sub(summary.added + summary.renamed);

    let mut type_hotspots: Vec<(&String, usize)> = summary
        .by_type
        .iter()
        .map(|(name, counts)| (name, counts.total()))
        .collect();
    type_hotspots.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let mut group_hotspots: Vec<(&String, usize)> = summary
        .by_group
        .iter()
        .map(|(name, counts)| (name, counts.total()))
        .collect();
    group_hotspots.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let mut risks: Vec<Value> = Vec::new();
    for entry in &diff.removed {
        if entry.impact == Impact::Breaking {
            risks.push(json!({
                "pointer": entry.pointer,
                "kind": ChangeKind::Removed,
                "reason": "token removed",
            }));
        }
    }
    for entry in &diff.renamed {
        if entry.impact == Impact::Breaking {
            risks.push(json!({
                "pointer": entry.previous_pointer,
                "kind": ChangeKind::Renamed,
                "reason": format!("renamed to {}", entry.next_pointer),
            }));
        }
    }
    for entry in &diff.changed {
        if entry.impact == Impact::Breaking {
            risks.push(json!({
                "pointer": entry.pointer,
                "kind": ChangeKind::Changed,
                "reason": format!(
                    "breaking fields: {}",
                    entry
                        .changes
                        .iter()
                        .filter(|f| f.is_breaking())
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }));
        }
    }
    risks.truncate(top_risks);

    json!({
        "impact": {
            "breaking": summary.breaking,
            "nonBreaking": summary.non_breaking,
        },
        "operations": {
            "added": summary.added,
            "removed": summary.removed,
            "changed": summary.changed,
            "renamed": summary.renamed,
        },
        "totals": {
            "previous": previous_count,
            "next": next_count,
            "common": common,
        },
        "changeMix": {
            "valueChanged": summary.value_changed,
            "metadataChanged": summary.metadata_changed,
            "unchanged": summary.unchanged,
        },
        "typeHotspots": type_hotspots
            .iter()
            .map(|(name, count)| json!({"type": name, "count": count}))
            .collect::<Vec<_>>(),
        "groupHotspots": group_hotspots
            .iter()
            .map(|(name, count)| json!({"group": name, "count": count}))
            .collect::<Vec<_>>(),
        "topRisks": risks,
    })
}

fn build_changes(diff: &TokenDiff, options: &ReportOptions) -> Vec<Value> {
    let detailed = options.mode == ReportMode::Detailed;
    let with_tokens = matches!(options.mode, ReportMode::Full | ReportMode::Detailed);
    let mut changes = Vec::new();

    for entry in &diff.added {
        let mut change = json!({
            "kind": ChangeKind::Added,
            "pointer": entry.pointer,
            "impact": entry.impact,
        });
        if with_tokens {
            change["token"] = token_subset(&entry.token);
        }
        changes.push(change);
    }
    for entry in &diff.removed {
        let mut change = json!({
            "kind": ChangeKind::Removed,
            "pointer": entry.pointer,
            "impact": entry.impact,
        });
        if with_tokens {
            change["token"] = token_subset(&entry.token);
        }
        changes.push(change);
    }
    for entry in &diff.changed {
        let mut change = json!({
            "kind": ChangeKind::Changed,
            "pointer": entry.pointer,
            "impact": entry.impact,
            "changes": entry.changes,
        });
        if with_tokens {
            change["previous"] = token_subset(&entry.previous);
            change["next"] = token_subset(&entry.next);
        }
        if detailed {
            change["valueDiff"] = Value::String(value_hunks(
                &entry.previous.resolution.value,
                &entry.next.resolution.value,
                options.diff_context,
            ));
        }
        changes.push(change);
    }
    for entry in &diff.renamed {
        let mut change = json!({
            "kind": ChangeKind::Renamed,
            "previousId": entry.previous_pointer,
            "nextId": entry.next_pointer,
            "impact": entry.impact,
            "strategy": entry.strategy,
        });
        if with_tokens {
            change["previousToken"] = token_subset(&entry.previous_token);
            change["nextToken"] = token_subset(&entry.next_token);
        }
        changes.push(change);
    }
    changes
}

/// The snapshot subset reporters need: type, value, raw and metadata.
fn token_subset(snapshot: &crate::model::TokenSnapshot) -> Value {
    json!({
        "type": snapshot.token.token_type,
        "value": snapshot.resolution.value,
        "raw": snapshot.token.raw,
        "metadata": snapshot.metadata,
    })
}

/// Myers line hunks over pretty-printed values, for the detailed mode.
fn value_hunks(previous: &Value, next: &Value, context: usize) -> String {
    let previous_text = serde_json::to_string_pretty(previous).unwrap_or_default();
    let next_text = serde_json::to_string_pretty(next).unwrap_or_default();
    let text_diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(&previous_text, &next_text);

    let mut out = String::new();
    for group in text_diff.grouped_ops(context) {
        for op in group {
            for change in text_diff.iter_changes(&op) {
                let marker = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                out.push(marker);
                out.push_str(change.value().trim_end_matches('\n'));
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{REPORT_SCHEMA_VERSION, ReportMode, ReportOptions, build_report};
    use crate::{
        diff::{diff_token_sets, strategies::DiffOptions, token_set_from},
        testutil::sample_snapshot,
    };

    fn sample_payload(mode: ReportMode) -> serde_json::Value {
        let previous = token_set_from([
            sample_snapshot("#/color/primary", json!("#000000")),
            sample_snapshot("#/color/gone", json!("#999999")),
        ]);
        let next = token_set_from([
            sample_snapshot("#/color/primary", json!("#111111")),
            sample_snapshot("#/size/new", json!("4px")),
        ]);
        let diff = diff_token_sets(&previous, &next, &DiffOptions::default());
        build_report(
            &diff,
            previous.len(),
            next.len(),
            &ReportOptions {
                mode,
                ..Default::default()
            },
        )
    }

    /// The payload carries the schema version, summary and insights.
    #[test]
    fn payload_envelope() {
        let payload = sample_payload(ReportMode::Full);
        assert_eq!(payload["reportSchemaVersion"], REPORT_SCHEMA_VERSION);
        assert!(payload.get("generatedAt").is_some());
        assert_eq!(payload["insights"]["operations"]["added"], 1);
        assert_eq!(payload["insights"]["totals"]["previous"], 2);
        assert_eq!(payload["insights"]["changeMix"]["valueChanged"], 1);
        assert!(payload["insights"]["topRisks"].as_array().unwrap().len() >= 2);
    }

    /// Summary mode drops the change list; condensed drops token payloads.
    #[test]
    fn mode_shapes() {
        let summary = sample_payload(ReportMode::Summary);
        assert!(summary.get("changes").is_none());

        let condensed = sample_payload(ReportMode::Condensed);
        let changes = condensed["changes"].as_array().unwrap();
        assert!(!changes.is_empty());
        assert!(changes.iter().all(|c| c.get("token").is_none()));

        let full = sample_payload(ReportMode::Full);
        let changes = full["changes"].as_array().unwrap();
        assert!(
            changes
                .iter()
                .any(|c| c.get("token").is_some() || c.get("previous").is_some())
        );
    }

    /// Detailed mode renders value hunks with +/- markers.
    #[test]
    fn detailed_value_hunks() {
        let payload = sample_payload(ReportMode::Detailed);
        let changed = payload["changes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["kind"] == "changed")
            .unwrap()
            .clone();
        let hunks = changed["valueDiff"].as_str().unwrap();
        assert!(hunks.contains("-\"#000000\""));
        assert!(hunks.contains("+\"#111111\""));
    }

    /// Kind-specific fields: renamed entries carry previousId/nextId.
    #[test]
    fn renamed_fields() {
        let previous = token_set_from([sample_snapshot("#/color/a", json!("#123456"))]);
        let next = token_set_from([sample_snapshot("#/color/b", json!("#123456"))]);
        let diff = diff_token_sets(&previous, &next, &DiffOptions::default());
        let payload = build_report(&diff, 1, 1, &ReportOptions::default());
        let change = &payload["changes"].as_array().unwrap()[0];
        assert_eq!(change["kind"], "renamed");
        assert_eq!(change["previousId"], "#/color/a");
        assert_eq!(change["nextId"], "#/color/b");
        assert!(change.get("previousToken").is_some());
    }
}
