//! Built-in governance policies.

use std::{path::Path, sync::Arc};

use serde_json::{Value, json};
use url::Url;

use crate::{
    color::{contrast_ratio, parse_color},
    config::{LoadedConfig, NamedEntryConfig},
    diagnostics::Severity,
    errors::{DtifxError, Result},
    model::TokenSnapshot,
    pointer::TokenPointer,
    policy::{PolicyRule, PolicyViolation, RuleContext, registry::PolicyRegistry},
    transforms::validate_option_keys,
};

/// Register the five built-in governance policies.
pub fn register(registry: &mut PolicyRegistry) {
    let entries: [(&str, super::registry::PolicyFactory); 5] = [
        ("governance.requireOwner", Arc::new(require_owner_factory)),
        (
            "governance.deprecationHasReplacement",
            Arc::new(deprecation_factory),
        ),
        ("governance.requireTag", Arc::new(require_tag_factory)),
        (
            "governance.requireOverrideApproval",
            Arc::new(override_approval_factory),
        ),
        ("governance.wcagContrast", Arc::new(wcag_contrast_factory)),
    ];
    for (name, factory) in entries {
        registry
            .register(name, factory)
            .expect("builtin registration cannot collide");
    }
}

fn severity_option(owner: &str, options: Option<&Value>, default: Severity) -> Result<Severity> {
    let Some(raw) = options.and_then(|o| o.get("severity")) else {
        return Ok(default);
    };
    match raw.as_str() {
        Some("error") => Ok(Severity::Error),
        Some("warning") => Ok(Severity::Warning),
        Some("info") => Ok(Severity::Info),
        _ => Err(DtifxError::InvalidOption {
            owner: owner.to_string(),
            message: format!("invalid severity `{raw}`"),
        }),
    }
}

// governance.requireOwner

fn require_owner_factory(
    entry: &NamedEntryConfig,
    _config: &LoadedConfig,
) -> Result<Vec<Arc<dyn PolicyRule>>> {
    validate_option_keys("governance.requireOwner", entry.options.as_ref(), &["severity"])?;
    let severity = severity_option(
        "governance.requireOwner",
        entry.options.as_ref(),
        Severity::Error,
    )?;
    Ok(vec![Arc::new(RequireOwner { severity })])
}

struct RequireOwner {
    severity: Severity,
}

impl PolicyRule for RequireOwner {
    fn id(&self) -> &str {
        "governance.requireOwner"
    }

    fn run(&self, ctx: &RuleContext) -> Result<Vec<PolicyViolation>> {
        Ok(ctx
            .snapshots
            .iter()
            .filter(|snapshot| {
                snapshot
                    .metadata
                    .as_ref()
                    .and_then(|m| m.author.as_ref())
                    .is_none()
            })
            .map(|snapshot| {
                PolicyViolation::new(
                    snapshot.pointer.clone(),
                    self.severity,
                    "Token has no owner ($author)",
                )
                .with_snapshot(snapshot.clone())
            })
            .collect())
    }
}

// governance.deprecationHasReplacement

fn deprecation_factory(
    entry: &NamedEntryConfig,
    _config: &LoadedConfig,
) -> Result<Vec<Arc<dyn PolicyRule>>> {
    validate_option_keys(
        "governance.deprecationHasReplacement",
        entry.options.as_ref(),
        &["severity"],
    )?;
    let severity = severity_option(
        "governance.deprecationHasReplacement",
        entry.options.as_ref(),
        Severity::Warning,
    )?;
    Ok(vec![Arc::new(DeprecationHasReplacement { severity })])
}

struct DeprecationHasReplacement {
    severity: Severity,
}

impl PolicyRule for DeprecationHasReplacement {
    fn id(&self) -> &str {
        "governance.deprecationHasReplacement"
    }

    fn run(&self, ctx: &RuleContext) -> Result<Vec<PolicyViolation>> {
        let mut violations = Vec::new();
        for snapshot in ctx.snapshots {
            let Some(deprecated) = snapshot.metadata.as_ref().and_then(|m| m.deprecated.as_ref())
            else {
                continue;
            };
            match &deprecated.superseded_by {
                None => violations.push(
                    PolicyViolation::new(
                        snapshot.pointer.clone(),
                        self.severity,
                        "Deprecated token names no replacement (supersededBy)",
                    )
                    .with_snapshot(snapshot.clone()),
                ),
                Some(target) => {
                    if !ctx.snapshots.iter().any(|other| &other.pointer == target) {
                        violations.push(
                            PolicyViolation::new(
                                snapshot.pointer.clone(),
                                self.severity,
                                format!("supersededBy target `{target}` does not exist"),
                            )
                            .with_snapshot(snapshot.clone()),
                        );
                    }
                }
            }
        }
        Ok(violations)
    }
}

// governance.requireTag

fn require_tag_factory(
    entry: &NamedEntryConfig,
    _config: &LoadedConfig,
) -> Result<Vec<Arc<dyn PolicyRule>>> {
    validate_option_keys(
        "governance.requireTag",
        entry.options.as_ref(),
        &["tag", "types", "severity"],
    )?;
    let tag = entry
        .options
        .as_ref()
        .and_then(|o| o.get("tag"))
        .and_then(Value::as_str)
        .ok_or_else(|| DtifxError::InvalidOption {
            owner: "governance.requireTag".into(),
            message: "`tag` is required".into(),
        })?
        .to_string();
    let types: Vec<String> = entry
        .options
        .as_ref()
        .and_then(|o| o.get("types"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let severity = severity_option(
        "governance.requireTag",
        entry.options.as_ref(),
        Severity::Warning,
    )?;
    Ok(vec![Arc::new(RequireTag {
        tag,
        types,
        severity,
    })])
}

struct RequireTag {
    tag: String,
    types: Vec<String>,
    severity: Severity,
}

impl PolicyRule for RequireTag {
    fn id(&self) -> &str {
        "governance.requireTag"
    }

    fn run(&self, ctx: &RuleContext) -> Result<Vec<PolicyViolation>> {
        Ok(ctx
            .snapshots
            .iter()
            .filter(|snapshot| {
                self.types.is_empty()
                    || self
                        .types
                        .iter()
                        .any(|t| snapshot.token.token_type.matches_ignore_case(t))
            })
            .filter(|snapshot| !snapshot.tags().contains(&self.tag))
            .map(|snapshot| {
                PolicyViolation::new(
                    snapshot.pointer.clone(),
                    self.severity,
                    format!("Token is missing required tag `{}`", self.tag),
                )
                .with_snapshot(snapshot.clone())
            })
            .collect())
    }
}

// governance.requireOverrideApproval

fn override_approval_factory(
    entry: &NamedEntryConfig,
    _config: &LoadedConfig,
) -> Result<Vec<Arc<dyn PolicyRule>>> {
    validate_option_keys(
        "governance.requireOverrideApproval",
        entry.options.as_ref(),
        &["extension", "severity"],
    )?;
    let extension = entry
        .options
        .as_ref()
        .and_then(|o| o.get("extension"))
        .and_then(Value::as_str)
        .unwrap_or("dtifx.approval")
        .to_string();
    let severity = severity_option(
        "governance.requireOverrideApproval",
        entry.options.as_ref(),
        Severity::Error,
    )?;
    Ok(vec![Arc::new(RequireOverrideApproval {
        extension,
        severity,
    })])
}

struct RequireOverrideApproval {
    extension: String,
    severity: Severity,
}

impl PolicyRule for RequireOverrideApproval {
    fn id(&self) -> &str {
        "governance.requireOverrideApproval"
    }

    /// Tokens contributed by non-base layers override lower layers by
    /// pointer; they must carry the approval extension namespace.
    fn run(&self, ctx: &RuleContext) -> Result<Vec<PolicyViolation>> {
        Ok(ctx
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.provenance.layer_index > 0)
            .filter(|snapshot| {
                !snapshot
                    .metadata
                    .as_ref()
                    .is_some_and(|m| m.extensions.contains_key(&self.extension))
            })
            .map(|snapshot| {
                PolicyViolation::new(
                    snapshot.pointer.clone(),
                    self.severity,
                    format!(
                        "Override from layer `{}` lacks approval extension `{}`",
                        snapshot.provenance.layer, self.extension
                    ),
                )
                .with_snapshot(snapshot.clone())
            })
            .collect())
    }
}

// governance.wcagContrast

/// A resolved pointer-typed option: either a pointer into the token set or
/// an external document location plus optional pointer fragment.
#[derive(Debug, Clone, PartialEq)]
enum PointerOption {
    Local(TokenPointer),
    External {
        url: Url,
        pointer: Option<TokenPointer>,
    },
}

/// Resolve a pointer option: absolute pointers pass through; paths combine
/// with the configuration directory into `file://` URLs with an optional
/// `#pointer` fragment.
fn resolve_pointer_option(owner: &str, raw: &str, config_dir: &Path) -> Result<PointerOption> {
    if raw.starts_with("#/") {
        return Ok(PointerOption::Local(TokenPointer::new(raw)));
    }
    let (path_part, fragment) = match raw.split_once('#') {
        Some((path, fragment)) => (path, Some(TokenPointer::new(fragment))),
        None => (raw, None),
    };
    let absolute = if Path::new(path_part).is_absolute() {
        Path::new(path_part).to_path_buf()
    } else {
        config_dir.join(path_part)
    };
    let url = Url::from_file_path(&absolute).map_err(|_| DtifxError::InvalidOption {
        owner: owner.to_string(),
        message: format!("cannot resolve pointer option `{raw}`"),
    })?;
    Ok(PointerOption::External {
        url,
        pointer: fragment,
    })
}

fn wcag_contrast_factory(
    entry: &NamedEntryConfig,
    config: &LoadedConfig,
) -> Result<Vec<Arc<dyn PolicyRule>>> {
    validate_option_keys(
        "governance.wcagContrast",
        entry.options.as_ref(),
        &["foreground", "background", "minimumRatio", "severity"],
    )?;
    let options = entry.options.as_ref();
    let pointer_of = |key: &str| -> Result<PointerOption> {
        let raw = options
            .and_then(|o| o.get(key))
            .and_then(Value::as_str)
            .ok_or_else(|| DtifxError::InvalidOption {
                owner: "governance.wcagContrast".into(),
                message: format!("`{key}` is required"),
            })?;
        resolve_pointer_option("governance.wcagContrast", raw, &config.directory)
    };
    let minimum_ratio = options
        .and_then(|o| o.get("minimumRatio"))
        .and_then(Value::as_f64)
        .unwrap_or(4.5);
    let severity = severity_option("governance.wcagContrast", options, Severity::Error)?;
    Ok(vec![Arc::new(WcagContrast {
        foreground: pointer_of("foreground")?,
        background: pointer_of("background")?,
        minimum_ratio,
        severity,
    })])
}

struct WcagContrast {
    foreground: PointerOption,
    background: PointerOption,
    minimum_ratio: f64,
    severity: Severity,
}

impl WcagContrast {
    fn lookup<'a>(&self, option: &PointerOption, snapshots: &'a [TokenSnapshot]) -> Option<&'a TokenSnapshot> {
        match option {
            PointerOption::Local(pointer) => {
                snapshots.iter().find(|s| &s.pointer == pointer)
            }
            PointerOption::External { url, pointer } => snapshots.iter().find(|s| {
                s.provenance.uri == url.as_str()
                    && pointer
                        .as_ref()
                        .is_none_or(|fragment| &s.source_pointer == fragment)
            }),
        }
    }
}

impl PolicyRule for WcagContrast {
    fn id(&self) -> &str {
        "governance.wcagContrast"
    }

    fn run(&self, ctx: &RuleContext) -> Result<Vec<PolicyViolation>> {
        let Some(foreground) = self.lookup(&self.foreground, ctx.snapshots) else {
            return Err(DtifxError::CustomError(format!(
                "foreground token not found: {:?}",
                self.foreground
            )));
        };
        let Some(background) = self.lookup(&self.background, ctx.snapshots) else {
            return Err(DtifxError::CustomError(format!(
                "background token not found: {:?}",
                self.background
            )));
        };

        let fg = parse_color(foreground.resolved_value());
        let bg = parse_color(background.resolved_value());
        let (Some(fg), Some(bg)) = (fg, bg) else {
            // Unparsable colours are a finding, not a rule crash.
            return Ok(vec![
                PolicyViolation::new(
                    foreground.pointer.clone(),
                    Severity::Warning,
                    "Contrast check skipped: value is not a parsable colour",
                )
                .with_snapshot(foreground.clone()),
            ]);
        };

        let ratio = contrast_ratio(&fg, &bg);
        if ratio + f64::EPSILON >= self.minimum_ratio {
            return Ok(Vec::new());
        }
        Ok(vec![
            PolicyViolation::new(
                foreground.pointer.clone(),
                self.severity,
                format!(
                    "Contrast ratio {ratio:.2} against `{}` is below the required {:.2}",
                    background.pointer, self.minimum_ratio
                ),
            )
            .with_details(json!({
                "ratio": (ratio * 100.0).round() / 100.0,
                "minimumRatio": self.minimum_ratio,
                "background": background.pointer,
            }))
            .with_snapshot(foreground.clone()),
        ])
    }
}
