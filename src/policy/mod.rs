//! Policy engine: governance rules evaluated against the resolved token
//! set.
//!
//! Rules come from a name → factory registry (built-ins plus plugins);
//! audit configuration selects and parameterises them. A failing rule never
//! aborts the others; it surfaces as a synthetic error-severity violation
//! against a policy-scoped pointer.

pub mod builtin;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
    config::LoadedConfig,
    diagnostics::Severity,
    errors::Result,
    events::EventBus,
    model::TokenSnapshot,
    pointer::TokenPointer,
};

pub use registry::{PluginLocation, PolicyFactory, PolicyPluginLoader, PolicyRegistry};

/// A single governance finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    pub pointer: TokenPointer,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TokenSnapshot>,
}

impl PolicyViolation {
    pub fn new(
        pointer: TokenPointer,
        severity: Severity,
        message: impl Into<String>,
    ) -> PolicyViolation {
        PolicyViolation {
            pointer,
            severity,
            message: message.into(),
            details: None,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: TokenSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// What a rule sees when it runs.
pub struct RuleContext<'a> {
    pub snapshots: &'a [TokenSnapshot],
    pub config: &'a LoadedConfig,
    pub bus: &'a EventBus,
}

/// One governance rule.
pub trait PolicyRule: Send + Sync {
    fn id(&self) -> &str;

    fn run(&self, ctx: &RuleContext) -> Result<Vec<PolicyViolation>>;
}

/// Violations grouped under the policy that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOutcome {
    pub name: String,
    pub violations: Vec<PolicyViolation>,
}

/// Violation counts by severity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub policy_count: usize,
    pub violation_count: usize,
    pub severity: SeverityCounts,
}

/// The engine's aggregate output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub policies: Vec<PolicyOutcome>,
    pub summary: PolicySummary,
}

/// Overall audit verdict derived from the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Ok,
    Warn,
    Error,
}

impl AuditStatus {
    /// Process exit code the audit runtime maps this status to.
    pub fn exit_code(&self) -> i32 {
        match self {
            AuditStatus::Error => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuditStatus::Ok => "ok",
            AuditStatus::Warn => "warn",
            AuditStatus::Error => "error",
        };
        f.write_str(text)
    }
}

impl PolicyReport {
    pub fn status(&self) -> AuditStatus {
        if self.summary.severity.error > 0 {
            AuditStatus::Error
        } else if self.summary.violation_count > 0 {
            AuditStatus::Warn
        } else {
            AuditStatus::Ok
        }
    }

    /// The structured `audit.completed` payload handed to reporters.
    pub fn to_payload(&self) -> Value {
        json!({
            "event": "audit.completed",
            "status": self.status().to_string(),
            "summary": self.summary,
            "policies": self.policies,
        })
    }
}

/// The structured `audit.failed` payload for a run that could not produce
/// a report at all (configuration or pipeline failure).
pub fn audit_failed_payload(err: &crate::errors::DtifxError) -> Value {
    json!({
        "event": "audit.failed",
        "status": "error",
        "error": {"name": "DtifxError", "message": err.to_string()},
    })
}

/// Runs a fixed set of constructed rules.
pub struct PolicyEngine {
    rules: Vec<(String, std::sync::Arc<dyn PolicyRule>)>,
}

impl PolicyEngine {
    /// Construct rules from the audit configuration via the registry.
    pub fn from_config(registry: &PolicyRegistry, config: &LoadedConfig) -> Result<Self> {
        let audit = config.config.audit.clone().unwrap_or_default();
        let mut rules = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for entry in &audit.policies {
            if !seen.insert(entry.name.clone()) {
                return Err(crate::errors::DtifxError::Duplicate {
                    kind: "policy",
                    name: entry.name.clone(),
                });
            }
            for rule in registry.build(entry, config)? {
                rules.push((entry.name.clone(), rule));
            }
        }
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Execute every rule. A rule error is reported as an error-severity
    /// violation against a synthetic pointer and does not stop the rest.
    pub fn run(&self, ctx: &RuleContext) -> PolicyReport {
        let mut policies: Vec<PolicyOutcome> = Vec::new();
        for (policy_name, rule) in &self.rules {
            let violations = match rule.run(ctx) {
                Ok(violations) => violations,
                Err(err) => {
                    warn!("policy rule `{}` failed: {err}", rule.id());
                    vec![PolicyViolation::new(
                        TokenPointer::new(format!("#/__policy__/{}", rule.id())),
                        Severity::Error,
                        format!("Rule `{}` failed: {err}", rule.id()),
                    )]
                }
            };
            match policies.iter_mut().find(|p| &p.name == policy_name) {
                Some(outcome) => outcome.violations.extend(violations),
                None => policies.push(PolicyOutcome {
                    name: policy_name.clone(),
                    violations,
                }),
            }
        }

        let mut severity = SeverityCounts::default();
        let mut violation_count = 0;
        for outcome in &policies {
            for violation in &outcome.violations {
                violation_count += 1;
                match violation.severity {
                    Severity::Error => severity.error += 1,
                    Severity::Warning => severity.warning += 1,
                    Severity::Info => severity.info += 1,
                }
            }
        }

        PolicyReport {
            summary: PolicySummary {
                policy_count: policies.len(),
                violation_count,
                severity,
            },
            policies,
        }
    }
}
