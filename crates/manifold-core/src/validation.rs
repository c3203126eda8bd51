//! Advisory request validation.
//!
//! Warnings are informational: the library never blocks a request based on
//! them, because the backend API is the source of truth and the capability
//! catalog may be outdated. Callers decide whether to surface or ignore them.

pub mod rules;

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::capabilities;
use crate::request::GenerateRequest;

/// How serious a warning is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Might be expected.
    Info,
    /// Potentially problematic.
    Warning,
    /// Likely to cause an API failure.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Machine-readable warning identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    ModelUnknown,
    ModelDoesNotSupportTools,
    ToolNotInCapabilities,
    ThinkingUnsupported,
    ThinkingBudgetTooLow,
    ThinkingBudgetTooHigh,
    ThinkingLevelInvalid,
    VisionUnsupported,
    TemperatureOutOfRange,
    TopPOutOfRange,
    TopKOutOfRange,
}

/// A potential problem with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: WarningCode,
    /// "model", "tool", "thinking", "vision", or "parameter".
    pub category: String,
    pub field: String,
    pub value: serde_json::Value,
    pub message: String,
    pub severity: Severity,
}

/// A pluggable validation rule.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning>;
}

/// Runs a set of rules over a request.
pub struct ValidationEngine {
    rules: RwLock<Vec<Box<dyn ValidationRule>>>,
}

impl ValidationEngine {
    pub fn empty() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    /// An engine with the built-in rules, checking against `registry`.
    pub fn with_default_rules(registry: Arc<capabilities::CapabilityRegistry>) -> Self {
        let engine = Self::empty();
        engine.add_rule(Box::new(rules::ModelRule::new(registry.clone())));
        engine.add_rule(Box::new(rules::ToolRule::new(registry.clone())));
        engine.add_rule(Box::new(rules::ThinkingRule::new(registry.clone())));
        engine.add_rule(Box::new(rules::VisionRule::new(registry.clone())));
        engine.add_rule(Box::new(rules::ParameterRule::new(registry)));
        engine
    }

    pub fn add_rule(&self, rule: Box<dyn ValidationRule>) {
        self.rules.write().expect("lock poisoned").push(rule);
    }

    /// Remove a rule by name; returns whether one was removed.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write().expect("lock poisoned");
        let before = rules.len();
        rules.retain(|r| r.name() != name);
        rules.len() != before
    }

    pub fn validate(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
        let rules = self.rules.read().expect("lock poisoned");
        rules
            .iter()
            .flat_map(|rule| rule.check(backend, req))
            .collect()
    }
}

static GLOBAL_ENGINE: OnceLock<ValidationEngine> = OnceLock::new();

/// The process-wide validation engine, built from the default rules and the
/// global capability registry on first use.
pub fn engine() -> &'static ValidationEngine {
    GLOBAL_ENGINE.get_or_init(|| ValidationEngine::with_default_rules(capabilities::registry()))
}

/// Return the potential issues with a request. Warnings never block; callers
/// choose whether to surface them.
pub fn validate(backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
    engine().validate(backend, req)
}

/// Keep only warnings at one of the given severities.
pub fn filter_by_severity(
    warnings: Vec<ValidationWarning>,
    severities: &[Severity],
) -> Vec<ValidationWarning> {
    warnings
        .into_iter()
        .filter(|w| severities.contains(&w.severity))
        .collect()
}

/// Keep only warnings in one of the given categories.
pub fn filter_by_category(
    warnings: Vec<ValidationWarning>,
    categories: &[&str],
) -> Vec<ValidationWarning> {
    warnings
        .into_iter()
        .filter(|w| categories.contains(&w.category.as_str()))
        .collect()
}

/// Keep only warnings with one of the given codes.
pub fn filter_by_code(
    warnings: Vec<ValidationWarning>,
    codes: &[WarningCode],
) -> Vec<ValidationWarning> {
    warnings
        .into_iter()
        .filter(|w| codes.contains(&w.code))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Message;

    fn req(model: &str) -> GenerateRequest {
        GenerateRequest::new(model, vec![Message::user("hi")])
    }

    fn test_engine() -> ValidationEngine {
        ValidationEngine::with_default_rules(Arc::new(
            capabilities::CapabilityRegistry::with_embedded(),
        ))
    }

    #[test]
    fn test_known_model_produces_no_warnings() {
        let warnings = test_engine().validate(BackendId::Anthropic, &req("claude-sonnet-4-5"));
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_unknown_model_warns() {
        let warnings = test_engine().validate(BackendId::Anthropic, &req("claude-unlisted"));
        assert!(warnings.iter().any(|w| w.code == WarningCode::ModelUnknown));
    }

    #[test]
    fn test_remove_rule() {
        let engine = test_engine();
        assert!(engine.remove_rule("model"));
        assert!(!engine.remove_rule("model"));
        let warnings = engine.validate(BackendId::Anthropic, &req("claude-unlisted"));
        assert!(warnings.iter().all(|w| w.code != WarningCode::ModelUnknown));
    }

    #[test]
    fn test_filters() {
        let warning = ValidationWarning {
            code: WarningCode::ModelUnknown,
            category: "model".to_string(),
            field: "model".to_string(),
            value: serde_json::Value::Null,
            message: "unknown".to_string(),
            severity: Severity::Warning,
        };
        let info = ValidationWarning {
            code: WarningCode::ToolNotInCapabilities,
            category: "tool".to_string(),
            severity: Severity::Info,
            ..warning.clone()
        };
        let all = vec![warning, info];

        assert_eq!(filter_by_severity(all.clone(), &[Severity::Info]).len(), 1);
        assert_eq!(filter_by_category(all.clone(), &["model"]).len(), 1);
        assert_eq!(
            filter_by_code(all, &[WarningCode::ToolNotInCapabilities]).len(),
            1
        );
    }
}
