//! Built-in validation rules.

use std::sync::Arc;

use serde_json::json;

use crate::backend::BackendId;
use crate::capabilities::CapabilityRegistry;
use crate::messages::BlockKind;
use crate::request::GenerateRequest;
use crate::validation::{Severity, ValidationRule, ValidationWarning, WarningCode};

/// Warns when the model is absent from the capability catalog.
pub struct ModelRule {
    registry: Arc<CapabilityRegistry>,
}

impl ModelRule {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }
}

impl ValidationRule for ModelRule {
    fn name(&self) -> &str {
        "model"
    }

    fn check(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
        if self.registry.supports_model(backend.as_str(), &req.model) {
            return Vec::new();
        }
        vec![ValidationWarning {
            code: WarningCode::ModelUnknown,
            category: "model".to_string(),
            field: "model".to_string(),
            value: json!(req.model),
            message: format!(
                "model {} not found in {} capabilities (catalog may be outdated)",
                req.model, backend
            ),
            severity: Severity::Warning,
        }]
    }
}

/// Warns when tools are requested but the catalog doesn't list support.
pub struct ToolRule {
    registry: Arc<CapabilityRegistry>,
}

impl ToolRule {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }
}

impl ValidationRule for ToolRule {
    fn name(&self) -> &str {
        "tool"
    }

    fn check(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if req.params.tools.is_empty() {
            return warnings;
        }

        let Some(model_cap) = self.registry.model(backend.as_str(), &req.model) else {
            // Cannot check without catalog data.
            return warnings;
        };

        if !model_cap.features.tools {
            warnings.push(ValidationWarning {
                code: WarningCode::ModelDoesNotSupportTools,
                category: "tool".to_string(),
                field: "tools".to_string(),
                value: json!(req.params.tools.len()),
                message: format!("model {} might not support tools", req.model),
                severity: Severity::Warning,
            });
            return warnings;
        }

        for tool in &req.params.tools {
            let name = &tool.function.name;
            if self
                .registry
                .tool_capability(backend.as_str(), &req.model, name)
                .is_none()
            {
                warnings.push(ValidationWarning {
                    code: WarningCode::ToolNotInCapabilities,
                    category: "tool".to_string(),
                    field: "tools".to_string(),
                    value: json!(name),
                    message: format!("tool {} might not be supported by {}", name, req.model),
                    severity: Severity::Info,
                });
            }
        }

        warnings
    }
}

/// Warns about thinking configuration the model may reject.
pub struct ThinkingRule {
    registry: Arc<CapabilityRegistry>,
}

impl ThinkingRule {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }
}

impl ValidationRule for ThinkingRule {
    fn name(&self) -> &str {
        "thinking"
    }

    fn check(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if !req.params.thinking_enabled() {
            return warnings;
        }

        let Some(model_cap) = self.registry.model(backend.as_str(), &req.model) else {
            return warnings;
        };

        if !model_cap.features.thinking {
            warnings.push(ValidationWarning {
                code: WarningCode::ThinkingUnsupported,
                category: "thinking".to_string(),
                field: "thinking_enabled".to_string(),
                value: json!(true),
                message: format!("model {} might not support extended thinking", req.model),
                severity: Severity::Warning,
            });
            return warnings;
        }

        if let Some(budget) = req.params.thinking_budget {
            let min = model_cap.thinking.min_budget;
            let max = model_cap.thinking.max_budget;

            if budget < min {
                warnings.push(ValidationWarning {
                    code: WarningCode::ThinkingBudgetTooLow,
                    category: "thinking".to_string(),
                    field: "thinking_budget".to_string(),
                    value: json!(budget),
                    message: format!("thinking budget {budget} below recommended minimum {min}"),
                    severity: Severity::Info,
                });
            }
            if budget > max {
                warnings.push(ValidationWarning {
                    code: WarningCode::ThinkingBudgetTooHigh,
                    category: "thinking".to_string(),
                    field: "thinking_budget".to_string(),
                    value: json!(budget),
                    message: format!(
                        "thinking budget {budget} above maximum {max} (will likely fail)"
                    ),
                    severity: Severity::Error,
                });
            }
        }

        if let Some(level) = &req.params.thinking_level {
            if self
                .registry
                .effort_to_budget(backend.as_str(), &req.model, level)
                .is_err()
            {
                warnings.push(ValidationWarning {
                    code: WarningCode::ThinkingLevelInvalid,
                    category: "thinking".to_string(),
                    field: "thinking_level".to_string(),
                    value: json!(level),
                    message: "unknown thinking level (valid: low, medium, high)".to_string(),
                    severity: Severity::Warning,
                });
            }
        }

        warnings
    }
}

/// Warns when messages contain images but the model lacks vision.
pub struct VisionRule {
    registry: Arc<CapabilityRegistry>,
}

impl VisionRule {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }
}

impl ValidationRule for VisionRule {
    fn name(&self) -> &str {
        "vision"
    }

    fn check(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
        let has_images = req
            .messages
            .iter()
            .flat_map(|m| &m.blocks)
            .any(|b| b.kind() == BlockKind::Image);
        if !has_images {
            return Vec::new();
        }

        let Some(model_cap) = self.registry.model(backend.as_str(), &req.model) else {
            return Vec::new();
        };

        if model_cap.features.vision {
            return Vec::new();
        }

        vec![ValidationWarning {
            code: WarningCode::VisionUnsupported,
            category: "vision".to_string(),
            field: "messages".to_string(),
            value: json!("contains images"),
            message: format!("model {} might not support vision", req.model),
            severity: Severity::Warning,
        }]
    }
}

/// Warns when sampling parameters fall outside the backend's bounds.
pub struct ParameterRule {
    registry: Arc<CapabilityRegistry>,
}

impl ParameterRule {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }
}

impl ValidationRule for ParameterRule {
    fn name(&self) -> &str {
        "parameter"
    }

    fn check(&self, backend: BackendId, req: &GenerateRequest) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let Some(caps) = self.registry.provider(backend.as_str()) else {
            return warnings;
        };
        let c = caps.constraints;

        if let Some(temp) = req.params.temperature {
            if temp < c.temperature_min || temp > c.temperature_max {
                warnings.push(ValidationWarning {
                    code: WarningCode::TemperatureOutOfRange,
                    category: "parameter".to_string(),
                    field: "temperature".to_string(),
                    value: json!(temp),
                    message: format!(
                        "temperature {temp:.2} outside recommended range [{:.2}, {:.2}]",
                        c.temperature_min, c.temperature_max
                    ),
                    severity: Severity::Warning,
                });
            }
        }

        if let Some(top_p) = req.params.top_p {
            if top_p < c.top_p_min || top_p > c.top_p_max {
                warnings.push(ValidationWarning {
                    code: WarningCode::TopPOutOfRange,
                    category: "parameter".to_string(),
                    field: "top_p".to_string(),
                    value: json!(top_p),
                    message: format!(
                        "top_p {top_p:.2} outside recommended range [{:.2}, {:.2}]",
                        c.top_p_min, c.top_p_max
                    ),
                    severity: Severity::Warning,
                });
            }
        }

        if let Some(top_k) = req.params.top_k {
            if top_k < c.top_k_min || top_k > c.top_k_max {
                warnings.push(ValidationWarning {
                    code: WarningCode::TopKOutOfRange,
                    category: "parameter".to_string(),
                    field: "top_k".to_string(),
                    value: json!(top_k),
                    message: format!(
                        "top_k {top_k} outside recommended range [{}, {}]",
                        c.top_k_min, c.top_k_max
                    ),
                    severity: Severity::Warning,
                });
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities;
    use crate::messages::{Block, Message, Role};
    use crate::request::RequestParams;
    use crate::tools::builtin;

    fn registry() -> Arc<CapabilityRegistry> {
        Arc::new(capabilities::CapabilityRegistry::with_embedded())
    }

    fn request(model: &str, params: RequestParams) -> GenerateRequest {
        GenerateRequest::new(model, vec![Message::user("hi")]).with_params(params)
    }

    #[test]
    fn test_tool_rule_unsupported_model_feature() {
        let rule = ToolRule::new(registry());
        let params = RequestParams {
            tools: vec![builtin::bash_tool().unwrap()],
            ..Default::default()
        };
        // claude-3-5-haiku supports tools, so only unknown tools are flagged.
        let params_unknown = RequestParams {
            tools: vec![
                builtin::custom_tool(
                    "my_tool",
                    "Custom",
                    serde_json::json!({"type": "object", "properties": {}}),
                )
                .unwrap(),
            ],
            ..Default::default()
        };

        let warnings = rule.check(
            BackendId::Anthropic,
            &request("claude-3-5-haiku-20241022", params),
        );
        assert!(warnings.is_empty());

        let warnings = rule.check(
            BackendId::Anthropic,
            &request("claude-sonnet-4-5", params_unknown),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::ToolNotInCapabilities);
        assert_eq!(warnings[0].severity, Severity::Info);
    }

    #[test]
    fn test_thinking_rule_budget_bounds() {
        let rule = ThinkingRule::new(registry());
        let low = RequestParams {
            thinking_enabled: Some(true),
            thinking_budget: Some(100),
            ..Default::default()
        };
        let warnings = rule.check(BackendId::Anthropic, &request("claude-sonnet-4-5", low));
        assert!(
            warnings
                .iter()
                .any(|w| w.code == WarningCode::ThinkingBudgetTooLow)
        );

        let high = RequestParams {
            thinking_enabled: Some(true),
            thinking_budget: Some(10_000_000),
            ..Default::default()
        };
        let warnings = rule.check(BackendId::Anthropic, &request("claude-sonnet-4-5", high));
        assert!(
            warnings
                .iter()
                .any(|w| w.code == WarningCode::ThinkingBudgetTooHigh
                    && w.severity == Severity::Error)
        );
    }

    #[test]
    fn test_thinking_rule_unsupported_model() {
        let rule = ThinkingRule::new(registry());
        let params = RequestParams {
            thinking_enabled: Some(true),
            ..Default::default()
        };
        let warnings = rule.check(
            BackendId::Anthropic,
            &request("claude-3-5-haiku-20241022", params),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::ThinkingUnsupported);
    }

    #[test]
    fn test_vision_rule() {
        let rule = VisionRule::new(registry());
        let req = GenerateRequest::new(
            "claude-sonnet-4-5",
            vec![Message::new(
                Role::User,
                vec![Block::image("https://x/cat.png", "image/png")],
            )],
        );
        // Sonnet supports vision: no warning.
        assert!(rule.check(BackendId::Anthropic, &req).is_empty());

        // Text-only request: no warning either.
        let text_req = GenerateRequest::new("claude-sonnet-4-5", vec![Message::user("hi")]);
        assert!(rule.check(BackendId::Anthropic, &text_req).is_empty());
    }

    #[test]
    fn test_parameter_rule_bounds() {
        let rule = ParameterRule::new(registry());
        let params = RequestParams {
            temperature: Some(1.7),
            top_p: Some(1.4),
            top_k: Some(100_000),
            ..Default::default()
        };
        let warnings = rule.check(BackendId::Anthropic, &request("claude-sonnet-4-5", params));
        let codes: Vec<WarningCode> = warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&WarningCode::TemperatureOutOfRange));
        assert!(codes.contains(&WarningCode::TopPOutOfRange));
        assert!(codes.contains(&WarningCode::TopKOutOfRange));
    }

    #[test]
    fn test_parameter_rule_in_bounds() {
        let rule = ParameterRule::new(registry());
        let params = RequestParams {
            temperature: Some(0.7),
            top_p: Some(0.9),
            top_k: Some(40),
            ..Default::default()
        };
        assert!(
            rule.check(BackendId::Anthropic, &request("claude-sonnet-4-5", params))
                .is_empty()
        );
    }
}
