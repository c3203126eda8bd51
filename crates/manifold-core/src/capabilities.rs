//! Model capability catalog.
//!
//! The catalog is metadata for UX, pricing estimates, and advisory warnings.
//! It never gates a request: backend APIs are the source of truth, and the
//! embedded descriptor may lag behind new model releases. Users can override
//! it by loading their own YAML or registering capabilities programmatically.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

const ANTHROPIC_CAPABILITIES_YAML: &str =
    include_str!("../config/capabilities/anthropic.yaml");

/// Full capability configuration for one backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    pub provider: String,
    #[serde(default)]
    pub models: HashMap<String, ModelCapability>,
    #[serde(default)]
    pub constraints: ProviderConstraints,
}

/// Capabilities of one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCapability {
    #[serde(default)]
    pub context_window: u32,
    #[serde(default)]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub features: ModelFeatures,
    #[serde(default)]
    pub thinking: ThinkingCapability,
    #[serde(default)]
    pub pricing: PricingInfo,
    #[serde(default)]
    pub tools: Vec<ToolCapability>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelFeatures {
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingCapability {
    #[serde(default)]
    pub min_budget: u32,
    #[serde(default)]
    pub max_budget: u32,
    /// Effort level ("low"/"medium"/"high") to token budget.
    #[serde(default)]
    pub effort_to_budget: HashMap<String, u32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PricingInfo {
    #[serde(default)]
    pub input_per_1m: f64,
    #[serde(default)]
    pub output_per_1m: f64,
    #[serde(default)]
    pub cache_write_per_1m: f64,
    #[serde(default)]
    pub cache_read_per_1m: f64,
}

/// Availability of one built-in tool on a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCapability {
    pub name: String,
    #[serde(default)]
    pub native_support: bool,
    #[serde(default)]
    pub execution_side: String,
    #[serde(default)]
    pub pricing_per_1k_requests: f64,
    #[serde(default)]
    pub description: String,
}

/// Backend-wide parameter bounds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProviderConstraints {
    #[serde(default)]
    pub temperature_min: f64,
    #[serde(default)]
    pub temperature_max: f64,
    #[serde(default)]
    pub top_p_min: f64,
    #[serde(default)]
    pub top_p_max: f64,
    #[serde(default)]
    pub top_k_min: u32,
    #[serde(default)]
    pub top_k_max: u32,
}

/// Read-mostly capability store keyed by backend name.
pub struct CapabilityRegistry {
    capabilities: RwLock<HashMap<String, ProviderCapabilities>>,
}

impl CapabilityRegistry {
    /// An empty registry with no embedded data.
    pub fn empty() -> Self {
        Self {
            capabilities: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded with the embedded descriptors.
    pub fn with_embedded() -> Self {
        let registry = Self::empty();
        match serde_yaml::from_str::<ProviderCapabilities>(ANTHROPIC_CAPABILITIES_YAML) {
            Ok(caps) => registry.register("anthropic", caps),
            Err(err) => warn!(%err, "failed to parse embedded anthropic capabilities"),
        }
        registry
    }

    pub fn provider(&self, provider: &str) -> Option<ProviderCapabilities> {
        self.capabilities
            .read()
            .expect("lock poisoned")
            .get(provider)
            .cloned()
    }

    pub fn model(&self, provider: &str, model: &str) -> Option<ModelCapability> {
        self.capabilities
            .read()
            .expect("lock poisoned")
            .get(provider)
            .and_then(|caps| caps.models.get(model))
            .cloned()
    }

    pub fn supports_model(&self, provider: &str, model: &str) -> bool {
        self.model(provider, model).is_some()
    }

    pub fn supports_tools(&self, provider: &str, model: &str) -> bool {
        self.model(provider, model)
            .map(|m| m.features.tools)
            .unwrap_or(false)
    }

    pub fn supports_thinking(&self, provider: &str, model: &str) -> bool {
        self.model(provider, model)
            .map(|m| m.features.thinking)
            .unwrap_or(false)
    }

    pub fn tool_capability(
        &self,
        provider: &str,
        model: &str,
        tool_name: &str,
    ) -> Option<ToolCapability> {
        self.model(provider, model)
            .and_then(|m| m.tools.into_iter().find(|t| t.name == tool_name))
    }

    /// Valid thinking budget range for a model, if known.
    pub fn thinking_budget_range(&self, provider: &str, model: &str) -> Option<(u32, u32)> {
        self.model(provider, model)
            .map(|m| (m.thinking.min_budget, m.thinking.max_budget))
    }

    /// Convert an effort level to a token budget.
    ///
    /// Uses the model's own table when the catalog knows the model, the
    /// library defaults otherwise. Unknown effort levels are an error.
    pub fn effort_to_budget(&self, provider: &str, model: &str, effort: &str) -> Result<u32> {
        let default = default_budget(effort);

        if let Some(model_cap) = self.model(provider, model) {
            if let Some(budget) = model_cap.thinking.effort_to_budget.get(effort) {
                return Ok(*budget);
            }
            let budget = default.ok_or_else(|| unknown_effort(effort))?;
            warn!(
                provider,
                model, effort, budget, "effort level not defined for model; using default budget"
            );
            return Ok(budget);
        }

        let budget = default.ok_or_else(|| unknown_effort(effort))?;
        warn!(
            provider,
            model, budget, "model not found in capability catalog; using default thinking budget"
        );
        Ok(budget)
    }

    /// Load capabilities from a YAML file, replacing any existing entry for
    /// the provider the file names.
    pub fn load_from_file(&self, path: &str) -> Result<()> {
        let data = std::fs::read_to_string(path)?;
        let caps: ProviderCapabilities = serde_yaml::from_str(&data)?;
        let provider = caps.provider.clone();
        self.register(provider, caps);
        Ok(())
    }

    /// Register capabilities programmatically, replacing any existing entry
    /// for the same provider.
    pub fn register(&self, provider: impl Into<String>, caps: ProviderCapabilities) {
        let mut map = self.capabilities.write().expect("lock poisoned");
        map.insert(provider.into(), caps);
    }
}

fn default_budget(effort: &str) -> Option<u32> {
    match effort {
        "low" => Some(2000),
        "medium" => Some(5000),
        "high" => Some(12000),
        _ => None,
    }
}

fn unknown_effort(effort: &str) -> Error {
    Error::invalid_value(
        "thinking_level",
        effort,
        "unknown effort level (valid: low, medium, high)",
    )
}

static GLOBAL_REGISTRY: OnceLock<Arc<CapabilityRegistry>> = OnceLock::new();

/// The process-wide capability registry, loading the embedded descriptors on
/// first use.
pub fn registry() -> Arc<CapabilityRegistry> {
    GLOBAL_REGISTRY
        .get_or_init(|| Arc::new(CapabilityRegistry::with_embedded()))
        .clone()
}

/// Load capabilities into the global registry from a YAML file.
pub fn load_capabilities(path: &str) -> Result<()> {
    registry().load_from_file(path)
}

/// Register capabilities for a backend with the global registry.
pub fn register_capabilities(provider: impl Into<String>, caps: ProviderCapabilities) {
    registry().register(provider, caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_descriptor_parses() {
        let registry = CapabilityRegistry::with_embedded();
        let caps = registry.provider("anthropic").unwrap();
        assert!(!caps.models.is_empty());
        assert!(caps.constraints.temperature_max > 0.0);
    }

    #[test]
    fn test_model_lookup() {
        let registry = CapabilityRegistry::with_embedded();
        assert!(registry.supports_model("anthropic", "claude-sonnet-4-5"));
        assert!(!registry.supports_model("anthropic", "claude-imaginary"));
        assert!(!registry.supports_model("openrouter", "anything"));

        let model = registry.model("anthropic", "claude-sonnet-4-5").unwrap();
        assert!(model.features.streaming);
        assert!(model.context_window >= 100_000);
    }

    #[test]
    fn test_feature_queries() {
        let registry = CapabilityRegistry::with_embedded();
        assert!(registry.supports_tools("anthropic", "claude-sonnet-4-5"));
        assert!(registry.supports_thinking("anthropic", "claude-sonnet-4-5"));
        assert!(!registry.supports_thinking("anthropic", "claude-3-5-haiku-20241022"));
    }

    #[test]
    fn test_tool_capability() {
        let registry = CapabilityRegistry::with_embedded();
        let search = registry
            .tool_capability("anthropic", "claude-sonnet-4-5", "search")
            .unwrap();
        assert_eq!(search.execution_side, "provider");
        assert!(
            registry
                .tool_capability("anthropic", "claude-sonnet-4-5", "teleport")
                .is_none()
        );
    }

    #[test]
    fn test_effort_to_budget_model_table() {
        let registry = CapabilityRegistry::with_embedded();
        // claude-opus-4-1 overrides the defaults.
        assert_eq!(
            registry
                .effort_to_budget("anthropic", "claude-opus-4-1", "high")
                .unwrap(),
            24000
        );
    }

    #[test]
    fn test_effort_to_budget_defaults_for_unknown_model() {
        let registry = CapabilityRegistry::with_embedded();
        assert_eq!(
            registry
                .effort_to_budget("anthropic", "claude-unlisted", "low")
                .unwrap(),
            2000
        );
        assert_eq!(
            registry
                .effort_to_budget("lorem", "lorem-fast", "medium")
                .unwrap(),
            5000
        );
    }

    #[test]
    fn test_effort_to_budget_unknown_level() {
        let registry = CapabilityRegistry::with_embedded();
        assert!(
            registry
                .effort_to_budget("anthropic", "claude-sonnet-4-5", "extreme")
                .is_err()
        );
    }

    #[test]
    fn test_programmatic_registration_overrides() {
        let registry = CapabilityRegistry::empty();
        registry.register("openrouter", ProviderCapabilities {
            provider: "openrouter".to_string(),
            models: HashMap::from([(
                "moonshotai/kimi-k2".to_string(),
                ModelCapability {
                    features: ModelFeatures {
                        tools: true,
                        streaming: true,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )]),
            ..Default::default()
        });
        assert!(registry.supports_model("openrouter", "moonshotai/kimi-k2"));
        assert!(registry.supports_tools("openrouter", "moonshotai/kimi-k2"));
    }

    #[test]
    fn test_thinking_budget_range() {
        let registry = CapabilityRegistry::with_embedded();
        let (min, max) = registry
            .thinking_budget_range("anthropic", "claude-sonnet-4-5")
            .unwrap();
        assert!(min >= 1024);
        assert!(max > min);
    }
}
