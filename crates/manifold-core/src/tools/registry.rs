//! Runtime tool registration.
//!
//! Library users can register their own tool factories beyond the built-in
//! set. The registry is an explicit object; a process-wide lazy default is
//! provided for ergonomic callers. Registration happens at startup, lookups
//! happen per request, so the map sits behind a read-preferring lock.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{Error, Result};
use crate::tools::{TOOL_BASH, TOOL_SEARCH, TOOL_TEXT_EDITOR, Tool, builtin};

type ToolFactory = Arc<dyn Fn() -> Result<Tool> + Send + Sync>;

/// Describes how to create a named tool.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    factory: ToolFactory,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        factory: impl Fn() -> Result<Tool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn create(&self) -> Result<Tool> {
        (self.factory)()
    }
}

/// A named map of tool factories.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDefinition>>,
}

impl ToolRegistry {
    /// An empty registry with no built-ins.
    pub fn empty() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-populated with the built-in tools.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry
            .register(ToolDefinition::new(
                TOOL_SEARCH,
                "Web search tool (provider-executed)",
                builtin::search_tool,
            ))
            .expect("fresh registry");
        registry
            .register(ToolDefinition::new(
                TOOL_TEXT_EDITOR,
                "Text editor tool (server-executed)",
                builtin::text_editor_tool,
            ))
            .expect("fresh registry");
        registry
            .register(ToolDefinition::new(
                TOOL_BASH,
                "Bash command execution tool (server-executed)",
                builtin::bash_tool,
            ))
            .expect("fresh registry");
        registry
    }

    pub fn register(&self, def: ToolDefinition) -> Result<()> {
        if def.name.is_empty() {
            return Err(Error::invalid_request("tool.name", "tool name is required"));
        }

        let mut tools = self.tools.write().expect("lock poisoned");
        if tools.contains_key(&def.name) {
            return Err(Error::invalid_value(
                "tool.name",
                def.name.clone(),
                "tool is already registered",
            ));
        }
        tools.insert(def.name.clone(), def);
        Ok(())
    }

    /// Remove a registered tool, e.g. to replace an implementation in tests.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut tools = self.tools.write().expect("lock poisoned");
        if tools.remove(name).is_none() {
            return Err(Error::invalid_value(
                "tool.name",
                name,
                "tool is not registered",
            ));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<ToolDefinition> {
        let tools = self.tools.read().expect("lock poisoned");
        tools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::invalid_value("tool.name", name, "unknown tool"))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.read().expect("lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.read().expect("lock poisoned").keys().cloned().collect()
    }

    /// Instantiate a tool through its registered factory.
    pub fn create(&self, name: &str) -> Result<Tool> {
        self.get(name)?.create()
    }
}

static GLOBAL_REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();

/// The process-wide tool registry, initialized with the built-ins on first
/// use.
pub fn global() -> &'static ToolRegistry {
    GLOBAL_REGISTRY.get_or_init(ToolRegistry::with_builtins)
}

/// Register a tool with the global registry.
pub fn register_tool(def: ToolDefinition) -> Result<()> {
    global().register(def)
}

/// Create a tool through the global registry.
pub fn create_tool(name: &str) -> Result<Tool> {
    global().create(name)
}
