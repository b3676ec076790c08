//! Tool-invocation capability used by agents.
//!
//! The orchestrator never looks inside tools; an agent may call them during its turn and only
//! the messages it finally emits reach the transcript.
//!
//! ```text
//! AssistantAgent → ToolRegistry → ToolProtocol (trait) → [Custom | AgentDirectory | user-defined]
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
//! use groupchat::tool_protocols::CustomToolProtocol;
//! use std::sync::Arc;
//!
//! # async {
//! let local = Arc::new(CustomToolProtocol::new());
//! local
//!     .register_tool(
//!         ToolMetadata::new("word_count", "Count words in a text").with_parameter(
//!             ToolParameter::new("text", ToolParameterType::String).required(),
//!         ),
//!         Arc::new(|params: serde_json::Value| {
//!             let words = params["text"].as_str().unwrap_or("").split_whitespace().count();
//!             Ok(ToolResult::success(serde_json::json!({ "words": words })))
//!         }),
//!     )
//!     .await;
//!
//! let mut registry = ToolRegistry::empty();
//! registry.add_protocol("local", local).await.unwrap();
//! assert_eq!(registry.list_tools().len(), 1);
//! # };
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    /// Set when `success` is false.
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the model omits the parameter.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Metadata about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Render as a bullet for a system prompt.
    pub fn describe(&self) -> String {
        let mut text = format!("- {}: {}\n", self.name, self.description);
        if !self.parameters.is_empty() {
            text.push_str("  Parameters:\n");
            for param in &self.parameters {
                text.push_str(&format!(
                    "    - {} ({:?}{}): {}\n",
                    param.name,
                    param.param_type,
                    if param.required { ", required" } else { "" },
                    param.description.as_deref().unwrap_or("No description")
                ));
            }
        }
        text
    }
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>>;

    /// Protocol identifier (e.g. "custom", "agent-directory").
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
#[derive(Debug, Clone)]
pub enum ToolError {
    NotFound(String),
    ExecutionFailed(String),
    InvalidParameters(String),
    /// Two protocols in one registry expose the same tool name.
    Conflict(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            ToolError::Conflict(name) => write!(f, "Tool already registered: {}", name),
        }
    }
}

impl Error for ToolError {}

struct RegisteredTool {
    metadata: ToolMetadata,
    protocol: String,
}

/// Routes tool calls to the protocol that exposes each tool.
///
/// Tools are discovered when a protocol is added; tools registered on a protocol afterwards are
/// not visible until it is added again.
#[derive(Default)]
pub struct ToolRegistry {
    protocols: HashMap<String, Arc<dyn ToolProtocol>>,
    // BTreeMap keeps prompt rendering deterministic.
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a protocol under `name` and index its tools.
    ///
    /// Re-adding a protocol under the same name refreshes its tool list.
    pub async fn add_protocol(
        &mut self,
        name: &str,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tools = protocol.list_tools().await?;

        for tool in &tools {
            if let Some(existing) = self.tools.get(&tool.name) {
                if existing.protocol != name {
                    return Err(Box::new(ToolError::Conflict(tool.name.clone())));
                }
            }
        }

        self.remove_protocol(name);
        for metadata in tools {
            self.tools.insert(
                metadata.name.clone(),
                RegisteredTool {
                    metadata,
                    protocol: name.to_string(),
                },
            );
        }
        self.protocols.insert(name.to_string(), protocol);
        Ok(())
    }

    pub fn remove_protocol(&mut self, name: &str) -> Option<Arc<dyn ToolProtocol>> {
        self.tools.retain(|_, tool| tool.protocol != name);
        self.protocols.remove(name)
    }

    /// Tools sorted by name.
    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        self.tools.values().map(|t| &t.metadata).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let protocol = self
            .tools
            .get(tool_name)
            .and_then(|tool| self.protocols.get(&tool.protocol))
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        protocol.execute(tool_name, parameters).await
    }
}
