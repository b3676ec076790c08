//! Tool protocol implementations.
//!
//! - **CustomToolProtocol**: Rust closures (sync and async) exposed as tools
//! - **AgentDirectoryProtocol**: lets a coordinating agent list and run worker participants,
//!   the delegation pattern used by handoff teams where a selector agent farms out work

use crate::groupchat::participant::Participant;
use crate::groupchat::tool_protocol::{
    ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult,
};
use crate::groupchat::transcript::Transcript;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Type alias for synchronous tool functions exposed via the custom adapter.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Type alias for asynchronous tool functions exposed via the custom adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(
            JsonValue,
        )
            -> Pin<Box<dyn Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>> + Send>>
        + Send
        + Sync,
>;

/// Custom function-calling tool adapter.
///
/// ```rust
/// use groupchat::tool_protocol::{ToolMetadata, ToolProtocol, ToolResult};
/// use groupchat::tool_protocols::CustomToolProtocol;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let tools = CustomToolProtocol::new();
/// tools
///     .register_tool(
///         ToolMetadata::new("ping", "Health check"),
///         Arc::new(|_params: serde_json::Value| Ok(ToolResult::success(serde_json::json!("pong")))),
///     )
///     .await;
///
/// let result = tools.execute("ping", serde_json::json!({})).await.unwrap();
/// assert_eq!(result.output, "pong");
/// # }
/// ```
pub struct CustomToolProtocol {
    tools: RwLock<HashMap<String, ToolMetadata>>,
    sync_functions: RwLock<HashMap<String, ToolFunction>>,
    async_functions: RwLock<HashMap<String, AsyncToolFunction>>,
}

impl CustomToolProtocol {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            sync_functions: RwLock::new(HashMap::new()),
            async_functions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a synchronous tool function, replacing any tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        let name = metadata.name.clone();
        self.async_functions.write().await.remove(&name);
        self.tools.write().await.insert(name.clone(), metadata);
        self.sync_functions.write().await.insert(name, function);
    }

    /// Register an asynchronous tool function, replacing any tool with the same name.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.sync_functions.write().await.remove(&name);
        self.tools.write().await.insert(name.clone(), metadata);
        self.async_functions.write().await.insert(name, function);
    }

    pub async fn unregister_tool(&self, name: &str) {
        self.tools.write().await.remove(name);
        self.sync_functions.write().await.remove(name);
        self.async_functions.write().await.remove(name);
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        // Clone the handle out so no lock is held while the tool runs.
        let async_func = self.async_functions.read().await.get(tool_name).cloned();
        if let Some(func) = async_func {
            return func(parameters).await;
        }

        let sync_func = self.sync_functions.read().await.get(tool_name).cloned();
        if let Some(func) = sync_func {
            return func(parameters);
        }

        Err(Box::new(ToolError::NotFound(tool_name.to_string())))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        Ok(tools.values().cloned().collect())
    }

    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        tools.get(tool_name).cloned().ok_or_else(|| {
            Box::new(ToolError::NotFound(tool_name.to_string())) as Box<dyn Error + Send + Sync>
        })
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}

/// Gives a coordinating agent access to a set of worker participants.
///
/// Exposes two tools:
/// - `list_agents`: `[{"name": .., "description": ..}]` for every worker
/// - `execute_agent(agent_name, initial_message)`: runs one worker turn on a fresh transcript
///   seeded with `initial_message` and returns the worker's messages as `source: content`
///   lines
///
/// Workers run outside the calling group chat; their messages only reach the outer transcript
/// through the coordinating agent's reply.
pub struct AgentDirectoryProtocol {
    workers: Vec<Arc<dyn Participant>>,
}

impl AgentDirectoryProtocol {
    pub fn new(workers: Vec<Arc<dyn Participant>>) -> Self {
        Self { workers }
    }

    fn worker(&self, name: &str) -> Option<&Arc<dyn Participant>> {
        self.workers.iter().find(|w| w.id() == name)
    }

    fn metadata() -> Vec<ToolMetadata> {
        vec![
            ToolMetadata::new(
                "list_agents",
                "List the agents you can delegate to, with their descriptions.",
            ),
            ToolMetadata::new(
                "execute_agent",
                "Run the named agent on a message and return everything it said.",
            )
            .with_parameter(
                ToolParameter::new("agent_name", ToolParameterType::String)
                    .with_description("Name of the agent, as returned by list_agents")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("initial_message", ToolParameterType::String)
                    .with_description("The task or question for the agent")
                    .required(),
            ),
        ]
    }

    async fn run_worker(
        worker: &Arc<dyn Participant>,
        initial_message: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let transcript = Transcript::seeded(initial_message);
        let mut stream = worker.respond(&transcript);
        let mut lines = Vec::new();
        while let Some(message) = stream.next().await {
            lines.push(message?.render());
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl ToolProtocol for AgentDirectoryProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match tool_name {
            "list_agents" => {
                let agents: Vec<JsonValue> = self
                    .workers
                    .iter()
                    .map(|w| serde_json::json!({ "name": w.id(), "description": w.description() }))
                    .collect();
                Ok(ToolResult::success(JsonValue::Array(agents)))
            }
            "execute_agent" => {
                let agent_name = parameters["agent_name"].as_str().ok_or_else(|| {
                    ToolError::InvalidParameters("agent_name must be a string".to_string())
                })?;
                let initial_message =
                    parameters["initial_message"].as_str().ok_or_else(|| {
                        ToolError::InvalidParameters(
                            "initial_message must be a string".to_string(),
                        )
                    })?;

                let Some(worker) = self.worker(agent_name) else {
                    return Ok(ToolResult::failure(format!(
                        "The specified agent does not exist: {}",
                        agent_name
                    )));
                };

                log::debug!("AgentDirectoryProtocol: delegating to '{}'", agent_name);
                match Self::run_worker(worker, initial_message).await {
                    Ok(output) => Ok(ToolResult::success(JsonValue::String(output))
                        .with_metadata("agent_name", JsonValue::String(agent_name.to_string()))),
                    Err(err) => Ok(ToolResult::failure(format!(
                        "Agent '{}' failed: {}",
                        agent_name, err
                    ))),
                }
            }
            other => Err(Box::new(ToolError::NotFound(other.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(Self::metadata())
    }

    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>> {
        Self::metadata()
            .into_iter()
            .find(|m| m.name == tool_name)
            .ok_or_else(|| {
                Box::new(ToolError::NotFound(tool_name.to_string()))
                    as Box<dyn Error + Send + Sync>
            })
    }

    fn protocol_name(&self) -> &str {
        "agent-directory"
    }
}
