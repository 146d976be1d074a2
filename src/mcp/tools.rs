//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::handlers::{
    GetCitationNetworkHandler, GetPaperHandler, SearchPapersHandler, SourceStatusHandler,
};
use crate::service::PaperService;

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_papers")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Register every tool against one shared service
    pub fn from_service(service: &PaperService) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };
        let sources_count = service.aggregator().registry().len();

        let paper_id_schema = serde_json::json!({
            "type": "object",
            "properties": {
                "paper_id": {
                    "type": "string",
                    "description": "Paper identifier: DOI, Semantic Scholar id, OpenAlex W-id, arXiv:..."
                },
                "doi": {
                    "type": "string",
                    "description": "Optional DOI hint used when the id is not native to a source"
                }
            },
            "required": ["paper_id"]
        });

        registry.register(Tool {
            name: "search_papers".to_string(),
            description: format!(
                "Search for papers across {} bibliographic sources; duplicates are merged. A DOI or paper id is looked up directly",
                sources_count
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query string"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of merged results",
                        "default": 10
                    }
                },
                "required": ["query"]
            }),
            handler: Arc::new(SearchPapersHandler {
                service: service.clone(),
            }),
        });

        registry.register(Tool {
            name: "get_paper".to_string(),
            description: "Get canonical metadata for a paper, with an open-access PDF link when one exists".to_string(),
            input_schema: paper_id_schema.clone(),
            handler: Arc::new(GetPaperHandler {
                service: service.clone(),
            }),
        });

        registry.register(Tool {
            name: "get_citation_network".to_string(),
            description: "Get the papers citing and cited by a paper (one hop)".to_string(),
            input_schema: paper_id_schema,
            handler: Arc::new(GetCitationNetworkHandler {
                service: service.clone(),
            }),
        });

        registry.register(Tool {
            name: "source_status".to_string(),
            description: "List configured sources, their health and cache statistics".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            handler: Arc::new(SourceStatusHandler {
                service: service.clone(),
            }),
        });

        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools
    pub fn all(&self) -> Vec<&Tool> {
        self.tools.values().collect()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}
