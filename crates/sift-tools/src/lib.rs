//! # sift-tools
//!
//! MCP tools over the sift search, ingestion and event clients.
//!
//! ## Core Components
//!
//! - [`ToolImplementation`]: Trait for one tool, its definition and execution logic
//! - [`ToolRegistry`]: Thread-safe registry of tools by name
//! - [`SiftServer`]: MCP server handler dispatching calls to the registry
//!
//! ## Tools
//!
//! | Tool                   | API       |
//! |------------------------|-----------|
//! | `search`               | search    |
//! | `search_suggestions`   | search    |
//! | `get_recommendations`  | search    |
//! | `create_document`      | ingestion |
//! | `update_document`      | ingestion |
//! | `patch_document`       | ingestion |
//! | `delete_document`      | ingestion |
//! | `get_ingestion_status` | ingestion |
//! | `track_event`          | events    |
//! | `list_domains`         | local     |
//! | `auth_status`          | local     |
//! | `clear_auth_tokens`    | local     |
//!
//! Every tool except `list_domains` takes an optional `domain`; when absent
//! the default domain is used.
//!
//! ## Thread Safety
//!
//! The [`ToolRegistry`] uses `DashMap` for concurrent access, making it safe to use
//! from multiple async tasks without additional synchronization.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rmcp::model::{JsonObject, Tool};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sift_client::DomainRegistry;

mod documents;
mod domains;
mod error;
mod events;
mod search;
mod server;

pub use documents::{
    CreateDocumentTool, DeleteDocumentTool, IngestionStatusTool, PatchDocumentTool,
    UpdateDocumentTool,
};
pub use domains::{AuthStatusTool, ClearAuthTokensTool, ListDomainsTool};
pub use error::ToolError;
pub use events::TrackEventTool;
pub use search::{RecommendationsTool, SearchTool, SuggestionsTool};
pub use server::SiftServer;

#[async_trait]
pub trait ToolImplementation: Send + Sync {
    fn get_definition(&self) -> Tool;

    async fn execute(&self, args: &Value) -> Result<Value, ToolError>;
}

pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn ToolImplementation>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, tool: Arc<dyn ToolImplementation>) {
        let name = tool.get_definition().name.to_string();
        self.tools.insert(name, tool);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.tools.get(name).map(|r| r.value().clone())
    }

    /// Definitions of every registered tool, sorted by name.
    #[must_use]
    pub fn get_all_definitions(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|t| t.get_definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }
}

/// Registers every sift tool against `domains`.
#[must_use]
pub fn create_sift_tools(domains: &Arc<DomainRegistry>) -> ToolRegistry {
    let registry = ToolRegistry::new();
    let tools: [Arc<dyn ToolImplementation>; 12] = [
        Arc::new(SearchTool::new(Arc::clone(domains))),
        Arc::new(SuggestionsTool::new(Arc::clone(domains))),
        Arc::new(RecommendationsTool::new(Arc::clone(domains))),
        Arc::new(CreateDocumentTool::new(Arc::clone(domains))),
        Arc::new(UpdateDocumentTool::new(Arc::clone(domains))),
        Arc::new(PatchDocumentTool::new(Arc::clone(domains))),
        Arc::new(DeleteDocumentTool::new(Arc::clone(domains))),
        Arc::new(IngestionStatusTool::new(Arc::clone(domains))),
        Arc::new(TrackEventTool::new(Arc::clone(domains))),
        Arc::new(ListDomainsTool::new(Arc::clone(domains))),
        Arc::new(AuthStatusTool::new(Arc::clone(domains))),
        Arc::new(ClearAuthTokensTool::new(Arc::clone(domains))),
    ];
    for tool in tools {
        registry.register(tool);
    }
    registry
}

/// Builds a tool definition whose input schema is derived from `P`.
fn definition<P: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    Tool::new(name, description, Arc::new(input_schema::<P>()))
}

fn input_schema<P: JsonSchema>() -> JsonObject {
    match serde_json::to_value(schemars::schema_for!(P)) {
        Ok(Value::Object(mut schema)) => {
            schema.remove("$schema");
            schema
        }
        _ => JsonObject::new(),
    }
}

fn parse_args<P: DeserializeOwned>(args: &Value) -> Result<P, ToolError> {
    // Clients may omit arguments entirely for tools with no required fields
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
