//! MCP server handler.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::Value;
use sift_client::DomainRegistry;

use crate::{ToolRegistry, create_sift_tools};

const INSTRUCTIONS: &str = "Search, ingestion and event tools for one or more domains. \
Call list_domains to see which domains are configured; every other tool takes an optional \
`domain` and otherwise uses the default domain. Authentication is handled by the server.";

const CREDENTIAL_HINT: &str = "The API rejected this domain's credential. Check its API key \
and scopes with auth_status, or call clear_auth_tokens to force new tokens.";

/// Serves the sift tools over MCP.
#[derive(Clone)]
pub struct SiftServer {
    tools: Arc<ToolRegistry>,
}

impl SiftServer {
    #[must_use]
    pub fn new(domains: &Arc<DomainRegistry>) -> Self {
        Self::with_tools(create_sift_tools(domains))
    }

    #[must_use]
    pub fn with_tools(tools: ToolRegistry) -> Self {
        Self {
            tools: Arc::new(tools),
        }
    }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Runs one tool call.
    ///
    /// Bad arguments are protocol errors; a failed downstream call is a
    /// successful response flagged as an error, so the model can read it.
    ///
    /// # Errors
    ///
    /// Returns `invalid_params` for an unknown tool or invalid arguments.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<CallToolResult, ErrorData> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ErrorData::invalid_params(format!("Unknown tool: '{name}'"), None))?;

        log::info!("Executing tool '{name}'");

        match tool.execute(&args).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) if e.is_invalid_input() => {
                log::debug!("Rejected arguments for tool '{name}': {e}");
                Err(ErrorData::invalid_params(e.to_string(), None))
            }
            Err(e) => {
                log::warn!("Tool '{name}' failed: {e}");
                let message = if e.is_credential_rejected() {
                    format!("{e}\n{CREDENTIAL_HINT}")
                } else {
                    e.to_string()
                };
                Ok(CallToolResult::error(vec![Content::text(message)]))
            }
        }
    }
}

impl ServerHandler for SiftServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sift".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(
            self.tools.get_all_definitions(),
        ))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = request.arguments.map_or(Value::Null, Value::Object);
        self.dispatch(&request.name, args).await
    }
}
