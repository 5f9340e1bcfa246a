//! Tools that inspect the configured domains and their token sessions
//! without calling any API.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use sift_client::DomainRegistry;

use crate::{ToolError, ToolImplementation, definition, parse_args};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDomainsParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DomainParams {
    /// Domain id; defaults to the configured default domain
    #[serde(default)]
    pub domain: Option<String>,
}

pub struct ListDomainsTool {
    domains: Arc<DomainRegistry>,
}

impl ListDomainsTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for ListDomainsTool {
    fn get_definition(&self) -> Tool {
        definition::<ListDomainsParams>(
            "list_domains",
            "List the configured domains, their scopes and which one is the default.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let _: ListDomainsParams = parse_args(args)?;
        let default = self.domains.default_domain_id();

        let domains: Vec<Value> = self
            .domains
            .domains()
            .iter()
            .map(|client| {
                let config = client.config();
                json!({
                    "id": config.id,
                    "name": config.display_name(),
                    "scopes": config.scopes.names(),
                    "source_id": config.source_id,
                    "has_api_key": client.auth().has_api_key(),
                    "default": default == Some(config.id.as_str()),
                })
            })
            .collect();

        Ok(json!({ "domains": domains }))
    }
}

pub struct AuthStatusTool {
    domains: Arc<DomainRegistry>,
}

impl AuthStatusTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for AuthStatusTool {
    fn get_definition(&self) -> Tool {
        definition::<DomainParams>(
            "auth_status",
            "Show whether a domain holds tokens and which of them are still valid.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: DomainParams = parse_args(args)?;
        let domain = self.domains.get(params.domain.as_deref())?;
        let auth = domain.auth();

        let mode = if !auth.has_api_key() {
            "none"
        } else if auth.options().scopes.is_ingestion_only() {
            "api_key"
        } else {
            "bearer"
        };

        Ok(json!({
            "domain": domain.id(),
            "mode": mode,
            "scopes": auth.options().scopes.names(),
            "status": auth.status().await,
        }))
    }
}

pub struct ClearAuthTokensTool {
    domains: Arc<DomainRegistry>,
}

impl ClearAuthTokensTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for ClearAuthTokensTool {
    fn get_definition(&self) -> Tool {
        definition::<DomainParams>(
            "clear_auth_tokens",
            "Discard a domain's stored tokens so the next request generates new ones.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: DomainParams = parse_args(args)?;
        let domain = self.domains.get(params.domain.as_deref())?;
        domain.auth().clear().await;

        Ok(json!({ "domain": domain.id(), "cleared": true }))
    }
}
