use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use sift_client::DomainRegistry;
use sift_client::search::{
    DEFAULT_ENTITY, RecommendationQuery, RequestContext, SearchQuery, Sort, SuggestionQuery,
};

use crate::{ToolError, ToolImplementation, definition, parse_args};

/// Page and locale shared by search-style tools.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ContextParams {
    /// Locale such as `en_us`
    #[serde(default)]
    pub locale: Option<String>,
    /// URI of the page the request is made from
    #[serde(default)]
    pub page_uri: Option<String>,
}

impl ContextParams {
    pub(crate) fn to_context(&self) -> Result<RequestContext, ToolError> {
        Ok(RequestContext {
            page_uri: self.page_uri.clone(),
            locale: self.locale.as_deref().map(str::parse).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Keyphrase to search for; empty to browse
    #[serde(default)]
    pub query: String,
    /// Search widget id (`rfk_id`)
    pub widget_id: String,
    /// Entity to search, default `content`
    #[serde(default)]
    pub entity: Option<String>,
    /// Results per page, 1 to 100 (default 10)
    #[serde(default)]
    pub limit: Option<u32>,
    /// Results to skip
    #[serde(default)]
    pub offset: Option<u32>,
    /// Sort attributes as `name` or `name:desc`
    #[serde(default)]
    pub sort: Vec<String>,
    /// Filter expression, passed through unchanged
    #[serde(default)]
    pub filter: Option<Value>,
    /// Facet types to return
    #[serde(default)]
    pub facets: Vec<String>,
    #[serde(flatten)]
    pub context: ContextParams,
    /// Domain to query; defaults to the configured default domain
    #[serde(default)]
    pub domain: Option<String>,
}

pub struct SearchTool {
    domains: Arc<DomainRegistry>,
}

impl SearchTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for SearchTool {
    fn get_definition(&self) -> Tool {
        definition::<SearchParams>(
            "search",
            "Search a domain's content through a search widget. Supports paging, sorting, filters and facets.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: SearchParams = parse_args(args)?;
        let sort = params
            .sort
            .iter()
            .map(|s| s.parse::<Sort>())
            .collect::<Result<Vec<_>, _>>()?;

        let query = SearchQuery {
            keyphrase: params.query,
            widget_id: params.widget_id,
            entity: params.entity.unwrap_or_else(|| DEFAULT_ENTITY.to_string()),
            limit: params.limit.unwrap_or(10),
            offset: params.offset.unwrap_or(0),
            sort,
            filter: params.filter,
            facets: params.facets,
            context: params.context.to_context()?,
        };

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain.search().search(&query).await?)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SuggestionParams {
    /// Partial keyphrase to complete
    pub query: String,
    /// Search widget id (`rfk_id`)
    pub widget_id: String,
    #[serde(default)]
    pub entity: Option<String>,
    /// Suggestion block configured on the widget, default `title_context_aware`
    #[serde(default)]
    pub suggestion_name: Option<String>,
    /// Maximum suggestions, 1 to 100 (default 5)
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(flatten)]
    pub context: ContextParams,
    #[serde(default)]
    pub domain: Option<String>,
}

pub struct SuggestionsTool {
    domains: Arc<DomainRegistry>,
}

impl SuggestionsTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for SuggestionsTool {
    fn get_definition(&self) -> Tool {
        definition::<SuggestionParams>(
            "search_suggestions",
            "Get keyphrase suggestions (autocomplete) for a partial query.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: SuggestionParams = parse_args(args)?;
        let mut query = SuggestionQuery::builder()
            .keyphrase(params.query)
            .widget_id(params.widget_id)
            .context(params.context.to_context()?)
            .build();
        if let Some(entity) = params.entity {
            query.entity = entity;
        }
        if let Some(name) = params.suggestion_name {
            query.suggestion_name = name;
        }
        if let Some(max) = params.max {
            query.max = max;
        }

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain.search().suggestions(&query).await?)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecommendationParams {
    /// Recommendation widget id (`rfk_id`)
    pub widget_id: String,
    #[serde(default)]
    pub entity: Option<String>,
    /// Recommendations to return, 1 to 100 (default 10)
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(flatten)]
    pub context: ContextParams,
    #[serde(default)]
    pub domain: Option<String>,
}

pub struct RecommendationsTool {
    domains: Arc<DomainRegistry>,
}

impl RecommendationsTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for RecommendationsTool {
    fn get_definition(&self) -> Tool {
        definition::<RecommendationParams>(
            "get_recommendations",
            "Get recommendations from a recommendation widget, optionally for a page.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: RecommendationParams = parse_args(args)?;
        let query = RecommendationQuery {
            widget_id: params.widget_id,
            entity: params.entity.unwrap_or_else(|| DEFAULT_ENTITY.to_string()),
            limit: params.limit.unwrap_or(10),
            filter: params.filter,
            context: params.context.to_context()?,
        };

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain.search().recommendations(&query).await?)
    }
}
