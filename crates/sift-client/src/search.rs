//! Search API client: widget search, suggestions and recommendations.
//!
//! Every request is a `POST {search_url}/discover/v2/{domain}` carrying a
//! `context` (page, locale) and a single widget item.

use std::fmt;
use std::str::FromStr;

use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sift_common::DomainConfig;
use typed_builder::TypedBuilder;

use crate::auth::AuthManager;
use crate::error::ClientError;
use crate::http::{endpoint_url, send_json};

/// Largest page size the search API accepts.
pub const MAX_LIMIT: u32 = 100;

/// Entity searched when none is given.
pub const DEFAULT_ENTITY: &str = "content";

/// A locale such as `en_us`, sent as separate language and country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub country: String,
    pub language: String,
}

impl FromStr for Locale {
    type Err = ClientError;

    /// Accepts `en_us`, `en-US` and similar.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (language, country) = s
            .trim()
            .split_once(['_', '-'])
            .filter(|(l, c)| !l.is_empty() && !c.is_empty())
            .ok_or_else(|| {
                ClientError::InvalidRequest(format!(
                    "Invalid locale '{s}', expected language and country such as 'en_us'"
                ))
            })?;

        Ok(Self {
            country: country.to_lowercase(),
            language: language.to_lowercase(),
        })
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.language, self.country)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort on one attribute, written `name` or `name:desc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub name: String,
    pub order: SortOrder,
}

impl FromStr for Sort {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, order) = match s.trim().split_once(':') {
            Some((name, "asc")) => (name, SortOrder::Asc),
            Some((name, "desc")) => (name, SortOrder::Desc),
            Some((_, other)) => {
                return Err(ClientError::InvalidRequest(format!(
                    "Invalid sort order '{other}', expected 'asc' or 'desc'"
                )));
            }
            None => (s.trim(), SortOrder::Asc),
        };

        if name.is_empty() {
            return Err(ClientError::InvalidRequest(
                "Sort attribute must not be empty".to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            order,
        })
    }
}

/// Page and locale the request is made from.
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct RequestContext {
    #[builder(default, setter(strip_option, into))]
    pub page_uri: Option<String>,
    #[builder(default, setter(strip_option))]
    pub locale: Option<Locale>,
}

impl RequestContext {
    pub(crate) fn to_value(&self) -> Value {
        let mut context = Map::new();
        if let Some(uri) = &self.page_uri {
            context.insert("page".to_string(), json!({ "uri": uri }));
        }
        if let Some(locale) = &self.locale {
            context.insert("locale".to_string(), json!(locale));
        }
        Value::Object(context)
    }
}

/// A widget search.
///
/// ```
/// use sift_client::search::SearchQuery;
///
/// let query = SearchQuery::builder()
///     .keyphrase("running shoes")
///     .widget_id("rfkid_7")
///     .limit(20)
///     .build();
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct SearchQuery {
    #[builder(setter(into))]
    pub keyphrase: String,
    #[builder(setter(into))]
    pub widget_id: String,
    #[builder(default = DEFAULT_ENTITY.to_string(), setter(into))]
    pub entity: String,
    #[builder(default = 10)]
    pub limit: u32,
    #[builder(default)]
    pub offset: u32,
    #[builder(default)]
    pub sort: Vec<Sort>,
    /// Filter expression passed through as-is
    #[builder(default, setter(strip_option))]
    pub filter: Option<Value>,
    /// Facet types to return
    #[builder(default)]
    pub facets: Vec<String>,
    #[builder(default)]
    pub context: RequestContext,
}

impl SearchQuery {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for an empty widget id or
    /// entity, or a limit outside `1..=100`.
    pub fn validate(&self) -> Result<(), ClientError> {
        require_non_empty("widget_id", &self.widget_id)?;
        require_non_empty("entity", &self.entity)?;
        validate_limit(self.limit)
    }

    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut search = json!({
            "content": {},
            "query": { "keyphrase": self.keyphrase },
            "limit": self.limit,
            "offset": self.offset,
        });

        if !self.sort.is_empty() {
            search["sort"] = json!({ "value": self.sort });
        }
        if let Some(filter) = &self.filter {
            search["filter"] = filter.clone();
        }
        if !self.facets.is_empty() {
            let types: Vec<Value> = self.facets.iter().map(|f| json!({ "name": f })).collect();
            search["facet"] = json!({ "types": types });
        }

        widget_body(&self.context, &self.entity, &self.widget_id, "search", search)
    }
}

/// Autocomplete suggestions for a partial keyphrase.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct SuggestionQuery {
    #[builder(setter(into))]
    pub keyphrase: String,
    #[builder(setter(into))]
    pub widget_id: String,
    #[builder(default = DEFAULT_ENTITY.to_string(), setter(into))]
    pub entity: String,
    /// Name of the suggestion block configured on the widget
    #[builder(default = "title_context_aware".to_string(), setter(into))]
    pub suggestion_name: String,
    #[builder(default = 5)]
    pub max: u32,
    #[builder(default)]
    pub context: RequestContext,
}

impl SuggestionQuery {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for an empty keyphrase, widget
    /// id or suggestion name, or a `max` outside `1..=100`.
    pub fn validate(&self) -> Result<(), ClientError> {
        require_non_empty("keyphrase", &self.keyphrase)?;
        require_non_empty("widget_id", &self.widget_id)?;
        require_non_empty("suggestion_name", &self.suggestion_name)?;
        validate_limit(self.max)
    }

    #[must_use]
    pub fn to_body(&self) -> Value {
        let search = json!({
            "query": { "keyphrase": self.keyphrase },
            "suggestion": [{ "name": self.suggestion_name, "max": self.max }],
        });
        widget_body(&self.context, &self.entity, &self.widget_id, "search", search)
    }
}

/// Recommendations from a recommendation widget.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct RecommendationQuery {
    #[builder(setter(into))]
    pub widget_id: String,
    #[builder(default = DEFAULT_ENTITY.to_string(), setter(into))]
    pub entity: String,
    #[builder(default = 10)]
    pub limit: u32,
    #[builder(default, setter(strip_option))]
    pub filter: Option<Value>,
    #[builder(default)]
    pub context: RequestContext,
}

impl RecommendationQuery {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for an empty widget id or a
    /// limit outside `1..=100`.
    pub fn validate(&self) -> Result<(), ClientError> {
        require_non_empty("widget_id", &self.widget_id)?;
        require_non_empty("entity", &self.entity)?;
        validate_limit(self.limit)
    }

    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut recommendations = json!({
            "content": {},
            "limit": self.limit,
        });
        if let Some(filter) = &self.filter {
            recommendations["filter"] = filter.clone();
        }
        widget_body(
            &self.context,
            &self.entity,
            &self.widget_id,
            "recommendations",
            recommendations,
        )
    }
}

fn widget_body(
    context: &RequestContext,
    entity: &str,
    widget_id: &str,
    kind: &str,
    payload: Value,
) -> Value {
    let mut item = Map::new();
    item.insert("entity".to_string(), json!(entity));
    item.insert("rfk_id".to_string(), json!(widget_id));
    item.insert(kind.to_string(), payload);

    json!({
        "context": context.to_value(),
        "widget": { "items": [item] },
    })
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::InvalidRequest(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn validate_limit(limit: u32) -> Result<(), ClientError> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ClientError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

/// Client for one domain's search endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: ClientWithMiddleware,
    auth: AuthManager,
    base_url: String,
    domain_id: String,
}

impl SearchClient {
    #[must_use]
    pub fn new(domain: &DomainConfig, http: ClientWithMiddleware, auth: AuthManager) -> Self {
        Self {
            http,
            auth,
            base_url: domain.search_url.clone(),
            domain_id: domain.id.clone(),
        }
    }

    /// Runs a widget search.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the request fails.
    pub async fn search(&self, query: &SearchQuery) -> Result<Value, ClientError> {
        query.validate()?;
        log::debug!(
            "Searching '{}' on widget {} in domain '{}'",
            query.keyphrase,
            query.widget_id,
            self.domain_id
        );
        self.send(&query.to_body(), "Search").await
    }

    /// Fetches keyphrase suggestions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the request fails.
    pub async fn suggestions(&self, query: &SuggestionQuery) -> Result<Value, ClientError> {
        query.validate()?;
        self.send(&query.to_body(), "Suggestions").await
    }

    /// Fetches recommendations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the request fails.
    pub async fn recommendations(&self, query: &RecommendationQuery) -> Result<Value, ClientError> {
        query.validate()?;
        self.send(&query.to_body(), "Recommendations").await
    }

    /// Sends a hand-built request body unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON object or the request fails.
    pub async fn raw(&self, body: &Value) -> Result<Value, ClientError> {
        if !body.is_object() {
            return Err(ClientError::InvalidRequest(
                "Request body must be a JSON object".to_string(),
            ));
        }
        self.send(body, "Search").await
    }

    async fn send(&self, body: &Value, operation: &str) -> Result<Value, ClientError> {
        let url = endpoint_url(&self.base_url, &["discover", "v2", self.domain_id.as_str()])?;
        let headers = self.auth.auth_headers().await;

        let builder = self
            .http
            .post(url)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(body)?);

        send_json(builder, operation).await
    }
}
