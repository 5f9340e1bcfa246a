//! Events API client.
//!
//! Events are published to `POST {events_url}/event/{domain}/v4/publish` as a
//! name/action pair plus a visitor id and page context.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::{Map, Value, json};
use sift_common::DomainConfig;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::auth::AuthManager;
use crate::error::ClientError;
use crate::http::{endpoint_url, send_json};
use crate::search::{DEFAULT_ENTITY, RequestContext, require_non_empty};

/// What happened, as the events API names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// An entity page was viewed
    View,
    /// A widget item was clicked
    Click,
    /// A search was run from a widget
    Search,
    AddToCart,
    Order,
    /// Any other name/action pair
    Custom { name: String, action: String },
}

impl EventKind {
    /// Names accepted by [`EventKind::from_str`].
    pub const KNOWN: [&'static str; 5] = ["view", "click", "search", "add_to_cart", "order"];

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::View => "entity_page",
            Self::Click | Self::Search => "widget",
            Self::AddToCart => "cart",
            Self::Order => "order",
            Self::Custom { name, .. } => name,
        }
    }

    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::View => "view",
            Self::Click => "click",
            Self::Search => "search",
            Self::AddToCart => "add",
            Self::Order => "confirm",
            Self::Custom { action, .. } => action,
        }
    }
}

impl FromStr for EventKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Self::View),
            "click" => Ok(Self::Click),
            "search" => Ok(Self::Search),
            "add_to_cart" | "add-to-cart" => Ok(Self::AddToCart),
            "order" => Ok(Self::Order),
            other => Err(ClientError::InvalidRequest(format!(
                "Unknown event type '{other}', expected one of: {}",
                Self::KNOWN.join(", ")
            ))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.action())
    }
}

/// An event to publish.
///
/// ```
/// use sift_client::events::{Event, EventKind};
///
/// let event = Event::builder()
///     .kind(EventKind::View)
///     .entity_ids(vec!["doc-1".to_string()])
///     .build();
/// assert!(event.visitor_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Event {
    pub kind: EventKind,
    /// Visitor identifier; a random one is generated when absent
    #[builder(default, setter(strip_option, into))]
    pub visitor_id: Option<String>,
    #[builder(default)]
    pub context: RequestContext,
    #[builder(default = DEFAULT_ENTITY.to_string(), setter(into))]
    pub entity: String,
    /// Entities the event refers to
    #[builder(default)]
    pub entity_ids: Vec<String>,
    /// Widget the event came from, for click and search events
    #[builder(default, setter(strip_option, into))]
    pub widget_id: Option<String>,
    /// Extra attributes merged into the event value
    #[builder(default)]
    pub extra: Map<String, Value>,
}

impl Event {
    fn validate(&self) -> Result<(), ClientError> {
        if let EventKind::Custom { name, action } = &self.kind {
            require_non_empty("event name", name)?;
            require_non_empty("event action", action)?;
        }
        if let Some(visitor_id) = &self.visitor_id {
            require_non_empty("visitor_id", visitor_id)?;
        }
        self.entity_ids
            .iter()
            .try_for_each(|id| require_non_empty("entity id", id))
    }

    fn to_body(&self, visitor_id: &str, client_time_ms: i64) -> Value {
        let mut value = self.extra.clone();
        value.insert("context".to_string(), self.context.to_value());
        if !self.entity_ids.is_empty() {
            let entities: Vec<Value> = self
                .entity_ids
                .iter()
                .map(|id| json!({ "entity_type": self.entity, "id": id }))
                .collect();
            value.insert("entities".to_string(), Value::Array(entities));
        }
        if let Some(widget_id) = &self.widget_id {
            value.insert("rfk_id".to_string(), json!(widget_id));
        }

        json!({
            "name": self.kind.name(),
            "action": self.kind.action(),
            "uuid": visitor_id,
            "client_time_ms": client_time_ms,
            "value": value,
        })
    }
}

/// Outcome of a publish, including the visitor id actually sent.
#[derive(Debug, Clone, Serialize)]
pub struct EventReceipt {
    pub visitor_id: String,
    pub response: Value,
}

/// Client for one domain's events endpoint.
#[derive(Debug, Clone)]
pub struct EventsClient {
    http: ClientWithMiddleware,
    auth: AuthManager,
    base_url: String,
    domain_id: String,
}

impl EventsClient {
    #[must_use]
    pub fn new(domain: &DomainConfig, http: ClientWithMiddleware, auth: AuthManager) -> Self {
        Self {
            http,
            auth,
            base_url: domain.events_url.clone(),
            domain_id: domain.id.clone(),
        }
    }

    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is invalid or the request fails.
    pub async fn publish(&self, event: &Event) -> Result<EventReceipt, ClientError> {
        event.validate()?;

        let visitor_id = event
            .visitor_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = event.to_body(&visitor_id, Utc::now().timestamp_millis());

        log::debug!(
            "Publishing {} event for visitor {visitor_id} in domain '{}'",
            event.kind,
            self.domain_id
        );

        let url = endpoint_url(
            &self.base_url,
            &["event", self.domain_id.as_str(), "v4", "publish"],
        )?;
        let headers = self.auth.auth_headers().await;

        let builder = self
            .http
            .post(url)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body)?);

        let response = send_json(builder, "Publish event").await?;
        Ok(EventReceipt {
            visitor_id,
            response,
        })
    }
}
