use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sift_client::DomainRegistry;
use sift_client::events::{Event, EventKind};
use sift_client::search::DEFAULT_ENTITY;

use crate::search::ContextParams;
use crate::{ToolError, ToolImplementation, definition, parse_args};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TrackEventParams {
    /// One of `view`, `click`, `search`, `add_to_cart`, `order`, or `custom`
    pub event_type: String,
    /// Event name, required for `custom`
    #[serde(default)]
    pub name: Option<String>,
    /// Event action, required for `custom`
    #[serde(default)]
    pub action: Option<String>,
    /// Visitor id; a random one is generated when absent
    #[serde(default)]
    pub visitor_id: Option<String>,
    /// Ids of the entities the event refers to
    #[serde(default)]
    pub entity_ids: Vec<String>,
    /// Entity type of `entity_ids`, default `content`
    #[serde(default)]
    pub entity: Option<String>,
    /// Widget the event came from
    #[serde(default)]
    pub widget_id: Option<String>,
    /// Extra attributes merged into the event value
    #[serde(default)]
    pub extra: Map<String, Value>,
    #[serde(flatten)]
    pub context: ContextParams,
    #[serde(default)]
    pub domain: Option<String>,
}

impl TrackEventParams {
    fn kind(&self) -> Result<EventKind, ToolError> {
        if self.event_type.trim() != "custom" {
            return Ok(self.event_type.parse()?);
        }

        match (&self.name, &self.action) {
            (Some(name), Some(action)) => Ok(EventKind::Custom {
                name: name.clone(),
                action: action.clone(),
            }),
            _ => Err(ToolError::InvalidArguments(
                "custom events need both name and action".to_string(),
            )),
        }
    }
}

pub struct TrackEventTool {
    domains: Arc<DomainRegistry>,
}

impl TrackEventTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for TrackEventTool {
    fn get_definition(&self) -> Tool {
        definition::<TrackEventParams>(
            "track_event",
            "Publish a visitor event (view, click, search, add_to_cart, order or custom).",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: TrackEventParams = parse_args(args)?;
        let event = Event {
            kind: params.kind()?,
            visitor_id: params.visitor_id,
            context: params.context.to_context()?,
            entity: params.entity.unwrap_or_else(|| DEFAULT_ENTITY.to_string()),
            entity_ids: params.entity_ids,
            widget_id: params.widget_id,
            extra: params.extra,
        };

        let domain = self.domains.get(params.domain.as_deref())?;
        let receipt = domain.events().publish(&event).await?;

        Ok(json!({
            "event": event.kind.to_string(),
            "visitor_id": receipt.visitor_id,
            "response": receipt.response,
        }))
    }
}
