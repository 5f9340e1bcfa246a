use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use sift_client::DomainRegistry;
use sift_client::ingestion::{Document, DocumentTarget};

use crate::{ToolError, ToolImplementation, definition, parse_args};

/// Source, entity and locale of the addressed document.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct TargetParams {
    /// Ingestion source; defaults to the domain's configured source
    #[serde(default)]
    pub source_id: Option<String>,
    /// Entity type, default `content`
    #[serde(default)]
    pub entity: Option<String>,
    /// Locale such as `en_us`
    #[serde(default)]
    pub locale: Option<String>,
}

impl TargetParams {
    fn to_target(&self) -> Result<DocumentTarget, ToolError> {
        Ok(DocumentTarget {
            source_id: self.source_id.clone(),
            entity: self.entity.clone(),
            locale: self.locale.as_deref().map(str::parse).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DocumentParams {
    /// Document id
    pub document_id: String,
    /// Attribute values of the document
    pub fields: Map<String, Value>,
    #[serde(flatten)]
    pub target: TargetParams,
    /// Domain to write to; defaults to the configured default domain
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DocumentRefParams {
    /// Document id
    pub document_id: String,
    #[serde(flatten)]
    pub target: TargetParams,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IngestionStatusParams {
    /// Incremental update id returned by a document operation
    pub update_id: String,
    #[serde(flatten)]
    pub target: TargetParams,
    #[serde(default)]
    pub domain: Option<String>,
}

pub struct CreateDocumentTool {
    domains: Arc<DomainRegistry>,
}

impl CreateDocumentTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for CreateDocumentTool {
    fn get_definition(&self) -> Tool {
        definition::<DocumentParams>(
            "create_document",
            "Create a document in a domain's ingestion source.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: DocumentParams = parse_args(args)?;
        let target = params.target.to_target()?;
        let document = Document::new(params.document_id, params.fields);

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain.ingestion().create_document(&target, &document).await?)
    }
}

pub struct UpdateDocumentTool {
    domains: Arc<DomainRegistry>,
}

impl UpdateDocumentTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for UpdateDocumentTool {
    fn get_definition(&self) -> Tool {
        definition::<DocumentParams>(
            "update_document",
            "Replace a document's fields. Fields not given are removed.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: DocumentParams = parse_args(args)?;
        let target = params.target.to_target()?;
        let document = Document::new(params.document_id, params.fields);

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain.ingestion().update_document(&target, &document).await?)
    }
}

pub struct PatchDocumentTool {
    domains: Arc<DomainRegistry>,
}

impl PatchDocumentTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for PatchDocumentTool {
    fn get_definition(&self) -> Tool {
        definition::<DocumentParams>(
            "patch_document",
            "Update only the given fields of a document.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: DocumentParams = parse_args(args)?;
        let target = params.target.to_target()?;

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain
            .ingestion()
            .patch_document(&target, &params.document_id, &params.fields)
            .await?)
    }
}

pub struct DeleteDocumentTool {
    domains: Arc<DomainRegistry>,
}

impl DeleteDocumentTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for DeleteDocumentTool {
    fn get_definition(&self) -> Tool {
        definition::<DocumentRefParams>("delete_document", "Delete a document.")
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: DocumentRefParams = parse_args(args)?;
        let target = params.target.to_target()?;

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain
            .ingestion()
            .delete_document(&target, &params.document_id)
            .await?)
    }
}

pub struct IngestionStatusTool {
    domains: Arc<DomainRegistry>,
}

impl IngestionStatusTool {
    #[must_use]
    pub const fn new(domains: Arc<DomainRegistry>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl ToolImplementation for IngestionStatusTool {
    fn get_definition(&self) -> Tool {
        definition::<IngestionStatusParams>(
            "get_ingestion_status",
            "Check the status of an incremental update returned by a document operation.",
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let params: IngestionStatusParams = parse_args(args)?;
        let target = params.target.to_target()?;

        let domain = self.domains.get(params.domain.as_deref())?;
        Ok(domain
            .ingestion()
            .update_status(&target, &params.update_id)
            .await?)
    }
}
