//! Ingestion API client: document create, update, patch and delete, plus
//! incremental update status.

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{Map, Value, json};
use sift_common::DomainConfig;
use typed_builder::TypedBuilder;
use url::Url;

use crate::auth::AuthManager;
use crate::error::ClientError;
use crate::http::{endpoint_url, send_json};
use crate::search::{DEFAULT_ENTITY, Locale, require_non_empty};

/// Where a document lives: source, entity and optional locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct DocumentTarget {
    /// Ingestion source; falls back to the domain's configured source
    #[builder(default, setter(strip_option, into))]
    pub source_id: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub entity: Option<String>,
    #[builder(default, setter(strip_option))]
    pub locale: Option<Locale>,
}

/// A document and its attribute values.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    fn validate(&self) -> Result<(), ClientError> {
        require_non_empty("document id", &self.id)?;
        require_fields(&self.fields)
    }
}

fn require_fields(fields: &Map<String, Value>) -> Result<(), ClientError> {
    if fields.is_empty() {
        return Err(ClientError::InvalidRequest(
            "Document fields must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Client for one domain's ingestion endpoint.
#[derive(Debug, Clone)]
pub struct IngestionClient {
    http: ClientWithMiddleware,
    auth: AuthManager,
    base_url: String,
    domain_id: String,
    default_source: Option<String>,
}

impl IngestionClient {
    #[must_use]
    pub fn new(domain: &DomainConfig, http: ClientWithMiddleware, auth: AuthManager) -> Self {
        Self {
            http,
            auth,
            base_url: domain.ingestion_url.clone(),
            domain_id: domain.id.clone(),
            default_source: domain.source_id.clone(),
        }
    }

    /// Creates a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or target is invalid or the request
    /// fails.
    pub async fn create_document(
        &self,
        target: &DocumentTarget,
        document: &Document,
    ) -> Result<Value, ClientError> {
        document.validate()?;
        let url = self.url(target, &["documents"])?;
        let body = json!({ "document": { "id": document.id, "fields": document.fields } });
        self.send(Method::POST, url, Some(&body), "Create document")
            .await
    }

    /// Replaces a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or target is invalid or the request
    /// fails.
    pub async fn update_document(
        &self,
        target: &DocumentTarget,
        document: &Document,
    ) -> Result<Value, ClientError> {
        document.validate()?;
        let url = self.url(target, &["documents", document.id.as_str()])?;
        let body = json!({ "document": { "id": document.id, "fields": document.fields } });
        self.send(Method::PUT, url, Some(&body), "Update document")
            .await
    }

    /// Updates only the given fields of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the id, fields or target are invalid or the
    /// request fails.
    pub async fn patch_document(
        &self,
        target: &DocumentTarget,
        document_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value, ClientError> {
        require_non_empty("document id", document_id)?;
        require_fields(fields)?;
        let url = self.url(target, &["documents", document_id])?;
        let body = json!({ "document": { "fields": fields } });
        self.send(Method::PATCH, url, Some(&body), "Patch document")
            .await
    }

    /// Deletes a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the id or target is invalid or the request fails.
    pub async fn delete_document(
        &self,
        target: &DocumentTarget,
        document_id: &str,
    ) -> Result<Value, ClientError> {
        require_non_empty("document id", document_id)?;
        let url = self.url(target, &["documents", document_id])?;
        self.send(Method::DELETE, url, None, "Delete document").await
    }

    /// Fetches the status of an incremental update returned by a previous
    /// document operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the id or target is invalid or the request fails.
    pub async fn update_status(
        &self,
        target: &DocumentTarget,
        update_id: &str,
    ) -> Result<Value, ClientError> {
        require_non_empty("update id", update_id)?;
        let url = self.url(target, &["incremental-updates", update_id])?;
        self.send(Method::GET, url, None, "Ingestion status").await
    }

    fn url(&self, target: &DocumentTarget, tail: &[&str]) -> Result<Url, ClientError> {
        let source = target
            .source_id
            .as_deref()
            .or(self.default_source.as_deref())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ClientError::InvalidRequest(format!(
                    "No source id given and domain '{}' has none configured",
                    self.domain_id
                ))
            })?;
        let entity = target.entity.as_deref().unwrap_or(DEFAULT_ENTITY);
        require_non_empty("entity", entity)?;

        let mut segments = vec![
            "ingestion",
            "v1",
            "domains",
            self.domain_id.as_str(),
            "sources",
            source,
            "entities",
            entity,
        ];
        segments.extend_from_slice(tail);

        let mut url = endpoint_url(&self.base_url, &segments)?;
        if let Some(locale) = &target.locale {
            url.query_pairs_mut()
                .append_pair("locale", &locale.to_string());
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        operation: &str,
    ) -> Result<Value, ClientError> {
        log::debug!("{operation}: {method} {}", url.path());
        let headers = self.auth.auth_headers().await;

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_string(body)?);
        }

        send_json(builder, operation).await
    }
}
