//! Per-tenant client registry.

use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use sift_common::SiftConfig;

use crate::DomainClient;
use crate::error::ClientError;
use crate::http::build_http_client;

/// All configured domains, each with its own session manager.
///
/// Domains share one HTTP client; token state is never shared between them.
#[derive(Debug)]
pub struct DomainRegistry {
    domains: DashMap<String, Arc<DomainClient>>,
    /// Domain ids in configuration order
    order: Vec<String>,
    default_domain: Option<String>,
}

impl DomainRegistry {
    /// Builds a client for every configured domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SiftConfig) -> Result<Self, ClientError> {
        let http = build_http_client(&config.settings)?;
        let domains = DashMap::new();
        let mut order = Vec::with_capacity(config.domains.len());

        for domain in &config.domains {
            info!(
                "Registering domain '{}' with scopes [{}]",
                domain.id, domain.scopes
            );
            domains.insert(
                domain.id.clone(),
                Arc::new(DomainClient::new(domain.clone(), http.clone())),
            );
            order.push(domain.id.clone());
        }

        Ok(Self {
            domains,
            order,
            default_domain: config.default_domain_id().map(str::to_string),
        })
    }

    /// Looks up a domain by id, or the default domain when `id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownDomain`] if no such domain exists.
    pub fn get(&self, id: Option<&str>) -> Result<Arc<DomainClient>, ClientError> {
        let id = id
            .filter(|id| !id.trim().is_empty())
            .or(self.default_domain.as_deref())
            .ok_or_else(|| ClientError::UnknownDomain("no domains configured".to_string()))?;

        self.domains
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ClientError::UnknownDomain(id.to_string()))
    }

    #[must_use]
    pub fn default_domain_id(&self) -> Option<&str> {
        self.default_domain.as_deref()
    }

    /// Domain ids in configuration order.
    #[must_use]
    pub fn domain_ids(&self) -> &[String] {
        &self.order
    }

    /// Every domain client, in configuration order.
    #[must_use]
    pub fn domains(&self) -> Vec<Arc<DomainClient>> {
        self.order
            .iter()
            .filter_map(|id| self.domains.get(id).map(|entry| Arc::clone(entry.value())))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
