//! # sift-client
//!
//! Clients for the search, ingestion and event APIs of one or more tenant
//! domains.
//!
//! Each domain gets a [`DomainClient`] bundling an [`AuthManager`], which
//! turns the domain's API key into the right `Authorization` header, and the
//! three API clients that use it. [`DomainRegistry`] holds one per configured
//! domain.
//!
//! ## Example
//!
//! ```no_run
//! use sift_client::DomainRegistry;
//! use sift_client::search::SearchQuery;
//! use sift_common::SiftConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SiftConfig::load(None)?;
//! let registry = DomainRegistry::from_config(&config)?;
//!
//! let domain = registry.get(None)?;
//! let query = SearchQuery::builder()
//!     .keyphrase("running shoes")
//!     .widget_id("rfkid_7")
//!     .build();
//! let results = domain.search().search(&query).await?;
//! println!("{results}");
//! # Ok(())
//! # }
//! ```

use reqwest_middleware::ClientWithMiddleware;
use sift_common::DomainConfig;

pub mod auth;
pub mod error;
pub mod events;
pub mod http;
pub mod ingestion;
pub mod registry;
pub mod search;

pub use auth::{AuthManager, AuthOptions, AuthStatus};
pub use error::{AuthError, ClientError};
pub use events::EventsClient;
pub use ingestion::IngestionClient;
pub use registry::DomainRegistry;
pub use search::SearchClient;

/// Everything needed to talk to one domain.
#[derive(Debug, Clone)]
pub struct DomainClient {
    config: DomainConfig,
    auth: AuthManager,
    search: SearchClient,
    ingestion: IngestionClient,
    events: EventsClient,
}

impl DomainClient {
    /// Builds the session manager and API clients for `config`.
    ///
    /// All three API clients share the same manager, so one token serves
    /// every request to the domain.
    #[must_use]
    pub fn new(config: DomainConfig, http: ClientWithMiddleware) -> Self {
        let auth = AuthManager::for_domain(&config, http.clone());
        let search = SearchClient::new(&config, http.clone(), auth.clone());
        let ingestion = IngestionClient::new(&config, http.clone(), auth.clone());
        let events = EventsClient::new(&config, http, auth.clone());

        Self {
            config,
            auth,
            search,
            ingestion,
            events,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    #[must_use]
    pub const fn config(&self) -> &DomainConfig {
        &self.config
    }

    #[must_use]
    pub const fn auth(&self) -> &AuthManager {
        &self.auth
    }

    #[must_use]
    pub const fn search(&self) -> &SearchClient {
        &self.search
    }

    #[must_use]
    pub const fn ingestion(&self) -> &IngestionClient {
        &self.ingestion
    }

    #[must_use]
    pub const fn events(&self) -> &EventsClient {
        &self.events
    }
}
