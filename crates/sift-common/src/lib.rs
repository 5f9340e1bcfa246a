//! # sift-common
//!
//! Shared types for the sift workspace.
//!
//! - [`Scope`] / [`ScopeSet`]: capability scopes a domain's API key was issued for
//! - [`SiftConfig`] / [`DomainConfig`]: per-domain connection settings and the
//!   loaders that read them from a file or the environment
//!
//! ## Example
//!
//! ```
//! use sift_common::{Scope, ScopeSet};
//!
//! let scopes: ScopeSet = "discover,event".parse().unwrap();
//! assert!(scopes.contains(Scope::Discover));
//! assert!(!scopes.is_ingestion_only());
//! ```

/// Per-domain configuration and loading.
pub mod config;
/// Configuration error type.
pub mod error;
/// Capability scopes.
pub mod scope;

pub use config::{
    DEFAULT_ACCESS_TOKEN_LIFETIME_MS, DEFAULT_REFRESH_TOKEN_LIFETIME_MS, DomainConfig, Settings,
    SiftConfig,
};
pub use error::ConfigError;
pub use scope::{Scope, ScopeSet};
