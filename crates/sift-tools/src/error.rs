use sift_client::ClientError;
use thiserror::Error;

/// Failure of a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments did not match the tool's input schema.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The downstream API call failed, or the client rejected the request.
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ToolError {
    /// Whether the caller supplied bad input, as opposed to the call failing.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidArguments(_)
                | Self::Client(ClientError::InvalidRequest(_) | ClientError::UnknownDomain(_))
        )
    }

    /// Whether the API refused the domain's credential.
    #[must_use]
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_authentication_error())
    }
}
