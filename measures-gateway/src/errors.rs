use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors that can occur while serving a gateway request
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Parameter '{0}' is required")]
    MissingParameter(&'static str),

    #[error("{0}")]
    UpstreamRequestFailed(String),

    #[error("Upstream timeout after {0}s")]
    UpstreamTimeout(u64),

    #[error("Failed to parse SonarQube response")]
    InvalidUpstreamResponse(#[source] serde_json::Error),

    #[error("Failed to read upstream body: {0}")]
    UpstreamBody(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Status code returned to the caller when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamRequestFailed(_) | GatewayError::UpstreamTimeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::InvalidUpstreamResponse(_)
            | GatewayError::UpstreamBody(_)
            | GatewayError::InternalError(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::UpstreamRequestFailed(e.to_string())
    }
}

impl From<http::Error> for GatewayError {
    fn from(e: http::Error) -> Self {
        GatewayError::InternalError(format!("Failed to build response: {e}"))
    }
}
