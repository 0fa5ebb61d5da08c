use thiserror::Error;

/// Type alias for Result with LabelerError
pub type Result<T> = std::result::Result<T, LabelerError>;

/// Error types for the labeling pipeline
///
/// Model errors (`ModelUnavailable`, `InvalidLabel`) are recovered inside the
/// classifier by falling back to the keyword rules. Everything that comes from
/// the mailbox is surfaced to the run loop, which skips the affected message.
#[derive(Error, Debug)]
pub enum LabelerError {
    /// The text-generation backend could not produce a response
    /// (connection refused, timeout, non-success status, malformed body)
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model answered, but the answer is not a known category
    #[error("Invalid label from model: {0:?}")]
    InvalidLabel(String),

    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error talking to the mailbox (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409), e.g. a label with that name already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label list/create/modify failures
    #[error("Label error: {0}")]
    LabelError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LabelerError {
    /// Check if the error is transient and the mailbox call may be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LabelerError::RateLimitExceeded { .. }
                | LabelerError::ServerError { .. }
                | LabelerError::NetworkError(_)
        )
    }

    /// Errors the classifier recovers from by running the fallback rules
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            LabelerError::ModelUnavailable(_) | LabelerError::InvalidLabel(_)
        )
    }

    /// Errors originating from the mailbox; the run loop logs these and
    /// moves on to the next message
    pub fn is_mailbox_error(&self) -> bool {
        matches!(
            self,
            LabelerError::ApiError(_)
                | LabelerError::RateLimitExceeded { .. }
                | LabelerError::NetworkError(_)
                | LabelerError::ServerError { .. }
                | LabelerError::MessageNotFound(_)
                | LabelerError::BadRequest(_)
                | LabelerError::Forbidden(_)
                | LabelerError::Conflict(_)
                | LabelerError::InvalidMessageFormat(_)
                | LabelerError::LabelError(_)
        )
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// Accepts either delay-seconds ("120") or an HTTP-date. Falls back to
/// 5 seconds when the header is missing, malformed, or already in the past.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|at| at.duration_since(std::time::SystemTime::now()).ok())
        .map(|wait| wait.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for LabelerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => LabelerError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => LabelerError::MessageNotFound("Resource not found".to_string()),
                    400 => LabelerError::BadRequest(message),
                    403 => LabelerError::Forbidden(message),
                    409 => LabelerError::Conflict(message),
                    500..=599 => LabelerError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => LabelerError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => LabelerError::BadRequest(err.to_string()),
            google_gmail1::Error::HttpError(ref err) => {
                LabelerError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => LabelerError::NetworkError(err.to_string()),
            _ => LabelerError::ApiError(error.to_string()),
        }
    }
}

impl From<reqwest::Error> for LabelerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LabelerError::ModelUnavailable(format!("request timed out: {}", error))
        } else if error.is_decode() {
            LabelerError::ModelUnavailable(format!("malformed response: {}", error))
        } else {
            LabelerError::ModelUnavailable(error.to_string())
        }
    }
}
