use herald_core::TargetResult;
use thiserror::Error;

/// Everything that can go wrong while publishing a post to one target.
///
/// None of these abort a whole post: the dispatcher turns each into a failed
/// [`TargetResult`] via [`PublishError::into_target_result`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    #[error("Connection is inactive: {id}")]
    ConnectionInactive { id: String },

    #[error("Connection lookup failed: {0}")]
    Lookup(String),

    #[error("Credential unavailable: {0}")]
    Credential(String),

    #[error("{platform} connection is missing its {field}")]
    MissingIdentifier {
        platform: &'static str,
        field: &'static str,
    },

    #[error("No publisher registered for platform {0}")]
    UnsupportedPlatform(String),

    #[error("{platform} requires at least one media item")]
    MediaRequired { platform: &'static str },

    #[error("Carousel accepts at most {max} items, got {count}")]
    CarouselTooLarge { count: usize, max: usize },

    /// 4xx/5xx from the platform. `message` is the platform's own text.
    #[error("Platform rejected request ({status}): {message}")]
    Platform { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected platform response: {0}")]
    UnexpectedResponse(String),

    #[error("Container {container_id} reported {status}")]
    ContainerFailed {
        container_id: String,
        status: String,
    },

    #[error("Container {container_id} not ready after {attempts} checks")]
    ReadinessTimeout { container_id: String, attempts: u32 },

    #[error("Publish cancelled")]
    Cancelled,

    #[error("Publish exceeded its {secs}s deadline")]
    DeadlineExceeded { secs: u64 },
}

impl PublishError {
    /// Short error code string recorded next to the message in target results.
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::ConnectionNotFound { .. } => "CONNECTION_NOT_FOUND",
            PublishError::ConnectionInactive { .. } => "CONNECTION_INACTIVE",
            PublishError::Lookup(_) => "LOOKUP_FAILED",
            PublishError::Credential(_) => "CREDENTIAL_UNAVAILABLE",
            PublishError::MissingIdentifier { .. } => "MISSING_IDENTIFIER",
            PublishError::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            PublishError::MediaRequired { .. } => "MEDIA_REQUIRED",
            PublishError::CarouselTooLarge { .. } => "CAROUSEL_TOO_LARGE",
            PublishError::Platform { .. } => "PLATFORM_REJECTED",
            PublishError::Http(_) => "HTTP_ERROR",
            PublishError::UnexpectedResponse(_) => "UNEXPECTED_RESPONSE",
            PublishError::ContainerFailed { .. } => "CONTAINER_ERROR",
            PublishError::ReadinessTimeout { .. } => "READINESS_TIMEOUT",
            PublishError::Cancelled => "CANCELLED",
            PublishError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
        }
    }

    pub fn into_target_result(self) -> TargetResult {
        TargetResult::failed(self.code(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;
