use herald_core::{HeraldError, PostStatus};
use thiserror::Error;

/// Errors raised by the scheduler's persistence collaborators.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Post not found: {id}")]
    PostNotFound { id: String },

    #[error("Client not found: {id}")]
    ClientNotFound { id: String },

    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    /// The lifecycle forbids the requested status change.
    #[error("Post {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: PostStatus,
    },

    /// Cancellation is only legal before the scheduler claims a post.
    #[error("Post {id} is {status} and can no longer be cancelled")]
    NotCancellable { id: String, status: String },

    /// The post violates a data-model invariant and was not stored.
    #[error("Invalid post: {0}")]
    InvalidPost(String),

    /// A stored row could not be decoded.
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("Credential unavailable for {id}: {reason}")]
    CredentialUnavailable { id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] HeraldError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
