//! `herald-core` — shared data model, lifecycle rules and configuration for
//! the herald publishing scheduler.

pub mod config;
pub mod error;
pub mod types;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use types::{
    Client, ClientId, ConnectionId, Credential, DuePost, MediaKind, MediaRef, PlatformConnection,
    PlatformKind, Post, PostId, PostStatus, ResultsMap, TargetResult,
};
