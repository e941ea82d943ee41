//! `herald-publish` — platform adapters behind one [`PlatformPublisher`] contract.
//!
//! | Adapter                  | Family      | Shape                                          |
//! |--------------------------|-------------|------------------------------------------------|
//! | [`FeedPublisher`]        | `facebook`  | text / photo / video call, album via uploads   |
//! | [`StagedMediaPublisher`] | `instagram` | create container → wait until ready → publish  |
//!
//! HTTP goes through the [`GraphTransport`] seam so adapters can be exercised
//! without a network.

pub mod error;
pub mod feed;
pub mod poll;
pub mod publisher;
pub mod readiness;
pub mod registry;
pub mod staged;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{PublishError, Result};
pub use feed::FeedPublisher;
pub use poll::{poll_until, PollError, PollPolicy, PollStep};
pub use publisher::{PlatformPublisher, PublishRequest};
pub use readiness::{ContainerStatus, ReadinessPoller};
pub use registry::PublisherRegistry;
pub use staged::StagedMediaPublisher;
pub use transport::{GraphClient, GraphTransport};
