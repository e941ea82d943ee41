//! `herald-scheduler` — claims due posts and drives them to a terminal status.
//!
//! # Overview
//!
//! Every tick the [`Scheduler`] asks the [`PostStore`] for posts whose
//! `scheduled_at` has passed, claims them in one all-or-nothing batch
//! (`scheduled` → `processing`), re-checks the owning client through the
//! [`ClientGate`] and hands each post to the [`PublishDispatcher`]. The
//! aggregate status and per-target results are written back with
//! [`PostStore::finalize`].
//!
//! # Lifecycle
//!
//! | From         | To                                   | Who                |
//! |--------------|--------------------------------------|--------------------|
//! | `pending`    | `scheduled` / terminal               | authoring flow     |
//! | `scheduled`  | `processing`                         | atomic batch claim |
//! | `processing` | `published` / `partial` / `failed`   | finalize           |
//!
//! A post that cannot be finalized stays in `processing`; it is reported on
//! startup and never re-queued.

pub mod db;
pub mod directory;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod store;

pub use directory::{ClientGate, ConnectionDirectory, CredentialStore, SqliteDirectory};
pub use dispatcher::{Dispatch, PublishDispatcher};
pub use engine::{Scheduler, TickOutcome, TickReport};
pub use error::{Result, SchedulerError};
pub use store::{ClaimOutcome, PostStore, SqlitePostStore};
