//! Encore Core
//!
//! Platform-agnostic domain types, error handling and collaborator traits
//! shared by the Encore playback engine and its host applications.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Track`, `TrackId`, `RepeatMode`, `QueueContext`
//! - **Collaborator Traits**: `TrackResolver`, `QueueProvider`,
//!   `PlayHistorySink`, `PositionStore`, `Notifier`, `PlatformHooks`
//! - **Error Handling**: Unified `CoreError` and `Result` types
//!
//! Everything the playback engine consumes but does not implement (catalog
//! lookups, signed stream URLs, toasts, wake locks) is expressed here as a
//! trait so hosts can plug in their own integrations.
//!
//! # Example
//!
//! ```rust
//! use encore_core::types::{Track, TrackId};
//! use std::time::Duration;
//!
//! let track = Track::new(TrackId::new("t1"), "Intro", "Band", "audio/t1.mp3")
//!     .with_album("Debut")
//!     .with_duration_hint(Duration::from_secs(212));
//!
//! assert!(track.playable_url.is_none());
//! let resolved = track.with_playable_url("https://cdn.example/t1?sig=abc");
//! assert_eq!(resolved.playable_url.as_deref(), Some("https://cdn.example/t1?sig=abc"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use traits::{
    NoopHistorySink, NoopNotifier, NoopPlatformHooks, NoopPositionStore, Notice, NoticeKind,
    Notifier, PlatformHooks, PlayHistorySink, PositionStore, QueueProvider, TrackResolver,
};
pub use types::{QueueContext, RepeatMode, Track, TrackId};
