//! Crowd Safety - live-state engine for mass-gathering crowd management
//!
//! Provides the in-process core behind the visitor and volunteer clients:
//! - Observable state streams for zones, heat grid, tasks, incidents and more
//! - A periodic simulation that keeps the demo state moving
//! - SOS handling with delayed escalation, and priority reservations
//! - Mirrors of remote document collections (events, lost people, presence)
//! - HTTP clients for the crowd counter and a weather API
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Services                    │
//! │   (built once at startup, passed around)     │
//! └──────┬───────────────────────────┬───────────┘
//!        │                           │
//!        ▼                           ▼
//! ┌──────────────────┐      ┌──────────────────┐
//! │ CrowdRepository  │      │ Event / Lost /   │
//! │ streams, ticks,  │      │ Presence mirrors │
//! │ SOS, reservations│      └────────┬─────────┘
//! └──────┬───────────┘               │
//!        │                           ▼
//!        ▼                  ┌──────────────────┐
//! ┌──────────────────┐      │  DocumentStore   │
//! │  TaskScheduler   │      │ (Firestore REST  │
//! │ (delayed checks) │      │  or in-memory)   │
//! └──────────────────┘      └──────────────────┘
//! ```

pub mod clients;
pub mod context;
pub mod mirror;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod simulation;
pub mod stream;

// Re-export main types for convenience
pub use clients::{ClientError, CrowdFeedClient, CrowdFeedConfig, WeatherClient, WeatherConfig, WeatherInfo};
pub use context::Services;
pub use mirror::{
    Decoded, DocumentStore, EventMirror, FirestoreConfig, FirestoreDocumentStore, LostPersonMirror,
    MemoryDocumentStore, MirrorError, MirrorState, PresenceMirror, StoreError, WriteHandle,
};
pub use models::*;
pub use repository::CrowdRepository;
pub use scheduler::{ScheduledTask, TaskScheduler};
pub use simulation::SimulationConfig;
pub use stream::{StateStream, Subscription};
