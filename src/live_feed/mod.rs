//! Live-feed ingestion: provider polling, key rotation, normalization and
//! snapshot publishing.

pub mod client;
pub mod credentials;
pub mod models;
pub mod normalizer;
pub mod provider;
pub mod scheduler;
pub mod store;
pub mod timing;

pub use client::SportClient;
pub use credentials::CredentialPool;
pub use models::{NormalizedMatch, Snapshot, Sport};
pub use provider::{ApiSportsHttp, ApiTransport};
pub use scheduler::{FavoritesCleanup, RefreshScheduler, SchedulerSettings};
pub use store::SnapshotStore;
