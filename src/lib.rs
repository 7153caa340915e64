//! # Forkwiki
//!
//! Subject-rooted fork trees for a collaborative, wiki-like repository
//! platform. Many users keep their own fork of an article; the engine keeps
//! exactly one canonical root per subject, bounds and renders the fork tree,
//! caches per-branch contributor statistics and resolves who may edit what.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forkwiki::config::ServerConfig;
//! use forkwiki::server::{AppState, create_router};
//! use forkwiki::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), &config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `forkwiki` binary. Disable with `default-features = false`.

pub mod access;
pub mod config;
pub mod error;
pub mod fork;
pub mod graph;
pub mod server;
pub mod stats;
pub mod store;
pub mod subject;
pub mod types;
