//! # Couchflow
//!
//! Couchflow provides flow nodes that read and write documents in a
//! CouchDB / Cloudant database, together with a small async host to run them.
//!
//! ## Core Features
//!
//! - **Document writer**: insert, update by selector and delete, creating the database on demand
//! - **Document reader**: fetch by id, full-text index search, list all and selector queries
//! - **Credential resolution**: manual connection nodes or platform service bindings (`VCAP_SERVICES`)
//! - **Pluggable stores**: CouchDB over HTTP, or an in-memory store for tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use couchflow::{EngineBuilder, Message, NodeModel};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let node = NodeModel::from_json(r#"{"id": "w1", "uses": "cloudant_out", "config": {"operation": "insert", "database": "orders", "service": "my-cloudant"}}"#)?;
//! engine.deploy(&node)?;
//! engine.send("w1", Message::new(serde_json::json!({"item": "book"})))?;
//! ```

mod builder;
mod common;
mod config;
mod engine;
mod error;
mod utils;

pub mod credentials;
pub mod events;
pub mod model;
pub mod nodes;
pub mod runtime;
pub mod store;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::{Config, CouchConfig, StoreConfig, StoreType};
pub use engine::Engine;
pub use error::CouchflowError;
pub use model::*;
pub use runtime::{ChannelEvent, ChannelOptions};

/// Result type alias for Couchflow operations.
pub type Result<T> = std::result::Result<T, CouchflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
