//! Document-store clients.
//!
//! Nodes talk to the database through the [`DocumentStore`] capability only:
//! - `CouchStore`: CouchDB / Cloudant over HTTP
//! - `MemStore`: in-memory store for testing and server-less runs
//!
//! Failures are classified into `NotFound`, `Unauthorized`, `Conflict` and
//! `Transport` so callers can tell a missing database from a broken link.

mod couch;
mod mem;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{Result, credentials::ConnectionCredentials};

pub use couch::{CouchConnector, CouchStore};
pub use mem::{MemConnector, MemStore};

/// A document as sent to / received from the store.
pub type Document = Map<String, Value>;

/// The operations the nodes need from a document database.
///
/// Every call is independent; implementations must allow concurrent calls
/// from many in-flight messages.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all databases on the server.
    async fn list_databases(&self) -> Result<Vec<String>>;

    /// Creates a database. Fails with `Conflict` if it already exists.
    async fn create_database(
        &self,
        name: &str,
    ) -> Result<()>;

    /// Fetches a document by id.
    async fn get(
        &self,
        db: &str,
        id: &str,
    ) -> Result<Value>;

    /// Inserts or updates a document, returning `{ok, id, rev}`.
    ///
    /// Fails with `NotFound` when the database does not exist.
    async fn insert(
        &self,
        db: &str,
        doc: &Document,
    ) -> Result<Value>;

    /// Deletes the given revision of a document.
    async fn destroy(
        &self,
        db: &str,
        id: &str,
        rev: &str,
    ) -> Result<Value>;

    /// Runs a Mango query (`{selector, ...}`), returning `{docs: [...]}`.
    async fn find(
        &self,
        db: &str,
        query: &Document,
    ) -> Result<Value>;

    /// Queries a full-text search index, returning `{rows: [...]}`.
    async fn search(
        &self,
        db: &str,
        design: &str,
        index: &str,
        options: &Document,
    ) -> Result<Value>;

    /// Lists all documents, returning `{rows: [...]}`.
    async fn list(
        &self,
        db: &str,
        options: &Document,
    ) -> Result<Value>;
}

/// Opens a store client for resolved credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credentials: &ConnectionCredentials,
    ) -> Result<Arc<dyn DocumentStore>>;
}
