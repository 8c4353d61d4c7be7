//! Store double and context helpers for node tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{runtime::Handle, sync::broadcast};

use crate::{
    CouchflowError, Result,
    events::{Event, Report},
    runtime::{Channel, Context},
    store::{Document, DocumentStore, MemStore},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    ListDatabases,
    CreateDatabase(String),
    Get(String, String),
    Insert(String),
    Destroy(String, String, String),
    Find(String, Document),
    Search(String, String, String, Document),
    List(String, Document),
}

#[derive(Default)]
struct Script {
    calls: Mutex<Vec<Call>>,
    inserted: Mutex<Vec<Document>>,
    list_error: Mutex<Option<CouchflowError>>,
    read_error: Mutex<Option<CouchflowError>>,
    always_missing: AtomicBool,
}

/// [`MemStore`] wrapper recording every call, with failure injection.
#[derive(Clone, Default)]
pub(crate) struct ScriptedStore {
    inner: MemStore,
    script: Arc<Script>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inner(&self) -> &MemStore {
        &self.inner
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.script.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.script.calls.lock().unwrap().clear();
    }

    /// Documents passed to `insert`, in call order.
    pub(crate) fn inserted(&self) -> Vec<Document> {
        self.script.inserted.lock().unwrap().clone()
    }

    pub(crate) fn clear_inserted(&self) {
        self.script.inserted.lock().unwrap().clear();
    }

    pub(crate) fn fail_list(
        &self,
        err: CouchflowError,
    ) {
        *self.script.list_error.lock().unwrap() = Some(err);
    }

    /// `get`, `find`, `search` and `list` fail with `err`.
    pub(crate) fn fail_reads(
        &self,
        err: CouchflowError,
    ) {
        *self.script.read_error.lock().unwrap() = Some(err);
    }

    /// Every insert reports a missing database.
    pub(crate) fn always_missing(&self) {
        self.script.always_missing.store(true, Ordering::SeqCst);
    }

    fn record(
        &self,
        call: Call,
    ) {
        self.script.calls.lock().unwrap().push(call);
    }

    fn read_error(&self) -> Result<()> {
        match self.script.read_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        self.record(Call::ListDatabases);
        if let Some(err) = self.script.list_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.inner.list_databases().await
    }

    async fn create_database(
        &self,
        name: &str,
    ) -> Result<()> {
        self.record(Call::CreateDatabase(name.to_string()));
        self.inner.create_database(name).await
    }

    async fn get(
        &self,
        db: &str,
        id: &str,
    ) -> Result<Value> {
        self.record(Call::Get(db.to_string(), id.to_string()));
        self.read_error()?;
        self.inner.get(db, id).await
    }

    async fn insert(
        &self,
        db: &str,
        doc: &Document,
    ) -> Result<Value> {
        self.record(Call::Insert(db.to_string()));
        self.script.inserted.lock().unwrap().push(doc.clone());
        if self.script.always_missing.load(Ordering::SeqCst) {
            return Err(CouchflowError::NotFound("Database does not exist.".to_string()));
        }
        self.inner.insert(db, doc).await
    }

    async fn destroy(
        &self,
        db: &str,
        id: &str,
        rev: &str,
    ) -> Result<Value> {
        self.record(Call::Destroy(db.to_string(), id.to_string(), rev.to_string()));
        self.inner.destroy(db, id, rev).await
    }

    async fn find(
        &self,
        db: &str,
        query: &Document,
    ) -> Result<Value> {
        self.record(Call::Find(db.to_string(), query.clone()));
        self.read_error()?;
        self.inner.find(db, query).await
    }

    async fn search(
        &self,
        db: &str,
        design: &str,
        index: &str,
        options: &Document,
    ) -> Result<Value> {
        self.record(Call::Search(db.to_string(), design.to_string(), index.to_string(), options.clone()));
        self.read_error()?;
        self.inner.search(db, design, index, options).await
    }

    async fn list(
        &self,
        db: &str,
        options: &Document,
    ) -> Result<Value> {
        self.record(Call::List(db.to_string(), options.clone()));
        self.read_error()?;
        self.inner.list(db, options).await
    }
}

/// A node context on the current runtime and a receiver of its reports.
pub(crate) fn test_context() -> (Arc<Context>, broadcast::Receiver<Event<Report>>) {
    let channel = Arc::new(Channel::new(Handle::current()));
    let reports = channel.subscribe_reports();
    (Arc::new(Context::new("node1".to_string(), channel)), reports)
}

/// Reports emitted so far.
pub(crate) fn drain_reports(rx: &mut broadcast::Receiver<Event<Report>>) -> Vec<Report> {
    let mut reports = Vec::new();
    while let Ok(event) = rx.try_recv() {
        reports.push(event.inner().clone());
    }
    reports
}
