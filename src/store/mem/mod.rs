//! In-memory document store.
//!
//! Mirrors the CouchDB behaviour the nodes depend on: per-database
//! documents, `N-hash` revisions with conflict checks, Mango `find`,
//! `_all_docs` listing and a token based stand-in for search indexes.

mod selector;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::trace;

use crate::{CouchflowError, Result, ShareLock, credentials::ConnectionCredentials};

use super::{Connector, Document, DocumentStore};

type Database = BTreeMap<String, Document>;

const DESIGN_PREFIX: &str = "_design/";

/// Thread-safe in-memory store; clones share the same databases.
#[derive(Clone, Default)]
pub struct MemStore {
    dbs: ShareLock<HashMap<String, Database>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            dbs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live documents in `db`, `None` if it does not exist.
    pub fn doc_count(
        &self,
        db: &str,
    ) -> Option<usize> {
        self.read().ok()?.get(db).map(BTreeMap::len)
    }

    /// Drops a database, as an administrator would from outside.
    pub fn drop_database(
        &self,
        name: &str,
    ) -> Result<()> {
        self.write()?.remove(name).map(|_| ()).ok_or_else(|| CouchflowError::NotFound("Database does not exist.".to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Database>>> {
        self.dbs.read().map_err(|_| CouchflowError::Transport("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Database>>> {
        self.dbs.write().map_err(|_| CouchflowError::Transport("memory store lock poisoned".to_string()))
    }
}

fn missing_db() -> CouchflowError {
    CouchflowError::NotFound("Database does not exist.".to_string())
}

fn missing_doc() -> CouchflowError {
    CouchflowError::NotFound("missing".to_string())
}

fn next_rev(current: Option<&str>) -> String {
    let generation = current.and_then(|rev| rev.split_once('-')).and_then(|(n, _)| n.parse::<u64>().ok()).unwrap_or(0);
    format!("{}-{}", generation + 1, uuid::Uuid::new_v4().simple())
}

fn rev_of(doc: &Document) -> Option<&str> {
    doc.get("_rev").and_then(Value::as_str)
}

fn usize_option(
    options: &Document,
    key: &str,
) -> Option<usize> {
    options.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

/// Render a field value the way search tokens are written.
fn token_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `field:value` terms must all match; a bare term matches any field.
fn search_matches(
    doc: &Document,
    query: &str,
) -> bool {
    query.split_whitespace().filter(|term| !matches!(*term, "AND" | "&&")).all(|term| match term.split_once(':') {
        Some((field, expected)) => {
            let expected = expected.trim_matches('"');
            doc.get(field).is_some_and(|v| expected == "*" || token_value(v) == expected)
        }
        None => doc.values().any(|v| token_value(v) == term.trim_matches('"')),
    })
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_database(
        &self,
        name: &str,
    ) -> Result<()> {
        trace!("mem::create_database({})", name);
        let mut dbs = self.write()?;
        if dbs.contains_key(name) {
            return Err(CouchflowError::Conflict("The database could not be created, the file already exists.".to_string()));
        }
        dbs.insert(name.to_string(), Database::new());
        Ok(())
    }

    async fn get(
        &self,
        db: &str,
        id: &str,
    ) -> Result<Value> {
        let dbs = self.read()?;
        let database = dbs.get(db).ok_or_else(missing_db)?;
        database.get(id).map(|doc| Value::Object(doc.clone())).ok_or_else(missing_doc)
    }

    async fn insert(
        &self,
        db: &str,
        doc: &Document,
    ) -> Result<Value> {
        trace!("mem::insert({})", db);
        let mut dbs = self.write()?;
        let database = dbs.get_mut(db).ok_or_else(missing_db)?;

        let id = match doc.get("_id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(CouchflowError::Transport(format!("status 400: bad_request: Document id must be a string, got {}", other))),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };

        let current = database.get(&id).and_then(rev_of);
        if current != rev_of(doc) {
            return Err(CouchflowError::Conflict("conflict: Document update conflict.".to_string()));
        }

        let rev = next_rev(current);
        let mut stored = doc.clone();
        stored.insert("_id".to_string(), Value::String(id.clone()));
        stored.insert("_rev".to_string(), Value::String(rev.clone()));

        if stored.get("_deleted").and_then(Value::as_bool).unwrap_or(false) {
            database.remove(&id);
        } else {
            database.insert(id.clone(), stored);
        }

        Ok(json!({"ok": true, "id": id, "rev": rev}))
    }

    async fn destroy(
        &self,
        db: &str,
        id: &str,
        rev: &str,
    ) -> Result<Value> {
        trace!("mem::destroy({}, {})", db, id);
        let mut dbs = self.write()?;
        let database = dbs.get_mut(db).ok_or_else(missing_db)?;
        let current = database.get(id).ok_or_else(missing_doc)?;
        if rev_of(current) != Some(rev) {
            return Err(CouchflowError::Conflict("conflict: Document update conflict.".to_string()));
        }

        database.remove(id);
        Ok(json!({"ok": true, "id": id, "rev": next_rev(Some(rev))}))
    }

    async fn find(
        &self,
        db: &str,
        query: &Document,
    ) -> Result<Value> {
        let selector = query.get("selector").and_then(Value::as_object).ok_or_else(|| CouchflowError::Transport("status 400: bad_request: selector must be an object".to_string()))?;

        let dbs = self.read()?;
        let database = dbs.get(db).ok_or_else(missing_db)?;

        let fields: Option<Vec<&str>> = query.get("fields").and_then(Value::as_array).map(|f| f.iter().filter_map(Value::as_str).collect());
        let skip = usize_option(query, "skip").unwrap_or(0);
        let limit = usize_option(query, "limit").unwrap_or(usize::MAX);

        let docs: Vec<Value> = database
            .iter()
            .filter(|(id, _)| !id.starts_with(DESIGN_PREFIX))
            .map(|(_, doc)| Value::Object(doc.clone()))
            .filter(|doc| selector::matches(doc, selector))
            .skip(skip)
            .take(limit)
            .map(|doc| match (&fields, doc) {
                (Some(fields), Value::Object(map)) => Value::Object(map.into_iter().filter(|(k, _)| fields.contains(&k.as_str())).collect()),
                (_, doc) => doc,
            })
            .collect();

        Ok(json!({ "docs": docs }))
    }

    async fn search(
        &self,
        db: &str,
        _design: &str,
        _index: &str,
        options: &Document,
    ) -> Result<Value> {
        let query = options.get("query").or_else(|| options.get("q")).map(token_value).unwrap_or_default();
        let include_docs = options.get("include_docs").and_then(Value::as_bool).unwrap_or(false);
        let limit = usize_option(options, "limit").unwrap_or(25);

        let dbs = self.read()?;
        let database = dbs.get(db).ok_or_else(missing_db)?;

        let matched: Vec<&Document> = database.iter().filter(|(id, _)| !id.starts_with(DESIGN_PREFIX)).map(|(_, doc)| doc).filter(|doc| search_matches(doc, &query)).collect();

        let rows: Vec<Value> = matched
            .iter()
            .take(limit)
            .map(|doc| {
                let mut row = json!({ "id": doc.get("_id"), "order": [1.0, 0], "fields": {} });
                if include_docs {
                    row["doc"] = Value::Object((*doc).clone());
                }
                row
            })
            .collect();

        Ok(json!({ "total_rows": matched.len(), "rows": rows }))
    }

    async fn list(
        &self,
        db: &str,
        options: &Document,
    ) -> Result<Value> {
        let include_docs = options.get("include_docs").and_then(Value::as_bool).unwrap_or(false);
        let descending = options.get("descending").and_then(Value::as_bool).unwrap_or(false);
        let skip = usize_option(options, "skip").unwrap_or(0);
        let limit = usize_option(options, "limit").unwrap_or(usize::MAX);

        let dbs = self.read()?;
        let database = dbs.get(db).ok_or_else(missing_db)?;

        let to_row = |(id, doc): (&String, &Document)| {
            let mut row = json!({ "id": id, "key": id, "value": { "rev": rev_of(doc) } });
            if include_docs {
                row["doc"] = Value::Object(doc.clone());
            }
            row
        };
        let rows: Vec<Value> = if descending {
            database.iter().rev().skip(skip).take(limit).map(to_row).collect()
        } else {
            database.iter().skip(skip).take(limit).map(to_row).collect()
        };

        Ok(json!({ "total_rows": database.len(), "offset": skip, "rows": rows }))
    }
}

/// Hands every node the same shared [`MemStore`].
#[derive(Clone, Default)]
pub struct MemConnector {
    store: MemStore,
}

impl MemConnector {
    pub fn new(store: MemStore) -> Self {
        Self {
            store,
        }
    }

    pub fn store(&self) -> MemStore {
        self.store.clone()
    }
}

#[async_trait]
impl Connector for MemConnector {
    async fn connect(
        &self,
        _credentials: &ConnectionCredentials,
    ) -> Result<Arc<dyn DocumentStore>> {
        Ok(Arc::new(self.store.clone()))
    }
}
