use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    CouchflowError, Result,
    credentials::ConnectionRef,
    model::{Message, PAYLOAD_KEY},
    nodes::{
        Connection, Node, NodeType,
        document::{coerce_to_document, is_truthy, normalize_database_name, parse_object, sanitize_document},
        warn_database_rename,
    },
    runtime::Context,
    store::{Document, DocumentStore},
};

use super::models::*;

/// Insert attempts before a missing database is reported.
pub const MAX_INSERT_ATTEMPTS: usize = 3;

const SELECTOR_KEY: &str = "selector";
const MSG_ROOT: &str = "msg";

/// Sink node inserting, updating and deleting documents.
pub struct DocumentWriter {
    config: WriterConfig,
    database: String,
    connection: Connection,
}

impl DocumentWriter {
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the database unless it is already listed.
    ///
    /// Credentials scoped to a single database may not list databases; the
    /// database is then assumed to exist.
    async fn ensure_database(
        &self,
        ctx: &Context,
        store: &dyn DocumentStore,
    ) {
        match store.list_databases().await {
            Ok(dbs) if dbs.iter().any(|db| db == &self.database) => {}
            Ok(_) => match store.create_database(&self.database).await {
                Ok(()) => info!("created database {}", self.database),
                Err(err) if err.is_conflict() => {}
                Err(err) => ctx.error(format!("Failed to create database '{}': {}", self.database, err), None),
            },
            Err(err) if err.is_unauthorized() => {
                debug!("cannot list databases ({}), assuming {} exists", err, self.database);
            }
            Err(err) => ctx.error(format!("Failed to list databases: {}", err), None),
        }
    }

    /// Message body per the `payonly` flag.
    fn body(
        &self,
        msg: &Message,
    ) -> Value {
        if self.config.payonly {
            msg.payload().cloned().unwrap_or(Value::Null)
        } else {
            msg.to_value()
        }
    }

    fn sanitize(
        &self,
        ctx: &Context,
        doc: Document,
    ) -> Document {
        let (doc, renamed) = sanitize_document(doc);
        for rename in renamed {
            ctx.warn(rename.to_string());
        }
        doc
    }

    async fn insert(
        &self,
        ctx: &Context,
        store: &dyn DocumentStore,
        msg: &Message,
    ) -> Result<()> {
        let root = if self.config.payonly {
            PAYLOAD_KEY
        } else {
            MSG_ROOT
        };
        let doc = self.sanitize(ctx, coerce_to_document(self.body(msg), root));

        let res = insert_document(store, &self.database, &doc).await?;
        debug!("inserted {} rev {} into {}", res["id"], res["rev"], self.database);
        Ok(())
    }

    /// Merge the message's object into every document matching its selector.
    async fn update(
        &self,
        ctx: &Context,
        store: &dyn DocumentStore,
        msg: &Message,
    ) -> Result<()> {
        let selector = match msg.get(SELECTOR_KEY) {
            Some(selector) => parse_object(selector.clone()),
            None => msg.payload().cloned().and_then(parse_object),
        }
        .ok_or_else(|| CouchflowError::Config("A selector is required to update documents: set msg.selector or send one as msg.payload".to_string()))?;

        let mut object = parse_object(self.body(msg)).ok_or_else(|| CouchflowError::Config("An object to merge is required to update documents".to_string()))?;
        if !self.config.payonly {
            object.remove(SELECTOR_KEY);
        }

        let mut query = Document::new();
        query.insert(SELECTOR_KEY.to_string(), Value::Object(selector.clone()));
        let found = store.find(&self.database, &query).await?;

        let target = object.get("_id").cloned();
        let matched: Vec<Document> = found
            .get("docs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .filter(|doc| target.as_ref().is_none_or(|id| doc.get("_id") == Some(id)))
            .cloned()
            .collect();

        if matched.is_empty() {
            ctx.warn(format!("No documents matched selector {}", Value::Object(selector)));
            return Ok(());
        }

        if self.config.remove_ids {
            object.remove("_id");
            object.remove("_rev");
        }

        let merged: Vec<Document> = matched
            .into_iter()
            .map(|mut doc| {
                doc.extend(object.clone());
                self.sanitize(ctx, doc)
            })
            .collect();

        let results = join_all(merged.iter().map(|doc| insert_document(store, &self.database, doc))).await;
        for (doc, result) in merged.iter().zip(results) {
            match result {
                Ok(res) => debug!("updated {} rev {} in {}", res["id"], res["rev"], self.database),
                Err(err) => ctx.error(format!("Failed to update document {}: {}", doc.get("_id").cloned().unwrap_or(Value::Null), err), Some(msg)),
            }
        }
        Ok(())
    }

    async fn delete(
        &self,
        store: &dyn DocumentStore,
        msg: &Message,
    ) -> Result<()> {
        let body = match msg.payload() {
            Some(payload) if is_truthy(payload) => payload.clone(),
            _ => msg.to_value(),
        };
        let doc = coerce_to_document(body, PAYLOAD_KEY);

        match (doc.get("_id").and_then(Value::as_str), doc.get("_rev").and_then(Value::as_str)) {
            (Some(id), Some(rev)) => {
                store.destroy(&self.database, id, rev).await?;
                debug!("deleted {} rev {} from {}", id, rev, self.database);
                Ok(())
            }
            _ => Err(CouchflowError::Config("_rev and _id are required to delete a document".to_string())),
        }
    }
}

/// Insert, creating the database when the store reports it missing.
///
/// Makes at most [`MAX_INSERT_ATTEMPTS`] insert calls; the database may be
/// deleted externally at any time after the node started.
pub async fn insert_document(
    store: &dyn DocumentStore,
    db: &str,
    doc: &Document,
) -> Result<Value> {
    let mut attempt = 1;
    loop {
        match store.insert(db, doc).await {
            Err(err) if err.is_not_found() && attempt < MAX_INSERT_ATTEMPTS => {
                debug!("database {} missing on insert attempt {}, creating it", db, attempt);
                match store.create_database(db).await {
                    Ok(()) => {}
                    Err(err) if err.is_conflict() => {}
                    Err(err) => return Err(err),
                }
                attempt += 1;
            }
            res => return res,
        }
    }
}

#[async_trait]
impl Node for DocumentWriter {
    fn create(config: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &config)?;
        let config = serde_json::from_value::<WriterConfig>(config)?;

        let database = normalize_database_name(&config.database);
        if database.is_empty() {
            return Err(CouchflowError::Config(format!("invalid database name '{}'", config.database)));
        }

        Ok(Self {
            config,
            database,
            connection: Connection::default(),
        })
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["operation", "database"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["insert", "update", "delete"]
                },
                "database": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Database name, normalized to lower case without leading underscore"
                },
                "payonly": {
                    "type": "boolean",
                    "description": "Store msg.payload only instead of the whole message"
                },
                "remove_ids": {
                    "type": "boolean",
                    "description": "Drop _id and _rev from the merged object on update"
                },
                "service": {
                    "type": "string",
                    "description": "'_ext_' for a manual connection, otherwise a bound service name"
                },
                "cloudant": {
                    "type": "string",
                    "description": "Manual connection node id"
                }
            }
        })
    }

    fn node_type(&self) -> NodeType {
        NodeType::CloudantOut
    }

    fn connection(&self) -> ConnectionRef {
        ConnectionRef::from_config(&self.config.service, &self.config.cloudant)
    }

    async fn start(
        &self,
        ctx: Arc<Context>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<()> {
        warn_database_rename(&ctx, &self.config.database, &self.database);
        self.ensure_database(&ctx, store.as_ref()).await;
        self.connection.set(store)
    }

    async fn handle(
        &self,
        ctx: Arc<Context>,
        msg: Message,
    ) -> Result<Option<Message>> {
        let store = self.connection.get()?;
        match self.config.operation {
            Operation::Insert => self.insert(&ctx, store.as_ref(), &msg).await?,
            Operation::Update => self.update(&ctx, store.as_ref(), &msg).await?,
            Operation::Delete => self.delete(store.as_ref(), &msg).await?,
        }
        Ok(None)
    }
}
