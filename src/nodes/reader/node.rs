use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    CouchflowError, Result,
    credentials::ConnectionRef,
    model::Message,
    nodes::{
        Connection, Node, NodeType,
        document::{normalize_database_name, parse_textual, plain_text},
        warn_database_rename,
    },
    runtime::Context,
    store::{Document, DocumentStore},
};

use super::models::*;

/// Field the raw store response is attached under.
pub const RESPONSE_KEY: &str = "cloudant";

const DEFAULT_SEARCH_LIMIT: u64 = 200;
const DESIGN_PREFIX: &str = "_design/";

/// Source node querying documents and forwarding the result as `payload`.
pub struct DocumentReader {
    config: ReaderConfig,
    database: String,
    connection: Connection,
}

impl DocumentReader {
    pub fn database(&self) -> &str {
        &self.database
    }

    async fn query(
        &self,
        store: &dyn DocumentStore,
        payload: &Value,
    ) -> Result<Value> {
        match self.config.search {
            SearchMode::ById => {
                let id = document_id(payload)?;
                debug!("get {} from {}", id, self.database);
                store.get(&self.database, &id).await
            }
            SearchMode::Index => {
                let options = search_options(payload)?;
                store.search(&self.database, &self.config.design, &self.config.index, &options).await
            }
            SearchMode::All => store.list(&self.database, &list_options(payload)).await,
            SearchMode::Selector => store.find(&self.database, &find_request(payload)?).await,
        }
    }
}

/// The id to fetch: `id` or `_id` of an object payload, else the payload.
fn document_id(payload: &Value) -> Result<String> {
    let id = match payload {
        Value::Object(map) => map.get("id").or_else(|| map.get("_id")).unwrap_or(&Value::Null),
        other => other,
    };
    match id {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(plain_text(id)),
        _ => Err(CouchflowError::Config("A document id is required: send it as msg.payload or msg.payload.id".to_string())),
    }
}

fn search_options(payload: &Value) -> Result<Document> {
    let mut options = match payload {
        Value::Object(map) if map.contains_key("query") || map.contains_key("q") => map.clone(),
        Value::Object(map) => {
            let query = map.iter().map(|(k, v)| format!("{}:{}", k, plain_text(v))).collect::<Vec<_>>().join(" ");
            query_options(query)
        }
        Value::Null => return Err(CouchflowError::Config("A search query is required: send it as msg.payload".to_string())),
        other => query_options(plain_text(other)),
    };
    options.entry("include_docs").or_insert(Value::Bool(true));
    options.entry("limit").or_insert(Value::from(DEFAULT_SEARCH_LIMIT));
    Ok(options)
}

fn query_options(query: String) -> Document {
    let mut options = Map::new();
    options.insert("query".to_string(), Value::String(query));
    options
}

fn list_options(payload: &Value) -> Document {
    let mut options: Document = match payload {
        Value::Object(map) => map.iter().filter(|(k, _)| VIEW_PARAMS.contains(&k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => Map::new(),
    };
    options.entry("include_docs").or_insert(Value::Bool(true));
    options
}

fn find_request(payload: &Value) -> Result<Document> {
    match parse_textual(payload.clone()) {
        Value::Object(map) if map.contains_key("selector") => Ok(map),
        Value::Object(selector) => {
            let mut request = Map::new();
            request.insert("selector".to_string(), Value::Object(selector));
            Ok(request)
        }
        _ => Err(CouchflowError::Config("A selector object is required: send it as msg.payload".to_string())),
    }
}

/// Flatten `rows` and `docs` responses into a list of documents.
///
/// Design documents are dropped from `rows`; other shapes pass through.
pub fn normalize_response(raw: &Value) -> Value {
    if let Some(rows) = raw.get("rows").and_then(Value::as_array) {
        let docs = rows
            .iter()
            .filter(|row| !row.get("id").and_then(Value::as_str).is_some_and(|id| id.starts_with(DESIGN_PREFIX)))
            .map(|row| row.get("doc").cloned().unwrap_or_else(|| row.clone()))
            .collect();
        return Value::Array(docs);
    }
    if let Some(docs) = raw.get("docs").filter(|docs| docs.is_array()) {
        return docs.clone();
    }
    raw.clone()
}

/// CouchDB's `{error, reason}` body for a missing document or database.
fn not_found_response(err: &CouchflowError) -> Value {
    let reason = match err {
        CouchflowError::NotFound(reason) => reason.clone(),
        other => other.to_string(),
    };
    serde_json::json!({ "error": "not_found", "reason": reason })
}

#[async_trait]
impl Node for DocumentReader {
    fn create(config: serde_json::Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &config)?;
        let config = serde_json::from_value::<ReaderConfig>(config)?;

        if config.search == SearchMode::Index && (config.design.is_empty() || config.index.is_empty()) {
            return Err(CouchflowError::Config("index search needs both a design document and an index name".to_string()));
        }

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
            "required": ["database", "search"],
            "properties": {
                "database": {
                    "type": "string",
                    "minLength": 1
                },
                "search": {
                    "type": "string",
                    "enum": ["_id_", "_idx_", "_all_", "_sel_"]
                },
                "design": {
                    "type": "string",
                    "description": "Design document of the search index"
                },
                "index": {
                    "type": "string",
                    "description": "Search index name"
                },
                "service": {
                    "type": "string"
                },
                "cloudant": {
                    "type": "string"
                }
            }
        })
    }

    fn node_type(&self) -> NodeType {
        NodeType::CloudantIn
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
        self.connection.set(store)
    }

    async fn handle(
        &self,
        ctx: Arc<Context>,
        mut msg: Message,
    ) -> Result<Option<Message>> {
        let store = self.connection.get()?;
        let payload = msg.payload().cloned().unwrap_or(Value::Null);

        match self.query(store.as_ref(), &payload).await {
            Ok(raw) => {
                // a fetched document is forwarded as is, even with its own `rows` or `docs`
                let payload = match self.config.search {
                    SearchMode::ById => raw.clone(),
                    _ => normalize_response(&raw),
                };
                msg.set_payload(payload);
                msg.set(RESPONSE_KEY, raw);
                Ok(Some(msg))
            }
            Err(err) if err.is_not_found() => {
                ctx.warn(format!("Nothing found in database '{}': {}", self.database, err));
                msg.set_payload(Value::Null);
                msg.set(RESPONSE_KEY, not_found_response(&err));
                Ok(Some(msg))
            }
            Err(err) => Err(err),
        }
    }
}
