pub mod document;
pub mod reader;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    CouchflowError, Result,
    credentials::ConnectionRef,
    model::Message,
    runtime::Context,
    store::DocumentStore,
};

pub use reader::DocumentReader;
pub use writer::DocumentWriter;

/// node id
pub type NodeId = String;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    /// writes documents
    CloudantOut,
    /// queries documents
    CloudantIn,
}

#[async_trait]
pub trait Node: Send + Sync {
    /// Creates a new instance of the node from its editor configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - The [`serde_json::Value`] validated against [`Node::schema`].
    fn create(config: serde_json::Value) -> Result<Self>
    where
        Self: Sized;

    /// Returns the JSON schema of the node configuration.
    fn schema() -> serde_json::Value
    where
        Self: Sized;

    /// Returns the type of the node.
    fn node_type(&self) -> NodeType;

    /// Returns the connection the node is configured with.
    fn connection(&self) -> ConnectionRef;

    /// Prepares the node on an established store connection.
    ///
    /// Called once; the node handles no message before it returns `Ok`.
    async fn start(
        &self,
        ctx: Arc<Context>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<()>;

    /// Handles one inbound message.
    ///
    /// # Returns
    ///
    /// The message to forward downstream, if any. Errors are reported by the
    /// host together with the message that caused them.
    async fn handle(
        &self,
        ctx: Arc<Context>,
        msg: Message,
    ) -> Result<Option<Message>>;
}

/// Build a node of the given type.
pub fn create_node(
    uses: NodeType,
    config: serde_json::Value,
) -> Result<Arc<dyn Node>> {
    match uses {
        NodeType::CloudantOut => Ok(Arc::new(DocumentWriter::create(config)?)),
        NodeType::CloudantIn => Ok(Arc::new(DocumentReader::create(config)?)),
    }
}

/// The store connection a node receives in `start`.
#[derive(Default)]
pub(crate) struct Connection {
    store: OnceLock<Arc<dyn DocumentStore>>,
}

impl Connection {
    pub(crate) fn set(
        &self,
        store: Arc<dyn DocumentStore>,
    ) -> Result<()> {
        self.store.set(store).map_err(|_| CouchflowError::Node("node is already started".to_string()))
    }

    pub(crate) fn get(&self) -> Result<Arc<dyn DocumentStore>> {
        self.store.get().cloned().ok_or_else(|| CouchflowError::Node("node is not connected".to_string()))
    }
}

/// Normalize the configured database name, warning when it had to change.
pub(crate) fn warn_database_rename(
    ctx: &Context,
    configured: &str,
    normalized: &str,
) {
    if configured != normalized {
        ctx.warn(format!("Database name '{}' is not valid, using '{}' instead.", configured, normalized));
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_node_type_names() {
        assert_eq!(NodeType::from_str("cloudant_out").unwrap(), NodeType::CloudantOut);
        assert_eq!(NodeType::CloudantIn.as_ref(), "cloudant_in");
        assert!(NodeType::from_str("cloudant").is_err());
    }

    #[test]
    fn test_create_node() {
        let writer = create_node(NodeType::CloudantOut, json!({"operation": "insert", "database": "orders"})).unwrap();
        assert_eq!(writer.node_type(), NodeType::CloudantOut);

        let reader = create_node(NodeType::CloudantIn, json!({"database": "orders", "search": "_all_"})).unwrap();
        assert_eq!(reader.node_type(), NodeType::CloudantIn);

        assert!(create_node(NodeType::CloudantOut, json!({"operation": "upsert", "database": "orders"})).is_err());
    }
}
