use serde::{Deserialize, Serialize};

use crate::{CouchflowError, Result};

/// Deployable node definition as produced by the flow editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub uses: String,
    /// node-type specific configuration, validated by the node's schema
    pub config: serde_json::Value,
}

impl NodeModel {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<NodeModel>(s).map_err(|e| CouchflowError::Node(format!("{}", e)))
    }
}
