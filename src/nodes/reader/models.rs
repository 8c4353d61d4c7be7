use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// fetch one document by id
    #[serde(rename = "_id_")]
    ById,
    /// query a search index of a design document
    #[serde(rename = "_idx_")]
    Index,
    /// list all documents
    #[serde(rename = "_all_")]
    All,
    /// Mango selector query
    #[serde(rename = "_sel_")]
    Selector,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReaderConfig {
    pub database: String,
    pub search: SearchMode,
    /// design document holding the index, without `_design/`
    #[serde(default)]
    pub design: String,
    /// search index name
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub cloudant: String,
}

/// `_all_docs` parameters taken from an object payload.
pub const VIEW_PARAMS: [&str; 18] = [
    "conflicts",
    "descending",
    "end_key",
    "end_key_doc_id",
    "endkey",
    "endkey_docid",
    "include_docs",
    "inclusive_end",
    "key",
    "keys",
    "limit",
    "skip",
    "stale",
    "start_key",
    "start_key_doc_id",
    "startkey",
    "startkey_docid",
    "update",
];
