use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WriterConfig {
    pub operation: Operation,
    /// database name as typed in the editor, before normalization
    pub database: String,
    /// store only `msg.payload` instead of the whole message
    #[serde(default)]
    pub payonly: bool,
    /// drop `_id`/`_rev` from the merged object on update
    #[serde(default)]
    pub remove_ids: bool,
    /// `_ext_` for a manual connection, otherwise a bound service name
    #[serde(default)]
    pub service: String,
    /// manual connection node id
    #[serde(default)]
    pub cloudant: String,
}
