mod models;
mod node;

pub use models::{ReaderConfig, SearchMode, VIEW_PARAMS};
pub use node::{DocumentReader, normalize_response};
