mod models;
mod node;

pub use models::{Operation, WriterConfig};
pub use node::{DocumentWriter, MAX_INSERT_ATTEMPTS, insert_document};
