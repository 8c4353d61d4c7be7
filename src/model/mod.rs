mod message;
mod node;

pub use message::{MSGID_KEY, Message, PAYLOAD_KEY};
pub use node::NodeModel;
