use std::fmt;

use crate::{model::Message, nodes::NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ReportLevel {
    Warn,
    Error,
}

/// A warning or error raised by a node while starting or handling a message.
#[derive(Debug, Clone)]
pub struct Report {
    /// Node ID that raised the report.
    pub nid: NodeId,
    pub level: ReportLevel,
    /// Human readable description.
    pub content: String,
    /// The message being handled, kept for diagnostics.
    pub message: Option<Message>,
    /// Timestamp in milliseconds of the report.
    pub timestamp: i64,
}

impl Report {
    pub fn is_warn(&self) -> bool {
        self.level == ReportLevel::Warn
    }

    pub fn is_error(&self) -> bool {
        self.level == ReportLevel::Error
    }
}

impl fmt::Display for Report {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level.as_ref(), self.nid, self.content)
    }
}
