use std::sync::Arc;

use tracing::{error, warn};

use crate::{
    events::{Output, Report, ReportLevel},
    model::Message,
    nodes::NodeId,
    runtime::Channel,
    utils,
};

/// Per-node handle to the host: warn/error reporting and message emission.
#[derive(Clone)]
pub struct Context {
    nid: NodeId,
    channel: Arc<Channel>,
}

impl Context {
    pub fn new(
        nid: NodeId,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            nid,
            channel,
        }
    }

    pub fn nid(&self) -> &str {
        &self.nid
    }

    pub fn warn(
        &self,
        content: impl Into<String>,
    ) {
        let content = content.into();
        warn!(nid = %self.nid, "{}", content);
        self.report(ReportLevel::Warn, content, None);
    }

    /// Report an error, keeping the offending message for diagnostics.
    pub fn error(
        &self,
        content: impl Into<String>,
        message: Option<&Message>,
    ) {
        let content = content.into();
        error!(nid = %self.nid, "{}", content);
        self.report(ReportLevel::Error, content, message.cloned());
    }

    pub fn send(
        &self,
        message: Message,
    ) {
        let output = Output {
            nid: self.nid.clone(),
            message,
            timestamp: utils::time::time_millis(),
        };
        self.channel.emit_output(&output);
    }

    fn report(
        &self,
        level: ReportLevel,
        content: String,
        message: Option<Message>,
    ) {
        let report = Report {
            nid: self.nid.clone(),
            level,
            content,
            message,
            timestamp: utils::time::time_millis(),
        };
        self.channel.emit_report(&report);
    }
}
