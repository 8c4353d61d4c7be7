//! Event types emitted by deployed nodes.
//!
//! Nodes never talk to the host directly: outbound messages and warn/error
//! reports are published as events on the channel and picked up by
//! subscribers.

mod report;

pub use report::*;

use crate::{model::Message, nodes::NodeId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// A message forwarded by a node to its downstream stages.
#[derive(Debug, Clone)]
pub struct Output {
    /// Node ID that produced the message.
    pub nid: NodeId,
    /// The outbound message.
    pub message: Message,
    /// Timestamp in milliseconds of the emission.
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}
