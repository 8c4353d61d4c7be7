//! Message queues for node inboxes and event fan-out.
//!
//! `Queue` is the point-to-point inbox every deployed node reads from,
//! `BroadcastQueue` carries outputs and reports to all channel subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{CouchflowError, Result};

/// Bounded MPMC queue backed by flume.
///
/// Each message is consumed by exactly one receiver. Messages sent before a
/// receiver starts polling stay buffered until the capacity is reached.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: flume::Receiver<T>,
    sender: flume::Sender<T>,
}

impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (sender, receiver) = flume::bounded(cap);

        Arc::new(Self {
            receiver,
            sender,
        })
    }

    /// enqueue without waiting, failing when the queue is full
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| CouchflowError::Queue(e.to_string()))
    }

    /// wait for the next message
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }

    /// number of buffered messages
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// Broadcast queue for one-to-many event distribution.
///
/// Backed by tokio's broadcast channel; sending with no subscriber is not an
/// error, the event is simply dropped.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender,
        })
    }

    /// publish an event to every current subscriber
    pub fn send(
        &self,
        msg: T,
    ) {
        let _ = self.sender.send(msg);
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}
