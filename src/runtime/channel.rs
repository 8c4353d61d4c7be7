use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::{runtime::Handle, sync::broadcast};

use crate::{
    CouchflowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, Output, Report},
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().map(|h| h.clone()).unwrap_or_default();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().map(|h| h.clone()).unwrap_or_default();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

const OUTPUT_QUEUE_SIZE: usize = 2048;
const REPORT_QUEUE_SIZE: usize = 4096;

pub type OutputHandle = Arc<dyn Fn(&Event<Output>) + Send + Sync>;
pub type ReportHandle = Arc<dyn Fn(&Event<Report>) + Send + Sync>;
pub type OutputHandleAsync = Arc<dyn Fn(&Event<Output>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the node id
    /// eg. writer*
    pub nid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            nid: "*".to_string(),
        }
    }
}

impl ChannelOptions {
    pub fn with_nid(nid: impl Into<String>) -> Self {
        Self {
            nid: nid.into(),
        }
    }
}

/// Event bus between deployed nodes and the host.
#[derive(Clone)]
pub struct Channel {
    output_queue: Arc<BroadcastQueue<Event<Output>>>,
    report_queue: Arc<BroadcastQueue<Event<Report>>>,

    outputs: ShareLock<Vec<OutputHandle>>,
    reports: ShareLock<Vec<ReportHandle>>,
    outputs_async: ShareLock<Vec<OutputHandleAsync>>,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            output_queue: BroadcastQueue::new(OUTPUT_QUEUE_SIZE),
            report_queue: BroadcastQueue::new(REPORT_QUEUE_SIZE),
            outputs: Arc::new(RwLock::new(Vec::new())),
            reports: Arc::new(RwLock::new(Vec::new())),
            outputs_async: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn emit_output(
        &self,
        output: &Output,
    ) {
        self.output_queue.send(Event::new(output));
    }

    pub(crate) fn emit_report(
        &self,
        report: &Report,
    ) {
        self.report_queue.send(Event::new(report));
    }

    pub(crate) fn subscribe_reports(&self) -> broadcast::Receiver<Event<Report>> {
        self.report_queue.subscribe()
    }

    pub(crate) fn listen(&self) {
        let mut output_queue = self.output_queue.subscribe();
        let mut report_queue = self.report_queue.subscribe();
        let outputs = self.outputs.clone();
        let reports = self.reports.clone();
        let outputs_async = self.outputs_async.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(o) = output_queue.recv() => {
                        let out = o.clone();
                        dispatch_event!(outputs, &out);
                        dispatch_event_async!(outputs_async, &o);
                    }
                    Ok(r) = report_queue.recv() => {
                        dispatch_event!(reports, &r);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Subscription helper filtering channel events by node id.
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: globset::GlobMatcher,
}

impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let glob = globset::Glob::new(&options.nid).map_err(|e| CouchflowError::Config(format!("invalid node id pattern '{}': {}", options.nid, e)))?;

        Ok(Self {
            channel,
            glob: glob.compile_matcher(),
        })
    }

    pub fn on_output(
        &self,
        f: impl Fn(&Event<Output>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        push_handle(&self.channel.outputs, Arc::new(move |e: &Event<Output>| {
            if glob.is_match(&e.nid) {
                f(e);
            }
        }));
    }

    pub fn on_output_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Output>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        push_handle(&self.channel.outputs_async, Arc::new(move |e: &Event<Output>| {
            if glob.is_match(&e.nid) {
                f(e)
            } else {
                Box::pin(async {})
            }
        }));
    }

    pub fn on_report(
        &self,
        f: impl Fn(&Event<Report>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        push_handle(&self.channel.reports, Arc::new(move |e: &Event<Report>| {
            if glob.is_match(&e.nid) {
                f(e);
            }
        }));
    }

    pub fn on_warn(
        &self,
        f: impl Fn(&Event<Report>) + Send + Sync + 'static,
    ) {
        self.on_report(move |e| {
            if e.is_warn() {
                f(e);
            }
        });
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Report>) + Send + Sync + 'static,
    ) {
        self.on_report(move |e| {
            if e.is_error() {
                f(e);
            }
        });
    }
}

fn push_handle<H>(
    handles: &ShareLock<Vec<H>>,
    handle: H,
) {
    if let Ok(mut handles) = handles.write() {
        handles.push(handle);
    }
}
