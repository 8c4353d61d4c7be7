//! Flow host - the main entry point for Couchflow.
//!
//! The engine owns the lifecycle of deployed nodes:
//! - Resolving each node's credentials and connecting it to a store
//! - Feeding inbound messages to the node, one task per message
//! - Publishing outputs and warn/error reports on the event channel
//! - Graceful shutdown coordination

use std::{
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::{
    CouchflowError, EngineBuilder, Result,
    common::{MemCache, Queue, Shutdown},
    credentials::{ConnectionNode, CredentialResolver, resolve_credentials},
    model::{Message, NodeModel},
    nodes::{Node, NodeId, NodeType, create_node},
    runtime::{Channel, Context},
    store::Connector,
};

/// Inbound messages buffered per node.
const INBOX_SIZE: usize = 1024;

/// A deployed node with its inbox.
struct NodeHandle {
    node: Arc<dyn Node>,
    inbox: Arc<Queue<Message>>,
    ctx: Arc<Context>,
    ready: Arc<AtomicBool>,
    shutdown: Arc<Shutdown>,
}

/// The flow host.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch();
///
/// engine.deploy(&NodeModel::from_json(node_json)?)?;
/// ChannelEvent::channel(engine.channel(), ChannelOptions::with_nid("reader1"))?.on_output(|e| println!("{:?}", e.message));
/// engine.send("reader1", Message::new("doc-id"))?;
///
/// engine.shutdown();
/// ```
pub struct Engine {
    /// Event channel for outputs and reports.
    channel: Arc<Channel>,
    /// Deployed nodes by id.
    nodes: MemCache<NodeId, Arc<NodeHandle>>,
    /// Manual connection nodes by id.
    connections: MemCache<String, ConnectionNode>,
    resolver: Arc<dyn CredentialResolver>,
    connector: Arc<dyn Connector>,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Arc<Runtime>,
}

impl Engine {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        resolver: Arc<dyn CredentialResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let channel = Arc::new(Channel::new(runtime.handle().clone()));

        Self {
            channel,
            nodes: MemCache::new(),
            connections: MemCache::new(),
            resolver,
            connector,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
        }
    }

    /// Creates a new engine with the given configuration.
    pub fn new_with_config(config: crate::Config) -> Result<Self> {
        EngineBuilder::new().config(config).build()
    }

    /// Starts dispatching channel events to subscribers.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }
        self.channel.listen();
    }

    /// Stops every deployed node and the event channel.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        for (_, handle) in self.nodes.iter() {
            handle.shutdown.shutdown();
        }
        self.channel.shutdown();
    }

    /// Registers (or replaces) a manual connection node.
    ///
    /// Nodes deployed afterwards with `service = "_ext_"` may reference it.
    pub fn register_connection(
        &self,
        connection: ConnectionNode,
    ) {
        self.connections.set(connection.id.clone(), connection);
    }

    /// Creates the node and starts connecting it in the background.
    ///
    /// Messages sent before the node is ready are buffered in its inbox. A
    /// node whose connection fails reports an error and stays inert.
    pub fn deploy(
        &self,
        model: &NodeModel,
    ) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(CouchflowError::Engine("Engine is not running".to_string()));
        }
        if self.nodes.get(&model.id).is_some() {
            return Err(CouchflowError::Engine(format!("Node {} is already deployed", model.id)));
        }

        let uses = NodeType::from_str(&model.uses).map_err(|_| CouchflowError::Node(format!("unknown node type '{}'", model.uses)))?;
        let node = create_node(uses, model.config.clone())?;

        let handle = Arc::new(NodeHandle {
            node,
            inbox: Queue::new(INBOX_SIZE),
            ctx: Arc::new(Context::new(model.id.clone(), self.channel.clone())),
            ready: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Shutdown::new()),
        });
        self.nodes.set(model.id.clone(), handle.clone());

        let connections = self.connections.clone();
        let resolver = self.resolver.clone();
        let connector = self.connector.clone();
        self.runtime.spawn(async move {
            let Some(credentials) = resolve_credentials(&handle.node.connection(), &connections, resolver.as_ref()) else {
                handle.ctx.error("missing cloudant configuration", None);
                return;
            };

            let store = match connector.connect(&credentials).await {
                Ok(store) => store,
                Err(err) => {
                    handle.ctx.error(format!("Failed to connect: {}", err), None);
                    return;
                }
            };

            if let Err(err) = handle.node.start(handle.ctx.clone(), store).await {
                handle.ctx.error(format!("Failed to start: {}", err), None);
                return;
            }
            handle.ready.store(true, Ordering::Release);
            info!("node {} ({}) is ready", handle.ctx.nid(), handle.node.node_type().as_ref());

            let shutdown = handle.shutdown.clone();
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(msg) = handle.inbox.next_async() => {
                        let node = handle.node.clone();
                        let ctx = handle.ctx.clone();
                        tokio::spawn(async move {
                            let retained = msg.clone();
                            match node.handle(ctx.clone(), msg).await {
                                Ok(Some(out)) => ctx.send(out),
                                Ok(None) => {}
                                Err(err) => ctx.error(err.to_string(), Some(&retained)),
                            }
                        });
                    }
                }
            }
            debug!("node {} stopped", handle.ctx.nid());
        });

        Ok(())
    }

    /// Queues a message for a deployed node.
    pub fn send(
        &self,
        nid: &str,
        msg: Message,
    ) -> Result<()> {
        let handle = self.nodes.get(&nid.to_string()).ok_or_else(|| CouchflowError::Engine(format!("Node {} not found", nid)))?;
        handle.inbox.send(msg)
    }

    /// Stops a node and forgets it; buffered messages are dropped.
    pub fn undeploy(
        &self,
        nid: &str,
    ) -> Result<()> {
        let handle = self.nodes.remove(&nid.to_string()).ok_or_else(|| CouchflowError::Engine(format!("Node {} not found", nid)))?;
        handle.shutdown.shutdown();
        Ok(())
    }

    /// Whether the node is connected and consuming messages.
    pub fn is_ready(
        &self,
        nid: &str,
    ) -> bool {
        self.nodes.get(&nid.to_string()).is_some_and(|handle| handle.ready.load(Ordering::Acquire))
    }

    /// Number of messages waiting in the node's inbox.
    pub fn pending(
        &self,
        nid: &str,
    ) -> Option<usize> {
        self.nodes.get(&nid.to_string()).map(|handle| handle.inbox.len())
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc,
        thread,
        time::{Duration, Instant},
    };

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        ChannelEvent, ChannelOptions,
        credentials::ServiceBindings,
        store::{DocumentStore, MemConnector, MemStore},
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn engine(store: &MemStore) -> Engine {
        let services = ServiceBindings::from_json(r#"{"cloudantNoSQLDB": [{"name": "db1", "label": "cloudantNoSQLDB", "credentials": {"host": "acme.cloudant.com", "username": "u", "password": "p"}}]}"#).unwrap();
        let engine = EngineBuilder::new().async_worker_thread_number(2).resolver(Arc::new(services)).connector(Arc::new(MemConnector::new(store.clone()))).build().unwrap();
        engine.launch();
        engine
    }

    fn model(
        id: &str,
        uses: &str,
        config: Value,
    ) -> NodeModel {
        NodeModel {
            id: id.to_string(),
            name: id.to_string(),
            uses: uses.to_string(),
            config,
        }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < TIMEOUT {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_engine_writer_through_manual_connection() {
        let store = MemStore::new();
        let engine = engine(&store);
        engine.register_connection(ConnectionNode {
            id: "conn1".to_string(),
            hostname: "https://acme.cloudant.com".to_string(),
            ..Default::default()
        });

        engine.deploy(&model("writer1", "cloudant_out", json!({"operation": "insert", "database": "orders", "payonly": true, "service": "_ext_", "cloudant": "conn1"}))).unwrap();
        engine.send("writer1", Message::new(json!({"_id": "a", "qty": 1}))).unwrap();

        assert!(wait_until(|| store.doc_count("orders") == Some(1)));
        assert!(engine.is_ready("writer1"));
        engine.shutdown();
    }

    #[test]
    fn test_engine_reader_forwards_output() {
        let store = MemStore::new();
        let engine = engine(&store);
        engine.runtime.block_on(async {
            store.create_database("orders").await.unwrap();
            store.insert("orders", json!({"_id": "a", "qty": 1}).as_object().unwrap()).await.unwrap();
        });

        let (tx, rx) = mpsc::channel();
        ChannelEvent::channel(engine.channel(), ChannelOptions::with_nid("reader*")).unwrap().on_output(move |e| {
            let _ = tx.send(e.message.clone());
        });

        engine.deploy(&model("reader1", "cloudant_in", json!({"database": "orders", "search": "_id_", "service": "db1"}))).unwrap();
        let mut msg = Message::new("a");
        msg.set("topic", "orders");
        engine.send("reader1", msg).unwrap();

        let out = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(out.payload().unwrap()["qty"], json!(1));
        assert_eq!(out.get("topic"), Some(&json!("orders")));
        assert_eq!(out.get("cloudant").unwrap()["_id"], json!("a"));
        engine.shutdown();
    }

    #[test]
    fn test_engine_reports_missing_configuration() {
        let store = MemStore::new();
        let engine = engine(&store);

        let (tx, rx) = mpsc::channel();
        ChannelEvent::channel(engine.channel(), ChannelOptions::default()).unwrap().on_error(move |e| {
            let _ = tx.send(e.inner().clone());
        });

        engine.deploy(&model("writer1", "cloudant_out", json!({"operation": "insert", "database": "orders", "service": "_ext_", "cloudant": "nowhere"}))).unwrap();
        engine.send("writer1", Message::new(json!({"a": 1}))).unwrap();

        let report = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(report.nid, "writer1");
        assert_eq!(report.content, "missing cloudant configuration");
        assert!(!engine.is_ready("writer1"));
        assert_eq!(engine.pending("writer1"), Some(1));
        assert_eq!(store.doc_count("orders"), None);
        engine.shutdown();
    }

    #[test]
    fn test_engine_reports_handler_error_with_message() {
        let store = MemStore::new();
        let engine = engine(&store);

        let (tx, rx) = mpsc::channel();
        ChannelEvent::channel(engine.channel(), ChannelOptions::with_nid("reader1")).unwrap().on_error(move |e| {
            let _ = tx.send(e.inner().clone());
        });

        engine.deploy(&model("reader1", "cloudant_in", json!({"database": "orders", "search": "_sel_", "service": "db1"}))).unwrap();
        let msg = Message::new(3);
        let msgid = msg.id().map(str::to_string);
        engine.send("reader1", msg).unwrap();

        let report = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(report.is_error());
        assert_eq!(report.message.unwrap().id().map(str::to_string), msgid);
        engine.shutdown();
    }

    #[test]
    fn test_engine_deploy_errors() {
        let store = MemStore::new();
        let engine = engine(&store);

        assert!(engine.deploy(&model("n1", "cloudant", json!({}))).is_err());
        assert!(engine.deploy(&model("n1", "cloudant_out", json!({"operation": "insert"}))).is_err());

        engine.deploy(&model("n1", "cloudant_out", json!({"operation": "insert", "database": "orders", "service": "db1"}))).unwrap();
        assert!(engine.deploy(&model("n1", "cloudant_out", json!({"operation": "insert", "database": "orders", "service": "db1"}))).is_err());

        assert!(engine.send("n2", Message::new(1)).is_err());
        engine.undeploy("n1").unwrap();
        assert!(engine.send("n1", Message::new(1)).is_err());
        assert!(engine.undeploy("n1").is_err());
        engine.shutdown();
    }

    #[test]
    fn test_engine_reaches_every_deployed_node() {
        let store = MemStore::new();
        let engine = engine(&store);

        let count = 3000;
        for i in 0..count {
            engine.deploy(&model(&format!("n{}", i), "cloudant_in", json!({"database": "orders", "search": "_all_"}))).unwrap();
        }

        for i in 0..count {
            assert!(engine.send(&format!("n{}", i), Message::new(1)).is_ok(), "node n{} lost", i);
        }
        assert_eq!(engine.nodes.iter().count(), count);
        for i in 0..count {
            engine.undeploy(&format!("n{}", i)).unwrap();
        }
        engine.shutdown();
    }

    #[test]
    fn test_engine_not_running() {
        let engine = EngineBuilder::new().async_worker_thread_number(1).connector(Arc::new(MemConnector::default())).resolver(Arc::new(ServiceBindings::default())).build().unwrap();
        assert!(engine.deploy(&model("n1", "cloudant_in", json!({"database": "orders", "search": "_all_"}))).is_err());
    }
}
