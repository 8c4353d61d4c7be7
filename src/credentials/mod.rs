//! Connection identity resolution.
//!
//! A node either points at a manually configured connection node (`_ext_`)
//! or names a platform service binding. Both end up as
//! [`ConnectionCredentials`], held by the node for its lifetime.

mod connection;
mod service;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::MemCache;

pub use connection::ConnectionNode;
pub use service::{ServiceBinding, ServiceBindings, ServiceSummary};

/// `service` value selecting a manual connection node.
pub const EXTERNAL_SERVICE: &str = "_ext_";

/// Resolved connection identity.
///
/// Either `url` is set (manual host) or `account`, `username` and
/// `password` are (service binding).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCredentials {
    pub account: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Which connection a node is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRef {
    /// id of a manually configured connection node
    External(String),
    /// name of a bound platform service
    Service(String),
    None,
}

impl ConnectionRef {
    pub fn from_config(
        service: &str,
        connection: &str,
    ) -> Self {
        match service {
            "" => ConnectionRef::None,
            EXTERNAL_SERVICE if connection.is_empty() => ConnectionRef::None,
            EXTERNAL_SERVICE => ConnectionRef::External(connection.to_string()),
            name => ConnectionRef::Service(name.to_string()),
        }
    }
}

/// Source of credentials for named platform services.
pub trait CredentialResolver: Send + Sync {
    fn resolve_service(
        &self,
        name: &str,
    ) -> Option<ConnectionCredentials>;
}

/// The account is the part of the host preceding its first `.`.
pub fn account_from_host(host: &str) -> String {
    let host = host.split_once("://").map_or(host, |(_, rest)| rest);
    host.split('.').next().unwrap_or_default().to_string()
}

/// Resolve a node's connection reference to credentials.
///
/// Returns `None` when nothing usable is configured; the node must then
/// report a configuration error instead of connecting.
pub fn resolve_credentials(
    connection: &ConnectionRef,
    connections: &MemCache<String, ConnectionNode>,
    resolver: &dyn CredentialResolver,
) -> Option<ConnectionCredentials> {
    match connection {
        ConnectionRef::External(id) => {
            let node = connections.get(id)?;
            match node.credentials() {
                Ok(credentials) => Some(credentials),
                Err(err) => {
                    warn!("connection node {} is unusable: {}", id, err);
                    None
                }
            }
        }
        ConnectionRef::Service(name) => resolver.resolve_service(name),
        ConnectionRef::None => None,
    }
}
