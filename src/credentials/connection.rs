use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{CouchflowError, Result, credentials::ConnectionCredentials};

use super::account_from_host;

/// A manually configured connection: a host URL plus optional stored login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionNode {
    /// Build credentials whose `url` embeds the login when both parts are
    /// stored. The password is percent-encoded in the URL.
    pub fn credentials(&self) -> Result<ConnectionCredentials> {
        let parsed = Url::parse(&self.hostname).map_err(|e| CouchflowError::Config(format!("invalid hostname '{}': {}", self.hostname, e)))?;
        let host = parsed.host_str().ok_or_else(|| CouchflowError::Config(format!("hostname '{}' has no host", self.hostname)))?;

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let mut url = Url::parse(&format!("{}://{}", parsed.scheme(), authority)).map_err(|e| CouchflowError::Config(e.to_string()))?;

        let username = self.username.clone().unwrap_or_default();
        let password = self.password.clone().unwrap_or_default();
        if !username.is_empty() && !password.is_empty() {
            url.set_username(&username).map_err(|_| CouchflowError::Config(format!("cannot set username on '{}'", self.hostname)))?;
            url.set_password(Some(&password)).map_err(|_| CouchflowError::Config(format!("cannot set password on '{}'", self.hostname)))?;
        }

        Ok(ConnectionCredentials {
            account: account_from_host(host),
            username,
            password,
            url: Some(url.to_string()),
        })
    }
}
