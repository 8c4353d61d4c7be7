use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{CouchflowError, Result};

use super::{ConnectionCredentials, CredentialResolver, account_from_host};

/// Environment variable holding the platform's service bindings.
const SERVICES_ENV: &str = "VCAP_SERVICES";
/// Service types offered to the editor.
const CLOUDANT_SERVICE_PATTERN: &str = r"(?i)^cloudant";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCredentials {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// One bound service instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub credentials: ServiceCredentials,
}

/// `{name, label}` pair listed in the editor's service picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub label: String,
}

/// Service bindings keyed by service type, as found in `VCAP_SERVICES`.
#[derive(Debug, Clone, Default)]
pub struct ServiceBindings {
    services: HashMap<String, Vec<ServiceBinding>>,
}

impl ServiceBindings {
    pub fn from_json(s: &str) -> Result<Self> {
        let services = serde_json::from_str::<HashMap<String, Vec<ServiceBinding>>>(s).map_err(|e| CouchflowError::Config(format!("invalid service bindings: {}", e)))?;
        Ok(Self {
            services,
        })
    }

    /// Read bindings from the environment; no bindings when the variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(SERVICES_ENV) {
            Ok(s) if !s.trim().is_empty() => Self::from_json(&s),
            _ => Ok(Self::default()),
        }
    }

    pub fn get_service(
        &self,
        name: &str,
    ) -> Option<&ServiceBinding> {
        self.services.values().flatten().find(|binding| binding.name == name)
    }

    /// Bindings whose service type starts with `cloudant`, any case.
    pub fn cloudant_services(&self) -> Vec<ServiceSummary> {
        let Ok(pattern) = Regex::new(CLOUDANT_SERVICE_PATTERN) else {
            return Vec::new();
        };

        let mut types: Vec<&String> = self.services.keys().filter(|t| pattern.is_match(t)).collect();
        types.sort();

        types
            .into_iter()
            .flat_map(|t| self.services[t].iter())
            .map(|binding| ServiceSummary {
                name: binding.name.clone(),
                label: binding.label.clone(),
            })
            .collect()
    }
}

impl CredentialResolver for ServiceBindings {
    fn resolve_service(
        &self,
        name: &str,
    ) -> Option<ConnectionCredentials> {
        let binding = self.get_service(name)?;
        let credentials = &binding.credentials;
        if credentials.host.is_empty() {
            return None;
        }

        Some(ConnectionCredentials {
            account: account_from_host(&credentials.host),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            url: None,
        })
    }
}
