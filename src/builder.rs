use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::{
    Config, Engine, Result, StoreType,
    credentials::{CredentialResolver, ServiceBindings},
    store::{CouchConnector, Connector, MemConnector},
};

pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    resolver: Option<Arc<dyn CredentialResolver>>,
    connector: Option<Arc<dyn Connector>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            rt: None,
            resolver: None,
            connector: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Source of service-binding credentials, `VCAP_SERVICES` by default.
    pub fn resolver(
        mut self,
        resolver: Arc<dyn CredentialResolver>,
    ) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Store connector, chosen from `store.store_type` by default.
    pub fn connector(
        mut self,
        connector: Arc<dyn Connector>,
    ) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let runtime = match &self.rt {
            Some(rt) => rt.clone(),
            None => Arc::new(Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build()?),
        };

        let resolver: Arc<dyn CredentialResolver> = match &self.resolver {
            Some(resolver) => resolver.clone(),
            None => Arc::new(ServiceBindings::from_env()?),
        };

        let connector: Arc<dyn Connector> = match (&self.connector, &self.config.store.store_type) {
            (Some(connector), _) => connector.clone(),
            (None, StoreType::Couch) => Arc::new(CouchConnector::new(self.config.store.couch.clone().unwrap_or_default())),
            (None, StoreType::Mem) => Arc::new(MemConnector::default()),
        };

        Ok(Engine::new(runtime, resolver, connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_from_config() {
        let config = Config::load_from_str(
            r#"
            async_worker_thread_number = 2

            [store]
            store_type = "mem"
            "#,
        )
        .unwrap();
        let engine = EngineBuilder::new().config(config).resolver(Arc::new(ServiceBindings::default())).build().unwrap();
        engine.launch();
        engine.shutdown();
    }

    #[test]
    fn test_build_with_runtime() {
        let rt = Arc::new(Builder::new_multi_thread().worker_threads(1).enable_all().build().unwrap());
        let builder = EngineBuilder::new().runtime(rt).resolver(Arc::new(ServiceBindings::default()));
        assert!(builder.build().is_ok());
    }
}
