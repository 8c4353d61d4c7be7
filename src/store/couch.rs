use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{
    Method, RequestBuilder, StatusCode, Url,
    header::{ACCEPT, AUTHORIZATION, HeaderValue},
};
use serde_json::Value;
use tracing::trace;

use crate::{CouchflowError, Result, config::CouchConfig, credentials::ConnectionCredentials};

use super::{Connector, Document, DocumentStore};

const DESIGN_PREFIX: &str = "_design/";

/// CouchDB / Cloudant client speaking the REST API.
#[derive(Debug, Clone)]
pub struct CouchStore {
    client: reqwest::Client,
    base: Url,
    auth: Option<HeaderValue>,
}

impl CouchStore {
    /// Build a client from credentials.
    ///
    /// A manual `url` is used as the server root, otherwise the account's
    /// Cloudant host. Any login embedded in the URL is moved into a basic
    /// authorization header.
    pub fn new(
        credentials: &ConnectionCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base = match &credentials.url {
            Some(url) => Url::parse(url).map_err(|e| CouchflowError::Config(format!("invalid url '{}': {}", url, e)))?,
            None if credentials.account.is_empty() => return Err(CouchflowError::Config("missing cloudant account".to_string())),
            None => Url::parse(&format!("https://{}.cloudant.com", credentials.account)).map_err(|e| CouchflowError::Config(e.to_string()))?,
        };
        if base.cannot_be_a_base() {
            return Err(CouchflowError::Config(format!("url '{}' cannot be used as server root", base)));
        }

        let (username, password) = if credentials.username.is_empty() {
            (base.username().to_string(), base.password().unwrap_or_default().to_string())
        } else {
            (credentials.username.clone(), credentials.password.clone())
        };
        let _ = base.set_username("");
        let _ = base.set_password(None);

        let auth = if username.is_empty() {
            None
        } else {
            let encoded = STANDARD.encode(format!("{}:{}", username, password));
            let value = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| CouchflowError::Config(e.to_string()))?;
            Some(value)
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base,
            auth,
        })
    }

    /// Server root the client talks to, without credentials.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(
        &self,
        segments: &[&str],
    ) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut().map_err(|_| CouchflowError::Config(format!("url '{}' cannot be used as server root", self.base)))?.pop_if_empty().extend(segments);
        Ok(url)
    }

    fn doc_url(
        &self,
        db: &str,
        id: &str,
    ) -> Result<Url> {
        match id.strip_prefix(DESIGN_PREFIX) {
            Some(name) => self.url(&[db, "_design", name]),
            None => self.url(&[db, id]),
        }
    }

    fn request(
        &self,
        method: Method,
        url: Url,
    ) -> RequestBuilder {
        trace!("couch::{} {}", method, url);
        let mut request = self.client.request(method, url).header(ACCEPT, "application/json");
        if let Some(auth) = &self.auth {
            request = request.header(AUTHORIZATION, auth.clone());
        }
        request
    }

    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> Result<Value> {
        let res = request.send().await?;
        let status = res.status();
        let text = res.text().await?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify(status, &body))
        }
    }
}

/// Map a failed response to an error kind using the status and CouchDB's
/// `{error, reason}` body.
fn classify(
    status: StatusCode,
    body: &Value,
) -> CouchflowError {
    let error = body.get("error").and_then(Value::as_str).unwrap_or_default();
    let reason = body.get("reason").and_then(Value::as_str).unwrap_or_default();
    let detail = match (error.is_empty(), reason.is_empty()) {
        (false, false) => format!("{}: {}", error, reason),
        (false, true) => error.to_string(),
        (true, false) => reason.to_string(),
        (true, true) => status.to_string(),
    };

    match status {
        StatusCode::NOT_FOUND => CouchflowError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CouchflowError::Unauthorized(detail),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => CouchflowError::Conflict(detail),
        _ => CouchflowError::Transport(format!("status {}: {}", status.as_u16(), detail)),
    }
}

/// View parameters travel as JSON-encoded query values.
fn view_params(options: &Document) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(k, v)| {
            let value = match k.as_str() {
                "stale" | "update" => v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()),
                _ => v.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let body = self.execute(self.request(Method::GET, self.url(&["_all_dbs"])?)).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn create_database(
        &self,
        name: &str,
    ) -> Result<()> {
        self.execute(self.request(Method::PUT, self.url(&[name])?)).await?;
        Ok(())
    }

    async fn get(
        &self,
        db: &str,
        id: &str,
    ) -> Result<Value> {
        self.execute(self.request(Method::GET, self.doc_url(db, id)?)).await
    }

    async fn insert(
        &self,
        db: &str,
        doc: &Document,
    ) -> Result<Value> {
        self.execute(self.request(Method::POST, self.url(&[db])?).json(doc)).await
    }

    async fn destroy(
        &self,
        db: &str,
        id: &str,
        rev: &str,
    ) -> Result<Value> {
        self.execute(self.request(Method::DELETE, self.doc_url(db, id)?).query(&[("rev", rev)])).await
    }

    async fn find(
        &self,
        db: &str,
        query: &Document,
    ) -> Result<Value> {
        self.execute(self.request(Method::POST, self.url(&[db, "_find"])?).json(query)).await
    }

    async fn search(
        &self,
        db: &str,
        design: &str,
        index: &str,
        options: &Document,
    ) -> Result<Value> {
        let url = self.url(&[db, "_design", design, "_search", index])?;
        self.execute(self.request(Method::POST, url).json(options)).await
    }

    async fn list(
        &self,
        db: &str,
        options: &Document,
    ) -> Result<Value> {
        let url = self.url(&[db, "_all_docs"])?;
        self.execute(self.request(Method::GET, url).query(&view_params(options))).await
    }
}

/// Opens a [`CouchStore`] per node.
#[derive(Debug, Clone, Default)]
pub struct CouchConnector {
    config: CouchConfig,
}

impl CouchConnector {
    pub fn new(config: CouchConfig) -> Self {
        Self {
            config,
        }
    }
}

#[async_trait]
impl Connector for CouchConnector {
    async fn connect(
        &self,
        credentials: &ConnectionCredentials,
    ) -> Result<Arc<dyn DocumentStore>> {
        let store = CouchStore::new(credentials, Duration::from_millis(self.config.request_timeout))?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    use super::*;

    fn credentials(url: &str) -> ConnectionCredentials {
        ConnectionCredentials {
            account: "local".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            url: Some(url.to_string()),
        }
    }

    fn store(server: &MockServer) -> CouchStore {
        CouchStore::new(&credentials(&server.uri()), Duration::from_secs(5)).unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_from_account() {
        let credentials = ConnectionCredentials {
            account: "acme".to_string(),
            username: "acme".to_string(),
            password: "pw".to_string(),
            url: None,
        };
        let store = CouchStore::new(&credentials, Duration::from_secs(1)).unwrap();
        assert_eq!(store.base_url().as_str(), "https://acme.cloudant.com/");
    }

    #[test]
    fn test_new_strips_login_from_url() {
        let mut credentials = credentials("https://admin:pw@acme.cloudant.com");
        credentials.username = String::new();
        let store = CouchStore::new(&credentials, Duration::from_secs(1)).unwrap();
        assert_eq!(store.base_url().as_str(), "https://acme.cloudant.com/");
        assert!(store.auth.is_some());
    }

    #[test]
    fn test_new_requires_account_or_url() {
        let credentials = ConnectionCredentials::default();
        assert!(CouchStore::new(&credentials, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_list_databases_sends_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_all_dbs"))
            .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["_users", "orders"])))
            .mount(&server)
            .await;

        let dbs = store(&server).list_databases().await.unwrap();
        assert_eq!(dbs, vec!["_users".to_string(), "orders".to_string()]);
    }

    #[tokio::test]
    async fn test_list_databases_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_all_dbs"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "forbidden", "reason": "server admin required"})))
            .mount(&server)
            .await;

        let err = store(&server).list_databases().await.unwrap_err();
        assert_eq!(err, CouchflowError::Unauthorized("forbidden: server admin required".to_string()));
    }

    #[tokio::test]
    async fn test_insert_missing_database() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_json(json!({"a": 1})))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not_found", "reason": "Database does not exist."})))
            .mount(&server)
            .await;

        let err = store(&server).insert("orders", &doc(json!({"a": 1}))).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_database_exists() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(412).set_body_json(json!({"error": "file_exists", "reason": "The database could not be created, the file already exists."})))
            .mount(&server)
            .await;

        assert!(store(&server).create_database("orders").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_destroy_passes_rev() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orders/a"))
            .and(query_param("rev", "1-x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "id": "a", "rev": "2-y"})))
            .mount(&server)
            .await;

        let res = store(&server).destroy("orders", "a", "1-x").await.unwrap();
        assert_eq!(res["rev"], json!("2-y"));
    }

    #[tokio::test]
    async fn test_get_design_document_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/_design/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "_design/search"})))
            .mount(&server)
            .await;

        let res = store(&server).get("orders", "_design/search").await.unwrap();
        assert_eq!(res["_id"], json!("_design/search"));
    }

    #[tokio::test]
    async fn test_search_posts_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/_design/app/_search/by_status"))
            .and(body_json(json!({"query": "status:open", "include_docs": true, "limit": 200})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_rows": 0, "rows": []})))
            .mount(&server)
            .await;

        let options = doc(json!({"query": "status:open", "include_docs": true, "limit": 200}));
        let res = store(&server).search("orders", "app", "by_status", &options).await.unwrap();
        assert_eq!(res["rows"], json!([]));
    }

    #[tokio::test]
    async fn test_list_encodes_view_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/_all_docs"))
            .and(query_param("include_docs", "true"))
            .and(query_param("startkey", "\"a\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_rows": 0, "offset": 0, "rows": []})))
            .mount(&server)
            .await;

        let options = doc(json!({"include_docs": true, "startkey": "a"}));
        let res = store(&server).list("orders", &options).await.unwrap();
        assert_eq!(res["total_rows"], json!(0));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/_find"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = store(&server).find("orders", &doc(json!({"selector": {}}))).await.unwrap_err();
        assert!(matches!(err, CouchflowError::Transport(_)));
    }
}
