//! Remote artifact stores: bucket/key blob storage for deployed models.

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StageError;
use crate::persistence::atomic_write;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A single bucket of opaque blobs addressed by key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn exists(&self, key: &str) -> Result<bool, StageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StageError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StageError>;

    /// `<bucket>/<key>`, as recorded in artifacts.
    fn remote_path(&self, key: &str) -> String {
        format!("{}/{}", self.bucket(), key.trim_start_matches('/'))
    }
}

/// Build the store described by `config`.
pub fn open_artifact_store(config: &StoreConfig) -> Result<Arc<dyn ArtifactStore>, StageError> {
    Ok(match &config.backend {
        StoreBackend::Local { root } => {
            Arc::new(LocalArtifactStore::new(root.clone(), &config.bucket_name))
        }
        StoreBackend::Http { endpoint, token } => Arc::new(HttpArtifactStore::new(
            endpoint,
            &config.bucket_name,
            token.clone(),
        )?),
    })
}

/// Keys are relative, slash-separated paths without `..`.
fn check_key(key: &str) -> Result<(), StageError> {
    let path = Path::new(key);
    let ok = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(StageError::config(format!("invalid artifact key '{key}'")))
    }
}

// ---------------------------------------------------------------------------
// LocalArtifactStore
// ---------------------------------------------------------------------------

/// Buckets as directories: `<root>/<bucket>/<key>`.
pub struct LocalArtifactStore {
    root: PathBuf,
    bucket: String,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf, bucket: &str) -> Self {
        Self {
            root,
            bucket: bucket.to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StageError> {
        check_key(key)?;
        Ok(self.root.join(&self.bucket).join(key))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn exists(&self, key: &str) -> Result<bool, StageError> {
        Ok(tokio::fs::try_exists(self.path_for(key)?).await?)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StageError> {
        Ok(tokio::fs::read(self.path_for(key)?).await?)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StageError> {
        let path = self.path_for(key)?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| StageError::deployment(format!("write task join error: {e}")))??;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HttpArtifactStore
// ---------------------------------------------------------------------------

/// Path-style HTTP object store: `HEAD|GET|PUT <endpoint>/<bucket>/<key>`.
pub struct HttpArtifactStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(endpoint: &str, bucket: &str, token: Option<String>) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("mlops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, endpoint, bucket, token))
    }

    /// Use a preconfigured client (proxies, TLS roots, timeouts).
    pub fn with_client(
        client: reqwest::Client,
        endpoint: &str,
        bucket: &str,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token,
        }
    }

    pub fn url_for(&self, key: &str) -> Result<String, StageError> {
        check_key(key)?;
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, key))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn exists(&self, key: &str) -> Result<bool, StageError> {
        let url = self.url_for(key)?;
        let response = self.request(reqwest::Method::HEAD, &url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StageError::deployment(format!("HEAD {url} returned {status}"))),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StageError> {
        let url = self.url_for(key)?;
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StageError> {
        let url = self.url_for(key)?;
        self.request(reqwest::Method::PUT, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read one HTTP/1.1 request: the head as text plus the body bytes.
    async fn read_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        Some((head, buf[head_end..head_end + length].to_vec()))
    }

    /// Path-style object server on 127.0.0.1. PUT stores the body, HEAD and
    /// GET serve it or answer 404, and the `broken` bucket always answers 500.
    /// Returns the endpoint and every request head received.
    async fn object_server() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let heads = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&heads);
        tokio::spawn(async move {
            let mut objects: HashMap<String, Vec<u8>> = HashMap::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some((head, body)) = read_request(&mut socket).await else {
                    continue;
                };
                seen.lock().unwrap().push(head.clone());
                let mut request_line = head.split_whitespace();
                let method = request_line.next().unwrap_or_default().to_string();
                let path = request_line.next().unwrap_or_default().to_string();

                let (status, payload) = if path.starts_with("/broken/") {
                    ("500 Internal Server Error", Vec::new())
                } else {
                    match (method.as_str(), objects.get(&path)) {
                        ("PUT", _) => {
                            objects.insert(path, body);
                            ("200 OK", Vec::new())
                        }
                        ("HEAD", Some(_)) => ("200 OK", Vec::new()),
                        ("GET", Some(stored)) => ("200 OK", stored.clone()),
                        _ => ("404 Not Found", Vec::new()),
                    }
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    payload.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&payload).await;
                let _ = socket.shutdown().await;
            }
        });
        (endpoint, heads)
    }

    fn http_store(endpoint: &str, bucket: &str, token: Option<&str>) -> HttpArtifactStore {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpArtifactStore::with_client(client, endpoint, bucket, token.map(str::to_string))
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(tmp.path().to_path_buf(), "my-model-mlopsproj");
        let key = "model-registry/model.json";

        assert!(!store.exists(key).await.unwrap());
        store.put(key, b"{}".to_vec()).await.unwrap();
        assert!(store.exists(key).await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), b"{}");
        assert!(
            tmp.path()
                .join("my-model-mlopsproj")
                .join("model-registry")
                .join("model.json")
                .exists()
        );
        assert_eq!(store.remote_path(key), "my-model-mlopsproj/model-registry/model.json");
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_the_bucket() {
        let tmp = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(tmp.path().to_path_buf(), "b");
        assert!(store.put("../outside.json", vec![]).await.is_err());
        assert!(store.exists("/abs.json").await.is_err());
        assert!(store.get("").await.is_err());
    }

    #[test]
    fn test_http_urls_are_path_style() {
        let store =
            HttpArtifactStore::new("http://localhost:9000/", "models", Some("t".into())).unwrap();
        assert_eq!(
            store.url_for("registry/model.json").unwrap(),
            "http://localhost:9000/models/registry/model.json"
        );
    }

    #[tokio::test]
    async fn test_http_store_status_mapping_and_roundtrip() {
        let (endpoint, heads) = object_server().await;
        let store = http_store(&endpoint, "models", Some("s3cret"));
        let key = "model-registry/model.json";
        let model = br#"{"id":"m1","forest":{"trees":[]}}"#.to_vec();

        // Nothing deployed yet: HEAD 404 is "absent", GET 404 is an error.
        assert!(!store.exists(key).await.unwrap());
        let err = store.get(key).await.unwrap_err();
        assert!(matches!(&err, StageError::Http(e) if e.status() == Some(StatusCode::NOT_FOUND)));

        store.put(key, model.clone()).await.unwrap();
        assert!(store.exists(key).await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), model);

        let heads = heads.lock().unwrap().clone();
        assert_eq!(heads.len(), 5);
        for head in &heads {
            assert!(head.contains(" /models/model-registry/model.json "), "{head}");
            assert!(head.to_ascii_lowercase().contains("authorization: bearer s3cret"), "{head}");
        }
        let put = heads.iter().find(|h| h.starts_with("PUT ")).unwrap();
        assert!(put.to_ascii_lowercase().contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn test_http_store_server_errors_are_failures() {
        let (endpoint, heads) = object_server().await;
        let store = http_store(&endpoint, "broken", None);
        let key = "model-registry/model.json";

        let err = store.exists(key).await.unwrap_err();
        assert!(matches!(&err, StageError::Deployment(msg) if msg.contains("500")));
        let err = store.get(key).await.unwrap_err();
        assert!(matches!(&err, StageError::Http(e) if e.status() == Some(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(store.put(key, b"{}".to_vec()).await.is_err());

        let heads = heads.lock().unwrap().clone();
        assert_eq!(heads.len(), 3);
        assert!(heads.iter().all(|h| !h.to_ascii_lowercase().contains("authorization:")));
    }

    #[test]
    fn test_open_from_config() {
        let config = StoreConfig::default();
        let store = open_artifact_store(&config).unwrap();
        assert_eq!(store.bucket(), "my-model-mlopsproj");
    }
}
