use std::collections::HashMap;
use std::io::{self, Cursor, Read};

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::debug;
use url::Url;

#[cfg(test)]
use mockall::automock;

use crate::error::FetchError;

/// Blocking access to the object store holding uploaded snapshots.
///
/// Implementations are called from blocking worker threads, never from inside an async task.
#[cfg_attr(test, automock)]
pub trait ObjectStore: Send + Sync {
    /// Buffers the whole response body.
    fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError>;

    /// Streams the response body. Read errors surface as `io::Error` from the reader.
    fn fetch_reader(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError>;
}

pub fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{}`", other),
        }),
    }
}

/// Single GET per fetch over a shared client; no retries, transport default timeouts.
pub struct HttpObjectStore {
    client: Client,
    handle: Handle,
}

impl HttpObjectStore {
    pub fn new(client: Client, handle: Handle) -> Self {
        Self { client, handle }
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, FetchError> {
        debug!(url = %url, "fetching object");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

impl ObjectStore for HttpObjectStore {
    fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        let url = parse_url(url)?;

        self.handle.block_on(async {
            let response = self.send(url.clone()).await?;
            response
                .bytes()
                .await
                .map_err(|source| FetchError::Transport {
                    url: url.to_string(),
                    source,
                })
        })
    }

    fn fetch_reader(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        let url = parse_url(url)?;
        let response = self.handle.block_on(self.send(url))?;

        let stream = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));
        let reader = StreamReader::new(Box::pin(stream));

        Ok(Box::new(SyncIoBridge::new_with_handle(
            reader,
            self.handle.clone(),
        )))
    }
}

/// Serves objects from memory, keyed by the exact url string.
#[derive(Debug, Default, Clone)]
pub struct StaticObjectStore {
    objects: HashMap<String, Bytes>,
}

impl StaticObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.objects.insert(url.into(), body.into());
    }

    fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        parse_url(url)?;
        self.objects.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

impl ObjectStore for StaticObjectStore {
    fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        self.get(url)
    }

    fn fetch_reader(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        Ok(Box::new(Cursor::new(self.get(url)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("not a url")]
    #[case("ftp://bucket/object")]
    #[case("file:///etc/passwd")]
    fn test_parse_url_rejects(#[case] raw: &str) {
        assert!(matches!(
            parse_url(raw),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_parse_url_accepts_http() {
        let url = parse_url("https://s3.example.com/bucket/key?sig=1").unwrap();
        assert_eq!(url.host_str(), Some("s3.example.com"));
    }

    #[test]
    fn test_http_store_fails_fast_on_bad_url() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = HttpObjectStore::new(Client::new(), runtime.handle().clone());

        assert!(matches!(
            store.fetch_bytes("::"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            store.fetch_reader("::"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_store_reads_success_body() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/bucket/runtimes.json.gz"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_bytes(b"snapshot body".to_vec()),
            )
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(Client::new(), Handle::current());
        let url = format!("{}/bucket/runtimes.json.gz", server.uri());
        let (buffered, streamed) = tokio::task::spawn_blocking(move || {
            let buffered = store.fetch_bytes(&url).unwrap();
            let mut streamed = Vec::new();
            store
                .fetch_reader(&url)
                .unwrap()
                .read_to_end(&mut streamed)
                .unwrap();
            (buffered, streamed)
        })
        .await
        .unwrap();

        assert_eq!(buffered, "snapshot body");
        assert_eq!(streamed, b"snapshot body");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_store_maps_error_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503).set_body_string("slow down"))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(Client::new(), Handle::current());
        let url = format!("{}/bucket/runtimes.json.gz", server.uri());
        let (buffered, streamed) = tokio::task::spawn_blocking(move || {
            (
                store.fetch_bytes(&url).map(|_| ()),
                store.fetch_reader(&url).map(|_| ()),
            )
        })
        .await
        .unwrap();

        assert!(matches!(buffered, Err(FetchError::Status { status: 503, .. })));
        assert!(matches!(streamed, Err(FetchError::Status { status: 503, .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_store_reader_fails_on_cut_off_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 1024\r\n\r\npartial")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let store = HttpObjectStore::new(Client::new(), Handle::current());
        let url = format!("http://{}/bucket/archive.tar.gz", addr);
        let result = tokio::task::spawn_blocking(move || {
            let mut body = Vec::new();
            store.fetch_reader(&url).unwrap().read_to_end(&mut body)
        })
        .await
        .unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn test_static_store_serves_and_misses() {
        let mut store = StaticObjectStore::new();
        store.insert("http://store/a", Bytes::from_static(b"abc"));

        assert_eq!(store.fetch_bytes("http://store/a").unwrap(), "abc");

        let mut body = String::new();
        store
            .fetch_reader("http://store/a")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "abc");

        assert!(matches!(
            store.fetch_bytes("http://store/b"),
            Err(FetchError::Status { status: 404, .. })
        ));
    }
}
