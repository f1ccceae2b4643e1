//! IPFS Cluster REST Adapter
//!
//! Implements [`ClusterNodeClient`] against the cluster REST API (default port
//! 9094). Uploads are streamed from the staged temp file so the payload is
//! never held in memory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::config::CoordinatorConfig;
use crate::domain::{Cid, ClusterNodeClient, PinFilter, PinRecord, StagedUpload, UnpinOutcome};
use crate::error::{Error, Result};

/// HTTP client for cluster nodes.
#[derive(Debug, Clone)]
pub struct HttpClusterClient {
    client: Client,
    request_timeout: Duration,
    replication_min: Option<i32>,
    replication_max: Option<i32>,
}

impl HttpClusterClient {
    /// Create a client from the coordinator configuration.
    ///
    /// The client has no global timeout; every call sets its own, and the
    /// upload bound is applied by the caller.
    pub fn new(config: &CoordinatorConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.probe_timeout())
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            replication_min: config.replication_factor_min,
            replication_max: config.replication_factor_max,
        })
    }

    async fn send(&self, endpoint: &str, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| Error::NodeRequest {
            node: endpoint.to_string(),
            source: e,
        })
    }

    async fn read_body(&self, endpoint: &str, response: Response) -> Result<String> {
        response.text().await.map_err(|e| Error::NodeRequest {
            node: endpoint.to_string(),
            source: e,
        })
    }

    /// Fail on a non-success status, carrying the body for diagnostics.
    async fn expect_success(&self, endpoint: &str, response: Response) -> Result<String> {
        let status = response.status();
        let body = self.read_body(endpoint, response).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::NodeResponse {
                node: endpoint.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            })
        }
    }

    fn add_query(&self, upload: &StagedUpload) -> Vec<(&'static str, String)> {
        let mut query = vec![("name", upload.name.clone())];
        if let Some(min) = self.replication_min {
            query.push(("replication-min", min.to_string()));
        }
        if let Some(max) = self.replication_max {
            query.push(("replication-max", max.to_string()));
        }
        query
    }
}

#[async_trait]
impl ClusterNodeClient for HttpClusterClient {
    async fn health(&self, endpoint: &str) -> Result<()> {
        let url = format!("{}/health", endpoint);
        let response = self
            .send(endpoint, self.client.get(&url).timeout(self.request_timeout))
            .await?;
        self.expect_success(endpoint, response).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn peers(&self, endpoint: &str) -> Result<Vec<Value>> {
        let url = format!("{}/peers", endpoint);
        let response = self
            .send(endpoint, self.client.get(&url).timeout(self.request_timeout))
            .await?;
        let body = self.expect_success(endpoint, response).await?;
        parse_json_documents(&body).map_err(|reason| Error::ResponseParse {
            source_url: url,
            reason,
        })
    }

    #[instrument(skip(self, filter), fields(filter = %filter.as_query()))]
    async fn pins(&self, endpoint: &str, filter: &PinFilter) -> Result<Vec<PinRecord>> {
        let url = if filter.is_empty() {
            format!("{}/pins", endpoint)
        } else {
            format!(
                "{}/pins?filter={}",
                endpoint,
                urlencoding::encode(&filter.as_query())
            )
        };
        let response = self
            .send(endpoint, self.client.get(&url).timeout(self.request_timeout))
            .await?;
        let body = self.expect_success(endpoint, response).await?;
        let documents = parse_json_documents(&body).map_err(|reason| Error::ResponseParse {
            source_url: url.clone(),
            reason,
        })?;

        let mut pins = Vec::with_capacity(documents.len());
        for doc in &documents {
            match PinRecord::from_cluster_json(doc) {
                Ok(record) => pins.push(record),
                Err(e) => debug!(error = %e, "Skipping unparseable pin entry"),
            }
        }
        Ok(pins)
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn pin_status(&self, endpoint: &str, cid: &Cid) -> Result<Option<PinRecord>> {
        let url = format!("{}/pins/{}", endpoint, cid);
        let response = self
            .send(endpoint, self.client.get(&url).timeout(self.request_timeout))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = self.expect_success(endpoint, response).await?;
        let doc: Value = serde_json::from_str(&body).map_err(|e| Error::ResponseParse {
            source_url: url,
            reason: e.to_string(),
        })?;
        PinRecord::from_cluster_json(&doc).map(Some)
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn unpin(&self, endpoint: &str, cid: &Cid) -> Result<UnpinOutcome> {
        let url = format!("{}/pins/{}", endpoint, cid);
        let response = self
            .send(endpoint, self.client.delete(&url).timeout(self.request_timeout))
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(UnpinOutcome::AlreadyUnpinned);
        }
        match self.expect_success(endpoint, response).await {
            Ok(_) => Ok(UnpinOutcome::Removed),
            Err(Error::NodeResponse { body, .. }) if reports_not_pinned(&body) => {
                Ok(UnpinOutcome::AlreadyUnpinned)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, upload), fields(name = %upload.name, size = upload.size))]
    async fn add(&self, endpoint: &str, upload: &StagedUpload) -> Result<String> {
        let url = format!("{}/add", endpoint);
        let file = tokio::fs::File::open(upload.path()).await?;
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), upload.size)
            .file_name(upload.name.clone())
            .mime_str(&upload.mimetype)
            .map_err(|e| Error::NodeRequest {
                node: endpoint.to_string(),
                source: e,
            })?;
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(&url)
            .query(&self.add_query(upload))
            .multipart(form);
        let response = self.send(endpoint, request).await?;
        self.expect_success(endpoint, response).await
    }
}

/// Cluster error bodies for unpinning something that is not pinned.
fn reports_not_pinned(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("not pinned")
}

/// Decode a JSON array, a single object, or newline-delimited objects.
pub(crate) fn parse_json_documents(body: &str) -> std::result::Result<Vec<Value>, String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => return Ok(items),
        Ok(Value::Null) => return Ok(Vec::new()),
        Ok(other) => return Ok(vec![other]),
        Err(_) => {}
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<Value>(line).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let docs = parse_json_documents(r#"[{"id":"a"},{"id":"b"}]"#).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_parse_single_object() {
        let docs = parse_json_documents(r#"{"id":"a"}"#).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], "a");
    }

    #[test]
    fn test_parse_ndjson_stream() {
        let body = "{\"cid\":\"QmA\"}\n\n{\"cid\":\"QmB\"}\n";
        let docs = parse_json_documents(body).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["cid"], "QmB");
    }

    #[test]
    fn test_parse_empty_and_null() {
        assert!(parse_json_documents("").unwrap().is_empty());
        assert!(parse_json_documents("null").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_json_documents("<html>oops</html>").is_err());
    }

    #[test]
    fn test_reports_not_pinned() {
        assert!(reports_not_pinned(r#"{"code":500,"message":"uncommitted to state: not found"}"#));
        assert!(reports_not_pinned("Cid is NOT PINNED"));
        assert!(!reports_not_pinned("context deadline exceeded"));
    }

    #[test]
    fn test_client_from_default_config() {
        let client = HttpClusterClient::new(&CoordinatorConfig::default()).unwrap();
        assert_eq!(client.request_timeout, Duration::from_secs(10));
        assert!(client.replication_min.is_none());
    }

    // =========================================================================
    // Against a local cluster node
    // =========================================================================

    mod wire {
        use super::*;
        use std::convert::Infallible;
        use std::net::SocketAddr;
        use std::sync::Arc;

        use assert_matches::assert_matches;
        use bytes::Bytes;
        use http_body_util::{BodyExt, Full};
        use hyper::body::Incoming;
        use hyper::header::CONTENT_TYPE;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Method, Request};
        use hyper_util::rt::TokioIo;
        use parking_lot::Mutex;
        use tokio::net::TcpListener;

        use reqwest::StatusCode;

        use crate::adapters::{EventJournal, HttpClusterClient, MockGatewayClient};
        use crate::cluster::ClusterCoordinator;
        use crate::config::CoordinatorConfig;
        use crate::domain::{
            Cid, ClusterNodeClient, PinFilter, StagedUpload, UnpinOutcome, UploadRequest,
        };
        use crate::error::Error;

        const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

        type Reply = Arc<dyn Fn(&Method, &str) -> (u16, String) + Send + Sync>;

        #[derive(Debug, Clone)]
        struct Seen {
            method: Method,
            path: String,
            query: Option<String>,
            content_type: Option<String>,
            body: Bytes,
        }

        /// A scripted cluster node listening on an ephemeral local port.
        struct LocalNode {
            addr: SocketAddr,
            seen: Arc<Mutex<Vec<Seen>>>,
        }

        impl LocalNode {
            async fn start<F>(reply: F) -> Self
            where
                F: Fn(&Method, &str) -> (u16, String) + Send + Sync + 'static,
            {
                let reply: Reply = Arc::new(reply);
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                let seen = Arc::new(Mutex::new(Vec::new()));
                let log = seen.clone();

                tokio::spawn(async move {
                    while let Ok((stream, _)) = listener.accept().await {
                        let log = log.clone();
                        let reply = reply.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let log = log.clone();
                                let reply = reply.clone();
                                async move {
                                    let method = req.method().clone();
                                    let path = req.uri().path().to_string();
                                    let query = req.uri().query().map(str::to_string);
                                    let content_type = req
                                        .headers()
                                        .get(CONTENT_TYPE)
                                        .and_then(|v| v.to_str().ok())
                                        .map(str::to_string);
                                    let body = req
                                        .into_body()
                                        .collect()
                                        .await
                                        .map(|c| c.to_bytes())
                                        .unwrap_or_default();

                                    let (status, text) = reply(&method, &path);
                                    log.lock().push(Seen {
                                        method,
                                        path,
                                        query,
                                        content_type,
                                        body,
                                    });

                                    let mut response =
                                        hyper::Response::new(Full::new(Bytes::from(text)));
                                    *response.status_mut() =
                                        StatusCode::from_u16(status).unwrap();
                                    Ok::<_, Infallible>(response)
                                }
                            });
                            let _ = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await;
                        });
                    }
                });

                Self { addr, seen }
            }

            fn endpoint(&self) -> String {
                format!("http://{}", self.addr)
            }

            fn seen(&self) -> Vec<Seen> {
                self.seen.lock().clone()
            }
        }

        fn client() -> HttpClusterClient {
            HttpClusterClient::new(&CoordinatorConfig::default()).unwrap()
        }

        fn cid() -> Cid {
            Cid::parse(CID).unwrap()
        }

        #[tokio::test]
        async fn test_unpin_404_is_already_unpinned() {
            let node = LocalNode::start(|_, _| (404, String::new())).await;

            let outcome = client().unpin(&node.endpoint(), &cid()).await.unwrap();

            assert_eq!(outcome, UnpinOutcome::AlreadyUnpinned);
            let seen = node.seen();
            assert_eq!(seen[0].method, Method::DELETE);
            assert_eq!(seen[0].path, format!("/pins/{}", CID));
        }

        #[tokio::test]
        async fn test_unpin_not_pinned_body_is_already_unpinned() {
            let node = LocalNode::start(|_, _| {
                (500, r#"{"code":500,"message":"cid is not pinned"}"#.to_string())
            })
            .await;

            let outcome = client().unpin(&node.endpoint(), &cid()).await.unwrap();

            assert_eq!(outcome, UnpinOutcome::AlreadyUnpinned);
        }

        #[tokio::test]
        async fn test_unpin_success_and_real_failure() {
            let removed = LocalNode::start(|_, _| (200, format!(r#"{{"cid":"{}"}}"#, CID))).await;
            assert_eq!(
                client().unpin(&removed.endpoint(), &cid()).await.unwrap(),
                UnpinOutcome::Removed
            );

            let broken =
                LocalNode::start(|_, _| (500, "raft: leader unknown".to_string())).await;
            assert_matches!(
                client().unpin(&broken.endpoint(), &cid()).await,
                Err(Error::NodeResponse { status: 500, .. })
            );
        }

        #[tokio::test]
        async fn test_pin_status_404_is_none() {
            let node = LocalNode::start(|_, _| (404, "not found".to_string())).await;

            let status = client().pin_status(&node.endpoint(), &cid()).await.unwrap();

            assert!(status.is_none());
            assert_eq!(node.seen()[0].method, Method::GET);
        }

        #[tokio::test]
        async fn test_coordinator_pin_status_404_is_not_found() {
            let node = LocalNode::start(|_, path| match path {
                "/health" => (200, String::new()),
                _ => (404, String::new()),
            })
            .await;
            let config = CoordinatorConfig {
                nodes: vec![node.endpoint()],
                healthy_quorum: 1,
                ..Default::default()
            };
            let coordinator = ClusterCoordinator::with_clients(
                config.clone(),
                Arc::new(HttpClusterClient::new(&config).unwrap()),
                Arc::new(MockGatewayClient::new()),
                Arc::new(EventJournal::new()),
            )
            .unwrap();

            assert_matches!(coordinator.pin_status(&cid()).await, Err(Error::NotFound(_)));
            assert_eq!(
                coordinator.unpin(&cid()).await.unwrap(),
                UnpinOutcome::AlreadyUnpinned
            );
        }

        #[tokio::test]
        async fn test_pins_sends_filter_and_reads_ndjson() {
            let node = LocalNode::start(|_, _| {
                (
                    200,
                    format!(
                        "{{\"cid\":\"{}\",\"peer_map\":{{\"p1\":{{\"status\":\"pinned\"}}}}}}\n",
                        CID
                    ),
                )
            })
            .await;
            let filter = PinFilter::parse("pinned,pinning").unwrap();

            let pins = client().pins(&node.endpoint(), &filter).await.unwrap();

            assert_eq!(pins.len(), 1);
            assert_eq!(pins[0].cid().as_str(), CID);
            assert_eq!(node.seen()[0].query.as_deref(), Some("filter=pinned%2Cpinning"));
        }

        #[tokio::test]
        async fn test_add_posts_multipart_file_part() {
            let node = LocalNode::start(|_, _| (200, format!(r#"{{"cid":"{}"}}"#, CID))).await;
            let config = CoordinatorConfig {
                replication_factor_min: Some(2),
                replication_factor_max: Some(3),
                ..Default::default()
            };
            let client = HttpClusterClient::new(&config).unwrap();
            let dir = tempfile::TempDir::new().unwrap();
            let request = UploadRequest::from_bytes("hello.txt", &b"hello fleet"[..]);
            let staged = StagedUpload::stage(dir.path(), &request).await.unwrap();

            let body = client.add(&node.endpoint(), &staged).await.unwrap();

            assert!(body.contains(CID));
            let seen = node.seen();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].method, Method::POST);
            assert_eq!(seen[0].path, "/add");
            assert_eq!(
                seen[0].query.as_deref(),
                Some("name=hello.txt&replication-min=2&replication-max=3")
            );
            assert!(seen[0]
                .content_type
                .as_deref()
                .unwrap()
                .starts_with("multipart/form-data; boundary="));
            let form = String::from_utf8_lossy(&seen[0].body);
            assert!(form.contains(r#"name="file""#));
            assert!(form.contains(r#"filename="hello.txt""#));
            assert!(form.contains("Content-Type: text/plain"));
            assert!(form.contains("hello fleet"));
        }
    }
}
