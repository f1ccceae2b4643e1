//! HTTP Server
//!
//! Upstream surface over a [`ClusterCoordinator`]: cluster and gateway
//! operations and the recent event window under `/api`, plus `/healthz`,
//! `/readyz` and `/metrics`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::form::upload_from_body;
use super::health::HealthCheck;
use super::response::{status_for, ApiResponse};
use crate::cluster::ClusterCoordinator;
use crate::domain::{Cid, PinFilter};
use crate::error::{Error, Result};

const DEFAULT_EVENT_LIMIT: usize = 100;

// =============================================================================
// Routing
// =============================================================================

/// A resolved request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Status,
    Peers,
    Pins { filter: Option<String> },
    Add { name: Option<String> },
    PinStatus(String),
    Unpin(String),
    Download(String),
    Health,
    BestGateway,
    Metadata(String),
    Accessible(String),
    Events { limit: Option<String> },
    Healthz,
    Readyz,
    Metrics,
    NotFound,
}

/// Map a method, path and query string onto a route.
pub fn route(method: &Method, path: &str, query: Option<&str>) -> Route {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["healthz"]) | (&Method::GET, ["livez"]) => Route::Healthz,
        (&Method::GET, ["readyz"]) => Route::Readyz,
        (&Method::GET, ["metrics"]) => Route::Metrics,

        (&Method::GET, ["api", "cluster", "status"]) => Route::Status,
        (&Method::GET, ["api", "cluster", "peers"]) => Route::Peers,
        (&Method::GET, ["api", "cluster", "pins"]) => Route::Pins {
            filter: query_param(query, "filter"),
        },
        (&Method::POST, ["api", "cluster", "add"]) => Route::Add {
            name: query_param(query, "name"),
        },
        (&Method::GET, ["api", "cluster", "pins", cid]) => Route::PinStatus(cid.to_string()),
        (&Method::DELETE, ["api", "cluster", "pins", cid]) => Route::Unpin(cid.to_string()),
        (&Method::GET, ["api", "cluster", "download", cid]) => Route::Download(cid.to_string()),
        (&Method::GET, ["api", "cluster", "health"]) => Route::Health,

        (&Method::GET, ["api", "gateway", "best"]) => Route::BestGateway,
        (&Method::GET, ["api", "gateway", "metadata", cid]) => Route::Metadata(cid.to_string()),
        (&Method::GET, ["api", "gateway", "accessible", cid]) => {
            Route::Accessible(cid.to_string())
        }

        (&Method::GET, ["api", "events"]) => Route::Events {
            limit: query_param(query, "limit"),
        },

        _ => Route::NotFound,
    }
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| {
            urlencoding::decode(&v.replace('+', " "))
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| v.to_string())
        })
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Server
// =============================================================================

/// HTTP front end for one coordinator.
pub struct ApiServer {
    coordinator: Arc<ClusterCoordinator>,
    health: HealthCheck,
}

impl ApiServer {
    pub fn new(coordinator: Arc<ClusterCoordinator>) -> Self {
        Self {
            coordinator,
            health: HealthCheck::new(),
        }
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self: Arc<Self>, addr: &str) -> Result<()> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid API server address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind API server: {}", e)))?;

        info!("API server listening on {}", addr);

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| Error::Internal(format!("API server accept error: {}", e)))?;

            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle(req).await }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(%peer, "API server connection error: {}", e);
                }
            });
        }
    }

    async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        let route = route(req.method(), req.uri().path(), req.uri().query());
        debug!(method = %req.method(), path = %req.uri().path(), ?route, "API request");

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = if matches!(route, Route::Add { .. }) {
            match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    let err = Error::Internal(format!("Failed to read request body: {}", e));
                    return Ok(json_response(400, &ApiResponse::from_error(&err)));
                }
            }
        } else {
            Bytes::new()
        };

        Ok(self.dispatch(route, body, content_type).await)
    }

    /// Execute a resolved route.
    pub async fn dispatch(
        &self,
        route: Route,
        body: Bytes,
        content_type: Option<String>,
    ) -> Response<Full<Bytes>> {
        let coordinator = &self.coordinator;

        match route {
            Route::Healthz => {
                let check = self.health.liveness_check();
                let status = if check.status.is_healthy() { 200 } else { 503 };
                json_response(status, &check)
            }
            Route::Readyz => {
                let check = self.health.readiness_check(coordinator.is_running());
                let status = if check.status.is_healthy() { 200 } else { 503 };
                json_response(status, &check)
            }
            Route::Metrics => match coordinator.metrics().encode() {
                Ok((buffer, format)) => raw_response(200, &format, Bytes::from(buffer)),
                Err(e) => envelope(Err::<(), _>(e)),
            },

            Route::Status => envelope(coordinator.status().await),
            Route::Peers => envelope(coordinator.peers().await),
            Route::Pins { filter } => {
                let filter = match filter.as_deref().map(PinFilter::parse).transpose() {
                    Ok(filter) => filter.unwrap_or_default(),
                    Err(e) => return envelope(Err::<(), _>(e)),
                };
                envelope(coordinator.list_pins(&filter).await)
            }
            Route::Add { name } => {
                match upload_from_body(name, content_type.as_deref(), body).await {
                    Ok(request) => envelope(coordinator.add(request).await),
                    Err(e) => envelope(Err::<(), _>(e)),
                }
            }
            Route::PinStatus(cid) => match Cid::parse(&cid) {
                Ok(cid) => envelope(coordinator.pin_status(&cid).await),
                Err(e) => envelope(Err::<(), _>(e)),
            },
            Route::Unpin(cid) => match Cid::parse(&cid) {
                Ok(cid) => envelope(
                    coordinator
                        .unpin(&cid)
                        .await
                        .map(|outcome| serde_json::json!({ "cid": cid, "outcome": outcome })),
                ),
                Err(e) => envelope(Err::<(), _>(e)),
            },
            Route::Download(cid) => match Cid::parse(&cid) {
                Ok(cid) => match coordinator.download(&cid).await {
                    Ok(bytes) => raw_response(200, "application/octet-stream", bytes),
                    Err(e) => envelope(Err::<(), _>(e)),
                },
                Err(e) => envelope(Err::<(), _>(e)),
            },
            Route::Health => envelope(coordinator.health_check().await),

            Route::BestGateway => envelope(
                coordinator
                    .best_gateway()
                    .await
                    .map(|gateway| serde_json::json!({ "gateway": gateway })),
            ),
            Route::Metadata(cid) => match Cid::parse(&cid) {
                Ok(cid) => envelope(coordinator.metadata(&cid).await),
                Err(e) => envelope(Err::<(), _>(e)),
            },
            Route::Accessible(cid) => match Cid::parse(&cid) {
                Ok(cid) => {
                    let accessible = coordinator.is_accessible(&cid).await;
                    json_response(
                        200,
                        &ApiResponse::ok(serde_json::json!({ "cid": cid, "accessible": accessible })),
                    )
                }
                Err(e) => envelope(Err::<(), _>(e)),
            },

            Route::Events { limit } => {
                let limit = match limit.as_deref().map(str::parse::<usize>).transpose() {
                    Ok(limit) => limit.unwrap_or(DEFAULT_EVENT_LIMIT),
                    Err(e) => {
                        return envelope(Err::<(), _>(Error::BadRequest(format!("limit: {}", e))))
                    }
                };
                json_response(
                    200,
                    &ApiResponse::ok(serde_json::json!({
                        "events": coordinator.recent_events(limit),
                        "evicted": coordinator.evicted_events(),
                    })),
                )
            }

            Route::NotFound => json_response(
                404,
                &ApiResponse::from_error(&Error::NotFound("no such route".into())),
            ),
        }
    }
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

// =============================================================================
// Response helpers
// =============================================================================

fn envelope<T: serde::Serialize>(result: Result<T>) -> Response<Full<Bytes>> {
    match result {
        Ok(data) => json_response(200, &ApiResponse::ok(data)),
        Err(e) => json_response(status_for(&e), &ApiResponse::from_error(&e)),
    }
}

fn json_response<T: serde::Serialize>(status: u16, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| br#"{"success":false}"#.to_vec());
    raw_response(status, "application/json", Bytes::from(bytes))
}

fn raw_response(status: u16, content_type: &str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EventJournal, MockAdd, MockClusterClient, MockGatewayClient};
    use crate::config::CoordinatorConfig;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    struct Harness {
        cluster: Arc<MockClusterClient>,
        gateways: Arc<MockGatewayClient>,
        server: ApiServer,
    }

    fn harness() -> Harness {
        let cluster = Arc::new(MockClusterClient::new());
        let gateways = Arc::new(MockGatewayClient::new());
        let config = CoordinatorConfig {
            nodes: vec!["http://a:9094".into()],
            gateways: vec!["https://g1.test".into()],
            healthy_quorum: 1,
            replication_grace_ms: 1,
            ..Default::default()
        };
        let coordinator = ClusterCoordinator::with_clients(
            config,
            cluster.clone(),
            gateways.clone(),
            Arc::new(EventJournal::new()),
        )
        .unwrap();
        Harness {
            cluster,
            gateways,
            server: ApiServer::new(Arc::new(coordinator)),
        }
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // =========================================================================
    // Routing
    // =========================================================================

    #[test]
    fn test_route_cluster_paths() {
        assert_eq!(route(&Method::GET, "/api/cluster/status", None), Route::Status);
        assert_eq!(route(&Method::GET, "/api/cluster/peers", None), Route::Peers);
        assert_eq!(
            route(&Method::GET, "/api/cluster/pins", Some("filter=pinned%2Cerror")),
            Route::Pins {
                filter: Some("pinned,error".into())
            }
        );
        assert_eq!(
            route(&Method::GET, "/api/cluster/pins/QmA", None),
            Route::PinStatus("QmA".into())
        );
        assert_eq!(
            route(&Method::DELETE, "/api/cluster/pins/QmA", None),
            Route::Unpin("QmA".into())
        );
        assert_eq!(
            route(&Method::POST, "/api/cluster/add", Some("name=my+file.txt")),
            Route::Add {
                name: Some("my file.txt".into())
            }
        );
        assert_eq!(route(&Method::GET, "/api/cluster/health", None), Route::Health);
    }

    #[test]
    fn test_route_gateway_and_process_paths() {
        assert_eq!(route(&Method::GET, "/api/gateway/best", None), Route::BestGateway);
        assert_eq!(
            route(&Method::GET, "/api/gateway/accessible/QmA", None),
            Route::Accessible("QmA".into())
        );
        assert_eq!(route(&Method::GET, "/healthz", None), Route::Healthz);
        assert_eq!(route(&Method::GET, "/readyz", None), Route::Readyz);
        assert_eq!(route(&Method::GET, "/metrics", None), Route::Metrics);
        assert_eq!(
            route(&Method::GET, "/api/events", Some("limit=20")),
            Route::Events {
                limit: Some("20".into())
            }
        );
    }

    #[test]
    fn test_route_unknown_and_wrong_method() {
        assert_eq!(route(&Method::GET, "/api/nope", None), Route::NotFound);
        assert_eq!(route(&Method::POST, "/api/cluster/status", None), Route::NotFound);
        assert_eq!(
            route(&Method::GET, "/api/cluster/pins", Some("filter=")),
            Route::Pins { filter: None }
        );
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    #[tokio::test]
    async fn test_status_unavailable_is_500_envelope() {
        let h = harness();

        let response = h.server.dispatch(Route::Status, Bytes::new(), None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["details"]["kind"], "ClusterUnavailable");
    }

    #[tokio::test]
    async fn test_add_uses_name_and_content_type() {
        let h = harness();
        h.cluster.set_healthy("http://a:9094", true);
        h.cluster
            .set_add_response("http://a:9094", MockAdd::Body(format!(r#"{{"cid":"{}"}}"#, CID)));

        let response = h
            .server
            .dispatch(
                Route::Add {
                    name: Some("notes.md".into()),
                },
                Bytes::from_static(b"# hi"),
                Some("text/markdown".into()),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["cid"], CID);
        assert_eq!(json["data"]["name"], "notes.md");
        assert_eq!(json["data"]["mimetype"], "text/markdown");
        assert_eq!(json["data"]["size"], 4);
        assert_eq!(h.cluster.uploaded()[0].1, b"# hi".to_vec());
    }

    #[tokio::test]
    async fn test_multipart_add_pins_only_the_file_part() {
        let h = harness();
        h.cluster.set_healthy("http://a:9094", true);
        h.cluster
            .set_add_response("http://a:9094", MockAdd::Body(format!(r#"{{"cid":"{}"}}"#, CID)));
        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"hello.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hello\r\n",
            "--XYZ--\r\n",
        );

        let response = h
            .server
            .dispatch(
                Route::Add { name: None },
                Bytes::from_static(body.as_bytes()),
                Some("multipart/form-data; boundary=XYZ".into()),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["name"], "hello.txt");
        assert_eq!(json["data"]["mimetype"], "text/plain");
        assert_eq!(json["data"]["size"], 5);
        let uploaded = h.cluster.uploaded();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].1, b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_multipart_add_without_file_is_400() {
        let h = harness();
        h.cluster.set_healthy("http://a:9094", true);
        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--XYZ--\r\n";

        let response = h
            .server
            .dispatch(
                Route::Add { name: None },
                Bytes::from_static(body.as_bytes()),
                Some("multipart/form-data; boundary=XYZ".into()),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["details"]["kind"], "BadRequest");
        assert!(h.cluster.endpoints_called("add").is_empty());
    }

    #[tokio::test]
    async fn test_events_route_returns_recent_window() {
        let h = harness();
        h.cluster.set_healthy("http://a:9094", true);
        h.server.dispatch(Route::Health, Bytes::new(), None).await;

        let response = h
            .server
            .dispatch(
                Route::Events {
                    limit: Some("1".into()),
                },
                Bytes::new(),
                None,
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let events = json["data"]["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "FleetHealthEvaluated");
        assert_eq!(json["data"]["evicted"], 0);

        let bad = h
            .server
            .dispatch(
                Route::Events {
                    limit: Some("many".into()),
                },
                Bytes::new(),
                None,
            )
            .await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pin_status_not_found_is_404() {
        let h = harness();
        h.cluster.set_healthy("http://a:9094", true);

        let response = h
            .server
            .dispatch(Route::PinStatus(CID.into()), Bytes::new(), None)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_cid_is_400() {
        let h = harness();

        let response = h
            .server
            .dispatch(Route::Download("bad-cid!".into()), Bytes::new(), None)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_returns_raw_bytes() {
        let h = harness();
        h.gateways.serve("https://g1.test", "raw content");

        let response = h
            .server
            .dispatch(Route::Download(CID.into()), Bytes::new(), None)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"raw content");
    }

    #[tokio::test]
    async fn test_all_gateways_failed_details() {
        let h = harness();
        h.gateways.respond_status("https://g1.test", 502);

        let response = h
            .server
            .dispatch(Route::Download(CID.into()), Bytes::new(), None)
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["details"]["kind"], "AllGatewaysFailed");
        assert_eq!(json["details"]["info"]["gateways"][0]["gateway"], "https://g1.test");
    }

    #[tokio::test]
    async fn test_readiness_follows_shutdown() {
        let h = harness();

        let ready = h.server.dispatch(Route::Readyz, Bytes::new(), None).await;
        assert_eq!(ready.status(), StatusCode::OK);

        h.server.coordinator.shutdown();

        let not_ready = h.server.dispatch(Route::Readyz, Bytes::new(), None).await;
        assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
        let live = h.server.dispatch(Route::Healthz, Bytes::new(), None).await;
        assert_eq!(live.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let h = harness();
        h.cluster.set_healthy("http://a:9094", true);
        h.server.dispatch(Route::Health, Bytes::new(), None).await;

        let response = h.server.dispatch(Route::Metrics, Bytes::new(), None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("pinfleet_fleet_online_nodes 1"));
        assert!(text.contains("pinfleet_node_probes_total"));
    }
}
