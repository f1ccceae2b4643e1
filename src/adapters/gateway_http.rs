//! Public Gateway Adapter
//!
//! Implements [`GatewayClient`] with plain HTTP GET/HEAD against
//! `{gateway}/ipfs/{cid}`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use tracing::instrument;

use crate::domain::{gateway_content_url, Cid, ContentMetadata, GatewayClient};
use crate::error::{Error, Result};

/// HTTP client for public IPFS gateways.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    client: Client,
}

impl HttpGatewayClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pinfleet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn check_status(gateway: &str, response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Error::GatewayResponse {
                gateway: gateway.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[instrument(skip(self), fields(cid = %cid))]
    async fn fetch(&self, gateway: &str, cid: &Cid, timeout: Duration) -> Result<Bytes> {
        let url = gateway_content_url(gateway, cid);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(Error::GatewayRequest)?;
        let response = Self::check_status(gateway, response)?;
        response.bytes().await.map_err(Error::GatewayRequest)
    }

    #[instrument(skip(self), fields(cid = %cid))]
    async fn head(&self, gateway: &str, cid: &Cid, timeout: Duration) -> Result<ContentMetadata> {
        let url = gateway_content_url(gateway, cid);
        let response = self
            .client
            .head(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(Error::GatewayRequest)?;
        let response = Self::check_status(gateway, response)?;
        let headers = response.headers();

        Ok(ContentMetadata {
            cid: cid.to_string(),
            gateway: gateway.to_string(),
            // HEAD has no body, so read the header rather than the size hint
            size: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            content_type: header_str(headers, CONTENT_TYPE),
            last_modified: header_str(headers, LAST_MODIFIED),
        })
    }
}
