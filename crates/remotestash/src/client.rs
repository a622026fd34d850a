//! One-shot HTTPS operations against a discovered stash instance.
//!
//! TLS peer verification is off by default: the trust model is a
//! trust-on-first-use local network tool talking to self-signed servers.
//! Pass `verify = true` for hardened deployments with real certificates.

use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use stash::{Item, ItemInfo};
use std::time::Duration;

use crate::browse::Discovered;

/// HTTPS client bound to one discovered instance.
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn connect(service: &Discovered, verify: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTPS client")?;

        Ok(Self {
            http,
            base_url: format!("https://{}:{}", service.addr, service.port),
        })
    }

    /// POST content with its content type. One attempt, no retry.
    pub async fn push(&self, content_type: &str, body: Vec<u8>) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/push", self.base_url))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .context("push request failed")?;

        if !response.status().is_success() {
            bail!("push rejected: HTTP {}", response.status());
        }
        Ok(())
    }

    /// Pop the latest item. `Ok(None)` when the remote stash is empty.
    pub async fn pull(&self) -> Result<Option<Item>> {
        self.fetch_item("pull").await
    }

    /// Peek at the latest item without removing it.
    pub async fn last(&self) -> Result<Option<Item>> {
        self.fetch_item("last").await
    }

    async fn fetch_item(&self, op: &str) -> Result<Option<Item>> {
        let response = self
            .http
            .get(format!("{}/{op}", self.base_url))
            .send()
            .await
            .with_context(|| format!("{op} request failed"))?;

        if !response.status().is_success() {
            bail!("{op} rejected: HTTP {}", response.status());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read {op} response body"))?;

        item_from_response(content_type.as_deref(), body.to_vec())
    }

    /// Fetch the status summary.
    pub async fn status(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .context("status request failed")?;

        if !response.status().is_success() {
            bail!("status rejected: HTTP {}", response.status());
        }
        response
            .json()
            .await
            .context("failed to parse status response")
    }
}

/// Reconstruct an Item from a response. An empty body is the empty-stash
/// outcome; a body without a `Content-Type` header is a transport failure.
pub fn item_from_response(content_type: Option<&str>, body: Vec<u8>) -> Result<Option<Item>> {
    if body.is_empty() {
        return Ok(None);
    }
    let Some(content_type) = content_type else {
        bail!("response has a body but no Content-Type header");
    };
    Ok(Some(Item::from_bytes(body, ItemInfo::new(content_type))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_empty_stash() {
        let item = item_from_response(Some("text/plain"), Vec::new()).unwrap();
        assert!(item.is_none());

        let item = item_from_response(None, Vec::new()).unwrap();
        assert!(item.is_none());
    }

    #[test]
    fn test_body_without_content_type_is_transport_failure() {
        let result = item_from_response(None, b"hello".to_vec());
        assert!(result.is_err());
    }

    #[test]
    fn test_item_reconstruction() {
        let item = item_from_response(Some("text/plain"), b"hello".to_vec())
            .unwrap()
            .unwrap();
        assert_eq!(item.info.content_type, "text/plain");
        assert_eq!(item.as_text().as_deref(), Some("hello"));
    }
}
