//! Signing API client
//!
//! A small typed wrapper over the events and webhooks APIs. Every call is
//! sent to the proxy's own loopback address, so the proxy signs the tunnel's
//! traffic with the same key as the end user's requests. The no-logging
//! marker keeps that traffic out of the console.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigproxy_common::headers;

use crate::proxy::handler::TOKEN_ENDPOINT;

use super::UserCredentials;

/// Scopes the tunnel requests on its client-credentials grant
pub(crate) const REQUIRED_SCOPES: &str = "webhooks:admin";

const HEALTH_PATH: &str = "/events-acceptor-service/health";
const ENDPOINTS_PATH: &str = "/events-acceptor-service/endpoints";
const WEBHOOKS_PATH: &str = "/webhooks";

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("events tunnel is not available")]
    NotAvailable,

    #[error("unexpected http response code: {0}")]
    UnexpectedStatus(u16),

    #[error("no access token in the authorisation response")]
    NoAccessToken,

    #[error("no {0} in the upstream response")]
    MissingField(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TunnelError {
    /// True when the proxy or upstream socket is gone. Used to turn refused
    /// connections during pulling and cleanup into silent exits.
    pub fn is_connection_refused(&self) -> bool {
        let TunnelError::Http(err) = self else {
            return false;
        };
        let mut source = std::error::Error::source(err);
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::ConnectionRefused {
                    return true;
                }
            }
            source = inner.source();
        }
        false
    }
}

/// 404/502/503: the events service is absent behind this upstream
pub(crate) fn service_not_accessible(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// Webhook registration payload
/// (delay and package size follow the upstream's documented limits)
#[derive(Debug, Clone, Serialize)]
pub struct WebhookRequest {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub event_types: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookConfig {
    pub delay: String,
    pub max_package_size: u32,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One webhook delivery batch as returned by the endpoint pull
#[derive(Debug, Clone, Deserialize)]
pub struct PullItem {
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

pub struct ApiClient {
    proxy_address: String,
    credentials: UserCredentials,
    access_token: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(
        proxy_address: impl Into<String>,
        credentials: UserCredentials,
        timeout: Duration,
    ) -> Self {
        Self {
            proxy_address: proxy_address.into(),
            credentials,
            access_token: String::new(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Client-credentials grant through the proxy. Captures the access token
    /// for all subsequent calls on this client.
    pub async fn authorise(&mut self, scopes: &str) -> Result<(), TunnelError> {
        let form = format!(
            "client_id={}&client_secret={}&grant_type=client_credentials&scope={}",
            self.credentials.client_id, self.credentials.client_secret, scopes
        );
        let response = self
            .http
            .post(format!("{}{}", self.proxy_address, TOKEN_ENDPOINT))
            .header(headers::CLIENT_ID, self.credentials.client_id.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(headers::NO_LOGGING, "true")
            .timeout(self.timeout)
            .body(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }

        let value: serde_json::Value = serde_json::from_slice(&body)?;
        match value.get("access_token").and_then(|v| v.as_str()) {
            Some(token) if !token.is_empty() => {
                self.access_token = token.to_string();
                Ok(())
            }
            _ => Err(TunnelError::NoAccessToken),
        }
    }

    /// Probe the events service health endpoint.
    pub async fn tunnel_is_ready(&self) -> Result<(), TunnelError> {
        let (status, _) = self.send(self.request(Method::GET, HEALTH_PATH)).await?;
        if service_not_accessible(status) {
            return Err(TunnelError::NotAvailable);
        }
        if status != StatusCode::OK {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }

    /// Open a server-side delivery endpoint; returns `(url, id)`.
    pub async fn open_endpoint(&self) -> Result<(String, String), TunnelError> {
        let (status, body) = self
            .send(self.request(Method::POST, ENDPOINTS_PATH).json(&""))
            .await?;
        if status != StatusCode::CREATED {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        let url = string_field(&value, "url").ok_or(TunnelError::MissingField("tunnel url"))?;
        let id = string_field(&value, "id").ok_or(TunnelError::MissingField("tunnel id"))?;
        Ok((url, id))
    }

    pub async fn close_endpoint(&self, endpoint_id: &str) -> Result<(), TunnelError> {
        self.delete(&format!("{ENDPOINTS_PATH}/{endpoint_id}")).await
    }

    pub async fn create_webhook(&self, request: &WebhookRequest) -> Result<String, TunnelError> {
        let (status, body) = self
            .send(self.request(Method::POST, WEBHOOKS_PATH).json(request))
            .await?;
        if status != StatusCode::CREATED {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        string_field(&value, "id").ok_or(TunnelError::MissingField("webhook id"))
    }

    pub async fn patch_webhook(
        &self,
        webhook_id: &str,
        request: &WebhookRequest,
    ) -> Result<(), TunnelError> {
        let path = format!("{WEBHOOKS_PATH}/{webhook_id}");
        let (status, _) = self
            .send(self.request(Method::PATCH, &path).json(request))
            .await?;
        if status != StatusCode::OK {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }

    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<(), TunnelError> {
        self.delete(&format!("{WEBHOOKS_PATH}/{webhook_id}")).await
    }

    /// Pull one batch of deliveries. The status is returned alongside so the
    /// caller can react to 401 with a re-auth.
    pub async fn get_events(
        &self,
        endpoint_id: &str,
    ) -> Result<(Vec<PullItem>, StatusCode), TunnelError> {
        let path = format!("{ENDPOINTS_PATH}/{endpoint_id}");
        let (status, body) = self.send(self.request(Method::GET, &path)).await?;
        let mut items = Vec::new();
        if status == StatusCode::OK {
            items = serde_json::from_slice(&body)?;
        }
        Ok((items, status))
    }

    async fn delete(&self, path: &str) -> Result<(), TunnelError> {
        let (status, _) = self.send(self.request(Method::DELETE, path)).await?;
        if status != StatusCode::NO_CONTENT {
            return Err(TunnelError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.proxy_address, path))
            .header(headers::CLIENT_ID, self.credentials.client_id.as_str())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.access_token),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(headers::NO_LOGGING, "true")
            .timeout(self.timeout)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, Bytes), TunnelError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

fn string_field(value: &serde_json::Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_request_omits_disabled_and_empty_config() {
        let request = WebhookRequest {
            title: "t".to_string(),
            url: "http://hook.test".to_string(),
            event_types: vec!["ALL".to_string()],
            enabled: false,
            config: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("enabled").is_none());
        assert!(json.get("config").is_none());
        assert_eq!(json["type"], serde_json::json!(["ALL"]));
    }

    #[test]
    fn test_webhook_request_full() {
        let request = WebhookRequest {
            title: "t".to_string(),
            url: "http://hook.test".to_string(),
            event_types: vec!["ALL".to_string()],
            enabled: true,
            config: Some(WebhookConfig {
                delay: "1s".to_string(),
                max_package_size: 12400,
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["enabled"], serde_json::json!(true));
        assert_eq!(json["config"]["delay"], "1s");
        assert_eq!(json["config"]["max_package_size"], 12400);
    }

    #[test]
    fn test_pull_item_decodes_batch() {
        let raw = r#"[{
            "headers": {"Content-Length": ["42"]},
            "payload": "{\"payload\":[]}",
            "created_at": "2024-05-01T12:00:00Z"
        }]"#;
        let items: Vec<PullItem> = serde_json::from_str(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].headers["Content-Length"], vec!["42"]);
        assert!(items[0].created_at.is_some());
    }

    #[test]
    fn test_service_not_accessible() {
        for status in [404u16, 502, 503] {
            assert!(service_not_accessible(
                StatusCode::from_u16(status).unwrap()
            ));
        }
        assert!(!service_not_accessible(StatusCode::OK));
        assert!(!service_not_accessible(StatusCode::UNAUTHORIZED));
    }
}
