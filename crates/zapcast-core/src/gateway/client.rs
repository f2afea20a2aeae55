//! Evolution-API style WhatsApp gateway client
//!
//! Every call is a JSON POST to `{base}/message/{endpoint}/{instance}`
//! authenticated with an `apikey` header.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use zapcast_common::config::GatewayConfig;
use zapcast_common::phone::digits_only;
use zapcast_common::types::{MediaAttachment, MediaKind};

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Non-2xx response; `body` is the gateway's raw error body
    #[error("Gateway returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Gateway request failed: {0}")]
    Transport(String),

    #[error("Failed to build gateway client: {0}")]
    Client(String),
}

/// Where and as whom a message is submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTarget {
    pub base_url: String,
    pub api_key: String,
    pub instance_name: String,
}

/// Sends one message to one recipient
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Send `text` to `phone`, as a caption when `media` is present.
    /// Returns the gateway's JSON acknowledgement. Never retries.
    async fn send(
        &self,
        target: &GatewayTarget,
        phone: &str,
        text: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Value, GatewayError>;
}

/// HTTP client for the gateway
pub struct EvolutionGatewayClient {
    client: Client,
    recipient_suffix: String,
}

impl EvolutionGatewayClient {
    /// Create a new gateway client
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            recipient_suffix: config.recipient_suffix.clone(),
        })
    }

    /// Gateway address of a phone number: digits plus the domain suffix
    pub fn recipient_address(&self, phone: &str) -> String {
        format!("{}{}", digits_only(phone), self.recipient_suffix)
    }

    async fn post(&self, target: &GatewayTarget, endpoint: &str, body: Value) -> Result<Value, GatewayError> {
        let url = format!(
            "{}/message/{}/{}",
            target.base_url.trim_end_matches('/'),
            endpoint,
            target.instance_name
        );

        debug!("Submitting message via {}", url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &target.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Gateway request to {} failed: {}", url, e);
                GatewayError::Transport(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        // the message went out even if the acknowledgement is not JSON
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text })))
    }
}

#[async_trait]
impl MessageGateway for EvolutionGatewayClient {
    async fn send(
        &self,
        target: &GatewayTarget,
        phone: &str,
        text: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Value, GatewayError> {
        let number = self.recipient_address(phone);

        match media {
            None => {
                self.post(target, "sendText", json!({ "number": number, "text": text }))
                    .await
            }
            Some(media) if media.kind == MediaKind::Audio => {
                // voice notes carry no caption
                self.post(
                    target,
                    "sendWhatsAppAudio",
                    json!({ "number": number, "audio": media.url }),
                )
                .await
            }
            Some(media) => {
                let mediatype = match media.kind {
                    MediaKind::Image | MediaKind::Video => media.kind.as_str(),
                    _ => MediaKind::Document.as_str(),
                };
                let mut body = json!({
                    "number": number,
                    "mediatype": mediatype,
                    "mimetype": media.kind.mime_type(),
                    "caption": text,
                    "media": media.url,
                });
                if mediatype == "document" {
                    body["fileName"] = json!(file_name(&media.url));
                }
                self.post(target, "sendMedia", body).await
            }
        }
    }
}

/// Last path segment of a URL, without query string
fn file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("file")
        .to_string()
}
