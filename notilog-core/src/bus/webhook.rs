//! Webhook fan-out bus.
//!
//! Each exchange maps to a set of HTTP subscribers. Sending a message POSTs
//! the body to every subscriber of the exchange with:
//!
//! - `Notilog-Type-Name`, `Notilog-Notification-Id`, `Notilog-Occurred-On`
//! - `Notilog-Signature`, an HMAC over the body keyed by the subscriber secret
//!
//! A message counts as accepted only when every subscriber answered 2xx.
//! Any failure fails the send, and the publisher redelivers the batch on
//! its next cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;
use notilog_sdk::signature::{
    NOTIFICATION_ID_HEADER, OCCURRED_ON_HEADER, SIGNATURE_HEADER, TYPE_NAME_HEADER, sign_body,
};
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::{BusChannel, BusError, MessageBus, MessageParameters};

/// Per-request timeout applied by the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP endpoint bound to one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSubscriber {
    pub exchange: CompactString,
    pub url: Url,
    pub secret: Box<[u8]>,
}

#[derive(Debug, Clone)]
pub struct WebhookBus {
    http_client: reqwest::Client,
    subscribers: Arc<RwLock<Arc<[WebhookSubscriber]>>>,
}

impl WebhookBus {
    pub fn new(subscribers: Vec<WebhookSubscriber>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            subscribers: Arc::new(RwLock::new(subscribers.into())),
        }
    }

    /// Swap the subscriber set. Channels already open keep their snapshot.
    pub async fn replace_subscribers(&self, subscribers: Vec<WebhookSubscriber>) {
        *self.subscribers.write().await = subscribers.into();
    }
}

#[async_trait]
impl MessageBus for WebhookBus {
    async fn open_channel(&self, exchange: &str) -> Result<Box<dyn BusChannel>, BusError> {
        let subscribers: Vec<WebhookSubscriber> = self
            .subscribers
            .read()
            .await
            .iter()
            .filter(|s| s.exchange == exchange)
            .cloned()
            .collect();

        if subscribers.is_empty() {
            warn!(exchange, "Exchange has no webhook subscribers");
        }

        Ok(Box::new(WebhookChannel {
            http_client: self.http_client.clone(),
            subscribers,
            closed: false,
        }))
    }
}

struct WebhookChannel {
    http_client: reqwest::Client,
    subscribers: Vec<WebhookSubscriber>,
    closed: bool,
}

impl WebhookChannel {
    async fn deliver(
        &self,
        subscriber: &WebhookSubscriber,
        body: &Bytes,
        parameters: &MessageParameters,
    ) -> Result<(), BusError> {
        let send_failed = |reason: String| BusError::SendFailed {
            message_id: parameters.message_id.clone(),
            reason,
        };

        let mut request = self
            .http_client
            .post(subscriber.url.clone())
            .header("Content-Type", "application/json");
        for (name, value) in
            delivery_headers(parameters, body, &subscriber.secret).map_err(send_failed)?
        {
            request = request.header(name, value);
        }

        let response = request
            .body(body.clone())
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(
                url = %subscriber.url,
                message_id = %parameters.message_id,
                "Webhook accepted message"
            );
            Ok(())
        } else {
            Err(send_failed(format!("{} responded {}", subscriber.url, status)))
        }
    }
}

#[async_trait]
impl BusChannel for WebhookChannel {
    async fn send(&mut self, body: &Bytes, parameters: &MessageParameters) -> Result<(), BusError> {
        if self.closed {
            return Err(BusError::Closed);
        }
        for subscriber in &self.subscribers {
            self.deliver(subscriber, body, parameters).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        self.closed = true;
        self.subscribers.clear();
        Ok(())
    }
}

/// Metadata and signature headers for one pushed message.
pub(crate) fn delivery_headers(
    parameters: &MessageParameters,
    body: &[u8],
    secret: &[u8],
) -> Result<[(&'static str, String); 4], String> {
    let occurred_on = parameters
        .timestamp
        .format(&Rfc3339)
        .map_err(|e| e.to_string())?;
    Ok([
        (TYPE_NAME_HEADER, parameters.type_name.to_string()),
        (NOTIFICATION_ID_HEADER, parameters.message_id.clone()),
        (OCCURRED_ON_HEADER, occurred_on),
        (SIGNATURE_HEADER, sign_body(body, secret)),
    ])
}
