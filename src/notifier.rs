// =============================================================================
// notifier.rs — THE TELEGRAM TOWN CRIER
// =============================================================================
//
// The outbound side of the engine: two calls against the Telegram Bot API,
// sendMessage for the summary text and sendDocument for the filing PDF.
// Documents are passed by URL — Telegram fetches the file server-side, so
// the engine never shuttles megabytes of PDF through its own memory.
//
// This module performs exactly ONE attempt per call and classifies the
// outcome into the transport taxonomy (retryable vs. fatal). The retry
// loop lives in the delivery pipeline, which wraps these calls in the
// RetryingTransport. Duplicate sends are safe: Telegram will happily post
// the same message twice, which is the accepted at-least-once cost.
//
// The NotifyChannel trait is the seam. Production uses TelegramNotifier;
// tests use an in-memory channel with scripted failures.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use serde::Deserialize;
use tracing::debug;

use crate::transport::{classify_reqwest, error_for_status, TransportError};

/// The downstream messaging channel: a text send and a document send,
/// both single-attempt, both classified for the retrying transport.
pub trait NotifyChannel {
    fn send_text(
        &self,
        channel_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn send_document(
        &self,
        channel_id: &str,
        document_url: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Envelope every Bot API response arrives in.
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// The production channel, speaking the Telegram Bot API over HTTPS.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramNotifier {
    /// Build a notifier for the given bot token. `send_timeout` bounds a
    /// single HTTP exchange; document sends can be slow because Telegram
    /// fetches the file from the upstream URL before acknowledging.
    pub fn new(bot_token: &str, send_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        })
    }

    async fn post(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, method));
        }

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Fatal(e.into()))?;

        if body.ok {
            debug!(method, "telegram call acknowledged");
            Ok(())
        } else {
            Err(TransportError::Fatal(anyhow!(
                "telegram rejected {method}: {}",
                body.description.unwrap_or_else(|| "no description".to_string())
            )))
        }
    }
}

impl NotifyChannel for TelegramNotifier {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), TransportError> {
        self.post(
            "sendMessage",
            serde_json::json!({
                "chat_id": channel_id,
                "text": text,
            }),
        )
        .await
    }

    async fn send_document(
        &self,
        channel_id: &str,
        document_url: &str,
    ) -> Result<(), TransportError> {
        // A link the URL parser chokes on will never fetch; fail it fast
        // instead of burning retries on Telegram's error responses.
        let parsed = url::Url::parse(document_url)
            .map_err(|e| TransportError::Fatal(anyhow!("invalid document url {document_url}: {e}")))?;

        self.post(
            "sendDocument",
            serde_json::json!({
                "chat_id": channel_id,
                "document": parsed.as_str(),
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_document_url_is_fatal_without_any_request() {
        let notifier = TelegramNotifier::new("000:fake-token", Duration::from_secs(5)).unwrap();
        let err = notifier
            .send_document("@channel", "not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Fatal(_)));
    }
}
