use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use concierge_metrics::{counter, labels, whatsapp as whatsapp_metrics};

use {
    concierge_channels::{ChannelOutbound, Error, Result},
    concierge_config::WhatsAppConfig,
};

use crate::types::OutgoingText;

/// Text sender for the WhatsApp Cloud API.
///
/// Transport errors and 429/5xx responses are retried with exponential
/// backoff up to `attempts` tries in total; other 4xx responses fail at once.
pub struct WhatsAppOutbound {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<Secret<String>>,
    attempts: u32,
    retry_base: Duration,
}

impl WhatsAppOutbound {
    pub fn new(
        api_base: &str,
        api_version: &str,
        phone_number_id: &str,
        access_token: Option<Secret<String>>,
    ) -> Self {
        let endpoint = if phone_number_id.is_empty() {
            String::new()
        } else {
            format!(
                "{}/{}/{}/messages",
                api_base.trim_end_matches('/'),
                api_version.trim_matches('/'),
                phone_number_id
            )
        };
        Self {
            client: reqwest::Client::new(),
            endpoint,
            access_token,
            attempts: 3,
            retry_base: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build WhatsApp HTTP client, using defaults");
                reqwest::Client::new()
            });
        let mut outbound = Self::new(
            &config.api_base,
            &config.api_version,
            &config.phone_number_id,
            config.access_token.clone(),
        )
        .with_retry(
            config.send_attempts,
            Duration::from_millis(config.retry_base_ms),
        );
        outbound.client = client;
        outbound
    }

    #[must_use]
    pub fn with_retry(mut self, attempts: u32, base: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_base = base;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    async fn send_once(&self, token: &str, to: &str, text: &str, attempt: u32) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&OutgoingText::new(to, text))
            .send()
            .await
            .map_err(|e| Error::external("send whatsapp message", e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::api(status.as_u16(), attempt, body))
    }
}

#[async_trait]
impl ChannelOutbound for WhatsAppOutbound {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::invalid_input("refusing to send empty text"));
        }
        let Some(token) = self.access_token.as_ref() else {
            return Err(Error::unavailable("WhatsApp access token is not configured"));
        };
        if self.endpoint.is_empty() {
            return Err(Error::unavailable("WhatsApp phone number id is not configured"));
        }

        let mut attempt = 1;
        loop {
            let result = self
                .send_once(token.expose_secret(), to, text, attempt)
                .await;

            #[cfg(feature = "metrics")]
            counter!(
                whatsapp_metrics::SEND_ATTEMPTS_TOTAL,
                labels::SUCCESS => if result.is_ok() { "true" } else { "false" },
            )
            .increment(1);

            match result {
                Ok(()) => {
                    debug!(to, attempt, chars = text.chars().count(), "whatsapp message sent");
                    return Ok(());
                },
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let wait = self.backoff(attempt);
                    warn!(
                        to,
                        attempt,
                        max_attempts = self.attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "whatsapp send failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
                Err(err) => {
                    warn!(to, attempt, error = %err, "whatsapp send failed");
                    return Err(err);
                },
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
    };

    use super::*;

    #[derive(Clone)]
    struct Mock {
        statuses: Arc<Mutex<Vec<StatusCode>>>,
        requests: Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>,
    }

    async fn handler(
        State(mock): State<Mock>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        mock.requests.lock().unwrap().push((auth, body));
        let mut statuses = mock.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            statuses[0]
        }
    }

    /// Serve `/v21.0/PN1/messages`, answering with `statuses` in order (the
    /// last one repeats).
    async fn start_mock(statuses: Vec<StatusCode>) -> (String, Mock) {
        let mock = Mock {
            statuses: Arc::new(Mutex::new(statuses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/v21.0/PN1/messages", post(handler))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), mock)
    }

    fn outbound(base: &str) -> WhatsAppOutbound {
        WhatsAppOutbound::new(
            base,
            "v21.0",
            "PN1",
            Some(Secret::new("wa-token".to_string())),
        )
        .with_retry(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn sends_text_message_with_bearer_token() {
        let (base, mock) = start_mock(vec![StatusCode::OK]).await;
        outbound(&base)
            .send_text("77010000001", "Здравствуйте!")
            .await
            .unwrap();

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer wa-token"));
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["to"], "77010000001");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Здравствуйте!");
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (base, mock) = start_mock(vec![
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::OK,
        ])
        .await;
        outbound(&base).send_text("1", "hi").await.unwrap();
        assert_eq!(mock.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (base, mock) = start_mock(vec![StatusCode::SERVICE_UNAVAILABLE]).await;
        let err = outbound(&base).send_text("1", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Api {
            status: 503,
            attempts: 3,
            ..
        }));
        assert_eq!(mock.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (base, mock) = start_mock(vec![StatusCode::BAD_REQUEST]).await;
        let err = outbound(&base).send_text("1", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 400, .. }));
        assert_eq!(mock.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_server_is_retried_then_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = outbound(&format!("http://{addr}"))
            .send_text("1", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::External { .. }));
    }

    #[tokio::test]
    async fn refuses_empty_text_and_missing_credentials() {
        let o = outbound("http://127.0.0.1:9");
        assert!(matches!(
            o.send_text("1", "  ").await.unwrap_err(),
            Error::InvalidInput { .. }
        ));
        let no_token = WhatsAppOutbound::new("http://127.0.0.1:9", "v21.0", "PN1", None);
        assert!(matches!(
            no_token.send_text("1", "hi").await.unwrap_err(),
            Error::Unavailable { .. }
        ));
    }

    #[test]
    fn endpoint_and_backoff() {
        let o = WhatsAppOutbound::from_config(&WhatsAppConfig {
            phone_number_id: "123".into(),
            ..Default::default()
        });
        assert_eq!(
            o.endpoint(),
            "https://graph.facebook.com/v21.0/123/messages"
        );
        assert_eq!(o.backoff(1), Duration::from_millis(500));
        assert_eq!(o.backoff(2), Duration::from_millis(1000));
        assert_eq!(o.backoff(3), Duration::from_millis(2000));
    }
}
