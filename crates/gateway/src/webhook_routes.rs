//! `GET /webhook` subscription check and `POST /webhook` delivery.

use {
    axum::{
        body::Bytes,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use concierge_metrics::{counter, labels, whatsapp as whatsapp_metrics};

use concierge_whatsapp::{extract_messages, parse_payload, verify_subscription};

use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub async fn verify_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verify_subscription(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        &state.gateway.verify_token,
    ) {
        Some(challenge) => {
            debug!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        },
        None => {
            warn!(mode = ?query.mode, "webhook verification failed");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        },
    }
}

/// Always answers `200 ok`. Messages are processed on a tracked task so slow
/// model calls never hold the delivery open long enough to trigger a resend,
/// and shutdown can still wait for them.
pub async fn receive_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let Some(payload) = parse_payload(&body) else {
        #[cfg(feature = "metrics")]
        counter!(whatsapp_metrics::WEBHOOKS_TOTAL, labels::SUCCESS => "false").increment(1);
        return (StatusCode::OK, "ok");
    };
    #[cfg(feature = "metrics")]
    counter!(whatsapp_metrics::WEBHOOKS_TOTAL, labels::SUCCESS => "true").increment(1);

    let messages = extract_messages(&payload, &state.gateway.phone_number_id);
    if messages.is_empty() {
        debug!("webhook carried no text messages");
        return (StatusCode::OK, "ok");
    }

    let pipeline = state.gateway.pipeline.clone();
    state.gateway.tasks.spawn(async move {
        for message in messages {
            let sender = message.sender_id.clone();
            let outcome = pipeline.handle(message).await;
            debug!(sender = %sender, ?outcome, "inbound message handled");
        }
    });

    (StatusCode::OK, "ok")
}
