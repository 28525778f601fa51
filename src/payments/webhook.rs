// Gateway webhook reconciliation
//
// Events are authenticated by an HMAC signature header, matched to local
// payments by intent id, and applied through the same compare-and-set
// repository paths the operator flows use. Redelivered and out-of-order
// events are absorbed: a success event only ever promotes a pending
// payment, and a failure event never downgrades a settled one.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::payments::repository::PaymentsStore;
use crate::payments::status_machine::PaymentStateMachine;
use crate::payments::PaymentStatus;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "gateway-signature";
const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies `t=<unix>,v1=<hex>` signature headers
///
/// The signed payload is `"{t}.{body}"`, keyed with the shared webhook
/// secret. Timestamps outside the tolerance window are rejected to bound
/// replay.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[cfg(test)]
    fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    pub fn verify(&self, header: &str, body: &str, now_unix: i64) -> Result<(), SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = value.parse().ok();
                }
                Some(("v1", value)) => {
                    if let Some(decoded) = decode_hex(value) {
                        signatures.push(decoded);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed);
        }

        if (now_unix - timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::TimestampOutOfRange);
        }

        let signed_payload = format!("{timestamp}.{body}");
        for candidate in &signatures {
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|_| SignatureError::Malformed)?;
            mac.update(signed_payload.as_bytes());
            if mac.verify_slice(candidate).is_ok() {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    Malformed,
    TimestampOutOfRange,
    Mismatch,
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Payment outcome carried by a gateway event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Succeeded,
    Failed,
}

impl EventKind {
    fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "payment_intent.succeeded" => Some(Self::Succeeded),
            "payment_intent.payment_failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Decide what a gateway event means for the local status
///
/// Returns the status to move to, or None when the event is a no-op:
/// already applied, stale relative to a later local transition, or a
/// failure arriving after the payment settled. This is the whole
/// reconciliation policy; the handler only applies it through CAS.
pub fn reconcile_transition(current: PaymentStatus, event: EventKind) -> Option<PaymentStatus> {
    match event {
        EventKind::Succeeded => match current {
            PaymentStatus::Pending => Some(PaymentStatus::DepositCaptured),
            _ => None,
        },
        EventKind::Failed => {
            if PaymentStateMachine::is_terminal_success(current)
                || current == PaymentStatus::Failed
            {
                None
            } else {
                Some(PaymentStatus::Failed)
            }
        }
    }
}

/// Shared state for the webhook endpoint
pub struct WebhookContext {
    pub verifier: WebhookVerifier,
    pub repo: Arc<dyn PaymentsStore>,
}

/// POST /api/webhooks/gateway
///
/// Always answers 200 for authenticated events, including ones for
/// unknown intents or no-op transitions, so the gateway stops redelivering
/// them. Only a bad signature or malformed envelope earns a 400.
pub async fn gateway_webhook(
    State(ctx): State<Arc<WebhookContext>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Err(e) = ctx.verifier.verify(header, &body, Utc::now().timestamp()) {
        warn!(error = ?e, "webhook signature rejected");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid signature" })),
        );
    }

    let envelope: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "malformed event" })),
            );
        }
    };

    let event_id = envelope["id"].as_str().unwrap_or("");
    let event_type = envelope["type"].as_str().unwrap_or("");
    let object = &envelope["data"]["object"];
    let intent_id = object["id"].as_str().unwrap_or("");

    let Some(kind) = EventKind::from_event_type(event_type) else {
        debug!(event_id, event_type, "ignoring unhandled event type");
        return (StatusCode::OK, Json(json!({ "received": true })));
    };

    if intent_id.is_empty() {
        warn!(event_id, event_type, "event carries no intent id");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "malformed event" })),
        );
    }

    match apply_event(ctx.repo.as_ref(), intent_id, kind, object).await {
        Ok(applied) => {
            info!(event_id, event_type, intent_id, applied, "webhook processed");
            (StatusCode::OK, Json(json!({ "received": true })))
        }
        Err(e) => {
            // Storage trouble: let the gateway redeliver.
            warn!(event_id, intent_id, error = %e, "webhook apply failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "event not applied" })),
            )
        }
    }
}

async fn apply_event(
    repo: &dyn PaymentsStore,
    intent_id: &str,
    kind: EventKind,
    object: &Value,
) -> Result<bool, crate::payments::error::PaymentError> {
    let Some(payment) = repo.find_by_intent_id(intent_id).await? else {
        // Not ours (another environment, or a charge-saved-method intent
        // we already settled inline).
        debug!(intent_id, "no payment for intent, ignoring");
        return Ok(false);
    };

    let Some(target) = reconcile_transition(payment.status, kind) else {
        debug!(
            payment_id = %payment.id,
            status = %payment.status.as_str(),
            ?kind,
            "event is a no-op for current status"
        );
        return Ok(false);
    };

    let applied = match target {
        PaymentStatus::DepositCaptured => {
            let method = object["payment_method"].as_str();
            repo.mark_deposit_captured(payment.id, method).await?.is_some()
        }
        PaymentStatus::Failed => {
            let reason = object["last_payment_error"]["message"]
                .as_str()
                .unwrap_or("payment failed");
            repo.mark_failed_unless_settled(payment.id, &format!("Gateway reported failure: {reason}"))
                .await?
                .is_some()
        }
        _ => false,
    };

    if !applied {
        // CAS miss: a concurrent actor moved the row between our read and
        // the update. The guarded update already enforced monotonicity.
        debug!(payment_id = %payment.id, "reconciliation lost the race, no change applied");
    }

    Ok(applied)
}
