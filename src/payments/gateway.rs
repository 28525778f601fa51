// Card-payment gateway boundary
//
// The service layer talks to `PaymentGateway`; `StripeGateway` is the REST
// implementation. All amounts are integer cents. Every call is network-bound
// and must never run while holding a database transaction.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Errors crossing the gateway boundary
///
/// `Unavailable` covers timeouts and transport failures where the outcome is
/// ambiguous — callers must leave local state unchanged. `Declined` is a
/// confirmed decline. `RequiresAction` is the recoverable
/// authentication-needed case surfaced separately from generic declines.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("card declined: {0}")]
    Declined(String),

    #[error("customer authentication required")]
    RequiresAction { payment_intent_id: Option<String> },

    #[error("unexpected gateway response: {0}")]
    Protocol(String),
}

/// Gateway-side customer record
#[derive(Debug, Clone)]
pub struct CustomerHandle {
    pub id: String,
}

/// A freshly created payment intent (manual-capture hold)
#[derive(Debug, Clone)]
pub struct IntentHandle {
    pub id: String,
    pub client_secret: Option<String>,
}

/// Result of a capture call
#[derive(Debug, Clone)]
pub struct CapturedIntent {
    pub id: String,
    /// Reusable payment-method token returned by the gateway, stored for
    /// later off-session charges
    pub payment_method_id: Option<String>,
}

/// Outbound gateway operations used by the payment lifecycle
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register a customer record at the gateway
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        phone: &str,
        booking_id: Uuid,
    ) -> Result<CustomerHandle, GatewayError>;

    /// Open a manual-capture hold, saving the payment method for future
    /// off-session use
    async fn create_intent(
        &self,
        amount_cents: i64,
        customer_id: &str,
        booking_id: Uuid,
    ) -> Result<IntentHandle, GatewayError>;

    /// Capture part or all of an existing hold
    async fn capture(
        &self,
        intent_id: &str,
        amount_cents: i64,
    ) -> Result<CapturedIntent, GatewayError>;

    /// Open and immediately confirm a new off-session charge against a
    /// stored payment method
    async fn charge_saved_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
        amount_cents: i64,
        booking_id: Uuid,
    ) -> Result<IntentHandle, GatewayError>;

    /// Refund a specific amount against an intent; returns the refund id
    async fn refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: &str,
    ) -> Result<String, GatewayError>;

    /// Release an uncaptured hold
    async fn cancel_intent(&self, intent_id: &str) -> Result<(), GatewayError>;
}

/// Stripe REST implementation of the gateway boundary
///
/// The API key is injected at construction; nothing in this module reads
/// global state.
#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    api_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(api_key: String) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the client at a different base URL (local gateway stubs)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, GatewayError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;

        if status >= 400 {
            return Err(classify_error(status, &body));
        }

        Ok(body)
    }

}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: Option<String>,
    payment_intent: Option<ErrorIntentRef>,
}

#[derive(Debug, Deserialize)]
struct ErrorIntentRef {
    id: String,
}

/// Map a gateway error body to the boundary error taxonomy
///
/// `authentication_required` card errors become `RequiresAction`; other card
/// errors are confirmed declines; 5xx responses are ambiguous and map to
/// `Unavailable`.
fn classify_error(status: u16, body: &serde_json::Value) -> GatewayError {
    if status >= 500 {
        return GatewayError::Unavailable(format!("gateway returned HTTP {}", status));
    }

    let parsed: Option<ApiErrorBody> = serde_json::from_value(body.clone()).ok();
    let Some(detail) = parsed.map(|b| b.error) else {
        return GatewayError::Protocol(format!("HTTP {} with unrecognized error body", status));
    };

    let message = detail
        .message
        .unwrap_or_else(|| format!("HTTP {}", status));

    if detail.code.as_deref() == Some("authentication_required") {
        return GatewayError::RequiresAction {
            payment_intent_id: detail.payment_intent.map(|i| i.id),
        };
    }

    if detail.error_type.as_deref() == Some("card_error") {
        return GatewayError::Declined(message);
    }

    GatewayError::Protocol(message)
}

fn str_field(value: &serde_json::Value, field: &str) -> Result<String, GatewayError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Protocol(format!("missing field `{}` in response", field)))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        phone: &str,
        booking_id: Uuid,
    ) -> Result<CustomerHandle, GatewayError> {
        let body = self
            .post_form(
                "/customers",
                &[
                    ("email", email.to_string()),
                    ("name", name.to_string()),
                    ("phone", phone.to_string()),
                    ("metadata[booking_id]", booking_id.to_string()),
                ],
            )
            .await?;

        Ok(CustomerHandle {
            id: str_field(&body, "id")?,
        })
    }

    async fn create_intent(
        &self,
        amount_cents: i64,
        customer_id: &str,
        booking_id: Uuid,
    ) -> Result<IntentHandle, GatewayError> {
        let body = self
            .post_form(
                "/payment_intents",
                &[
                    ("amount", amount_cents.to_string()),
                    ("currency", "usd".to_string()),
                    ("customer", customer_id.to_string()),
                    ("capture_method", "manual".to_string()),
                    ("setup_future_usage", "off_session".to_string()),
                    ("metadata[booking_id]", booking_id.to_string()),
                ],
            )
            .await?;

        Ok(IntentHandle {
            id: str_field(&body, "id")?,
            client_secret: body
                .get("client_secret")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    async fn capture(
        &self,
        intent_id: &str,
        amount_cents: i64,
    ) -> Result<CapturedIntent, GatewayError> {
        let body = self
            .post_form(
                &format!("/payment_intents/{}/capture", intent_id),
                &[("amount_to_capture", amount_cents.to_string())],
            )
            .await?;

        Ok(CapturedIntent {
            id: str_field(&body, "id")?,
            payment_method_id: body
                .get("payment_method")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    async fn charge_saved_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
        amount_cents: i64,
        booking_id: Uuid,
    ) -> Result<IntentHandle, GatewayError> {
        let body = self
            .post_form(
                "/payment_intents",
                &[
                    ("amount", amount_cents.to_string()),
                    ("currency", "usd".to_string()),
                    ("customer", customer_id.to_string()),
                    ("payment_method", payment_method_id.to_string()),
                    ("off_session", "true".to_string()),
                    ("confirm", "true".to_string()),
                    ("metadata[booking_id]", booking_id.to_string()),
                    ("metadata[payment_type]", "final_payment".to_string()),
                ],
            )
            .await?;

        Ok(IntentHandle {
            id: str_field(&body, "id")?,
            client_secret: None,
        })
    }

    async fn refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: &str,
    ) -> Result<String, GatewayError> {
        let body = self
            .post_form(
                "/refunds",
                &[
                    ("payment_intent", intent_id.to_string()),
                    ("amount", amount_cents.to_string()),
                    ("reason", "requested_by_customer".to_string()),
                    ("metadata[refund_reason]", reason.to_string()),
                ],
            )
            .await?;

        str_field(&body, "id")
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), GatewayError> {
        self.post_form(&format!("/payment_intents/{}/cancel", intent_id), &[])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_authentication_required() {
        let body = json!({
            "error": {
                "type": "card_error",
                "code": "authentication_required",
                "message": "Your card requires authentication.",
                "payment_intent": { "id": "pi_123" }
            }
        });

        match classify_error(402, &body) {
            GatewayError::RequiresAction { payment_intent_id } => {
                assert_eq!(payment_intent_id.as_deref(), Some("pi_123"));
            }
            other => panic!("expected RequiresAction, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_card_decline() {
        let body = json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "message": "Your card was declined."
            }
        });

        match classify_error(402, &body) {
            GatewayError::Declined(msg) => assert!(msg.contains("declined")),
            other => panic!("expected Declined, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_server_error_is_ambiguous() {
        let body = json!({});
        assert!(matches!(
            classify_error(503, &body),
            GatewayError::Unavailable(_)
        ));
    }

    #[test]
    fn test_classify_unrecognized_body() {
        let body = json!({ "weird": true });
        assert!(matches!(
            classify_error(400, &body),
            GatewayError::Protocol(_)
        ));
    }

    #[test]
    fn test_str_field_missing() {
        let body = json!({ "id": 42 });
        assert!(str_field(&body, "id").is_err());
        assert!(str_field(&body, "nope").is_err());
    }
}
