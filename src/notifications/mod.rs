// Notification boundary
//
// Outbound fire-and-forget messages. Callers treat every failure as
// non-fatal: a failed send is logged and surfaced as a warning next to the
// otherwise-successful state transition, never rolled into it.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::bookings::Booking;
use crate::payments::Payment;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier not configured")]
    NotConfigured,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound customer notifications triggered by lifecycle transitions
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sent when the deposit is captured and the booking confirms
    async fn booking_confirmation(
        &self,
        booking: &Booking,
        remaining_balance: Decimal,
    ) -> Result<(), NotifyError>;

    /// Sent when a booking is cancelled
    async fn booking_cancellation(&self, booking: &Booking) -> Result<(), NotifyError>;

    /// Sent shortly before the appointment
    async fn booking_reminder(&self, booking: &Booking) -> Result<(), NotifyError>;

    /// Receipt after the balance is fully captured
    async fn completion_receipt(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), NotifyError>;

    /// Receipt after a deposit refund
    async fn refund_receipt(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), NotifyError>;
}

/// Mailgun-backed email notifier
///
/// Plain-text bodies, one message per lifecycle event. Credentials are
/// injected at construction.
pub struct MailgunNotifier {
    http: Client,
    api_base: String,
    domain: String,
    api_key: String,
    from_address: String,
}

impl MailgunNotifier {
    pub fn new(domain: String, api_key: String, from_address: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_base: "https://api.mailgun.net/v3".to_string(),
            domain,
            api_key,
            from_address,
        }
    }

    /// Point the client at a different base URL (local stubs)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/{}/messages", self.api_base, self.domain);

        let response = self
            .http
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from_address.as_str()),
                ("to", to),
                ("subject", subject),
                ("text", text),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "mailgun returned HTTP {}",
                response.status()
            )));
        }

        tracing::debug!(to = %to, subject = %subject, "notification sent");
        Ok(())
    }
}

fn dollars(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn booking_confirmation(
        &self,
        booking: &Booking,
        remaining_balance: Decimal,
    ) -> Result<(), NotifyError> {
        let subject = format!("Booking Confirmed - #{}", booking.id);
        let text = format!(
            "Hi {},\n\nYour detailing appointment is confirmed.\n\
             Date: {}\nTime: {}\nLocation: {}, {}\n\n\
             Remaining balance due after service: ${}\n\nSee you soon!",
            booking.first_name,
            booking.booking_date,
            booking.booking_time.format("%I:%M %p"),
            booking.address,
            booking.city,
            remaining_balance,
        );
        self.send(&booking.email, &subject, &text).await
    }

    async fn booking_cancellation(&self, booking: &Booking) -> Result<(), NotifyError> {
        let subject = format!("Booking Cancellation - #{}", booking.id);
        let text = format!(
            "Hi {},\n\nYour appointment on {} at {} has been cancelled.\n{}",
            booking.first_name,
            booking.booking_date,
            booking.booking_time.format("%I:%M %p"),
            booking
                .cancellation_reason
                .as_deref()
                .map(|r| format!("Reason: {}\n", r))
                .unwrap_or_default(),
        );
        self.send(&booking.email, &subject, &text).await
    }

    async fn booking_reminder(&self, booking: &Booking) -> Result<(), NotifyError> {
        let subject = "Reminder: your appointment is in 30 minutes!".to_string();
        let text = format!(
            "Hi {},\n\nThis is a reminder that your detailing appointment starts at {}.\n\
             Location: {}, {}\n\nSee you soon!",
            booking.first_name,
            booking.booking_time.format("%I:%M %p"),
            booking.address,
            booking.city,
        );
        self.send(&booking.email, &subject, &text).await
    }

    async fn completion_receipt(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), NotifyError> {
        let subject = format!("Service Completion Receipt - #{}", booking.id);
        let text = format!(
            "Hi {},\n\nThanks for your business! Your service is complete.\n\n\
             Deposit: {}\nBalance: {}\nTotal paid: {}\n",
            booking.first_name,
            dollars(payment.deposit_amount),
            dollars(payment.remaining_amount),
            dollars(payment.total_amount),
        );
        self.send(&booking.email, &subject, &text).await
    }

    async fn refund_receipt(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), NotifyError> {
        let subject = format!("Refund Receipt - #{}", booking.id);
        let text = format!(
            "Hi {},\n\nYour deposit of {} has been refunded.\n\
             It may take a few business days to appear on your statement.\n",
            booking.first_name,
            dollars(payment.deposit_amount),
        );
        self.send(&booking.email, &subject, &text).await
    }
}

/// No-op notifier used when Mailgun credentials are absent (dev mode):
/// logs the event and reports failure so reminder sends are retried once a
/// real notifier is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn booking_confirmation(
        &self,
        booking: &Booking,
        _remaining_balance: Decimal,
    ) -> Result<(), NotifyError> {
        tracing::info!(booking_id = %booking.id, "notifier not configured; skipping confirmation");
        Err(NotifyError::NotConfigured)
    }

    async fn booking_cancellation(&self, booking: &Booking) -> Result<(), NotifyError> {
        tracing::info!(booking_id = %booking.id, "notifier not configured; skipping cancellation notice");
        Err(NotifyError::NotConfigured)
    }

    async fn booking_reminder(&self, booking: &Booking) -> Result<(), NotifyError> {
        tracing::info!(booking_id = %booking.id, "notifier not configured; skipping reminder");
        Err(NotifyError::NotConfigured)
    }

    async fn completion_receipt(
        &self,
        booking: &Booking,
        _payment: &Payment,
    ) -> Result<(), NotifyError> {
        tracing::info!(booking_id = %booking.id, "notifier not configured; skipping completion receipt");
        Err(NotifyError::NotConfigured)
    }

    async fn refund_receipt(
        &self,
        booking: &Booking,
        _payment: &Payment,
    ) -> Result<(), NotifyError> {
        tracing::info!(booking_id = %booking.id, "notifier not configured; skipping refund receipt");
        Err(NotifyError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollars_formatting() {
        assert_eq!(dollars(7500), "$75.00");
        assert_eq!(dollars(2505), "$25.05");
        assert_eq!(dollars(9), "$0.09");
    }
}
