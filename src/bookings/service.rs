use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bookings::availability::occupied_slots;
use crate::bookings::error::BookingError;
use crate::bookings::repository::{BookingsRepository, CatalogRepository};
use crate::bookings::status_machine::StatusMachine;
use crate::bookings::{
    Booking, BookingStatus, CreateBookingRequest, CreateBookingResponse, NewBooking,
};
use crate::notifications::Notifier;
use crate::payments::{
    CaptureOutcome, Payment, PaymentError, PaymentService, PaymentStateMachine, PaymentStatus,
};
use crate::service_area::{ServiceArea, ServiceAreaCheck};

/// Orchestrates the booking lifecycle
///
/// Each transition follows the same shape: validate the move with the
/// status machine, settle the money side first, then compare-and-set the
/// booking row. Payment failures therefore abort transitions before any
/// booking state changes, and a CAS miss is resolved by re-reading rather
/// than retrying blind.
pub struct BookingService {
    catalog: CatalogRepository,
    bookings: BookingsRepository,
    payments: Arc<PaymentService>,
    notifier: Arc<dyn Notifier>,
    service_area: ServiceArea,
}

impl BookingService {
    pub fn new(
        catalog: CatalogRepository,
        bookings: BookingsRepository,
        payments: Arc<PaymentService>,
        notifier: Arc<dyn Notifier>,
        service_area: ServiceArea,
    ) -> Self {
        Self {
            catalog,
            bookings,
            payments,
            notifier,
            service_area,
        }
    }

    /// Create a booking and open its payment authorization
    ///
    /// The slot is claimed first (under the per-date lock), then the
    /// authorization is opened. If the gateway refuses, the fresh booking
    /// is cancelled again so the slot frees immediately instead of waiting
    /// for manual cleanup.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<CreateBookingResponse, BookingError> {
        let offering = self
            .catalog
            .find_offering(request.offering_id)
            .await?
            .ok_or(BookingError::OfferingNotFound(request.offering_id))?;

        let vehicle_type = self
            .catalog
            .find_vehicle_type(request.vehicle_type_id)
            .await?
            .ok_or(BookingError::VehicleTypeNotFound(request.vehicle_type_id))?;

        let service_area_message = match self
            .service_area
            .check(&request.address, &request.city, &request.zip_code)
            .await
        {
            ServiceAreaCheck::Inside { .. } => None,
            ServiceAreaCheck::Outside { distance_miles } => {
                return Err(BookingError::OutOfServiceArea {
                    message: format!(
                        "This address is about {distance_miles:.1} miles away, \
                         outside our {}-mile service area",
                        crate::service_area::SERVICE_RADIUS_MILES
                    ),
                    distance_miles: Some(distance_miles),
                });
            }
            ServiceAreaCheck::Unverified { message } => Some(message),
        };

        let new = NewBooking::build(&request, &offering, &vehicle_type);
        if new.booking_end_time <= new.booking_time {
            return Err(BookingError::ValidationError(
                "Appointment cannot extend past midnight".to_string(),
            ));
        }

        let booking = self.bookings.create_checked(new).await?;
        info!(
            booking_id = %booking.id,
            date = %booking.booking_date,
            time = %booking.booking_time,
            "booking created"
        );

        let authorization = match self
            .payments
            .create_authorization(&booking, offering.deposit_amount)
            .await
        {
            Ok(auth) => auth,
            Err(e) => {
                // Give the slot back; the booking row stays as an audit
                // trail of the failed attempt.
                if let Err(cancel_err) = self
                    .bookings
                    .cancel(booking.id, "Payment authorization failed")
                    .await
                {
                    warn!(
                        booking_id = %booking.id,
                        error = %cancel_err,
                        "could not release slot after failed authorization"
                    );
                }
                return Err(e.into());
            }
        };

        let payment = authorization.payment;
        Ok(CreateBookingResponse {
            booking: booking.into(),
            payment_id: payment.id,
            client_secret: authorization.client_secret,
            deposit_amount_cents: payment.deposit_amount,
            total_amount_cents: payment.total_amount,
            service_area_message,
        })
    }

    /// Confirm a booking by capturing its deposit
    ///
    /// Idempotent: confirming an already-confirmed booking returns it
    /// unchanged. If webhook reconciliation captured the deposit first,
    /// the flow skips the gateway and just advances the booking.
    pub async fn confirm_booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.find(id).await?;
        if booking.status == BookingStatus::Confirmed {
            return Ok(booking);
        }
        StatusMachine::transition(booking.status, BookingStatus::Confirmed)
            .map_err(BookingError::InvalidTransition)?;

        let payment = self.payment_for(booking.id).await?;
        let payment = if PaymentStateMachine::can_capture_deposit(payment.status) {
            self.payments.capture_deposit(payment.id).await?
        } else if matches!(
            payment.status,
            PaymentStatus::DepositCaptured | PaymentStatus::FullyCaptured
        ) {
            payment
        } else {
            return Err(PaymentError::InvalidState {
                operation: "capture_deposit".to_string(),
                status: payment.status.as_str().to_string(),
            }
            .into());
        };

        let updated = match self
            .bookings
            .update_status(id, booking.status, BookingStatus::Confirmed)
            .await?
        {
            Some(updated) => updated,
            None => {
                let current = self.find(id).await?;
                if current.status == BookingStatus::Confirmed {
                    current
                } else {
                    return Err(BookingError::InvalidTransition(format!(
                        "Booking moved to {} during confirmation",
                        current.status
                    )));
                }
            }
        };

        info!(booking_id = %updated.id, "booking confirmed");

        let remaining = Decimal::new(payment.remaining_amount, 2);
        if let Err(e) = self.notifier.booking_confirmation(&updated, remaining).await {
            warn!(booking_id = %updated.id, error = %e, "confirmation notice not sent");
        }

        Ok(updated)
    }

    /// Complete a booking, capturing the remaining balance first
    pub async fn complete_booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.find(id).await?;
        if booking.status == BookingStatus::Completed {
            return Ok(booking);
        }
        StatusMachine::transition(booking.status, BookingStatus::Completed)
            .map_err(BookingError::InvalidTransition)?;

        let payment = self.payment_for(booking.id).await?;
        match self.payments.capture_remaining(payment.id, &booking).await? {
            CaptureOutcome::Captured { receipt_sent, .. } => {
                if !receipt_sent {
                    warn!(booking_id = %booking.id, "completion receipt not sent");
                }
            }
            CaptureOutcome::AlreadyCaptured { .. } => {
                info!(booking_id = %booking.id, "balance was already captured");
            }
        }

        let updated = match self
            .bookings
            .update_status(id, booking.status, BookingStatus::Completed)
            .await?
        {
            Some(updated) => updated,
            None => {
                let current = self.find(id).await?;
                if current.status == BookingStatus::Completed {
                    current
                } else {
                    return Err(BookingError::InvalidTransition(format!(
                        "Booking moved to {} during completion",
                        current.status
                    )));
                }
            }
        };

        info!(booking_id = %updated.id, "booking completed");
        Ok(updated)
    }

    /// Cancel a booking, releasing or refunding its payment
    ///
    /// A still-pending authorization is voided; a captured deposit is
    /// refunded. Either gateway failure aborts the cancellation so money
    /// and booking state never diverge.
    pub async fn cancel_booking(&self, id: Uuid, reason: &str) -> Result<Booking, BookingError> {
        let booking = self.find(id).await?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }
        StatusMachine::transition(booking.status, BookingStatus::Cancelled)
            .map_err(BookingError::InvalidTransition)?;

        if let Some(payment) = self.payments.find_by_booking(booking.id).await? {
            match payment.status {
                PaymentStatus::Pending => {
                    self.payments.cancel_authorization(payment.id).await?;
                }
                PaymentStatus::DepositCaptured | PaymentStatus::FullyCaptured => {
                    self.payments
                        .refund_deposit(payment.id, &booking, reason)
                        .await?;
                }
                // Nothing held, nothing to release.
                PaymentStatus::DepositRefunded
                | PaymentStatus::Cancelled
                | PaymentStatus::Failed => {}
            }
        }

        let updated = match self.bookings.cancel(id, reason).await? {
            Some(updated) => updated,
            None => {
                let current = self.find(id).await?;
                if current.status == BookingStatus::Cancelled {
                    current
                } else {
                    return Err(BookingError::InvalidTransition(format!(
                        "Booking moved to {} during cancellation",
                        current.status
                    )));
                }
            }
        };

        info!(booking_id = %updated.id, reason, "booking cancelled");

        if let Err(e) = self.notifier.booking_cancellation(&updated).await {
            warn!(booking_id = %updated.id, error = %e, "cancellation notice not sent");
        }

        Ok(updated)
    }

    /// Mark a no-show; the captured deposit is retained
    pub async fn mark_no_show(&self, id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.find(id).await?;
        if booking.status == BookingStatus::NoShow {
            return Ok(booking);
        }
        StatusMachine::transition(booking.status, BookingStatus::NoShow)
            .map_err(BookingError::InvalidTransition)?;

        let updated = match self
            .bookings
            .update_status(id, booking.status, BookingStatus::NoShow)
            .await?
        {
            Some(updated) => updated,
            None => {
                let current = self.find(id).await?;
                if current.status == BookingStatus::NoShow {
                    current
                } else {
                    return Err(BookingError::InvalidTransition(format!(
                        "Booking moved to {} during no-show marking",
                        current.status
                    )));
                }
            }
        };

        info!(booking_id = %updated.id, "booking marked no-show");
        Ok(updated)
    }

    /// Fetch a single booking
    pub async fn get_booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.find(id).await
    }

    /// List bookings with optional date and status filters
    pub async fn list_bookings(
        &self,
        date: Option<NaiveDate>,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, BookingError> {
        self.bookings.list(date, status).await
    }

    /// Occupied 30-minute slots for a date, as "HH:MM" labels
    pub async fn occupied_slots_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<String>, BookingError> {
        let windows = self.bookings.windows_for_date(date).await?;
        Ok(occupied_slots(&windows))
    }

    async fn find(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or(BookingError::NotFound)
    }

    async fn payment_for(&self, booking_id: Uuid) -> Result<Payment, BookingError> {
        self.payments
            .find_by_booking(booking_id)
            .await?
            .ok_or(PaymentError::NotFound)
            .map_err(BookingError::from)
    }
}
