// Reminder sweep
//
// A background task wakes once a minute and reminds customers whose
// confirmed appointment starts 25 to 35 minutes from now. The band is
// wider than the sweep interval so a missed tick cannot skip anyone, and
// the sent flag is written only after a successful send: a failed send is
// retried on the next sweep for as long as the appointment stays in the
// band.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bookings::error::BookingError;
use crate::bookings::repository::BookingsRepository;
use crate::bookings::Booking;
use crate::notifications::Notifier;

/// Minimum lead time before the appointment, in minutes
pub const REMINDER_LEAD_MIN_MINUTES: i64 = 25;
/// Maximum lead time before the appointment, in minutes
pub const REMINDER_LEAD_MAX_MINUTES: i64 = 35;

const SWEEP_INTERVAL_SECS: u64 = 60;

/// The half-open [start, end) datetime band a sweep at `now` covers
pub fn lead_band(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    (
        now + ChronoDuration::minutes(REMINDER_LEAD_MIN_MINUTES),
        now + ChronoDuration::minutes(REMINDER_LEAD_MAX_MINUTES),
    )
}

/// Whether an appointment starting at `start` is due for a reminder at
/// `now`
pub fn within_lead_band(start: NaiveDateTime, now: NaiveDateTime) -> bool {
    let (band_start, band_end) = lead_band(now);
    start >= band_start && start < band_end
}

/// The two storage operations the sweep needs
///
/// `mark_reminder_sent` must be compare-and-set on the unsent flag: it
/// returns false when the booking was already claimed, so two overlapping
/// sweeps cannot both count the same reminder.
#[async_trait]
pub trait ReminderQueue: Send + Sync {
    async fn due_for_reminder(
        &self,
        date: NaiveDate,
        from: NaiveTime,
        until: NaiveTime,
    ) -> Result<Vec<Booking>, BookingError>;

    async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, BookingError>;
}

#[async_trait]
impl ReminderQueue for BookingsRepository {
    async fn due_for_reminder(
        &self,
        date: NaiveDate,
        from: NaiveTime,
        until: NaiveTime,
    ) -> Result<Vec<Booking>, BookingError> {
        BookingsRepository::due_for_reminder(self, date, from, until).await
    }

    async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, BookingError> {
        BookingsRepository::mark_reminder_sent(self, id).await
    }
}

pub struct ReminderScheduler {
    bookings: Arc<dyn ReminderQueue>,
    notifier: Arc<dyn Notifier>,
}

impl ReminderScheduler {
    pub fn new(bookings: Arc<dyn ReminderQueue>, notifier: Arc<dyn Notifier>) -> Self {
        Self { bookings, notifier }
    }

    /// Run the sweep loop forever
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("reminder scheduler started");

        loop {
            ticker.tick().await;
            let now = Local::now().naive_local();
            match self.sweep(now).await {
                Ok(0) => {}
                Ok(sent) => info!(sent, "reminder sweep finished"),
                Err(e) => warn!(error = %e, "reminder sweep failed"),
            }
        }
    }

    /// One pass: remind every due booking, flagging each only after its
    /// send succeeded
    pub async fn sweep(&self, now: NaiveDateTime) -> Result<usize, String> {
        let (band_start, band_end) = lead_band(now);
        let mut sent = 0;

        for (date, from, until) in split_by_date(band_start, band_end) {
            let due = self
                .bookings
                .due_for_reminder(date, from, until)
                .await
                .map_err(|e| e.to_string())?;

            for booking in due {
                if let Err(e) = self.notifier.booking_reminder(&booking).await {
                    warn!(booking_id = %booking.id, error = %e, "reminder not sent, will retry");
                    continue;
                }

                match self.bookings.mark_reminder_sent(booking.id).await {
                    Ok(true) => sent += 1,
                    Ok(false) => {
                        debug!(booking_id = %booking.id, "booking was already reminded")
                    }
                    Err(e) => {
                        // The customer was notified; an unset flag only
                        // risks a duplicate next sweep.
                        warn!(booking_id = %booking.id, error = %e, "could not flag reminder")
                    }
                }
            }
        }

        Ok(sent)
    }
}

/// Split a datetime band into per-date time ranges
///
/// The band is 10 minutes wide, so it touches at most two dates (around
/// midnight). Each piece keeps the half-open convention.
fn split_by_date(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<(NaiveDate, NaiveTime, NaiveTime)> {
    if start.date() == end.date() {
        return vec![(start.date(), start.time(), end.time())];
    }

    let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
    vec![
        (start.date(), start.time(), end_of_day),
        (end.date(), midnight, end.time()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(date: (i32, u32, u32), time: (u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, 0)
            .unwrap()
    }

    #[test]
    fn test_band_edges() {
        let now = dt((2026, 3, 14), (9, 0));
        // 25 minutes out is included, 35 is not.
        assert!(within_lead_band(dt((2026, 3, 14), (9, 25)), now));
        assert!(within_lead_band(dt((2026, 3, 14), (9, 30)), now));
        assert!(within_lead_band(dt((2026, 3, 14), (9, 34)), now));
        assert!(!within_lead_band(dt((2026, 3, 14), (9, 35)), now));
        assert!(!within_lead_band(dt((2026, 3, 14), (9, 24)), now));
    }

    #[test]
    fn test_band_excludes_past_and_far_future() {
        let now = dt((2026, 3, 14), (9, 0));
        assert!(!within_lead_band(dt((2026, 3, 14), (8, 30)), now));
        assert!(!within_lead_band(dt((2026, 3, 14), (11, 0)), now));
        assert!(!within_lead_band(dt((2026, 3, 15), (9, 30)), now));
    }

    #[test]
    fn test_band_is_ten_minutes_wide() {
        let now = dt((2026, 3, 14), (14, 42));
        let (start, end) = lead_band(now);
        assert_eq!(end - start, ChronoDuration::minutes(10));
        assert_eq!(start, dt((2026, 3, 14), (15, 7)));
    }

    #[test]
    fn test_split_same_date() {
        let pieces = split_by_date(dt((2026, 3, 14), (9, 25)), dt((2026, 3, 14), (9, 35)));
        assert_eq!(pieces.len(), 1);
        let (date, from, until) = pieces[0];
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(from, NaiveTime::from_hms_opt(9, 25, 0).unwrap());
        assert_eq!(until, NaiveTime::from_hms_opt(9, 35, 0).unwrap());
    }

    #[test]
    fn test_split_across_midnight() {
        let pieces = split_by_date(dt((2026, 3, 14), (23, 55)), dt((2026, 3, 15), (0, 5)));
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].0, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(pieces[1].0, NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
        assert_eq!(pieces[1].1, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(pieces[1].2, NaiveTime::from_hms_opt(0, 5, 0).unwrap());
    }

    #[test]
    fn test_midnight_crossing_band_detects_next_day_start() {
        let now = dt((2026, 3, 14), (23, 40));
        assert!(within_lead_band(dt((2026, 3, 15), (0, 10)), now));
    }
}

#[cfg(test)]
mod sweep_tests {
    use super::*;
    use crate::bookings::BookingStatus;
    use crate::notifications::NotifyError;
    use crate::payments::Payment;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeQueue {
        bookings: Vec<Booking>,
        claimed: Mutex<HashSet<Uuid>>,
    }

    impl FakeQueue {
        fn new(bookings: Vec<Booking>) -> Self {
            Self {
                bookings,
                claimed: Mutex::new(HashSet::new()),
            }
        }

        fn is_claimed(&self, id: Uuid) -> bool {
            self.claimed.lock().unwrap().contains(&id)
        }
    }

    #[async_trait]
    impl ReminderQueue for FakeQueue {
        // The due list is a snapshot: a concurrent sweep may claim a
        // booking after it was read, which is what the mark CAS absorbs.
        async fn due_for_reminder(
            &self,
            date: NaiveDate,
            from: NaiveTime,
            until: NaiveTime,
        ) -> Result<Vec<Booking>, BookingError> {
            Ok(self
                .bookings
                .iter()
                .filter(|b| {
                    b.booking_date == date && b.booking_time >= from && b.booking_time < until
                })
                .cloned()
                .collect())
        }

        async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, BookingError> {
            Ok(self.claimed.lock().unwrap().insert(id))
        }
    }

    /// Reminder attempts fail until `failures` runs out, then succeed
    struct FlakyNotifier {
        failures: AtomicUsize,
        sent: AtomicUsize,
    }

    impl FlakyNotifier {
        fn failing_first(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                sent: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn booking_confirmation(
            &self,
            _booking: &Booking,
            _remaining_balance: Decimal,
        ) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn booking_cancellation(&self, _booking: &Booking) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn booking_reminder(&self, _booking: &Booking) -> Result<(), NotifyError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(NotifyError::Delivery("smtp down".to_string()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn completion_receipt(
            &self,
            _booking: &Booking,
            _payment: &Payment,
        ) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn refund_receipt(
            &self,
            _booking: &Booking,
            _payment: &Payment,
        ) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn confirmed_booking(date: (i32, u32, u32), time: (u32, u32)) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+13235551234".to_string(),
            offering_id: 1,
            vehicle_type_id: 1,
            booking_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            booking_time: NaiveTime::from_hms_opt(time.0, time.1, 0).unwrap(),
            booking_end_time: NaiveTime::from_hms_opt(time.0 + 1, time.1, 0).unwrap(),
            address: "123 Main St".to_string(),
            city: "North Hollywood".to_string(),
            zip_code: "91602".to_string(),
            status: BookingStatus::Confirmed,
            is_confirmed: true,
            total_price: dec!(100.00),
            reminder_sent: false,
            reminder_sent_at: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_sends_and_flags_due_bookings() {
        let due = confirmed_booking((2026, 3, 14), (9, 30));
        let due_id = due.id;
        let out_of_band = confirmed_booking((2026, 3, 14), (12, 0));
        let queue = Arc::new(FakeQueue::new(vec![due, out_of_band.clone()]));
        let notifier = Arc::new(FlakyNotifier::failing_first(0));
        let scheduler = ReminderScheduler::new(queue.clone(), notifier.clone());

        let sent = scheduler.sweep(now()).await.unwrap();
        assert_eq!(sent, 1);
        assert!(queue.is_claimed(due_id));
        assert!(!queue.is_claimed(out_of_band.id));
    }

    #[tokio::test]
    async fn test_failed_send_leaves_flag_unset_and_retries() {
        let due = confirmed_booking((2026, 3, 14), (9, 30));
        let due_id = due.id;
        let queue = Arc::new(FakeQueue::new(vec![due]));
        let notifier = Arc::new(FlakyNotifier::failing_first(1));
        let scheduler = ReminderScheduler::new(queue.clone(), notifier.clone());

        // First sweep: the send fails, so the booking stays unflagged.
        assert_eq!(scheduler.sweep(now()).await.unwrap(), 0);
        assert!(!queue.is_claimed(due_id));

        // Next sweep inside the band picks it up again and succeeds.
        assert_eq!(scheduler.sweep(now()).await.unwrap(), 1);
        assert!(queue.is_claimed(due_id));
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_claimed_booking_not_counted_again() {
        let due = confirmed_booking((2026, 3, 14), (9, 30));
        let queue = Arc::new(FakeQueue::new(vec![due.clone()]));
        let notifier = Arc::new(FlakyNotifier::failing_first(0));
        let scheduler = ReminderScheduler::new(queue.clone(), notifier);

        // A concurrent sweep claimed the flag between read and send.
        queue.mark_reminder_sent(due.id).await.unwrap();
        assert_eq!(scheduler.sweep(now()).await.unwrap(), 0);
    }
}
