use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::bookings::availability::{check_availability, SlotCheck, TimeWindow};
use crate::bookings::error::BookingError;
use crate::bookings::{Booking, BookingStatus, NewBooking};
use crate::models::{ServiceOffering, VehicleType};

const BOOKING_COLUMNS: &str = "id, first_name, last_name, email, phone, offering_id, \
     vehicle_type_id, booking_date, booking_time, booking_end_time, address, city, \
     zip_code, status, is_confirmed, total_price, reminder_sent, reminder_sent_at, \
     cancellation_reason, cancelled_at, created_at, updated_at";

/// Read-side access to the catalog for booking flows
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    /// Create a new CatalogRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an active offering by ID
    pub async fn find_offering(&self, id: i32) -> Result<Option<ServiceOffering>, BookingError> {
        let offering = sqlx::query_as::<_, ServiceOffering>(
            "SELECT id, name, tier, description, price, deposit_amount, duration_minutes, \
             display_order, is_active, created_at, updated_at \
             FROM service_offerings WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offering)
    }

    /// Find a vehicle type by ID
    pub async fn find_vehicle_type(&self, id: i32) -> Result<Option<VehicleType>, BookingError> {
        let vehicle_type = sqlx::query_as::<_, VehicleType>(
            "SELECT id, name, price_multiplier, surcharge_note, display_order \
             FROM vehicle_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vehicle_type)
    }
}

/// Repository for booking rows
#[derive(Clone)]
pub struct BookingsRepository {
    pool: PgPool,
}

impl BookingsRepository {
    /// Create a new BookingsRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a booking, checking slot availability under a per-date
    /// advisory lock
    ///
    /// The lock serializes all inserts for one calendar date, so the
    /// availability read and the insert are atomic with respect to other
    /// booking attempts: two requests for overlapping windows on the same
    /// date cannot both pass the check. The lock is transaction-scoped and
    /// releases on commit or rollback.
    pub async fn create_checked(&self, new: NewBooking) -> Result<Booking, BookingError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(new.booking_date.to_string())
            .execute(&mut *tx)
            .await?;

        let rows: Vec<(chrono::NaiveTime, chrono::NaiveTime, BookingStatus)> = sqlx::query_as(
            "SELECT booking_time, booking_end_time, status FROM bookings \
             WHERE booking_date = $1",
        )
        .bind(new.booking_date)
        .fetch_all(&mut *tx)
        .await?;

        let existing = slot_windows(&rows);

        let duration = minutes_between(new.booking_time, new.booking_end_time);
        if let SlotCheck::Conflict { window } =
            check_availability(new.booking_time, duration, &existing)
        {
            return Err(BookingError::SlotConflict {
                window: window.format(),
            });
        }

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings
                (first_name, last_name, email, phone, offering_id, vehicle_type_id,
                 booking_date, booking_time, booking_end_time, address, city, zip_code,
                 total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.offering_id)
        .bind(new.vehicle_type_id)
        .bind(new.booking_date)
        .bind(new.booking_time)
        .bind(new.booking_end_time)
        .bind(&new.address)
        .bind(&new.city)
        .bind(&new.zip_code)
        .bind(new.total_price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    /// Find a booking by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// List bookings, newest first, optionally filtered by date and status
    pub async fn list(
        &self,
        date: Option<NaiveDate>,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, BookingError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE ($1::date IS NULL OR booking_date = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY booking_date DESC, booking_time DESC",
        ))
        .bind(date)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Raw appointment windows of slot-occupying bookings on a date
    pub async fn windows_for_date(&self, date: NaiveDate) -> Result<Vec<TimeWindow>, BookingError> {
        let rows: Vec<(chrono::NaiveTime, chrono::NaiveTime, BookingStatus)> = sqlx::query_as(
            "SELECT booking_time, booking_end_time, status FROM bookings \
             WHERE booking_date = $1",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(slot_windows(&rows))
    }

    /// CAS a booking from one status to another
    ///
    /// None means the booking was not in `from` at update time; the caller
    /// re-reads to distinguish not-found from a lost race.
    pub async fn update_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings
            SET status = $3,
                is_confirmed = CASE WHEN $3 = 'confirmed' THEN TRUE ELSE is_confirmed END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// CAS into cancelled from either live status, recording the reason
    pub async fn cancel(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<Option<Booking>, BookingError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings
            SET status = 'cancelled',
                cancellation_reason = $2,
                cancelled_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'confirmed')
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// Confirmed bookings whose start time falls inside [from, until) today
    /// and that have not been reminded yet
    pub async fn due_for_reminder(
        &self,
        date: NaiveDate,
        from: chrono::NaiveTime,
        until: chrono::NaiveTime,
    ) -> Result<Vec<Booking>, BookingError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = 'confirmed' \
               AND reminder_sent = FALSE \
               AND booking_date = $1 \
               AND booking_time >= $2 AND booking_time < $3 \
             ORDER BY booking_time",
        ))
        .bind(date)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Flag a booking as reminded; CAS on the unsent flag so two sweeps
    /// cannot both claim the same booking
    pub async fn mark_reminder_sent(&self, id: Uuid) -> Result<bool, BookingError> {
        let result = sqlx::query(
            "UPDATE bookings \
             SET reminder_sent = TRUE, reminder_sent_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND reminder_sent = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn minutes_between(start: chrono::NaiveTime, end: chrono::NaiveTime) -> i32 {
    use chrono::Timelike;
    let start_min = (start.hour() * 60 + start.minute()) as i32;
    let end_min = (end.hour() * 60 + end.minute()) as i32;
    end_min - start_min
}

/// The appointment windows on a date that still block new bookings
///
/// Every non-cancelled booking keeps its window: completed and no-show
/// appointments still occupied real calendar time, and only an explicit
/// cancellation hands the slot back.
fn slot_windows(rows: &[(chrono::NaiveTime, chrono::NaiveTime, BookingStatus)]) -> Vec<TimeWindow> {
    rows.iter()
        .filter(|(_, _, status)| status.occupies_slot())
        .map(|(start, end, _)| TimeWindow::from_times(*start, *end))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::availability::{check_availability, SlotCheck};
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_completed_booking_still_blocks_its_window() {
        // A 14:00-15:00 appointment marked completed early must still
        // conflict with a 14:30 request on the same date.
        let rows = vec![(t(14, 0), t(15, 0), BookingStatus::Completed)];
        let windows = slot_windows(&rows);
        assert_eq!(windows.len(), 1);
        assert!(matches!(
            check_availability(t(14, 30), 60, &windows),
            SlotCheck::Conflict { .. }
        ));
    }

    #[test]
    fn test_no_show_booking_still_blocks_its_window() {
        let rows = vec![(t(9, 0), t(10, 0), BookingStatus::NoShow)];
        assert_eq!(slot_windows(&rows).len(), 1);
    }

    #[test]
    fn test_cancelled_booking_frees_its_window() {
        let rows = vec![
            (t(10, 0), t(11, 0), BookingStatus::Cancelled),
            (t(13, 0), t(14, 0), BookingStatus::Confirmed),
        ];
        let windows = slot_windows(&rows);
        assert_eq!(windows.len(), 1);
        assert!(matches!(
            check_availability(t(10, 0), 60, &windows),
            SlotCheck::Free
        ));
    }

    #[test]
    fn test_minutes_between() {
        assert_eq!(minutes_between(t(10, 0), t(11, 30)), 90);
        assert_eq!(minutes_between(t(9, 15), t(9, 15)), 0);
    }
}
