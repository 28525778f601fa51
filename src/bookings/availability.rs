// Availability engine
//
// Decides whether a candidate appointment can occupy a block of time on the
// shared daily schedule. All interval math is done in minutes since midnight
// over half-open windows, so a partial overlap is caught even when it does
// not align to the 30-minute display grid.

use chrono::{NaiveTime, Timelike};

/// Fixed post-service commute allowance added to existing bookings
pub const BUFFER_MINUTES: i32 = 30;

/// Step used only for occupied-slot enumeration (UI display)
pub const SLOT_STEP_MINUTES: i32 = 30;

/// Half-open window `[start, end)` in minutes since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i32,
    pub end: i32,
}

impl TimeWindow {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: minutes_of(start),
            end: minutes_of(end),
        }
    }

    /// Half-open overlap test: `a.start < b.end && b.start < a.end`
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Window extended by the commute buffer. Applied to the *existing*
    /// booking only, never to the candidate, so buffers do not compound.
    pub fn buffered(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end + BUFFER_MINUTES,
        }
    }

    /// "HH:MM-HH:MM" rendering for conflict messages
    pub fn format(&self) -> String {
        format!(
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            (self.end / 60).min(23),
            if self.end / 60 > 23 { 59 } else { self.end % 60 },
        )
    }
}

fn minutes_of(t: NaiveTime) -> i32 {
    (t.hour() * 60 + t.minute()) as i32
}

/// Outcome of a slot availability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotCheck {
    Free,
    /// The buffered window of the existing booking that the candidate hits
    Conflict { window: TimeWindow },
}

impl SlotCheck {
    pub fn is_free(&self) -> bool {
        matches!(self, SlotCheck::Free)
    }
}

/// Check whether a candidate `[start, start + duration)` interval conflicts
/// with any existing booking's buffered window on the same date.
///
/// `existing` holds the raw (unbuffered) `[start, end)` windows of every
/// non-cancelled booking on the candidate's date; the buffer is applied
/// here, to the existing side only. Returns the first conflicting buffered
/// window so the caller can name it in the rejection.
pub fn check_availability(
    start: NaiveTime,
    duration_minutes: i32,
    existing: &[TimeWindow],
) -> SlotCheck {
    let start_min = minutes_of(start);
    let candidate = TimeWindow::new(start_min, start_min + duration_minutes);

    for window in existing {
        let blocked = window.buffered();
        if candidate.overlaps(&blocked) {
            return SlotCheck::Conflict { window: blocked };
        }
    }

    SlotCheck::Free
}

/// Enumerate the occupied 30-minute grid slots for a date, as "HH:MM"
/// strings. Display only — the authoritative check is `check_availability`,
/// which is continuous-time.
pub fn occupied_slots(existing: &[TimeWindow]) -> Vec<String> {
    let mut slots = Vec::new();

    for window in existing {
        let blocked = window.buffered();
        let mut slot = (blocked.start / SLOT_STEP_MINUTES) * SLOT_STEP_MINUTES;
        while slot < blocked.end {
            let grid = TimeWindow::new(slot, slot + SLOT_STEP_MINUTES);
            if grid.overlaps(&blocked) && slot < 24 * 60 {
                let label = format!("{:02}:{:02}", slot / 60, slot % 60);
                if !slots.contains(&label) {
                    slots.push(label);
                }
            }
            slot += SLOT_STEP_MINUTES;
        }
    }

    slots.sort();
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // A 60-minute service at 10:00 with a 30-minute buffer blocks
    // [10:00, 11:30).
    fn existing_ten_to_eleven() -> Vec<TimeWindow> {
        vec![TimeWindow::from_times(t(10, 0), t(11, 0))]
    }

    #[test]
    fn test_candidate_inside_buffer_is_rejected() {
        let check = check_availability(t(11, 15), 60, &existing_ten_to_eleven());
        assert_eq!(
            check,
            SlotCheck::Conflict {
                window: TimeWindow::new(10 * 60, 11 * 60 + 30)
            }
        );
    }

    #[test]
    fn test_candidate_at_buffer_end_is_accepted() {
        // [11:30, 12:30) against buffered [10:00, 11:30) — half-open, no touch
        let check = check_availability(t(11, 30), 60, &existing_ten_to_eleven());
        assert!(check.is_free());
    }

    #[test]
    fn test_candidate_ending_at_existing_start_is_accepted() {
        let check = check_availability(t(9, 0), 60, &existing_ten_to_eleven());
        assert!(check.is_free());
    }

    #[test]
    fn test_candidate_overlapping_start_is_rejected() {
        let check = check_availability(t(9, 30), 60, &existing_ten_to_eleven());
        assert!(!check.is_free());
    }

    #[test]
    fn test_off_grid_partial_overlap_is_rejected() {
        // 11:25 is not on the 30-minute grid but still inside [10:00, 11:30)
        let check = check_availability(t(11, 25), 45, &existing_ten_to_eleven());
        assert!(!check.is_free());
    }

    #[test]
    fn test_buffer_not_applied_to_candidate() {
        // Candidate [8:30, 9:30) ends 30 min before existing 10:00 start.
        // Only the existing side carries a buffer, so this is free.
        let check = check_availability(t(8, 30), 60, &existing_ten_to_eleven());
        assert!(check.is_free());
    }

    #[test]
    fn test_empty_schedule_is_free() {
        assert!(check_availability(t(8, 0), 240, &[]).is_free());
    }

    #[test]
    fn test_conflict_names_the_buffered_window() {
        match check_availability(t(10, 30), 30, &existing_ten_to_eleven()) {
            SlotCheck::Conflict { window } => assert_eq!(window.format(), "10:00-11:30"),
            SlotCheck::Free => panic!("expected a conflict"),
        }
    }

    #[test]
    fn test_occupied_slots_cover_buffered_window() {
        let slots = occupied_slots(&existing_ten_to_eleven());
        assert_eq!(slots, vec!["10:00", "10:30", "11:00"]);
    }

    #[test]
    fn test_occupied_slots_merge_duplicates() {
        let slots = occupied_slots(&[
            TimeWindow::from_times(t(10, 0), t(11, 0)),
            TimeWindow::from_times(t(10, 30), t(11, 30)),
        ]);
        assert_eq!(slots, vec!["10:00", "10:30", "11:00", "11:30"]);
    }

    #[test]
    fn test_occupied_slots_off_grid_start() {
        // [10:15, 10:45) buffered to [10:15, 11:15) touches the 10:00,
        // 10:30 and 11:00 grid slots
        let slots = occupied_slots(&[TimeWindow::from_times(t(10, 15), t(10, 45))]);
        assert_eq!(slots, vec!["10:00", "10:30", "11:00"]);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn window_strategy() -> impl Strategy<Value = TimeWindow> {
        // Start on an arbitrary minute inside the working day, 15-240 min long
        (480i32..1080, 15i32..240).prop_map(|(start, len)| TimeWindow::new(start, start + len))
    }

    proptest! {
        /// Overlap is symmetric
        #[test]
        fn prop_overlap_symmetric(a in window_strategy(), b in window_strategy()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        /// A window always overlaps itself
        #[test]
        fn prop_window_overlaps_itself(a in window_strategy()) {
            prop_assert!(a.overlaps(&a));
        }

        /// Adjacent half-open windows never overlap
        #[test]
        fn prop_adjacent_windows_disjoint(a in window_strategy(), len in 15i32..240) {
            let next = TimeWindow::new(a.end, a.end + len);
            prop_assert!(!a.overlaps(&next));
        }

        /// Any candidate accepted by check_availability is disjoint from
        /// every buffered existing window (the double-booking invariant)
        #[test]
        fn prop_accepted_candidate_is_disjoint(
            existing in prop::collection::vec(window_strategy(), 0..8),
            start in 480i32..1080,
            duration in 15i32..240,
        ) {
            let start_time = NaiveTime::from_num_seconds_from_midnight_opt(start as u32 * 60, 0).unwrap();
            if check_availability(start_time, duration, &existing).is_free() {
                let candidate = TimeWindow::new(start, start + duration);
                for w in &existing {
                    prop_assert!(!candidate.overlaps(&w.buffered()));
                }
            }
        }
    }
}
