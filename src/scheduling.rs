//! Calendar arithmetic for designer bookings.
//!
//! All intervals are half-open: `[start, end)`. Two bookings that merely touch
//! (one ends exactly when the other starts) do not overlap.

use crate::{
    backend::AppointmentBackend,
    error::BackendError,
    types::{end_of, BookedSlot, MAX_DURATION_MINUTES},
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, duration_minutes: u32) -> Result<Self, BackendError> {
        Ok(Self {
            start,
            end: end_of(start, duration_minutes)?,
        })
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Range of start times an existing booking must fall into to possibly
    /// overlap this interval.
    pub fn search_window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), BackendError> {
        let range_start = self
            .start
            .checked_sub_signed(Duration::minutes(i64::from(MAX_DURATION_MINUTES)))
            .ok_or(BackendError::OutOfRange(self.start))?;
        Ok((range_start, self.end))
    }
}

impl From<BookedSlot> for TimeInterval {
    /// Ends past the last representable instant clamp to it.
    fn from(slot: BookedSlot) -> Self {
        TimeInterval {
            start: slot.start,
            end: end_of(slot.start, slot.duration).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

pub fn conflicts_with_any(booked: &[BookedSlot], candidate: &TimeInterval) -> bool {
    booked
        .iter()
        .any(|slot| TimeInterval::from(*slot).overlaps(candidate))
}

/// Whether a booking of `duration_minutes` at `start` would overlap any active
/// appointment of `designer`. Read-only.
pub fn has_conflict<T: AppointmentBackend>(
    backend: &T,
    designer: Uuid,
    start: DateTime<Utc>,
    duration_minutes: u32,
) -> Result<bool, BackendError> {
    let candidate = TimeInterval::new(start, duration_minutes)?;
    let (range_start, range_end) = candidate.search_window()?;
    let booked = backend.active_in_range(designer, range_start, range_end)?;
    Ok(conflicts_with_any(&booked, &candidate))
}

/// Daily window in which designers take appointments, split into equal slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            slot_minutes: 60,
        }
    }
}

impl WorkingHours {
    /// Candidate slots of `date` in ascending order. Local times that don't
    /// exist in `tz` (DST gaps) are skipped.
    pub fn candidate_slots<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Vec<TimeInterval> {
        if self.slot_minutes == 0 {
            return vec![];
        }

        let day_end = self.end_hour * 60;
        let mut slots = vec![];
        let mut minute = self.start_hour * 60;
        while minute + self.slot_minutes <= day_end {
            if let Some(slot) = local_instant(date, minute, tz)
                .and_then(|start| TimeInterval::new(start, self.slot_minutes).ok())
            {
                slots.push(slot);
            }
            minute += self.slot_minutes;
        }
        slots
    }
}

fn local_instant<Tz: TimeZone>(date: NaiveDate, minute_of_day: u32, tz: &Tz) -> Option<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::minutes(i64::from(minute_of_day)))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|datetime| datetime.with_timezone(&Utc))
}

/// Midnight-to-midnight range of `date` in `tz`.
pub fn day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_instant(date, 0, tz)?;
    let end = local_instant(date.succ_opt()?, 0, tz)?;
    Some((start, end))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub date: NaiveDate,
    pub available_slots: Vec<DateTime<Utc>>,
    pub booked_slots: Vec<BookedSlot>,
}

/// Starts of the candidate slots that overlap no booking and lie strictly after `now`.
pub fn free_slots(
    candidates: &[TimeInterval],
    booked: &[BookedSlot],
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    candidates
        .iter()
        .filter(|slot| slot.start > now && !conflicts_with_any(booked, slot))
        .map(|slot| slot.start)
        .collect()
}

pub fn list_available_slots<T: AppointmentBackend, Tz: TimeZone>(
    backend: &T,
    designer: Uuid,
    date: NaiveDate,
    hours: &WorkingHours,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Result<Availability, BackendError> {
    let candidates = hours.candidate_slots(date, tz);
    let Some((day_start, day_end)) = day_bounds(date, tz) else {
        return Ok(Availability {
            date,
            available_slots: vec![],
            booked_slots: vec![],
        });
    };

    let window_start = candidates
        .first()
        .map_or(day_start, |slot| slot.start.min(day_start));
    let window_end = candidates
        .last()
        .map_or(day_end, |slot| slot.end.max(day_end));
    let (range_start, range_end) = TimeInterval {
        start: window_start,
        end: window_end,
    }
    .search_window()?;

    let booked = backend.active_in_range(designer, range_start, range_end)?;
    let available_slots = free_slots(&candidates, &booked, now);
    let booked_slots = booked
        .into_iter()
        .filter(|slot| slot.start >= day_start && slot.start < day_end)
        .collect();

    Ok(Availability {
        date,
        available_slots,
        booked_slots,
    })
}
