//! Slot and session-shape calculations.
//!
//! Pure functions - no database access. Dates and "HH:00" slots are academy
//! local time, expressed through a fixed UTC offset.

use std::collections::{HashMap, HashSet};

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attendance::calculators::PlanBalance;

/// First bookable hour (06:00)
pub const FIRST_SLOT_HOUR: u32 = 6;
/// Last bookable hour (22:00)
pub const LAST_SLOT_HOUR: u32 = 22;
pub const MIN_PARTICIPANTS: usize = 1;
pub const MAX_PARTICIPANTS: usize = 4;

/// Session type, derived from the participant count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    Individual,
    Grupal,
}

impl ClassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassType::Individual => "individual",
            ClassType::Grupal => "grupal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "individual" => Some(ClassType::Individual),
            "grupal" => Some(ClassType::Grupal),
            _ => None,
        }
    }
}

/// Capacity and type of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassShape {
    pub capacity: i32,
    pub class_type: ClassType,
}

/// Derive capacity/type from the participant count.
///
/// Returns `None` outside 1..=4 participants.
pub fn derive_class_shape(participant_count: usize) -> Option<ClassShape> {
    if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&participant_count) {
        return None;
    }

    let class_type = if participant_count == 1 {
        ClassType::Individual
    } else {
        ClassType::Grupal
    };

    Some(ClassShape {
        capacity: participant_count as i32,
        class_type,
    })
}

/// Format an hour as a slot label ("07:00")
pub fn format_slot(hour: u32) -> String {
    format!("{:02}:00", hour)
}

/// All candidate slots, 06:00 through 22:00
pub fn candidate_slots() -> Vec<String> {
    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR).map(format_slot).collect()
}

/// Parse a "HH:00" slot label into its hour, if it is a candidate slot
pub fn parse_slot(label: &str) -> Option<u32> {
    let (hh, mm) = label.trim().split_once(':')?;
    if hh.len() != 2 || mm != "00" {
        return None;
    }
    let hour: u32 = hh.parse().ok()?;
    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .contains(&hour)
        .then_some(hour)
}

/// Absolute start instant of a local date + hour
pub fn compose_start(date: NaiveDate, hour: u32, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// UTC bounds `[start, end)` of a local calendar day
pub fn local_day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_time(NaiveTime::MIN);
    let start = offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        // Fixed offsets never produce ambiguous local times
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
    (start, start + Duration::days(1))
}

/// Local hour of an instant
pub fn local_hour(instant: DateTime<Utc>, offset: FixedOffset) -> u32 {
    instant.with_timezone(&offset).hour()
}

/// Local calendar day of an instant
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Free slots for a day, given the start instants of the court's sessions.
///
/// Output is ascending.
pub fn free_slots(occupied: &[DateTime<Utc>], offset: FixedOffset) -> Vec<String> {
    let taken: HashSet<u32> = occupied.iter().map(|d| local_hour(*d, offset)).collect();

    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .filter(|h| !taken.contains(h))
        .map(format_slot)
        .collect()
}

/// Keep the selected slot if still free, otherwise fall back to the first free one
pub fn reconcile_selection(selected: Option<&str>, free: &[String]) -> Option<String> {
    match selected {
        Some(s) if free.iter().any(|f| f == s) => Some(s.to_string()),
        _ => free.first().cloned(),
    }
}

/// True when the list contains the same student twice
pub fn has_duplicates(ids: &[Uuid]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    !ids.iter().all(|id| seen.insert(*id))
}

/// Bookings to add and remove when a session's participants change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantDiff {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl ParticipantDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set difference between the previous and the new participant lists
pub fn diff_participants(previous: &[Uuid], next: &[Uuid]) -> ParticipantDiff {
    let prev: HashSet<&Uuid> = previous.iter().collect();
    let new: HashSet<&Uuid> = next.iter().collect();

    ParticipantDiff {
        added: next.iter().filter(|id| !prev.contains(id)).copied().collect(),
        removed: previous.iter().filter(|id| !new.contains(id)).copied().collect(),
    }
}

/// Days searched for the follow-up sessions of a weekly series
pub const SERIES_SEARCH_DAYS: i64 = 730;

/// Hour booked on each weekday of a series, indexed from Sunday
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeeklyPattern([Option<u32>; 7]);

impl WeeklyPattern {
    /// Assign an hour to a weekday (0 = Sunday). Returns false when the
    /// weekday is out of range or already assigned.
    pub fn set(&mut self, weekday: u32, hour: u32) -> bool {
        match self.0.get_mut(weekday as usize) {
            Some(slot @ None) => {
                *slot = Some(hour);
                true
            }
            _ => false,
        }
    }

    pub fn hour_on(&self, weekday: Weekday) -> Option<u32> {
        self.0[weekday.num_days_from_sunday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Follow-up dates of a series after its first date, with their hour
pub fn series_candidates(
    first: NaiveDate,
    pattern: &WeeklyPattern,
) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
    (1..=SERIES_SEARCH_DAYS).filter_map(move |n| {
        let day = first + Duration::days(n);
        pattern.hour_on(day.weekday()).map(|hour| (day, hour))
    })
}

/// Sessions a series aims for: the largest allowance among its students
pub fn series_length(allowance: &HashMap<Uuid, i64>) -> usize {
    allowance.values().copied().max().unwrap_or(1).max(1) as usize
}

/// Students booked on the `index`-th session of a series (0 = first).
///
/// A student joins while their allowance covers the session.
pub fn occurrence_roster(
    students: &[Uuid],
    allowance: &HashMap<Uuid, i64>,
    index: usize,
) -> Vec<Uuid> {
    students
        .iter()
        .filter(|id| allowance.get(*id).copied().unwrap_or(0) > index as i64)
        .copied()
        .collect()
}

/// Why a student cannot be booked on a new session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingRefusal {
    /// No plan with classes left
    NoPlan,
    /// Every plan is fully consumed
    UsedUp,
    /// Future bookings already match the plan size
    FutureLimit(i64),
}

/// Classes a student can still book.
///
/// The oldest plan with classes left decides: its balance is the allowance,
/// and the student's bookings on sessions not yet started may not reach
/// its size. `plans` must be in purchase order.
pub fn booking_allowance(
    plans: &[PlanBalance],
    future_bookings: i64,
) -> Result<i64, BookingRefusal> {
    if plans.is_empty() {
        return Err(BookingRefusal::NoPlan);
    }

    let plan = plans
        .iter()
        .find(|p| p.has_capacity())
        .ok_or(BookingRefusal::UsedUp)?;

    if future_bookings >= i64::from(plan.remaining_classes) {
        return Err(BookingRefusal::FutureLimit(future_bookings));
    }

    Ok(i64::from(plan.remaining_classes) - plan.used)
}
