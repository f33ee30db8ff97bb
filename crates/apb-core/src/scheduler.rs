//! Publish-slot scheduler.
//!
//! Every article is published at the same local time of day. A slot is a
//! calendar date in the configured zone; at most one article may claim a date.
//! The scheduler itself holds only configuration: the set of claimed dates is
//! owned by the caller (one batch) and passed in explicitly.

use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

/// Default bound on the forward scan for a free date.
pub const DEFAULT_HORIZON_DAYS: u32 = 366;

/// Dates already claimed by articles of the current batch (or found scheduled
/// on the publishing service).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssignedDates {
    dates: BTreeSet<NaiveDate>,
}

impl AssignedDates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.dates.contains(date)
    }

    /// Returns `false` if the date was already claimed.
    pub fn insert(&mut self, date: NaiveDate) -> bool {
        self.dates.insert(date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.iter()
    }
}

impl FromIterator<NaiveDate> for AssignedDates {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self {
            dates: iter.into_iter().collect(),
        }
    }
}

/// A claimed publish moment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledSlot {
    pub date: NaiveDate,
    pub publish_at: DateTime<Tz>,
}

impl ScheduledSlot {
    pub fn publish_at_utc(&self) -> DateTime<Utc> {
        self.publish_at.with_timezone(&Utc)
    }

    /// Human form used in chat replies, e.g. `Tuesday 20 October 2026 at 06:03 BST`.
    pub fn display(&self) -> String {
        self.publish_at
            .format("%A %-d %B %Y at %H:%M %Z")
            .to_string()
    }
}

#[derive(Clone, Debug)]
pub struct SlotScheduler {
    tz: Tz,
    publish_time: NaiveTime,
    horizon_days: u32,
}

impl SlotScheduler {
    pub fn new(tz: Tz, publish_time: NaiveTime) -> Self {
        Self {
            tz,
            publish_time,
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }

    pub fn with_horizon(mut self, horizon_days: u32) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn publish_time(&self) -> NaiveTime {
        self.publish_time
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    /// The publish instant on `date`, if that local time exists.
    ///
    /// A repeated local time (DST fold) resolves to the earlier instant; a
    /// skipped one (DST gap) yields `None`.
    pub fn instant_on(&self, date: NaiveDate) -> Option<DateTime<Tz>> {
        self.tz
            .from_local_datetime(&date.and_time(self.publish_time))
            .earliest()
    }

    /// Compute the next free slot without claiming it.
    pub fn preview(&self, now: DateTime<Utc>, assigned: &AssignedDates) -> Result<ScheduledSlot> {
        let today = now.with_timezone(&self.tz).date_naive();

        for offset in 0..self.horizon_days {
            let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
                break;
            };
            if assigned.contains(&date) {
                continue;
            }
            let Some(publish_at) = self.instant_on(date) else {
                tracing::debug!(%date, "publish time does not exist on this date, skipping");
                continue;
            };
            if publish_at.with_timezone(&Utc) <= now {
                continue;
            }
            return Ok(ScheduledSlot { date, publish_at });
        }

        Err(Error::SlotsExhausted {
            horizon_days: self.horizon_days,
        })
    }

    /// Claim the earliest free slot: the returned date is in `assigned` afterwards.
    pub fn next_slot(
        &self,
        now: DateTime<Utc>,
        assigned: &mut AssignedDates,
    ) -> Result<ScheduledSlot> {
        let slot = self.preview(now, assigned)?;
        assigned.insert(slot.date);
        Ok(slot)
    }

    /// Mark the local dates of already-scheduled instants as taken.
    ///
    /// Returns how many dates were newly claimed.
    pub fn claim_instants<I>(&self, assigned: &mut AssignedDates, instants: I) -> usize
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        instants
            .into_iter()
            .map(|at| at.with_timezone(&self.tz).date_naive())
            .filter(|date| assigned.insert(*date))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::London;

    fn at_0603() -> NaiveTime {
        NaiveTime::from_hms_opt(6, 3, 0).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn today_is_used_when_publish_time_is_still_ahead() {
        let sched = SlotScheduler::new(London, at_0603());
        let mut assigned = AssignedDates::new();
        // 05:00 UTC is 06:00 BST.
        let slot = sched
            .next_slot(utc(2026, 10, 19, 5, 0), &mut assigned)
            .unwrap();

        assert_eq!(slot.date, date(2026, 10, 19));
        assert_eq!(slot.publish_at_utc(), utc(2026, 10, 19, 5, 3));
        assert!(assigned.contains(&date(2026, 10, 19)));
    }

    #[test]
    fn passed_publish_time_moves_to_tomorrow() {
        let sched = SlotScheduler::new(London, at_0603());
        let mut assigned = AssignedDates::new();
        let slot = sched
            .next_slot(utc(2026, 10, 19, 6, 0), &mut assigned)
            .unwrap();
        assert_eq!(slot.date, date(2026, 10, 20));
    }

    #[test]
    fn exact_publish_instant_counts_as_passed() {
        let sched = SlotScheduler::new(London, at_0603());
        let slot = sched
            .preview(utc(2026, 10, 19, 5, 3), &AssignedDates::new())
            .unwrap();
        assert_eq!(slot.date, date(2026, 10, 20));
    }

    #[test]
    fn skips_today_and_tomorrow_when_both_claimed() {
        let sched = SlotScheduler::new(London, at_0603());
        let mut assigned: AssignedDates = [date(2026, 10, 19), date(2026, 10, 20)]
            .into_iter()
            .collect();
        let slot = sched
            .next_slot(utc(2026, 10, 19, 1, 0), &mut assigned)
            .unwrap();
        assert_eq!(slot.date, date(2026, 10, 21));
        assert_eq!(assigned.len(), 3);
    }

    #[test]
    fn sequential_requests_yield_distinct_ascending_dates() {
        let sched = SlotScheduler::new(London, at_0603());
        let mut assigned = AssignedDates::new();
        let now = utc(2026, 10, 19, 12, 0);
        let today = date(2026, 10, 19);

        let dates: Vec<NaiveDate> = (0..10)
            .map(|_| sched.next_slot(now, &mut assigned).unwrap().date)
            .collect();

        assert!(dates.iter().all(|d| *d >= today));
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(assigned.len(), 10);
    }

    #[test]
    fn preview_does_not_claim() {
        let sched = SlotScheduler::new(London, at_0603());
        let assigned = AssignedDates::new();
        let now = utc(2026, 10, 19, 12, 0);
        let a = sched.preview(now, &assigned).unwrap();
        let b = sched.preview(now, &assigned).unwrap();
        assert_eq!(a, b);
        assert!(assigned.is_empty());
    }

    #[test]
    fn local_date_follows_the_configured_zone() {
        // 23:30 UTC on the 19th is already the 20th in Auckland.
        let sched = SlotScheduler::new(chrono_tz::Pacific::Auckland, at_0603());
        let slot = sched
            .preview(utc(2026, 10, 19, 23, 30), &AssignedDates::new())
            .unwrap();
        assert_eq!(slot.date, date(2026, 10, 21));
    }

    #[test]
    fn skips_dates_where_publish_time_falls_in_dst_gap() {
        // Clocks jump 01:00 -> 02:00 on 29 March 2026 in London.
        let sched = SlotScheduler::new(London, NaiveTime::from_hms_opt(1, 30, 0).unwrap());
        let slot = sched
            .preview(utc(2026, 3, 28, 12, 0), &AssignedDates::new())
            .unwrap();
        assert_eq!(slot.date, date(2026, 3, 30));
    }

    #[test]
    fn ambiguous_local_time_uses_earliest_instant() {
        // 01:30 happens twice on 25 October 2026 in London.
        let sched = SlotScheduler::new(London, NaiveTime::from_hms_opt(1, 30, 0).unwrap());
        let at = sched.instant_on(date(2026, 10, 25)).unwrap();
        assert_eq!(at.with_timezone(&Utc), utc(2026, 10, 25, 0, 30));
        assert_eq!(at.hour(), 1);
    }

    #[test]
    fn bounded_scan_reports_exhaustion() {
        let sched = SlotScheduler::new(London, at_0603()).with_horizon(3);
        let mut assigned: AssignedDates = (19..=21).map(|d| date(2026, 10, d)).collect();
        let err = sched
            .next_slot(utc(2026, 10, 19, 1, 0), &mut assigned)
            .unwrap_err();
        assert!(matches!(err, Error::SlotsExhausted { horizon_days: 3 }));
        assert_eq!(assigned.len(), 3);
    }

    #[test]
    fn claim_instants_converts_to_local_dates() {
        let sched = SlotScheduler::new(London, at_0603());
        let mut assigned = AssignedDates::new();
        let claimed = sched.claim_instants(
            &mut assigned,
            [
                utc(2026, 10, 20, 5, 3),
                // 23:30 UTC in winter is still the same London date.
                utc(2026, 12, 1, 23, 30),
                utc(2026, 10, 20, 9, 0),
            ],
        );
        assert_eq!(claimed, 2);
        assert!(assigned.contains(&date(2026, 10, 20)));
        assert!(assigned.contains(&date(2026, 12, 1)));

        let slot = sched
            .next_slot(utc(2026, 10, 19, 12, 0), &mut assigned)
            .unwrap();
        assert_eq!(slot.date, date(2026, 10, 21));
    }

    #[test]
    fn display_names_the_zone_abbreviation() {
        let sched = SlotScheduler::new(London, at_0603());
        let slot = sched
            .preview(utc(2026, 10, 19, 12, 0), &AssignedDates::new())
            .unwrap();
        assert_eq!(slot.display(), "Tuesday 20 October 2026 at 06:03 BST");
    }
}
