//! Daily timer for the holiday check.
//!
//! The orchestrator arms or cancels the timer through [`WatchSchedule`]; the
//! runtime's timer task follows the watch channel and sleeps until the next
//! occurrence of the armed local time.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, TimeZone};
use tokio::sync::watch;

use holidays_sync::DailySchedule;

/// `DailySchedule` backed by a `watch` channel holding the armed time.
#[derive(Debug)]
pub struct WatchSchedule {
    tx: watch::Sender<Option<NaiveTime>>,
}

impl WatchSchedule {
    pub fn new() -> (Self, watch::Receiver<Option<NaiveTime>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    pub fn armed(&self) -> Option<NaiveTime> {
        *self.tx.borrow()
    }
}

impl DailySchedule for WatchSchedule {
    fn arm(&self, at: NaiveTime) {
        self.tx.send_if_modified(|current| {
            let changed = *current != Some(at);
            *current = Some(at);
            changed
        });
    }

    fn cancel(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }
}

/// Time from `now` until the next wall-clock `at` in `now`'s time zone,
/// strictly after `now`.
///
/// Days around a DST change are 23 or 25 hours long, so each candidate is
/// resolved in the zone rather than by adding 24 hours. An ambiguous `at`
/// fires at its first occurrence; one skipped by a forward jump fires as if
/// the old offset still applied.
pub fn delay_until_next<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Duration {
    let tz = now.timezone();
    let today = now.date_naive();
    (0..=2)
        .filter_map(|days| today.checked_add_days(Days::new(days)))
        .filter_map(|date| resolve_local(&tz, date.and_time(at)))
        .find(|candidate| candidate > now)
        .and_then(|next| next.signed_duration_since(now.clone()).to_std().ok())
        .unwrap_or_default()
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local).earliest().or_else(|| {
        tz.from_local_datetime(&(local + chrono::Duration::hours(1)))
            .earliest()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult, NaiveDate, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 7, 4)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
        )
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    /// Central European time for 2024: UTC+1, UTC+2 from 31 March 01:00 UTC
    /// until 27 October 01:00 UTC.
    #[derive(Debug, Clone, Copy)]
    struct Cet2024;

    fn winter() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn summer() -> FixedOffset {
        FixedOffset::east_opt(7200).unwrap()
    }

    fn naive(month: u32, day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    impl TimeZone for Cet2024 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            Cet2024
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let as_winter = self.offset_from_utc_datetime(&(*local - chrono::Duration::hours(1)));
            let as_summer = self.offset_from_utc_datetime(&(*local - chrono::Duration::hours(2)));
            match (as_winter == winter(), as_summer == summer()) {
                (true, true) => LocalResult::Ambiguous(summer(), winter()),
                (true, false) => LocalResult::Single(winter()),
                (false, true) => LocalResult::Single(summer()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc >= naive(3, 31, 1, 0) && *utc < naive(10, 27, 1, 0) {
                summer()
            } else {
                winter()
            }
        }
    }

    fn cet(month: u32, day: u32, h: u32, m: u32) -> DateTime<Cet2024> {
        Cet2024
            .from_local_datetime(&naive(month, day, h, m))
            .single()
            .unwrap()
    }

    #[test]
    fn later_today() {
        assert_eq!(delay_until_next(&at(8, 59, 0), nine()), Duration::from_secs(60));
    }

    #[test]
    fn exactly_now_rolls_to_tomorrow() {
        assert_eq!(
            delay_until_next(&at(9, 0, 0), nine()),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn already_passed_rolls_to_tomorrow() {
        assert_eq!(
            delay_until_next(&at(10, 0, 0), nine()),
            Duration::from_secs(23 * 60 * 60)
        );
    }

    #[test]
    fn spring_forward_day_is_one_hour_shorter() {
        let midnight = cet(3, 31, 0, 0);
        assert_eq!(
            delay_until_next(&midnight, nine()),
            Duration::from_secs(8 * 60 * 60)
        );

        let eve = cet(3, 30, 9, 0);
        assert_eq!(
            delay_until_next(&eve, nine()),
            Duration::from_secs(23 * 60 * 60)
        );
    }

    #[test]
    fn time_skipped_by_spring_forward_still_fires() {
        let midnight = cet(3, 31, 0, 0);
        let half_past_two = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        assert_eq!(
            delay_until_next(&midnight, half_past_two),
            Duration::from_secs(2 * 60 * 60 + 30 * 60)
        );
    }

    #[test]
    fn fall_back_day_is_one_hour_longer() {
        let eve = cet(10, 26, 9, 0);
        assert_eq!(
            delay_until_next(&eve, nine()),
            Duration::from_secs(25 * 60 * 60)
        );

        let midnight = cet(10, 27, 0, 0);
        let half_past_two = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        assert_eq!(
            delay_until_next(&midnight, half_past_two),
            Duration::from_secs(2 * 60 * 60 + 30 * 60),
            "repeated hour fires on its first occurrence"
        );
    }

    #[test]
    fn arm_and_cancel_publish_changes() {
        let (schedule, mut rx) = WatchSchedule::new();
        assert_eq!(*rx.borrow(), None);

        schedule.arm(nine());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(nine()));

        schedule.arm(nine());
        assert!(!rx.has_changed().unwrap(), "re-arming the same time is silent");

        schedule.cancel();
        assert_eq!(*rx.borrow_and_update(), None);
        assert_eq!(schedule.armed(), None);
    }
}
