// Wall-clock scheduling for composition posts.
//
// A schedule stores its next fire instant in UTC. Each loop wake compares it
// with `now`; occurrences missed by more than the grace window are skipped
// rather than posted late.

use super::comp_models::CompositionSchedule;
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// How late a wake may be and still post the occurrence it missed.
pub const GRACE_WINDOW_MINUTES: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// Nothing to do yet (or inactive / flagged for attention).
    Idle,
    /// The occurrence is due and within the grace window.
    Due(DateTime<Utc>),
    /// The occurrence passed while the bot was not looking; skip it.
    Missed(DateTime<Utc>),
    /// Reported by the tick after a successful post.
    Posted(DateTime<Utc>),
}

pub fn evaluate(schedule: &CompositionSchedule, now: DateTime<Utc>) -> ScheduleState {
    if !schedule.active || schedule.attention.is_some() {
        return ScheduleState::Idle;
    }
    let Some(next) = schedule.next_fire_at else {
        return ScheduleState::Idle;
    };
    if now < next {
        return ScheduleState::Idle;
    }
    if schedule.last_fired_at.is_some_and(|last| last >= next) {
        return ScheduleState::Idle;
    }
    if now - next <= Duration::minutes(GRACE_WINDOW_MINUTES) {
        ScheduleState::Due(next)
    } else {
        ScheduleState::Missed(next)
    }
}

/// The first occurrence strictly after `after`. Empty `days` means any day.
///
/// A local time inside a DST gap moves forward one hour; an ambiguous local
/// time resolves to the earlier instant.
pub fn next_occurrence(
    days: &[Weekday],
    time_of_day: NaiveTime,
    tz: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let start = after.with_timezone(&tz).date_naive();
    // Eight days covers a full week plus the remainder of today.
    (0..=8)
        .filter_map(|offset| start.checked_add_signed(Duration::days(offset)))
        .filter(|date| days.is_empty() || days.contains(&date.weekday()))
        .filter_map(|date| localize(tz, date, time_of_day))
        .find(|candidate| *candidate > after)
}

fn localize(tz: Tz, date: NaiveDate, time_of_day: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time_of_day);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Comma or whitespace separated day names (`Friday`, `fri`), or one of
/// `daily`, `weekdays`, `weekends`. Result is Monday-first without duplicates.
pub fn parse_days(raw: &str) -> Result<Vec<Weekday>, String> {
    let mut days: Vec<Weekday> = Vec::new();
    for token in raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        let lowered = token.to_lowercase();
        let expanded: Vec<Weekday> = match lowered.as_str() {
            "daily" | "everyday" | "all" => ALL_DAYS.to_vec(),
            "weekdays" => ALL_DAYS[..5].to_vec(),
            "weekends" => ALL_DAYS[5..].to_vec(),
            other => vec![parse_day(other).ok_or_else(|| {
                format!("Unrecognised day '{token}'. Try values like Monday, Tue, Friday.")
            })?],
        };
        days.extend(expanded);
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    Ok(days)
}

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn parse_day(lowered: &str) -> Option<Weekday> {
    ALL_DAYS.iter().copied().find(|day| {
        let name = super::comp_models::weekday_name(*day).to_lowercase();
        name == lowered || &name[..3] == lowered
    })
}

/// 24-hour `HH:MM`, or 12-hour `H:MMam`/`H:MM pm`.
pub fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    NaiveTime::parse_from_str(&compact, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&compact, "%I:%M%p"))
        .map_err(|_| "Time must look like 20:00 or 8:00pm.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comps::comp_models::RosterDefinition;
    use chrono_tz::America::Los_Angeles;

    fn la(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Los_Angeles
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn friday_schedule(next: Option<DateTime<Utc>>) -> CompositionSchedule {
        CompositionSchedule {
            id: 1,
            name: "Raid".into(),
            guild_id: 1,
            channel_id: 2,
            days: vec![Weekday::Fri],
            time_of_day: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            timezone: "America/Los_Angeles".into(),
            repeat: true,
            active: true,
            roster: RosterDefinition::default(),
            overview: None,
            active_preset: None,
            next_fire_at: next,
            last_fired_at: None,
            attention: None,
        }
    }

    #[test]
    fn next_friday_in_los_angeles() {
        let time = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        // Wednesday 2024-05-01 noon PT.
        let next = next_occurrence(&[Weekday::Fri], time, Los_Angeles, la(2024, 5, 1, 12, 0));
        assert_eq!(next, Some(la(2024, 5, 3, 20, 0)));

        // Exactly at the occurrence the next one is a week later.
        let following = next_occurrence(&[Weekday::Fri], time, Los_Angeles, la(2024, 5, 3, 20, 0));
        assert_eq!(following, Some(la(2024, 5, 10, 20, 0)));
    }

    #[test]
    fn picks_nearest_of_several_days() {
        let time = NaiveTime::from_hms_opt(19, 30, 0).unwrap();
        let days = parse_days("tue, fri").unwrap();
        // Friday 2024-05-03 21:00 PT: Friday's slot is gone, Tuesday is next.
        let next = next_occurrence(&days, time, Los_Angeles, la(2024, 5, 3, 21, 0));
        assert_eq!(next, Some(la(2024, 5, 7, 19, 30)));
    }

    #[test]
    fn empty_days_means_next_time_of_day() {
        let time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let next = next_occurrence(&[], time, Los_Angeles, la(2024, 5, 3, 9, 0));
        assert_eq!(next, Some(la(2024, 5, 4, 8, 0)));
    }

    #[test]
    fn dst_gap_shifts_forward_an_hour() {
        // 2024-03-10 02:30 does not exist in Los Angeles.
        let time = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let after = la(2024, 3, 9, 12, 0);
        let next = next_occurrence(&[Weekday::Sun], time, Los_Angeles, after).unwrap();
        assert_eq!(next, la(2024, 3, 10, 3, 30));
    }

    #[test]
    fn ambiguous_time_uses_earlier_instant() {
        // 2024-11-03 01:30 happens twice in Los Angeles; PDT (UTC-7) first.
        let time = NaiveTime::from_hms_opt(1, 30, 0).unwrap();
        let after = la(2024, 11, 2, 12, 0);
        let next = next_occurrence(&[Weekday::Sun], time, Los_Angeles, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 11, 3, 8, 30, 0).unwrap());
    }

    #[test]
    fn evaluate_walks_idle_due_missed() {
        let fire = la(2024, 5, 3, 20, 0);
        let schedule = friday_schedule(Some(fire));

        assert_eq!(evaluate(&schedule, la(2024, 5, 3, 19, 59)), ScheduleState::Idle);
        assert_eq!(evaluate(&schedule, fire), ScheduleState::Due(fire));
        assert_eq!(evaluate(&schedule, la(2024, 5, 3, 20, 2)), ScheduleState::Due(fire));
        assert_eq!(evaluate(&schedule, la(2024, 5, 3, 20, 3)), ScheduleState::Missed(fire));
    }

    #[test]
    fn flagged_or_inactive_schedules_stay_idle() {
        let fire = la(2024, 5, 3, 20, 0);
        let mut schedule = friday_schedule(Some(fire));
        schedule.attention = Some("channel gone".into());
        assert_eq!(evaluate(&schedule, fire), ScheduleState::Idle);

        schedule.attention = None;
        schedule.active = false;
        assert_eq!(evaluate(&schedule, fire), ScheduleState::Idle);
    }

    #[test]
    fn parses_day_lists() {
        assert_eq!(
            parse_days("Friday, mon mon").unwrap(),
            vec![Weekday::Mon, Weekday::Fri]
        );
        assert_eq!(parse_days("weekends").unwrap(), vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(parse_days("daily").unwrap().len(), 7);
        assert!(parse_days("").unwrap().is_empty());
        assert!(parse_days("funday").is_err());
    }

    #[test]
    fn parses_times() {
        assert_eq!(parse_time(" 19:30 ").unwrap(), NaiveTime::from_hms_opt(19, 30, 0).unwrap());
        assert_eq!(parse_time("8:30pm").unwrap(), NaiveTime::from_hms_opt(20, 30, 0).unwrap());
        assert_eq!(parse_time("8:30 PM").unwrap(), NaiveTime::from_hms_opt(20, 30, 0).unwrap());
        assert_eq!(parse_time("12:15am").unwrap(), NaiveTime::from_hms_opt(0, 15, 0).unwrap());
        assert!(parse_time("13:00pm").is_err());
        assert!(parse_time("7pm").is_err());
        assert!(parse_time("25:00").is_err());
    }
}
