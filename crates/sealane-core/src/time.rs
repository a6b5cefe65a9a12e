//! Pacific-time helpers.
//!
//! The source pages print bare clock times in the operator's local zone
//! (America/Vancouver) with no date attached. Everything here combines
//! those with a reference date and converts to UTC for storage.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::AppError;
use crate::records::LaterToken;

/// The operator's local timezone.
pub const PACIFIC: Tz = chrono_tz::America::Vancouver;

/// Parse clock text like "10:00 AM", "9:55am", or "21:05" into a time of day.
pub fn parse_clock(text: &str) -> Result<NaiveTime, AppError> {
    let lower = text.trim().to_ascii_lowercase();

    let (body, meridiem) = if let Some(stripped) = lower.strip_suffix("am") {
        (stripped.trim_end(), Some(false))
    } else if let Some(stripped) = lower.strip_suffix("pm") {
        (stripped.trim_end(), Some(true))
    } else {
        (lower.as_str(), None)
    };

    let bad = || AppError::FieldExtraction(format!("unparseable clock time '{text}'"));

    let (h, m) = body.split_once(':').ok_or_else(bad)?;
    let hour: u32 = h.trim().parse().map_err(|_| bad())?;
    let minute: u32 = m.trim().parse().map_err(|_| bad())?;

    let hour = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return Err(bad());
            }
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, false) => h,
                (h, true) => h + 12,
            }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(bad)
}

/// Combine a local date and time-of-day into a UTC timestamp.
///
/// DST ambiguity resolves to the earlier instant; times in the
/// spring-forward gap shift into the following hour.
pub fn at_local(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match PACIFIC.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            PACIFIC
                .from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// The current local calendar day for a given instant.
pub fn local_day(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&PACIFIC).date_naive()
}

/// Local "HH:MM" rendering, used for sailing_time and event views.
pub fn local_clock(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&PACIFIC).format("%H:%M").to_string()
}

/// Local "YYYY-MM-DD HH:MM:SS" rendering for projections.
pub fn local_stamp(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&PACIFIC)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Local weekday name ("Monday" .. "Sunday").
pub fn weekday_name(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&PACIFIC).format("%A").to_string()
}

/// UTC bounds of the local calendar day containing `now`.
pub fn local_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = local_day(now);
    let start = at_local(day, NaiveTime::MIN);
    let end = at_local(day + Duration::days(1), NaiveTime::MIN);
    (start, end)
}

/// Signed minutes from `scheduled` to `actual`: positive is late, negative early.
pub fn signed_minutes(scheduled: DateTime<Utc>, actual: DateTime<Utc>) -> i64 {
    (actual - scheduled).num_minutes()
}

/// A "last seen" time later than now belongs to the previous local day.
pub fn roll_back_if_future(dt: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if dt > now {
        let local = dt.with_timezone(&PACIFIC);
        at_local(local.date_naive() - Duration::days(1), local.time())
    } else {
        dt
    }
}

/// A later-sailing token resolved to a concrete departure instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaterSailing {
    pub departure: DateTime<Utc>,
    pub cancelled: bool,
}

/// Resolve later-sailing tokens to timestamps, in list order.
///
/// Plain tokens are today; `*`-prefixed tokens are tomorrow. The list must
/// be non-decreasing, so a tomorrow token earlier than the latest resolved
/// timestamp rolls forward to the day after tomorrow.
pub fn resolve_later_sailings(
    tokens: &[LaterToken],
    today: NaiveDate,
) -> Result<Vec<LaterSailing>, AppError> {
    let mut latest: Option<DateTime<Utc>> = None;
    let mut resolved = Vec::with_capacity(tokens.len());

    for token in tokens {
        let time = parse_clock(&token.time)?;
        let date = if token.tomorrow {
            today + Duration::days(1)
        } else {
            today
        };
        let mut departure = at_local(date, time);

        if token.tomorrow && latest.is_some_and(|l| departure < l) {
            departure = at_local(date + Duration::days(1), time);
            tracing::debug!(%departure, "later sailing rolls to the day after tomorrow");
        }

        latest = Some(departure);
        resolved.push(LaterSailing {
            departure,
            cancelled: token.cancelled,
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_clock_formats() {
        assert_eq!(
            parse_clock("10:00 AM").unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_clock("9:55am").unwrap(),
            NaiveTime::from_hms_opt(9, 55, 0).unwrap()
        );
        assert_eq!(
            parse_clock("5:40pm").unwrap(),
            NaiveTime::from_hms_opt(17, 40, 0).unwrap()
        );
        assert_eq!(
            parse_clock("12:00am").unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_clock("12:30 PM").unwrap(),
            NaiveTime::from_hms_opt(12, 30, 0).unwrap()
        );
        assert_eq!(
            parse_clock("21:05").unwrap(),
            NaiveTime::from_hms_opt(21, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_clock_rejects_garbage() {
        assert!(parse_clock("").is_err());
        assert!(parse_clock("...").is_err());
        assert!(parse_clock("13:00pm").is_err());
        assert!(parse_clock("25:99").is_err());
    }

    #[test]
    fn test_signed_minutes_late_and_early() {
        let scheduled = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        let late = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(10, 7, 0).unwrap());
        let early = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(9, 55, 0).unwrap());
        assert_eq!(signed_minutes(scheduled, late), 7);
        assert_eq!(signed_minutes(scheduled, early), -5);
    }

    #[test]
    fn test_roll_back_if_future() {
        let now = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        let seen = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(23, 45, 0).unwrap());
        let rolled = roll_back_if_future(seen, now);
        let local = rolled.with_timezone(&PACIFIC);
        assert_eq!(local.date_naive(), day(2018, 11, 18));
        assert_eq!(local.time(), NaiveTime::from_hms_opt(23, 45, 0).unwrap());

        let past = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(5, 30, 0).unwrap());
        assert_eq!(roll_back_if_future(past, now), past);
    }

    #[test]
    fn test_later_sailings_roll_to_day_after_tomorrow() {
        let tokens: Vec<LaterToken> = ["11:10am", "5:40pm", "9:05pm", "9:55am"]
            .iter()
            .map(|t| LaterToken {
                time: (*t).to_string(),
                tomorrow: true,
                cancelled: false,
            })
            .collect();

        let today = day(2018, 11, 19);
        let resolved = resolve_later_sailings(&tokens, today).unwrap();
        let locals: Vec<_> = resolved
            .iter()
            .map(|s| s.departure.with_timezone(&PACIFIC))
            .collect();

        assert_eq!(locals[0].date_naive(), day(2018, 11, 20));
        assert_eq!(locals[0].time(), NaiveTime::from_hms_opt(11, 10, 0).unwrap());
        assert_eq!(locals[1].date_naive(), day(2018, 11, 20));
        assert_eq!(locals[1].time(), NaiveTime::from_hms_opt(17, 40, 0).unwrap());
        assert_eq!(locals[2].date_naive(), day(2018, 11, 20));
        assert_eq!(locals[2].time(), NaiveTime::from_hms_opt(21, 5, 0).unwrap());
        assert_eq!(locals[3].date_naive(), day(2018, 11, 21));
        assert_eq!(locals[3].time(), NaiveTime::from_hms_opt(9, 55, 0).unwrap());

        // strictly non-decreasing
        for pair in resolved.windows(2) {
            assert!(pair[0].departure <= pair[1].departure);
        }
    }

    #[test]
    fn test_later_sailings_today_and_cancelled() {
        let tokens = vec![
            LaterToken {
                time: "5:00pm".into(),
                tomorrow: false,
                cancelled: false,
            },
            LaterToken {
                time: "7:00pm".into(),
                tomorrow: false,
                cancelled: true,
            },
        ];
        let resolved = resolve_later_sailings(&tokens, day(2018, 11, 19)).unwrap();
        assert_eq!(resolved[0].departure.with_timezone(&PACIFIC).date_naive(), day(2018, 11, 19));
        assert!(!resolved[0].cancelled);
        assert!(resolved[1].cancelled);
    }

    #[test]
    fn test_local_day_bounds_contain_now() {
        let now = at_local(day(2018, 11, 19), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        let (start, end) = local_day_bounds(now);
        assert!(start <= now && now < end);
        assert_eq!((end - start).num_hours(), 24);
    }
}
