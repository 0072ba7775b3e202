//! Trading calendar resolution.
//!
//! Deterministic, pure logic. No IO, no wall-clock, no randomness.
//!
//! Maps an arbitrary requested date to the nearest subsequent valid trading
//! day: weekends and US market holidays are skipped by stepping forward one
//! day at a time. Holidays are computed per year from the observance rules
//! rather than a fixed table, so there is no horizon past which resolution
//! stops working.

use crate::domain::errors::ForecastError;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Parses a strict `YYYY-MM-DD` date and advances it to the nearest valid
/// trading day (the date itself when it already is one).
///
/// Multi-day clusters (a holiday Monday after a weekend, Easter weekend)
/// are handled by repeated stepping; there is no upper bound on advancement.
pub fn resolve_trading_day(input: &str) -> Result<NaiveDate, ForecastError> {
    let parsed =
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
            ForecastError::InvalidDate {
                input: input.to_string(),
            }
        })?;
    Ok(next_trading_day(parsed))
}

/// Advances `date` forward until it is neither a weekend nor a US market
/// holiday. Idempotent on its own output.
pub fn next_trading_day(mut date: NaiveDate) -> NaiveDate {
    while is_weekend(date) || is_market_holiday(date) {
        date += Duration::days(1);
    }
    date
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Returns `true` if `date` is a US market holiday (observed date).
pub fn is_market_holiday(date: NaiveDate) -> bool {
    // New Year's Day of year+1 can be observed on Dec 31 of this year, so
    // the following year's set has to be consulted too.
    market_holidays(date.year()).contains(&date)
        || market_holidays(date.year() + 1).contains(&date)
}

/// Observed US market holidays for one calendar year.
///
/// Fixed-date holidays shift to the adjacent weekday when they land on a
/// weekend (Saturday observed Friday, Sunday observed Monday), matching the
/// exchange's published schedule. An observance can therefore spill into the
/// previous year (New Year's Day on a Saturday).
pub fn market_holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    let mut push_observed = |month: u32, day: u32| {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            days.push(observed(date));
        }
    };

    push_observed(1, 1); // New Year's Day
    push_observed(7, 4); // Independence Day
    push_observed(12, 25); // Christmas Day
    if year >= 2022 {
        // Juneteenth, observed by the exchanges since 2022
        push_observed(6, 19);
    }

    if let Some(date) = nth_weekday(year, 1, Weekday::Mon, 3) {
        days.push(date); // Martin Luther King Jr. Day
    }
    if let Some(date) = nth_weekday(year, 2, Weekday::Mon, 3) {
        days.push(date); // Presidents' Day
    }
    if let Some(date) = last_weekday(year, 5, Weekday::Mon) {
        days.push(date); // Memorial Day
    }
    if let Some(date) = nth_weekday(year, 9, Weekday::Mon, 1) {
        days.push(date); // Labor Day
    }
    if let Some(date) = nth_weekday(year, 11, Weekday::Thu, 4) {
        days.push(date); // Thanksgiving Day
    }

    days.push(easter_sunday(year) - Duration::days(2)); // Good Friday

    days
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
        .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4))
}

/// Gregorian Easter via the anonymous computus algorithm.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 4, 1).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekday_passes_through() {
        // 2025-08-06 is a Wednesday
        assert_eq!(resolve_trading_day("2025-08-06").unwrap(), date(2025, 8, 6));
    }

    #[test]
    fn saturday_resolves_to_monday() {
        assert_eq!(resolve_trading_day("2025-08-09").unwrap(), date(2025, 8, 11));
    }

    #[test]
    fn independence_day_2025_resolves_past_the_weekend() {
        // Friday 2025-07-04 is a holiday; Sat/Sun follow, so Monday it is.
        assert_eq!(resolve_trading_day("2025-07-04").unwrap(), date(2025, 7, 7));
    }

    #[test]
    fn good_friday_cluster_resolves_to_monday() {
        // Good Friday 2024 fell on 2024-03-29.
        assert_eq!(resolve_trading_day("2024-03-29").unwrap(), date(2024, 4, 1));
    }

    #[test]
    fn new_years_observed_on_previous_december_31() {
        // 2022-01-01 was a Saturday, observed Friday 2021-12-31.
        assert!(is_market_holiday(date(2021, 12, 31)));
        assert_eq!(
            resolve_trading_day("2021-12-31").unwrap(),
            date(2022, 1, 3)
        );
    }

    #[test]
    fn juneteenth_observed_only_from_2022() {
        assert!(is_market_holiday(date(2023, 6, 19)));
        // 2021-06-18 Friday: Juneteenth not yet an exchange holiday.
        assert!(!is_market_holiday(date(2021, 6, 18)));
    }

    #[test]
    fn resolution_is_idempotent() {
        for input in ["2025-07-04", "2025-11-27", "2024-12-25", "2025-01-18"] {
            let resolved = resolve_trading_day(input).unwrap();
            assert_eq!(next_trading_day(resolved), resolved);
        }
    }

    #[test]
    fn malformed_dates_are_rejected() {
        for input in ["2025/08/06", "08-06-2025", "yesterday", "2025-13-01", ""] {
            assert!(matches!(
                resolve_trading_day(input),
                Err(ForecastError::InvalidDate { .. })
            ));
        }
    }

    #[test]
    fn easter_reference_dates() {
        assert_eq!(easter_sunday(2024), date(2024, 3, 31));
        assert_eq!(easter_sunday(2025), date(2025, 4, 20));
        assert_eq!(easter_sunday(2026), date(2026, 4, 5));
    }

    #[test]
    fn holiday_table_matches_published_2025_schedule() {
        let expected = [
            date(2025, 1, 1),   // New Year's Day
            date(2025, 1, 20),  // MLK Day
            date(2025, 2, 17),  // Presidents' Day
            date(2025, 4, 18),  // Good Friday
            date(2025, 5, 26),  // Memorial Day
            date(2025, 6, 19),  // Juneteenth
            date(2025, 7, 4),   // Independence Day
            date(2025, 9, 1),   // Labor Day
            date(2025, 11, 27), // Thanksgiving
            date(2025, 12, 25), // Christmas
        ];
        let mut holidays = market_holidays(2025);
        holidays.sort();
        assert_eq!(holidays, expected);
    }
}
