use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use std::collections::HashSet;

pub const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Wall-clock time in the alert timezone.
pub fn local_now(now_utc: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    now_utc.with_timezone(&offset)
}

/// KRX trading day: not a weekend and not a configured holiday.
pub fn is_market_day(date: NaiveDate) -> bool {
    !is_weekend(date) && !configured_holidays().contains(&date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Minimal set of widely observed fixed-date holidays.
    // Extend via KR_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let years = [2024, 2025, 2026, 2027, 2028, 2029, 2030];
    for y in years {
        for (m, d) in [(1, 1), (3, 1), (5, 5), (8, 15), (10, 3), (10, 9), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("KR_MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }

    out
}
