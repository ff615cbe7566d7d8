//! Reshapes the provider's 3-hourly forecast series into "today" and
//! "next days" views.

use chrono::{NaiveDate, TimeZone, Timelike};

use crate::types::ForecastEntry;

/// Upper bound on hourly entries. 3-hourly data yields at most 8 per day.
pub const MAX_HOURLY_ENTRIES: usize = 24;

pub const MAX_DAILY_ENTRIES: usize = 5;

const MIDDAY_HOUR: u32 = 12;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastViews {
    pub hourly: Vec<ForecastEntry>,
    pub daily: Vec<ForecastEntry>,
}

/// Split `series` into today's entries and one representative entry per day.
///
/// Dates and hours are taken in `tz`. Each day is represented by its midday
/// entry when there is one, otherwise by its first entry. Input order is
/// preserved in both views.
pub fn aggregate<Tz: TimeZone>(
    series: &[ForecastEntry],
    reference_date: NaiveDate,
    tz: &Tz,
) -> ForecastViews {
    let mut hourly = Vec::new();
    let mut daily: Vec<(NaiveDate, ForecastEntry)> = Vec::new();

    for entry in series {
        let Some(local) = tz.timestamp_opt(entry.timestamp, 0).single() else {
            tracing::debug!("Skipping forecast entry with timestamp {}", entry.timestamp);
            continue;
        };
        let date = local.date_naive();
        let hour = local.hour();

        let annotated = ForecastEntry {
            hour_of_day: Some(hour),
            ..entry.clone()
        };

        if date == reference_date && hourly.len() < MAX_HOURLY_ENTRIES {
            hourly.push(annotated.clone());
        }

        match daily.iter_mut().find(|(day, _)| *day == date) {
            Some((_, kept)) if hour == MIDDAY_HOUR => *kept = annotated,
            Some(_) => {}
            None => daily.push((date, annotated)),
        }
    }

    daily.truncate(MAX_DAILY_ENTRIES);

    ForecastViews {
        hourly,
        daily: daily.into_iter().map(|(_, entry)| entry).collect(),
    }
}
