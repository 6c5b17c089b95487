use std::time::Duration;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc, Weekday};

use crate::error::WorkflowError;

/// When a scheduled job fires. Calendar schedules are evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
    /// Days past the end of a month fire on its last day.
    Monthly { day: u32, hour: u32, minute: u32 },
    /// First month of each quarter.
    Quarterly { day: u32, hour: u32, minute: u32 },
}

fn check_time(hour: u32, minute: u32) -> Result<(), WorkflowError> {
    if hour > 23 || minute > 59 {
        return Err(WorkflowError::InvalidSchedule(format!("{:02}:{:02} is not a time of day", hour, minute)));
    }
    Ok(())
}

fn check_day(day: u32) -> Result<(), WorkflowError> {
    if !(1..=31).contains(&day) {
        return Err(WorkflowError::InvalidSchedule(format!("day {} is not a day of month", day)));
    }
    Ok(())
}

impl Schedule {
    pub fn every(interval: Duration) -> Result<Self, WorkflowError> {
        if interval.is_zero() {
            return Err(WorkflowError::InvalidSchedule("interval must be positive".to_string()));
        }
        Ok(Self::Every(interval))
    }

    pub fn every_minutes(minutes: u64) -> Result<Self, WorkflowError> {
        Self::every(Duration::from_secs(minutes * 60))
    }

    pub fn daily(hour: u32, minute: u32) -> Result<Self, WorkflowError> {
        check_time(hour, minute)?;
        Ok(Self::Daily { hour, minute })
    }

    pub fn weekly(weekday: Weekday, hour: u32, minute: u32) -> Result<Self, WorkflowError> {
        check_time(hour, minute)?;
        Ok(Self::Weekly { weekday, hour, minute })
    }

    pub fn monthly(day: u32, hour: u32, minute: u32) -> Result<Self, WorkflowError> {
        check_time(hour, minute)?;
        check_day(day)?;
        Ok(Self::Monthly { day, hour, minute })
    }

    pub fn quarterly(day: u32, hour: u32, minute: u32) -> Result<Self, WorkflowError> {
        check_time(hour, minute)?;
        check_day(day)?;
        Ok(Self::Quarterly { day, hour, minute })
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::Every(interval) => {
                let step = chrono::Duration::from_std(interval).ok()?;
                now.checked_add_signed(step)
            }
            Schedule::Daily { hour, minute } => (0..=1)
                .filter_map(|offset| now.date_naive().checked_add_days(chrono::Days::new(offset)))
                .filter_map(|date| at(date, hour, minute))
                .find(|t| *t > now),
            Schedule::Weekly { weekday, hour, minute } => (0..=7)
                .filter_map(|offset| now.date_naive().checked_add_days(chrono::Days::new(offset)))
                .filter(|date| date.weekday() == weekday)
                .filter_map(|date| at(date, hour, minute))
                .find(|t| *t > now),
            Schedule::Monthly { day, hour, minute } => {
                next_in_months(now, day, hour, minute, |_| true)
            }
            Schedule::Quarterly { day, hour, minute } => {
                next_in_months(now, day, hour, minute, |month| (month - 1) % 3 == 0)
            }
        }
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    date.and_hms_opt(hour, minute, 0).map(|t| t.and_utc())
}

fn next_in_months(
    now: DateTime<Utc>,
    day: u32,
    hour: u32,
    minute: u32,
    month_matches: impl Fn(u32) -> bool,
) -> Option<DateTime<Utc>> {
    let first_of_month = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;

    (0..=12)
        .filter_map(|offset| first_of_month.checked_add_months(Months::new(offset)))
        .filter(|first| month_matches(first.month()))
        .filter_map(|first| {
            let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
            let date = first.with_day(day.min(last.day()))?;
            at(date, hour, minute)
        })
        .find(|t| *t > now)
}
