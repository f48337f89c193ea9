use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};

use crate::error::{CommonError, CommonResult};

/// The number of days from `0001-01-01` (CE day 1) to the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// The format used for human-readable timestamps in generated metadata files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Converts a date to the Arrow `Date32` representation (days since the Unix epoch).
pub fn date_to_date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn date32_to_date(days: i32) -> CommonResult<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
        .ok_or_else(|| CommonError::invalid(format!("date out of range: {days}")))
}

/// Returns the date that is `days` days before `date`.
pub fn days_before(date: NaiveDate, days: u64) -> CommonResult<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| CommonError::invalid(format!("cannot subtract {days} days from {date}")))
}

pub fn format_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date32_conversion() -> CommonResult<()> {
        let epoch =
            NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(|| CommonError::internal("date"))?;
        assert_eq!(date_to_date32(epoch), 0);
        let date =
            NaiveDate::from_ymd_opt(2024, 2, 29).ok_or_else(|| CommonError::internal("date"))?;
        assert_eq!(date_to_date32(date), 19782);
        assert_eq!(date32_to_date(19782)?, date);
        Ok(())
    }

    #[test]
    fn test_days_before() -> CommonResult<()> {
        let date =
            NaiveDate::from_ymd_opt(2024, 3, 1).ok_or_else(|| CommonError::internal("date"))?;
        assert_eq!(days_before(date, 1)?.to_string(), "2024-02-29");
        assert_eq!(days_before(date, 0)?, date);
        Ok(())
    }

    #[test]
    fn test_format_timestamp() -> CommonResult<()> {
        let time = chrono::Utc
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .single()
            .ok_or_else(|| CommonError::internal("timestamp"))?;
        assert_eq!(format_timestamp(&time), "2024-05-06 07:08:09");
        Ok(())
    }
}
