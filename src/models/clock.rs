use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Wall-clock instant of one run, expressed in the back office's local time.
///
/// Every stage of a run reads the same instant so retention and stamps agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    now: NaiveDateTime,
}

impl RunClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }

    /// Current time shifted by `utc_offset_hours` (9 for KST).
    pub fn now(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self {
            now: Utc::now().with_timezone(&offset).naive_local(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn yesterday(&self) -> NaiveDate {
        self.today() - Duration::days(1)
    }

    pub fn timestamp(&self) -> String {
        self.now.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn date_stamp(&self) -> String {
        self.now.format(DATE_FORMAT).to_string()
    }
}
