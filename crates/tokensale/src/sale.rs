use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sale window and acceptance flags, resolved once at startup and passed into each lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleConfig {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub accept_applicants: bool,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            accept_applicants: true,
        }
    }
}

impl SaleConfig {
    /// Open window with no bounds, mostly useful for demos and tests.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn window(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start_time),
            end_time: Some(end_time),
            accept_applicants: true,
        }
    }

    /// `true` when `now` falls in `[start_time, end_time)`. Missing bounds are unbounded.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_time.map_or(true, |start| now >= start);
        let not_ended = self.end_time.map_or(true, |end| now < end);
        started && not_ended
    }

    pub fn is_accepting_applicants(&self, now: DateTime<Utc>) -> bool {
        self.accept_applicants && self.window_contains(now)
    }
}
