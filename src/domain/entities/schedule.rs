use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::date_grouping::DateKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing)]
    pub doc_id: Option<String>,
    pub id: String,
    pub title: String,
    /// Ordering field.
    pub date: DateKey,
    /// `HH:MM`, 24-hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default)]
    pub participants: BTreeSet<String>,
    pub created_by: String,
    pub created_at: i64,
}

impl Schedule {
    pub fn record_id(&self) -> &str {
        self.doc_id.as_deref().unwrap_or(&self.id)
    }
}

/// Date ascending, untimed entries before timed ones on the same day.
pub fn sort_schedules(schedules: &mut [Schedule]) {
    schedules.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.time.cmp(&b.time))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

fn validate_time_of_day(time: &str) -> Result<(), ValidationError> {
    chrono::NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| ValidationError::new("time_format"))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSchedule {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: String,

    pub date: DateKey,

    #[validate(custom(function = "validate_time_of_day", message = "Time must be HH:MM"))]
    pub time: Option<String>,

    #[validate(length(max = 500, message = "Memo must be at most 500 characters"))]
    pub memo: Option<String>,

    #[serde(default)]
    pub participants: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateKey>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_time_of_day", message = "Time must be HH:MM"))]
    pub time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500, message = "Memo must be at most 500 characters"))]
    pub memo: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<BTreeSet<String>>,
}
