use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::date_grouping::DateKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthRecord {
    pub id: String,
    pub date: DateKey,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub head_circumference: Option<f64>,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

fn validate_measurements(entry: &GrowthEntry) -> Result<(), ValidationError> {
    let has_text = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.trim().is_empty());
    let has_value = |field: Option<f64>| field.is_some_and(|v| v > 0.0);

    if has_value(entry.height)
        || has_value(entry.weight)
        || has_value(entry.head_circumference)
        || has_text(&entry.milestone)
        || has_text(&entry.memo)
    {
        Ok(())
    } else {
        let mut error = ValidationError::new("empty_growth_record");
        error.message = Some("At least one measurement or note is required".into());
        Err(error)
    }
}

/// Input for adding or editing a growth record.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_measurements"))]
pub struct GrowthEntry {
    pub date: DateKey,

    #[validate(range(exclusive_min = 0.0, max = 250.0, message = "Height must be in cm"))]
    pub height: Option<f64>,

    #[validate(range(exclusive_min = 0.0, max = 200.0, message = "Weight must be in kg"))]
    pub weight: Option<f64>,

    #[validate(range(exclusive_min = 0.0, max = 100.0, message = "Head circumference must be in cm"))]
    pub head_circumference: Option<f64>,

    #[validate(length(max = 200))]
    pub milestone: Option<String>,

    #[validate(length(max = 500))]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub date: DateKey,
    pub milestone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthStats {
    pub total_records: usize,
    pub latest_date: DateKey,
    pub latest_height: Option<f64>,
    pub latest_weight: Option<f64>,
    /// Latest minus first recorded height, when both exist.
    pub height_growth: Option<f64>,
    pub weight_growth: Option<f64>,
    pub milestones: Vec<Milestone>,
}

pub fn growth_stats(records: &[GrowthRecord]) -> Option<GrowthStats> {
    let mut sorted: Vec<&GrowthRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let first = *sorted.first()?;
    let latest = *sorted.last()?;

    let delta = |a: Option<f64>, b: Option<f64>| match (a, b) {
        (Some(latest), Some(first)) => Some(latest - first),
        _ => None,
    };

    Some(GrowthStats {
        total_records: records.len(),
        latest_date: latest.date,
        latest_height: latest.height,
        latest_weight: latest.weight,
        height_growth: delta(latest.height, first.height),
        weight_growth: delta(latest.weight, first.weight),
        milestones: sorted
            .iter()
            .filter_map(|r| {
                r.milestone
                    .as_ref()
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| Milestone { date: r.date, milestone: m.clone() })
            })
            .collect(),
    })
}
