use std::sync::Arc;

use validator::Validate;

use crate::{
    date_grouping::DateKey,
    entities::schedule::{sort_schedules, NewSchedule, Schedule, SchedulePatch},
    errors::{AppError, FieldError},
    infrastructure::utils::ids::{generate_id, now_millis},
    repositories::gateway::PersistenceGateway,
};

pub struct ScheduleHandler {
    pub gateway: Arc<PersistenceGateway>,
}

fn blank_title() -> AppError {
    AppError::ValidationError(vec![FieldError {
        field: "title".to_string(),
        message: "Title is required".to_string(),
    }])
}

impl ScheduleHandler {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        ScheduleHandler { gateway }
    }

    pub async fn create(&self, mut request: NewSchedule, created_by: &str) -> Result<Schedule, AppError> {
        request.title = request.title.trim().to_string();
        if request.title.is_empty() {
            return Err(blank_title());
        }
        request.validate()?;

        let mut schedule = Schedule {
            doc_id: None,
            id: generate_id("schedule"),
            title: request.title,
            date: request.date,
            time: request.time.filter(|t| !t.is_empty()),
            memo: request.memo.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
            participants: request.participants,
            created_by: created_by.to_string(),
            created_at: now_millis(),
        };

        let stored_id = self.gateway.create_schedule(&schedule).await?;
        if stored_id != schedule.id {
            schedule.doc_id = Some(stored_id);
        }
        Ok(schedule)
    }

    pub async fn update(&self, schedule: &Schedule, mut patch: SchedulePatch) -> Result<(), AppError> {
        if let Some(title) = patch.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(blank_title());
            }
        }
        patch.validate()?;
        self.gateway.update_schedule(schedule.record_id(), &patch).await?;
        Ok(())
    }

    pub async fn delete(&self, schedule: &Schedule) -> Result<(), AppError> {
        self.gateway.delete_schedule(schedule.record_id()).await?;
        Ok(())
    }

    /// Schedules on or after `from`, soonest first.
    pub async fn upcoming(&self, from: DateKey) -> Result<Vec<Schedule>, AppError> {
        let mut schedules: Vec<Schedule> = self
            .gateway
            .fetch_schedules()
            .await?
            .into_iter()
            .filter(|s| s.date >= from)
            .collect();
        sort_schedules(&mut schedules);
        Ok(schedules)
    }

    pub async fn on_date(&self, date: DateKey) -> Result<Vec<Schedule>, AppError> {
        let mut schedules: Vec<Schedule> = self
            .gateway
            .fetch_schedules()
            .await?
            .into_iter()
            .filter(|s| s.date == date)
            .collect();
        sort_schedules(&mut schedules);
        Ok(schedules)
    }
}
