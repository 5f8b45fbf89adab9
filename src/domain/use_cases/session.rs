use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::{
    constants::ACTIVITY_SUMMARY_DAYS,
    entities::{
        activity_log::{summarize_activity, ActivityAction, MemberActivity},
        family_config::FamilyConfig,
    },
    errors::AppError,
    repositories::gateway::PersistenceGateway,
};

/// Member "login": there are no passwords, only a choice among the
/// configured family members.
pub struct SessionHandler {
    pub gateway: Arc<PersistenceGateway>,
    defaults: FamilyConfig,
}

impl SessionHandler {
    pub fn new(gateway: Arc<PersistenceGateway>, defaults: FamilyConfig) -> Self {
        SessionHandler { gateway, defaults }
    }

    pub fn family_config(&self) -> Result<FamilyConfig, AppError> {
        Ok(self.gateway.load_family_config(self.defaults.clone())?)
    }

    pub fn save_family_config(&self, config: &FamilyConfig) -> Result<(), AppError> {
        if config.members.is_empty() {
            return Err(AppError::InvalidInput("At least one family member is required".to_string()));
        }
        Ok(self.gateway.save_family_config(config)?)
    }

    pub async fn login(&self, member: &str) -> Result<(), AppError> {
        if !self.family_config()?.is_member(member) {
            return Err(AppError::UnknownMember(member.to_string()));
        }
        self.gateway.set_current_user(member)?;

        let details = json!({ "timestamp": Utc::now().timestamp_millis() });
        if let Err(e) = self.gateway.save_activity_log(ActivityAction::Login, member, details).await {
            tracing::warn!("Login activity log failed: {}", e);
        }
        tracing::info!("{} logged in", member);
        Ok(())
    }

    /// Returns who was logged out, if anyone.
    pub async fn logout(&self) -> Result<Option<String>, AppError> {
        let Some(member) = self.gateway.current_user()? else {
            return Ok(None);
        };

        let details = json!({ "timestamp": Utc::now().timestamp_millis() });
        if let Err(e) = self.gateway.save_activity_log(ActivityAction::Logout, &member, details).await {
            tracing::warn!("Logout activity log failed: {}", e);
        }
        self.gateway.clear_current_user()?;
        Ok(Some(member))
    }

    pub fn current_user(&self) -> Result<Option<String>, AppError> {
        Ok(self.gateway.current_user()?)
    }

    /// Per-member counts over the last week.
    pub async fn activity_summary(&self, now: DateTime<Utc>) -> Result<BTreeMap<String, MemberActivity>, AppError> {
        let logs = self.gateway.load_activity_logs().await?;
        Ok(summarize_activity(&logs, now, Duration::days(ACTIVITY_SUMMARY_DAYS)))
    }
}
