
use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use family_album::{
    entities::{
        activity_log::ActivityAction,
        family_config::FamilyConfig,
        growth::GrowthEntry,
        schedule::{NewSchedule, SchedulePatch},
    },
    errors::AppError,
    settings::AppConfig,
    use_cases::{growth::GrowthHandler, schedules::ScheduleHandler, session::SessionHandler},
};
use serde_json::json;
use test_utils::*;

fn family_defaults() -> FamilyConfig {
    FamilyConfig {
        members: vec!["엄마".to_string(), "아빠".to_string()],
        ..FamilyConfig::defaults(&AppConfig::default())
    }
}

fn new_schedule(title: &str, date: &str, time: Option<&str>) -> NewSchedule {
    NewSchedule {
        title: title.to_string(),
        date: key(date),
        time: time.map(str::to_string),
        memo: None,
        participants: BTreeSet::new(),
    }
}

fn entry(date: &str, height: Option<f64>, weight: Option<f64>, milestone: Option<&str>) -> GrowthEntry {
    GrowthEntry {
        date: key(date),
        height,
        weight,
        head_circumference: None,
        milestone: milestone.map(str::to_string),
        memo: None,
    }
}

#[tokio::test]
async fn login_accepts_only_configured_members() {
    let gateway = local_gateway();
    let session = SessionHandler::new(gateway.clone(), family_defaults());

    let err = session.login("옆집 아저씨").await.unwrap_err();
    assert!(matches!(err, AppError::UnknownMember(_)));
    assert_eq!(session.current_user().unwrap(), None);

    session.login("엄마").await.unwrap();
    assert_eq!(session.current_user().unwrap().as_deref(), Some("엄마"));

    assert_eq!(session.logout().await.unwrap().as_deref(), Some("엄마"));
    assert_eq!(session.logout().await.unwrap(), None);

    let actions: Vec<ActivityAction> = gateway
        .load_activity_logs()
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.action)
        .collect();
    assert_eq!(actions, [ActivityAction::Login, ActivityAction::Logout]);
}

#[tokio::test]
async fn saved_family_config_controls_membership() {
    let gateway = local_gateway();
    let session = SessionHandler::new(gateway, family_defaults());

    let mut config = session.family_config().unwrap();
    config.members.push("할머니".to_string());
    session.save_family_config(&config).unwrap();
    session.login("할머니").await.unwrap();

    config.members.clear();
    assert!(matches!(session.save_family_config(&config), Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn activity_summary_counts_last_week() {
    let gateway = local_gateway();
    gateway.save_activity_log(ActivityAction::Login, "엄마", json!({})).await.unwrap();
    gateway.save_activity_log(ActivityAction::Login, "엄마", json!({})).await.unwrap();
    gateway.save_activity_log(ActivityAction::Comment, "엄마", json!({})).await.unwrap();
    gateway.save_activity_log(ActivityAction::Upload, "아빠", json!({})).await.unwrap();
    let session = SessionHandler::new(gateway, family_defaults());

    let summary = session.activity_summary(Utc::now()).await.unwrap();
    let mom = &summary["엄마"];
    assert_eq!((mom.logins, mom.uploads, mom.comments), (2, 0, 1));
    assert!(mom.last_seen.is_some());
    assert_eq!(summary["아빠"].uploads, 1);

    let later = session.activity_summary(Utc::now() + Duration::days(8)).await.unwrap();
    assert!(later.is_empty());
}

#[tokio::test]
async fn schedules_require_a_title() {
    let handler = ScheduleHandler::new(local_gateway());

    let err = handler
        .create(new_schedule("   ", "2024-05-05", None), "엄마")
        .await
        .unwrap_err();
    match err {
        AppError::ValidationError(errors) => assert_eq!(errors[0].field, "title"),
        other => panic!("unexpected error: {other}"),
    }

    let err = handler
        .create(new_schedule("소풍", "2024-05-05", Some("25:00")), "엄마")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn schedules_list_upcoming_in_order() {
    let handler = ScheduleHandler::new(local_gateway());
    handler.create(new_schedule("예방접종", "2024-05-05", Some("14:00")), "엄마").await.unwrap();
    handler.create(new_schedule("어린이날", "2024-05-05", None), "아빠").await.unwrap();
    handler.create(new_schedule("지난 일정", "2024-04-01", None), "아빠").await.unwrap();
    let christmas = handler.create(new_schedule(" 크리스마스 ", "2024-12-25", None), "엄마").await.unwrap();
    assert_eq!(christmas.title, "크리스마스");

    let upcoming = handler.upcoming(key("2024-05-01")).await.unwrap();
    let titles: Vec<&str> = upcoming.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["어린이날", "예방접종", "크리스마스"]);

    let patch = SchedulePatch { date: Some(key("2024-12-24")), ..Default::default() };
    handler.update(&christmas, patch).await.unwrap();
    assert_eq!(handler.on_date(key("2024-12-24")).await.unwrap().len(), 1);

    handler.delete(&christmas).await.unwrap();
    assert!(handler.on_date(key("2024-12-24")).await.unwrap().is_empty());
}

#[tokio::test]
async fn schedule_update_rejects_blank_title() {
    let handler = ScheduleHandler::new(local_gateway());
    let schedule = handler.create(new_schedule("병원", "2024-06-01", None), "엄마").await.unwrap();

    let patch = SchedulePatch { title: Some("  ".to_string()), ..Default::default() };
    assert!(matches!(
        handler.update(&schedule, patch).await.unwrap_err(),
        AppError::ValidationError(_)
    ));
}

#[test]
fn growth_records_track_progress() {
    let gateway = local_gateway();
    let growth = GrowthHandler::new(gateway.local_store());

    growth.add(entry("2023-07-01", Some(52.0), Some(4.1), Some("첫 미소"))).unwrap();
    let latest = growth.add(entry("2023-09-01", Some(60.5), Some(6.3), None)).unwrap();
    growth.add(entry("2023-08-01", None, None, Some("뒤집기"))).unwrap();

    let listed = growth.list().unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].id, latest.id);

    let stats = growth.stats().unwrap().unwrap();
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.latest_date, key("2023-09-01"));
    assert_eq!(stats.height_growth, Some(8.5));
    let milestones: Vec<&str> = stats.milestones.iter().map(|m| m.milestone.as_str()).collect();
    assert_eq!(milestones, ["첫 미소", "뒤집기"]);
}

#[test]
fn growth_entries_need_a_measurement() {
    let growth = GrowthHandler::new(local_gateway().local_store());

    let err = growth.add(entry("2023-07-01", None, None, Some("  "))).unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = growth.add(entry("2023-07-01", Some(-3.0), None, None)).unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    assert!(growth.stats().unwrap().is_none());
}

#[test]
fn growth_records_update_and_delete() {
    let growth = GrowthHandler::new(local_gateway().local_store());
    let record = growth.add(entry("2023-07-01", Some(52.0), None, None)).unwrap();

    let updated = growth
        .update(&record.id, entry("2023-07-02", Some(53.0), None, Some(" 옹알이 ")))
        .unwrap();
    assert_eq!(updated.height, Some(53.0));
    assert_eq!(updated.milestone.as_deref(), Some("옹알이"));
    assert_eq!(updated.created_at, record.created_at);

    growth.delete(&record.id).unwrap();
    assert!(matches!(growth.delete(&record.id), Err(AppError::NotFound(_))));
    assert!(matches!(
        growth.update("missing", entry("2023-07-01", Some(1.0), None, None)),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn concurrent_growth_entries_are_all_kept() {
    let growth = std::sync::Arc::new(GrowthHandler::new(local_gateway().local_store()));

    let threads: Vec<_> = (0..50)
        .map(|n| {
            let growth = growth.clone();
            std::thread::spawn(move || {
                growth.add(entry("2023-07-01", Some(50.0 + n as f64 / 10.0), None, None)).unwrap();
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(growth.list().unwrap().len(), 50);
}
