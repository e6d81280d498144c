//! Config and session snapshot round trips through the filesystem.

use qqbot_core::config::{ExecutionMode, MessageIntent};
use qqbot_core::{BotConfig, Scope};
use qqbot_session::{SessionManager, SessionOptions, SessionStatus};
use serde_json::{json, Map};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bot.json");

    let mut config = BotConfig::default();
    config.credentials.app_id = "10001".to_string();
    config.dispatch.execution = ExecutionMode::Blocking;
    config.dispatch.message_intent = MessageIntent::All;
    config.gateway.idle_timeout_secs = 30;
    config.save(&path).unwrap();

    let loaded = BotConfig::load(&path).unwrap();
    assert_eq!(loaded.credentials.app_id, "10001");
    assert_eq!(loaded.dispatch.execution, ExecutionMode::Blocking);
    assert_eq!(loaded.dispatch.message_intent, MessageIntent::All);
    assert_eq!(loaded.gateway.idle_timeout_secs, 30);
    // Untouched sections keep their defaults
    assert_eq!(loaded.session.sweep_interval_ms, config.session.sweep_interval_ms);
}

#[tokio::test]
async fn test_sessions_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bot.json5");
    std::fs::write(
        &path,
        format!(
            "{{ credentials: {{ app_id: \"10001\", token: \"t\" }}, session: {{ commit_dir: {:?} }} }}",
            dir.path().join("sessions")
        ),
    )
    .unwrap();
    let config = BotConfig::load(&path).unwrap();
    let commit_dir = config.session_commit_dir().unwrap();

    let first = Arc::new(SessionManager::new("10001").with_config(&config.session, &commit_dir));
    let mut data = Map::new();
    data.insert("step".to_string(), json!(2));
    first
        .create(Scope::User, "quiz", data, SessionOptions::default().identity("u1"))
        .await
        .unwrap();
    first
        .set_status(Scope::User, "quiz", Some("u1"), SessionStatus::Hanging)
        .await
        .unwrap();
    assert!(first.commit().await.unwrap());

    let second = SessionManager::new("10001").with_config(&config.session, &commit_dir);
    assert_eq!(second.load().await, 1);
    assert_eq!(
        second.get_status(Scope::User, "quiz", Some("u1")).await.unwrap(),
        SessionStatus::Hanging
    );
    let data = second.get(Scope::User, "quiz", Some("u1")).await.unwrap();
    assert_eq!(data["step"], 2);
}
