use super::*;
use chrono::{Duration as ChronoDuration, Utc};
use seat_watcher::engine::WatchStore;

async fn insert_record(
    store: &SqliteWatchStore,
    watch_id: i64,
    age: ChronoDuration,
) -> anyhow::Result<()> {
    let watch = store.get_watch(watch_id).await?;
    sqlx::query(
        "INSERT INTO notifications (user_id, course_watch_id, notification_type, sent_at) VALUES (?, ?, ?, ?)",
    )
    .bind(watch.user_id)
    .bind(watch_id)
    .bind(NotificationChannel::Email)
    .bind(Utc::now() - age)
    .execute(store.pool())
    .await?;
    Ok(())
}

async fn insert_token(
    store: &SqliteWatchStore,
    user_id: i64,
    token: &str,
    expires_in: ChronoDuration,
    used: bool,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO password_reset_tokens (user_id, token, expires_at, used) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(Utc::now() + expires_in)
        .bind(used as i64)
        .execute(store.pool())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_retention_purges_old_records_and_dead_tokens() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "2ME3").await?;
    let user_id = store.get_watch(watch_id).await?.user_id;

    insert_record(&store, watch_id, ChronoDuration::days(5)).await?;
    insert_record(&store, watch_id, ChronoDuration::days(10)).await?;
    insert_record(&store, watch_id, ChronoDuration::days(1)).await?;
    insert_record(&store, watch_id, ChronoDuration::hours(2)).await?;

    insert_token(&store, user_id, "expired", ChronoDuration::hours(-1), false).await?;
    insert_token(&store, user_id, "spent", ChronoDuration::hours(1), true).await?;
    insert_token(&store, user_id, "live", ChronoDuration::hours(1), false).await?;

    let report = store.purge_older_than(ChronoDuration::days(4)).await?;
    assert_eq!(report.notifications_deleted, 2);
    assert_eq!(report.tokens_deleted, 2);

    assert_eq!(store.list_notification_records(watch_id).await?.len(), 2);

    let remaining: Vec<String> = sqlx::query_scalar("SELECT token FROM password_reset_tokens")
        .fetch_all(store.pool())
        .await?;
    assert_eq!(remaining, vec!["live".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_sweep_runs_retention() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "2ME3").await?;
    insert_record(&store, watch_id, ChronoDuration::days(6)).await?;

    let scheduler = create_scheduler(
        store.clone(),
        Arc::new(TableExtractor::default()),
        NotificationDispatcher::new(),
    );
    scheduler.run_sweep(&StubSession).await?;

    assert!(store.list_notification_records(watch_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_store_survives_reconnect() -> anyhow::Result<()> {
    let (dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "1MD3").await?;
    store
        .update_status(watch_id, CourseStatus::Waitlist, Utc::now())
        .await?;
    store.pool().close().await;

    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("courses.db").display()),
        ..AppConfig::default().database
    };
    let reopened = SqliteWatchStore::connect(&config).await?;

    let watch = reopened.get_watch(watch_id).await?;
    assert_eq!(watch.status, CourseStatus::Waitlist);
    assert!(watch.last_checked.is_some());
    Ok(())
}

#[tokio::test]
async fn test_reactivated_watch_starts_from_closed() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "1MD3").await?;
    store.update_status(watch_id, CourseStatus::Open, Utc::now()).await?;
    store.deactivate_watch(watch_id).await?;

    assert!(store.list_active_ordered_by_staleness().await?.is_empty());

    let again = add_watch(&store, "student@example.com", None, "1MD3").await?;
    assert_eq!(again, watch_id);

    let watch = store.get_watch(watch_id).await?;
    assert_eq!(watch.status, CourseStatus::Closed);
    assert!(watch.last_checked.is_none());
    assert!(watch.active);
    Ok(())
}

#[tokio::test]
async fn test_watch_limit_and_stats() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    add_watch(&store, "student@example.com", None, "1MD3").await?;
    add_watch(&store, "student@example.com", None, "1JC3").await?;
    add_watch(&store, "friend@example.com", None, "1MD3").await?;

    let err = add_watch(&store, "student@example.com", None, "1XC3")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("only watch up to 2"));

    let stats = store.stats().await?;
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.active_watches, 3);
    assert_eq!(stats.monitored_courses, 2);
    Ok(())
}
