use super::*;
use seat_watcher::engine::WatchStore;

#[tokio::test]
async fn test_course_opening_alerts_owner_once() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "2C03").await?;

    let extractor = Arc::new(TableExtractor::default());
    let email = RecordingNotifier::email();
    let sent = email.sent.clone();
    let dispatcher = NotificationDispatcher::new();
    dispatcher.register_notifier(Box::new(email)).await;

    let scheduler = create_scheduler(store.clone(), extractor.clone(), dispatcher);

    // Baseline sweep: still closed, nothing changes.
    let summary = scheduler.run_sweep(&StubSession).await?;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.changed, 0);

    extractor.set("2C03", CourseStatus::Open);
    let summary = scheduler.run_sweep(&StubSession).await?;
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.notifications, 1);

    // Staying open does not alert again.
    let summary = scheduler.run_sweep(&StubSession).await?;
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.notifications, 0);

    let alerts = sent.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].email, "student@example.com");
    assert_eq!(alerts[0].course_label(), "COMPSCI 2C03");
    assert_eq!(alerts[0].term, "2026 Winter");
    assert_eq!(alerts[0].registration_url, SEARCH_URL);

    let records = store.list_notification_records(watch_id).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].notification_type, NotificationChannel::Email);

    Ok(())
}

#[tokio::test]
async fn test_reopening_alerts_again() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "1JC3").await?;

    let extractor = Arc::new(TableExtractor::default());
    let email = RecordingNotifier::email();
    let sent = email.sent.clone();
    let dispatcher = NotificationDispatcher::new();
    dispatcher.register_notifier(Box::new(email)).await;
    let scheduler = create_scheduler(store.clone(), extractor.clone(), dispatcher);

    for status in [CourseStatus::Open, CourseStatus::Closed, CourseStatus::Open] {
        extractor.set("1JC3", status);
        scheduler.run_sweep(&StubSession).await?;
    }

    assert_eq!(sent.lock().unwrap().len(), 2);
    assert_eq!(store.list_notification_records(watch_id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_owner_with_phone_gets_both_channels() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let texted = add_watch(&store, "texter@example.com", Some("+19055550100"), "1MD3").await?;
    let emailed = add_watch(&store, "mailer@example.com", None, "1MD3").await?;

    let extractor = Arc::new(TableExtractor::default());
    extractor.set("1MD3", CourseStatus::Open);

    let sms = RecordingNotifier::sms();
    let texts = sms.sent.clone();
    let dispatcher = NotificationDispatcher::new();
    dispatcher.register_notifier(Box::new(RecordingNotifier::email())).await;
    dispatcher.register_notifier(Box::new(sms)).await;

    let scheduler = create_scheduler(store.clone(), extractor, dispatcher);
    let summary = scheduler.run_sweep(&StubSession).await?;

    assert_eq!(summary.notifications, 2);
    assert_eq!(texts.lock().unwrap().len(), 1);

    let both = store.list_notification_records(texted).await?;
    assert_eq!(both[0].notification_type, NotificationChannel::Both);
    let email_only = store.list_notification_records(emailed).await?;
    assert_eq!(email_only[0].notification_type, NotificationChannel::Email);

    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_keeps_status_and_record() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "3AC3").await?;

    let extractor = Arc::new(TableExtractor::default());
    extractor.set("3AC3", CourseStatus::Open);

    let dispatcher = NotificationDispatcher::new();
    dispatcher
        .register_notifier(Box::new(RecordingNotifier::email().failing()))
        .await;

    let scheduler = create_scheduler(store.clone(), extractor, dispatcher);
    let summary = scheduler.run_sweep(&StubSession).await?;

    assert_eq!(summary.errors, 0);
    assert_eq!(store.get_watch(watch_id).await?.status, CourseStatus::Open);
    assert_eq!(store.list_notification_records(watch_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_one_bad_course_does_not_stop_the_sweep() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let a = add_watch(&store, "a@example.com", None, "1XA3").await?;
    let b = add_watch(&store, "b@example.com", None, "1XB3").await?;
    let c = add_watch(&store, "c@example.com", None, "1XC3").await?;

    let extractor = Arc::new(TableExtractor::default());
    extractor.set("1XA3", CourseStatus::Waitlist);
    extractor.fail("1XB3");
    extractor.set("1XC3", CourseStatus::NotFound);

    let scheduler = create_scheduler(store.clone(), extractor, NotificationDispatcher::new());
    let summary = scheduler.run_sweep(&StubSession).await?;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.changed, 2);

    assert_eq!(store.get_watch(a).await?.status, CourseStatus::Waitlist);
    assert_eq!(store.get_watch(b).await?.status, CourseStatus::Closed);
    assert_eq!(store.get_watch(c).await?.status, CourseStatus::NotFound);

    // The failed watch was never stamped, so it leads the next sweep.
    let next = store.list_active_ordered_by_staleness().await?;
    assert_eq!(next[0].id, b);

    Ok(())
}
