use super::*;
use seat_watcher::engine::{ContinuousRunner, RunnerState, SessionManager};

fn create_runner(
    store: Arc<SqliteWatchStore>,
    extractor: Arc<TableExtractor>,
    provider: StubProvider,
) -> ContinuousRunner<StubProvider> {
    let scheduler = create_scheduler(store, extractor, NotificationDispatcher::new());
    ContinuousRunner::new(SessionManager::new(provider), scheduler)
        .with_interval(Duration::from_millis(5))
}

#[tokio::test]
async fn test_single_run_checks_everything_and_logs_out() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "1MD3").await?;

    let extractor = Arc::new(TableExtractor::default());
    extractor.set("1MD3", CourseStatus::Waitlist);

    let provider = StubProvider::default();
    let (opens, closes) = (provider.opens.clone(), provider.closes.clone());
    let mut runner = create_runner(store.clone(), extractor, provider);

    let summary = runner.run_once().await?;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.changed, 1);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_watch(watch_id).await?.status, CourseStatus::Waitlist);

    Ok(())
}

#[tokio::test]
async fn test_login_failure_checks_nothing() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "1MD3").await?;

    let provider = StubProvider {
        fail_first: 1,
        ..StubProvider::default()
    };
    let mut runner = create_runner(store.clone(), Arc::new(TableExtractor::default()), provider);

    let err = runner.run_once().await.unwrap_err();
    assert!(err.is_sweep_fatal());
    assert!(store.get_watch(watch_id).await?.last_checked.is_none());
    Ok(())
}

#[tokio::test]
async fn test_continuous_mode_retries_after_login_failure() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let watch_id = add_watch(&store, "student@example.com", None, "1MD3").await?;

    let extractor = Arc::new(TableExtractor::default());
    extractor.set("1MD3", CourseStatus::Open);

    let cancel = CancellationToken::new();
    let provider = StubProvider {
        fail_first: 2,
        cancel_on: Some((3, cancel.clone())),
        ..StubProvider::default()
    };
    let (opens, closes) = (provider.opens.clone(), provider.closes.clone());
    let mut runner = create_runner(store.clone(), extractor, provider);

    runner.run(cancel).await;

    assert_eq!(runner.state(), RunnerState::Stopped);
    assert_eq!(runner.failed_sweeps(), 2);
    assert_eq!(runner.sweep_count(), 1);
    assert_eq!(opens.load(Ordering::SeqCst), 3);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_watch(watch_id).await?.status, CourseStatus::Open);

    Ok(())
}

#[tokio::test]
async fn test_cancellation_during_sleep_stops_promptly() -> anyhow::Result<()> {
    let (_dir, store) = create_test_store().await?;
    let provider = StubProvider::default();
    let closes = provider.closes.clone();

    let mut runner = create_runner(store, Arc::new(TableExtractor::default()), provider)
        .with_interval(Duration::from_secs(3600));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(10), runner.run(cancel)).await?;

    assert_eq!(runner.sweep_count(), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    Ok(())
}
