use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use orchestrator_core::{
    traits::{job_fn, LockCoordinator},
    JobRegistry, ProcessJobDefinition, RuntimeStats, SchedulerError, SchedulerResult,
};
use orchestrator_infrastructure::{InMemoryLockCoordinator, InMemoryLockStore};
use orchestrator_worker::{ProcessSupervisor, SupervisorSettings};
use tokio::time::{sleep, Instant};

mock! {
    pub Lock {}

    #[async_trait]
    impl LockCoordinator for Lock {
        async fn acquire(&self, key: &str, ttl: Duration) -> SchedulerResult<bool>;
        async fn refresh(&self, key: &str, ttl: Duration) -> SchedulerResult<()>;
        async fn release(&self, key: &str) -> SchedulerResult<()>;
    }
}

const KEY: &str = "orchestrator:process_server:consumer";

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        lock_ttl: Duration::from_secs(10),
        refresh_interval: Duration::from_secs(8),
        acquire_retry_interval: Duration::from_secs(5),
        acquire_timeout: Duration::from_secs(20),
        startup_jitter_min: Duration::ZERO,
        startup_jitter_max: Duration::ZERO,
        key_prefix: "orchestrator".to_string(),
    }
}

fn long_running_registry(run_for: Duration) -> Arc<JobRegistry> {
    Arc::new(
        JobRegistry::builder()
            .process(
                ProcessJobDefinition::new("consumer"),
                job_fn(move || async move {
                    sleep(run_for).await;
                    Ok(())
                }),
            )
            .build()
            .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_lock_held_for_whole_run_with_refresh() {
    let store = InMemoryLockStore::new();
    let supervisor = Arc::new(ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(30)),
        Arc::new(InMemoryLockCoordinator::with_store(store.clone(), "node-a")),
        Arc::new(RuntimeStats::new("node-a")),
        settings(),
    ));
    assert_eq!(supervisor.lock_key("consumer"), KEY);

    let run = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        async move { supervisor.run("consumer").await }
    });

    let rival = InMemoryLockCoordinator::with_store(store.clone(), "node-b");
    // 作业持续三倍TTL，期间锁始终属于本实例
    for _ in 0..3 {
        sleep(Duration::from_secs(9)).await;
        assert_eq!(store.holder(KEY).as_deref(), Some("node-a"));
        assert!(!rival.acquire(KEY, Duration::from_secs(10)).await.unwrap());
    }

    run.await.unwrap().unwrap();
    assert!(!store.is_locked(KEY));
}

#[tokio::test(start_paused = true)]
async fn test_restart_waits_for_delay() {
    let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let recorded = Arc::clone(&starts);
    let registry = Arc::new(
        JobRegistry::builder()
            .process(
                ProcessJobDefinition::new("consumer").with_restart(5),
                job_fn(move || {
                    let recorded = Arc::clone(&recorded);
                    async move {
                        recorded.lock().unwrap().push(Instant::now());
                        Err(anyhow::anyhow!("connection reset"))
                    }
                }),
            )
            .build()
            .unwrap(),
    );
    let store = InMemoryLockStore::new();
    let stats = Arc::new(RuntimeStats::new("node-a"));
    let supervisor = ProcessSupervisor::new(
        registry,
        Arc::new(InMemoryLockCoordinator::with_store(store.clone(), "node-a")),
        stats.clone(),
        settings(),
    );

    supervisor
        .run_until("consumer", sleep(Duration::from_secs(12)))
        .await
        .unwrap();

    let starts = starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(5));
    }
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.process_runs_failed, 3);
    assert_eq!(snapshot.process_restarts, 2);
    assert_eq!(snapshot.process_jobs_running, 0);
    assert!(!store.is_locked(KEY));
}

#[tokio::test(start_paused = true)]
async fn test_no_restart_runs_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let registry = Arc::new(
        JobRegistry::builder()
            .process(
                ProcessJobDefinition::new("consumer"),
                job_fn(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if true {
                            panic!("bad state");
                        }
                        Ok(())
                    }
                }),
            )
            .build()
            .unwrap(),
    );
    let lock = InMemoryLockCoordinator::new("node-a");
    let store = lock.store();
    let supervisor = ProcessSupervisor::new(
        registry,
        Arc::new(lock),
        Arc::new(RuntimeStats::default()),
        settings(),
    );

    supervisor.run("consumer").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!store.is_locked(KEY));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_bounded_retries() {
    let mut lock = MockLock::new();
    lock.expect_acquire()
        .withf(|key, ttl| key == KEY && *ttl == Duration::from_secs(10))
        .times(5)
        .returning(|_, _| Ok(false));
    lock.expect_release().times(0);

    let supervisor = ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(1)),
        Arc::new(lock),
        Arc::new(RuntimeStats::default()),
        settings(),
    );

    let started = Instant::now();
    let err = supervisor.run("consumer").await.unwrap_err();
    assert!(matches!(err, SchedulerError::LockUnavailable { .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_acquires_after_holder_releases() {
    let store = InMemoryLockStore::new();
    let rival = InMemoryLockCoordinator::with_store(store.clone(), "node-b");
    assert!(rival.acquire(KEY, Duration::from_secs(60)).await.unwrap());

    let supervisor = Arc::new(ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(1)),
        Arc::new(InMemoryLockCoordinator::with_store(store.clone(), "node-a")),
        Arc::new(RuntimeStats::default()),
        settings(),
    ));
    let run = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        async move { supervisor.run("consumer").await }
    });

    sleep(Duration::from_secs(7)).await;
    rival.release(KEY).await.unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_coordinator_unavailable_aborts_without_retry() {
    let mut lock = MockLock::new();
    lock.expect_acquire()
        .times(1)
        .returning(|_, _| Err(SchedulerError::CoordinatorUnavailable("refused".into())));
    lock.expect_release().times(0);

    let supervisor = ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(1)),
        Arc::new(lock),
        Arc::new(RuntimeStats::default()),
        settings(),
    );
    assert!(matches!(
        supervisor.run("consumer").await,
        Err(SchedulerError::CoordinatorUnavailable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_lock_lost_stops_refresh_but_job_finishes() {
    let mut lock = MockLock::new();
    lock.expect_acquire().times(1).returning(|_, _| Ok(true));
    lock.expect_refresh()
        .times(1)
        .returning(|key, _| Err(SchedulerError::LockLost { key: key.to_string() }));
    lock.expect_release().times(1).returning(|_| Ok(()));

    let supervisor = ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(30)),
        Arc::new(lock),
        Arc::new(RuntimeStats::default()),
        settings(),
    );
    supervisor.run("consumer").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transient_refresh_failure_is_retried() {
    let mut lock = MockLock::new();
    lock.expect_acquire().times(1).returning(|_, _| Ok(true));
    lock.expect_refresh()
        .times(3)
        .returning(|_, _| Err(SchedulerError::CoordinatorUnavailable("timeout".into())));
    lock.expect_release().times(1).returning(|_| Ok(()));

    let supervisor = ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(30)),
        Arc::new(lock),
        Arc::new(RuntimeStats::default()),
        settings(),
    );
    supervisor.run("consumer").await.unwrap();
}

#[tokio::test]
async fn test_missing_or_disabled_job_returns_quietly() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let registry = Arc::new(
        JobRegistry::builder()
            .process(
                ProcessJobDefinition::new("paused").disabled(),
                job_fn(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .build()
            .unwrap(),
    );
    let mut lock = MockLock::new();
    lock.expect_acquire().times(0);

    let supervisor = ProcessSupervisor::new(
        registry,
        Arc::new(lock),
        Arc::new(RuntimeStats::default()),
        settings(),
    );
    supervisor.run("unknown").await.unwrap();
    supervisor.run("paused").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_body_and_releases() {
    let store = InMemoryLockStore::new();
    let supervisor = ProcessSupervisor::new(
        long_running_registry(Duration::from_secs(3600)),
        Arc::new(InMemoryLockCoordinator::with_store(store.clone(), "node-a")),
        Arc::new(RuntimeStats::default()),
        settings(),
    );

    let started = Instant::now();
    supervisor
        .run_until("consumer", sleep(Duration::from_secs(3)))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!store.is_locked(KEY));
}
