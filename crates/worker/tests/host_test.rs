use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::{
    config::SupervisorMode, traits::job_fn, traits::LockCoordinator, JobRegistry,
    ProcessJobDefinition, RuntimeStats,
};
use orchestrator_infrastructure::{InMemoryLockCoordinator, InMemoryLockStore};
use orchestrator_worker::{ProcessHost, ProcessSupervisor, SupervisorSettings};
use tokio::sync::broadcast;

fn counting_registry(counter: Arc<AtomicUsize>, restart: bool) -> Arc<JobRegistry> {
    let definition = if restart {
        ProcessJobDefinition::new("consumer").with_restart(0)
    } else {
        ProcessJobDefinition::new("consumer")
    };
    Arc::new(
        JobRegistry::builder()
            .process(
                definition,
                job_fn(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(())
                    }
                }),
            )
            .process(
                ProcessJobDefinition::new("disabled").disabled(),
                job_fn(|| async { Ok(()) }),
            )
            .build()
            .unwrap(),
    )
}

fn host(
    registry: Arc<JobRegistry>,
    store: InMemoryLockStore,
    mode: SupervisorMode,
) -> ProcessHost {
    let mut settings = SupervisorSettings::default().without_jitter();
    settings.acquire_timeout = Duration::ZERO;
    let supervisor = ProcessSupervisor::new(
        registry,
        Arc::new(InMemoryLockCoordinator::with_store(store, "node-a")),
        Arc::new(RuntimeStats::default()),
        settings,
    );
    ProcessHost::new(Arc::new(supervisor), mode)
}

#[tokio::test]
async fn test_enabled_jobs_skip_disabled() {
    let host = host(
        counting_registry(Arc::new(AtomicUsize::new(0)), false),
        InMemoryLockStore::new(),
        SupervisorMode::InProcess,
    );
    assert_eq!(host.enabled_jobs(), vec!["consumer".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_both_modes_run_job_once() {
    for mode in [SupervisorMode::InProcess, SupervisorMode::Dedicated] {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = InMemoryLockStore::new();
        let host = host(counting_registry(counter.clone(), false), store.clone(), mode);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = host.spawn("consumer", shutdown_tx.subscribe()).unwrap();
        handle.join().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1, "mode {mode:?}");
        assert!(!store.is_locked("orchestrator:process_server:consumer"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lock_held_elsewhere_ends_context_without_running() {
    for mode in [SupervisorMode::InProcess, SupervisorMode::Dedicated] {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = InMemoryLockStore::new();
        let rival = InMemoryLockCoordinator::with_store(store.clone(), "node-b");
        assert!(rival
            .acquire("orchestrator:process_server:consumer", Duration::from_secs(60))
            .await
            .unwrap());

        let host = host(counting_registry(counter.clone(), false), store.clone(), mode);
        let (shutdown_tx, _) = broadcast::channel(1);
        host.spawn("consumer", shutdown_tx.subscribe())
            .unwrap()
            .join()
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 0, "mode {mode:?}");
        assert_eq!(
            store.holder("orchestrator:process_server:consumer").as_deref(),
            Some("node-b")
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_restarting_job() {
    for mode in [SupervisorMode::InProcess, SupervisorMode::Dedicated] {
        let counter = Arc::new(AtomicUsize::new(0));
        let store = InMemoryLockStore::new();
        let host = host(counting_registry(counter.clone(), true), store.clone(), mode);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = host.spawn("consumer", shutdown_tx.subscribe()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());
        shutdown_tx.send(()).unwrap();
        handle.join().await;

        assert!(counter.load(Ordering::SeqCst) >= 2, "mode {mode:?}");
        assert!(!store.is_locked("orchestrator:process_server:consumer"));
    }
}
