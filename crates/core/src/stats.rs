use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 进程内运行时计数器
///
/// 每次更新同时写入 `metrics` 门面，`snapshot()` 供控制通道的 getMetrics 使用。
#[derive(Debug)]
pub struct RuntimeStats {
    instance_id: String,
    started_at: DateTime<Utc>,
    cron_runs_started: AtomicU64,
    cron_runs_failed: AtomicU64,
    cron_runs_skipped: AtomicU64,
    process_jobs_running: AtomicI64,
    process_runs_failed: AtomicU64,
    process_restarts: AtomicU64,
    tasks_received: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_in_flight: AtomicI64,
    tasks_resubmitted: AtomicU64,
    control_connections: AtomicU64,
    control_connections_active: AtomicI64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuntimeStatsSnapshot {
    pub instance_id: String,
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub cron_runs_started: u64,
    pub cron_runs_failed: u64,
    pub cron_runs_skipped: u64,
    pub process_jobs_running: i64,
    pub process_runs_failed: u64,
    pub process_restarts: u64,
    pub tasks_received: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_in_flight: i64,
    pub tasks_resubmitted: u64,
    pub connection_num: i64,
    pub accept_count: u64,
}

impl RuntimeStats {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            started_at: Utc::now(),
            cron_runs_started: AtomicU64::new(0),
            cron_runs_failed: AtomicU64::new(0),
            cron_runs_skipped: AtomicU64::new(0),
            process_jobs_running: AtomicI64::new(0),
            process_runs_failed: AtomicU64::new(0),
            process_restarts: AtomicU64::new(0),
            tasks_received: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_in_flight: AtomicI64::new(0),
            tasks_resubmitted: AtomicU64::new(0),
            control_connections: AtomicU64::new(0),
            control_connections_active: AtomicI64::new(0),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn record_cron_started(&self, job: &str) {
        self.cron_runs_started.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("orchestrator_cron_runs_total", "job" => job.to_string()).increment(1);
    }

    pub fn record_cron_failed(&self, job: &str) {
        self.cron_runs_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("orchestrator_cron_failures_total", "job" => job.to_string())
            .increment(1);
    }

    pub fn record_cron_skipped(&self, job: &str) {
        self.cron_runs_skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("orchestrator_cron_skipped_total", "job" => job.to_string())
            .increment(1);
    }

    pub fn process_started(&self) {
        let running = self.process_jobs_running.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("orchestrator_process_jobs_running").set(running as f64);
    }

    pub fn process_stopped(&self) {
        let running = self.process_jobs_running.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("orchestrator_process_jobs_running").set(running as f64);
    }

    pub fn record_process_failed(&self, job: &str) {
        self.process_runs_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("orchestrator_process_failures_total", "job" => job.to_string())
            .increment(1);
    }

    pub fn record_process_restart(&self, job: &str) {
        self.process_restarts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("orchestrator_process_restarts_total", "job" => job.to_string())
            .increment(1);
    }

    pub fn task_received(&self) {
        self.tasks_received.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.tasks_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!("orchestrator_tasks_received_total").increment(1);
        metrics::gauge!("orchestrator_tasks_in_flight").set(in_flight as f64);
    }

    pub fn task_finished(&self, success: bool) {
        if success {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("orchestrator_tasks_succeeded_total").increment(1);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("orchestrator_tasks_failed_total").increment(1);
        }
        let in_flight = self.tasks_in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("orchestrator_tasks_in_flight").set(in_flight as f64);
    }

    pub fn record_task_resubmitted(&self) {
        self.tasks_resubmitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("orchestrator_tasks_resubmitted_total").increment(1);
    }

    pub fn control_connection_opened(&self) {
        self.control_connections.fetch_add(1, Ordering::Relaxed);
        self.control_connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn control_connection_closed(&self) {
        self.control_connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuntimeStatsSnapshot {
        RuntimeStatsSnapshot {
            instance_id: self.instance_id.clone(),
            start_time: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            cron_runs_started: self.cron_runs_started.load(Ordering::Relaxed),
            cron_runs_failed: self.cron_runs_failed.load(Ordering::Relaxed),
            cron_runs_skipped: self.cron_runs_skipped.load(Ordering::Relaxed),
            process_jobs_running: self.process_jobs_running.load(Ordering::Relaxed),
            process_runs_failed: self.process_runs_failed.load(Ordering::Relaxed),
            process_restarts: self.process_restarts.load(Ordering::Relaxed),
            tasks_received: self.tasks_received.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_in_flight: self.tasks_in_flight.load(Ordering::Relaxed),
            tasks_resubmitted: self.tasks_resubmitted.load(Ordering::Relaxed),
            connection_num: self.control_connections_active.load(Ordering::Relaxed),
            accept_count: self.control_connections.load(Ordering::Relaxed),
        }
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new("local")
    }
}
