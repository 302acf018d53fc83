use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use orchestrator_core::{JobRegistry, Schedule};

#[derive(Debug, Clone)]
struct IntervalTimer {
    interval_seconds: u64,
    remaining_seconds: i64,
    next: DateTime<Utc>,
}

/// 间隔型定时作业的倒计时
///
/// 每个作业以自身的间隔秒数作为初值，每次推进减去经过的时间，
/// 归零时触发并重新以间隔秒数计时（不累计超出部分）。
#[derive(Debug, Default)]
pub struct IntervalTimers {
    timers: BTreeMap<String, IntervalTimer>,
}

impl IntervalTimers {
    pub fn from_registry(registry: &JobRegistry, now: DateTime<Utc>) -> Self {
        let mut timers = Self::default();
        for registered in registry.cron_jobs() {
            let definition = &registered.definition;
            if !definition.enabled {
                continue;
            }
            if let Schedule::Interval(seconds) = definition.schedule {
                timers.insert(&definition.name, seconds, now);
            }
        }
        timers
    }

    pub fn insert(&mut self, name: &str, interval_seconds: u64, now: DateTime<Utc>) {
        self.timers.insert(
            name.to_string(),
            IntervalTimer {
                interval_seconds,
                remaining_seconds: interval_seconds as i64,
                next: now + Duration::seconds(interval_seconds as i64),
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// 推进所有计时器，返回本次到期的作业名
    pub fn advance(&mut self, elapsed_seconds: u64, now: DateTime<Utc>) -> Vec<String> {
        let mut fired = Vec::new();
        for (name, timer) in self.timers.iter_mut() {
            timer.remaining_seconds -= elapsed_seconds as i64;
            if timer.remaining_seconds <= 0 {
                timer.remaining_seconds = timer.interval_seconds as i64;
                fired.push(name.clone());
            }
            timer.next = now + Duration::seconds(timer.remaining_seconds);
        }
        fired
    }

    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.timers.get(name).map(|t| t.next)
    }
}
