use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{
    models::{CronJobDefinition, ProcessJobDefinition},
    traits::{CronJob, ProcessJob, TaskHandler},
    Result, SchedulerError,
};

#[derive(Clone)]
pub struct RegisteredCronJob {
    pub definition: CronJobDefinition,
    pub job: Arc<dyn CronJob>,
}

#[derive(Clone)]
pub struct RegisteredProcessJob {
    pub definition: ProcessJobDefinition,
    pub job: Arc<dyn ProcessJob>,
}

/// 启动时一次性构建的作业注册表，构建后只读
///
/// 各组件通过 `Arc<JobRegistry>` 共享同一份注册表。
#[derive(Default)]
pub struct JobRegistry {
    cron: BTreeMap<String, RegisteredCronJob>,
    process: BTreeMap<String, RegisteredProcessJob>,
    tasks: HashMap<String, Arc<dyn TaskHandler>>,
}

impl JobRegistry {
    pub fn builder() -> JobRegistryBuilder {
        JobRegistryBuilder::default()
    }

    pub fn cron_jobs(&self) -> impl Iterator<Item = &RegisteredCronJob> {
        self.cron.values()
    }

    pub fn cron_job(&self, name: &str) -> Option<&RegisteredCronJob> {
        self.cron.get(name)
    }

    pub fn process_jobs(&self) -> impl Iterator<Item = &RegisteredProcessJob> {
        self.process.values()
    }

    pub fn process_job(&self, name: &str) -> Option<&RegisteredProcessJob> {
        self.process.get(name)
    }

    pub fn task_handler(&self, task: &str) -> Option<Arc<dyn TaskHandler>> {
        self.tasks.get(task).cloned()
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.cron.is_empty() && self.process.is_empty() && self.tasks.is_empty()
    }
}

#[derive(Default)]
pub struct JobRegistryBuilder {
    cron: BTreeMap<String, RegisteredCronJob>,
    process: BTreeMap<String, RegisteredProcessJob>,
    tasks: HashMap<String, Arc<dyn TaskHandler>>,
    duplicates: Vec<String>,
}

impl JobRegistryBuilder {
    pub fn cron(mut self, definition: CronJobDefinition, job: impl CronJob + 'static) -> Self {
        self.add_cron(definition, Arc::new(job));
        self
    }

    pub fn add_cron(&mut self, definition: CronJobDefinition, job: Arc<dyn CronJob>) {
        let name = definition.name.clone();
        if self
            .cron
            .insert(name.clone(), RegisteredCronJob { definition, job })
            .is_some()
        {
            self.duplicates.push(format!("cron:{name}"));
        }
    }

    pub fn process(
        mut self,
        definition: ProcessJobDefinition,
        job: impl ProcessJob + 'static,
    ) -> Self {
        self.add_process(definition, Arc::new(job));
        self
    }

    pub fn add_process(&mut self, definition: ProcessJobDefinition, job: Arc<dyn ProcessJob>) {
        let name = definition.name.clone();
        if self
            .process
            .insert(name.clone(), RegisteredProcessJob { definition, job })
            .is_some()
        {
            self.duplicates.push(format!("process:{name}"));
        }
    }

    pub fn task(mut self, name: impl Into<String>, handler: impl TaskHandler + 'static) -> Self {
        self.add_task(name, Arc::new(handler));
        self
    }

    pub fn add_task(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let name = name.into();
        if self.tasks.insert(name.clone(), handler).is_some() {
            self.duplicates.push(format!("task:{name}"));
        }
    }

    pub fn build(self) -> Result<JobRegistry> {
        if !self.duplicates.is_empty() {
            return Err(SchedulerError::Configuration(format!(
                "重复注册的作业: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(JobRegistry {
            cron: self.cron,
            process: self.process,
            tasks: self.tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Schedule;
    use crate::traits::{handler_fn, job_fn};

    #[test]
    fn test_registry_lookup() {
        let registry = JobRegistry::builder()
            .cron(
                CronJobDefinition::new("b_report", Schedule::parse("@EveryMinute")),
                job_fn(|| async { Ok(()) }),
            )
            .cron(
                CronJobDefinition::new("a_cleanup", Schedule::Interval(30)),
                job_fn(|| async { Ok(()) }),
            )
            .process(ProcessJobDefinition::new("listener"), job_fn(|| async { Ok(()) }))
            .task("send_mail", handler_fn(|_| async { Ok(()) }))
            .build()
            .unwrap();

        let names: Vec<_> = registry.cron_jobs().map(|j| j.definition.name.as_str()).collect();
        assert_eq!(names, vec!["a_cleanup", "b_report"]);
        assert!(registry.process_job("listener").is_some());
        assert!(registry.process_job("missing").is_none());
        assert!(registry.task_handler("send_mail").is_some());
        assert!(registry.task_handler("unknown").is_none());
        assert_eq!(registry.task_names(), vec!["send_mail".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = JobRegistry::builder()
            .task("dup", handler_fn(|_| async { Ok(()) }))
            .task("dup", handler_fn(|_| async { Ok(()) }))
            .build();
        assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    }
}
