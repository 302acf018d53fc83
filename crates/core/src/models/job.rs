use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 定时作业的调度方式
///
/// 纯数字（包括数字字符串）表示以秒为单位的固定间隔，由计时器路径驱动；
/// 其余内容按 cron 表达式或别名处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Interval(u64),
    Expression(String),
}

impl Schedule {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u64>() {
            Ok(seconds) if seconds > 0 => Schedule::Interval(seconds),
            _ => Schedule::Expression(trimmed.to_string()),
        }
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, Schedule::Interval(_))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval(seconds) => write!(f, "{seconds} second"),
            Schedule::Expression(expr) => f.write_str(expr),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScheduleRepr {
    Seconds(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ScheduleRepr::deserialize(deserializer)? {
            ScheduleRepr::Seconds(0) => Err(serde::de::Error::custom("间隔秒数必须大于0")),
            ScheduleRepr::Seconds(seconds) => Ok(Schedule::Interval(seconds)),
            ScheduleRepr::Text(text) => Ok(Schedule::parse(&text)),
        }
    }
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Schedule::Interval(seconds) => serializer.serialize_u64(*seconds),
            Schedule::Expression(expr) => serializer.serialize_str(expr),
        }
    }
}

/// 定时作业定义，注册后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobDefinition {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "time")]
    pub schedule: Schedule,
}

impl CronJobDefinition {
    pub fn new(name: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            schedule,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 单次调度评估的结果，每个 tick 重新计算，不回写到定义上
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CronEvaluation {
    pub is_due: bool,
    pub next: Option<DateTime<Utc>>,
}

impl CronEvaluation {
    pub fn not_due() -> Self {
        Self {
            is_due: false,
            next: None,
        }
    }
}

/// 常驻进程作业定义
///
/// `restart` 在每次作业体返回后读取一次，整个生命周期内固定不变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessJobDefinition {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub restart: bool,
    #[serde(default = "default_restart_delay")]
    pub restart_delay_seconds: u64,
}

impl ProcessJobDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            restart: false,
            restart_delay_seconds: default_restart_delay(),
        }
    }

    pub fn with_restart(mut self, delay_seconds: u64) -> Self {
        self.restart = true;
        self.restart_delay_seconds = delay_seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_enabled() -> bool {
    true
}

fn default_restart_delay() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_parse() {
        assert_eq!(Schedule::parse("300"), Schedule::Interval(300));
        assert_eq!(Schedule::parse(" 15 "), Schedule::Interval(15));
        assert_eq!(
            Schedule::parse("*/5 * * * *"),
            Schedule::Expression("*/5 * * * *".to_string())
        );
        // 0 不是合法间隔，按表达式处理并在评估时报错
        assert_eq!(Schedule::parse("0"), Schedule::Expression("0".to_string()));
    }

    #[test]
    fn test_schedule_deserialize_number_or_string() {
        let def: CronJobDefinition =
            serde_json::from_str(r#"{"name":"cleanup","time":60}"#).unwrap();
        assert_eq!(def.schedule, Schedule::Interval(60));
        assert!(def.enabled);

        let def: CronJobDefinition =
            serde_json::from_str(r#"{"name":"report","enabled":false,"time":"@EveryMinute5"}"#)
                .unwrap();
        assert_eq!(def.schedule, Schedule::Expression("@EveryMinute5".to_string()));
        assert!(!def.enabled);

        let def: CronJobDefinition =
            serde_json::from_str(r#"{"name":"sync","time":"120"}"#).unwrap();
        assert_eq!(def.schedule, Schedule::Interval(120));

        assert!(serde_json::from_str::<CronJobDefinition>(r#"{"name":"x","time":0}"#).is_err());
    }

    #[test]
    fn test_schedule_display() {
        assert_eq!(Schedule::Interval(30).to_string(), "30 second");
        assert_eq!(
            Schedule::Expression("0 * * * *".to_string()).to_string(),
            "0 * * * *"
        );
    }

    #[test]
    fn test_process_definition_defaults() {
        let def: ProcessJobDefinition = serde_json::from_str(r#"{"name":"listener"}"#).unwrap();
        assert!(def.enabled);
        assert!(!def.restart);
        assert_eq!(def.restart_delay_seconds, 5);

        let def = ProcessJobDefinition::new("listener").with_restart(10);
        assert!(def.restart);
        assert_eq!(def.restart_delay_seconds, 10);
    }
}
