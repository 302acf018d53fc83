use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use cron::Schedule as CronSchedule;
use tracing::debug;

use orchestrator_core::{CronEvaluation, Result, Schedule, SchedulerError};

/// 预置别名，查找时不区分大小写
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("@everyminute", "* * * * *"),
    ("@everyminute5", "*/5 * * * *"),
    ("@everyminute10", "*/10 * * * *"),
    ("@everyminute15", "*/15 * * * *"),
    ("@everyminute30", "*/30 * * * *"),
    ("every minute", "* * * * *"),
    ("every 5 minutes", "*/5 * * * *"),
    ("every 10 minutes", "*/10 * * * *"),
    ("every 15 minutes", "*/15 * * * *"),
    ("every 30 minutes", "*/30 * * * *"),
];

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// 解析后的调度表达式
#[derive(Debug, Clone)]
pub struct NormalizedExpression {
    source: String,
    expression: String,
    schedule: CronSchedule,
}

impl NormalizedExpression {
    /// 用户写下的原始表达式
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 交给 cron 解析器的带秒字段表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 当前时间截断到分钟后，该分钟内是否存在触发点
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let minute = truncate_to_minute(now);
        self.schedule
            .after(&(minute - Duration::seconds(1)))
            .next()
            .is_some_and(|t| t < minute + Duration::minutes(1))
    }

    /// 严格晚于 now 的下一次触发时间
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }
}

/// 调度表达式解析器
///
/// 支持五段式 cron 表达式（分 时 日 月 周）、带秒的六/七段式表达式、
/// cron 解析器自带的 `@hourly` 等写法，以及别名表中的别名。
/// 未知别名按字面表达式处理，格式错误时在评估阶段返回 `InvalidSchedule`。
#[derive(Debug, Clone)]
pub struct ScheduleResolver {
    aliases: HashMap<String, String>,
}

impl Default for ScheduleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleResolver {
    pub fn new() -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(alias, expr)| (alias.to_string(), expr.to_string()))
            .collect();
        Self { aliases }
    }

    pub fn with_alias(mut self, alias: &str, expression: &str) -> Self {
        self.aliases
            .insert(alias.trim().to_lowercase(), expression.to_string());
        self
    }

    /// 别名展开，未命中时原样返回
    pub fn expand_alias<'a>(&'a self, expression: &'a str) -> &'a str {
        self.aliases
            .get(&expression.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(expression)
    }

    pub fn resolve(&self, expression: &str) -> Result<NormalizedExpression> {
        let expanded = self.expand_alias(expression).trim();
        let normalized = normalize_fields(expanded).ok_or_else(|| SchedulerError::InvalidSchedule {
            expr: expression.to_string(),
            message: "表达式必须是5、6或7段".to_string(),
        })?;

        let schedule =
            CronSchedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidSchedule {
                expr: expression.to_string(),
                message: e.to_string(),
            })?;

        debug!("调度表达式 '{}' 解析为 '{}'", expression, normalized);
        Ok(NormalizedExpression {
            source: expression.to_string(),
            expression: normalized,
            schedule,
        })
    }

    pub fn is_due(&self, expression: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.resolve(expression)?.is_due(now))
    }

    pub fn next_run(&self, expression: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.resolve(expression)?
            .next_after(now)
            .ok_or_else(|| SchedulerError::InvalidSchedule {
                expr: expression.to_string(),
                message: "没有后续触发时间".to_string(),
            })
    }

    /// 评估一个作业的调度状态
    ///
    /// 间隔型调度由调用方的计时器路径负责，这里总是返回未到期。
    pub fn evaluate(&self, schedule: &Schedule, now: DateTime<Utc>) -> Result<CronEvaluation> {
        match schedule {
            Schedule::Interval(_) => Ok(CronEvaluation::not_due()),
            Schedule::Expression(expr) => {
                let normalized = self.resolve(expr)?;
                Ok(CronEvaluation {
                    is_due: normalized.is_due(now),
                    next: normalized.next_after(now),
                })
            }
        }
    }

    /// 验证表达式是否有效
    pub fn validate(&self, expression: &str) -> Result<()> {
        self.resolve(expression).map(|_| ())
    }
}

pub fn truncate_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::minutes(1)).unwrap_or(now)
}

fn normalize_fields(expression: &str) -> Option<String> {
    if expression.starts_with('@') {
        return Some(expression.to_string());
    }

    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => {
            let day_of_week = translate_day_of_week(fields[4]);
            Some(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            ))
        }
        6 | 7 => Some(fields.join(" ")),
        _ => None,
    }
}

/// 五段式的星期字段 0/7 表示周日，cron 解析器使用 1-7 且 1 为周日，统一转成英文缩写
fn translate_day_of_week(field: &str) -> String {
    let parts: Vec<String> = field.split(',').map(translate_day_part).collect();
    if parts.iter().any(|part| part == "*") {
        return "*".to_string();
    }
    parts.join(",")
}

fn translate_day_part(part: &str) -> String {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };
    let bounds: Vec<&str> = range.split('-').collect();
    if let [start, "7"] = bounds.as_slice() {
        if let Some(days) = expand_to_sunday(start, step) {
            return days;
        }
    }

    let translated = bounds
        .iter()
        .map(|b| day_name(b))
        .collect::<Vec<_>>()
        .join("-");
    match step {
        Some(step) => format!("{translated}/{step}"),
        None => translated,
    }
}

/// 以 7 结尾的范围翻译后会变成 `X-SUN` 这样的反向区间，改写为不跨周的形式
fn expand_to_sunday(start: &str, step: Option<&str>) -> Option<String> {
    let start = start.parse::<usize>().ok().filter(|n| *n <= 7)?;
    let step = match step {
        Some(step) => step.parse::<usize>().ok().filter(|n| *n > 0)?,
        None => 1,
    };

    if step == 1 {
        match start {
            0 => return Some("*".to_string()),
            1..=6 => return Some(format!("{}-SAT,SUN", DAY_NAMES[start])),
            _ => {}
        }
    }

    let mut days: Vec<&str> = Vec::new();
    for n in (start..=7).step_by(step) {
        let name = DAY_NAMES[n % 7];
        if !days.contains(&name) {
            days.push(name);
        }
    }
    Some(days.join(","))
}

fn day_name(value: &str) -> String {
    match value.parse::<usize>() {
        Ok(n) if n <= 7 => DAY_NAMES[n % 7].to_string(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_five_fields() {
        assert_eq!(
            normalize_fields("*/5 * * * *").as_deref(),
            Some("0 */5 * * * *")
        );
        assert_eq!(
            normalize_fields("0 9 * * 1-5").as_deref(),
            Some("0 0 9 * * MON-FRI")
        );
        assert_eq!(
            normalize_fields("0 0 1 1 * 2030").as_deref(),
            Some("0 0 1 1 * 2030")
        );
        assert_eq!(normalize_fields("@daily").as_deref(), Some("@daily"));
        assert_eq!(normalize_fields("* *"), None);
    }

    #[test]
    fn test_translate_day_of_week() {
        assert_eq!(translate_day_of_week("0"), "SUN");
        assert_eq!(translate_day_of_week("7"), "SUN");
        assert_eq!(translate_day_of_week("0,6"), "SUN,SAT");
        assert_eq!(translate_day_of_week("5-7"), "FRI-SAT,SUN");
        assert_eq!(translate_day_of_week("7-7"), "SUN");
        assert_eq!(translate_day_of_week("1-5,7"), "MON-FRI,SUN");
        assert_eq!(translate_day_of_week("*/2"), "*/2");
        assert_eq!(translate_day_of_week("MON-FRI"), "MON-FRI");
        assert_eq!(translate_day_of_week("*"), "*");
    }

    #[test]
    fn test_translate_ranges_through_seven() {
        assert_eq!(translate_day_of_week("0-7"), "*");
        assert_eq!(translate_day_of_week("1,0-7"), "*");
        assert_eq!(translate_day_of_week("3-7/2"), "WED,FRI,SUN");
        assert_eq!(translate_day_of_week("0-7/2"), "SUN,TUE,THU,SAT");
        assert_eq!(translate_day_of_week("0-7/7"), "SUN");
        assert_eq!(translate_day_of_week("1-5/2"), "MON-FRI/2");
    }

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let resolver = ScheduleResolver::new();
        assert_eq!(resolver.expand_alias("@EveryMinute5"), "*/5 * * * *");
        assert_eq!(resolver.expand_alias("Every 5 Minutes"), "*/5 * * * *");
        assert_eq!(resolver.expand_alias("0 * * * *"), "0 * * * *");

        let resolver = resolver.with_alias("@Nightly", "0 3 * * *");
        assert_eq!(resolver.expand_alias("@nightly"), "0 3 * * *");
    }
}
