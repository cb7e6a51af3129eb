use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;

use super::SchedulerError;

/// When a job fires.
///
/// Accepted forms:
/// - 5-field cron, `min hour dom month dow` (`*/10 * * * *`)
/// - 6/7-field cron with leading seconds (and trailing year)
/// - `@every <n><ms|s|m|h>` fixed interval (`@every 30s`)
#[derive(Debug, Clone)]
pub struct Schedule {
    expr: String,
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let expr = expr.trim();
        let invalid = |reason: String| SchedulerError::InvalidSchedule { expr: expr.to_string(), reason };

        if let Some(rest) = expr.strip_prefix("@every") {
            let every = parse_interval(rest.trim()).map_err(invalid)?;
            return Ok(Self { expr: expr.to_string(), kind: Kind::Every(every) });
        }

        let normalized = match expr.split_whitespace().count() {
            5 => format!("0 {expr}"),
            6 | 7 => expr.to_string(),
            n => return Err(invalid(format!("expected 5, 6 or 7 fields, got {n}"))),
        };
        let cron = cron::Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { expr: expr.to_string(), kind: Kind::Cron(Box::new(cron)) })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Time to wait from `now` until the next firing. `None` when a cron
    /// expression has no future occurrence.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match &self.kind {
            Kind::Every(d) => Some(*d),
            Kind::Cron(cron) => {
                let next = cron.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expr)
    }
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("interval '{s}' must start with a whole number"))?;
    if n == 0 {
        return Err("interval must be positive".to_string());
    }
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("unknown interval unit '{other}' (use ms, s, m or h)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_cron() {
        let s = Schedule::parse("*/10 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 3, 30).unwrap();
        assert_eq!(s.next_delay(now), Some(Duration::from_secs(6 * 60 + 30)));
        assert_eq!(s.as_str(), "*/10 * * * *");
    }

    #[test]
    fn test_six_field_cron_with_seconds() {
        let s = Schedule::parse("*/15 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 1).unwrap();
        assert_eq!(s.next_delay(now), Some(Duration::from_secs(14)));
    }

    #[test]
    fn test_every() {
        assert_eq!(Schedule::parse("@every 30s").unwrap().next_delay(Utc::now()), Some(Duration::from_secs(30)));
        assert_eq!(Schedule::parse("@every 250ms").unwrap().next_delay(Utc::now()), Some(Duration::from_millis(250)));
        assert_eq!(Schedule::parse("@every 2h").unwrap().next_delay(Utc::now()), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "every 5m", "@every", "@every 0s", "@every 5d", "* * *", "61 * * * *", "a b c d e"] {
            assert!(
                matches!(Schedule::parse(bad), Err(SchedulerError::InvalidSchedule { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
