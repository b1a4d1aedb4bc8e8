//! Morning warmup: a stepped setpoint curve ending at the next alarm, and
//! the bounded lookup that finds that alarm.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta};

use crate::{config::ClimateConfig, settings::SettingsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmupCurve {
    pub evening_temp: f64,
    pub morning_temp: f64,
    pub cycles: f64,
    pub warmup_time: NaiveTime,
}

impl WarmupCurve {
    pub fn from_settings(settings: &SettingsSnapshot) -> Self {
        Self {
            evening_temp: settings.evening_temp,
            morning_temp: settings.morning_temp,
            cycles: settings.warmup_cycles,
            warmup_time: settings.warmup_time,
        }
    }

    /// Today's warmup start in the offset of `now`.
    pub fn warmup_start(&self, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        now.date_naive()
            .and_time(self.warmup_time)
            .and_local_timezone(*now.offset())
            .single()
    }

    /// The setpoint moves in whole cycles so it does not change every tick.
    pub fn target_at(&self, now: DateTime<FixedOffset>, alarm_at: DateTime<FixedOffset>) -> f64 {
        if now >= alarm_at {
            return self.morning_temp;
        }

        let Some(start) = self.warmup_start(now) else {
            return self.morning_temp;
        };

        let window_secs = seconds(alarm_at - start);
        if window_secs <= 0.0 || !self.cycles.is_finite() || self.cycles <= 0.0 {
            return self.morning_temp;
        }

        let elapsed_fraction = (seconds(now - start) / window_secs).clamp(0.0, 1.0);
        let current_cycle = (elapsed_fraction * self.cycles).floor();
        let cycle_fraction = (current_cycle / self.cycles).min(1.0);

        self.evening_temp + (self.morning_temp - self.evening_temp) * cycle_fraction
    }
}

fn seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1_000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmProblem {
    Unavailable,
    TooFarAhead,
}

impl AlarmProblem {
    fn describe(self) -> &'static str {
        match self {
            Self::Unavailable => "No alarm set",
            Self::TooFarAhead => "Next alarm is implausibly far away",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlarmStep {
    Resolved(DateTime<FixedOffset>),
    Retry {
        delay: Duration,
        notice: Option<String>,
    },
    Fallback {
        alarm_at: DateTime<FixedOffset>,
        notice: Option<String>,
    },
}

/// Bounded retry around the next-alarm lookup. Feed it one observation per
/// attempt until it returns `Resolved` or `Fallback`.
#[derive(Debug, Clone)]
pub struct AlarmResolver {
    max_retries: u32,
    retry_delay: Duration,
    default_hour: u32,
    horizon: TimeDelta,
    failures: u32,
}

impl AlarmResolver {
    pub fn new(config: &ClimateConfig) -> Self {
        Self {
            max_retries: config.max_alarm_retries,
            retry_delay: Duration::from_secs(config.alarm_retry_delay_secs),
            default_hour: config.default_alarm_hour,
            horizon: TimeDelta::hours(config.max_alarm_horizon_hours),
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn observe(&mut self, raw: Option<&str>, now: DateTime<FixedOffset>) -> AlarmStep {
        let problem = match parse_alarm(raw, now, self.horizon) {
            Ok(alarm_at) => return AlarmStep::Resolved(alarm_at),
            Err(problem) => problem,
        };

        self.failures += 1;
        let notice = (self.failures == 1).then(|| {
            format!(
                "{}, retrying {} times before using default {}:00",
                problem.describe(),
                self.max_retries,
                self.default_hour
            )
        });

        if self.failures > self.max_retries {
            AlarmStep::Fallback {
                alarm_at: default_alarm(now, self.default_hour),
                notice,
            }
        } else {
            AlarmStep::Retry {
                delay: self.retry_delay,
                notice,
            }
        }
    }
}

pub fn parse_alarm(
    raw: Option<&str>,
    now: DateTime<FixedOffset>,
    horizon: TimeDelta,
) -> Result<DateTime<FixedOffset>, AlarmProblem> {
    let alarm_at = raw
        .map(str::trim)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|alarm| alarm.with_timezone(now.offset()))
        .ok_or(AlarmProblem::Unavailable)?;

    if alarm_at - now > horizon {
        return Err(AlarmProblem::TooFarAhead);
    }
    Ok(alarm_at)
}

/// `hour`:00 today in the offset of `now`.
pub fn default_alarm(now: DateTime<FixedOffset>, hour: u32) -> DateTime<FixedOffset> {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .and_then(|time| {
            now.date_naive()
                .and_time(time)
                .and_local_timezone(*now.offset())
                .single()
        })
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn local(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 10, day, hour, minute, 0)
            .unwrap()
    }

    fn curve() -> WarmupCurve {
        WarmupCurve {
            evening_temp: 20.0,
            morning_temp: 22.0,
            cycles: 4.0,
            warmup_time: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
        }
    }

    #[test]
    fn one_hour_into_four_hour_window_is_first_step() {
        let alarm = local(17, 7, 0);
        assert_eq!(curve().target_at(local(17, 4, 0), alarm), 20.5);
    }

    #[test]
    fn starts_at_evening_and_ends_at_morning() {
        let alarm = local(17, 7, 0);
        assert_eq!(curve().target_at(local(17, 3, 0), alarm), 20.0);
        assert_eq!(curve().target_at(alarm, alarm), 22.0);
        assert_eq!(curve().target_at(local(17, 8, 30), alarm), 22.0);
    }

    #[test]
    fn steps_are_monotonic_within_window() {
        let alarm = local(17, 7, 0);
        let mut previous = f64::MIN;
        for minute in 0..=240 {
            let now = local(17, 3, 0) + TimeDelta::minutes(minute);
            let target = curve().target_at(now, alarm);
            assert!(target >= previous);
            previous = target;
        }
        assert_eq!(curve().target_at(local(17, 6, 59), alarm), 21.5);
    }

    #[test]
    fn fractional_cycle_count_is_used_as_configured() {
        let alarm = local(17, 7, 0);
        let curve = WarmupCurve {
            cycles: 2.5,
            ..curve()
        };

        let target = curve.target_at(local(17, 5, 0), alarm);
        assert!((target - 20.8).abs() < 1e-9, "target was {target}");
    }

    #[test]
    fn non_positive_cycle_count_returns_morning_target() {
        let alarm = local(17, 7, 0);
        for cycles in [0.0, -1.0, f64::NAN] {
            let curve = WarmupCurve { cycles, ..curve() };
            assert_eq!(curve.target_at(local(17, 4, 0), alarm), 22.0);
        }
    }

    #[test]
    fn inverted_window_returns_morning_target() {
        let alarm = local(17, 2, 0);
        assert_eq!(curve().target_at(local(17, 1, 0), alarm), 22.0);
    }

    #[test]
    fn resolver_accepts_alarm_within_horizon() {
        let mut resolver = AlarmResolver::new(&ClimateConfig::default());
        let now = local(16, 23, 0);

        let step = resolver.observe(Some("2026-10-17T04:30:00+00:00"), now);

        assert_eq!(step, AlarmStep::Resolved(local(17, 6, 30)));
        assert_eq!(resolver.failures(), 0);
    }

    #[test]
    fn resolver_retries_then_falls_back_to_default_hour() {
        let config = ClimateConfig::default();
        let mut resolver = AlarmResolver::new(&config);
        let now = local(16, 23, 0);

        let first = resolver.observe(Some("unavailable"), now);
        let AlarmStep::Retry { delay, notice } = first else {
            panic!("expected retry, got {first:?}");
        };
        assert_eq!(delay, Duration::from_secs(5));
        assert!(notice.unwrap().starts_with("No alarm set"));

        for _ in 1..config.max_alarm_retries {
            assert_eq!(
                resolver.observe(None, now),
                AlarmStep::Retry {
                    delay: Duration::from_secs(5),
                    notice: None,
                }
            );
        }

        assert_eq!(
            resolver.observe(None, now),
            AlarmStep::Fallback {
                alarm_at: local(16, 9, 0),
                notice: None,
            }
        );
        assert_eq!(resolver.failures(), config.max_alarm_retries + 1);
    }

    #[test]
    fn alarm_far_ahead_is_rejected() {
        let now = local(16, 8, 0);
        let result = parse_alarm(
            Some("2026-10-17T06:00:00+02:00"),
            now,
            TimeDelta::hours(12),
        );
        assert_eq!(result, Err(AlarmProblem::TooFarAhead));
    }
}
