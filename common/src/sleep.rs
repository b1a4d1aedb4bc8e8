use chrono::{DateTime, FixedOffset};

use crate::{
    cooling::CoolingPolicy,
    error::ClimateError,
    policy::{ControlInput, ControlPolicy},
    types::{ClimateAction, Location, Profile, Switch},
    warmup::{default_alarm, WarmupCurve},
};

/// Night profile for the bedroom: holds the evening setpoint, then steps up
/// to the morning setpoint ahead of the wake-up alarm.
#[derive(Debug, Clone, Default)]
pub struct SleepPolicy {
    alarm_at: Option<DateTime<FixedOffset>>,
    exclusive_with: Option<String>,
}

impl SleepPolicy {
    pub fn new(exclusive_with: Option<String>) -> Self {
        Self {
            alarm_at: None,
            exclusive_with,
        }
    }

    pub fn target_for(&self, input: &ControlInput<'_>) -> f64 {
        let settings = input.settings;
        let now_time = input.now.time();

        if now_time >= input.config.evening_start() || now_time < settings.warmup_time {
            return settings.evening_temp;
        }

        let alarm_at = self
            .alarm_at
            .unwrap_or_else(|| default_alarm(input.now, input.config.default_alarm_hour));
        WarmupCurve::from_settings(settings).target_at(input.now, alarm_at)
    }

    fn cool_or_heat(
        &self,
        cooling: &mut CoolingPolicy,
        input: &ControlInput<'_>,
        current: f64,
        target: f64,
        actions: &mut Vec<ClimateAction>,
    ) -> Result<(), ClimateError> {
        let diff = current - target;

        if diff.abs() < input.settings.variability_threshold {
            cooling.stop_cooling(input, actions);
        } else if diff > 0.0 {
            cooling.start_cooling(input, actions)?;
        } else {
            cooling.stop_cooling(input, actions);
            actions.push(ClimateAction::SetBedroomHeater(Switch::On));
        }
        Ok(())
    }
}

impl ControlPolicy for SleepPolicy {
    fn profile(&self) -> Profile {
        Profile::Sleep
    }

    fn rooms(&self) -> &[Location] {
        &[Location::Bedroom]
    }

    fn uses_alarm(&self) -> bool {
        true
    }

    fn set_alarm(&mut self, alarm_at: DateTime<FixedOffset>) {
        self.alarm_at = Some(alarm_at);
    }

    fn alarm(&self) -> Option<DateTime<FixedOffset>> {
        self.alarm_at
    }

    fn on_session_start(
        &mut self,
        cooling: &mut CoolingPolicy,
        input: &ControlInput<'_>,
    ) -> Result<Vec<ClimateAction>, ClimateError> {
        let mut actions = Vec::new();
        cooling.start_cooling(input, &mut actions)?;
        if let Some(entity) = &self.exclusive_with {
            actions.push(ClimateAction::DeactivateController(entity.clone()));
        }
        Ok(actions)
    }

    fn loop_logic(
        &mut self,
        cooling: &mut CoolingPolicy,
        input: &ControlInput<'_>,
    ) -> Result<Vec<ClimateAction>, ClimateError> {
        let current = input.room_temp(Location::Bedroom)?;
        let target = self.target_for(input);

        let mut actions = Vec::new();
        self.cool_or_heat(cooling, input, current, target, &mut actions)?;
        Ok(actions)
    }
}
