use crate::{
    error::ClimateError,
    fan_runtime::FanRuntimeAccountant,
    freeze::{FreezeDefrostDetector, FreezeThresholds, FreezeVerdict},
    policy::ControlInput,
    types::{AcMode, ClimateAction, Switch},
};

/// Why `start_cooling` ran the AC as a plain fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanFallback {
    CompressorDisabled,
    TooColdOutside,
    DisabledAndTooCold,
    Defrosting,
}

impl FanFallback {
    pub fn describe(self) -> &'static str {
        match self {
            Self::CompressorDisabled => "compressor disabled in settings",
            Self::TooColdOutside => "too cold outside to run compressor",
            Self::DisabledAndTooCold => {
                "compressor disabled in settings and too cold outside to run it"
            }
            Self::Defrosting => "compressor defrosting",
        }
    }
}

/// Compressor, fan and heater actuation shared by every profile.
#[derive(Debug, Clone, Default)]
pub struct CoolingPolicy {
    is_cooling: bool,
    fans_active: bool,
    last_fallback: Option<FanFallback>,
    fan_runtime: FanRuntimeAccountant,
    freeze: FreezeDefrostDetector,
}

impl CoolingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cooling(&self) -> bool {
        self.is_cooling
    }

    pub fn fans_active(&self) -> bool {
        self.fans_active
    }

    pub fn last_fallback(&self) -> Option<FanFallback> {
        self.last_fallback
    }

    pub fn fan_runtime(&self) -> &FanRuntimeAccountant {
        &self.fan_runtime
    }

    pub fn freeze(&self) -> &FreezeDefrostDetector {
        &self.freeze
    }

    /// Returns the minutes run in the previous hour when an hour boundary
    /// was crossed.
    pub fn update_fan_runtime(
        &mut self,
        now_hour: u32,
        polling_interval_secs: f64,
    ) -> Option<f64> {
        self.fan_runtime
            .update(now_hour, self.fans_active, polling_interval_secs)
    }

    pub fn start_cooling(
        &mut self,
        input: &ControlInput<'_>,
        actions: &mut Vec<ClimateAction>,
    ) -> Result<(), ClimateError> {
        self.is_cooling = true;
        self.fans_active = true;

        let too_cold = input.too_cold_for_compressor();
        let disabled = input.settings.compressor_disabled;

        self.last_fallback = match (disabled, too_cold) {
            (false, false) => None,
            (true, false) => Some(FanFallback::CompressorDisabled),
            (false, true) => Some(FanFallback::TooColdOutside),
            (true, true) => Some(FanFallback::DisabledAndTooCold),
        };

        if self.last_fallback.is_none() {
            let thresholds = freeze_thresholds(input);
            let verdict = self.freeze.check_for_freeze(
                input.ac_power_draw_w,
                input.polling_interval_secs(),
                &thresholds,
            )?;

            if verdict == FreezeVerdict::DefrostStarted {
                actions.push(ClimateAction::Notify {
                    title: input.config.notification_title.clone(),
                    message: format!(
                        "Compressor icing suspected, defrosting for {} min",
                        input.settings.defrost_cycle_minutes
                    ),
                });
            }

            if verdict.is_freeze_active() {
                self.last_fallback = Some(FanFallback::Defrosting);
                actions.push(ClimateAction::SetAcMode(AcMode::Fan));
                actions.push(ClimateAction::SetExternalFan(Switch::On));
                return Ok(());
            }

            actions.push(ClimateAction::SetAcMode(AcMode::Cool));
        } else {
            actions.push(ClimateAction::SetAcMode(AcMode::Fan));
        }

        self.handle_external_fan(input, actions);
        actions.push(ClimateAction::SetBedroomHeater(Switch::Off));
        Ok(())
    }

    pub fn stop_cooling(&mut self, input: &ControlInput<'_>, actions: &mut Vec<ClimateAction>) {
        self.is_cooling = false;
        self.last_fallback = None;

        if input.settings.min_fan_minutes_per_hour > self.fan_runtime.minutes_this_hour() {
            actions.push(ClimateAction::SetAcMode(AcMode::Fan));
            self.fans_active = true;
        } else {
            actions.push(ClimateAction::SetAcMode(AcMode::Off));
            self.fans_active = false;
        }

        actions.push(ClimateAction::SetExternalFan(Switch::Off));
    }

    /// Also runs on every AC power-draw change, outside the tick cadence.
    /// Leaves the fan untouched while defrosting.
    pub fn handle_external_fan(
        &self,
        input: &ControlInput<'_>,
        actions: &mut Vec<ClimateAction>,
    ) -> Option<Switch> {
        let decision = if !input.active {
            Switch::Off
        } else if self.freeze.is_defrosting() {
            return None;
        } else if !self.is_cooling || input.settings.external_fan_disabled {
            Switch::Off
        } else if input.too_cold_for_compressor() || input.settings.compressor_disabled {
            Switch::On
        } else if input.ac_power_draw_w > input.config.compressor_running_draw_w {
            Switch::On
        } else {
            Switch::Off
        };

        actions.push(ClimateAction::SetExternalFan(decision));
        Some(decision)
    }

    /// Controller switched off: everything stops immediately.
    pub fn deactivate(&mut self, actions: &mut Vec<ClimateAction>) {
        self.is_cooling = false;
        self.fans_active = false;
        self.last_fallback = None;
        actions.push(ClimateAction::SetExternalFan(Switch::Off));
        actions.push(ClimateAction::SetAcMode(AcMode::Off));
    }
}

fn freeze_thresholds(input: &ControlInput<'_>) -> FreezeThresholds {
    FreezeThresholds {
        running_draw_w: input.config.compressor_running_draw_w,
        low_draw_w: input.config.low_draw_w,
        max_low_draw_secs: input.settings.compressor_max_low_draw_secs,
        defrost_cycle_secs: input.settings.defrost_cycle_minutes * 60.0,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::ClimateConfig, settings::SettingsSnapshot};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 7, 1, 14, 0, 0)
            .unwrap()
    }

    fn input<'a>(
        settings: &'a SettingsSnapshot,
        config: &'a ClimateConfig,
        outside_temp: f64,
        draw: f64,
    ) -> ControlInput<'a> {
        ControlInput {
            now: now(),
            active: true,
            settings,
            config,
            outside_temp,
            ac_power_draw_w: draw,
            room_temps: &[],
        }
    }

    #[test]
    fn start_cooling_runs_compressor_when_warm_and_healthy() {
        let settings = SettingsSnapshot::default();
        let config = ClimateConfig::default();
        let mut cooling = CoolingPolicy::new();
        let mut actions = Vec::new();

        cooling
            .start_cooling(&input(&settings, &config, 25.0, 900.0), &mut actions)
            .unwrap();

        assert_eq!(
            actions,
            vec![
                ClimateAction::SetAcMode(AcMode::Cool),
                ClimateAction::SetExternalFan(Switch::On),
                ClimateAction::SetBedroomHeater(Switch::Off),
            ]
        );
        assert!(cooling.is_cooling());
        assert!(cooling.fans_active());
        assert_eq!(cooling.last_fallback(), None);
    }

    #[test]
    fn start_cooling_falls_back_to_fan_when_too_cold_outside() {
        let settings = SettingsSnapshot::default();
        let config = ClimateConfig::default();
        let mut cooling = CoolingPolicy::new();
        let mut actions = Vec::new();

        cooling
            .start_cooling(&input(&settings, &config, 5.0, 0.0), &mut actions)
            .unwrap();

        assert_eq!(
            actions,
            vec![
                ClimateAction::SetAcMode(AcMode::Fan),
                ClimateAction::SetExternalFan(Switch::On),
                ClimateAction::SetBedroomHeater(Switch::Off),
            ]
        );
        assert_eq!(cooling.last_fallback(), Some(FanFallback::TooColdOutside));
        assert_eq!(cooling.freeze().status().state, "NORMAL");
    }

    #[test]
    fn start_cooling_suspends_compressor_while_defrosting() {
        let settings = SettingsSnapshot {
            polling_interval_secs: 60.0,
            compressor_max_low_draw_secs: 60.0,
            ..SettingsSnapshot::default()
        };
        let config = ClimateConfig::default();
        let mut cooling = CoolingPolicy::new();

        let mut actions = Vec::new();
        cooling
            .start_cooling(&input(&settings, &config, 25.0, 230.0), &mut actions)
            .unwrap();
        assert_eq!(actions[0], ClimateAction::SetAcMode(AcMode::Cool));

        let mut actions = Vec::new();
        cooling
            .start_cooling(&input(&settings, &config, 25.0, 230.0), &mut actions)
            .unwrap();

        assert!(matches!(actions[0], ClimateAction::Notify { .. }));
        assert_eq!(
            &actions[1..],
            &[
                ClimateAction::SetAcMode(AcMode::Fan),
                ClimateAction::SetExternalFan(Switch::On),
            ]
        );
        assert_eq!(cooling.last_fallback(), Some(FanFallback::Defrosting));
        assert!(cooling.freeze().is_defrosting());
    }

    #[test]
    fn stop_cooling_keeps_fan_until_hourly_floor_met() {
        let settings = SettingsSnapshot {
            min_fan_minutes_per_hour: 2.0,
            polling_interval_secs: 60.0,
            ..SettingsSnapshot::default()
        };
        let config = ClimateConfig::default();
        let ctx = input(&settings, &config, 20.0, 0.0);
        let mut cooling = CoolingPolicy::new();

        let mut actions = Vec::new();
        cooling.update_fan_runtime(8, 60.0);
        cooling.stop_cooling(&ctx, &mut actions);
        assert_eq!(
            actions,
            vec![
                ClimateAction::SetAcMode(AcMode::Fan),
                ClimateAction::SetExternalFan(Switch::Off),
            ]
        );

        cooling.update_fan_runtime(8, 60.0);
        cooling.update_fan_runtime(8, 60.0);
        let mut actions = Vec::new();
        cooling.stop_cooling(&ctx, &mut actions);
        assert_eq!(actions[0], ClimateAction::SetAcMode(AcMode::Off));
        assert!(!cooling.fans_active());
        assert!(!cooling.is_cooling());
    }

    #[test]
    fn external_fan_follows_compressor_draw() {
        let settings = SettingsSnapshot::default();
        let config = ClimateConfig::default();
        let mut cooling = CoolingPolicy::new();
        cooling.is_cooling = true;

        let mut actions = Vec::new();
        let running =
            cooling.handle_external_fan(&input(&settings, &config, 25.0, 650.0), &mut actions);
        let idle =
            cooling.handle_external_fan(&input(&settings, &config, 25.0, 40.0), &mut actions);

        assert_eq!(running, Some(Switch::On));
        assert_eq!(idle, Some(Switch::Off));
    }

    #[test]
    fn external_fan_off_when_inactive_or_disabled() {
        let settings = SettingsSnapshot {
            external_fan_disabled: true,
            ..SettingsSnapshot::default()
        };
        let config = ClimateConfig::default();
        let mut cooling = CoolingPolicy::new();
        cooling.is_cooling = true;
        let mut actions = Vec::new();

        assert_eq!(
            cooling.handle_external_fan(&input(&settings, &config, 25.0, 900.0), &mut actions),
            Some(Switch::Off)
        );

        let enabled = SettingsSnapshot::default();
        let mut inactive = input(&enabled, &config, 25.0, 900.0);
        inactive.active = false;
        assert_eq!(
            cooling.handle_external_fan(&inactive, &mut actions),
            Some(Switch::Off)
        );
    }

    #[test]
    fn external_fan_untouched_mid_defrost() {
        let settings = SettingsSnapshot {
            compressor_max_low_draw_secs: 0.0,
            ..SettingsSnapshot::default()
        };
        let config = ClimateConfig::default();
        let mut cooling = CoolingPolicy::new();
        let mut actions = Vec::new();
        cooling
            .start_cooling(&input(&settings, &config, 25.0, 230.0), &mut actions)
            .unwrap();
        assert!(cooling.freeze().is_defrosting());

        let mut actions = Vec::new();
        let decision =
            cooling.handle_external_fan(&input(&settings, &config, 25.0, 30.0), &mut actions);

        assert_eq!(decision, None);
        assert!(actions.is_empty());
    }
}
