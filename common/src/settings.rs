//! Operator-tunable settings mirrored from platform entities.
//!
//! Every setting is a named field of [`SettingsSnapshot`] with a type and a
//! default. [`schema`] is the explicit entity-to-field table for a profile.

use std::time::Duration;

use chrono::NaiveTime;

use crate::{
    error::ClimateError,
    types::{Location, Profile, Switch},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    PollingInterval,
    MinFanMinutesPerHour,
    CompressorOutsideTempCutoff,
    CompressorMaxLowDrawSecs,
    DefrostCycleMinutes,
    CompressorDisabled,
    ExternalFanDisabled,
    VariabilityThreshold,
    WarningThresholdCold,
    WarningThresholdWarm,
    RepeatedWarningsBlockSecs,
    WarningsDisabled,
    TargetTemp(Location),
    EveningTemp,
    MorningTemp,
    WarmupCycles,
    WarmupTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    pub entity: String,
    pub field: SettingField,
}

impl SettingEntry {
    fn new(entity: impl Into<String>, field: SettingField) -> Self {
        Self {
            entity: entity.into(),
            field,
        }
    }
}

pub fn schema(profile: Profile) -> Vec<SettingEntry> {
    let mut entries = vec![
        SettingEntry::new(
            "input_number.climate_control_polling_interval",
            SettingField::PollingInterval,
        ),
        SettingEntry::new(
            "input_number.climate_control_min_time_fan_per_hour",
            SettingField::MinFanMinutesPerHour,
        ),
        SettingEntry::new(
            "input_number.climate_control_compressor_outside_temp_cutoff",
            SettingField::CompressorOutsideTempCutoff,
        ),
        SettingEntry::new(
            "input_number.climate_control_compressor_max_low_draw_duration",
            SettingField::CompressorMaxLowDrawSecs,
        ),
        SettingEntry::new(
            "input_number.climate_control_defrost_cycle_duration",
            SettingField::DefrostCycleMinutes,
        ),
        SettingEntry::new(
            "input_boolean.climate_control_disable_ac_compressor",
            SettingField::CompressorDisabled,
        ),
        SettingEntry::new(
            "input_boolean.climate_control_disable_external_ac_fan",
            SettingField::ExternalFanDisabled,
        ),
    ];

    match profile {
        Profile::Ordinary => {
            entries.extend([
                SettingEntry::new(
                    "input_number.ordinary_climate_control_variability_threshold",
                    SettingField::VariabilityThreshold,
                ),
                SettingEntry::new(
                    "input_number.ordinary_climate_control_temp_warning_threshold_cold",
                    SettingField::WarningThresholdCold,
                ),
                SettingEntry::new(
                    "input_number.ordinary_climate_control_temp_warning_threshold_warm",
                    SettingField::WarningThresholdWarm,
                ),
                SettingEntry::new(
                    "input_number.ordinary_climate_control_repeated_warnings_block_timer",
                    SettingField::RepeatedWarningsBlockSecs,
                ),
                SettingEntry::new(
                    "input_boolean.ordinary_climate_disable_control_temp_warnings",
                    SettingField::WarningsDisabled,
                ),
            ]);
            entries.extend(Location::ROOMS.into_iter().map(|room| {
                SettingEntry::new(
                    format!(
                        "input_number.ordinary_climate_control_target_temp_{}",
                        room.as_str()
                    ),
                    SettingField::TargetTemp(room),
                )
            }));
        }
        Profile::Sleep => entries.extend([
            SettingEntry::new(
                "input_number.sleep_climate_control_target_evening_temp",
                SettingField::EveningTemp,
            ),
            SettingEntry::new(
                "input_number.sleep_climate_control_target_morning_temp",
                SettingField::MorningTemp,
            ),
            SettingEntry::new(
                "input_number.sleep_climate_control_warmup_cycles",
                SettingField::WarmupCycles,
            ),
            SettingEntry::new(
                "input_number.sleep_climate_control_variability_threshold",
                SettingField::VariabilityThreshold,
            ),
            SettingEntry::new(
                "input_datetime.sleep_climate_control_warmup_time",
                SettingField::WarmupTime,
            ),
        ]),
    }

    entries
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot {
    pub polling_interval_secs: f64,
    pub min_fan_minutes_per_hour: f64,
    pub compressor_outside_temp_cutoff: f64,
    pub compressor_max_low_draw_secs: f64,
    pub defrost_cycle_minutes: f64,
    pub compressor_disabled: bool,
    pub external_fan_disabled: bool,

    pub variability_threshold: f64,
    pub warning_threshold_cold: f64,
    pub warning_threshold_warm: f64,
    pub repeated_warnings_block_secs: f64,
    pub warnings_disabled: bool,
    pub target_bedroom: f64,
    pub target_office: f64,
    pub target_living_room: f64,

    pub evening_temp: f64,
    pub morning_temp: f64,
    pub warmup_cycles: f64,
    pub warmup_time: NaiveTime,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            polling_interval_secs: 60.0,
            min_fan_minutes_per_hour: 10.0,
            compressor_outside_temp_cutoff: 15.0,
            compressor_max_low_draw_secs: 300.0,
            defrost_cycle_minutes: 10.0,
            compressor_disabled: false,
            external_fan_disabled: false,
            variability_threshold: 0.5,
            warning_threshold_cold: 3.0,
            warning_threshold_warm: 3.0,
            repeated_warnings_block_secs: 3_600.0,
            warnings_disabled: false,
            target_bedroom: 21.0,
            target_office: 21.0,
            target_living_room: 21.0,
            evening_temp: 19.0,
            morning_temp: 21.0,
            warmup_cycles: 4.0,
            warmup_time: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl SettingsSnapshot {
    /// Builds a snapshot from current entity states. Missing entities keep
    /// their default and are returned so the caller can report them; an
    /// unparseable value is a configuration error.
    pub fn load<F>(profile: Profile, lookup: F) -> Result<(Self, Vec<String>), ClimateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut snapshot = Self::default();
        let mut missing = Vec::new();

        for entry in schema(profile) {
            match lookup(&entry.entity) {
                Some(raw) => {
                    snapshot.apply(entry.field, &raw).map_err(|_| {
                        ClimateError::Configuration(format!(
                            "setting '{}' has invalid value '{raw}'",
                            entry.entity
                        ))
                    })?;
                }
                None => missing.push(entry.entity),
            }
        }

        Ok((snapshot, missing))
    }

    pub fn apply(&mut self, field: SettingField, raw: &str) -> Result<(), ClimateError> {
        let invalid = || ClimateError::InvalidSetting {
            entity: format!("{field:?}"),
            value: raw.to_string(),
        };

        match field {
            SettingField::CompressorDisabled
            | SettingField::ExternalFanDisabled
            | SettingField::WarningsDisabled => {
                let on = Switch::from_state(raw).ok_or_else(invalid)? == Switch::On;
                *self.flag_mut(field) = on;
            }
            SettingField::WarmupTime => {
                self.warmup_time = parse_clock(raw).ok_or_else(invalid)?;
            }
            _ => {
                let value = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(invalid)?;
                *self.number_mut(field) = value;
            }
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs_f64(self.polling_interval_secs.max(1.0))
    }

    pub fn target_for(&self, room: Location) -> Option<f64> {
        match room {
            Location::Bedroom => Some(self.target_bedroom),
            Location::Office => Some(self.target_office),
            Location::LivingRoom => Some(self.target_living_room),
            Location::OutsideCitySide | Location::OutsideForestSide => None,
        }
    }

    fn flag_mut(&mut self, field: SettingField) -> &mut bool {
        match field {
            SettingField::CompressorDisabled => &mut self.compressor_disabled,
            SettingField::ExternalFanDisabled => &mut self.external_fan_disabled,
            _ => &mut self.warnings_disabled,
        }
    }

    fn number_mut(&mut self, field: SettingField) -> &mut f64 {
        match field {
            SettingField::PollingInterval => &mut self.polling_interval_secs,
            SettingField::MinFanMinutesPerHour => &mut self.min_fan_minutes_per_hour,
            SettingField::CompressorOutsideTempCutoff => &mut self.compressor_outside_temp_cutoff,
            SettingField::CompressorMaxLowDrawSecs => &mut self.compressor_max_low_draw_secs,
            SettingField::DefrostCycleMinutes => &mut self.defrost_cycle_minutes,
            SettingField::VariabilityThreshold => &mut self.variability_threshold,
            SettingField::WarningThresholdCold => &mut self.warning_threshold_cold,
            SettingField::WarningThresholdWarm => &mut self.warning_threshold_warm,
            SettingField::RepeatedWarningsBlockSecs => &mut self.repeated_warnings_block_secs,
            SettingField::TargetTemp(Location::Office) => &mut self.target_office,
            SettingField::TargetTemp(Location::LivingRoom) => &mut self.target_living_room,
            SettingField::TargetTemp(_) => &mut self.target_bedroom,
            SettingField::EveningTemp => &mut self.evening_temp,
            SettingField::MorningTemp => &mut self.morning_temp,
            _ => &mut self.warmup_cycles,
        }
    }
}

fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}
