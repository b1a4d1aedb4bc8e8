use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::types::{Location, Profile};

/// Constants injected into every controller at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub ac_mode_entity: String,
    pub ac_power_draw_entity: String,
    pub external_fan_entity: String,
    pub bedroom_heater_entity: String,
    pub temp_entity_prefix: String,
    pub temp_entity_suffix: String,
    pub next_alarm_entity: String,
    pub notify_target: String,
    pub notification_title: String,

    pub compressor_running_draw_w: f64,
    pub low_draw_w: f64,

    pub error_restart_interval_secs: u64,
    pub restart_on_error: bool,
    pub notify_on_error: bool,

    pub max_alarm_retries: u32,
    pub alarm_retry_delay_secs: u64,
    pub default_alarm_hour: u32,
    pub max_alarm_horizon_hours: i64,
    pub evening_start_hour: u32,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            ac_mode_entity: "select.ir_controller_ac_mode".to_string(),
            ac_power_draw_entity: "sensor.ac_socket_power".to_string(),
            external_fan_entity: "switch.ac_external_fan_socket".to_string(),
            bedroom_heater_entity: "switch.bedroom_heater_socket".to_string(),
            temp_entity_prefix: "sensor.".to_string(),
            temp_entity_suffix: "_temp_humid_sensor_temperature".to_string(),
            next_alarm_entity: "sensor.phone_next_alarm".to_string(),
            notify_target: "mobile_app_phone".to_string(),
            notification_title: "Climate Control".to_string(),
            compressor_running_draw_w: 200.0,
            low_draw_w: 260.0,
            error_restart_interval_secs: 60,
            restart_on_error: true,
            notify_on_error: true,
            max_alarm_retries: 5,
            alarm_retry_delay_secs: 5,
            default_alarm_hour: 9,
            max_alarm_horizon_hours: 12,
            evening_start_hour: 18,
        }
    }
}

impl ClimateConfig {
    pub fn sanitize(&mut self) {
        if !self.compressor_running_draw_w.is_finite() || self.compressor_running_draw_w < 0.0 {
            self.compressor_running_draw_w = 200.0;
        }
        if !self.low_draw_w.is_finite() || self.low_draw_w < self.compressor_running_draw_w {
            self.low_draw_w = self.compressor_running_draw_w;
        }
        self.error_restart_interval_secs = self.error_restart_interval_secs.max(1);
        self.default_alarm_hour = self.default_alarm_hour.min(23);
        self.evening_start_hour = self.evening_start_hour.min(23);
        self.max_alarm_horizon_hours = self.max_alarm_horizon_hours.max(1);
    }

    pub fn temp_entity(&self, location: Location) -> String {
        format!(
            "{}{}{}",
            self.temp_entity_prefix,
            location.as_str(),
            self.temp_entity_suffix
        )
    }

    pub fn evening_start(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.evening_start_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub name: String,
    pub profile: Profile,
    pub active_entity: String,
    #[serde(default)]
    pub exclusive_with: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub state_topic_base: String,
    pub command_topic_base: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            state_topic_base: "homeassistant".to_string(),
            command_topic_base: "climate/cmnd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default = "default_controllers")]
    pub controllers: Vec<ControllerConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Stockholm".to_string(),
            network: NetworkConfig::default(),
            climate: ClimateConfig::default(),
            controllers: default_controllers(),
        }
    }
}

fn default_controllers() -> Vec<ControllerConfig> {
    vec![
        ControllerConfig {
            name: "ordinary".to_string(),
            profile: Profile::Ordinary,
            active_entity: "input_boolean.ordinary_climate_control".to_string(),
            exclusive_with: None,
        },
        ControllerConfig {
            name: "sleep".to_string(),
            profile: Profile::Sleep,
            active_entity: "input_boolean.sleep_climate_control".to_string(),
            exclusive_with: Some("input_boolean.ordinary_climate_control".to_string()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_raises_low_draw_to_running_threshold() {
        let mut config = ClimateConfig {
            compressor_running_draw_w: 300.0,
            low_draw_w: 100.0,
            error_restart_interval_secs: 0,
            ..ClimateConfig::default()
        };
        config.sanitize();

        assert_eq!(config.low_draw_w, 300.0);
        assert_eq!(config.error_restart_interval_secs, 1);
    }

    #[test]
    fn temp_entity_combines_prefix_and_suffix() {
        let config = ClimateConfig::default();
        assert_eq!(
            config.temp_entity(Location::LivingRoom),
            "sensor.living_room_temp_humid_sensor_temperature"
        );
    }

    #[test]
    fn partial_runtime_json_fills_defaults() {
        let raw = r#"{"timezone":"UTC","climate":{"low_draw_w":280.0}}"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.timezone, "UTC");
        assert_eq!(runtime.climate.low_draw_w, 280.0);
        assert_eq!(runtime.climate.error_restart_interval_secs, 60);
        assert_eq!(runtime.controllers.len(), 2);
        assert_eq!(runtime.network.mqtt_port, 1883);
    }
}
