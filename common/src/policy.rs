use chrono::{DateTime, FixedOffset};

use crate::{
    config::ClimateConfig,
    cooling::CoolingPolicy,
    error::ClimateError,
    settings::SettingsSnapshot,
    types::{ClimateAction, Location, Profile},
};

/// Everything a policy may look at during one tick.
#[derive(Debug, Clone)]
pub struct ControlInput<'a> {
    pub now: DateTime<FixedOffset>,
    pub active: bool,
    pub settings: &'a SettingsSnapshot,
    pub config: &'a ClimateConfig,
    pub outside_temp: f64,
    pub ac_power_draw_w: f64,
    pub room_temps: &'a [(Location, f64)],
}

impl ControlInput<'_> {
    pub fn room_temp(&self, room: Location) -> Result<f64, ClimateError> {
        self.room_temps
            .iter()
            .find(|(location, _)| *location == room)
            .map(|(_, temp)| *temp)
            .ok_or(ClimateError::MissingReading(room))
    }

    pub fn too_cold_for_compressor(&self) -> bool {
        self.outside_temp < self.settings.compressor_outside_temp_cutoff
    }

    pub fn polling_interval_secs(&self) -> f64 {
        self.settings.polling_interval().as_secs_f64()
    }
}

/// Per-profile decision logic run by the supervisor each tick.
pub trait ControlPolicy: Send {
    fn profile(&self) -> Profile;

    /// Rooms whose temperature must be read before each tick.
    fn rooms(&self) -> &[Location];

    fn uses_alarm(&self) -> bool {
        false
    }

    fn set_alarm(&mut self, _alarm_at: DateTime<FixedOffset>) {}

    fn alarm(&self) -> Option<DateTime<FixedOffset>> {
        None
    }

    fn on_session_start(
        &mut self,
        cooling: &mut CoolingPolicy,
        input: &ControlInput<'_>,
    ) -> Result<Vec<ClimateAction>, ClimateError>;

    fn loop_logic(
        &mut self,
        cooling: &mut CoolingPolicy,
        input: &ControlInput<'_>,
    ) -> Result<Vec<ClimateAction>, ClimateError>;
}
