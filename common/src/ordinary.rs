use crate::{
    cooling::CoolingPolicy,
    error::ClimateError,
    policy::{ControlInput, ControlPolicy},
    types::{ClimateAction, Location, Profile, WarningDirection},
    warnings::WarningDebouncer,
};

/// Daytime profile: cools toward per-room targets, driven by the warmest
/// room, and warns when a room drifts far from its target.
#[derive(Debug, Clone, Default)]
pub struct OrdinaryPolicy {
    warnings: WarningDebouncer,
}

impl OrdinaryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> &WarningDebouncer {
        &self.warnings
    }

    fn check_room(
        &mut self,
        room: Location,
        target: f64,
        current: f64,
        input: &ControlInput<'_>,
        actions: &mut Vec<ClimateAction>,
    ) {
        let diff = current - target;
        let settings = input.settings;

        let direction = if diff > 0.0 && diff.abs() > settings.warning_threshold_warm {
            Some(WarningDirection::Warm)
        } else if diff < 0.0 && diff.abs() > settings.warning_threshold_cold {
            Some(WarningDirection::Cold)
        } else {
            None
        };

        match direction {
            Some(direction) => actions.extend(self.warnings.send_temp_warning(
                direction,
                room,
                target,
                current,
                input.now,
                settings,
                &input.config.notification_title,
            )),
            None => self.warnings.mark_normalized(room),
        }
    }
}

impl ControlPolicy for OrdinaryPolicy {
    fn profile(&self) -> Profile {
        Profile::Ordinary
    }

    fn rooms(&self) -> &[Location] {
        &Location::ROOMS
    }

    fn on_session_start(
        &mut self,
        _cooling: &mut CoolingPolicy,
        _input: &ControlInput<'_>,
    ) -> Result<Vec<ClimateAction>, ClimateError> {
        self.warnings.reset();
        Ok(Vec::new())
    }

    fn loop_logic(
        &mut self,
        cooling: &mut CoolingPolicy,
        input: &ControlInput<'_>,
    ) -> Result<Vec<ClimateAction>, ClimateError> {
        let mut actions = Vec::new();
        let mut warmest: Option<f64> = None;

        for room in Location::ROOMS {
            let current = input.room_temp(room)?;
            let target = input
                .settings
                .target_for(room)
                .ok_or_else(|| ClimateError::Configuration(format!("no target for {room:?}")))?;

            self.check_room(room, target, current, input, &mut actions);

            let diff = current - target;
            if warmest.map_or(true, |best| diff > best) {
                warmest = Some(diff);
            }
        }

        match warmest {
            Some(diff) if diff > input.settings.variability_threshold => {
                cooling.start_cooling(input, &mut actions)?;
            }
            _ => cooling.stop_cooling(input, &mut actions),
        }

        Ok(actions)
    }
}
