/// Minutes the fans have run during the current wall-clock hour.
#[derive(Debug, Clone, Default)]
pub struct FanRuntimeAccountant {
    current_hour: Option<u32>,
    minutes_this_hour: f64,
}

impl FanRuntimeAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minutes_this_hour(&self) -> f64 {
        self.minutes_this_hour
    }

    pub fn current_hour(&self) -> Option<u32> {
        self.current_hour
    }

    /// Must run before the tick's policy so an hour boundary resets the
    /// counter before that tick's activity is measured. Returns the minutes
    /// accumulated in the hour that just ended, if one ended.
    pub fn update(
        &mut self,
        now_hour: u32,
        any_fan_active: bool,
        polling_interval_secs: f64,
    ) -> Option<f64> {
        let mut finished = None;
        if self.current_hour != Some(now_hour) {
            if self.current_hour.is_some() {
                finished = Some(self.minutes_this_hour);
            }
            self.minutes_this_hour = 0.0;
            self.current_hour = Some(now_hour);
        }

        if any_fan_active {
            self.minutes_this_hour =
                (self.minutes_this_hour + polling_interval_secs / 60.0).min(60.0);
        }

        finished
    }
}
