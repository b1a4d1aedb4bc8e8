//! Per-room temperature warning throttling.
//!
//! A warning for a (room, direction) pair fires at most once until the room
//! is seen back inside its band, and never twice within the repeat block.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};

use crate::{
    settings::SettingsSnapshot,
    types::{ClimateAction, Location, WarningDirection},
};

#[derive(Debug, Clone, PartialEq)]
pub struct WarningTracker {
    pub last_sent_at: Option<DateTime<FixedOffset>>,
    pub normalized: bool,
}

impl Default for WarningTracker {
    fn default() -> Self {
        Self {
            last_sent_at: None,
            normalized: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WarningDebouncer {
    trackers: HashMap<(Location, WarningDirection), WarningTracker>,
}

impl WarningDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self, room: Location, direction: WarningDirection) -> WarningTracker {
        self.trackers
            .get(&(room, direction))
            .cloned()
            .unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.trackers.clear();
    }

    /// Room seen back inside its band: either direction may warn again.
    pub fn mark_normalized(&mut self, room: Location) {
        for direction in [WarningDirection::Warm, WarningDirection::Cold] {
            self.trackers.entry((room, direction)).or_default().normalized = true;
        }
    }

    /// Returns the notification to send, if any. Crossing to the other side
    /// of the band normalizes the opposite tracker but keeps its timestamp.
    pub fn send_temp_warning(
        &mut self,
        direction: WarningDirection,
        room: Location,
        target: f64,
        current: f64,
        now: DateTime<FixedOffset>,
        settings: &SettingsSnapshot,
        title: &str,
    ) -> Option<ClimateAction> {
        if settings.warnings_disabled {
            return None;
        }

        self.trackers
            .entry((room, direction.opposite()))
            .or_default()
            .normalized = true;

        let tracker = self.trackers.entry((room, direction)).or_default();

        if let Some(last) = tracker.last_sent_at {
            let elapsed_secs = (now - last).num_milliseconds() as f64 / 1_000.0;
            if elapsed_secs < settings.repeated_warnings_block_secs {
                return None;
            }
        }

        if !tracker.normalized {
            return None;
        }

        tracker.last_sent_at = Some(now);
        tracker.normalized = false;

        Some(ClimateAction::Notify {
            title: title.to_string(),
            message: format!(
                "{} WARNING -> {}: {current:.1}° (target {target:.1}°)",
                direction.label(),
                room.as_str()
            ),
        })
    }
}
