//! Compressor icing detection from the AC power draw.
//!
//! A compressor that runs but draws less than it should is starved, usually
//! because the evaporator is iced. Sustained low draw triggers a defrost
//! cycle during which only the fan may run.

use crate::{error::ClimateError, types::FreezeStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FreezeState {
    Normal,
    LowDraw { elapsed_secs: f64 },
    Defrosting { elapsed_secs: f64 },
}

impl FreezeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::LowDraw { .. } => "LOW_DRAW",
            Self::Defrosting { .. } => "DEFROSTING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreezeThresholds {
    pub running_draw_w: f64,
    pub low_draw_w: f64,
    pub max_low_draw_secs: f64,
    pub defrost_cycle_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeVerdict {
    Clear,
    DefrostStarted,
    Defrosting,
    DefrostFinished,
}

impl FreezeVerdict {
    pub fn is_freeze_active(self) -> bool {
        matches!(self, Self::DefrostStarted | Self::Defrosting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawBand {
    Healthy,
    NotRunning,
    Low,
}

#[derive(Debug, Clone)]
pub struct FreezeDefrostDetector {
    state: FreezeState,
}

impl Default for FreezeDefrostDetector {
    fn default() -> Self {
        Self {
            state: FreezeState::Normal,
        }
    }
}

impl FreezeDefrostDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FreezeState {
        self.state
    }

    pub fn is_defrosting(&self) -> bool {
        matches!(self.state, FreezeState::Defrosting { .. })
    }

    pub fn status(&self) -> FreezeStatus {
        let (low_draw_secs, defrost_secs) = match self.state {
            FreezeState::Normal => (0.0, 0.0),
            FreezeState::LowDraw { elapsed_secs } => (elapsed_secs, 0.0),
            FreezeState::Defrosting { elapsed_secs } => (0.0, elapsed_secs),
        };
        FreezeStatus {
            state: self.state.as_str(),
            low_draw_secs,
            defrost_secs,
        }
    }

    /// Advances the detector by one polling interval. Time accrues once per
    /// call; entering a defrost re-evaluates the new state in the same call.
    pub fn check_for_freeze(
        &mut self,
        draw_w: f64,
        polling_interval_secs: f64,
        thresholds: &FreezeThresholds,
    ) -> Result<FreezeVerdict, ClimateError> {
        if self.is_defrosting() {
            return Ok(self.advance_defrost(polling_interval_secs, thresholds));
        }

        match classify(draw_w, thresholds)? {
            DrawBand::Healthy | DrawBand::NotRunning => {
                self.state = FreezeState::Normal;
                Ok(FreezeVerdict::Clear)
            }
            DrawBand::Low => {
                let previous = match self.state {
                    FreezeState::LowDraw { elapsed_secs } => elapsed_secs,
                    _ => 0.0,
                };
                let elapsed_secs = previous + polling_interval_secs;

                if elapsed_secs > thresholds.max_low_draw_secs {
                    self.state = FreezeState::Defrosting { elapsed_secs: 1.0 };
                    return Ok(match self.advance_defrost(0.0, thresholds) {
                        FreezeVerdict::Defrosting => FreezeVerdict::DefrostStarted,
                        other => other,
                    });
                }

                self.state = FreezeState::LowDraw { elapsed_secs };
                Ok(FreezeVerdict::Clear)
            }
        }
    }

    fn advance_defrost(
        &mut self,
        step_secs: f64,
        thresholds: &FreezeThresholds,
    ) -> FreezeVerdict {
        let FreezeState::Defrosting { elapsed_secs } = self.state else {
            return FreezeVerdict::Clear;
        };

        let elapsed_secs = elapsed_secs + step_secs;
        if elapsed_secs > thresholds.defrost_cycle_secs {
            self.state = FreezeState::Normal;
            FreezeVerdict::DefrostFinished
        } else {
            self.state = FreezeState::Defrosting { elapsed_secs };
            FreezeVerdict::Defrosting
        }
    }
}

fn classify(draw_w: f64, thresholds: &FreezeThresholds) -> Result<DrawBand, ClimateError> {
    if draw_w >= thresholds.low_draw_w {
        Ok(DrawBand::Healthy)
    } else if draw_w <= thresholds.running_draw_w {
        Ok(DrawBand::NotRunning)
    } else if draw_w > thresholds.running_draw_w && draw_w < thresholds.low_draw_w {
        Ok(DrawBand::Low)
    } else {
        Err(ClimateError::UnclassifiableDraw(draw_w))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn thresholds() -> FreezeThresholds {
        FreezeThresholds {
            running_draw_w: 100.0,
            low_draw_w: 260.0,
            max_low_draw_secs: 300.0,
            defrost_cycle_secs: 600.0,
        }
    }

    #[test]
    fn sustained_low_draw_enters_defrost_on_sixth_tick() {
        let mut detector = FreezeDefrostDetector::new();
        let draws = [250.0, 150.0, 150.0, 150.0, 150.0, 150.0];

        let verdicts: Vec<_> = draws
            .iter()
            .map(|draw| detector.check_for_freeze(*draw, 60.0, &thresholds()).unwrap())
            .collect();

        assert_eq!(
            verdicts,
            vec![
                FreezeVerdict::Clear,
                FreezeVerdict::Clear,
                FreezeVerdict::Clear,
                FreezeVerdict::Clear,
                FreezeVerdict::Clear,
                FreezeVerdict::DefrostStarted,
            ]
        );
        assert_eq!(detector.state(), FreezeState::Defrosting { elapsed_secs: 1.0 });
    }

    #[test]
    fn healthy_or_idle_draw_resets_low_draw_timer() {
        let mut detector = FreezeDefrostDetector::new();

        detector.check_for_freeze(200.0, 60.0, &thresholds()).unwrap();
        assert_eq!(detector.state(), FreezeState::LowDraw { elapsed_secs: 60.0 });

        detector.check_for_freeze(900.0, 60.0, &thresholds()).unwrap();
        assert_eq!(detector.state(), FreezeState::Normal);

        detector.check_for_freeze(200.0, 60.0, &thresholds()).unwrap();
        detector.check_for_freeze(5.0, 60.0, &thresholds()).unwrap();
        assert_eq!(detector.state(), FreezeState::Normal);
    }

    #[test]
    fn defrost_runs_for_cycle_duration_regardless_of_draw() {
        let mut detector = FreezeDefrostDetector {
            state: FreezeState::Defrosting { elapsed_secs: 1.0 },
        };

        for _ in 0..9 {
            let verdict = detector.check_for_freeze(900.0, 60.0, &thresholds()).unwrap();
            assert_eq!(verdict, FreezeVerdict::Defrosting);
        }

        // 1 + 10 * 60 = 601 > 600
        let verdict = detector.check_for_freeze(150.0, 60.0, &thresholds()).unwrap();
        assert_eq!(verdict, FreezeVerdict::DefrostFinished);
        assert!(!verdict.is_freeze_active());
        assert_eq!(detector.state(), FreezeState::Normal);
    }

    #[test]
    fn timers_are_never_both_nonzero() {
        let mut detector = FreezeDefrostDetector::new();
        let draws = [150.0, 150.0, 0.0, 150.0, 150.0, 150.0, 150.0, 150.0, 150.0, 400.0];

        for draw in draws.iter().cycle().take(200) {
            detector.check_for_freeze(*draw, 60.0, &thresholds()).unwrap();
            let status = detector.status();
            assert!(status.low_draw_secs == 0.0 || status.defrost_secs == 0.0);
        }
    }

    #[test]
    fn nan_draw_is_a_defect() {
        let mut detector = FreezeDefrostDetector::new();
        let err = detector
            .check_for_freeze(f64::NAN, 60.0, &thresholds())
            .unwrap_err();

        assert!(matches!(err, ClimateError::UnclassifiableDraw(_)));
        assert_eq!(detector.state(), FreezeState::Normal);
    }
}
