//! Battery safety rules for the vehicle.

use serde::{Deserialize, Serialize};

/// Battery thresholds in percent of capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryThresholds {
    /// Below this level the vehicle returns home
    pub critical_pct: f64,
    /// Below this level a warning alert is raised
    pub low_pct: f64,
    /// Recovery margin required before a threshold re-arms
    pub hysteresis_pct: f64,
}

impl Default for BatteryThresholds {
    fn default() -> Self {
        Self {
            critical_pct: 15.0,
            low_pct: 30.0,
            hysteresis_pct: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryAction {
    Nominal,
    LowWarning,
    /// Below critical and no return home confirmed yet. `first` is set only
    /// on the tick that crossed the threshold.
    CriticalReturn { first: bool },
}

/// Edge-triggered battery policy.
///
/// Each threshold alerts once when crossed and stays latched until the level
/// recovers above `threshold + hysteresis_pct`. The critical return keeps
/// being requested until the caller reports it with [`confirm_return`], so a
/// crossing seen on the ground still sends the vehicle home once it flies.
///
/// [`confirm_return`]: BatteryGuard::confirm_return
#[derive(Debug, Clone)]
pub struct BatteryGuard {
    thresholds: BatteryThresholds,
    low_latched: bool,
    critical_latched: bool,
    return_confirmed: bool,
}

impl BatteryGuard {
    pub fn new(thresholds: BatteryThresholds) -> Self {
        Self {
            thresholds,
            low_latched: false,
            critical_latched: false,
            return_confirmed: false,
        }
    }

    pub fn assess(&mut self, level_pct: Option<f64>) -> BatteryAction {
        // Unknown level: keep latches as they are
        let Some(level) = level_pct else {
            return BatteryAction::Nominal;
        };

        let t = self.thresholds;
        if level >= t.critical_pct + t.hysteresis_pct {
            self.critical_latched = false;
            self.return_confirmed = false;
        }
        if level >= t.low_pct + t.hysteresis_pct {
            self.low_latched = false;
        }

        if level < t.critical_pct {
            // Critical crossing also covers the low one
            self.low_latched = true;
            if self.return_confirmed {
                return BatteryAction::Nominal;
            }
            let first = !self.critical_latched;
            self.critical_latched = true;
            return BatteryAction::CriticalReturn { first };
        }

        if level < t.low_pct && !self.low_latched {
            self.low_latched = true;
            return BatteryAction::LowWarning;
        }

        BatteryAction::Nominal
    }

    /// The vehicle is heading home for the current crossing.
    pub fn confirm_return(&mut self) {
        self.return_confirmed = true;
    }

    /// The flight the confirmed return belonged to is over. A later takeoff
    /// below critical asks for a new return without a new alert.
    pub fn landed(&mut self) {
        self.return_confirmed = false;
    }
}

impl Default for BatteryGuard {
    fn default() -> Self {
        Self::new(BatteryThresholds::default())
    }
}
