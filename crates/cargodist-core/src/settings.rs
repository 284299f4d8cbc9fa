//! Link graph configuration.
//!
//! A job copies the settings when it is created, so changing them while a
//! job runs never affects that job.

use serde::{Deserialize, Serialize};

use crate::id::CargoClass;

/// How demand is assigned between stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    /// Cargo goes wherever vehicles take it; no flows are computed.
    #[default]
    Manual,
    /// Demand is assigned without requiring a return flow.
    Asymmetric,
    /// Demand between two stations is balanced in both directions.
    Symmetric,
}

/// Errors found by [`LinkGraphSettings::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("recalc_interval must be at least 1 day")]
    ZeroRecalcInterval,
    #[error("recalc_time must be at least 1 day")]
    ZeroRecalcTime,
    #[error("accuracy must be between 2 and 64, got {0}")]
    Accuracy(u8),
    #[error("short_path_saturation must be between 1 and 250 percent, got {0}")]
    Saturation(u8),
    #[error("symmetric distribution is not supported for armoured cargo")]
    SymmetricArmoured,
}

/// Tunables shared by the scheduler and by every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkGraphSettings {
    /// Days between two job spawns.
    pub recalc_interval: u16,
    /// Days a job may run before it must be joined.
    pub recalc_time: u16,
    pub distribution_pax: DistributionType,
    pub distribution_mail: DistributionType,
    pub distribution_armoured: DistributionType,
    pub distribution_default: DistributionType,
    /// Solver accuracy; higher values spend more time on finer paths.
    pub accuracy: u8,
    /// Influence of distance on demand, in percent.
    pub demand_distance: u8,
    /// Influence of supply size on symmetric demand, in percent.
    pub demand_size: u8,
    /// Saturation (percent of capacity) for the first, short-path pass.
    pub short_path_saturation: u8,
    /// Run jobs on worker threads. When false they run inline at spawn.
    pub threaded: bool,
}

impl Default for LinkGraphSettings {
    fn default() -> Self {
        Self {
            recalc_interval: 4,
            recalc_time: 16,
            distribution_pax: DistributionType::Manual,
            distribution_mail: DistributionType::Manual,
            distribution_armoured: DistributionType::Manual,
            distribution_default: DistributionType::Manual,
            accuracy: 16,
            demand_distance: 100,
            demand_size: 100,
            short_path_saturation: 80,
            threaded: true,
        }
    }
}

impl LinkGraphSettings {
    /// The distribution type configured for a cargo class.
    pub fn distribution_type(&self, class: CargoClass) -> DistributionType {
        match class {
            CargoClass::Passengers => self.distribution_pax,
            CargoClass::Mail => self.distribution_mail,
            CargoClass::Armoured => self.distribution_armoured,
            CargoClass::Other => self.distribution_default,
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.recalc_interval == 0 {
            return Err(SettingsError::ZeroRecalcInterval);
        }
        if self.recalc_time == 0 {
            return Err(SettingsError::ZeroRecalcTime);
        }
        if !(2..=64).contains(&self.accuracy) {
            return Err(SettingsError::Accuracy(self.accuracy));
        }
        if !(1..=250).contains(&self.short_path_saturation) {
            return Err(SettingsError::Saturation(self.short_path_saturation));
        }
        if self.distribution_armoured == DistributionType::Symmetric {
            return Err(SettingsError::SymmetricArmoured);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(LinkGraphSettings::default().validate(), Ok(()));
    }

    #[test]
    fn distribution_per_class() {
        let settings = LinkGraphSettings {
            distribution_pax: DistributionType::Symmetric,
            distribution_default: DistributionType::Asymmetric,
            ..Default::default()
        };
        assert_eq!(
            settings.distribution_type(CargoClass::Passengers),
            DistributionType::Symmetric
        );
        assert_eq!(
            settings.distribution_type(CargoClass::Mail),
            DistributionType::Manual
        );
        assert_eq!(
            settings.distribution_type(CargoClass::Other),
            DistributionType::Asymmetric
        );
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let bad = LinkGraphSettings {
            recalc_time: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(SettingsError::ZeroRecalcTime));

        let bad = LinkGraphSettings {
            accuracy: 1,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(SettingsError::Accuracy(1)));

        let bad = LinkGraphSettings {
            distribution_armoured: DistributionType::Symmetric,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(SettingsError::SymmetricArmoured));
    }
}
