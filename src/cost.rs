//! Load estimates and their conversion into time estimates.
//!
//! Calibrating the coefficients is up to the host optimizer. This module only
//! supplies the linear model the platform is configured with.

use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::config::{CORES_PROPERTY, CPU_MHZ_PROPERTY, Configuration, HDFS_MS_PER_MB_PROPERTY};
use crate::error::ConfigError;

/// An interval estimate of some resource usage, e.g. CPU cycles or bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadEstimate {
    pub lower: u64,
    pub upper: u64,
}

impl LoadEstimate {
    pub fn new(lower: u64, upper: u64) -> Self {
        debug_assert!(lower <= upper);
        Self { lower, upper }
    }

    pub fn exact(value: u64) -> Self {
        Self::new(value, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadProfile {
    pub cpu: LoadEstimate,
    pub disk: LoadEstimate,
    pub network: LoadEstimate,
}

/// Expected wall-clock time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeEstimate {
    pub lower_ms: f64,
    pub upper_ms: f64,
}

impl Add for TimeEstimate {
    type Output = TimeEstimate;

    fn add(self, rhs: Self) -> Self::Output {
        TimeEstimate {
            lower_ms: self.lower_ms + rhs.lower_ms,
            upper_ms: self.upper_ms + rhs.upper_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadToTimeConverter {
    /// Milliseconds per unit of load.
    Linear(f64),
}

impl LoadToTimeConverter {
    pub fn convert(&self, load: LoadEstimate) -> TimeEstimate {
        match *self {
            LoadToTimeConverter::Linear(coefficient) => TimeEstimate {
                lower_ms: load.lower as f64 * coefficient,
                upper_ms: load.upper as f64 * coefficient,
            },
        }
    }
}

type Combine = fn(TimeEstimate, TimeEstimate, TimeEstimate) -> TimeEstimate;

#[derive(Debug, Clone, Copy)]
pub struct LoadProfileToTimeConverter {
    pub cpu: LoadToTimeConverter,
    pub disk: LoadToTimeConverter,
    pub network: LoadToTimeConverter,
    combine: Combine,
}

impl LoadProfileToTimeConverter {
    /// Converts each resource separately and adds the results up.
    pub fn summing(
        cpu: LoadToTimeConverter,
        disk: LoadToTimeConverter,
        network: LoadToTimeConverter,
    ) -> Self {
        Self {
            cpu,
            disk,
            network,
            combine: |cpu, disk, network| cpu + disk + network,
        }
    }

    /// The platform's linear model, read from the configuration.
    ///
    /// CPU load is in cycles, disk load in bytes.
    pub fn from_configuration(config: &Configuration) -> Result<Self, ConfigError> {
        let cpu_mhz = config.get_long_property(CPU_MHZ_PROPERTY)?;
        let cores = config.get_long_property(CORES_PROPERTY)?;
        let ms_per_mb = config.get_double_property(HDFS_MS_PER_MB_PROPERTY)?;

        if cpu_mhz <= 0 || cores <= 0 {
            return Err(ConfigError::Invalid {
                key: CPU_MHZ_PROPERTY.to_string(),
                value: format!("{cpu_mhz} MHz x {cores} cores"),
            });
        }

        Ok(Self::summing(
            LoadToTimeConverter::Linear(1.0 / (cores as f64 * cpu_mhz as f64 * 1000.0)),
            LoadToTimeConverter::Linear(ms_per_mb / 1_000_000.0),
            LoadToTimeConverter::Linear(0.0),
        ))
    }

    pub fn convert(&self, profile: &LoadProfile) -> TimeEstimate {
        (self.combine)(
            self.cpu.convert(profile.cpu),
            self.disk.convert(profile.disk),
            self.network.convert(profile.network),
        )
    }
}
