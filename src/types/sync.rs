//! Synchronisation clock and trigger routing settings

use serde::{Deserialize, Serialize};

use crate::{AcquisitionError, Result};

/// Shortest sync clock period in milliseconds.
pub const MIN_SYNC_PERIOD_MS: u32 = 2;
/// Longest sync clock period in milliseconds.
pub const MAX_SYNC_PERIOD_MS: u32 = 32766;

/// Where the sync clock comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Device uses and exports its internally generated sync clock
    #[default]
    Master,
    /// Device uses and imports an externally generated sync clock
    Slave,
}

/// Where the start trigger comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Device generates and exports the trigger
    #[default]
    Master,
    /// Device imports an external hardware trigger
    Slave,
}

/// Internal sync clock, stored as a period in milliseconds.
///
/// The hardware counts half periods in whole milliseconds, so the period must
/// be even and frequencies are rounded to the nearest representable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncClock {
    period_ms: u32,
}

impl Default for SyncClock {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

impl SyncClock {
    /// Create a clock with the given period.
    pub fn from_period_ms(period_ms: u32) -> Result<Self> {
        if !(MIN_SYNC_PERIOD_MS..=MAX_SYNC_PERIOD_MS).contains(&period_ms) || period_ms % 2 != 0 {
            return Err(AcquisitionError::parameter_invalid(
                "period_ms",
                format!(
                    "{period_ms} must be an even number between {MIN_SYNC_PERIOD_MS} and {MAX_SYNC_PERIOD_MS}"
                ),
            ));
        }
        Ok(Self { period_ms })
    }

    /// Create a clock as close as possible to the target frequency.
    pub fn from_frequency(hz: f64) -> Result<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(AcquisitionError::parameter_invalid(
                "frequency",
                format!("{hz} Hz is not a positive frequency"),
            ));
        }

        let half_period = (500.0 / hz).round();
        if half_period < 1.0 || half_period * 2.0 > MAX_SYNC_PERIOD_MS as f64 {
            return Err(AcquisitionError::parameter_invalid(
                "frequency",
                format!("{hz} Hz is outside the sync clock range"),
            ));
        }

        Self::from_period_ms(half_period as u32 * 2)
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Actual frequency after rounding.
    pub fn frequency(&self) -> f64 {
        1000.0 / self.period_ms as f64
    }
}

/// Complete sync/trigger configuration pushed to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub clock: SyncClock,
    pub sync_mode: SyncMode,
    pub trigger_mode: TriggerMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_bounds_are_enforced() {
        assert!(SyncClock::from_period_ms(2).is_ok());
        assert!(SyncClock::from_period_ms(32766).is_ok());
        assert!(SyncClock::from_period_ms(0).is_err());
        assert!(SyncClock::from_period_ms(3).is_err());
        assert!(SyncClock::from_period_ms(32768).is_err());
    }

    #[test]
    fn frequency_rounds_to_half_period() {
        let clock = SyncClock::from_frequency(1.0).unwrap();
        assert_eq!(clock.period_ms(), 1000);

        // 3 Hz -> 166.67 ms half period, rounded to 167
        let clock = SyncClock::from_frequency(3.0).unwrap();
        assert_eq!(clock.period_ms(), 334);
        assert!((clock.frequency() - 2.994).abs() < 0.001);

        assert_eq!(SyncClock::from_frequency(500.0).unwrap().period_ms(), 2);
    }

    #[test]
    fn unrepresentable_frequencies_are_rejected() {
        assert!(SyncClock::from_frequency(0.0).is_err());
        assert!(SyncClock::from_frequency(-5.0).is_err());
        assert!(SyncClock::from_frequency(f64::NAN).is_err());
        assert!(SyncClock::from_frequency(5000.0).is_err());
        assert!(SyncClock::from_frequency(0.01).is_err());
    }

    #[test]
    fn defaults_are_master_one_hertz() {
        let settings = SyncSettings::default();
        assert_eq!(settings.sync_mode, SyncMode::Master);
        assert_eq!(settings.trigger_mode, TriggerMode::Master);
        assert_eq!(settings.clock.period_ms(), 1000);
    }
}
