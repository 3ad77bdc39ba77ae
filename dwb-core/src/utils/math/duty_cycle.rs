//! Duty-cycle to PWM tick mapping.
//!
//! The PCA9685 drives each channel with a 12-bit counter: a channel is high
//! from its `on` tick to its `off` tick. The on point is pinned to a constant
//! and the duty percentage only moves the off point.
//!
//! # Example
//! ```rust
//! use dwb_core::utils::math::duty_cycle::DutyCycleMapper;
//! let mapper = DutyCycleMapper::default();
//! let window = mapper.to_device_window(50.0);
//! assert_eq!(window.on_tick, 0);
//! assert_eq!(window.off_tick, 2047);
//! ```

use serde::{Deserialize, Serialize};

/// Lowest duty percentage accepted by the mapper.
pub const MIN_DUTY_CYCLE: f32 = 0.0;
/// Highest duty percentage accepted by the mapper.
pub const MAX_DUTY_CYCLE: f32 = 100.0;
/// Tick written for a 0 % duty cycle.
pub const MIN_PWM_ON: u16 = 0;
/// Tick written for a 100 % duty cycle.
pub const MAX_PWM_ON: u16 = 4095;
/// Tick at which every channel switches on.
pub const PWM_OFF_POINT: u16 = 0;

/// On/off tick pair for one PWM channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyWindow {
    /// Tick at which the output goes high (pinned).
    pub on_tick: u16,
    /// Tick at which the output goes low (carries the duty).
    pub off_tick: u16,
}

/// Linear mapper from `[0, 100]` duty onto `[min_on, max_on]` device ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DutyCycleMapper {
    pub min_on: u16,
    pub max_on: u16,
    pub off_point: u16,
}

impl Default for DutyCycleMapper {
    fn default() -> Self {
        Self {
            min_on: MIN_PWM_ON,
            max_on: MAX_PWM_ON,
            off_point: PWM_OFF_POINT,
        }
    }
}

impl DutyCycleMapper {
    /// Map a duty percentage to the device window.
    ///
    /// Inputs outside `[0, 100]` are clamped to the nearest bound and `NaN`
    /// maps to 0 %, so the returned tick always lies in `[min_on, max_on]`.
    pub fn to_device_window(
        &self,
        duty: f32,
    ) -> DutyWindow {
        DutyWindow {
            on_tick: self.off_point,
            off_tick: self.map(duty),
        }
    }

    /// Map a duty percentage to the tick carrying the duty.
    pub fn map(
        &self,
        duty: f32,
    ) -> u16 {
        let duty = clamp_duty(duty);
        let span = self.max_on.saturating_sub(self.min_on) as f32;
        let offset = libm::floorf(span * (duty - MIN_DUTY_CYCLE) / (MAX_DUTY_CYCLE - MIN_DUTY_CYCLE));
        (self.min_on as f32 + offset) as u16
    }

    /// Inverse of [`map`](Self::map): the duty percentage a tick corresponds to.
    pub fn to_duty(
        &self,
        tick: u16,
    ) -> f32 {
        if self.max_on <= self.min_on {
            return MIN_DUTY_CYCLE;
        }
        let tick = tick.clamp(self.min_on, self.max_on);
        let span = (self.max_on - self.min_on) as f32;
        MIN_DUTY_CYCLE + (tick - self.min_on) as f32 / span * (MAX_DUTY_CYCLE - MIN_DUTY_CYCLE)
    }
}

fn clamp_duty(duty: f32) -> f32 {
    if duty.is_nan() {
        MIN_DUTY_CYCLE
    } else {
        duty.clamp(MIN_DUTY_CYCLE, MAX_DUTY_CYCLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_map_exactly() {
        let m = DutyCycleMapper::default();
        assert_eq!(m.to_device_window(0.0).off_tick, MIN_PWM_ON);
        assert_eq!(m.to_device_window(100.0).off_tick, MAX_PWM_ON);
        assert_eq!(m.to_device_window(100.0).on_tick, PWM_OFF_POINT);
    }

    #[test]
    fn test_monotonic_over_range() {
        let m = DutyCycleMapper::default();
        let mut prev = m.map(0.0);
        for step in 1..=1000 {
            let tick = m.map(step as f32 * 0.1);
            assert!(tick >= prev, "not monotonic at {}", step);
            prev = tick;
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let m = DutyCycleMapper::default();
        assert_eq!(m.map(-20.0), MIN_PWM_ON);
        assert_eq!(m.map(250.0), MAX_PWM_ON);
        assert_eq!(m.map(f32::NAN), MIN_PWM_ON);
    }

    #[test]
    fn test_custom_range() {
        let m = DutyCycleMapper {
            min_on: 1000,
            max_on: 3000,
            off_point: 0,
        };
        assert_eq!(m.map(0.0), 1000);
        assert_eq!(m.map(50.0), 2000);
        assert_eq!(m.map(100.0), 3000);
        assert!(libm::fabsf(m.to_duty(2000) - 50.0) < 1e-3);
    }
}
