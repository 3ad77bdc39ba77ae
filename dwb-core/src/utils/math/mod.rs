//! Math utilities for the differential-wheel bot.
//!
//! - `duty_cycle`: linear mapping from a 0–100 duty percentage to PWM ticks
//! - `kinematics`: per-wheel speed/distance plans for curves, per chassis layout

pub mod duty_cycle;
pub mod kinematics;
