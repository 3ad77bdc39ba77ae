//! Module Exports
//!
//! Hardware-facing drivers of the differential-wheel bot, leaves first:
//!
//! - `expander`: PWM output boundary (PCA9685) and the duty-cycle front end
//! - `encoder`: interrupt-fed pulse counters and distance targets
//! - `motor`: one DC motor on an H-bridge
//! - `synchronizer`: fixed-cadence tick-ratio correction between two wheels
//! - `movement`: straight lines and curves over a left/right motor pair

pub mod encoder;
pub mod expander;
pub mod motor;
pub mod movement;
pub mod synchronizer;

pub use encoder::{EdgeError, EdgeMode, EdgeSource, PulseCounter};
pub use expander::{Expander, ExpanderError, PwmOutput, SharedPwm};
pub use motor::{Direction, EncoderConfig, Motor, MotorConfig, MotorError, MotorState};
pub use movement::{MovementConfig, MovementError, SpeedLimits, MOTOR_LEFT, MOTOR_RIGHT};
pub use synchronizer::{
    DifferentialSynchronizer, Sample, StopPolicy, SyncConfig, SyncError, SyncFinish, SyncMode, SyncReport,
    SyncRequest,
};
