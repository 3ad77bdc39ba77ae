//! Utility re-exports and helper macros for the differential-wheel bot.
//!
//! - `controllers`: PWM expander, pulse counters, motor drivers, the
//!   differential synchronizer and the movement facade
//! - `math`: duty-cycle mapping and chassis curve kinematics
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod controllers;
pub mod math;

pub use controllers::movement::Movement;
pub use controllers::synchronizer::CancelSignal;
pub use math::duty_cycle::DutyCycleMapper;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
