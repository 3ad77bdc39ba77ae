//! Movement facade for a two-sided drive.
//!
//! `Movement` coordinates the left and right [`Motor`]s: straight lines go
//! through the [`DifferentialSynchronizer`] with an expected tick ratio of
//! one wheel-distance to the other, curves ask the chassis
//! [`ChassisGeometry`] for per-wheel speeds and distances and reuse the same
//! motors and synchronizer.

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use super::encoder::EdgeSource;
use super::expander::PwmOutput;
use super::motor::{Motor, MotorError, FULL_SPEED, STOP_SPEED};
use super::synchronizer::{
    CancelSignal, DifferentialSynchronizer, Sample, StopPolicy, SyncConfig, SyncError, SyncFinish, SyncMode,
    SyncReport, SyncRequest, SAMPLE_CAPACITY,
};
use crate::utils::math::kinematics::{ChassisGeometry, GeometryError, WheelPlan};

/// Index of the left motor in [`Movement::get_motors`].
pub const MOTOR_LEFT: usize = 0;
/// Index of the right motor in [`Movement::get_motors`].
pub const MOTOR_RIGHT: usize = 1;

/// Speed range accepted for movement commands (0–100 scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedLimits {
    pub min_speed: f32,
    pub max_speed: f32,
}

impl Default for SpeedLimits {
    fn default() -> Self {
        Self {
            min_speed: 50.0,
            max_speed: 100.0,
        }
    }
}

/// Tuning shared by every move.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub limits: SpeedLimits,
}

/// Errors raised by movement commands.
#[derive(Debug)]
pub enum MovementError<E: core::fmt::Debug> {
    Motor(MotorError<E>),
    Sync(SyncError),
    Geometry(GeometryError),
    /// Speed limits outside 0–100 or inverted.
    InvalidLimits(SpeedLimits),
}

impl<E: core::fmt::Debug> From<MotorError<E>> for MovementError<E> {
    fn from(e: MotorError<E>) -> Self {
        MovementError::Motor(e)
    }
}

impl<E: core::fmt::Debug> From<SyncError> for MovementError<E> {
    fn from(e: SyncError) -> Self {
        MovementError::Sync(e)
    }
}

impl<E: core::fmt::Debug> From<GeometryError> for MovementError<E> {
    fn from(e: GeometryError) -> Self {
        MovementError::Geometry(e)
    }
}

/// Two motors, a chassis layout and the synchronizer driving them.
pub struct Movement<'a, P, G> {
    motors: [Motor<'a, P>; 2],
    geometry: G,
    synchronizer: DifferentialSynchronizer<SAMPLE_CAPACITY>,
    limits: SpeedLimits,
    cancel: &'a CancelSignal,
}

impl<'a, P, G> Movement<'a, P, G>
where
    P: PwmOutput,
    G: ChassisGeometry,
{
    pub fn new(
        left: Motor<'a, P>,
        right: Motor<'a, P>,
        geometry: G,
        config: MovementConfig,
        cancel: &'a CancelSignal,
    ) -> Result<Self, MovementError<P::Error>> {
        let limits = config.limits;
        if !(STOP_SPEED..=FULL_SPEED).contains(&limits.min_speed)
            || !(STOP_SPEED..=FULL_SPEED).contains(&limits.max_speed)
            || limits.min_speed > limits.max_speed
        {
            return Err(MovementError::InvalidLimits(limits));
        }

        Ok(Movement {
            motors: [left, right],
            geometry,
            synchronizer: DifferentialSynchronizer::new(config.sync)?,
            limits,
            cancel,
        })
    }

    /// Initialize both motors.
    pub fn begin<S: EdgeSource<'a>>(
        &mut self,
        edges: &mut S,
    ) -> Result<(), MovementError<P::Error>> {
        for motor in self.motors.iter_mut() {
            motor.begin(edges)?;
        }
        tracing::info!("Movement ready, track {}cm", self.geometry.track());
        Ok(())
    }

    /// Drive straight for `length` cm (0 = for the whole sampling window),
    /// forward when `is_front`.
    pub fn line<D: DelayNs>(
        &mut self,
        delay: &mut D,
        speed: f32,
        length: f32,
        is_front: bool,
    ) -> Result<SyncReport, MovementError<P::Error>> {
        self.check_speed(speed)?;
        if !(length >= 0.0) {
            return Err(MotorError::NegativeDistance(length).into());
        }
        self.cancel.reset();
        tracing::info!(
            "Line {} {}cm at {}",
            if is_front { "front" } else { "back" },
            length,
            speed
        );

        let [left, right] = &mut self.motors;
        if is_front {
            left.front(speed, length)?;
            right.front(speed, length)?;
        } else {
            left.back(speed, length)?;
            right.back(speed, length)?;
        }

        let expected_ratio = if left.has_interrupt() && right.has_interrupt() {
            right.ticks_per_cm() / left.ticks_per_cm()
        } else {
            0.0
        };
        let request = SyncRequest {
            expected_ratio,
            stop: StopPolicy::Either,
        };
        Ok(self
            .synchronizer
            .run(left, right, request, delay, self.cancel)?)
    }

    pub fn front<D: DelayNs>(
        &mut self,
        delay: &mut D,
        speed: f32,
        length: f32,
    ) -> Result<SyncReport, MovementError<P::Error>> {
        self.line(delay, speed, length, true)
    }

    pub fn back<D: DelayNs>(
        &mut self,
        delay: &mut D,
        speed: f32,
        length: f32,
    ) -> Result<SyncReport, MovementError<P::Error>> {
        self.line(delay, speed, length, false)
    }

    /// Sweep `angle` degrees around a center `radius` cm from the chassis
    /// center, outer side at `speed`.
    ///
    /// Each wheel stops at its own target. An inner speed scaled below the
    /// minimum is raised to it; the distance targets still hold the arc.
    pub fn curve<D: DelayNs>(
        &mut self,
        delay: &mut D,
        speed: f32,
        radius: f32,
        angle: f32,
        is_left: bool,
    ) -> Result<SyncReport, MovementError<P::Error>> {
        self.check_speed(speed)?;
        let plan = self.geometry.curve_plan(speed, radius, angle, is_left)?;
        self.cancel.reset();
        tracing::info!(
            "Curve {} r={}cm {}deg: L {}cm R {}cm",
            if is_left { "left" } else { "right" },
            radius,
            angle,
            plan.left.distance,
            plan.right.distance
        );

        let limits = self.limits;
        let [left, right] = &mut self.motors;
        if plan.left.distance <= 0.0 && plan.right.distance <= 0.0 {
            left.hold()?;
            right.hold()?;
            self.synchronizer.clear();
            return Ok(SyncReport {
                mode: SyncMode::Uncorrected,
                finish: SyncFinish::TargetReached,
                ticks: 0,
                corrections: 0,
            });
        }
        drive_wheel(left, plan.left, limits)?;
        drive_wheel(right, plan.right, limits)?;

        let expected_ratio = if left.has_interrupt() && right.has_interrupt() {
            plan.distance_ratio() * right.ticks_per_cm() / left.ticks_per_cm()
        } else {
            0.0
        };
        let request = SyncRequest {
            expected_ratio,
            stop: StopPolicy::Each,
        };
        Ok(self
            .synchronizer
            .run(left, right, request, delay, self.cancel)?)
    }

    pub fn left<D: DelayNs>(
        &mut self,
        delay: &mut D,
        speed: f32,
        radius: f32,
        angle: f32,
    ) -> Result<SyncReport, MovementError<P::Error>> {
        self.curve(delay, speed, radius, angle, true)
    }

    pub fn right<D: DelayNs>(
        &mut self,
        delay: &mut D,
        speed: f32,
        radius: f32,
        angle: f32,
    ) -> Result<SyncReport, MovementError<P::Error>> {
        self.curve(delay, speed, radius, angle, false)
    }

    pub fn stop(&mut self) -> Result<(), MovementError<P::Error>> {
        for motor in self.motors.iter_mut() {
            motor.stop()?;
        }
        Ok(())
    }

    pub fn slow(&mut self) -> Result<(), MovementError<P::Error>> {
        for motor in self.motors.iter_mut() {
            motor.slow()?;
        }
        Ok(())
    }

    pub fn block(&mut self) -> Result<(), MovementError<P::Error>> {
        for motor in self.motors.iter_mut() {
            motor.block()?;
        }
        Ok(())
    }

    /// Clear both pulse counters.
    pub fn reset(&mut self) {
        for motor in self.motors.iter() {
            motor.reset_counter();
        }
    }

    /// Distance between the wheel contact lines (cm).
    pub fn get_track(&self) -> f32 {
        self.geometry.track()
    }

    /// Motors as `[left, right]`.
    pub fn get_motors(&self) -> &[Motor<'a, P>; 2] {
        &self.motors
    }

    pub fn get_motors_mut(&mut self) -> &mut [Motor<'a, P>; 2] {
        &mut self.motors
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// Samples retained from the last synchronized move.
    pub fn samples(&self) -> &[Sample] {
        self.synchronizer.samples()
    }

    /// Abort the move in progress at its next sampling tick.
    pub fn cancel(&self) {
        self.cancel.signal(());
    }

    fn check_speed(
        &self,
        speed: f32,
    ) -> Result<(), MovementError<P::Error>> {
        if (self.limits.min_speed..=self.limits.max_speed).contains(&speed) {
            Ok(())
        } else {
            Err(MotorError::SpeedOutOfRange(speed).into())
        }
    }
}

/// Start one wheel on its part of a curve, or hold it braked when it has
/// nothing to travel.
fn drive_wheel<P: PwmOutput>(
    motor: &mut Motor<'_, P>,
    plan: WheelPlan,
    limits: SpeedLimits,
) -> Result<(), MotorError<P::Error>> {
    if plan.distance <= 0.0 {
        return motor.hold();
    }
    let speed = plan.speed.clamp(limits.min_speed, limits.max_speed);
    if plan.forward {
        motor.front(speed, plan.distance)
    } else {
        motor.back(speed, plan.distance)
    }
}
