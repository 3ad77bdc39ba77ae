//! DC motor driver behind an H-bridge fed by the PWM expander.
//!
//! Each motor uses three expander channels: one enable channel carrying the
//! speed as a duty cycle, and two direction channels (IN1/IN2) driven to
//! complementary full/zero duty. Both direction channels at full duty short
//! the motor terminals and brake it.
//!
//! An optional encoder feeds a [`PulseCounter`]; with one, `front`/`back`
//! accept a distance and derive the edge count at which the move is done.

use core::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::encoder::{compute_target_for_distance, EdgeError, EdgeMode, EdgeSource, PulseCounter};
use super::expander::{Expander, ExpanderError, PwmOutput, CHANNEL_COUNT};
use crate::utils::math::duty_cycle::DutyCycleMapper;

/// Maximum speed on the 0–100 scale.
pub const FULL_SPEED: f32 = 100.0;
/// Speed (and direction-channel duty) meaning "off".
pub const STOP_SPEED: f32 = 0.0;

/// Encoder wiring for one motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Digital input raising the edges.
    pub pin: u8,
    /// Encoder slots per wheel revolution.
    pub edges_per_revolution: u16,
    #[serde(default)]
    pub mode: EdgeMode,
}

/// Static wiring and wheel geometry of one motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    pub enable_channel: u8,
    pub in1_channel: u8,
    pub in2_channel: u8,
    #[serde(default)]
    pub encoder: Option<EncoderConfig>,
    /// Wheel radius (cm).
    pub wheel_radius: f32,
    /// Measured wheel perimeter (cm); overrides `2πr` when set.
    #[serde(default)]
    pub perimeter: Option<f32>,
    /// Swap the clockwise sense for a motor mounted mirrored.
    #[serde(default)]
    pub inverted: bool,
}

impl MotorConfig {
    /// Wheel perimeter used for distance conversion (cm).
    pub fn perimeter(&self) -> f32 {
        self.perimeter.unwrap_or(2.0 * PI * self.wheel_radius)
    }
}

/// Errors raised by the motor driver.
#[derive(Debug)]
pub enum MotorError<E: core::fmt::Debug> {
    Expander(ExpanderError<E>),
    Edge(EdgeError),
    /// Speed outside the accepted range (or NaN).
    SpeedOutOfRange(f32),
    /// Negative (or NaN) travel distance.
    NegativeDistance(f32),
    /// Wheel radius or perimeter not strictly positive.
    InvalidRadius(f32),
}

impl<E: core::fmt::Debug> From<ExpanderError<E>> for MotorError<E> {
    fn from(e: ExpanderError<E>) -> Self {
        MotorError::Expander(e)
    }
}

impl<E: core::fmt::Debug> From<EdgeError> for MotorError<E> {
    fn from(e: EdgeError) -> Self {
        MotorError::Edge(e)
    }
}

/// Rotation sense of the motor shaft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    fn from_clockwise(clockwise: bool) -> Self {
        if clockwise {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        }
    }
}

/// What the H-bridge is currently told to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorState {
    /// Unpowered and braked.
    Stopped,
    Driving { direction: Direction, speed: f32 },
    /// Unpowered, coasting.
    Slowing,
    /// Braked; the enable channel keeps its last duty.
    Blocked,
}

/// One DC motor on the H-bridge.
pub struct Motor<'a, P> {
    expander: Expander<P>,
    config: MotorConfig,
    counter: &'a PulseCounter,
    perimeter: f32,
    target: u32,
    speed: f32,
    pwm: u16,
    direction: Direction,
    state: MotorState,
}

impl<'a, P: PwmOutput> Motor<'a, P> {
    /// Build a motor on `device`, counting encoder edges into `counter`.
    ///
    /// Channels and wheel geometry are validated here; nothing is written to
    /// the device until [`begin`](Self::begin).
    pub fn new(
        device: P,
        config: MotorConfig,
        counter: &'a PulseCounter,
    ) -> Result<Self, MotorError<P::Error>> {
        Self::with_mapper(device, config, counter, DutyCycleMapper::default())
    }

    pub fn with_mapper(
        device: P,
        config: MotorConfig,
        counter: &'a PulseCounter,
        mapper: DutyCycleMapper,
    ) -> Result<Self, MotorError<P::Error>> {
        for channel in [config.enable_channel, config.in1_channel, config.in2_channel] {
            if channel >= CHANNEL_COUNT {
                return Err(ExpanderError::InvalidChannel(channel).into());
            }
        }
        if !(config.wheel_radius > 0.0) {
            return Err(MotorError::InvalidRadius(config.wheel_radius));
        }
        let perimeter = config.perimeter();
        if !(perimeter > 0.0) {
            return Err(MotorError::InvalidRadius(perimeter));
        }

        Ok(Motor {
            expander: Expander::with_mapper(device, mapper),
            config,
            counter,
            perimeter,
            target: 0,
            speed: STOP_SPEED,
            pwm: 0,
            direction: Direction::Clockwise,
            state: MotorState::Stopped,
        })
    }

    /// Initialize the expander, park the motor unpowered and clockwise, and
    /// bind the encoder edge interrupt if one is configured.
    ///
    /// Call once: a second call attaches the interrupt again.
    pub fn begin<S: EdgeSource<'a>>(
        &mut self,
        edges: &mut S,
    ) -> Result<(), MotorError<P::Error>> {
        self.expander.begin()?;
        self.expander.set_duty_cycle(self.config.enable_channel, STOP_SPEED)?;
        self.pwm = 0;
        self.speed = STOP_SPEED;
        self.set_direction(true)?;
        self.state = MotorState::Stopped;

        if let Some(encoder) = self.encoder() {
            edges.attach(encoder.pin, encoder.mode, self.counter)?;
            tracing::info!(
                "Motor on EN{} counting {:?} edges on pin {}",
                self.config.enable_channel,
                encoder.mode,
                encoder.pin
            );
        } else {
            tracing::info!("Motor on EN{} has no encoder", self.config.enable_channel);
        }
        Ok(())
    }

    /// Drive exactly one direction channel at full duty.
    pub fn set_direction(
        &mut self,
        clockwise: bool,
    ) -> Result<(), MotorError<P::Error>> {
        let (in1, in2) = if clockwise != self.config.inverted {
            (FULL_SPEED, STOP_SPEED)
        } else {
            (STOP_SPEED, FULL_SPEED)
        };
        self.expander.set_duty_cycle(self.config.in1_channel, in1)?;
        self.expander.set_duty_cycle(self.config.in2_channel, in2)?;

        self.direction = Direction::from_clockwise(clockwise);
        if let MotorState::Driving { speed, .. } = self.state {
            self.state = MotorState::Driving {
                direction: self.direction,
                speed,
            };
        }
        Ok(())
    }

    /// Turn clockwise at `speed`, for `length` cm when an encoder is fitted
    /// (0 = until told otherwise).
    pub fn front(
        &mut self,
        speed: f32,
        length: f32,
    ) -> Result<(), MotorError<P::Error>> {
        self.drive(true, speed, length)
    }

    /// Turn counter-clockwise at `speed`, for `length` cm when an encoder is
    /// fitted (0 = until told otherwise).
    pub fn back(
        &mut self,
        speed: f32,
        length: f32,
    ) -> Result<(), MotorError<P::Error>> {
        self.drive(false, speed, length)
    }

    fn drive(
        &mut self,
        clockwise: bool,
        speed: f32,
        length: f32,
    ) -> Result<(), MotorError<P::Error>> {
        check_speed(speed)?;
        if !(length >= 0.0) {
            return Err(MotorError::NegativeDistance(length));
        }

        self.target = 0;
        if self.has_interrupt() && length > 0.0 {
            self.reset_counter();
            self.update_interrupt_target(length);
        }
        self.set_direction(clockwise)?;
        self.set_speed(speed)
    }

    /// Write `speed` (0–100) to the enable channel.
    pub fn set_speed(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError<P::Error>> {
        check_speed(speed)?;
        self.pwm = self.expander.set_duty_cycle(self.config.enable_channel, speed)?;
        self.speed = speed;
        self.state = MotorState::Driving {
            direction: self.direction,
            speed,
        };
        Ok(())
    }

    /// Write a raw tick to the enable channel; the speed read-back follows
    /// the inverse duty mapping.
    pub fn set_pwm(
        &mut self,
        pwm: u16,
    ) -> Result<(), MotorError<P::Error>> {
        self.expander.set_pwm(self.config.enable_channel, pwm)?;
        self.pwm = pwm;
        self.speed = self.expander.mapper().to_duty(pwm);
        self.state = MotorState::Driving {
            direction: self.direction,
            speed: self.speed,
        };
        Ok(())
    }

    /// Cut power; the motor coasts.
    pub fn slow(&mut self) -> Result<(), MotorError<P::Error>> {
        self.expander.set_duty_cycle(self.config.enable_channel, STOP_SPEED)?;
        self.pwm = 0;
        self.speed = STOP_SPEED;
        self.state = MotorState::Slowing;
        Ok(())
    }

    /// Short both motor terminals to brake.
    pub fn block(&mut self) -> Result<(), MotorError<P::Error>> {
        self.expander.set_duty_cycle(self.config.in1_channel, FULL_SPEED)?;
        self.expander.set_duty_cycle(self.config.in2_channel, FULL_SPEED)?;
        self.state = MotorState::Blocked;
        Ok(())
    }

    /// Cut power, then brake.
    pub fn stop(&mut self) -> Result<(), MotorError<P::Error>> {
        self.slow()?;
        self.block()?;
        self.state = MotorState::Stopped;
        Ok(())
    }

    /// Stop and drop the distance target: the motor sits out the next move.
    pub fn hold(&mut self) -> Result<(), MotorError<P::Error>> {
        self.target = 0;
        self.stop()
    }

    /// Edges counted since the last reset; always 0 without an encoder.
    pub fn get_counter(&self) -> u32 {
        if self.has_interrupt() {
            self.counter.get()
        } else {
            0
        }
    }

    pub fn reset_counter(&self) {
        self.counter.reset();
    }

    /// Shared counter behind this motor.
    pub fn counter(&self) -> &'a PulseCounter {
        self.counter
    }

    /// Last tick written to the enable channel.
    pub fn get_pwm(&self) -> u16 {
        self.pwm
    }

    pub fn get_speed(&self) -> f32 {
        self.speed
    }

    /// Whether an encoder is fitted.
    pub fn has_interrupt(&self) -> bool {
        self.encoder().is_some()
    }

    /// Edge count ending the current move; 0 = no target.
    pub fn get_target_interrupt(&self) -> u32 {
        self.target
    }

    pub fn get_radius(&self) -> f32 {
        self.config.wheel_radius
    }

    pub fn get_perimeter(&self) -> f32 {
        self.perimeter
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Edges counted per centimeter of travel; 0 without an encoder.
    pub fn ticks_per_cm(&self) -> f32 {
        match self.encoder() {
            Some(e) => e.edges_per_revolution as f32 * e.mode.multiplier() as f32 / self.perimeter,
            None => 0.0,
        }
    }

    /// Whether the current target is set and reached.
    pub fn target_reached(&self) -> bool {
        self.target > 0 && self.get_counter() >= self.target
    }

    fn encoder(&self) -> Option<EncoderConfig> {
        self.config
            .encoder
            .filter(|e| e.edges_per_revolution > 0)
    }

    fn update_interrupt_target(
        &mut self,
        length: f32,
    ) {
        if let Some(e) = self.encoder() {
            self.target = compute_target_for_distance(
                length,
                self.perimeter,
                e.edges_per_revolution,
                e.mode.multiplier(),
            );
        }
    }
}

fn check_speed<E: core::fmt::Debug>(speed: f32) -> Result<(), MotorError<E>> {
    if (STOP_SPEED..=FULL_SPEED).contains(&speed) {
        Ok(())
    } else {
        Err(MotorError::SpeedOutOfRange(speed))
    }
}
