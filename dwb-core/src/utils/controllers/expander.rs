//! PWM expander boundary for the motor drivers.
//!
//! `PwmOutput` is the only thing the motor drivers need from the PWM device:
//! initialize it and set the on/off window of one of its 16 channels. It is
//! implemented for the PCA9685 over any `embedded-hal` I2C bus, and for
//! `&SharedPwm<T>` so several motors can share one board.

use core::cell::{Cell, Ref, RefCell};

use embedded_hal::i2c::I2c;
use pwm_pca9685::{Channel, Error as PwmError, Pca9685};

use crate::utils::math::duty_cycle::DutyCycleMapper;

/// Number of output channels on the expander.
pub const CHANNEL_COUNT: u8 = 16;
/// Highest tick a channel window may use.
pub const MAX_TICK: u16 = 4095;
/// PCA9685 prescale written on initialization (~60Hz output).
pub const PWM_PRESCALE: u8 = 100;

/// A PWM device exposing per-channel on/off windows.
pub trait PwmOutput {
    type Error: core::fmt::Debug;

    /// Bring the device out of sleep and configure its output frequency.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Set the on/off ticks of `channel`.
    fn set_channel_window(
        &mut self,
        channel: u8,
        on_tick: u16,
        off_tick: u16,
    ) -> Result<(), Self::Error>;
}

/// One PWM board shared by several motors.
///
/// Every motor wraps `&SharedPwm<T>` in its own [`Expander`]; the board is
/// initialized by the first of them only.
pub struct SharedPwm<T> {
    device: RefCell<T>,
    initialized: Cell<bool>,
}

impl<T> SharedPwm<T> {
    pub const fn new(device: T) -> Self {
        Self {
            device: RefCell::new(device),
            initialized: Cell::new(false),
        }
    }

    /// Read access to the underlying device.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.device.borrow()
    }

    pub fn into_inner(self) -> T {
        self.device.into_inner()
    }
}

impl<T: PwmOutput> PwmOutput for &SharedPwm<T> {
    type Error = T::Error;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        if !self.initialized.get() {
            self.device.borrow_mut().initialize()?;
            self.initialized.set(true);
        }
        Ok(())
    }

    fn set_channel_window(
        &mut self,
        channel: u8,
        on_tick: u16,
        off_tick: u16,
    ) -> Result<(), Self::Error> {
        self.device.borrow_mut().set_channel_window(channel, on_tick, off_tick)
    }
}

impl<I2C, E> PwmOutput for Pca9685<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = PwmError<E>;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.enable()?;
        self.set_prescale(PWM_PRESCALE)?;
        tracing::info!("PWM expander enabled, prescale {}", PWM_PRESCALE);
        Ok(())
    }

    fn set_channel_window(
        &mut self,
        channel: u8,
        on_tick: u16,
        off_tick: u16,
    ) -> Result<(), Self::Error> {
        let channel = to_channel(channel).ok_or(PwmError::InvalidInputData)?;
        self.set_channel_on_off(channel, on_tick, off_tick)
    }
}

fn to_channel(index: u8) -> Option<Channel> {
    Some(match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    })
}

/// Errors raised while writing to the expander.
#[derive(Debug)]
pub enum ExpanderError<E: core::fmt::Debug> {
    /// The device itself failed.
    Pwm(E),
    /// Channel index outside `0..16`.
    InvalidChannel(u8),
    /// Tick outside `0..=4095`.
    TickOutOfRange(u16),
}

/// Duty-cycle front end for a [`PwmOutput`].
///
/// Maps 0–100 duty values through a [`DutyCycleMapper`] and validates
/// channels and ticks before anything reaches the device.
pub struct Expander<P> {
    device: P,
    mapper: DutyCycleMapper,
    initialized: bool,
}

impl<P: PwmOutput> Expander<P> {
    pub fn new(device: P) -> Self {
        Self::with_mapper(device, DutyCycleMapper::default())
    }

    pub fn with_mapper(
        device: P,
        mapper: DutyCycleMapper,
    ) -> Self {
        Expander {
            device,
            mapper,
            initialized: false,
        }
    }

    /// Initialize the device once per wrapper; later calls are no-ops.
    /// Wrappers around one [`SharedPwm`] also initialize the board only once.
    pub fn begin(&mut self) -> Result<(), ExpanderError<P::Error>> {
        if !self.initialized {
            self.device.initialize().map_err(ExpanderError::Pwm)?;
            self.initialized = true;
        }
        Ok(())
    }

    /// Write `duty` (0–100, clamped) to `channel` and return the off tick written.
    pub fn set_duty_cycle(
        &mut self,
        channel: u8,
        duty: f32,
    ) -> Result<u16, ExpanderError<P::Error>> {
        let window = self.mapper.to_device_window(duty);
        self.write(channel, window.on_tick, window.off_tick)?;
        Ok(window.off_tick)
    }

    /// Write a raw off tick to `channel`, keeping the pinned on tick.
    pub fn set_pwm(
        &mut self,
        channel: u8,
        tick: u16,
    ) -> Result<(), ExpanderError<P::Error>> {
        self.write(channel, self.mapper.off_point, tick)
    }

    pub fn mapper(&self) -> &DutyCycleMapper {
        &self.mapper
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Release the underlying device.
    pub fn into_inner(self) -> P {
        self.device
    }

    fn write(
        &mut self,
        channel: u8,
        on_tick: u16,
        off_tick: u16,
    ) -> Result<(), ExpanderError<P::Error>> {
        if channel >= CHANNEL_COUNT {
            return Err(ExpanderError::InvalidChannel(channel));
        }
        if on_tick > MAX_TICK {
            return Err(ExpanderError::TickOutOfRange(on_tick));
        }
        if off_tick > MAX_TICK {
            return Err(ExpanderError::TickOutOfRange(off_tick));
        }
        self.device
            .set_channel_window(channel, on_tick, off_tick)
            .map_err(ExpanderError::Pwm)
    }
}
