//! Simulated hardware shared by the integration tests.
#![allow(dead_code)]

use core::convert::Infallible;

use dwb_core::utils::controllers::{
    EdgeError, EdgeMode, EdgeSource, EncoderConfig, MotorConfig, PulseCounter, PwmOutput, SharedPwm,
};
use dwb_core::utils::CancelSignal;
use embedded_hal::delay::DelayNs;

// host critical-section implementation for `CancelSignal`
use critical_section as _;

pub const LEFT_EN: u8 = 0;
pub const LEFT_IN1: u8 = 1;
pub const LEFT_IN2: u8 = 2;
pub const RIGHT_EN: u8 = 4;
pub const RIGHT_IN1: u8 = 5;
pub const RIGHT_IN2: u8 = 6;
pub const LEFT_PIN: u8 = 34;
pub const RIGHT_PIN: u8 = 35;

/// PWM device remembering every window written.
#[derive(Debug, Default)]
pub struct RecordingPwm {
    pub initialized: usize,
    pub windows: [(u16, u16); 16],
    pub writes: Vec<(u8, u16, u16)>,
}

impl RecordingPwm {
    /// Current off tick of `channel`.
    pub fn off_tick(
        &self,
        channel: u8,
    ) -> u16 {
        self.windows[channel as usize].1
    }

    /// Every off tick written to `channel`, oldest first.
    pub fn history(
        &self,
        channel: u8,
    ) -> Vec<u16> {
        self.writes
            .iter()
            .filter(|(c, _, _)| *c == channel)
            .map(|(_, _, off)| *off)
            .collect()
    }
}

impl PwmOutput for RecordingPwm {
    type Error = Infallible;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.initialized += 1;
        Ok(())
    }

    fn set_channel_window(
        &mut self,
        channel: u8,
        on_tick: u16,
        off_tick: u16,
    ) -> Result<(), Self::Error> {
        self.windows[channel as usize] = (on_tick, off_tick);
        self.writes.push((channel, on_tick, off_tick));
        Ok(())
    }
}

/// Edge source that records bindings and lets the test fire edges by pin.
#[derive(Default)]
pub struct RecordingEdges<'a> {
    pub attached: Vec<(u8, EdgeMode, &'a PulseCounter)>,
}

impl<'a> RecordingEdges<'a> {
    pub fn fire(
        &self,
        pin: u8,
        edges: u32,
    ) {
        for (p, _, counter) in &self.attached {
            if *p == pin {
                for _ in 0..edges {
                    counter.on_edge();
                }
            }
        }
    }
}

impl<'a> EdgeSource<'a> for RecordingEdges<'a> {
    fn attach(
        &mut self,
        pin: u8,
        mode: EdgeMode,
        counter: &'a PulseCounter,
    ) -> Result<(), EdgeError> {
        if self.attached.iter().any(|(p, _, _)| *p == pin) {
            return Err(EdgeError::AlreadyAttached(pin));
        }
        self.attached.push((pin, mode, counter));
        Ok(())
    }
}

/// How the simulated wheels produce edges on each delay.
pub enum WheelRate<'a> {
    /// Fixed edges per sampling period, `[left, right]`.
    Fixed([u32; 2]),
    /// Edges proportional to the commanded enable-channel tick.
    Pwm {
        pwm: &'a SharedPwm<RecordingPwm>,
        channels: [u8; 2],
        edges_per_tick: [f32; 2],
    },
}

/// Delay that advances simulated time by firing encoder edges.
pub struct SimDelay<'a> {
    pub counters: [&'a PulseCounter; 2],
    pub rate: WheelRate<'a>,
    pub calls: u32,
    pub elapsed_ms: u32,
    pub cancel_at: Option<(u32, &'a CancelSignal)>,
    carry: [f32; 2],
}

impl<'a> SimDelay<'a> {
    pub fn new(
        counters: [&'a PulseCounter; 2],
        rate: WheelRate<'a>,
    ) -> Self {
        Self {
            counters,
            rate,
            calls: 0,
            elapsed_ms: 0,
            cancel_at: None,
            carry: [0.0; 2],
        }
    }

    fn advance(
        &mut self,
        ms: u32,
    ) {
        self.calls += 1;
        self.elapsed_ms += ms;
        for side in 0..2 {
            let edges = match &self.rate {
                WheelRate::Fixed(rates) => rates[side],
                WheelRate::Pwm {
                    pwm,
                    channels,
                    edges_per_tick,
                } => {
                    let exact = pwm.borrow().off_tick(channels[side]) as f32 * edges_per_tick[side] + self.carry[side];
                    let whole = exact.floor();
                    self.carry[side] = exact - whole;
                    whole as u32
                }
            };
            for _ in 0..edges {
                self.counters[side].on_edge();
            }
        }
        if let Some((at, cancel)) = self.cancel_at {
            if self.calls == at {
                cancel.signal(());
            }
        }
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.advance(ns / 1_000_000);
    }

    fn delay_ms(
        &mut self,
        ms: u32,
    ) {
        self.advance(ms);
    }
}

/// Motor wiring with a 20-slot encoder counted on both edges and a
/// measured 21.5 cm perimeter.
pub fn motor_config(
    enable: u8,
    in1: u8,
    in2: u8,
    pin: Option<u8>,
) -> MotorConfig {
    MotorConfig {
        enable_channel: enable,
        in1_channel: in1,
        in2_channel: in2,
        encoder: pin.map(|pin| EncoderConfig {
            pin,
            edges_per_revolution: 20,
            mode: EdgeMode::Change,
        }),
        wheel_radius: 3.4,
        perimeter: Some(21.5),
        inverted: false,
    }
}
