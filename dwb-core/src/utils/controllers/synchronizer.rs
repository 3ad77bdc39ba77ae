//! Differential wheel synchronizer.
//!
//! While both drive motors run, the synchronizer samples their pulse counters
//! every `period_ms` for `exec_time_ms`, compares the right/left tick ratio
//! against the expected one and nudges the lagging wheel's PWM. There is no
//! absolute position sensor: only the relative tick counts are used.
//!
//! Sampling starts with a snapshot at t = 0, so a full window takes
//! `exec_time_ms / period_ms + 1` raw ticks. The first `samples_to_skip` of
//! them cover motor spin-up and are dropped; the rest are kept in a
//! pre-sized buffer until the next move.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::expander::{PwmOutput, MAX_TICK};
use super::motor::{Motor, MotorError};

/// Raised (from any context) to abort the move in progress at its next tick.
pub type CancelSignal = Signal<CriticalSectionRawMutex, ()>;

/// Default capacity of the retained-sample buffer.
pub const SAMPLE_CAPACITY: usize = 64;

/// Sampling cadence and correction tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sample period (ms).
    pub period_ms: u32,
    /// Total sampling window (ms).
    pub exec_time_ms: u32,
    /// Leading raw ticks dropped as spin-up transient.
    pub samples_to_skip: u32,
    /// Proportional gain applied to the ratio deviation.
    pub gain: f32,
    /// Dead band on `|ratio / expected - 1|`.
    pub tolerance: f32,
    /// Lowest PWM tick a correction may command. The default is the tick of
    /// the stock minimum speed (50 %), so a slowest-speed move starts inside
    /// the band.
    pub min_pwm: u16,
    /// Highest PWM tick a correction may command.
    pub max_pwm: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period_ms: 50,
            exec_time_ms: 3000,
            samples_to_skip: 4,
            gain: 0.5,
            tolerance: 0.01,
            min_pwm: 2047,
            max_pwm: 4095,
        }
    }
}

impl SyncConfig {
    /// Sampling ticks after the t = 0 snapshot.
    pub fn raw_ticks(&self) -> u32 {
        self.exec_time_ms / self.period_ms.max(1)
    }

    /// Samples kept for a full window: `T/P - (S - 1)`.
    pub fn retained_len(&self) -> usize {
        (self.raw_ticks() as usize + 1).saturating_sub(self.samples_to_skip as usize)
    }
}

/// Invalid synchronizer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncError {
    InvalidPeriod(u32),
    /// Window shorter than one period.
    WindowTooShort(u32),
    InvalidPwmLimits { min: u16, max: u16 },
    InvalidGain(f32),
    InvalidTolerance(f32),
    /// A full window would retain more samples than the buffer holds.
    CapacityExceeded { needed: usize, capacity: usize },
}

/// One retained sampling tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Commanded PWM ticks while these edges were counted.
    pub pwm_left: u16,
    pub pwm_right: u16,
    /// Edges since the previous tick.
    pub ticks_left: u32,
    pub ticks_right: u32,
    /// `ticks_right / ticks_left`; `None` when the left wheel saw no edge.
    pub ratio: Option<f32>,
}

/// How much of the loop could run with the fitted encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Both encoders present: ratio correction active.
    Corrected,
    /// Ratio correction impossible (one encoder, or one wheel planned idle);
    /// targets still end the move.
    Uncorrected,
    /// No encoders: plain timed drive.
    Timed,
}

/// When targeted wheels end the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Stop both wheels as soon as either reaches its target.
    Either,
    /// Stop each wheel at its own target; done once all targeted wheels stop.
    Each,
}

/// Parameters of one synchronized move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncRequest {
    /// Expected right/left tick ratio; 0 disables correction.
    pub expected_ratio: f32,
    pub stop: StopPolicy,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFinish {
    TargetReached,
    WindowElapsed,
    Cancelled,
}

/// Summary of one synchronized move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub finish: SyncFinish,
    /// Raw ticks taken, including the t = 0 snapshot and skipped ones.
    pub ticks: u32,
    /// PWM corrections issued.
    pub corrections: u32,
}

/// Fixed-cadence sampler keeping two wheels' travel proportional.
pub struct DifferentialSynchronizer<const N: usize = SAMPLE_CAPACITY> {
    config: SyncConfig,
    samples: Vec<Sample, N>,
}

impl<const N: usize> DifferentialSynchronizer<N> {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        if config.period_ms == 0 {
            return Err(SyncError::InvalidPeriod(config.period_ms));
        }
        if config.exec_time_ms < config.period_ms {
            return Err(SyncError::WindowTooShort(config.exec_time_ms));
        }
        if config.min_pwm > config.max_pwm || config.max_pwm > MAX_TICK {
            return Err(SyncError::InvalidPwmLimits {
                min: config.min_pwm,
                max: config.max_pwm,
            });
        }
        if !(config.gain >= 0.0) {
            return Err(SyncError::InvalidGain(config.gain));
        }
        if !(config.tolerance >= 0.0) {
            return Err(SyncError::InvalidTolerance(config.tolerance));
        }
        let needed = config.retained_len();
        if needed > N {
            return Err(SyncError::CapacityExceeded {
                needed,
                capacity: N,
            });
        }

        Ok(Self {
            config,
            samples: Vec::new(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Samples retained from the last move.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Run one move on two already-started motors.
    ///
    /// Counters are reset at t = 0. The loop waits `period_ms` between ticks
    /// and checks `cancel` once per tick. Whatever ends the loop, both motors
    /// are stopped (unpowered and braked) before returning.
    pub fn run<'a, P, D>(
        &mut self,
        left: &mut Motor<'a, P>,
        right: &mut Motor<'a, P>,
        request: SyncRequest,
        delay: &mut D,
        cancel: &CancelSignal,
    ) -> Result<SyncReport, MotorError<P::Error>>
    where
        P: PwmOutput,
        D: DelayNs,
    {
        self.samples.clear();

        let mode = match (left.has_interrupt(), right.has_interrupt()) {
            (true, true) if request.expected_ratio > 0.0 && request.expected_ratio.is_finite() => {
                SyncMode::Corrected
            }
            (true, true) => SyncMode::Uncorrected,
            (false, false) => {
                tracing::warn!("No encoders fitted, driving on time only");
                SyncMode::Timed
            }
            (l, r) => {
                tracing::warn!(
                    "Only one encoder fitted (left: {}, right: {}), ratio correction disabled",
                    l,
                    r
                );
                SyncMode::Uncorrected
            }
        };

        left.reset_counter();
        right.reset_counter();

        let raw_ticks = self.config.raw_ticks();
        let skip = self.config.samples_to_skip;
        tracing::info!(
            "Sync start: {:?}, {} ticks of {}ms, targets {}/{}",
            mode,
            raw_ticks,
            self.config.period_ms,
            left.get_target_interrupt(),
            right.get_target_interrupt()
        );

        let mut last = (0u32, 0u32);
        let mut running = (true, true);
        let mut corrections = 0;
        let mut finish = SyncFinish::WindowElapsed;
        let mut tick = 0;

        while tick <= raw_ticks {
            if tick > 0 {
                delay.delay_ms(self.config.period_ms);
            }
            if cancel.try_take().is_some() {
                finish = SyncFinish::Cancelled;
                break;
            }
            tick += 1;
            if mode == SyncMode::Timed {
                continue;
            }

            let now = (left.get_counter(), right.get_counter());
            let ticks_left = now.0.wrapping_sub(last.0);
            let ticks_right = now.1.wrapping_sub(last.1);
            last = now;

            if self.targets_done(left, right, &mut running, request.stop)? {
                finish = SyncFinish::TargetReached;
                break;
            }

            if tick <= skip {
                continue;
            }

            let ratio = if ticks_left == 0 {
                None
            } else {
                Some(ticks_right as f32 / ticks_left as f32)
            };
            let sample = Sample {
                pwm_left: left.get_pwm(),
                pwm_right: right.get_pwm(),
                ticks_left,
                ticks_right,
                ratio,
            };
            if self.samples.push(sample).is_err() {
                tracing::warn!("Sample buffer full at tick {}", tick);
            }
            tracing::debug!(
                "tick {}: L {} @{} R {} @{} ratio {:?}",
                tick,
                ticks_left,
                sample.pwm_left,
                ticks_right,
                sample.pwm_right,
                ratio
            );

            if mode == SyncMode::Corrected && running.0 && running.1 {
                if let Some(ratio) = ratio {
                    let deviation = ratio / request.expected_ratio - 1.0;
                    if self.correct(left, right, deviation)? {
                        corrections += 1;
                    }
                }
            }
        }

        left.stop()?;
        right.stop()?;

        let report = SyncReport {
            mode,
            finish,
            ticks: tick,
            corrections,
        };
        tracing::info!(
            "Sync done: {:?} after {} ticks, {} corrections, counts {}/{}",
            finish,
            tick,
            corrections,
            left.get_counter(),
            right.get_counter()
        );
        Ok(report)
    }

    /// Apply the stop policy; `true` once the move is complete.
    fn targets_done<'a, P: PwmOutput>(
        &self,
        left: &mut Motor<'a, P>,
        right: &mut Motor<'a, P>,
        running: &mut (bool, bool),
        stop: StopPolicy,
    ) -> Result<bool, MotorError<P::Error>> {
        match stop {
            StopPolicy::Either => Ok(left.target_reached() || right.target_reached()),
            StopPolicy::Each => {
                if running.0 && left.target_reached() {
                    left.stop()?;
                    running.0 = false;
                }
                if running.1 && right.target_reached() {
                    right.stop()?;
                    running.1 = false;
                }
                let targeted = (left.get_target_interrupt() > 0, right.get_target_interrupt() > 0);
                Ok((targeted.0 || targeted.1)
                    && (!targeted.0 || !running.0)
                    && (!targeted.1 || !running.1))
            }
        }
    }

    /// Speed up the lagging wheel, or slow the leading one once the lagging
    /// wheel is at `max_pwm`. `deviation > 0` means the right wheel leads.
    fn correct<'a, P: PwmOutput>(
        &self,
        left: &mut Motor<'a, P>,
        right: &mut Motor<'a, P>,
        deviation: f32,
    ) -> Result<bool, MotorError<P::Error>> {
        let magnitude = libm::fabsf(deviation);
        if magnitude < self.config.tolerance {
            return Ok(false);
        }

        let (min, max) = (self.config.min_pwm, self.config.max_pwm);
        let (slow, fast) = if deviation > 0.0 {
            (left, right)
        } else {
            (right, left)
        };
        let step = libm::ceilf(self.config.gain * magnitude * slow.get_pwm() as f32);
        let step = (step as u32).clamp(1, MAX_TICK as u32) as u16;

        if slow.get_pwm() < max {
            let pwm = slow.get_pwm().saturating_add(step).clamp(min, max);
            tracing::debug!("raise lagging wheel {} -> {}", slow.get_pwm(), pwm);
            slow.set_pwm(pwm)?;
        } else if fast.get_pwm() > min {
            let pwm = fast.get_pwm().saturating_sub(step).clamp(min, max);
            tracing::debug!("lower leading wheel {} -> {}", fast.get_pwm(), pwm);
            fast.set_pwm(pwm)?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }
}
