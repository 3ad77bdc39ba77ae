//! Curve kinematics for wheeled chassis layouts.
//!
//! A `ChassisGeometry` turns a curve request (outer-wheel speed, turning
//! radius measured from the chassis center, swept angle, turn side) into one
//! `WheelPlan` per drive side. The movement facade then drives the motors and
//! the synchronizer from that plan, whatever the layout.
//!
//! # Example
//! ```rust
//! use dwb_core::utils::math::kinematics::{ChassisGeometry, Differential};
//! let chassis = Differential::new(12.0).unwrap();
//! let plan = chassis.curve_plan(80.0, 30.0, 90.0, true).unwrap();
//! assert!(plan.left.distance < plan.right.distance);
//! ```

use core::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Errors raised for impossible geometric requests or layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    /// Track width must be strictly positive.
    InvalidTrack(f32),
    /// Scrub factor must be at least 1.0.
    InvalidScrub(f32),
    /// Turning radius must be non-negative.
    NegativeRadius(f32),
    /// Swept angle must be non-negative.
    NegativeAngle(f32),
}

/// Command for the wheel(s) on one side of the chassis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelPlan {
    /// Speed on the 0–100 scale.
    pub speed: f32,
    /// Distance to travel along the wheel's own arc (cm).
    pub distance: f32,
    /// `true` when the wheel rolls forward.
    pub forward: bool,
}

/// Per-side plan for one curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePlan {
    pub left: WheelPlan,
    pub right: WheelPlan,
}

impl CurvePlan {
    /// Expected right/left traveled-distance ratio, or 0 when a side stands still.
    pub fn distance_ratio(&self) -> f32 {
        if self.left.distance <= 0.0 || self.right.distance <= 0.0 {
            0.0
        } else {
            self.right.distance / self.left.distance
        }
    }
}

/// Layout-specific mapping from a curve request to per-wheel commands.
pub trait ChassisGeometry {
    /// Distance between the left and right wheel contact lines (cm).
    fn track(&self) -> f32;

    /// Plan a curve of `angle` degrees around a center `radius` cm from the
    /// chassis center, turning left when `is_left`. `speed` is given to the
    /// outer side; the inner side is scaled down.
    fn curve_plan(
        &self,
        speed: f32,
        radius: f32,
        angle: f32,
        is_left: bool,
    ) -> Result<CurvePlan, GeometryError>;
}

/// Two driven wheels on a common axle (plus a free caster).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Differential {
    track: f32,
}

impl Differential {
    pub fn new(track: f32) -> Result<Self, GeometryError> {
        if !(track > 0.0) {
            return Err(GeometryError::InvalidTrack(track));
        }
        Ok(Self { track })
    }
}

impl ChassisGeometry for Differential {
    fn track(&self) -> f32 {
        self.track
    }

    fn curve_plan(
        &self,
        speed: f32,
        radius: f32,
        angle: f32,
        is_left: bool,
    ) -> Result<CurvePlan, GeometryError> {
        arc_plan(self.track, speed, radius, angle, is_left)
    }
}

/// Four wheels with fixed axles, steered by skidding.
///
/// The wheels scrub sideways while turning, so each side must roll further
/// than an ideal differential would. `scrub` (≥ 1.0) widens the effective
/// track to account for it and is calibrated per chassis and floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkidSteer {
    track: f32,
    scrub: f32,
}

impl SkidSteer {
    pub fn new(
        track: f32,
        scrub: f32,
    ) -> Result<Self, GeometryError> {
        if !(track > 0.0) {
            return Err(GeometryError::InvalidTrack(track));
        }
        if !(scrub >= 1.0) {
            return Err(GeometryError::InvalidScrub(scrub));
        }
        Ok(Self { track, scrub })
    }

    pub fn scrub(&self) -> f32 {
        self.scrub
    }

    /// Track width the wheels behave as if they had.
    pub fn effective_track(&self) -> f32 {
        self.track * self.scrub
    }
}

impl ChassisGeometry for SkidSteer {
    fn track(&self) -> f32 {
        self.track
    }

    fn curve_plan(
        &self,
        speed: f32,
        radius: f32,
        angle: f32,
        is_left: bool,
    ) -> Result<CurvePlan, GeometryError> {
        arc_plan(self.effective_track(), speed, radius, angle, is_left)
    }
}

/// Arc lengths of both sides around a common center.
///
/// When the center lies between the wheels (`radius < track / 2`) the inner
/// side rolls backwards; at `radius == 0` the chassis spins in place.
fn arc_plan(
    track: f32,
    speed: f32,
    radius: f32,
    angle: f32,
    is_left: bool,
) -> Result<CurvePlan, GeometryError> {
    if !(radius >= 0.0) {
        return Err(GeometryError::NegativeRadius(radius));
    }
    if !(angle >= 0.0) {
        return Err(GeometryError::NegativeAngle(angle));
    }

    let theta = angle * (PI / 180.0);
    let half = track / 2.0;
    let outer_radius = radius + half;
    let inner_radius = radius - half;

    let outer = WheelPlan {
        speed,
        distance: outer_radius * theta,
        forward: true,
    };
    let inner = WheelPlan {
        speed: speed * libm::fabsf(inner_radius) / outer_radius,
        distance: libm::fabsf(inner_radius) * theta,
        forward: inner_radius >= 0.0,
    };

    Ok(if is_left {
        CurvePlan {
            left: inner,
            right: outer,
        }
    } else {
        CurvePlan {
            left: outer,
            right: inner,
        }
    })
}
