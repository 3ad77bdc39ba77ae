//! Wheel pulse counting.
//!
//! Each encoder-equipped motor owns a `PulseCounter` that is bumped from the
//! pin's edge interrupt and read by the main control flow. The counter lives
//! in a `static` (or a `mk_static!` cell) so the interrupt handler and the
//! motor driver can both hold a shared reference to it.
//!
//! # Accuracy
//!
//! - A read reflects every edge delivered before it; an edge racing the read
//!   may or may not be seen.
//! - `reset()` racing an in-flight edge can lose or keep that one edge, so a
//!   reset is accurate to ±1 edge.
//! - The count wraps at `u32::MAX`. Moves last seconds, far below that, and
//!   callers take deltas with wrapping subtraction.

use core::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Which pin transitions are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    Rising,
    Falling,
    /// Both edges; doubles the resolution.
    #[default]
    Change,
}

impl EdgeMode {
    /// Edges counted per encoder slot.
    pub const fn multiplier(self) -> u8 {
        match self {
            EdgeMode::Rising | EdgeMode::Falling => 1,
            EdgeMode::Change => 2,
        }
    }
}

/// Edge counter shared between an interrupt handler and the main flow.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU32,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Count one edge. Safe to call from interrupt context: no locks, no
    /// allocation, no logging.
    #[inline]
    pub fn on_edge(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current count.
    #[inline]
    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Best-effort reset to zero (±1 edge, see module docs).
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Errors raised when binding a counter to an edge interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeError {
    /// The pin cannot raise edge interrupts.
    UnsupportedPin(u8),
    /// A counter is already bound to this pin.
    AlreadyAttached(u8),
}

/// Hardware capability: invoke `counter.on_edge()` on every selected edge of `pin`.
pub trait EdgeSource<'a> {
    fn attach(
        &mut self,
        pin: u8,
        mode: EdgeMode,
        counter: &'a PulseCounter,
    ) -> Result<(), EdgeError>;
}

/// Edges needed to roll `distance_cm` on a wheel of `perimeter_cm`.
///
/// `floor(distance / perimeter × edges_per_revolution × edge_multiplier)`;
/// a zero, negative or non-finite result yields 0 (no target).
pub fn compute_target_for_distance(
    distance_cm: f32,
    perimeter_cm: f32,
    edges_per_revolution: u16,
    edge_multiplier: u8,
) -> u32 {
    if !(perimeter_cm > 0.0) || !(distance_cm > 0.0) {
        return 0;
    }
    let rotations = distance_cm / perimeter_cm;
    let target = libm::floorf(rotations * edges_per_revolution as f32 * edge_multiplier as f32);
    if target.is_finite() {
        target as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_matches_formula() {
        // 43 cm on a 21.5 cm wheel = 2 rotations, 20 slots, both edges
        assert_eq!(compute_target_for_distance(43.0, 21.5, 20, 2), 80);
        // 10 cm = 0.4651 rotations -> floor(18.6) = 18
        assert_eq!(compute_target_for_distance(10.0, 21.5, 20, 2), 18);
        assert_eq!(compute_target_for_distance(10.0, 21.5, 20, 1), 9);
    }

    #[test]
    fn test_zero_distance_has_no_target() {
        assert_eq!(compute_target_for_distance(0.0, 21.5, 20, 2), 0);
        assert_eq!(compute_target_for_distance(-5.0, 21.5, 20, 2), 0);
        assert_eq!(compute_target_for_distance(10.0, 0.0, 20, 2), 0);
    }

    #[test]
    fn test_reset_then_edges() {
        let c = PulseCounter::new();
        c.on_edge();
        c.on_edge();
        c.reset();
        for _ in 0..37 {
            c.on_edge();
        }
        assert_eq!(c.get(), 37);
    }

    #[test]
    fn test_edge_multiplier() {
        assert_eq!(EdgeMode::Rising.multiplier(), 1);
        assert_eq!(EdgeMode::Falling.multiplier(), 1);
        assert_eq!(EdgeMode::Change.multiplier(), 2);
    }
}
