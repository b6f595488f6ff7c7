//! Circular auto-layout.
//!
//! x/y depend only on the ordinal position and the process count; z is the
//! only coordinate that draws from the jitter source.

use std::f64::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::domain::{Position, ProcessId};

/// Supplies the bounded z perturbation for each placed process.
pub trait JitterSource: Send {
    /// Returns a value in `[-amplitude, amplitude]`.
    fn next_offset(&mut self, amplitude: f64) -> f64;
}

pub struct RandomJitter<R = StdRng> {
    rng: R,
}

impl RandomJitter<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> JitterSource for RandomJitter<R> {
    fn next_offset(&mut self, amplitude: f64) -> f64 {
        self.rng.random_range(-amplitude..=amplitude)
    }
}

/// Keeps every process on the z = 0 plane.
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn next_offset(&mut self, _amplitude: f64) -> f64 {
        0.0
    }
}

/// Replays a fixed sequence of offsets, clamped to the amplitude.
pub struct ScriptedJitter {
    offsets: Vec<f64>,
    next: usize,
}

impl ScriptedJitter {
    pub fn new(offsets: Vec<f64>) -> Self {
        Self { offsets, next: 0 }
    }
}

impl JitterSource for ScriptedJitter {
    fn next_offset(&mut self, amplitude: f64) -> f64 {
        if self.offsets.is_empty() {
            return 0.0;
        }
        let value = self.offsets[self.next % self.offsets.len()];
        self.next += 1;
        value.clamp(-amplitude, amplitude)
    }
}

/// Places `ordered` ids evenly on a circle of `radius` around the origin.
///
/// The i-th id sits at angle `i * 2pi / n`. Callers are responsible for the
/// ordering; the orchestrator passes ids sorted ascending. A non-finite
/// radius collapses onto the origin and a non-finite amplitude disables
/// jitter, so this never fails.
pub fn circular_layout(
    ordered: &[ProcessId],
    radius: f64,
    jitter_amplitude: f64,
    jitter: &mut dyn JitterSource,
) -> Vec<(ProcessId, Position)> {
    let count = ordered.len();
    if count == 0 {
        return Vec::new();
    }

    let step = TAU / count as f64;
    let radius = if radius.is_finite() { radius } else { 0.0 };
    let amplitude = if jitter_amplitude.is_finite() {
        jitter_amplitude.abs()
    } else {
        0.0
    };
    ordered
        .iter()
        .enumerate()
        .map(|(index, process_id)| {
            let angle = index as f64 * step;
            let z = if amplitude > 0.0 {
                jitter.next_offset(amplitude).clamp(-amplitude, amplitude)
            } else {
                0.0
            };
            (
                process_id.clone(),
                Position::new(radius * angle.cos(), radius * angle.sin(), z),
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod tests;
