// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Decorative waveform bar heights for the assistant's voice UI.
//!
//! Uses the Park–Miller minimal standard generator
//! `s = s * 16807 mod 2147483647` so the same seed always draws the same
//! waveform. Cosmetic only.

/// Seed used when the caller does not supply one.
pub const DEFAULT_SEED: u32 = 42;

const MULTIPLIER: u64 = 16807;
const MODULUS: u64 = 2_147_483_647;

/// Park–Miller generator.
#[derive(Debug, Clone)]
pub struct ParkMiller {
    state: u64,
}

impl ParkMiller {
    /// Seeds are reduced mod 2^31-1; a zero state would stick at zero, so it
    /// becomes 1.
    pub fn new(seed: u32) -> Self {
        let state = u64::from(seed) % MODULUS;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state * MULTIPLIER % MODULUS;
        self.state as u32
    }

    /// Next value in `(0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.next_u32()) / MODULUS as f64
    }
}

/// `bars` heights in `[min, max]`.
pub fn bar_heights(seed: u32, bars: usize, min: f64, max: f64) -> Vec<f64> {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let mut rng = ParkMiller::new(seed);
    (0..bars).map(|_| lo + rng.next_unit() * (hi - lo)).collect()
}
