//! Counter-mixed pseudo-random source for human-timing jitter.
//!
//! Timing variation only needs to look irregular, not be unpredictable, so a
//! multiplicative mix over a process-wide counter avoids a crypto or `rand`
//! dependency entirely.

use std::sync::atomic::{AtomicU64, Ordering};

static JITTER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns the next mixed 64-bit value from the process-wide counter.
pub fn next_jitter_u64() -> u64 {
    let seed = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407
}

/// Returns a value in `[min, max]` inclusive. Degenerate bounds collapse to
/// `min`.
pub fn random_int_in(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    let width = max - min + 1;
    min + next_jitter_u64() % width
}
