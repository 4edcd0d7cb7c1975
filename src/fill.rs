//! Deterministic input generation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Largest value written by [`fill_random`].
pub const MAX_FILL_VALUE: i32 = 0xff;

/// Fill `values` with pseudo-random integers in `0..=MAX_FILL_VALUE`.
///
/// The same seed always produces the same array. With values this small a
/// block of up to 2^23 elements cannot overflow its `i32` partial sum.
pub fn fill_random(values: &mut [i32], seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for value in values.iter_mut() {
        *value = rng.gen_range(0..=MAX_FILL_VALUE);
    }
}

/// Allocate and fill an input array of `len` elements.
pub fn random_input(len: usize, seed: u64) -> Vec<i32> {
    let mut values = vec![0; len];
    fill_random(&mut values, seed);
    values
}
