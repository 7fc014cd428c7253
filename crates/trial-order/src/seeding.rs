//! Seed derivation. Every stochastic step builds its own generator from the
//! participant id and a step counter, so a rerun with the same inputs and
//! seed bases reproduces every draw.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn step_seed(participant: u32, counter: u64) -> u64 {
    u64::from(participant) * 1000 + counter
}

pub fn foil_verb_seed(participant: u32, counter: u64) -> u64 {
    u64::from(participant) * 10000 + counter
}

pub fn rng_from_seed(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
