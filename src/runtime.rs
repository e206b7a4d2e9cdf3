//! Runtime: global seed for deterministic behavior.
//! Same input, same seed, same parameters -> same output.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;

thread_local! {
    static RNG: RefCell<Option<StdRng>> = RefCell::new(None);
}

/// Set the random seed for this thread. Call before model init or training
/// for reproducible runs: same seed + same call sequence -> same outputs.
pub fn set_seed(seed: u64) {
    RNG.with(|rng| {
        *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed));
    });
}

/// Run a closure with the thread-local RNG (seeded from 0 if unset).
/// Weight initialization and dropout masks all draw through here.
pub fn with_rng<F, T>(f: F) -> T
where
    F: FnOnce(&mut StdRng) -> T,
{
    RNG.with(|rng| {
        let mut opt = rng.borrow_mut();
        if opt.is_none() {
            *opt = Some(StdRng::seed_from_u64(0));
        }
        f(opt.as_mut().unwrap())
    })
}
