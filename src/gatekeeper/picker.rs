//! Uniform choice among equally valid canned responses.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

pub trait ResponsePicker: Send + Sync {
    /// One of `candidates`, or `None` when there are none.
    fn pick<'a>(&self, candidates: &'a [String]) -> Option<&'a str>;
}

/// Picks uniformly at random. [`seeded`](Self::seeded) gives a repeatable
/// sequence for tests.
pub struct RandomPicker {
    rng: Mutex<StdRng>,
}

impl RandomPicker {
    pub fn new() -> Self {
        Self::seeded(rand::random())
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsePicker for RandomPicker {
    fn pick<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        let mut rng = self.rng.lock();
        candidates.choose(&mut *rng).map(String::as_str)
    }
}

/// Always the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstPicker;

impl ResponsePicker for FirstPicker {
    fn pick<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        candidates.first().map(String::as_str)
    }
}
