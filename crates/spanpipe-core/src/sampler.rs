//! Probabilistic head sampling
//!
//! One uniform draw per span at creation time decides whether the span is
//! retained. The decision is never re-evaluated, so a span's fate is fixed
//! for its lifetime and partial export cannot occur. Unretained spans take
//! the cheap no-op path through the rest of the pipeline.

use rand::Rng;

/// Decide whether a span created under the given sampling rate is retained.
///
/// `rate <= 0.0` (including NaN) never samples; `rate >= 1.0` always
/// samples; anything between is a uniform draw in `[0, 1)` compared
/// against the rate.
pub fn should_sample(rate: f64) -> bool {
    if !(rate > 0.0) {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    rand::thread_rng().gen::<f64>() < rate
}
