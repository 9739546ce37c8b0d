use std::time::Duration;

/// `base ± sample * range`, floored at zero. `sample` is in `[-1.0, 1.0]`.
#[must_use]
pub fn jittered_delay(base: Duration, range: Duration, sample: f64) -> Duration {
    let secs = base.as_secs_f64() + sample.clamp(-1.0, 1.0) * range.as_secs_f64();
    Duration::from_secs_f64(secs.max(0.0))
}

/// Politeness pause drawn uniformly from `base ± range`.
#[must_use]
pub fn politeness_pause(base: Duration, range: Duration) -> Duration {
    if range.is_zero() {
        return base;
    }
    let sample = rand::random::<f64>().mul_add(2.0, -1.0);
    jittered_delay(base, range, sample)
}

/// Retry wait before attempt `attempt + 1`: `base * 2^attempt`.
#[must_use]
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(31))
}
