use std::time::Duration;

/// Delay strategy between reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Constant(Duration),
    /// `base + count * step`
    Linear { base: Duration, step: Duration },
    /// `base * exponent^count`
    Exponential { base: Duration, exponent: f64 },
    /// Uniform in `[min, max]`.
    Random { min: Duration, max: Duration },
}

impl Backoff {
    /// Delay before attempt `count` (starting at 1). Saturates at
    /// `Duration::MAX` instead of overflowing.
    pub fn next(&self, count: u32) -> Duration {
        match *self {
            Backoff::Constant(d) => d,
            Backoff::Linear { base, step } => step
                .checked_mul(count)
                .and_then(|s| base.checked_add(s))
                .unwrap_or(Duration::MAX),
            Backoff::Exponential { base, exponent } => {
                let secs = base.as_secs_f64() * exponent.powi(count.min(i32::MAX as u32) as i32);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
            Backoff::Random { min, max } => {
                if max <= min {
                    return min;
                }
                min + (max - min).mul_f64(rand::random::<f64>())
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(Duration::from_secs(2))
    }
}
