use std::time::Duration;

/// `base * 2^attempt`, capped at `cap`.
pub fn exponential_backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);

        let delays = (0..6)
            .map(|attempt| exponential_backoff(attempt, base, cap).as_secs())
            .collect::<Vec<_>>();

        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn backoff_does_not_overflow() {
        let delay = exponential_backoff(80, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(delay, Duration::from_secs(30));
    }
}
