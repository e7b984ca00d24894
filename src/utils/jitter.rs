//! Jitter for retry backoff
//!
//! Values are derived from the system clock.

/// Pseudo-random jitter between 0 and `max_jitter_ms` (inclusive)
///
/// # Examples
/// ```
/// use pictoboard::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(100);
/// assert!(jitter <= 100);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    (nanos % (max_jitter_ms as u128 + 1)) as u64
}

/// Jitter bounded by a percentage of `base_value`
///
/// # Examples
/// ```
/// use pictoboard::utils::jitter::generate_jitter_percent;
///
/// let jitter = generate_jitter_percent(1000, 25);
/// assert!(jitter <= 250);
/// ```
pub fn generate_jitter_percent(base_value: u64, jitter_percent: u8) -> u64 {
    if jitter_percent == 0 || base_value == 0 {
        return 0;
    }

    let max_jitter = base_value.saturating_mul(jitter_percent as u64) / 100;
    generate_jitter_ms(max_jitter)
}
