//! Ratio-threshold landmarks on a smoothed oscillation envelope.
//!
//! The trace runs from high to low cuff pressure, so SYS lies before the
//! envelope peak (MAP) and DIA after it.

/// Index and value of the envelope maximum.  `None` for an empty or
/// non-finite envelope.
pub fn find_map(envelope: &[f64]) -> Option<(usize, f64)> {
    envelope
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// First upward crossing of `threshold` scanning from the start of the run
/// to `map_idx`: the first `i` with `env[i-1] < threshold ≤ env[i]`.
pub fn find_sys(envelope: &[f64], map_idx: usize, threshold: f64) -> Option<usize> {
    let end = map_idx.min(envelope.len().checked_sub(1)?);
    (1..=end).find(|&i| envelope[i - 1] < threshold && envelope[i] >= threshold)
}

/// First downward crossing of `threshold` scanning from `map_idx` to the
/// end of the run: the first `i` with `env[i-1] > threshold ≥ env[i]`.
pub fn find_dia(envelope: &[f64], map_idx: usize, threshold: f64) -> Option<usize> {
    (map_idx + 1..envelope.len())
        .find(|&i| envelope[i - 1] > threshold && envelope[i] <= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV: [f64; 11] = [0.1, 0.2, 0.4, 0.6, 0.9, 1.0, 0.95, 0.85, 0.7, 0.5, 0.3];

    #[test]
    fn map_is_global_maximum() {
        assert_eq!(find_map(&ENV), Some((5, 1.0)));
        assert_eq!(find_map(&[]), None);
        assert_eq!(find_map(&[f64::NAN, 0.5, f64::NAN]), Some((1, 0.5)));
    }

    #[test]
    fn sys_is_first_upward_crossing_before_map() {
        assert_eq!(find_sys(&ENV, 5, 0.55), Some(3));
        assert_eq!(find_sys(&ENV, 5, 0.4), Some(2));
    }

    #[test]
    fn sys_missing_when_envelope_starts_above_threshold() {
        assert_eq!(find_sys(&ENV[3..], 2, 0.55), None);
    }

    #[test]
    fn dia_is_first_downward_crossing_after_map() {
        assert_eq!(find_dia(&ENV, 5, 0.8), Some(8));
        assert_eq!(find_dia(&ENV, 5, 0.95), Some(6));
        assert_eq!(find_dia(&ENV, 5, 0.2), None);
    }

    #[test]
    fn first_crossing_wins_over_later_ones() {
        let env = [0.0, 0.6, 0.3, 0.7, 1.0, 0.5, 0.9, 0.2];
        assert_eq!(find_sys(&env, 4, 0.55), Some(1));
        assert_eq!(find_dia(&env, 4, 0.8), Some(5));
    }
}
