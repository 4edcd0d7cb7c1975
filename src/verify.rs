//! Host reference sum and the equality check against the device result.

/// Outcome of comparing a device sum with the host reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    Mismatch { expected: i64, actual: i64 },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

/// Plain left-to-right sum, with no parallelism, used as the reference.
pub fn sequential_sum(values: &[i32]) -> i64 {
    let mut sum = 0i64;
    for &value in values {
        sum += i64::from(value);
    }
    sum
}

/// Finish a two-level reduction by summing the per-block partial sums.
pub fn finish_reduction(partial_sums: &[i32]) -> i64 {
    partial_sums.iter().map(|&partial| i64::from(partial)).sum()
}

/// Exact integer comparison; there is no tolerance.
pub fn verify(device_sum: i64, reference_sum: i64) -> Verdict {
    if device_sum == reference_sum {
        Verdict::Match
    } else {
        Verdict::Mismatch {
            expected: reference_sum,
            actual: device_sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_sum_is_repeatable() {
        let values: Vec<i32> = (0..10_000).map(|i| (i * 7919) % 255 - 100).collect();
        assert_eq!(sequential_sum(&values), sequential_sum(&values));
    }

    #[test]
    fn reference_sum_does_not_wrap_at_i32() {
        let values = vec![i32::MAX; 4];
        assert_eq!(sequential_sum(&values), 4 * i64::from(i32::MAX));
    }

    #[test]
    fn finishing_sum_is_order_independent() {
        let partials = [1024, -3, 77, 0, 5];
        let mut reversed = partials;
        reversed.reverse();
        assert_eq!(finish_reduction(&partials), finish_reduction(&reversed));
        assert_eq!(finish_reduction(&partials), 1103);
    }

    #[test]
    fn off_by_one_is_a_mismatch() {
        assert_eq!(verify(8, 8), Verdict::Match);
        assert_eq!(
            verify(7, 8),
            Verdict::Mismatch {
                expected: 8,
                actual: 7
            }
        );
        assert!(!verify(7, 8).is_match());
    }
}
