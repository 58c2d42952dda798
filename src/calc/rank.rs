use std::cmp::Ordering;

/// Tolerance for treating two computed scores as a tie.
pub const SCORE_EPSILON: f64 = 1e-9;

pub fn scores_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < SCORE_EPSILON
}

/// Descending order for scores; NaN sorts last.
pub fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Competition ranks for a list the caller already sorted.
///
/// The first item is rank 1. Each later item repeats the previous rank when
/// `same` says it ties with its predecessor, otherwise it takes its 1-based
/// position: `[90, 80, 80, 70]` ranks as `[1, 2, 2, 4]`.
pub fn competition_ranks<T, F>(sorted: &[T], same: F) -> Vec<u32>
where
    F: Fn(&T, &T) -> bool,
{
    let mut ranks: Vec<u32> = Vec::with_capacity(sorted.len());
    for (i, item) in sorted.iter().enumerate() {
        let rank = match (i, ranks.last()) {
            (0, _) | (_, None) => 1,
            (_, Some(&prev_rank)) => {
                if same(&sorted[i - 1], item) {
                    prev_rank
                } else {
                    (i + 1) as u32
                }
            }
        };
        ranks.push(rank);
    }
    ranks
}
