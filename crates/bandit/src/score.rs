/// UCB1 upper confidence bound: observed click ratio plus an exploration
/// bonus that shrinks as the arm accumulates selects.
///
/// `selects` and `total_selects` must both be at least 1; callers guarantee
/// every arm gets one forced select before it is scored.
pub fn ucb1_score(selects: u64, clicks: u64, total_selects: u64) -> f64 {
    debug_assert!(selects >= 1, "ucb1 score of an arm that was never selected");
    debug_assert!(total_selects >= 1);
    let selects = selects as f64;
    let ratio = clicks as f64 / selects;
    ratio + (2.0 * (total_selects as f64).ln() / selects).sqrt()
}
