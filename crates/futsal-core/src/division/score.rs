// Division cost from the pairing history.

use crate::model::{PairHistory, TeamAssignment};

/// Sum of `count^2` over every in-team pair, where `count` is how often the
/// pair has already been teammates. Zero means no pair repeats.
///
/// Squaring makes one pair repeated many times cost far more than the same
/// number of repeats spread over different pairs.
pub fn division_score(assignment: &TeamAssignment, history: &PairHistory) -> u64 {
    assignment
        .pairs()
        .map(|pair| {
            let count = u64::from(history.get(&pair));
            count * count
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PairKey, Player};

    fn team(ids: &[&str]) -> Vec<Player> {
        ids.iter().map(|id| Player::member(*id, *id)).collect()
    }

    #[test]
    fn empty_history_scores_zero() {
        let assignment = TeamAssignment::new(vec![team(&["a", "b", "c"]), team(&["d", "e"])]);
        assert_eq!(division_score(&assignment, &PairHistory::new()), 0);
    }

    #[test]
    fn repeated_pairs_are_squared() {
        let history: PairHistory = vec![
            (PairKey::new("a", "b"), 3),
            (PairKey::new("c", "a"), 1),
            (PairKey::new("d", "e"), 2),
            // Cross-team pair: never counted.
            (PairKey::new("a", "d"), 5),
        ]
        .into_iter()
        .collect();
        let assignment = TeamAssignment::new(vec![team(&["a", "b", "c"]), team(&["d", "e"])]);
        assert_eq!(division_score(&assignment, &history), 9 + 1 + 4);
    }

    #[test]
    fn concentrated_repeats_cost_more_than_spread_ones() {
        let concentrated: PairHistory = vec![(PairKey::new("a", "b"), 2)].into_iter().collect();
        let spread: PairHistory = vec![(PairKey::new("a", "b"), 1), (PairKey::new("a", "c"), 1)]
            .into_iter()
            .collect();
        let assignment = TeamAssignment::new(vec![team(&["a", "b", "c"])]);
        assert!(division_score(&assignment, &concentrated) > division_score(&assignment, &spread));
    }
}
