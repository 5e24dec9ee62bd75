// Pairing history update for committed divisions.

use crate::model::{PairHistory, TeamAssignment};

/// Return a copy of `history` with every in-team pair of `assignment` counted
/// once more. `history` itself is left untouched.
///
/// Only call this for divisions that are actually saved; previews and
/// reshuffles must not reach the history.
pub fn record_committed_division(
    assignment: &TeamAssignment,
    history: &PairHistory,
) -> PairHistory {
    let mut updated = history.clone();
    for pair in assignment.pairs() {
        updated.increment(pair);
    }
    updated
}
