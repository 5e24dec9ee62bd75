// Team division: randomized attempts, pairing-history scoring, bounded search,
// and the history update applied when a division is committed.

pub mod attempt;
pub mod history;
pub mod score;
pub mod search;

use thiserror::Error;

use crate::model::{FixedGroup, GroupError, PairHistory, Player, TeamAssignment};

pub use attempt::{attempt_division, target_sizes};
pub use history::record_committed_division;
pub use score::division_score;
pub use search::{Divider, DivisionOutcome, DEFAULT_ATTEMPT_BUDGET};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DivisionError {
    #[error("at least {teams} players are needed for {teams} teams, got {players}")]
    InsufficientPlayers { players: usize, teams: usize },

    #[error("cannot divide teams after {attempts} attempts, check the fixed group settings")]
    Unsatisfiable { attempts: usize },

    #[error("team count must be at least 1")]
    InvalidTeamCount,

    #[error("fixed group {group_id} references player {player_id}, who is not among the players")]
    UnknownGroupMember { group_id: String, player_id: String },

    #[error(transparent)]
    InvalidGroup(#[from] GroupError),
}

/// Divide `players` into `team_count` teams using the thread-local RNG and the
/// default attempt budget.
///
/// `history` is only read. Commit the returned division with
/// [`record_committed_division`] once it is actually saved.
pub fn divide_teams(
    players: &[Player],
    team_count: usize,
    fixed_groups: &[FixedGroup],
    history: &PairHistory,
) -> Result<TeamAssignment, DivisionError> {
    Divider::new()
        .divide(players, team_count, fixed_groups, history)
        .map(|outcome| outcome.assignment)
}
