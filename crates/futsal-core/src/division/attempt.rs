// One randomized division attempt.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

use crate::model::{FixedGroup, Player, TeamAssignment};

/// Target team sizes for `player_count` players over `team_count` teams.
///
/// Every team gets `player_count / team_count` slots; the first
/// `player_count % team_count` teams get one extra.
pub fn target_sizes(player_count: usize, team_count: usize) -> Vec<usize> {
    if team_count == 0 {
        return Vec::new();
    }
    let base = player_count / team_count;
    let extra = player_count % team_count;
    (0..team_count).map(|i| base + usize::from(i < extra)).collect()
}

/// Shuffle `players`, place the active fixed groups, then fill the remaining
/// players into the currently smallest team.
///
/// Returns `None` when a group cannot be placed: a member was already taken by
/// an earlier group, is missing from `players`, or no team has room for the
/// whole group. The caller is expected to simply try again.
pub fn attempt_division<R: Rng + ?Sized>(
    players: &[Player],
    team_count: usize,
    fixed_groups: &[FixedGroup],
    rng: &mut R,
) -> Option<TeamAssignment> {
    let mut shuffled: Vec<&Player> = players.iter().collect();
    shuffled.shuffle(rng);

    let targets = target_sizes(shuffled.len(), team_count);
    let mut teams: Vec<Vec<Player>> = vec![Vec::new(); team_count];
    let mut assigned: HashSet<&str> = HashSet::new();

    for group in fixed_groups.iter().filter(|g| g.active) {
        let mut members: Vec<&Player> = Vec::with_capacity(group.len());
        for id in &group.member_ids {
            match shuffled
                .iter()
                .find(|p| p.id == *id && !assigned.contains(p.id.as_str()))
                .copied()
            {
                Some(player) => members.push(player),
                None => {
                    trace!("fixed group {} member {} unavailable, discarding attempt", group.id, id);
                    return None;
                }
            }
        }

        let Some(slot) = teams
            .iter()
            .zip(&targets)
            .position(|(team, &target)| team.len() + members.len() <= target)
        else {
            trace!("no team has room for fixed group {}, discarding attempt", group.id);
            return None;
        };

        for &player in &members {
            assigned.insert(player.id.as_str());
        }
        teams[slot].extend(members.into_iter().cloned());
    }

    for player in shuffled {
        if assigned.contains(player.id.as_str()) {
            continue;
        }
        let smallest = smallest_team(&teams);
        teams[smallest].push(player.clone());
    }

    Some(TeamAssignment::new(teams))
}

/// Index of the team with the fewest players; the lowest index wins ties.
fn smallest_team(teams: &[Vec<Player>]) -> usize {
    teams
        .iter()
        .enumerate()
        .fold(0, |min_idx, (idx, team)| {
            if team.len() < teams[min_idx].len() {
                idx
            } else {
                min_idx
            }
        })
}
