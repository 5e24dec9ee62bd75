// Records consumed and produced by the team divider: players, fixed groups,
// divisions and the pairing history.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque player identifier. Stable for roster members, session scoped for guests.
pub type PlayerId = String;

/// Prefix of generated guest ids. Roster ids never carry it.
pub const GUEST_ID_PREFIX: &str = "guest-";

/// Generate a random identifier with the given prefix (e.g. `m-3f09a1c2d4b5e6f7`).
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}{:016x}", rand::random::<u64>())
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One person eligible for a team: a roster member or a guest ("mercenary").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Informational only. Guests and members are divided identically.
    #[serde(default)]
    pub is_guest: bool,
    /// Kept for the roster screen; the divider never reads it.
    #[serde(default)]
    pub skill_level: Option<u8>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Player {
    /// A roster member with a caller-chosen id.
    pub fn member(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Player {
            id: id.into(),
            name: name.into(),
            is_guest: false,
            skill_level: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// A guest player with a freshly generated, session scoped id.
    pub fn guest(name: impl Into<String>) -> Self {
        Player {
            id: generate_id(GUEST_ID_PREFIX),
            is_guest: true,
            ..Player::member(String::new(), name)
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("fixed group {group_id} needs at least 2 members, has {len}")]
    TooSmall { group_id: String, len: usize },

    #[error("fixed group {group_id} lists player {player_id} more than once")]
    DuplicateMember { group_id: String, player_id: PlayerId },
}

/// Players that must always end up on the same team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedGroup {
    pub id: String,
    pub member_ids: Vec<PlayerId>,
    /// Inactive groups are ignored by the divider.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl FixedGroup {
    /// Create an active group with a generated id, rejecting malformed member lists.
    pub fn new(member_ids: Vec<PlayerId>) -> Result<Self, GroupError> {
        let group = FixedGroup {
            id: generate_id("g-"),
            member_ids,
            active: true,
        };
        group.validate()?;
        Ok(group)
    }

    pub fn validate(&self) -> Result<(), GroupError> {
        if self.member_ids.len() < 2 {
            return Err(GroupError::TooSmall {
                group_id: self.id.clone(),
                len: self.member_ids.len(),
            });
        }
        let mut seen = HashSet::new();
        for id in &self.member_ids {
            if !seen.insert(id.as_str()) {
                return Err(GroupError::DuplicateMember {
                    group_id: self.id.clone(),
                    player_id: id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    /// Whether every member of the group is among `players`.
    pub fn applies_to(&self, players: &[Player]) -> bool {
        self.member_ids
            .iter()
            .all(|id| players.iter().any(|p| p.id == *id))
    }
}

// ---------------------------------------------------------------------------
// Team assignment
// ---------------------------------------------------------------------------

/// The result of one division: an ordered list of team rosters.
///
/// Team order carries no meaning but is stable for display and storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAssignment {
    pub teams: Vec<Vec<Player>>,
}

impl TeamAssignment {
    pub fn new(teams: Vec<Vec<Player>>) -> Self {
        TeamAssignment { teams }
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn team_sizes(&self) -> Vec<usize> {
        self.teams.iter().map(Vec::len).collect()
    }

    pub fn player_count(&self) -> usize {
        self.teams.iter().map(Vec::len).sum()
    }

    /// Index of the team holding the player with `id`, if any.
    pub fn team_of(&self, id: &str) -> Option<usize> {
        self.teams
            .iter()
            .position(|team| team.iter().any(|p| p.id == id))
    }

    /// Every unordered pair of players sharing a team.
    pub fn pairs(&self) -> impl Iterator<Item = PairKey> + '_ {
        self.teams.iter().flat_map(|team| {
            team.iter().enumerate().flat_map(move |(i, a)| {
                team[i + 1..].iter().map(move |b| PairKey::new(&a.id, &b.id))
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Pairing history
// ---------------------------------------------------------------------------

/// Canonical unordered pair of player ids: `PairKey::new(a, b) == PairKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    lo: PlayerId,
    hi: PlayerId,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        PairKey {
            lo: lo.to_string(),
            hi: hi.to_string(),
        }
    }

    pub fn lo(&self) -> &str {
        &self.lo
    }

    pub fn hi(&self) -> &str {
        &self.hi
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

/// How often each pair of players has shared a team in committed divisions.
///
/// Counts only grow through [`crate::division::record_committed_division`];
/// the only way down is a wholesale reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PairEntry>", into = "Vec<PairEntry>")]
pub struct PairHistory {
    counts: BTreeMap<PairKey, u32>,
}

/// Serialized form of one history entry. Ids may contain `-`, so the pair is
/// never flattened into a single string key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairEntry {
    pub a: PlayerId,
    pub b: PlayerId,
    pub count: u32,
}

impl PairHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times `a` and `b` have been teammates (0 if never).
    pub fn count(&self, a: &str, b: &str) -> u32 {
        self.get(&PairKey::new(a, b))
    }

    pub fn get(&self, key: &PairKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PairKey, u32)> {
        self.counts.iter().map(|(k, &v)| (k, v))
    }

    pub(crate) fn increment(&mut self, key: PairKey) {
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);
    }
}

impl FromIterator<(PairKey, u32)> for PairHistory {
    fn from_iter<I: IntoIterator<Item = (PairKey, u32)>>(iter: I) -> Self {
        let mut counts: BTreeMap<PairKey, u32> = BTreeMap::new();
        for (key, count) in iter {
            if count > 0 {
                let total = counts.entry(key).or_insert(0);
                *total = total.saturating_add(count);
            }
        }
        PairHistory { counts }
    }
}

impl From<Vec<PairEntry>> for PairHistory {
    fn from(entries: Vec<PairEntry>) -> Self {
        entries
            .into_iter()
            .map(|e| (PairKey::new(&e.a, &e.b), e.count))
            .collect()
    }
}

impl From<PairHistory> for Vec<PairEntry> {
    fn from(history: PairHistory) -> Self {
        history
            .counts
            .into_iter()
            .map(|(key, count)| PairEntry {
                a: key.lo,
                b: key.hi,
                count,
            })
            .collect()
    }
}
