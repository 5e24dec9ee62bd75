// Squad roster, the per-session participant selection (members plus guests),
// and saved division records.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{generate_id, FixedGroup, Player, PlayerId, TeamAssignment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SquadError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("a player named {0:?} already exists")]
    DuplicateName(String),

    #[error("no squad member with id {0:?}")]
    UnknownMember(String),

    #[error("unknown period {0:?} (expected \"first\" or \"second\")")]
    UnknownPeriod(String),
}

fn clean_name(name: &str) -> Result<String, SquadError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SquadError::EmptyName);
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Squad
// ---------------------------------------------------------------------------

/// A named roster of regular members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Squad {
    pub id: String,
    pub name: String,
    pub members: Vec<Player>,
    pub created_at: DateTime<Utc>,
}

impl Squad {
    pub fn new(name: &str) -> Result<Self, SquadError> {
        Ok(Squad {
            id: generate_id("s-"),
            name: clean_name(name)?,
            members: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn rename(&mut self, name: &str) -> Result<(), SquadError> {
        self.name = clean_name(name)?;
        Ok(())
    }

    /// Add a member with a generated id. Member names are unique within a squad.
    pub fn add_member(&mut self, name: &str) -> Result<&Player, SquadError> {
        let name = clean_name(name)?;
        if self.member_by_name(&name).is_some() {
            return Err(SquadError::DuplicateName(name));
        }
        self.members.push(Player::member(generate_id("m-"), name));
        Ok(&self.members[self.members.len() - 1])
    }

    /// Remove a member from the roster. Callers should also prune the member
    /// from fixed groups ([`prune_fixed_groups`]) and the session selection.
    pub fn remove_member(&mut self, id: &str) -> Result<Player, SquadError> {
        let idx = self
            .members
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| SquadError::UnknownMember(id.to_string()))?;
        Ok(self.members.remove(idx))
    }

    pub fn member(&self, id: &str) -> Option<&Player> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&Player> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Drop `removed_id` from every group; groups left with fewer than two
/// members are deleted. Returns the number of groups deleted.
pub fn prune_fixed_groups(groups: &mut Vec<FixedGroup>, removed_id: &str) -> usize {
    for group in groups.iter_mut() {
        group.member_ids.retain(|id| id != removed_id);
    }
    let before = groups.len();
    groups.retain(|g| g.len() >= 2);
    before - groups.len()
}

// ---------------------------------------------------------------------------
// Session selection
// ---------------------------------------------------------------------------

/// Who is playing today: selected roster members plus ad-hoc guests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    selected: Vec<PlayerId>,
    guests: Vec<Player>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a member's selection. Returns whether the member is now selected.
    pub fn toggle_participant(&mut self, squad: &Squad, id: &str) -> Result<bool, SquadError> {
        if squad.member(id).is_none() {
            return Err(SquadError::UnknownMember(id.to_string()));
        }
        if let Some(idx) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(idx);
            Ok(false)
        } else {
            self.selected.push(id.to_string());
            Ok(true)
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    pub fn select_all(&mut self, squad: &Squad) {
        self.selected = squad.members.iter().map(|m| m.id.clone()).collect();
    }

    /// Clear the member selection. Guests stay until removed.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Forget a member that left the roster.
    pub fn forget_member(&mut self, id: &str) {
        self.selected.retain(|s| s != id);
    }

    /// Add a guest. The name must not clash with a member or another guest.
    pub fn add_guest(&mut self, squad: &Squad, name: &str) -> Result<&Player, SquadError> {
        let name = clean_name(name)?;
        if squad.member_by_name(&name).is_some() || self.guests.iter().any(|g| g.name == name) {
            return Err(SquadError::DuplicateName(name));
        }
        self.guests.push(Player::guest(name));
        Ok(&self.guests[self.guests.len() - 1])
    }

    pub fn remove_guest(&mut self, id: &str) -> Option<Player> {
        let idx = self.guests.iter().position(|g| g.id == id)?;
        Some(self.guests.remove(idx))
    }

    pub fn guests(&self) -> &[Player] {
        &self.guests
    }

    pub fn participant_count(&self) -> usize {
        self.selected.len() + self.guests.len()
    }

    /// The players to divide: selected members in roster order, then guests in
    /// the order they were added.
    pub fn participants(&self, squad: &Squad) -> Vec<Player> {
        squad
            .members
            .iter()
            .filter(|m| self.is_selected(&m.id))
            .chain(self.guests.iter())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Saved divisions
// ---------------------------------------------------------------------------

/// Which half of the session a division was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    FirstHalf,
    SecondHalf,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::FirstHalf => "first_half",
            Period::SecondHalf => "second_half",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::FirstHalf => "first half",
            Period::SecondHalf => "second half",
        })
    }
}

impl FromStr for Period {
    type Err = SquadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" | "first_half" | "1" => Ok(Period::FirstHalf),
            "second" | "second_half" | "2" => Ok(Period::SecondHalf),
            _ => Err(SquadError::UnknownPeriod(s.to_string())),
        }
    }
}

/// A committed division as kept in the squad's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDivision {
    pub id: String,
    pub squad_id: String,
    pub division_date: DateTime<Utc>,
    pub period: Period,
    pub notes: Option<String>,
    pub teams: Vec<Vec<Player>>,
    pub team_count: usize,
}

impl SavedDivision {
    pub fn new(
        squad_id: &str,
        assignment: TeamAssignment,
        period: Period,
        notes: Option<String>,
    ) -> Self {
        SavedDivision {
            id: generate_id("d-"),
            squad_id: squad_id.to_string(),
            division_date: Utc::now(),
            period,
            notes: notes.filter(|n| !n.trim().is_empty()),
            team_count: assignment.team_count(),
            teams: assignment.teams,
        }
    }

    pub fn assignment(&self) -> TeamAssignment {
        TeamAssignment::new(self.teams.clone())
    }

    /// Distinct ids of everyone who played.
    pub fn participant_ids(&self) -> BTreeSet<&str> {
        self.teams
            .iter()
            .flatten()
            .map(|p| p.id.as_str())
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.teams.iter().map(Vec::len).sum()
    }

    /// Notes if present, otherwise e.g. "3 teams".
    pub fn title(&self) -> String {
        match &self.notes {
            Some(notes) => notes.clone(),
            None => format!("{} teams", self.team_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squad_with(names: &[&str]) -> Squad {
        let mut squad = Squad::new("Thursday Futsal").unwrap();
        for name in names {
            squad.add_member(name).unwrap();
        }
        squad
    }

    #[test]
    fn squad_rejects_empty_and_duplicate_names() {
        let mut squad = squad_with(&["Minho"]);
        assert_eq!(squad.add_member("   ").unwrap_err(), SquadError::EmptyName);
        assert_eq!(
            squad.add_member(" Minho ").unwrap_err(),
            SquadError::DuplicateName("Minho".into())
        );
        assert_eq!(squad.rename("").unwrap_err(), SquadError::EmptyName);
        squad.rename("Friday Futsal").unwrap();
        assert_eq!(squad.name, "Friday Futsal");
    }

    #[test]
    fn remove_unknown_member_fails() {
        let mut squad = squad_with(&["Minho"]);
        assert!(matches!(
            squad.remove_member("nobody"),
            Err(SquadError::UnknownMember(_))
        ));
    }

    #[test]
    fn prune_drops_groups_that_fall_below_two() {
        let mut groups = vec![
            FixedGroup::new(vec!["a".into(), "b".into()]).unwrap(),
            FixedGroup::new(vec!["a".into(), "c".into(), "d".into()]).unwrap(),
        ];
        assert_eq!(prune_fixed_groups(&mut groups, "a"), 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_ids, vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn participants_merge_members_and_guests_in_stable_order() {
        let squad = squad_with(&["Ana", "Bo", "Cy"]);
        let ids: Vec<String> = squad.members.iter().map(|m| m.id.clone()).collect();

        let mut session = Session::new();
        assert!(session.toggle_participant(&squad, &ids[2]).unwrap());
        assert!(session.toggle_participant(&squad, &ids[0]).unwrap());
        session.add_guest(&squad, "Guest Kim").unwrap();

        let names: Vec<String> = session
            .participants(&squad)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Cy", "Guest Kim"]);
        assert_eq!(session.participant_count(), 3);

        assert!(!session.toggle_participant(&squad, &ids[0]).unwrap());
        assert!(!session.is_selected(&ids[0]));
    }

    #[test]
    fn guest_names_must_not_clash() {
        let squad = squad_with(&["Ana"]);
        let mut session = Session::new();
        assert_eq!(
            session.add_guest(&squad, "Ana").unwrap_err(),
            SquadError::DuplicateName("Ana".into())
        );
        let guest_id = session.add_guest(&squad, "Lee").unwrap().id.clone();
        assert!(session.add_guest(&squad, "Lee").is_err());
        assert!(session.remove_guest(&guest_id).is_some());
        assert!(session.guests().is_empty());
    }

    #[test]
    fn select_all_and_clear() {
        let squad = squad_with(&["Ana", "Bo"]);
        let mut session = Session::new();
        session.select_all(&squad);
        assert_eq!(session.participants(&squad).len(), 2);
        session.forget_member(&squad.members[0].id);
        assert_eq!(session.participants(&squad).len(), 1);
        session.clear();
        assert!(session.participants(&squad).is_empty());
    }

    #[test]
    fn toggle_unknown_member_fails() {
        let squad = squad_with(&["Ana"]);
        let mut session = Session::new();
        assert!(session.toggle_participant(&squad, "ghost").is_err());
    }

    #[test]
    fn period_parses_cli_forms() {
        assert_eq!("first".parse::<Period>().unwrap(), Period::FirstHalf);
        assert_eq!("SECOND_HALF".parse::<Period>().unwrap(), Period::SecondHalf);
        assert!("third".parse::<Period>().is_err());
        assert_eq!(Period::SecondHalf.as_str().parse::<Period>().unwrap(), Period::SecondHalf);
    }

    #[test]
    fn saved_division_records_team_count_and_participants() {
        let squad = squad_with(&["Ana", "Bo", "Cy"]);
        let assignment = TeamAssignment::new(vec![
            squad.members[..2].to_vec(),
            squad.members[2..].to_vec(),
        ]);
        let saved = SavedDivision::new(&squad.id, assignment, Period::FirstHalf, Some("  ".into()));
        assert_eq!(saved.team_count, 2);
        assert_eq!(saved.participant_count(), 3);
        assert_eq!(saved.participant_ids().len(), 3);
        assert_eq!(saved.notes, None);
        assert_eq!(saved.title(), "2 teams");
    }
}
