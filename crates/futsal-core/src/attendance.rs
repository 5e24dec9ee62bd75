// Attendance statistics over saved divisions.

use std::collections::HashMap;
use std::io;

use serde::Serialize;

use crate::squad::{SavedDivision, Squad};

/// One roster member's attendance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberAttendance {
    pub member_id: String,
    pub name: String,
    /// Saved divisions the member played in.
    pub attended: usize,
    /// Saved divisions overall.
    pub total: usize,
    /// `attended / total` as a whole percentage, rounded half up.
    pub rate_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceReport {
    pub total_games: usize,
    /// Mean players per division, rounded to the nearest whole player.
    pub avg_participants: usize,
    /// Sorted by attendance, most regular first; ties keep roster order.
    pub members: Vec<MemberAttendance>,
}

impl AttendanceReport {
    /// The `n` most regular members.
    pub fn top(&self, n: usize) -> &[MemberAttendance] {
        &self.members[..n.min(self.members.len())]
    }

    /// Write one CSV row per member (with a header row).
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        for member in &self.members {
            wtr.serialize(member)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Attendance of every roster member across `divisions`.
///
/// Returns `None` when nothing has been saved yet. Guests count towards
/// `avg_participants` but are not listed.
pub fn attendance_stats(squad: &Squad, divisions: &[SavedDivision]) -> Option<AttendanceReport> {
    let total_games = divisions.len();
    if total_games == 0 {
        return None;
    }

    let mut attended: HashMap<&str, usize> = HashMap::new();
    for division in divisions {
        for id in division.participant_ids() {
            *attended.entry(id).or_insert(0) += 1;
        }
    }

    let mut members: Vec<MemberAttendance> = squad
        .members
        .iter()
        .map(|member| {
            let count = attended.get(member.id.as_str()).copied().unwrap_or(0);
            MemberAttendance {
                member_id: member.id.clone(),
                name: member.name.clone(),
                attended: count,
                total: total_games,
                rate_percent: rounded_percent(count, total_games),
            }
        })
        .collect();
    // Everyone shares the same total, so the count orders the rates exactly.
    members.sort_by(|a, b| b.attended.cmp(&a.attended));

    let total_participants: usize = divisions.iter().map(SavedDivision::participant_count).sum();
    let avg_participants = (total_participants + total_games / 2) / total_games;

    Some(AttendanceReport {
        total_games,
        avg_participants,
        members,
    })
}

fn rounded_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part * 100 + whole / 2) / whole) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Player, TeamAssignment};
    use crate::squad::Period;

    fn squad() -> Squad {
        let mut squad = Squad::new("Sunday League").unwrap();
        for name in ["Ana", "Bo", "Cy"] {
            squad.add_member(name).unwrap();
        }
        squad
    }

    fn division(squad: &Squad, players: Vec<Player>) -> SavedDivision {
        let mid = players.len() / 2;
        let assignment = TeamAssignment::new(vec![players[..mid].to_vec(), players[mid..].to_vec()]);
        SavedDivision::new(&squad.id, assignment, Period::FirstHalf, None)
    }

    #[test]
    fn no_divisions_no_report() {
        assert!(attendance_stats(&squad(), &[]).is_none());
    }

    #[test]
    fn rates_and_ordering() {
        let squad = squad();
        let [ana, bo, cy] = [0, 1, 2].map(|i| squad.members[i].clone());
        let guest = Player::guest("Visitor");

        let divisions = vec![
            division(&squad, vec![ana.clone(), cy.clone(), guest.clone()]),
            division(&squad, vec![cy.clone(), bo.clone()]),
            division(&squad, vec![cy.clone(), ana.clone()]),
        ];
        let report = attendance_stats(&squad, &divisions).unwrap();

        assert_eq!(report.total_games, 3);
        // (3 + 2 + 2) / 3 = 2.33
        assert_eq!(report.avg_participants, 2);

        let names: Vec<&str> = report.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Cy", "Ana", "Bo"]);
        assert_eq!(report.members[0].rate_percent, 100);
        assert_eq!(report.members[1].rate_percent, 67);
        assert_eq!(report.members[2].rate_percent, 33);
        assert_eq!(report.members[2].attended, 1);
        assert_eq!(report.top(2).len(), 2);
        assert_eq!(report.top(10).len(), 3);
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let squad = squad();
        let divisions = vec![division(&squad, squad.members.clone())];
        let report = attendance_stats(&squad, &divisions).unwrap();

        let mut buf = Vec::new();
        report.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "member_id,name,attended,total,rate_percent");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].ends_with(",Ana,1,1,100"));
    }
}
