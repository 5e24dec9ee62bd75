// Futsal team divider command line.
//
// Every invocation:
// 1. Initialize tracing (stderr; stdout carries command output)
// 2. Load config
// 3. Open database
// 4. Run one subcommand against the current squad

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{arg, value_parser, ArgMatches, Command};
use tracing::info;

use futsal_core::attendance::{attendance_stats, AttendanceReport};
use futsal_core::config::{self, Config};
use futsal_core::db::Database;
use futsal_core::division::Divider;
use futsal_core::model::{FixedGroup, Player, TeamAssignment};
use futsal_core::squad::{prune_fixed_groups, Period, SavedDivision, Session, Squad};

fn cli() -> Command {
    Command::new("futsal")
        .version(clap::crate_version!())
        .about("Divide pickup futsal players into teams, avoiding repeated teammates")
        .subcommand_required(true)
        .arg(arg!(-c --config <FILE> "Path to futsal.toml").value_parser(value_parser!(PathBuf)))
        .arg(arg!(-s --squad <NAME> "Squad to work on instead of the current one"))
        .subcommand(
            Command::new("init")
                .about("Create a squad (or switch to an existing one) and make it current")
                .arg(arg!(<name> "Squad name")),
        )
        .subcommand(
            Command::new("member")
                .about("Manage the squad roster")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .about("Add members")
                        .arg(arg!(<names> ... "Member names")),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove a member (also drops them from fixed groups)")
                        .arg(arg!(<name> "Member name")),
                )
                .subcommand(Command::new("list").about("List members")),
        )
        .subcommand(
            Command::new("fixed")
                .about("Manage groups of players that always play together")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .about("Add a fixed group")
                        .arg(arg!(<names> ... "Member names (at least two)")),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove a fixed group")
                        .arg(arg!(<index> "Group number from `fixed list`").value_parser(value_parser!(usize))),
                )
                .subcommand(
                    Command::new("toggle")
                        .about("Enable or disable a fixed group")
                        .arg(arg!(<index> "Group number from `fixed list`").value_parser(value_parser!(usize))),
                )
                .subcommand(Command::new("list").about("List fixed groups")),
        )
        .subcommand(
            Command::new("divide")
                .about("Divide today's players into teams")
                .arg(arg!(-t --teams <N> "Number of teams").value_parser(value_parser!(usize)))
                .arg(arg!(-g --guest <NAME> ... "Add a guest player"))
                .arg(
                    arg!(-p --period <PERIOD> "first or second half")
                        .value_parser(["first", "second"])
                        .default_value("first"),
                )
                .arg(arg!(-n --notes <TEXT> "Notes stored with the division"))
                .arg(arg!(--save "Save the division and record its pairs in the history"))
                .arg(arg!([players] ... "Members taking part (default: every active member)")),
        )
        .subcommand(
            Command::new("history")
                .about("Show saved divisions")
                .arg(arg!(--delete <ID> "Delete a saved division (pair history is kept)")),
        )
        .subcommand(
            Command::new("stats")
                .about("Attendance statistics")
                .arg(arg!(--top <N> "Only show the N most regular members").value_parser(value_parser!(usize)))
                .arg(arg!(--csv <FILE> "Export the full report as CSV").value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("reset")
                .about("Delete every saved division and the pairing history")
                .arg(arg!(--password <PASSWORD> "Admin password from futsal.toml")),
        )
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let matches = cli().get_matches();

    let config = config::load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("failed to load configuration")?;

    let db_path = config.db_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = Database::open(&db_path).context("failed to open database")?;
    info!("Database opened at {}", db_path.display());

    let squad_name = matches.get_one::<String>("squad").map(String::as_str);
    match matches.subcommand() {
        Some(("init", sub)) => run_init(&db, required(sub, "name")),
        Some(("member", sub)) => run_member(&db, load_squad(&db, squad_name)?, sub),
        Some(("fixed", sub)) => run_fixed(&db, &load_squad(&db, squad_name)?, sub),
        Some(("divide", sub)) => run_divide(&db, &config, &load_squad(&db, squad_name)?, sub),
        Some(("history", sub)) => run_history(&db, &load_squad(&db, squad_name)?, sub),
        Some(("stats", sub)) => run_stats(&db, &load_squad(&db, squad_name)?, sub),
        Some(("reset", sub)) => run_reset(&db, &config, &load_squad(&db, squad_name)?, sub),
        _ => unreachable!("clap enforces a subcommand"),
    }
}

/// Initialize tracing to stderr so command output on stdout stays clean.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("futsal=info,futsal_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A positional argument clap has already checked for.
fn required<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .unwrap_or_default()
}

fn names<'a>(matches: &'a ArgMatches, id: &str) -> Vec<&'a str> {
    matches
        .get_many::<String>(id)
        .map(|values| values.map(String::as_str).collect())
        .unwrap_or_default()
}

/// The squad named with `--squad`, or the current one.
fn load_squad(db: &Database, name: Option<&str>) -> anyhow::Result<Squad> {
    if let Some(name) = name {
        return db
            .find_squad_by_name(name)?
            .with_context(|| format!("no squad named {name:?}"));
    }
    let Some(id) = db.current_squad_id()? else {
        bail!("no squad selected; run `futsal init <name>` first");
    };
    db.load_squad(&id)?
        .with_context(|| format!("current squad {id} no longer exists; run `futsal init <name>`"))
}

fn member_id(squad: &Squad, name: &str) -> anyhow::Result<String> {
    squad
        .member_by_name(name)
        .map(|m| m.id.clone())
        .with_context(|| format!("no member named {name:?} in {}", squad.name))
}

fn display_name<'a>(squad: &'a Squad, id: &'a str) -> &'a str {
    squad.member(id).map(|m| m.name.as_str()).unwrap_or(id)
}

fn format_team(team: &[Player]) -> String {
    team.iter()
        .map(|p| {
            if p.is_guest {
                format!("{}*", p.name)
            } else {
                p.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_assignment(assignment: &TeamAssignment) {
    for (i, team) in assignment.teams.iter().enumerate() {
        println!("  Team {} ({}): {}", i + 1, team.len(), format_team(team));
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn run_init(db: &Database, name: &str) -> anyhow::Result<()> {
    let squad = match db.find_squad_by_name(name.trim())? {
        Some(squad) => {
            println!("Switched to squad {} ({} members)", squad.name, squad.members.len());
            squad
        }
        None => {
            let squad = Squad::new(name)?;
            db.save_squad(&squad)?;
            println!("Created squad {}", squad.name);
            squad
        }
    };
    db.set_current_squad_id(&squad.id)
}

fn run_member(db: &Database, mut squad: Squad, matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("add", sub)) => {
            for name in names(sub, "names") {
                let member = squad.add_member(name)?;
                println!("Added {}", member.name);
            }
            db.save_squad(&squad)
        }
        Some(("remove", sub)) => {
            let id = member_id(&squad, required(sub, "name"))?;
            let removed = squad.remove_member(&id)?;
            let mut groups = db.load_fixed_groups(&squad.id)?;
            let dropped = prune_fixed_groups(&mut groups, &id);
            db.save_squad(&squad)?;
            db.save_fixed_groups(&squad.id, &groups)?;
            println!("Removed {}", removed.name);
            if dropped > 0 {
                println!("Deleted {dropped} fixed group(s) left with a single member");
            }
            Ok(())
        }
        Some(("list", _)) => {
            println!("{} ({} members)", squad.name, squad.members.len());
            for member in &squad.members {
                let status = if member.active { "" } else { " (inactive)" };
                println!("  {}{}", member.name, status);
            }
            Ok(())
        }
        _ => unreachable!("clap enforces a subcommand"),
    }
}

fn run_fixed(db: &Database, squad: &Squad, matches: &ArgMatches) -> anyhow::Result<()> {
    let mut groups = db.load_fixed_groups(&squad.id)?;
    match matches.subcommand() {
        Some(("add", sub)) => {
            let ids = names(sub, "names")
                .into_iter()
                .map(|name| member_id(squad, name))
                .collect::<anyhow::Result<Vec<_>>>()?;
            groups.push(FixedGroup::new(ids)?);
            db.save_fixed_groups(&squad.id, &groups)?;
            println!("Added fixed group #{}", groups.len());
            Ok(())
        }
        Some(("remove", sub)) => {
            let idx = group_index(sub, groups.len())?;
            groups.remove(idx);
            db.save_fixed_groups(&squad.id, &groups)?;
            println!("Removed fixed group #{}", idx + 1);
            Ok(())
        }
        Some(("toggle", sub)) => {
            let idx = group_index(sub, groups.len())?;
            groups[idx].active = !groups[idx].active;
            let state = if groups[idx].active { "enabled" } else { "disabled" };
            db.save_fixed_groups(&squad.id, &groups)?;
            println!("Fixed group #{} {}", idx + 1, state);
            Ok(())
        }
        Some(("list", _)) => {
            if groups.is_empty() {
                println!("No fixed groups");
            }
            for (i, group) in groups.iter().enumerate() {
                let members: Vec<&str> = group
                    .member_ids
                    .iter()
                    .map(|id| display_name(squad, id))
                    .collect();
                let status = if group.active { "" } else { " (disabled)" };
                println!("  #{}: {}{}", i + 1, members.join(" + "), status);
            }
            Ok(())
        }
        _ => unreachable!("clap enforces a subcommand"),
    }
}

/// Convert a 1-based group number into an index.
fn group_index(matches: &ArgMatches, len: usize) -> anyhow::Result<usize> {
    let number = matches.get_one::<usize>("index").copied().unwrap_or_default();
    if number == 0 || number > len {
        bail!("no fixed group #{number} (have {len})");
    }
    Ok(number - 1)
}

fn run_divide(
    db: &Database,
    config: &Config,
    squad: &Squad,
    matches: &ArgMatches,
) -> anyhow::Result<()> {
    let team_count = matches
        .get_one::<usize>("teams")
        .copied()
        .unwrap_or(config.division.default_team_count);

    let mut session = Session::new();
    let requested = names(matches, "players");
    if requested.is_empty() {
        for member in squad.members.iter().filter(|m| m.active) {
            session.toggle_participant(squad, &member.id)?;
        }
    } else {
        for name in requested {
            let id = member_id(squad, name)?;
            if !session.is_selected(&id) {
                session.toggle_participant(squad, &id)?;
            }
        }
    }
    for name in names(matches, "guest") {
        session.add_guest(squad, name)?;
    }
    let players = session.participants(squad);

    // Groups with someone missing today do not apply.
    let (groups, skipped): (Vec<FixedGroup>, Vec<FixedGroup>) = db
        .load_fixed_groups(&squad.id)?
        .into_iter()
        .filter(|g| g.active)
        .partition(|g| g.applies_to(&players));
    if !skipped.is_empty() {
        info!("{} fixed group(s) skipped: not all members are playing", skipped.len());
    }

    let history = db.load_pair_history(&squad.id)?;
    let outcome = Divider::new()
        .attempt_budget(config.division.attempt_budget)
        .divide(&players, team_count, &groups, &history)?;

    println!(
        "{} players in {} teams (repeat score {}, {} attempts)",
        players.len(),
        team_count,
        outcome.score,
        outcome.attempts
    );
    print_assignment(&outcome.assignment);

    if matches.get_flag("save") {
        let period: Period = required(matches, "period").parse()?;
        let notes = matches.get_one::<String>("notes").cloned();
        let division = SavedDivision::new(&squad.id, outcome.assignment, period, notes);
        db.commit_division(&division)?;
        println!("Saved division {} ({})", division.id, division.period);
    }
    Ok(())
}

fn run_history(db: &Database, squad: &Squad, matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(id) = matches.get_one::<String>("delete") {
        if !db.delete_division(&squad.id, id)? {
            bail!("no saved division {id} in {}", squad.name);
        }
        println!("Deleted division {id}");
        return Ok(());
    }

    let divisions = db.load_divisions(&squad.id)?;
    if divisions.is_empty() {
        println!("No saved divisions");
    }
    for division in &divisions {
        println!(
            "{} {} {}: {} [{}]",
            division.division_date.format("%Y-%m-%d %H:%M"),
            division.period,
            division.id,
            division.title(),
            division.participant_count()
        );
        print_assignment(&division.assignment());
    }
    Ok(())
}

fn run_stats(db: &Database, squad: &Squad, matches: &ArgMatches) -> anyhow::Result<()> {
    let divisions = db.load_divisions(&squad.id)?;
    let Some(report) = attendance_stats(squad, &divisions) else {
        println!("No saved divisions yet");
        return Ok(());
    };

    if let Some(path) = matches.get_one::<PathBuf>("csv") {
        export_csv(&report, path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    println!(
        "{} games, {} players on average",
        report.total_games, report.avg_participants
    );
    let shown = match matches.get_one::<usize>("top") {
        Some(&n) => report.top(n),
        None => &report.members[..],
    };
    for member in shown {
        println!(
            "  {:<20} {:>3}/{:<3} {:>3}%",
            member.name, member.attended, member.total, member.rate_percent
        );
    }
    Ok(())
}

fn export_csv(report: &AttendanceReport, path: &Path) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    report
        .write_csv(file)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn run_reset(
    db: &Database,
    config: &Config,
    squad: &Squad,
    matches: &ArgMatches,
) -> anyhow::Result<()> {
    let attempt = matches
        .get_one::<String>("password")
        .map(String::as_str)
        .unwrap_or_default();
    if !config.check_admin_password(attempt) {
        bail!("incorrect admin password");
    }
    db.clear_history(&squad.id)?;
    println!("Cleared all saved divisions and pairing history for {}", squad.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn divide_parses_guests_and_players() {
        let matches = cli()
            .try_get_matches_from([
                "futsal", "divide", "--teams", "3", "-g", "Kim", "-g", "Lee", "--save", "Ana", "Bo",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<usize>("teams"), Some(&3));
        assert_eq!(names(sub, "guest"), vec!["Kim", "Lee"]);
        assert_eq!(names(sub, "players"), vec!["Ana", "Bo"]);
        assert_eq!(required(sub, "period"), "first");
        assert!(sub.get_flag("save"));
    }

    #[test]
    fn unknown_period_is_rejected() {
        assert!(cli()
            .try_get_matches_from(["futsal", "divide", "--period", "third"])
            .is_err());
    }

    #[test]
    fn guests_are_marked_in_team_listing() {
        let team = vec![Player::member("m-1", "Ana"), Player::guest("Kim")];
        assert_eq!(format_team(&team), "Ana, Kim*");
    }
}
