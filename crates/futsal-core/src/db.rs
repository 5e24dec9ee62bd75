// SQLite persistence for squads, fixed groups, saved divisions and the
// per-squad pairing history.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::division::record_committed_division;
use crate::events::{self, ChangeEvent, ChangeKind};
use crate::model::{FixedGroup, PairHistory, PairKey, Player, PlayerId};
use crate::squad::{Period, SavedDivision, Squad};

/// SQLite-backed store. Every write publishes a [`ChangeEvent`] to the
/// subscribers returned by [`Database::subscribe`].
pub struct Database {
    conn: Mutex<Connection>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS squads (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS members (
                id          TEXT PRIMARY KEY,
                squad_id    TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                skill_level INTEGER,
                active      INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                position    INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fixed_groups (
                id         TEXT NOT NULL,
                squad_id   TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
                member_ids TEXT NOT NULL,
                active     INTEGER NOT NULL DEFAULT 1,
                position   INTEGER NOT NULL,
                PRIMARY KEY (squad_id, id)
            );

            CREATE TABLE IF NOT EXISTS divisions (
                id            TEXT PRIMARY KEY,
                squad_id      TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
                division_date TEXT NOT NULL,
                period        TEXT NOT NULL,
                notes         TEXT,
                teams         TEXT NOT NULL,
                team_count    INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pair_history (
                squad_id TEXT NOT NULL REFERENCES squads(id) ON DELETE CASCADE,
                player_a TEXT NOT NULL,
                player_b TEXT NOT NULL,
                count    INTEGER NOT NULL CHECK (count > 0),
                PRIMARY KEY (squad_id, player_a, player_b)
            );

            CREATE TABLE IF NOT EXISTS app_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_members_squad ON members(squad_id);
            CREATE INDEX IF NOT EXISTS idx_divisions_squad ON divisions(squad_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            events: events::channel(),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Receive a [`ChangeEvent`] for every subsequent write.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        debug!("Store change: {:?}", event);
        // Err only means nobody is listening.
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Squads and members
    // ------------------------------------------------------------------

    /// Insert or update a squad and its roster. Members no longer on the
    /// roster are deleted; roster order is preserved.
    pub fn save_squad(&self, squad: &Squad) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction().context("failed to begin transaction")?;

            tx.execute(
                "INSERT INTO squads (id, name, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![squad.id, squad.name, squad.created_at],
            )
            .context("failed to upsert squad")?;

            let existing: Vec<String> = {
                let mut stmt = tx
                    .prepare("SELECT id FROM members WHERE squad_id = ?1")
                    .context("failed to prepare member id query")?;
                let ids = stmt
                    .query_map(params![squad.id], |row| row.get(0))
                    .context("failed to query member ids")?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("failed to read member ids")?;
                ids
            };
            let current: HashSet<&str> = squad.members.iter().map(|m| m.id.as_str()).collect();
            for id in existing.iter().filter(|id| !current.contains(id.as_str())) {
                tx.execute("DELETE FROM members WHERE id = ?1", params![id])
                    .context("failed to delete member")?;
            }

            for (position, member) in squad.members.iter().enumerate() {
                tx.execute(
                    "INSERT INTO members (id, squad_id, name, skill_level, active, created_at, position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        name        = excluded.name,
                        skill_level = excluded.skill_level,
                        active      = excluded.active,
                        position    = excluded.position",
                    params![
                        member.id,
                        squad.id,
                        member.name,
                        member.skill_level,
                        member.active,
                        member.created_at,
                        position as i64,
                    ],
                )
                .context("failed to upsert member")?;
            }

            tx.commit().context("failed to commit save_squad")?;
        }
        info!("Saved squad {} ({} members)", squad.name, squad.members.len());
        self.publish(ChangeEvent::new(&squad.id, ChangeKind::Squad));
        Ok(())
    }

    pub fn load_squad(&self, squad_id: &str) -> Result<Option<Squad>> {
        let conn = self.conn();
        let squad = conn
            .query_row(
                "SELECT id, name, created_at FROM squads WHERE id = ?1",
                params![squad_id],
                |row| {
                    Ok(Squad {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        members: Vec::new(),
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("failed to query squad")?;

        let Some(mut squad) = squad else {
            return Ok(None);
        };
        squad.members = read_members(&conn, &squad.id)?;
        Ok(Some(squad))
    }

    /// The most recently created squad with exactly this name.
    pub fn find_squad_by_name(&self, name: &str) -> Result<Option<Squad>> {
        let id: Option<String> = {
            let conn = self.conn();
            conn.query_row(
                "SELECT id FROM squads WHERE name = ?1 ORDER BY created_at DESC LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("failed to search squads by name")?
        };
        match id {
            Some(id) => self.load_squad(&id),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Fixed groups
    // ------------------------------------------------------------------

    /// Replace all fixed groups of a squad. Group order is preserved since it
    /// decides placement order during division.
    pub fn save_fixed_groups(&self, squad_id: &str, groups: &[FixedGroup]) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction().context("failed to begin transaction")?;
            tx.execute("DELETE FROM fixed_groups WHERE squad_id = ?1", params![squad_id])
                .context("failed to delete fixed groups")?;
            for (position, group) in groups.iter().enumerate() {
                let member_ids = serde_json::to_string(&group.member_ids)
                    .context("failed to serialize fixed group members")?;
                tx.execute(
                    "INSERT INTO fixed_groups (id, squad_id, member_ids, active, position)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![group.id, squad_id, member_ids, group.active, position as i64],
                )
                .context("failed to insert fixed group")?;
            }
            tx.commit().context("failed to commit save_fixed_groups")?;
        }
        self.publish(ChangeEvent::new(squad_id, ChangeKind::FixedGroups));
        Ok(())
    }

    pub fn load_fixed_groups(&self, squad_id: &str) -> Result<Vec<FixedGroup>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, member_ids, active FROM fixed_groups
                 WHERE squad_id = ?1 ORDER BY position",
            )
            .context("failed to prepare load_fixed_groups query")?;
        let rows = stmt
            .query_map(params![squad_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })
            .context("failed to query fixed groups")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map fixed group rows")?;

        rows.into_iter()
            .map(|(id, member_ids, active)| -> Result<FixedGroup> {
                let member_ids: Vec<PlayerId> = serde_json::from_str(&member_ids)
                    .with_context(|| format!("invalid member list in fixed group {id}"))?;
                Ok(FixedGroup {
                    id,
                    member_ids,
                    active,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Divisions
    // ------------------------------------------------------------------

    /// Store a division record without touching the pairing history.
    /// Re-saving the same id is a no-op.
    pub fn save_division(&self, division: &SavedDivision) -> Result<()> {
        if insert_division(&self.conn(), division)? == 0 {
            debug!("Division {} already saved", division.id);
            return Ok(());
        }
        self.publish(ChangeEvent::new(
            &division.squad_id,
            ChangeKind::DivisionSaved {
                division_id: division.id.clone(),
            },
        ));
        Ok(())
    }

    /// Save a division and fold its pairs into the squad's pairing history in
    /// one transaction. Returns the updated history.
    ///
    /// Holding the connection for the whole read-modify-write keeps concurrent
    /// commits for the same squad from losing increments.
    pub fn commit_division(&self, division: &SavedDivision) -> Result<PairHistory> {
        let updated = {
            let mut conn = self.conn();
            let tx = conn.transaction().context("failed to begin transaction")?;

            if insert_division(&tx, division)? == 0 {
                bail!("division {} was already committed", division.id);
            }
            let current = read_pair_history(&tx, &division.squad_id)?;
            let updated = record_committed_division(&division.assignment(), &current);
            write_pair_history(&tx, &division.squad_id, &updated)?;

            tx.commit().context("failed to commit division")?;
            updated
        };

        info!(
            "Committed division {} ({} teams, {} players); history now has {} pairs",
            division.id,
            division.team_count,
            division.participant_count(),
            updated.len()
        );
        self.publish(ChangeEvent::new(
            &division.squad_id,
            ChangeKind::DivisionSaved {
                division_id: division.id.clone(),
            },
        ));
        self.publish(ChangeEvent::new(&division.squad_id, ChangeKind::PairHistory));
        Ok(updated)
    }

    /// Saved divisions of a squad, oldest first.
    pub fn load_divisions(&self, squad_id: &str) -> Result<Vec<SavedDivision>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, division_date, period, notes, teams, team_count
                 FROM divisions WHERE squad_id = ?1 ORDER BY division_date, rowid",
            )
            .context("failed to prepare load_divisions query")?;
        let rows = stmt
            .query_map(params![squad_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, DateTime<Utc>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .context("failed to query divisions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map division rows")?;

        rows.into_iter()
            .map(|(id, division_date, period, notes, teams, team_count)| -> Result<SavedDivision> {
                let period: Period = period
                    .parse()
                    .with_context(|| format!("invalid period in division {id}"))?;
                let teams: Vec<Vec<Player>> = serde_json::from_str(&teams)
                    .with_context(|| format!("invalid teams in division {id}"))?;
                Ok(SavedDivision {
                    id,
                    squad_id: squad_id.to_string(),
                    division_date,
                    period,
                    notes,
                    teams,
                    team_count: team_count as usize,
                })
            })
            .collect()
    }

    /// Delete one of a squad's division records. The pairing history is not
    /// rolled back; only a full reset clears it. Returns whether a record was
    /// deleted; ids belonging to another squad are left alone.
    pub fn delete_division(&self, squad_id: &str, division_id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM divisions WHERE id = ?1 AND squad_id = ?2",
                params![division_id, squad_id],
            )
            .context("failed to delete division")?;
        if deleted == 0 {
            return Ok(false);
        }

        self.publish(ChangeEvent::new(
            squad_id,
            ChangeKind::DivisionDeleted {
                division_id: division_id.to_string(),
            },
        ));
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Pairing history
    // ------------------------------------------------------------------

    pub fn load_pair_history(&self, squad_id: &str) -> Result<PairHistory> {
        read_pair_history(&self.conn(), squad_id)
    }

    /// Replace the stored pairing history of a squad.
    pub fn save_pair_history(&self, squad_id: &str, history: &PairHistory) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction().context("failed to begin transaction")?;
            write_pair_history(&tx, squad_id, history)?;
            tx.commit().context("failed to commit save_pair_history")?;
        }
        self.publish(ChangeEvent::new(squad_id, ChangeKind::PairHistory));
        Ok(())
    }

    /// Delete every saved division and the whole pairing history of a squad.
    pub fn clear_history(&self, squad_id: &str) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction().context("failed to begin transaction")?;
            tx.execute("DELETE FROM divisions WHERE squad_id = ?1", params![squad_id])
                .context("failed to delete divisions")?;
            tx.execute("DELETE FROM pair_history WHERE squad_id = ?1", params![squad_id])
                .context("failed to delete pair history")?;
            tx.commit().context("failed to commit clear_history")?;
        }
        info!("Cleared division history for squad {}", squad_id);
        self.publish(ChangeEvent::new(squad_id, ChangeKind::HistoryCleared));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Key-value app state
    // ------------------------------------------------------------------

    /// Key holding the id of the squad the CLI works on.
    const CURRENT_SQUAD_KEY: &'static str = "current_squad_id";

    /// Persist an arbitrary JSON value under `key`, overwriting any previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query app state")?;
        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
            .transpose()
    }

    pub fn current_squad_id(&self) -> Result<Option<String>> {
        let value = self.load_state(Self::CURRENT_SQUAD_KEY)?;
        Ok(value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub fn set_current_squad_id(&self, squad_id: &str) -> Result<()> {
        self.save_state(
            Self::CURRENT_SQUAD_KEY,
            &serde_json::Value::String(squad_id.to_string()),
        )
    }
}

// ---------------------------------------------------------------------------
// Statement helpers shared by plain connections and transactions
// ---------------------------------------------------------------------------

fn read_members(conn: &Connection, squad_id: &str) -> Result<Vec<Player>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, skill_level, active, created_at FROM members
             WHERE squad_id = ?1 ORDER BY position",
        )
        .context("failed to prepare member query")?;
    let members = stmt
        .query_map(params![squad_id], |row| {
            Ok(Player {
                id: row.get(0)?,
                name: row.get(1)?,
                is_guest: false,
                skill_level: row.get(2)?,
                active: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .context("failed to query members")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map member rows")?;
    Ok(members)
}

/// Returns the number of inserted rows (0 if the id already exists).
fn insert_division(conn: &Connection, division: &SavedDivision) -> Result<usize> {
    let teams = serde_json::to_string(&division.teams).context("failed to serialize teams")?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO divisions
                (id, squad_id, division_date, period, notes, teams, team_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                division.id,
                division.squad_id,
                division.division_date,
                division.period.as_str(),
                division.notes,
                teams,
                division.team_count as i64,
            ],
        )
        .context("failed to insert division")?;
    Ok(inserted)
}

fn read_pair_history(conn: &Connection, squad_id: &str) -> Result<PairHistory> {
    let mut stmt = conn
        .prepare("SELECT player_a, player_b, count FROM pair_history WHERE squad_id = ?1")
        .context("failed to prepare pair history query")?;
    let entries = stmt
        .query_map(params![squad_id], |row| {
            let a: String = row.get(0)?;
            let b: String = row.get(1)?;
            let count: u32 = row.get(2)?;
            Ok((PairKey::new(&a, &b), count))
        })
        .context("failed to query pair history")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map pair history rows")?;
    Ok(entries.into_iter().collect())
}

fn write_pair_history(conn: &Connection, squad_id: &str, history: &PairHistory) -> Result<()> {
    conn.execute("DELETE FROM pair_history WHERE squad_id = ?1", params![squad_id])
        .context("failed to clear pair history")?;
    let mut stmt = conn
        .prepare(
            "INSERT INTO pair_history (squad_id, player_a, player_b, count)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .context("failed to prepare pair history insert")?;
    for (key, count) in history.iter() {
        stmt.execute(params![squad_id, key.lo(), key.hi(), count])
            .context("failed to insert pair history entry")?;
    }
    Ok(())
}
