use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS standings (
            season        TEXT NOT NULL,
            rank          INTEGER NOT NULL CHECK(rank > 0),
            team          TEXT NOT NULL,
            played        INTEGER NOT NULL,
            wins          INTEGER NOT NULL,
            draws         INTEGER NOT NULL,
            losses        INTEGER NOT NULL,
            goals_for     INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            goal_diff     INTEGER NOT NULL,
            points        INTEGER NOT NULL,
            logo_url      TEXT,
            scraped_at    TEXT NOT NULL,
            PRIMARY KEY (season, team)
        );

        CREATE TABLE IF NOT EXISTS scorers (
            season      TEXT NOT NULL,
            rank        INTEGER NOT NULL CHECK(rank > 0),
            player_name TEXT NOT NULL,
            team        TEXT NOT NULL DEFAULT '',
            goals       INTEGER NOT NULL,
            penalties   INTEGER NOT NULL,
            scraped_at  TEXT NOT NULL,
            PRIMARY KEY (season, player_name)
        );

        -- team is part of the key; '' when the page does not carry it
        CREATE TABLE IF NOT EXISTS assists (
            season      TEXT NOT NULL,
            rank        INTEGER NOT NULL CHECK(rank > 0),
            player_name TEXT NOT NULL,
            team        TEXT NOT NULL DEFAULT '',
            assists     INTEGER NOT NULL,
            scraped_at  TEXT NOT NULL,
            PRIMARY KEY (season, player_name, team)
        );

        CREATE TABLE IF NOT EXISTS palmares_clubs (
            team       TEXT PRIMARY KEY,
            titles     INTEGER NOT NULL,
            logo_url   TEXT,
            scraped_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS palmares_history (
            season         TEXT PRIMARY KEY,
            winner         TEXT NOT NULL,
            winner_logo    TEXT,
            runner_up      TEXT NOT NULL,
            runner_up_logo TEXT,
            scraped_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS page_snapshots (
            id         INTEGER PRIMARY KEY,
            target     TEXT NOT NULL,
            season     TEXT NOT NULL,
            url        TEXT NOT NULL,
            content    TEXT,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_target ON page_snapshots(target, season);

        CREATE TABLE IF NOT EXISTS scrape_runs (
            id          INTEGER PRIMARY KEY,
            target      TEXT NOT NULL,
            season      TEXT NOT NULL,
            ok          BOOLEAN NOT NULL,
            records     INTEGER NOT NULL DEFAULT 0,
            error       TEXT,
            finished_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Records ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingRow {
    pub season: String,
    pub rank: i64,
    pub team: String,
    pub played: i64,
    pub wins: i64,
    pub draws: i64,
    pub losses: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_diff: i64,
    pub points: i64,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScorerRow {
    pub season: String,
    pub rank: i64,
    pub player_name: String,
    /// Empty when the page does not carry the club.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub team: String,
    pub goals: i64,
    pub penalties: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistRow {
    pub season: String,
    pub rank: i64,
    pub player_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub team: String,
    pub assists: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClubTitlesRow {
    pub team: String,
    pub titles: i64,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonHistoryRow {
    pub season: String,
    pub winner: String,
    pub winner_logo: Option<String>,
    pub runner_up: String,
    pub runner_up_logo: Option<String>,
}

/// One validated batch, ready to reconcile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Batch {
    Standings(Vec<StandingRow>),
    Scorers(Vec<ScorerRow>),
    Assists(Vec<AssistRow>),
    Palmares {
        clubs: Vec<ClubTitlesRow>,
        history: Vec<SeasonHistoryRow>,
    },
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Standings(rows) => rows.len(),
            Batch::Scorers(rows) => rows.len(),
            Batch::Assists(rows) => rows.len(),
            Batch::Palmares { clubs, history } => clubs.len() + history.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Reconciliation ──

/// Identity key and overwritable columns of one table.
#[derive(Debug, Clone, Copy)]
pub struct UpsertSpec {
    pub table: &'static str,
    pub key_columns: &'static [&'static str],
    pub mutable_columns: &'static [&'static str],
}

impl UpsertSpec {
    /// `INSERT .. ON CONFLICT(key) DO UPDATE` over key ++ mutable ++ scraped_at.
    pub fn sql(&self) -> String {
        let columns: Vec<&str> = self
            .key_columns
            .iter()
            .chain(self.mutable_columns)
            .copied()
            .chain(["scraped_at"])
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = self
            .mutable_columns
            .iter()
            .copied()
            .chain(["scraped_at"])
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            self.table,
            columns.join(", "),
            placeholders.join(", "),
            self.key_columns.join(", "),
            updates.join(", "),
        )
    }
}

/// A row that knows its table and binds its values in `SPEC` column order.
pub trait Upsert {
    const SPEC: UpsertSpec;
    fn values(&self) -> Vec<&dyn ToSql>;
}

impl Upsert for StandingRow {
    const SPEC: UpsertSpec = UpsertSpec {
        table: "standings",
        key_columns: &["season", "team"],
        mutable_columns: &[
            "rank", "played", "wins", "draws", "losses",
            "goals_for", "goals_against", "goal_diff", "points", "logo_url",
        ],
    };

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.season, &self.team, &self.rank, &self.played, &self.wins, &self.draws,
            &self.losses, &self.goals_for, &self.goals_against, &self.goal_diff, &self.points,
            &self.logo_url,
        ]
    }
}

impl Upsert for ScorerRow {
    const SPEC: UpsertSpec = UpsertSpec {
        table: "scorers",
        key_columns: &["season", "player_name"],
        mutable_columns: &["rank", "team", "goals", "penalties"],
    };

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![&self.season, &self.player_name, &self.rank, &self.team, &self.goals, &self.penalties]
    }
}

impl Upsert for AssistRow {
    const SPEC: UpsertSpec = UpsertSpec {
        table: "assists",
        key_columns: &["season", "player_name", "team"],
        mutable_columns: &["rank", "assists"],
    };

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![&self.season, &self.player_name, &self.team, &self.rank, &self.assists]
    }
}

impl Upsert for ClubTitlesRow {
    const SPEC: UpsertSpec = UpsertSpec {
        table: "palmares_clubs",
        key_columns: &["team"],
        mutable_columns: &["titles", "logo_url"],
    };

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![&self.team, &self.titles, &self.logo_url]
    }
}

impl Upsert for SeasonHistoryRow {
    const SPEC: UpsertSpec = UpsertSpec {
        table: "palmares_history",
        key_columns: &["season"],
        mutable_columns: &["winner", "winner_logo", "runner_up", "runner_up_logo"],
    };

    fn values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.season, &self.winner, &self.winner_logo, &self.runner_up, &self.runner_up_logo,
        ]
    }
}

/// Storage capability the pipeline writes through.
pub trait RecordSink {
    /// Write the whole batch atomically; returns rows written.
    fn reconcile(&mut self, batch: &Batch) -> Result<usize>;

    fn save_snapshot(&mut self, _row: &SnapshotRow) -> Result<()> {
        Ok(())
    }

    fn record_run(&mut self, _target: &str, _season: &str, _records: usize, _error: Option<&str>) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Connection {
    fn reconcile(&mut self, batch: &Batch) -> Result<usize> {
        save_batch(self, batch)
    }

    fn save_snapshot(&mut self, row: &SnapshotRow) -> Result<()> {
        save_snapshot(self, row)?;
        Ok(())
    }

    fn record_run(&mut self, target: &str, season: &str, records: usize, error: Option<&str>) -> Result<()> {
        record_run(self, target, season, records, error)
    }
}

/// Upsert every row of the batch in one transaction. Rows of the same season
/// missing from the batch are left as they are.
pub fn save_batch(conn: &Connection, batch: &Batch) -> Result<usize> {
    let stamp = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let count = match batch {
        Batch::Standings(rows) => upsert_rows(&tx, rows, &stamp)?,
        Batch::Scorers(rows) => upsert_rows(&tx, rows, &stamp)?,
        Batch::Assists(rows) => upsert_rows(&tx, rows, &stamp)?,
        Batch::Palmares { clubs, history } => {
            upsert_rows(&tx, clubs, &stamp)? + upsert_rows(&tx, history, &stamp)?
        }
    };
    tx.commit()?;
    Ok(count)
}

fn upsert_rows<R: Upsert>(tx: &rusqlite::Transaction<'_>, rows: &[R], stamp: &str) -> Result<usize> {
    let mut stmt = tx
        .prepare(&R::SPEC.sql())
        .with_context(|| format!("prepare upsert into {}", R::SPEC.table))?;
    let mut count = 0;
    for row in rows {
        let mut values = row.values();
        values.push(&stamp);
        count += stmt
            .execute(values.as_slice())
            .with_context(|| format!("upsert into {}", R::SPEC.table))?;
    }
    Ok(count)
}

// ── Snapshots ──

pub struct SnapshotRow {
    pub target: String,
    pub season: String,
    pub url: String,
    pub content: Option<String>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn save_snapshot(conn: &Connection, row: &SnapshotRow) -> Result<i64> {
    conn.execute(
        "INSERT INTO page_snapshots (target, season, url, content, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![row.target, row.season, row.url, row.content, row.error, row.latency_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent successfully fetched page for a target and season.
pub fn latest_snapshot(conn: &Connection, target: &str, season: &str) -> Result<Option<(String, String)>> {
    let row = conn
        .query_row(
            "SELECT url, content FROM page_snapshots
             WHERE target = ?1 AND season = ?2 AND content IS NOT NULL
             ORDER BY id DESC LIMIT 1",
            params![target, season],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

// ── Run log ──

pub fn record_run(
    conn: &Connection,
    target: &str,
    season: &str,
    records: usize,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO scrape_runs (target, season, ok, records, error) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![target, season, error.is_none(), records as i64, error],
    )?;
    Ok(())
}

// ── Read side ──

pub fn load_standings(conn: &Connection, season: &str) -> Result<Vec<StandingRow>> {
    let mut stmt = conn.prepare(
        "SELECT season, rank, team, played, wins, draws, losses,
                goals_for, goals_against, goal_diff, points, logo_url
         FROM standings WHERE season = ?1 ORDER BY rank, team",
    )?;
    let rows = stmt
        .query_map([season], |row| {
            Ok(StandingRow {
                season: row.get(0)?,
                rank: row.get(1)?,
                team: row.get(2)?,
                played: row.get(3)?,
                wins: row.get(4)?,
                draws: row.get(5)?,
                losses: row.get(6)?,
                goals_for: row.get(7)?,
                goals_against: row.get(8)?,
                goal_diff: row.get(9)?,
                points: row.get(10)?,
                logo_url: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_scorers(conn: &Connection, season: &str) -> Result<Vec<ScorerRow>> {
    let mut stmt = conn.prepare(
        "SELECT season, rank, player_name, team, goals, penalties
         FROM scorers WHERE season = ?1 ORDER BY rank, player_name",
    )?;
    let rows = stmt
        .query_map([season], |row| {
            Ok(ScorerRow {
                season: row.get(0)?,
                rank: row.get(1)?,
                player_name: row.get(2)?,
                team: row.get(3)?,
                goals: row.get(4)?,
                penalties: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_assists(conn: &Connection, season: &str) -> Result<Vec<AssistRow>> {
    let mut stmt = conn.prepare(
        "SELECT season, rank, player_name, team, assists
         FROM assists WHERE season = ?1 ORDER BY rank, player_name",
    )?;
    let rows = stmt
        .query_map([season], |row| {
            Ok(AssistRow {
                season: row.get(0)?,
                rank: row.get(1)?,
                player_name: row.get(2)?,
                team: row.get(3)?,
                assists: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_club_titles(conn: &Connection) -> Result<Vec<ClubTitlesRow>> {
    let mut stmt =
        conn.prepare("SELECT team, titles, logo_url FROM palmares_clubs ORDER BY titles DESC, team")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ClubTitlesRow {
                team: row.get(0)?,
                titles: row.get(1)?,
                logo_url: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_season_history(conn: &Connection) -> Result<Vec<SeasonHistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT season, winner, winner_logo, runner_up, runner_up_logo
         FROM palmares_history ORDER BY season DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SeasonHistoryRow {
                season: row.get(0)?,
                winner: row.get(1)?,
                winner_logo: row.get(2)?,
                runner_up: row.get(3)?,
                runner_up_logo: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub standings: usize,
    pub scorers: usize,
    pub assists: usize,
    pub clubs: usize,
    pub history: usize,
    pub snapshots: usize,
    pub failed_runs: usize,
}

pub fn get_stats(conn: &Connection, season: &str) -> Result<Stats> {
    let count = |sql: &str, season_scoped: bool| -> Result<usize> {
        let n: usize = if season_scoped {
            conn.query_row(sql, [season], |r| r.get(0))?
        } else {
            conn.query_row(sql, [], |r| r.get(0))?
        };
        Ok(n)
    };
    Ok(Stats {
        standings: count("SELECT COUNT(*) FROM standings WHERE season = ?1", true)?,
        scorers: count("SELECT COUNT(*) FROM scorers WHERE season = ?1", true)?,
        assists: count("SELECT COUNT(*) FROM assists WHERE season = ?1", true)?,
        clubs: count("SELECT COUNT(*) FROM palmares_clubs", false)?,
        history: count("SELECT COUNT(*) FROM palmares_history", false)?,
        snapshots: count("SELECT COUNT(*) FROM page_snapshots WHERE season = ?1", true)?,
        failed_runs: count("SELECT COUNT(*) FROM scrape_runs WHERE season = ?1 AND ok = 0", true)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn standing(rank: i64, team: &str, points: i64) -> StandingRow {
        StandingRow {
            season: "2025/2026".into(),
            rank,
            team: team.into(),
            played: 10,
            wins: 6,
            draws: 2,
            losses: 2,
            goals_for: 18,
            goals_against: 9,
            goal_diff: 9,
            points,
            logo_url: None,
        }
    }

    fn assist(rank: i64, name: &str, assists: i64) -> AssistRow {
        AssistRow {
            season: "2025/2026".into(),
            rank,
            player_name: name.into(),
            team: String::new(),
            assists,
        }
    }

    #[test]
    fn upsert_sql_shape() {
        let sql = AssistRow::SPEC.sql();
        assert_eq!(
            sql,
            "INSERT INTO assists (season, player_name, team, rank, assists, scraped_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(season, player_name, team) \
             DO UPDATE SET rank = excluded.rank, assists = excluded.assists, scraped_at = excluded.scraped_at"
        );
    }

    #[test]
    fn reconciling_twice_is_idempotent() {
        let mut conn = memory_db();
        let batch = Batch::Standings(vec![standing(1, "Lens", 20), standing(2, "Lille", 18)]);

        assert_eq!(conn.reconcile(&batch).unwrap(), 2);
        let first = load_standings(&conn, "2025/2026").unwrap();
        assert_eq!(conn.reconcile(&batch).unwrap(), 2);
        let second = load_standings(&conn, "2025/2026").unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn team_logo_is_stored_and_refreshed() {
        let mut conn = memory_db();
        let mut lens = standing(1, "Lens", 20);
        lens.logo_url = Some("https://www.footmercato.net/l/lens.png".into());
        conn.reconcile(&Batch::Standings(vec![lens.clone()])).unwrap();
        lens.logo_url = Some("https://www.footmercato.net/l/lens-v2.png".into());
        conn.reconcile(&Batch::Standings(vec![lens])).unwrap();

        let rows = load_standings(&conn, "2025/2026").unwrap();
        assert_eq!(rows[0].logo_url.as_deref(), Some("https://www.footmercato.net/l/lens-v2.png"));
    }

    #[test]
    fn untracked_team_does_not_duplicate_assists() {
        let mut conn = memory_db();
        let batch = Batch::Assists(vec![assist(1, "John Doe", 7)]);
        conn.reconcile(&batch).unwrap();
        conn.reconcile(&batch).unwrap();
        assert_eq!(load_assists(&conn, "2025/2026").unwrap().len(), 1);
    }

    #[test]
    fn mutable_fields_are_overwritten_and_absent_keys_kept() {
        let mut conn = memory_db();
        conn.reconcile(&Batch::Standings(vec![standing(1, "Lens", 20), standing(2, "Lille", 18)]))
            .unwrap();
        conn.reconcile(&Batch::Standings(vec![standing(1, "Lille", 21)]))
            .unwrap();

        let rows = load_standings(&conn, "2025/2026").unwrap();
        assert_eq!(rows.len(), 2);
        let lille = rows.iter().find(|r| r.team == "Lille").unwrap();
        assert_eq!((lille.rank, lille.points), (1, 21));
        let lens = rows.iter().find(|r| r.team == "Lens").unwrap();
        assert_eq!((lens.rank, lens.points), (1, 20));
    }

    #[test]
    fn seasons_are_independent() {
        let mut conn = memory_db();
        let mut old = standing(3, "Lens", 50);
        old.season = "2024/2025".into();
        conn.reconcile(&Batch::Standings(vec![old])).unwrap();
        conn.reconcile(&Batch::Standings(vec![standing(1, "Lens", 20)])).unwrap();

        assert_eq!(load_standings(&conn, "2024/2025").unwrap()[0].points, 50);
        assert_eq!(load_standings(&conn, "2025/2026").unwrap()[0].points, 20);
    }

    #[test]
    fn failed_batch_leaves_no_partial_state() {
        let mut conn = memory_db();
        // rank 0 violates the CHECK constraint on the second row.
        let batch = Batch::Assists(vec![assist(1, "John Doe", 7), assist(0, "Bad Row", 1)]);
        assert!(conn.reconcile(&batch).is_err());
        assert!(load_assists(&conn, "2025/2026").unwrap().is_empty());
    }

    #[test]
    fn scraped_at_is_stamped() {
        let mut conn = memory_db();
        conn.reconcile(&Batch::Scorers(vec![ScorerRow {
            season: "2025/2026".into(),
            rank: 1,
            player_name: "Ann Lee".into(),
            team: String::new(),
            goals: 9,
            penalties: 1,
        }]))
        .unwrap();
        let stamp: String = conn
            .query_row("SELECT scraped_at FROM scorers", [], |r| r.get(0))
            .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn latest_snapshot_skips_failed_fetches() {
        let conn = memory_db();
        let ok = SnapshotRow {
            target: "scorers".into(),
            season: "2025/2026".into(),
            url: "https://example.test/buteur".into(),
            content: Some("page".into()),
            error: None,
            latency_ms: Some(10),
        };
        save_snapshot(&conn, &ok).unwrap();
        save_snapshot(
            &conn,
            &SnapshotRow { content: None, error: Some("timeout".into()), ..ok },
        )
        .unwrap();

        let (_, content) = latest_snapshot(&conn, "scorers", "2025/2026").unwrap().unwrap();
        assert_eq!(content, "page");
        assert!(latest_snapshot(&conn, "assists", "2025/2026").unwrap().is_none());
    }

    #[test]
    fn stats_count_failed_runs() {
        let conn = memory_db();
        record_run(&conn, "standings", "2025/2026", 18, None).unwrap();
        record_run(&conn, "scorers", "2025/2026", 0, Some("yield")).unwrap();
        let s = get_stats(&conn, "2025/2026").unwrap();
        assert_eq!(s.failed_runs, 1);
        assert_eq!(s.standings, 0);
    }
}
