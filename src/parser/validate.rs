use std::collections::HashSet;

use thiserror::Error;

use super::rows::ParsedRow;
use super::schema::Kind;
use crate::db::{AssistRow, ScorerRow, StandingRow};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("rank {0} is not positive")]
    NonPositiveRank(i64),
    #[error("empty name")]
    EmptyName,
    #[error("name {0:?} contains a digit")]
    DigitInName(String),
    #[error("goal difference {diff} != {goals_for} - {goals_against}")]
    GoalDifference { diff: i64, goals_for: i64, goals_against: i64 },
    #[error("{wins}+{draws}+{losses} results for {played} matches")]
    MatchesPlayed { played: i64, wins: i64, draws: i64, losses: i64 },
    #[error("rank {0} already taken")]
    DuplicateRank(i64),
    #[error("duplicate key {0:?}")]
    DuplicateKey(String),
}

/// A typed record built from one parsed row.
pub trait TableRecord: Sized {
    const KIND: Kind;

    fn from_row(row: ParsedRow, season: &str) -> Self;
    fn rank(&self) -> i64;
    fn name(&self) -> &str;
    /// Storage identity within a season.
    fn key(&self) -> String;

    /// Kind-specific arithmetic checks.
    fn consistency(&self) -> Result<(), Rejection> {
        Ok(())
    }
}

impl TableRecord for StandingRow {
    const KIND: Kind = Kind::Standings;

    fn from_row(row: ParsedRow, season: &str) -> Self {
        let f = &row.ints;
        StandingRow {
            season: season.to_string(),
            rank: row.rank,
            team: row.name,
            points: f[0],
            played: f[1],
            goal_diff: f[2],
            wins: f[3],
            draws: f[4],
            losses: f[5],
            goals_for: f[6],
            goals_against: f[7],
            logo_url: None,
        }
    }

    fn rank(&self) -> i64 {
        self.rank
    }

    fn name(&self) -> &str {
        &self.team
    }

    fn key(&self) -> String {
        self.team.clone()
    }

    fn consistency(&self) -> Result<(), Rejection> {
        if self.goals_for.checked_sub(self.goals_against) != Some(self.goal_diff) {
            return Err(Rejection::GoalDifference {
                diff: self.goal_diff,
                goals_for: self.goals_for,
                goals_against: self.goals_against,
            });
        }
        let results = self
            .wins
            .checked_add(self.draws)
            .and_then(|n| n.checked_add(self.losses));
        if results != Some(self.played) {
            return Err(Rejection::MatchesPlayed {
                played: self.played,
                wins: self.wins,
                draws: self.draws,
                losses: self.losses,
            });
        }
        Ok(())
    }
}

impl TableRecord for ScorerRow {
    const KIND: Kind = Kind::Scorers;

    fn from_row(row: ParsedRow, season: &str) -> Self {
        ScorerRow {
            season: season.to_string(),
            rank: row.rank,
            player_name: row.name,
            team: String::new(),
            goals: row.ints[0],
            penalties: row.ints[1],
        }
    }

    fn rank(&self) -> i64 {
        self.rank
    }

    fn name(&self) -> &str {
        &self.player_name
    }

    fn key(&self) -> String {
        self.player_name.clone()
    }
}

impl TableRecord for AssistRow {
    const KIND: Kind = Kind::Assists;

    fn from_row(row: ParsedRow, season: &str) -> Self {
        AssistRow {
            season: season.to_string(),
            rank: row.rank,
            player_name: row.name,
            team: String::new(),
            assists: row.ints[0],
        }
    }

    fn rank(&self) -> i64 {
        self.rank
    }

    fn name(&self) -> &str {
        &self.player_name
    }

    fn key(&self) -> String {
        format!("{}\u{1f}{}", self.player_name, self.team)
    }
}

/// Batch-scoped acceptance state: keys and ranks already taken.
pub struct Validator {
    unique_rank: bool,
    keys: HashSet<String>,
    ranks: HashSet<i64>,
}

impl Validator {
    pub fn new(unique_rank: bool) -> Self {
        Self {
            unique_rank,
            keys: HashSet::new(),
            ranks: HashSet::new(),
        }
    }

    /// Accept or reject one record. Accepted records claim their key and rank.
    pub fn check<R: TableRecord>(&mut self, record: &R) -> Result<(), Rejection> {
        let rank = record.rank();
        if rank <= 0 {
            return Err(Rejection::NonPositiveRank(rank));
        }
        let name = record.name().trim();
        if name.is_empty() {
            return Err(Rejection::EmptyName);
        }
        if name.chars().any(|c| c.is_ascii_digit()) {
            return Err(Rejection::DigitInName(name.to_string()));
        }
        record.consistency()?;
        if self.unique_rank && self.ranks.contains(&rank) {
            return Err(Rejection::DuplicateRank(rank));
        }
        let key = record.key();
        if self.keys.contains(&key) {
            return Err(Rejection::DuplicateKey(key));
        }
        self.keys.insert(key);
        self.ranks.insert(rank);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(rank: i64, name: &str, ints: &[i64]) -> ParsedRow {
        ParsedRow {
            rank,
            name: name.to_string(),
            ints: ints.to_vec(),
            offset: 0,
        }
    }

    fn assist(rank: i64, name: &str) -> AssistRow {
        AssistRow::from_row(parsed(rank, name, &[3]), "2025/2026")
    }

    #[test]
    fn rejects_bad_rank_and_names() {
        let mut v = Validator::new(false);
        assert_eq!(v.check(&assist(0, "John Doe")), Err(Rejection::NonPositiveRank(0)));
        assert_eq!(v.check(&assist(1, "  ")), Err(Rejection::EmptyName));
        assert!(matches!(v.check(&assist(1, "Player 2")), Err(Rejection::DigitInName(_))));
        assert_eq!(v.check(&assist(1, "John Doe")), Ok(()));
    }

    #[test]
    fn first_duplicate_key_wins() {
        let mut v = Validator::new(false);
        assert!(v.check(&assist(1, "John Doe")).is_ok());
        assert!(matches!(v.check(&assist(4, "John Doe")), Err(Rejection::DuplicateKey(_))));
    }

    #[test]
    fn tied_ranks_allowed_for_players() {
        let mut v = Validator::new(false);
        assert!(v.check(&assist(3, "Ann Lee")).is_ok());
        assert!(v.check(&assist(3, "Bob Kay")).is_ok());
    }

    #[test]
    fn standings_fields_map_in_column_order() {
        let row = StandingRow::from_row(
            parsed(1, "Lens", &[40, 18, 21, 12, 4, 2, 35, 14]),
            "2025/2026",
        );
        assert_eq!((row.points, row.played, row.goal_diff), (40, 18, 21));
        assert_eq!((row.wins, row.draws, row.losses), (12, 4, 2));
        assert_eq!((row.goals_for, row.goals_against), (35, 14));
        assert!(row.consistency().is_ok());
    }

    #[test]
    fn standings_arithmetic_is_checked() {
        let mut v = Validator::new(true);
        let bad_diff = StandingRow::from_row(parsed(1, "Lens", &[40, 18, 20, 12, 4, 2, 35, 14]), "s");
        assert!(matches!(v.check(&bad_diff), Err(Rejection::GoalDifference { .. })));
        let bad_played = StandingRow::from_row(parsed(1, "Lens", &[40, 19, 21, 12, 4, 2, 35, 14]), "s");
        assert!(matches!(v.check(&bad_played), Err(Rejection::MatchesPlayed { .. })));
    }

    #[test]
    fn oversized_results_are_rejected_not_summed() {
        let mut v = Validator::new(true);
        let row = StandingRow::from_row(
            parsed(1, "Lens", &[40, 18, 0, i64::MAX, i64::MAX, 0, 5, 5]),
            "s",
        );
        assert!(matches!(v.check(&row), Err(Rejection::MatchesPlayed { .. })));
    }

    #[test]
    fn standings_rank_must_be_unique() {
        let mut v = Validator::new(true);
        let lens = StandingRow::from_row(parsed(1, "Lens", &[40, 18, 21, 12, 4, 2, 35, 14]), "s");
        let lille = StandingRow::from_row(parsed(1, "Lille", &[38, 18, 10, 11, 5, 2, 30, 20]), "s");
        assert!(v.check(&lens).is_ok());
        assert_eq!(v.check(&lille), Err(Rejection::DuplicateRank(1)));
    }

    #[test]
    fn rejected_record_does_not_claim_key() {
        let mut v = Validator::new(true);
        let bad = StandingRow::from_row(parsed(1, "Lens", &[40, 18, 0, 12, 4, 2, 35, 14]), "s");
        let good = StandingRow::from_row(parsed(1, "Lens", &[40, 18, 21, 12, 4, 2, 35, 14]), "s");
        assert!(v.check(&bad).is_err());
        assert!(v.check(&good).is_ok());
    }
}
