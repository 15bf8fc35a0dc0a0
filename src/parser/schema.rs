use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static SIGNED_INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+$").unwrap());
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?\d+(?:[.,]\d+)?$").unwrap());

/// Position codes seen on the source pages (normalized plane).
pub const POSITION_CODES: &[&str] = &["bu", "ad", "ag", "mc", "md", "mg", "dg", "dd", "dc", "g", "mil"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Standings,
    Scorers,
    Assists,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Standings => "standings",
            Kind::Scorers => "scorers",
            Kind::Assists => "assists",
        }
    }

    pub fn schema(self) -> RowSchema {
        match self {
            Kind::Standings => RowSchema {
                name_end: NameEnd::Fields { max_tokens: 12 },
                fields: &[
                    FieldType::Int,       // points
                    FieldType::Int,       // played
                    FieldType::SignedInt, // goal difference
                    FieldType::Int,       // wins
                    FieldType::Int,       // draws
                    FieldType::Int,       // losses
                    FieldType::Int,       // goals for
                    FieldType::Int,       // goals against
                ],
                max_rows: 40,
                unique_rank: true,
            },
            Kind::Scorers => RowSchema {
                name_end: NameEnd::PositionCode,
                // goals, penalties, goals/match, goals/90
                fields: &[FieldType::Int, FieldType::Int, FieldType::Decimal, FieldType::Decimal],
                max_rows: 250,
                unique_rank: false,
            },
            Kind::Assists => RowSchema {
                name_end: NameEnd::PositionCode,
                // assists, assists/match, assists/90
                fields: &[FieldType::Int, FieldType::Decimal, FieldType::Decimal],
                max_rows: 300,
                unique_rank: false,
            },
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standings" | "classement" => Ok(Kind::Standings),
            "scorers" | "buteurs" => Ok(Kind::Scorers),
            "assists" | "passeurs" => Ok(Kind::Assists),
            other => anyhow::bail!("unknown record kind: {other}"),
        }
    }
}

/// Typed slot in a row's fixed-arity field tuple, checked on the normalized plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Unsigned decimal integer.
    Int,
    /// Integer with optional leading sign.
    SignedInt,
    /// Rate with `.` or `,` as decimal separator. Consumed, never stored.
    Decimal,
}

impl FieldType {
    pub fn accepts(self, token: &str) -> bool {
        match self {
            FieldType::Int => is_int(token),
            FieldType::SignedInt => SIGNED_INT_RE.is_match(token),
            FieldType::Decimal => DECIMAL_RE.is_match(token),
        }
    }
}

/// How the variable-length name span ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameEnd {
    /// A position code follows the name and is consumed and discarded.
    PositionCode,
    /// No separator: the name ends where the field tuple first type-checks,
    /// within `max_tokens` tokens.
    Fields { max_tokens: usize },
}

#[derive(Debug, Clone)]
pub struct RowSchema {
    pub name_end: NameEnd,
    pub fields: &'static [FieldType],
    pub max_rows: usize,
    pub unique_rank: bool,
}

impl RowSchema {
    /// True when the whole tuple type-checks starting at `at`.
    pub fn fields_match(&self, norm: &[String], at: usize) -> bool {
        at + self.fields.len() <= norm.len()
            && self
                .fields
                .iter()
                .zip(&norm[at..])
                .all(|(f, tok)| f.accepts(tok))
    }
}

pub fn is_int(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Decides whether a token closes the name span.
pub trait PositionRule: Send + Sync {
    fn is_position(&self, raw: &str, norm: &str) -> bool;
    fn in_vocabulary(&self, norm: &str) -> bool;
}

/// Closed vocabulary plus the short upper-case fallback for unknown codes.
#[derive(Debug, Clone)]
pub struct PositionCodes {
    vocabulary: HashSet<String>,
    max_heuristic_len: usize,
}

impl Default for PositionCodes {
    fn default() -> Self {
        Self::new(POSITION_CODES.iter().copied(), 4)
    }
}

impl PositionCodes {
    pub fn new<'a>(codes: impl IntoIterator<Item = &'a str>, max_heuristic_len: usize) -> Self {
        Self {
            vocabulary: codes.into_iter().map(str::to_string).collect(),
            max_heuristic_len,
        }
    }

    /// Vocabulary only; unknown upper-case tokens are kept in the name.
    pub fn strict() -> Self {
        Self::new(POSITION_CODES.iter().copied(), 0)
    }
}

impl PositionRule for PositionCodes {
    fn is_position(&self, raw: &str, norm: &str) -> bool {
        if self.in_vocabulary(norm) {
            return true;
        }
        let len = raw.chars().count();
        len >= 1
            && len <= self.max_heuristic_len
            && raw.chars().all(char::is_alphabetic)
            && raw.chars().all(|c| !c.is_lowercase())
    }

    fn in_vocabulary(&self, norm: &str) -> bool {
        self.vocabulary.contains(norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_types() {
        assert!(FieldType::Int.accepts("12"));
        assert!(!FieldType::Int.accepts("-3"));
        assert!(!FieldType::Int.accepts("0,8"));
        assert!(!FieldType::Int.accepts(""));
        assert!(FieldType::SignedInt.accepts("-3"));
        assert!(FieldType::SignedInt.accepts("+14"));
        assert!(!FieldType::SignedInt.accepts("+"));
        assert!(FieldType::Decimal.accepts("0,8"));
        assert!(FieldType::Decimal.accepts("1.25"));
        assert!(FieldType::Decimal.accepts("2"));
        assert!(!FieldType::Decimal.accepts("nan"));
        assert!(!FieldType::Decimal.accepts("mc"));
    }

    #[test]
    fn position_vocabulary_and_heuristic() {
        let rule = PositionCodes::default();
        assert!(rule.is_position("MC", "mc"));
        assert!(rule.is_position("mil", "mil"));
        assert!(rule.is_position("ATT", "att"));
        assert!(!rule.is_position("Doe", "doe"));
        assert!(!rule.is_position("ABCDE", "abcde"));
        assert!(!rule.is_position("O'N", "o'n"));
    }

    #[test]
    fn strict_rule_ignores_unknown_codes() {
        let rule = PositionCodes::strict();
        assert!(rule.is_position("BU", "bu"));
        assert!(!rule.is_position("ATT", "att"));
    }

    #[test]
    fn kind_parses_french_aliases() {
        assert_eq!("buteurs".parse::<Kind>().unwrap(), Kind::Scorers);
        assert_eq!("Assists".parse::<Kind>().unwrap(), Kind::Assists);
        assert!("palmares".parse::<Kind>().is_err());
    }

    #[test]
    fn standings_tuple_needs_all_eight_fields() {
        let schema = Kind::Standings.schema();
        let toks: Vec<String> = "40 18 +21 12 4 2 35 14".split(' ').map(String::from).collect();
        assert!(schema.fields_match(&toks, 0));
        assert!(!schema.fields_match(&toks, 1));
    }
}
