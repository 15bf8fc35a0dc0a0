use serde::Serialize;

use super::schema::Kind;
use super::text::TokenStream;

/// How far past a header the first rank token may sit.
pub const RANK_SCAN_WINDOW: usize = 1500;

const ROW_START: &str = "1";

#[derive(Debug, Clone, Copy)]
pub enum Pat {
    Exact(&'static str),
    Prefix(&'static str),
    OneOf(&'static [&'static str]),
}

impl Pat {
    fn matches(self, token: &str) -> bool {
        match self {
            Pat::Exact(s) => token == s,
            Pat::Prefix(p) => token.starts_with(p),
            Pat::OneOf(set) => set.contains(&token),
        }
    }
}

/// A short run of normalized tokens expected right before (or at) the table.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub name: &'static str,
    pub pattern: &'static [Pat],
    /// Start at the signature itself instead of just past it.
    pub at_marker: bool,
}

impl Signature {
    fn find(&self, norm: &[String]) -> Option<usize> {
        let n = self.pattern.len();
        if n == 0 || norm.len() < n {
            return None;
        }
        (0..=norm.len() - n).find(|&i| {
            self.pattern
                .iter()
                .zip(&norm[i..i + n])
                .all(|(p, tok)| p.matches(tok))
        })
    }
}

const STANDINGS: &[Signature] = &[
    Signature {
        name: "standings-header",
        pattern: &[
            Pat::Exact("equipe"),
            Pat::Exact("pts"),
            Pat::Exact("j"),
            Pat::Exact("dif"),
            Pat::Exact("g"),
            Pat::Exact("n"),
            Pat::Exact("d"),
            Pat::Exact("bp"),
            Pat::Exact("bc"),
        ],
        at_marker: false,
    },
    Signature {
        name: "classement-marker",
        pattern: &[Pat::Exact("classement")],
        at_marker: true,
    },
];

const SCORERS: &[Signature] = &[
    Signature {
        name: "scorers-header",
        pattern: &[Pat::OneOf(&["p.", "p"]), Pat::Exact("b/m"), Pat::Prefix("b/")],
        at_marker: false,
    },
    Signature {
        name: "scorers-rate-columns",
        pattern: &[Pat::Exact("b/m"), Pat::Prefix("b/")],
        at_marker: false,
    },
    Signature {
        name: "buteurs-marker",
        pattern: &[Pat::Exact("buteurs")],
        at_marker: true,
    },
];

const ASSISTS: &[Signature] = &[
    Signature {
        name: "assists-header",
        pattern: &[Pat::Exact("joueur"), Pat::Exact("pd")],
        at_marker: false,
    },
    Signature {
        name: "assists-rate-columns",
        pattern: &[Pat::Exact("pd"), Pat::Prefix("pd/")],
        at_marker: false,
    },
];

/// Signatures for a kind, most specific first.
pub fn signatures(kind: Kind) -> &'static [Signature] {
    match kind {
        Kind::Standings => STANDINGS,
        Kind::Scorers => SCORERS,
        Kind::Assists => ASSISTS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// A header signature matched; `refined` when a rank "1" was found after it.
    Signature { name: &'static str, refined: bool },
    /// No signature matched; first rank "1" in the stream.
    FirstRank,
    /// Nothing matched at all.
    StreamStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub start: usize,
    pub strategy: Strategy,
}

pub fn locate_start(tokens: &TokenStream, kind: Kind) -> Anchor {
    locate_with(tokens, signatures(kind))
}

/// Layered anchor search: signatures in order, then the first rank token,
/// then the start of the stream.
pub fn locate_with(tokens: &TokenStream, sigs: &[Signature]) -> Anchor {
    let norm = &tokens.norm;

    for sig in sigs {
        let Some(pos) = sig.find(norm) else {
            continue;
        };
        let after = if sig.at_marker { pos } else { pos + sig.pattern.len() };
        let window_end = (after + RANK_SCAN_WINDOW).min(norm.len());
        let first_rank = (after..window_end).find(|&j| norm[j] == ROW_START);
        return Anchor {
            start: first_rank.unwrap_or(after),
            strategy: Strategy::Signature {
                name: sig.name,
                refined: first_rank.is_some(),
            },
        };
    }

    match norm.iter().position(|t| t == ROW_START) {
        Some(start) => Anchor {
            start,
            strategy: Strategy::FirstRank,
        },
        None => Anchor {
            start: 0,
            strategy: Strategy::StreamStart,
        },
    }
}
