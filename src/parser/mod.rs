pub mod anchor;
pub mod logos;
pub mod palmares;
pub mod rows;
pub mod schema;
pub mod text;
pub mod validate;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{AssistRow, Batch, ScorerRow, StandingRow};
use anchor::Anchor;
use rows::RowCursor;
use schema::{Kind, PositionRule};
use validate::{TableRecord, Validator};

/// Raw tokens kept on each side of the anchor in a yield diagnostic.
pub const EXCERPT_BEFORE: usize = 50;
pub const EXCERPT_AFTER: usize = 200;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{kind}: {found} records extracted, below threshold {threshold} (anchor at token {})", .anchor.start)]
    InsufficientYield {
        kind: Kind,
        found: usize,
        threshold: usize,
        anchor: Anchor,
        excerpt: String,
    },
    #[error("palmares: no clubs and no season history found")]
    EmptyPalmares,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractStats {
    pub tokens: usize,
    pub parsed: usize,
    pub rejected: usize,
    pub abandoned: usize,
}

#[derive(Debug, Serialize)]
pub struct Extraction<T> {
    pub records: T,
    pub anchor: Anchor,
    pub stats: ExtractStats,
}

impl<T> Extraction<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extraction<U> {
        Extraction {
            records: f(self.records),
            anchor: self.anchor,
            stats: self.stats,
        }
    }
}

/// Page → tokens → anchor → rows → validated records, failing when fewer
/// than `min_yield` records survive.
pub fn extract<R: TableRecord>(
    content: &str,
    season: &str,
    min_yield: usize,
    rule: &dyn PositionRule,
) -> Result<Extraction<Vec<R>>, ExtractionError> {
    let kind = R::KIND;
    let schema = kind.schema();
    let tokens = text::tokenize(&text::page_text(content));
    let anchor = anchor::locate_start(&tokens, kind);
    debug!(%kind, start = anchor.start, strategy = ?anchor.strategy, tokens = tokens.len(), "anchor located");

    let mut cursor = RowCursor::new(&tokens, &schema, rule, anchor.start);
    let mut validator = Validator::new(schema.unique_rank);
    let mut stats = ExtractStats {
        tokens: tokens.len(),
        ..Default::default()
    };
    let mut records = Vec::new();

    for row in cursor.by_ref().take(schema.max_rows) {
        stats.parsed += 1;
        let offset = row.offset;
        let record = R::from_row(row, season);
        match validator.check(&record) {
            Ok(()) => records.push(record),
            Err(reason) => {
                stats.rejected += 1;
                debug!(%kind, offset, %reason, "row rejected");
            }
        }
    }
    stats.abandoned = cursor.abandoned();

    if records.len() < min_yield {
        let excerpt = tokens.excerpt(
            anchor.start.saturating_sub(EXCERPT_BEFORE),
            anchor.start + EXCERPT_AFTER,
        );
        warn!(
            %kind,
            found = records.len(),
            threshold = min_yield,
            start = anchor.start,
            excerpt = %excerpt,
            "extraction below yield threshold"
        );
        return Err(ExtractionError::InsufficientYield {
            kind,
            found: records.len(),
            threshold: min_yield,
            anchor,
            excerpt,
        });
    }

    debug!(
        %kind,
        records = records.len(),
        rejected = stats.rejected,
        abandoned = stats.abandoned,
        end = cursor.position(),
        "extraction done"
    );
    Ok(Extraction { records, anchor, stats })
}

/// Kind-dispatched extraction into a storage batch. Standings also pick up
/// team logos from the page markup, resolved against `site_base`.
pub fn extract_batch(
    kind: Kind,
    content: &str,
    season: &str,
    min_yield: usize,
    rule: &dyn PositionRule,
    site_base: &str,
) -> Result<Extraction<Batch>, ExtractionError> {
    Ok(match kind {
        Kind::Standings => {
            let mut ex = extract::<StandingRow>(content, season, min_yield, rule)?;
            let matched = logos::attach_team_logos(&mut ex.records, content, site_base);
            debug!(matched, teams = ex.records.len(), "team logos attached");
            ex.map(Batch::Standings)
        }
        Kind::Scorers => extract::<ScorerRow>(content, season, min_yield, rule)?.map(Batch::Scorers),
        Kind::Assists => extract::<AssistRow>(content, season, min_yield, rule)?.map(Batch::Assists),
    })
}
