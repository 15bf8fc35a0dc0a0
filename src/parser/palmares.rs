use std::collections::HashSet;
use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::logos::{first_logo, CELL_LOGO_ATTRS, CLUB_LOGO_ATTRS};
use super::schema::is_int;
use super::ExtractionError;
use crate::db::{Batch, ClubTitlesRow, SeasonHistoryRow};

pub const SITE_BASE: &str = "https://www.footmercato.net";

const MAX_TEAM_CHARS: usize = 35;
const MAX_TITLES: i64 = 30;
const BLACKLIST: &[&str] = &["top", "vainqueur", "champion", "ligue", "classement"];

static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Clubs ranked by titles plus the season-by-season history table.
pub fn extract(html: &str, base: &str) -> Result<Batch, ExtractionError> {
    let doc = Html::parse_document(html);
    let base = Url::parse(base).ok();
    let clubs = club_titles(&doc, base.as_ref());
    let history = season_history(&doc, base.as_ref());
    debug!(clubs = clubs.len(), seasons = history.len(), "palmares extracted");

    if clubs.is_empty() && history.is_empty() {
        return Err(ExtractionError::EmptyPalmares);
    }
    Ok(Batch::Palmares { clubs, history })
}

fn flat_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Any block whose text reads "<team> <titles>". Nested blocks repeat their
/// children's text, so the first occurrence of a team wins.
fn club_titles(doc: &Html, base: Option<&Url>) -> Vec<ClubTitlesRow> {
    let mut seen = HashSet::new();
    let mut clubs = Vec::new();

    for block in doc.select(&DIV) {
        let text = flat_text(block);
        let Some((team, count)) = text.rsplit_once(' ') else {
            continue;
        };
        if !is_int(count) {
            continue;
        }
        let Ok(titles) = count.parse::<i64>() else {
            continue;
        };
        if team.chars().count() > MAX_TEAM_CHARS || titles == 0 || titles > MAX_TITLES {
            continue;
        }
        let lowered = team.to_lowercase();
        if BLACKLIST.iter().any(|w| lowered.contains(w)) {
            continue;
        }
        if !seen.insert(team.to_string()) {
            continue;
        }

        clubs.push(ClubTitlesRow {
            team: team.to_string(),
            titles,
            logo_url: first_logo(block, CLUB_LOGO_ATTRS, base),
        });
    }

    clubs
}

fn season_history(doc: &Html, base: Option<&Url>) -> Vec<SeasonHistoryRow> {
    let Some(table) = doc.select(&TABLE).next() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut history = Vec::new();

    for row in table.select(&TR).skip(1) {
        let cells: Vec<ElementRef> = row.select(&TD).collect();
        if cells.len() < 3 {
            continue;
        }
        let season = flat_text(cells[0]);
        if season.is_empty() || !seen.insert(season.clone()) {
            continue;
        }
        history.push(SeasonHistoryRow {
            season,
            winner: flat_text(cells[1]),
            winner_logo: first_logo(cells[1], CELL_LOGO_ATTRS, base),
            runner_up: flat_text(cells[2]),
            runner_up_logo: first_logo(cells[2], CELL_LOGO_ATTRS, base),
        });
    }

    history
}
