use std::collections::HashMap;
use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::schema::is_int;
use super::text::normalize;
use crate::db::StandingRow;

/// Lazy-loading attributes tried in order on a ranking-table logo.
pub const RANKING_LOGO_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original", "srcset", "src"];
pub const CLUB_LOGO_ATTRS: &[&str] = &["data-src", "data-lazy-src", "src", "srcset"];
pub const CELL_LOGO_ATTRS: &[&str] = &["data-src", "src"];

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Logo of the first image under `el`, from the first attribute present.
pub fn first_logo(el: ElementRef<'_>, attrs: &[&str], base: Option<&Url>) -> Option<String> {
    let img = el.select(&IMG).next()?;
    let src = attrs.iter().find_map(|attr| img.value().attr(attr))?;
    resolve_logo(src, base)
}

/// First URL of a srcset, data URIs dropped, relative paths joined to the site.
pub fn resolve_logo(src: &str, base: Option<&Url>) -> Option<String> {
    let mut src = src.trim();
    if src.contains(' ') && src.contains(',') {
        src = src.split(',').next()?.split_whitespace().next()?;
    }
    if src.is_empty() || src.starts_with("data:image") {
        return None;
    }
    match base {
        Some(base) => base.join(src).ok().map(String::from),
        None => Some(src.to_string()),
    }
}

/// Logos of ranked table rows, keyed by the normalized text of the row's
/// first link. Rows whose first cell is not a rank are ignored.
pub fn team_logos(html: &str, base: Option<&Url>) -> HashMap<String, String> {
    let doc = Html::parse_document(html);
    let mut logos = HashMap::new();

    for row in doc.select(&TR) {
        let Some(rank_cell) = row.select(&TD).next() else {
            continue;
        };
        let rank: String = rank_cell.text().collect();
        if !is_int(rank.trim()) {
            continue;
        }
        let Some(link) = row.select(&LINK).next() else {
            continue;
        };
        let team = normalize(&link.text().collect::<String>());
        if team.is_empty() {
            continue;
        }
        if let Some(url) = first_logo(row, RANKING_LOGO_ATTRS, base) {
            logos.entry(team).or_insert(url);
        }
    }

    logos
}

/// Fill `logo_url` on standings extracted from `html`; returns how many matched.
pub fn attach_team_logos(rows: &mut [StandingRow], html: &str, base: &str) -> usize {
    let base = Url::parse(base).ok();
    let logos = team_logos(html, base.as_ref());
    if logos.is_empty() {
        return 0;
    }
    let mut matched = 0;
    for row in rows.iter_mut() {
        if let Some(url) = logos.get(&normalize(&row.team)) {
            row.logo_url = Some(url.clone());
            matched += 1;
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.footmercato.net";

    #[test]
    fn srcset_and_data_uris() {
        let base = Url::parse(BASE).ok();
        assert_eq!(
            resolve_logo("/a-1x.png 1x, /a-2x.png 2x", base.as_ref()).as_deref(),
            Some("https://www.footmercato.net/a-1x.png")
        );
        assert_eq!(resolve_logo("data:image/svg+xml;base64,AA", base.as_ref()), None);
        assert_eq!(resolve_logo("https://cdn.test/x.png", None).as_deref(), Some("https://cdn.test/x.png"));
    }

    #[test]
    fn ranked_rows_only() {
        let html = r#"<table>
            <tr><th>#</th><th>Équipe</th></tr>
            <tr><td>1</td><td><img data-original="/l/psg.png"><a href="/c/psg">Paris  Saint-Germain</a></td></tr>
            <tr><td>Pub</td><td><img src="/l/ad.png"><a href="/ad">Sponsor</a></td></tr>
            <tr><td>2</td><td><img src="data:image/gif;base64,AA"><a href="/c/om">Marseille</a></td></tr>
        </table>"#;
        let base = Url::parse(BASE).ok();
        let logos = team_logos(html, base.as_ref());
        assert_eq!(logos.len(), 1);
        assert_eq!(
            logos.get("paris saint-germain").map(String::as_str),
            Some("https://www.footmercato.net/l/psg.png")
        );
    }

    #[test]
    fn plain_text_has_no_logos() {
        assert!(team_logos("1 Lens 40 18 +21 12 4 2 35 14", None).is_empty());
    }
}
