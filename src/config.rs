use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::palmares::SITE_BASE;
use crate::parser::schema::Kind;

pub const DEFAULT_SEASON: &str = "2025/2026";
pub const DEFAULT_MIN_YIELD: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub season: String,
    pub db_path: PathBuf,
    pub min_yield: usize,
    pub min_yield_standings: Option<usize>,
    pub min_yield_scorers: Option<usize>,
    pub min_yield_assists: Option<usize>,
    pub fetch_timeout_secs: u64,
    /// Only the closed position vocabulary ends a player name.
    pub strict_positions: bool,
    pub site_base: String,
    pub standings_url: String,
    pub scorers_url: String,
    pub assists_url: String,
    pub palmares_url: String,
}

impl Settings {
    /// Built-in defaults, then `ligue1.toml` (or `file`), then `LIGUE1_*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("ligue1").required(false),
        };
        Config::builder()
            .set_default("season", DEFAULT_SEASON)?
            .set_default("db_path", "data/ligue1.db")?
            .set_default("min_yield", DEFAULT_MIN_YIELD as u64)?
            .set_default("fetch_timeout_secs", 90u64)?
            .set_default("strict_positions", false)?
            .set_default("site_base", SITE_BASE)?
            .set_default("standings_url", "https://www.footmercato.net/france/ligue-1/classement")?
            .set_default("scorers_url", "https://www.footmercato.net/france/ligue-1/buteur")?
            .set_default("assists_url", "https://www.footmercato.net/france/ligue-1/passeur")?
            .set_default("palmares_url", "https://www.footmercato.net/france/ligue-1/palmares")?
            .add_source(file_source)
            .add_source(Environment::with_prefix("LIGUE1").try_parsing(true))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn min_yield_for(&self, kind: Kind) -> usize {
        let specific = match kind {
            Kind::Standings => self.min_yield_standings,
            Kind::Scorers => self.min_yield_scorers,
            Kind::Assists => self.min_yield_assists,
        };
        specific.unwrap_or(self.min_yield)
    }

    pub fn url_for(&self, kind: Kind) -> &str {
        match kind {
            Kind::Standings => &self.standings_url,
            Kind::Scorers => &self.scorers_url,
            Kind::Assists => &self.assists_url,
        }
    }

    /// CLI min-yield wins over every per-kind setting.
    pub fn override_min_yield(&mut self, min_yield: usize) {
        self.min_yield = min_yield;
        self.min_yield_standings = None;
        self.min_yield_scorers = None;
        self.min_yield_assists = None;
    }
}

/// Text the rendered page must contain before it counts as loaded.
pub fn content_marker(kind: Kind) -> Option<&'static str> {
    match kind {
        Kind::Standings => None,
        Kind::Scorers => Some("Buteurs"),
        Kind::Assists => Some("Passeurs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_file_overrides() {
        let dir = std::env::temp_dir().join(format!("ligue1-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ligue1.toml");
        std::fs::write(&path, "season = \"2024/2025\"\nmin_yield_scorers = 5\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.season, "2024/2025");
        assert_eq!(settings.min_yield_for(Kind::Scorers), 5);
        assert_eq!(settings.min_yield_for(Kind::Assists), DEFAULT_MIN_YIELD);
        assert!(settings.url_for(Kind::Assists).ends_with("/passeur"));
        assert_eq!(settings.fetch_timeout_secs, 90);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn cli_min_yield_replaces_per_kind_values() {
        let dir = std::env::temp_dir().join(format!("ligue1-override-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ligue1.toml");
        std::fs::write(&path, "min_yield_standings = 18\n").unwrap();

        let mut settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.min_yield_for(Kind::Standings), 18);
        settings.override_min_yield(3);
        assert_eq!(settings.min_yield_for(Kind::Standings), 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn markers_for_player_pages_only() {
        assert_eq!(content_marker(Kind::Scorers), Some("Buteurs"));
        assert_eq!(content_marker(Kind::Standings), None);
    }
}
