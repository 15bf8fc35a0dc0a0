use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::config::{content_marker, Settings};
use crate::db::{Batch, RecordSink, SnapshotRow};
use crate::fetch::{PageRequest, PageSource};
use crate::parser::schema::{Kind, PositionRule};
use crate::parser::{self, palmares};

/// One page to fetch, extract and reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Table(Kind),
    Palmares,
}

impl Target {
    /// Order of a full run.
    pub const ALL: [Target; 4] = [
        Target::Table(Kind::Standings),
        Target::Table(Kind::Scorers),
        Target::Table(Kind::Assists),
        Target::Palmares,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Target::Table(kind) => kind.as_str(),
            Target::Palmares => "palmares",
        }
    }

    pub fn request(self, settings: &Settings) -> PageRequest<'_> {
        match self {
            Target::Table(kind) => PageRequest {
                url: settings.url_for(kind),
                rendered: true,
                marker: content_marker(kind),
            },
            Target::Palmares => PageRequest {
                url: &settings.palmares_url,
                rendered: false,
                marker: None,
            },
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "palmares" | "palmarès" => Ok(Target::Palmares),
            other => other.parse().map(Target::Table),
        }
    }
}

pub struct RunContext<'a> {
    pub settings: &'a Settings,
    pub rule: &'a dyn PositionRule,
}

/// Extract a page's content and reconcile the batch. Nothing is written when
/// extraction fails.
pub fn process_content<K: RecordSink>(
    sink: &mut K,
    ctx: &RunContext<'_>,
    target: Target,
    content: &str,
) -> Result<usize> {
    let season = &ctx.settings.season;
    let batch: Batch = match target {
        Target::Table(kind) => {
            let ex = parser::extract_batch(
                kind,
                content,
                season,
                ctx.settings.min_yield_for(kind),
                ctx.rule,
                &ctx.settings.site_base,
            )?;
            info!(
                %target,
                strategy = ?ex.anchor.strategy,
                parsed = ex.stats.parsed,
                rejected = ex.stats.rejected,
                abandoned = ex.stats.abandoned,
                "extracted"
            );
            ex.records
        }
        Target::Palmares => palmares::extract(content, &ctx.settings.site_base)?,
    };

    let written = sink
        .reconcile(&batch)
        .with_context(|| format!("reconcile {target} for {season}"))?;
    info!(%target, %season, records = batch.len(), written, "batch reconciled");
    Ok(batch.len())
}

/// Fetch, snapshot, extract, reconcile.
pub async fn run_target<S: PageSource, K: RecordSink>(
    source: &S,
    sink: &mut K,
    ctx: &RunContext<'_>,
    target: Target,
) -> Result<usize> {
    let request = target.request(ctx.settings);
    let mut snapshot = SnapshotRow {
        target: target.label().to_string(),
        season: ctx.settings.season.clone(),
        url: request.url.to_string(),
        content: None,
        error: None,
        latency_ms: None,
    };

    let page = match source.fetch(&request).await {
        Ok(page) => page,
        Err(e) => {
            snapshot.error = Some(format!("{e:#}"));
            sink.save_snapshot(&snapshot)?;
            return Err(e);
        }
    };
    snapshot.latency_ms = Some(page.latency_ms);
    snapshot.content = Some(page.content);
    sink.save_snapshot(&snapshot)?;

    let content = snapshot.content.as_deref().unwrap_or_default();
    process_content(sink, ctx, target, content)
}

#[derive(Debug)]
pub struct RunReport {
    pub target: Target,
    pub records: usize,
    pub error: Option<String>,
}

impl RunReport {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Run targets in order. Without `keep_going` the run stops at the first
/// failure; targets reconciled before it stay committed.
pub async fn run_all<S: PageSource, K: RecordSink>(
    source: &S,
    sink: &mut K,
    ctx: &RunContext<'_>,
    targets: &[Target],
    keep_going: bool,
) -> Vec<RunReport> {
    let pb = ProgressBar::new(targets.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:20} {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut reports = Vec::with_capacity(targets.len());
    for &target in targets {
        pb.set_message(target.label());
        let report = match run_target(source, sink, ctx, target).await {
            Ok(records) => RunReport { target, records, error: None },
            Err(e) => {
                error!(%target, error = %format!("{e:#}"), "target failed");
                RunReport { target, records: 0, error: Some(format!("{e:#}")) }
            }
        };
        if let Err(e) = sink.record_run(target.label(), &ctx.settings.season, report.records, report.error.as_deref()) {
            error!(%target, error = %e, "failed to record run");
        }
        pb.inc(1);

        let stop = !report.ok() && !keep_going;
        reports.push(report);
        if stop {
            break;
        }
    }
    pb.finish_and_clear();
    reports
}
