use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{BrowserSession, ChromiumBrowser};
use crate::classifier::classify;
use crate::config::Config;
use crate::db::{self, UpsertOutcome};
use crate::extract::api::StructuredApiExtractor;
use crate::extract::rendered::{LeychileRenderedExtractor, RenderedPageExtractor};
use crate::extract::{select_strategy, ExtractStrategy, StrategyKind};
use crate::record::{NormInput, NormRecord, RecordStatus};
use crate::validity::{self, Vigency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Inserted,
    Updated,
    PreservedExisting,
    SkippedEmpty,
    /// Structured payload said the norm is no longer in force; not stored.
    DroppedNotInForce,
}

/// One per-URL outcome, as written to the audit artifact.
#[derive(Serialize)]
pub struct ProcessedNorm {
    pub disposition: Disposition,
    /// Vigency could not be determined; stored, but flagged.
    pub needs_review: bool,
    #[serde(flatten)]
    pub record: NormRecord,
}

/// Run the full ingestion flow over the inputs, in input order:
/// classify → extract → validity gate (structured path) → upsert.
/// Per-record failures become error records; only browser acquisition
/// failures abort the run. The browser session, if one was needed, is
/// closed on every exit path.
pub async fn run_scrape(
    conn: &Connection,
    cfg: &Config,
    inputs: &[NormInput],
    requested: Option<StrategyKind>,
) -> Result<Vec<ProcessedNorm>> {
    let mut session: Option<Arc<ChromiumBrowser>> = None;
    let result = process_all(conn, cfg, inputs, requested, &mut session).await;
    if let Some(browser) = session {
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser session: {}", e);
        }
    }
    result
}

async fn process_all(
    conn: &Connection,
    cfg: &Config,
    inputs: &[NormInput],
    requested: Option<StrategyKind>,
    session: &mut Option<Arc<ChromiumBrowser>>,
) -> Result<Vec<ProcessedNorm>> {
    let api = StructuredApiExtractor::new()?;
    let mut outcomes = Vec::with_capacity(inputs.len());

    for input in inputs {
        let classification = classify(&input.public_url);
        let kind = select_strategy(&classification, requested);

        let record = match kind {
            StrategyKind::Api => api.extract(input).await,
            StrategyKind::Rendered => {
                let browser = acquire(session).await?;
                RenderedPageExtractor::new(browser, cfg.settle_delay)
                    .extract(input)
                    .await
            }
            StrategyKind::Leychile => {
                let browser = acquire(session).await?;
                let shot = screenshot_target(&cfg.results_dir);
                LeychileRenderedExtractor::new(browser, cfg.wait_timeout, shot)
                    .extract(input)
                    .await
            }
        };

        // Vigency only applies to structured payloads.
        let action = if kind == StrategyKind::Api {
            validity_action(&record)
        } else {
            ValidityAction::Proceed {
                needs_review: false,
            }
        };

        let outcome = match action {
            ValidityAction::Drop => {
                let id = record
                    .raw_payload
                    .as_ref()
                    .map(validity::norm_id)
                    .unwrap_or_default();
                warn!("Norm {} ({}) is not in force, dropping", id, record.name);
                ProcessedNorm {
                    disposition: Disposition::DroppedNotInForce,
                    needs_review: false,
                    record,
                }
            }
            ValidityAction::Proceed { needs_review } => {
                if needs_review {
                    let id = record
                        .raw_payload
                        .as_ref()
                        .map(validity::norm_id)
                        .unwrap_or_default();
                    warn!(
                        "Could not verify vigency of norm {} ({}); stored but flagged for manual review",
                        id, record.name
                    );
                }
                let disposition = match db::upsert(conn, &record)? {
                    UpsertOutcome::Inserted => Disposition::Inserted,
                    UpsertOutcome::Updated => Disposition::Updated,
                    UpsertOutcome::PreservedExisting => Disposition::PreservedExisting,
                    UpsertOutcome::SkippedEmpty => Disposition::SkippedEmpty,
                };
                ProcessedNorm {
                    disposition,
                    needs_review,
                    record,
                }
            }
        };

        info!("{}: {:?}", outcome.record.name, outcome.disposition);
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

/// Best-effort debug screenshot path. The directory must exist before the
/// browser writes into it; if it cannot be created, skip the screenshot.
fn screenshot_target(dir: &Path) -> Option<PathBuf> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Some(dir.join("debug_pre_extract.png")),
        Err(e) => {
            warn!("Could not create {}: {}", dir.display(), e);
            None
        }
    }
}

async fn acquire(session: &mut Option<Arc<ChromiumBrowser>>) -> Result<Arc<ChromiumBrowser>> {
    if let Some(browser) = session {
        return Ok(Arc::clone(browser));
    }
    // Launch failure is run-fatal; everything else is per-record.
    let browser = Arc::new(ChromiumBrowser::launch().await?);
    *session = Some(Arc::clone(&browser));
    Ok(browser)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidityAction {
    Proceed { needs_review: bool },
    Drop,
}

/// Invalid blocks persistence; Unknown passes through flagged. Error
/// records skip the gate entirely (there is no payload to judge).
fn validity_action(record: &NormRecord) -> ValidityAction {
    match &record.raw_payload {
        Some(payload) if record.status == RecordStatus::Ok => match validity::infer(payload) {
            Vigency::Valid => ValidityAction::Proceed {
                needs_review: false,
            },
            Vigency::Invalid => ValidityAction::Drop,
            Vigency::Unknown => ValidityAction::Proceed { needs_review: true },
        },
        _ => ValidityAction::Proceed {
            needs_review: false,
        },
    }
}

// ── Reporting ──

#[derive(Default)]
pub struct ScrapeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub preserved: usize,
    pub skipped: usize,
    pub dropped: usize,
    pub errors: usize,
}

impl ScrapeCounts {
    pub fn tally(outcomes: &[ProcessedNorm]) -> Self {
        let mut counts = Self::default();
        for o in outcomes {
            match o.disposition {
                Disposition::Inserted => counts.inserted += 1,
                Disposition::Updated => counts.updated += 1,
                Disposition::PreservedExisting => counts.preserved += 1,
                Disposition::SkippedEmpty => counts.skipped += 1,
                Disposition::DroppedNotInForce => counts.dropped += 1,
            }
            if o.record.status == RecordStatus::Error {
                counts.errors += 1;
            }
        }
        counts
    }

    pub fn print(&self) {
        println!(
            "Saved {} new, {} updated, {} preserved, {} skipped (empty), {} dropped (not in force), {} errors.",
            self.inserted, self.updated, self.preserved, self.skipped, self.dropped, self.errors,
        );
    }
}
