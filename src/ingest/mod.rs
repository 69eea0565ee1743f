use crate::config::IngestConfig;
use crate::dedupe::{DedupeReport, Deduplicator};
use crate::errors::{AppError, AppResult};
use crate::extract::{ExtractReport, PartExtractor};
use crate::gmail::MailSource;
use crate::naming::{FolderNamer, MailFolder};
use crate::types::MessageRef;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One successfully ingested message.
#[derive(Debug, Clone)]
pub struct IngestedMessage {
    pub message_id: String,
    pub folder: MailFolder,
    pub report: ExtractReport,
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub found: usize,
    pub ingested: Vec<IngestedMessage>,
    pub failed: Vec<(String, String)>,
    pub not_started: usize,
    pub cancelled: bool,
    pub dedupe: Option<DedupeReport>,
    /// Set when the dedupe pass could not run at all.
    pub dedupe_error: Option<String>,
}

impl IngestSummary {
    pub fn files_written(&self) -> usize {
        self.ingested.iter().map(|m| m.report.files_written()).sum()
    }
}

/// Two-phase ingestion: fetch and extract every message, then dedupe the
/// whole destination once all workers are done.
pub struct IngestEngine {
    source: Arc<dyn MailSource>,
    config: IngestConfig,
}

impl IngestEngine {
    pub fn new(source: Arc<dyn MailSource>, config: IngestConfig) -> Self {
        Self { source, config }
    }

    fn root(&self) -> &PathBuf {
        &self.config.dest_root
    }

    pub async fn run(&self, query: &str, cancel: &CancellationToken) -> AppResult<IngestSummary> {
        let started_at = Utc::now();
        let run_start = Instant::now();

        std::fs::create_dir_all(self.root()).map_err(|e| AppError::io(self.root(), e))?;

        let refs = self.source.search(query).await?;
        info!(query = %query, found = refs.len(), "Search completed");

        let namer = FolderNamer::new(self.root().clone(), self.config.subjectless);
        let found = refs.len();

        let results: Vec<(String, AppResult<IngestedMessage>)> = stream::iter(refs)
            .map(|msg_ref| {
                let namer = &namer;
                async move {
                    if cancel.is_cancelled() {
                        return (msg_ref.id.clone(), Err(AppError::Cancelled));
                    }
                    let result = self.ingest_message(&msg_ref, namer).await;
                    (msg_ref.id, result)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut ingested = Vec::new();
        let mut failed = Vec::new();
        let mut not_started = 0;
        for (id, result) in results {
            match result {
                Ok(msg) => ingested.push(msg),
                Err(AppError::Cancelled) => not_started += 1,
                Err(e) => {
                    warn!(message_id = %id, error = %e, "Message ingestion failed; continuing");
                    failed.push((id, e.to_string()));
                }
            }
        }
        let cancelled = cancel.is_cancelled();

        info!(
            found,
            ingested = ingested.len(),
            failed = failed.len(),
            not_started,
            elapsed_ms = ?run_start.elapsed().as_millis(),
            "Ingestion phase completed"
        );

        let mut dedupe_error = None;
        let dedupe = if cancelled {
            warn!("Run cancelled; skipping dedupe");
            None
        } else if self.config.dedupe {
            match self.dedupe().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Dedupe failed; keeping ingested folders as they are");
                    dedupe_error = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        Ok(IngestSummary {
            started_at,
            finished_at: Utc::now(),
            found,
            ingested,
            failed,
            not_started,
            cancelled,
            dedupe,
            dedupe_error,
        })
    }

    /// Fetch one message, give it a folder and write its parts.
    pub async fn ingest_message(
        &self,
        msg_ref: &MessageRef,
        namer: &FolderNamer,
    ) -> AppResult<IngestedMessage> {
        let fetch_start = Instant::now();
        let message = self.source.get_full_message(&msg_ref.id).await?;
        debug!(
            message_id = %msg_ref.id,
            elapsed_ms = ?fetch_start.elapsed().as_millis(),
            "Fetched full message"
        );

        info!(
            message_id = %msg_ref.id,
            from = message.header("From").unwrap_or_default(),
            to = message.header("To").unwrap_or_default(),
            subject = message.subject().unwrap_or_default(),
            date = message.header("Date").unwrap_or_default(),
            "Ingesting message"
        );

        let folder = namer.allocate(message.subject())?;
        let report = PartExtractor::new(&*self.source, self.config.attachment_retries)
            .extract(&msg_ref.id, &message.parts, &folder)
            .await;

        info!(
            message_id = %msg_ref.id,
            folder = %folder.name,
            files = report.files_written(),
            skipped = report.skipped,
            failures = report.failures,
            "Message ingested"
        );

        Ok(IngestedMessage {
            message_id: msg_ref.id.clone(),
            folder,
            report,
        })
    }

    /// Remove duplicate folders under the destination root.
    pub async fn dedupe(&self) -> AppResult<DedupeReport> {
        let root = self.root().clone();
        let dedup = Deduplicator::new(self.config.keep).dry_run(self.config.dry_run);
        let start = Instant::now();

        let report = tokio::task::spawn_blocking(move || dedup.run(&root))
            .await
            .map_err(|e| AppError::Unexpected(format!("dedupe task panicked: {e}")))??;

        info!(
            scanned = report.scanned,
            groups = report.groups.len(),
            removed = report.removed.len(),
            elapsed_ms = ?start.elapsed().as_millis(),
            "Dedupe completed"
        );
        Ok(report)
    }
}
