#![allow(clippy::missing_docs_in_private_items)]

pub mod chunker;
pub mod extract;
pub mod pipeline;

use std::sync::Arc;

use chrono::Utc;
use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document::Document},
    utils::config::IngestionSettings,
    vector::VectorIndex,
};
pub use pipeline::IngestionPipeline;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Claim-and-process loop for one worker. Run `ingestion.workers` of these
/// per process; the status CAS guarantees each document is claimed once.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    pipeline: Arc<IngestionPipeline>,
    settings: IngestionSettings,
) -> Result<(), AppError> {
    let worker_id = format!("ingestion-worker-{}", Uuid::new_v4());
    let idle_backoff = Duration::from_millis(500);
    let stale_claim = chrono::Duration::seconds(
        i64::try_from(settings.stale_claim_secs).unwrap_or(i64::MAX),
    );

    loop {
        let now = Utc::now();
        match Document::claim_next(&db, now, now - stale_claim).await {
            Ok(Some(document)) => {
                let document_id = document.id.clone();
                info!(%worker_id, %document_id, "claimed document for ingestion");
                if let Err(err) = pipeline.process_document(document).await {
                    error!(%worker_id, %document_id, error = %err, "ingestion failed");
                }
            }
            Ok(None) => {
                sleep(idle_backoff).await;
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim document");
                warn!("Backing off for 1s after claim error");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Reconciliation sweep: finish vector cleanup for documents parked
/// `Orphaned` by a delete whose index call kept failing.
pub async fn run_janitor_loop(
    db: Arc<SurrealDbClient>,
    index: VectorIndex,
    settings: IngestionSettings,
) -> Result<(), AppError> {
    let interval = Duration::from_secs(settings.janitor_interval_secs.max(1));

    loop {
        match Document::list_orphaned(&db).await {
            Ok(orphans) => {
                for document in orphans {
                    match Document::reconcile_orphan(&db, &index, &document).await {
                        Ok(()) => info!(
                            document_id = %document.id,
                            "orphaned document reconciled"
                        ),
                        Err(err) => warn!(
                            document_id = %document.id,
                            error = %err,
                            "orphan reconciliation failed; will retry"
                        ),
                    }
                }
            }
            Err(err) => error!(error = %err, "janitor sweep failed"),
        }

        sleep(interval).await;
    }
}

/// Drain the ingestion queue inline: claim and process until nothing is
/// waiting. Returns how many documents were processed (failed ones count).
pub async fn drain_pending(
    db: &Arc<SurrealDbClient>,
    pipeline: &IngestionPipeline,
    settings: &IngestionSettings,
) -> Result<usize, AppError> {
    let stale_claim = chrono::Duration::seconds(
        i64::try_from(settings.stale_claim_secs).unwrap_or(i64::MAX),
    );
    let mut processed = 0usize;

    loop {
        let now = Utc::now();
        match Document::claim_next(db, now, now - stale_claim).await? {
            Some(document) => {
                let document_id = document.id.clone();
                if let Err(err) = pipeline.process_document(document).await {
                    warn!(%document_id, error = %err, "ingestion failed while draining");
                }
                processed = processed.saturating_add(1);
            }
            None => return Ok(processed),
        }
    }
}
