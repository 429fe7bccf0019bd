use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{ActorId, Id};
use crate::store::Store;

pub const DEFAULT_PURGE_CHUNK_SIZE: usize = 100;

/// A chunk the sweep could not process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    /// Zero-based chunk index within the sweep
    pub chunk: usize,
    pub ids: Vec<Id>,
    pub error: String,
}

/// Outcome of a best-effort sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub purged: u64,
    pub chunks: usize,
    pub failures: Vec<ChunkFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Models,
    Entries,
}

/// Soft delete followed by purge, in bounded chunks. A failing chunk is
/// recorded and the sweep moves on.
pub struct LifecycleManager<S> {
    store: Arc<S>,
    chunk_size: usize,
}

impl<S: Store> LifecycleManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_PURGE_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub async fn delete_and_purge_models(&self, ids: &[Id], actor: ActorId) -> SweepReport {
        self.sweep(Target::Models, ids, actor).await
    }

    pub async fn delete_and_purge_entries(&self, ids: &[Id], actor: ActorId) -> SweepReport {
        self.sweep(Target::Entries, ids, actor).await
    }

    /// Sweep every model `creator` owns, tombstoned ones included.
    /// Keys are walked in ascending id order so a failed chunk is not fetched again.
    pub async fn purge_models_by_creator(
        &self,
        creator: ActorId,
        actor: ActorId,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut after = None;

        loop {
            let ids = self
                .store
                .model_ids_by_creator(creator, after, self.chunk_size)
                .await?;
            let Some(last) = ids.last().copied() else {
                break;
            };
            after = Some(last);

            let chunk = report.chunks;
            report.chunks += 1;
            match self.process_chunk(Target::Models, &ids, actor).await {
                Ok(purged) => report.purged += purged,
                Err(error) => Self::record_failure(&mut report, Target::Models, chunk, ids, error),
            }
        }

        log::info!(
            "Swept models of user {}: {} purged in {} chunks, {} failed",
            creator,
            report.purged,
            report.chunks,
            report.failures.len()
        );
        Ok(report)
    }

    async fn sweep(&self, target: Target, ids: &[Id], actor: ActorId) -> SweepReport {
        let ids: Vec<Id> = ids.iter().copied().unique().collect();
        let mut report = SweepReport::default();

        for (chunk, chunk_ids) in ids.chunks(self.chunk_size).enumerate() {
            report.chunks += 1;
            match self.process_chunk(target, chunk_ids, actor).await {
                Ok(purged) => report.purged += purged,
                Err(error) => {
                    Self::record_failure(&mut report, target, chunk, chunk_ids.to_vec(), error)
                }
            }
        }

        log::info!(
            "Swept {:?}: {} purged in {} chunks, {} failed",
            target,
            report.purged,
            report.chunks,
            report.failures.len()
        );
        report
    }

    async fn process_chunk(&self, target: Target, ids: &[Id], actor: ActorId) -> Result<u64> {
        match target {
            Target::Models => {
                self.store.soft_delete_models(ids, actor).await?;
                self.store.purge_models(ids).await
            }
            Target::Entries => {
                self.store.soft_delete_entries(ids, actor).await?;
                self.store.purge_entries(ids).await
            }
        }
    }

    fn record_failure(
        report: &mut SweepReport,
        target: Target,
        chunk: usize,
        ids: Vec<Id>,
        error: crate::error::EngineError,
    ) {
        let message = error.to_string();
        log::error!(
            "Failed to sweep {:?} chunk {} ({} ids): {:#}",
            target,
            chunk,
            ids.len(),
            anyhow::Error::new(error)
        );
        report.failures.push(ChunkFailure {
            chunk,
            ids,
            error: message,
        });
    }
}
