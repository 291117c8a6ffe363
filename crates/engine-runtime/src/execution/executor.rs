use crate::{
    error::RuntimeError,
    execution::spawn::{ImporterHandle, spawn_importer},
};
use engine_processing::importer::{Importer, ImporterState};
use futures::future::join_all;
use model::core::identifiers::ImporterId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Final state of one importer after the executor returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImporterOutcome {
    pub importer_id: ImporterId,
    pub state: ImporterState,
}

/// Runs a set of importers side by side, each on its own task, and stops all
/// of them once `cancel` fires.
pub struct PipelineExecutor {
    cancel: CancellationToken,
    importers: Vec<Arc<Importer>>,
}

impl PipelineExecutor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            importers: Vec::new(),
        }
    }

    pub fn with_importer(mut self, importer: Arc<Importer>) -> Self {
        self.importers.push(importer);
        self
    }

    /// Waits for every importer to exit. All importers are awaited even when
    /// one fails; the first failure is returned.
    pub async fn run(self) -> Result<Vec<ImporterOutcome>, RuntimeError> {
        info!(importers = self.importers.len(), "Launching importers");

        let handles: Vec<ImporterHandle> = self
            .importers
            .iter()
            .cloned()
            .map(spawn_importer)
            .collect();

        let done = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = self.cancel.clone();
            let done = done.clone();
            let importers = self.importers.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Shutdown requested, stopping importers");
                        for importer in importers {
                            importer.stop().await;
                        }
                    }
                    _ = done.cancelled() => {}
                }
            }
        });

        let results = join_all(handles.into_iter().map(ImporterHandle::join)).await;
        done.cancel();
        watcher.await?;

        let mut first_failure = None;
        for result in results {
            if let Err(err) = result {
                error!(error = %err, "Importer terminated with an error");
                first_failure.get_or_insert(err);
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }

        Ok(self
            .importers
            .iter()
            .map(|importer| ImporterOutcome {
                importer_id: importer.importer_id().clone(),
                state: importer.state(),
            })
            .collect())
    }
}
