use crate::error::RuntimeError;
use engine_processing::{error::ImporterError, importer::Importer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// An importer running on its own Tokio task.
pub struct ImporterHandle {
    importer: Arc<Importer>,
    handle: JoinHandle<Result<(), ImporterError>>,
}

impl ImporterHandle {
    pub fn importer(&self) -> &Arc<Importer> {
        &self.importer
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn stop(&self) {
        self.importer.stop().await;
    }

    /// Waits for the loop to exit and surfaces its outcome.
    pub async fn join(self) -> Result<(), RuntimeError> {
        self.handle.await??;
        Ok(())
    }
}

/// Spawns a Tokio task that runs the importer loop and returns a handle to it.
pub fn spawn_importer(importer: Arc<Importer>) -> ImporterHandle {
    let span = tracing::info_span!("importer", importer_id = %importer.importer_id());
    let handle = tokio::spawn({
        let importer = Arc::clone(&importer);
        async move { importer.start().await }.instrument(span)
    });

    ImporterHandle { importer, handle }
}
