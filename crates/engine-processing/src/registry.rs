use crate::importer::Importer;
use dashmap::DashMap;
use model::core::identifiers::{AckToken, ImporterId};
use std::sync::Arc;
use tracing::debug;

/// Lookup from importer id to running importer, so that an acknowledgment
/// arriving from a remote peer can be routed by the id embedded in its token.
///
/// Shared as an `Arc` by whoever wires importers together; there is no global
/// instance.
#[derive(Debug, Default)]
pub struct ImporterRegistry {
    importers: DashMap<ImporterId, Arc<Importer>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, importer: Arc<Importer>) {
        let id = importer.importer_id().clone();
        debug!(importer_id = %id, "Importer registered");
        self.importers.insert(id, importer);
    }

    pub fn deregister(&self, id: &ImporterId) -> Option<Arc<Importer>> {
        let removed = self.importers.remove(id).map(|(_, importer)| importer);
        if removed.is_some() {
            debug!(importer_id = %id, "Importer deregistered");
        }
        removed
    }

    pub fn find(&self, id: &ImporterId) -> Option<Arc<Importer>> {
        self.importers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Routes `token` to its issuing importer. Tokens for unknown importers are
    /// dropped without error.
    pub async fn acknowledge(&self, token: &AckToken) {
        // The map guard is released before awaiting.
        let importer = token.importer_id().and_then(|id| self.find(&id));
        match importer {
            Some(importer) => importer.acknowledge(token).await,
            None => debug!(ack_token = %token, "No importer registered for ack token"),
        }
    }

    pub fn len(&self) -> usize {
        self.importers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_for_unknown_importers_are_dropped() {
        let registry = ImporterRegistry::new();

        registry
            .acknowledge(&AckToken::generate(&ImporterId::generate()))
            .await;
        registry.acknowledge(&AckToken::parse("no_separator")).await;

        assert!(registry.is_empty());
        assert!(registry.find(&ImporterId::from("missing")).is_none());
    }
}
