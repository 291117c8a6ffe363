use super::{Importer, pair::ChannelProgressPair};
use crate::{ack::AckPosition, error::ImporterError};
use model::records::batch::{ends_with_completion, has_data_change, without_placeholders};
use tracing::info;

impl Importer {
    /// Round-robin over the active channels in registration order. A channel
    /// leaves the active set once a batch ending in its completion marker has
    /// been handed off.
    pub(crate) async fn run_unordered(
        &self,
        mut pairs: Vec<ChannelProgressPair>,
    ) -> Result<(), ImporterError> {
        let batch_size = self.settings.batch_size;
        let timeout = self.settings.fetch_timeout();

        while !pairs.is_empty() && !self.is_cancelled() {
            let mut completed = Vec::new();

            for (idx, pair) in pairs.iter().enumerate() {
                let fetched = pair
                    .channel()
                    .fetch(batch_size, timeout)
                    .await
                    .map_err(|source| ImporterError::Channel {
                        channel: pair.name().to_string(),
                        source,
                    })?;

                let records = without_placeholders(fetched);
                if records.is_empty() {
                    continue;
                }

                self.throttle().await?;

                let completes = ends_with_completion(&records);
                if has_data_change(&records) {
                    let Some(position) = AckPosition::for_batch(&records) else {
                        continue;
                    };
                    self.deliver(pair, position, records).await?;
                } else {
                    self.acknowledge_inline(pair, &records).await?;
                }

                if completes {
                    info!(importer_id = %self.id, channel = %pair.name(), "Channel completed");
                    completed.push(idx);
                }
            }

            for idx in completed.into_iter().rev() {
                pairs.remove(idx);
            }
        }

        Ok(())
    }
}
