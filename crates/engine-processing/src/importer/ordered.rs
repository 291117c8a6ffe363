use super::{Importer, merge::OrderingMerge, pair::ChannelProgressPair};
use crate::{ack::AckPosition, error::ImporterError};
use engine_core::error::ChannelError;
use model::records::{
    batch::{data_changes_only, first_data_change, has_completion, has_data_change},
    record::Record,
};
use tracing::{debug, info};

fn channel_error(pair: &ChannelProgressPair) -> impl FnOnce(ChannelError) -> ImporterError + '_ {
    move |source| ImporterError::Channel {
        channel: pair.name().to_string(),
        source,
    }
}

impl Importer {
    /// Delivers batches across all channels in ascending TSN order of their
    /// first data change.
    pub(crate) async fn run_ordered(
        &self,
        pairs: Vec<ChannelProgressPair>,
    ) -> Result<(), ImporterError> {
        let mut merge = OrderingMerge::new(pairs.len());
        let idle = self.settings.fetch_timeout();

        while !self.is_cancelled() {
            if merge.is_empty() && merge.all_finished() {
                break;
            }

            self.throttle().await?;
            self.refill(&pairs, &mut merge).await?;

            let Some((idx, records)) = merge.pop() else {
                if merge.all_finished() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(idle) => {}
                    _ = self.cancel_token().cancelled() => {}
                }
                continue;
            };

            let pair = &pairs[idx];
            if has_completion(&records) {
                info!(importer_id = %self.id, channel = %pair.name(), "Channel completed");
                merge.mark_finished(idx);
            }

            // The ledger covers the whole pulled batch; the sink only sees data.
            let Some(position) = AckPosition::for_batch(&records) else {
                continue;
            };
            self.deliver(pair, position, data_changes_only(records))
                .await?;
        }

        Ok(())
    }

    /// Tops up the merge with at most one batch per channel.
    ///
    /// With an empty merge every idle channel is polled. Otherwise channels are
    /// only peeked, and a batch is pulled just when its first TSN does not
    /// exceed the oldest TSN already queued. Batches without data changes are
    /// pulled and acknowledged straight away, and the same channel is read
    /// again so a data batch queued behind them takes part in this round.
    async fn refill(
        &self,
        pairs: &[ChannelProgressPair],
        merge: &mut OrderingMerge,
    ) -> Result<(), ImporterError> {
        let oldest = merge.oldest_tsn();

        for (idx, pair) in pairs.iter().enumerate() {
            let channel = pair.channel();

            while !merge.is_finished(idx) && !merge.has_pending(idx) && !self.is_cancelled() {
                let batch = match oldest {
                    None => channel.poll().await,
                    Some(_) => channel.peek().await,
                }
                .map_err(channel_error(pair))?;

                if batch.is_empty() {
                    break;
                }

                if !has_data_change(&batch) {
                    let batch = match oldest {
                        None => batch,
                        Some(_) => channel.poll().await.map_err(channel_error(pair))?,
                    };
                    self.drain_marker_batch(idx, pair, &batch, merge).await?;
                    continue;
                }

                let tsn = first_data_change(&batch)
                    .map_err(|source| ImporterError::MissingDataChange {
                        channel: pair.name().to_string(),
                        source,
                    })?
                    .tsn;

                let batch = match oldest {
                    None => batch,
                    Some(oldest) if tsn <= oldest => {
                        channel.poll().await.map_err(channel_error(pair))?
                    }
                    Some(_) => break,
                };

                merge
                    .push(idx, batch)
                    .map_err(|source| ImporterError::Merge {
                        channel: pair.name().to_string(),
                        source,
                    })?;
                debug!(importer_id = %self.id, channel = %pair.name(), tsn = %tsn, "Batch queued for merge");
            }
        }

        Ok(())
    }

    async fn drain_marker_batch(
        &self,
        idx: usize,
        pair: &ChannelProgressPair,
        batch: &[Record],
        merge: &mut OrderingMerge,
    ) -> Result<(), ImporterError> {
        self.acknowledge_inline(pair, batch).await?;
        if has_completion(batch) {
            info!(importer_id = %self.id, channel = %pair.name(), "Channel completed");
            merge.mark_finished(idx);
        }
        Ok(())
    }
}
