use engine_core::{
    connectors::channel::Channel,
    error::ChannelError,
    progress::{ProgressListener, ProgressUpdate},
};
use model::records::record::Record;
use std::{fmt, slice, sync::Arc};

/// A channel together with the progress callback of the job that owns it.
#[derive(Clone)]
pub struct ChannelProgressPair {
    channel: Arc<dyn Channel>,
    listener: Arc<dyn ProgressListener>,
}

impl ChannelProgressPair {
    pub fn new(channel: Arc<dyn Channel>, listener: Arc<dyn ProgressListener>) -> Self {
        Self { channel, listener }
    }

    pub fn name(&self) -> &str {
        self.channel.name()
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Advances the channel through `last_record`, then reports `data_changes`
    /// to the owning job. Progress is not reported if the channel refuses.
    pub async fn advance(
        &self,
        last_record: &Record,
        data_changes: usize,
    ) -> Result<(), ChannelError> {
        self.channel
            .acknowledge(slice::from_ref(last_record))
            .await?;
        self.listener
            .on_progress(ProgressUpdate::new(data_changes as u64));
        Ok(())
    }
}

impl fmt::Debug for ChannelProgressPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelProgressPair")
            .field("channel", &self.channel.name())
            .finish()
    }
}
