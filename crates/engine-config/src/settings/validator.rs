use crate::settings::{error::SettingsError, importer::ImporterSettings};

/// Checks the invariants the importer relies on before it is constructed.
pub struct SettingsValidator<'a> {
    settings: &'a ImporterSettings,
}

impl<'a> SettingsValidator<'a> {
    pub fn new(settings: &'a ImporterSettings) -> Self {
        Self { settings }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let s = self.settings;

        positive("batch_size", s.batch_size as u64)?;
        positive("fetch_timeout_ms", s.fetch_timeout_ms)?;
        positive("socket_fetch_timeout_ms", s.socket_fetch_timeout_ms)?;
        positive("ack_cache.capacity", s.ack_cache.capacity)?;
        positive("ack_cache.ttl_secs", s.ack_cache.ttl_secs)?;

        if let Some(limit) = &s.rate_limit {
            positive("rate_limit.permits_per_second", limit.permits_per_second.into())?;
            positive("rate_limit.burst", limit.burst.into())?;
        }

        Ok(())
    }
}

fn positive(name: &'static str, value: u64) -> Result<(), SettingsError> {
    if value == 0 {
        return Err(SettingsError::NotPositive(name));
    }
    Ok(())
}
