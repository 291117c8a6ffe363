pub mod settings;

pub use settings::{
    error::SettingsError,
    importer::{AckCacheSettings, ImporterSettings, OrderingMode, RateLimitSettings},
};
